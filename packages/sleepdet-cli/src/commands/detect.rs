use crate::cli::DetectArgs;
use crate::exit_codes;
use crate::output;
use crate::run_params;
use sleepdet_rs::{DetectionError, DetectionInput, DetectionOutput, DetectionRun};
use tokio_util::sync::CancellationToken;

/// Run `run` on `input` off the async runtime; units are spread over the rayon pool.
pub async fn run_detection(
    run: DetectionRun,
    input: DetectionInput,
    token: CancellationToken,
) -> Result<DetectionOutput, DetectionError> {
    tokio::task::spawn_blocking(move || run.execute(&input, &token))
        .await
        .map_err(|e| DetectionError::IoError(std::io::Error::other(e)))?
}

/// Exit code for a failed run: configuration problems are the caller's input.
pub fn error_code(e: &DetectionError) -> i32 {
    if e.is_fatal() && !matches!(e, DetectionError::IoError(_)) {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

pub async fn execute(args: DetectArgs, quiet: bool, token: CancellationToken) -> i32 {
    let input = match run_params::load_input(&args.input) {
        Ok(input) => input,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let run = match run_params::build_run(&args.run) {
        Ok(run) => run,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !quiet {
        eprintln!("Running {} on {}...", run.method().name, args.input);
        eprintln!(
            "  Subsegments: {} ({} selected)",
            input.subsegments.len(),
            run.select(&input.subsegments).len()
        );
        eprintln!("  Channels: {}", input.channels().join(", "));
    }

    let result = match run_detection(run, input, token).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Detection failed: {}", e);
            return error_code(&e);
        }
    };

    let json = match output::to_json(&result, args.compact) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error serializing result: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    if let Err(e) = output::write_output(&json, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if !quiet {
        eprintln!(
            "Found {} events, {} units skipped",
            result.events.len(),
            result.skipped.len()
        );
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }

    if result.cancelled {
        exit_codes::CANCELLED
    } else {
        exit_codes::SUCCESS
    }
}
