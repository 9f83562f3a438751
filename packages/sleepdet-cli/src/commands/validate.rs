use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use crate::run_params;
use serde::Serialize;
use sleepdet_rs::{DetectionInput, DetectionRun, MethodRegistry, RunOptions};
use std::path::Path;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    parsed: bool,
    subsegments: usize,
    channels: Vec<String>,
    duration_seconds: f64,
    method: Option<String>,
    error: Option<String>,
}

fn check_method(args: &ValidateArgs, method: &str, input: &DetectionInput) -> Result<String, String> {
    let overrides = run_params::parse_overrides(&args.overrides)?;
    let run = DetectionRun::new(
        &MethodRegistry::builtin(),
        method,
        &overrides,
        RunOptions::default(),
    )
    .map_err(|e| e.to_string())?;
    let units = run.select(&input.subsegments);
    run.validate_units(&units).map_err(|e| e.to_string())?;
    Ok(run.method().name.to_string())
}

pub fn execute(args: ValidateArgs) -> i32 {
    let exists = Path::new(&args.input).is_file();

    let mut result = ValidateOutput {
        file: args.input.clone(),
        exists,
        parsed: false,
        subsegments: 0,
        channels: Vec::new(),
        duration_seconds: 0.0,
        method: None,
        error: None,
    };

    if !exists {
        result.error = Some(format!("File not found: {}", args.input));
    } else {
        match DetectionInput::from_path(&args.input) {
            Ok(input) => {
                result.parsed = true;
                result.subsegments = input.subsegments.len();
                result.channels = input.channels();
                result.duration_seconds = input.subsegments.iter().map(|s| s.duration()).sum();
                if let Some(ref method) = args.method {
                    match check_method(&args, method, &input) {
                        Ok(name) => result.method = Some(name),
                        Err(e) => result.error = Some(e),
                    }
                }
            }
            Err(e) => result.error = Some(e.to_string()),
        }
    }

    if args.json {
        match output::to_json(&result, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "File '{}' is valid ({} subsegments, {} channels, {:.1}s)",
            args.input,
            result.subsegments,
            result.channels.len(),
            result.duration_seconds
        );
        if let Some(ref method) = result.method {
            println!("Parameters are valid for {}", method);
        }
    }

    if result.error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
