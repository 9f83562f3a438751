use crate::cli::ConsensusArgs;
use crate::exit_codes;
use crate::output;
use crate::run_params;
use serde::Serialize;
use sleepdet_rs::{consensus, Event};

#[derive(Serialize)]
struct ConsensusOutput {
    raters: Vec<String>,
    threshold: f64,
    events: Vec<Event>,
}

pub fn execute(args: ConsensusArgs) -> i32 {
    let mut raters = Vec::with_capacity(args.files.len());
    for file in &args.files {
        match run_params::load_events(file) {
            Ok(events) => raters.push(events),
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        }
    }

    let events = match consensus(&raters, args.threshold, args.sample_rate, args.min_duration) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    log::info!("{} consensus events from {} raters", events.len(), raters.len());

    let result = ConsensusOutput {
        raters: args.files,
        threshold: args.threshold,
        events,
    };
    let written = output::to_json(&result, args.compact)
        .and_then(|json| output::write_output(&json, args.output.as_deref()));
    match written {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
