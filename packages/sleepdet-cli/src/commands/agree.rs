use crate::cli::AgreeArgs;
use crate::exit_codes;
use crate::output;
use crate::run_params;
use serde::Serialize;
use sleepdet_rs::agreement::MatchedPair;
use sleepdet_rs::{match_events, AgreementSummary};

#[derive(Serialize)]
struct AgreeOutput {
    detection: String,
    standard: String,
    #[serde(flatten)]
    summary: AgreementSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<Vec<MatchedPair>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unmatched_detection: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unmatched_standard: Option<Vec<usize>>,
}

pub fn execute(args: AgreeArgs) -> i32 {
    let (detection, standard) = match (
        run_params::load_events(&args.detection),
        run_params::load_events(&args.standard),
    ) {
        (Ok(d), Ok(s)) => (d, s),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let agreement = match match_events(&detection, &standard, args.threshold) {
        Ok(agreement) => agreement,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let summary = agreement.summary();

    if args.json {
        let result = AgreeOutput {
            detection: args.detection,
            standard: args.standard,
            summary,
            matches: args.details.then(|| agreement.matches.clone()),
            unmatched_detection: args.details.then(|| agreement.false_positives.clone()),
            unmatched_standard: args.details.then(|| agreement.false_negatives.clone()),
        };
        let written = output::to_json(&result, false).and_then(|json| output::write_output(&json, None));
        if let Err(e) = written {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else {
        println!(
            "{} detected vs {} reference events (IoU > {})",
            detection.len(),
            standard.len(),
            summary.threshold
        );
        println!(
            "  TP {}  FP {}  FN {}",
            summary.true_positives, summary.false_positives, summary.false_negatives
        );
        println!(
            "  precision {:.3}  recall {:.3}  F1 {:.3}",
            summary.precision, summary.recall, summary.f1
        );
        if args.details {
            for m in &agreement.matches {
                let (d, s) = (&detection[m.detection], &standard[m.standard]);
                println!(
                    "  {} {:.3}-{:.3} ~ {:.3}-{:.3} ({:.2})",
                    d.channel, d.onset, d.offset, s.onset, s.offset, m.score
                );
            }
        }
    }

    exit_codes::SUCCESS
}
