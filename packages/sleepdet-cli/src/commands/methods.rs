use crate::cli::{KindFilter, MethodsArgs};
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use sleepdet_rs::{EventKind, MethodRegistry};
use std::collections::BTreeMap;

#[derive(Serialize)]
struct MethodInfo {
    name: &'static str,
    kind: EventKind,
    description: &'static str,
    reference: &'static str,
    defaults: BTreeMap<&'static str, Option<f64>>,
}

pub fn execute(args: MethodsArgs) -> i32 {
    let registry = MethodRegistry::builtin();
    let wanted = args.kind.map(|k| match k {
        KindFilter::Spindle => EventKind::Spindle,
        KindFilter::Slowwave => EventKind::SlowWave,
    });

    let methods: Vec<MethodInfo> = registry
        .iter()
        .filter(|m| wanted.map_or(true, |k| m.kind == k))
        .map(|m| MethodInfo {
            name: m.name,
            kind: m.kind,
            description: m.description,
            reference: m.reference,
            defaults: m.params.iter().map(|p| (p.name, p.default)).collect(),
        })
        .collect();

    if args.json || args.compact {
        match output::to_json(&methods, args.compact) {
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
    } else {
        println!("Available detection methods:\n");
        println!("  {:<20} {:<10} {}", "Name", "Kind", "Description");
        println!("  {}", "-".repeat(72));
        for m in &methods {
            let kind = match m.kind {
                EventKind::Spindle => "spindle",
                EventKind::SlowWave => "slow wave",
            };
            println!("  {:<20} {:<10} {}", m.name, kind, m.description);
        }
        println!();
        println!("Show parameters with: sleepdet params --method <NAME>");
    }

    exit_codes::SUCCESS
}
