use crate::cli::ParamsArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use sleepdet_rs::method::ParamSpec;
use sleepdet_rs::MethodRegistry;

#[derive(Serialize)]
struct ParamsOutput<'a> {
    method: &'static str,
    reference: &'static str,
    params: &'a [ParamSpec],
}

fn fmt_value(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn execute(args: ParamsArgs) -> i32 {
    let spec = match MethodRegistry::builtin().get(&args.method) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if args.json {
        let result = ParamsOutput {
            method: spec.name,
            reference: spec.reference,
            params: spec.params,
        };
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
    } else {
        println!("{} ({})\n", spec.name, spec.reference);
        println!(
            "  {:<22} {:<10} {:<9} {:<9} {:<9} {}",
            "Name", "Kind", "Default", "Min", "Max", "Description"
        );
        println!("  {}", "-".repeat(80));
        for p in spec.params {
            let description = if p.tunable {
                p.description.to_string()
            } else {
                format!("{} (fixed)", p.description)
            };
            println!(
                "  {:<22} {:<10} {:<9} {:<9} {:<9} {}",
                p.name,
                format!("{:?}", p.kind).to_lowercase(),
                fmt_value(p.default),
                fmt_value(p.min),
                fmt_value(p.max),
                description
            );
        }
    }

    exit_codes::SUCCESS
}
