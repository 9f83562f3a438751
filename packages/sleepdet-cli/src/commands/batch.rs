use crate::cli::BatchArgs;
use crate::commands::detect::run_detection;
use crate::exit_codes;
use crate::output;
use crate::run_params;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub async fn execute(args: BatchArgs, quiet: bool, token: CancellationToken) -> i32 {
    // Resolve file list
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    // Dry-run mode: print file list and exit
    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    // Method and overrides are shared by every file
    let run = match run_params::build_run(&args.run) {
        Ok(run) => run,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let total = files.len();
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let start_time = Instant::now();

    for (i, file_path) in files.iter().enumerate() {
        if token.is_cancelled() {
            break;
        }
        if !quiet {
            eprintln!("[{}/{}] {}...", i + 1, total, file_path);
        }

        let input = match run_params::load_input(file_path) {
            Ok(input) => input,
            Err(msg) => {
                eprintln!("  Error: {}", msg);
                failed += 1;
                if !args.continue_on_error {
                    break;
                }
                continue;
            }
        };

        let result = match run_detection(run.clone(), input, token.clone()).await {
            Ok(result) => result,
            Err(e) => {
                eprintln!("  Detection failed: {}", e);
                failed += 1;
                if !args.continue_on_error {
                    break;
                }
                continue;
            }
        };

        // Per-file documents in the output directory, JSON lines otherwise
        let (json, target) = match args.output_dir {
            Some(ref dir) => (
                output::to_json(&result, args.compact),
                Some(output_path(dir, file_path)),
            ),
            None => (output::to_json(&result, true), None),
        };
        let written = json.and_then(|json| output::write_output(&json, target.as_deref()));
        if let Err(e) = written {
            eprintln!("  Error writing output: {}", e);
            failed += 1;
            if !args.continue_on_error {
                break;
            }
            continue;
        }
        if !quiet {
            eprintln!("  {} events", result.events.len());
        }
        succeeded += 1;
    }

    let elapsed = start_time.elapsed();

    if !quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            succeeded,
            total,
            failed,
            total,
            elapsed.as_secs_f64()
        );
    }

    if token.is_cancelled() {
        exit_codes::CANCELLED
    } else if failed == 0 {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn output_path(dir: &str, file_path: &str) -> String {
    let stem = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    Path::new(dir)
        .join(format!("{}_events.json", stem))
        .to_string_lossy()
        .into_owned()
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob or --files must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                log::warn!("glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunArgs;
    use std::fs;

    fn make_batch_args() -> BatchArgs {
        BatchArgs {
            glob: None,
            files: None,
            run: RunArgs {
                method: "FASST".to_string(),
                overrides: Vec::new(),
                channels: None,
                stages: None,
                cycles: None,
                min_interval: None,
                cross_channel: false,
                merge_rule: "earliest-onset".to_string(),
                detrend: false,
                min_subsegment: 0.0,
                chunk: None,
                chunk_overlap: 5.0,
                export_traces: false,
            },
            output_dir: None,
            continue_on_error: false,
            dry_run: false,
            compact: false,
        }
    }

    #[test]
    fn test_resolve_files_no_input() {
        let args = make_batch_args();
        let result = resolve_files(&args);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("must be specified"));
    }

    #[test]
    fn test_resolve_files_explicit_list() {
        let mut args = make_batch_args();
        args.files = Some(vec!["/tmp/a.json".to_string(), "/tmp/b.json".to_string()]);
        let result = resolve_files(&args).unwrap();
        assert_eq!(result, vec!["/tmp/a.json", "/tmp/b.json"]);
    }

    #[test]
    fn test_resolve_glob_no_matches() {
        let result = resolve_glob("/nonexistent_dir_12345/*.json").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_resolve_glob_with_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.json"), "").unwrap();
        fs::write(tmp.path().join("a.json"), "").unwrap();
        fs::write(tmp.path().join("c.txt"), "").unwrap();

        let pattern = format!("{}/*.json", tmp.path().to_str().unwrap());
        let result = resolve_glob(&pattern).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].ends_with("a.json"));
    }

    #[test]
    fn test_output_path_uses_stem() {
        let path = output_path("/out", "/data/night1.json");
        assert!(path.ends_with("night1_events.json"));
    }
}
