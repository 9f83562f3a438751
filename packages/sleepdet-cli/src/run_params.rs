use crate::cli::RunArgs;
use sleepdet_rs::{
    DetectionError, DetectionInput, DetectionRun, Event, MergeOptions, MergeRule,
    MethodRegistry, Overrides, RunOptions,
};
use std::path::Path;

/// Parse a single `name=value` override. Booleans may be written as true/false.
pub fn parse_override(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid override '{}': expected name=value", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid override '{}': empty parameter name", s));
    }
    let value = value.trim();
    let parsed = match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => 1.0,
        "false" | "no" | "off" => 0.0,
        _ => value
            .parse::<f64>()
            .map_err(|_| format!("Invalid override '{}': '{}' is not a number", s, value))?,
    };
    Ok((name.to_string(), parsed))
}

pub fn parse_overrides(items: &[String]) -> Result<Overrides, String> {
    let mut overrides = Overrides::new();
    for item in items {
        let (name, value) = parse_override(item)?;
        if overrides.insert(name.clone(), value).is_some() {
            return Err(format!("Parameter '{}' is set more than once", name));
        }
    }
    Ok(overrides)
}

pub fn build_options(args: &RunArgs) -> Result<RunOptions, String> {
    let rule: MergeRule = args.merge_rule.parse().map_err(|e: DetectionError| e.to_string())?;
    Ok(RunOptions {
        channels: args.channels.clone(),
        stages: args.stages.clone(),
        cycles: args.cycles.clone(),
        merge: MergeOptions {
            min_interval: args.min_interval,
            cross_channel: args.cross_channel,
            rule,
        },
        export_traces: args.export_traces,
        detrend: args.detrend,
        min_subsegment_duration: args.min_subsegment,
        chunk_seconds: args.chunk,
        chunk_overlap: args.chunk_overlap,
    })
}

/// Resolve the method, overrides and options into a run.
pub fn build_run(args: &RunArgs) -> Result<DetectionRun, String> {
    let overrides = parse_overrides(&args.overrides)?;
    let options = build_options(args)?;
    DetectionRun::new(&MethodRegistry::builtin(), &args.method, &overrides, options)
        .map_err(|e| e.to_string())
}

/// Read and parse an input document.
pub fn load_input(path: &str) -> Result<DetectionInput, String> {
    if !Path::new(path).exists() {
        return Err(format!("Input file not found: {}", path));
    }
    DetectionInput::from_path(path).map_err(|e| format!("{}: {}", path, e))
}

/// Read events from a detection result document or a bare JSON array of events.
pub fn load_events(path: &str) -> Result<Vec<Event>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e))?;
    let mut doc: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| format!("{}: {}", path, e))?;
    let events = match doc.get_mut("events") {
        Some(events) => events.take(),
        None => doc,
    };
    serde_json::from_value(events).map_err(|e| format!("{}: no event list ({})", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_run_args() -> RunArgs {
        RunArgs {
            method: "Nir2011".to_string(),
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
        }
    }

    #[test]
    fn test_parse_override_valid() {
        assert_eq!(parse_override("det_thresh=2.5").unwrap(), ("det_thresh".to_string(), 2.5));
        assert_eq!(parse_override(" order = 4 ").unwrap(), ("order".to_string(), 4.0));
        assert_eq!(parse_override("invert=true").unwrap(), ("invert".to_string(), 1.0));
        assert_eq!(parse_override("invert=off").unwrap(), ("invert".to_string(), 0.0));
    }

    #[test]
    fn test_parse_override_invalid() {
        assert!(parse_override("det_thresh").is_err());
        assert!(parse_override("=2").is_err());
        assert!(parse_override("det_thresh=abc").is_err());
    }

    #[test]
    fn test_parse_overrides_rejects_duplicates() {
        let items = vec!["lowcut=11".to_string(), "lowcut=12".to_string()];
        let err = parse_overrides(&items).unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn test_build_options() {
        let mut args = make_run_args();
        args.merge_rule = "longest-duration".to_string();
        args.cross_channel = true;
        args.min_interval = Some(0.5);
        let options = build_options(&args).unwrap();
        assert_eq!(options.merge.rule, MergeRule::LongestDuration);
        assert!(options.merge.cross_channel);
        assert_eq!(options.merge.min_interval, Some(0.5));

        args.merge_rule = "latest".to_string();
        assert!(build_options(&args).unwrap_err().contains("Unknown merge rule"));
    }

    #[test]
    fn test_build_run() {
        let mut args = make_run_args();
        args.overrides = vec!["det_thresh=2".to_string()];
        let run = build_run(&args).unwrap();
        assert_eq!(run.params().get("det_thresh"), Some(2.0));

        args.method = "Unknown2020".to_string();
        assert!(build_run(&args).is_err());

        args.method = "Nir2011".to_string();
        args.overrides = vec!["no_such_param=1".to_string()];
        assert!(build_run(&args).is_err());
    }

    #[test]
    fn test_load_input_missing_file() {
        let err = load_input("/nonexistent_dir_12345/night.json").unwrap_err();
        assert!(err.contains("not found"));
    }

    #[test]
    fn test_load_events_from_result_or_array() {
        let tmp = tempfile::tempdir().unwrap();
        let event = Event::new("Cz", 10.0, 11.0, "Nir2011", sleepdet_rs::EventKind::Spindle);

        let bare = tmp.path().join("bare.json");
        std::fs::write(&bare, serde_json::to_string(&vec![event.clone()]).unwrap()).unwrap();
        let events = load_events(bare.to_str().unwrap()).unwrap();
        assert_eq!(events, vec![event.clone()]);

        let wrapped = tmp.path().join("result.json");
        let doc = serde_json::json!({"run_id": "x", "events": [event]});
        std::fs::write(&wrapped, doc.to_string()).unwrap();
        assert_eq!(load_events(wrapped.to_str().unwrap()).unwrap().len(), 1);

        let other = tmp.path().join("other.json");
        std::fs::write(&other, r#"{"subsegments": []}"#).unwrap();
        assert!(load_events(other.to_str().unwrap()).is_err());
    }
}
