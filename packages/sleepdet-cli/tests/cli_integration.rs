use assert_cmd::Command;
use predicates::prelude::*;
use std::f64::consts::PI;
use std::path::Path;

fn sleepdet() -> Command {
    let mut cmd = Command::cargo_bin("sleepdet").unwrap();
    cmd.env_remove("SLEEPDET_METHOD");
    cmd
}

/// 30 s at 256 Hz of slow background with a 1 s, 13.5 Hz burst at `onset`
fn samples(onset: f64) -> Vec<f64> {
    let fs = 256.0;
    (0..7680)
        .map(|i| {
            let t = i as f64 / fs;
            let mut v = 2.0 * (2.0 * PI * 0.8 * t).sin()
                + 1.5 * (2.0 * PI * 2.1 * t + 0.4).sin()
                + (2.0 * PI * 3.3 * t + 1.1).sin();
            if t >= onset && t < onset + 1.0 {
                v += 5.0 * (2.0 * PI * 13.5 * (t - onset)).sin();
            }
            v
        })
        .collect()
}

fn write_input(path: &Path, channels: &[(&str, f64)]) {
    let subsegments: Vec<serde_json::Value> = channels
        .iter()
        .map(|(channel, onset)| {
            serde_json::json!({
                "channel": channel,
                "start_time": 0.0,
                "sample_rate": 256.0,
                "stage": "N2",
                "samples": samples(*onset),
            })
        })
        .collect();
    let doc = serde_json::json!({ "subsegments": subsegments });
    std::fs::write(path, doc.to_string()).unwrap();
}

fn parse_stdout(output: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    sleepdet()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    sleepdet()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sleepdet"));
}

// =============================================================================
// METHODS / PARAMS
// =============================================================================

#[test]
fn test_methods_table() {
    sleepdet()
        .arg("methods")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ferrarelli2007"))
        .stdout(predicate::str::contains("Massimini2004"));
}

#[test]
fn test_methods_json_by_kind() {
    let output = sleepdet()
        .args(["methods", "--json", "--kind", "slowwave"])
        .assert()
        .success();
    let parsed = parse_stdout(&output);
    let arr = parsed.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert!(arr.iter().all(|m| m["kind"] == "slow_wave"));
    assert_eq!(arr[0]["defaults"]["min_ptp"], 140.0);
}

#[test]
fn test_params_json() {
    let output = sleepdet()
        .args(["params", "--method", "nir2011", "--json"])
        .assert()
        .success();
    let parsed = parse_stdout(&output);
    assert_eq!(parsed["method"], "Nir2011");
    let params = parsed["params"].as_array().unwrap();
    assert!(params.iter().any(|p| p["name"] == "det_thresh" && p["default"] == 3.0));
}

#[test]
fn test_params_marks_fixed_values() {
    sleepdet()
        .args(["params", "--method", "Lacourse2018"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rel_pow_lowcut"))
        .stdout(predicate::str::contains("(fixed)"));
}

#[test]
fn test_params_unknown_method() {
    sleepdet()
        .args(["params", "--method", "Nobody1999"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown detection method"));
}

#[test]
fn test_method_from_environment() {
    sleepdet()
        .env("SLEEPDET_METHOD", "Moelle2011")
        .arg("params")
        .assert()
        .success()
        .stdout(predicate::str::contains("rms_window"));
}

// =============================================================================
// DETECT
// =============================================================================

#[test]
fn test_detect_writes_events() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("night.json");
    write_input(&input, &[("C3", 12.0)]);

    let output = sleepdet()
        .args(["detect", "--method", "Nir2011", "--quiet", "--input"])
        .arg(&input)
        .assert()
        .success();
    let parsed = parse_stdout(&output);
    assert_eq!(parsed["method"], "Nir2011");
    assert_eq!(parsed["cancelled"], false);
    let events = parsed["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    let onset = events[0]["onset"].as_f64().unwrap();
    assert!(onset > 11.5 && onset < 12.5);
}

#[test]
fn test_detect_cross_channel_to_file() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("night.json");
    let out = tmp.path().join("events.json");
    write_input(&input, &[("C3", 12.2), ("C4", 12.0)]);

    sleepdet()
        .args(["detect", "--method", "Nir2011", "--cross-channel", "--compact", "--input"])
        .arg(&input)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Results written to"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let events = parsed["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["channel"], "C4");
    assert_eq!(events[0]["merged_from"].as_array().unwrap().len(), 2);
}

#[test]
fn test_detect_bad_override() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("night.json");
    write_input(&input, &[("C3", 12.0)]);

    sleepdet()
        .args(["detect", "--method", "Nir2011", "--set", "det_thresh=abc", "--input"])
        .arg(&input)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a number"));

    sleepdet()
        .args(["detect", "--method", "Nir2011", "--set", "min_duration=9", "--input"])
        .arg(&input)
        .assert()
        .code(2);
}

#[test]
fn test_detect_missing_input() {
    sleepdet()
        .args(["detect", "--method", "Nir2011", "--input", "/nonexistent_dir_12345/x.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_detect_nyquist_violation() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("low_rate.json");
    let doc = serde_json::json!({
        "subsegments": [{"channel": "Cz", "start_time": 0.0, "sample_rate": 20.0, "samples": vec![0.0; 600]}]
    });
    std::fs::write(&input, doc.to_string()).unwrap();

    sleepdet()
        .args(["detect", "--method", "Ferrarelli2007", "--input"])
        .arg(&input)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Detection failed"));
}

// =============================================================================
// BATCH
// =============================================================================

#[test]
fn test_batch_output_dir() {
    let tmp = tempfile::tempdir().unwrap();
    write_input(&tmp.path().join("a.json"), &[("C3", 5.0)]);
    write_input(&tmp.path().join("b.json"), &[("C3", 20.0)]);
    let out_dir = tmp.path().join("out");
    let pattern = format!("{}/*.json", tmp.path().to_str().unwrap());

    sleepdet()
        .args(["batch", "--method", "Moelle2011", "--glob", &pattern, "--output-dir"])
        .arg(&out_dir)
        .assert()
        .success()
        .stderr(predicate::str::contains("2/2 succeeded"));

    assert!(out_dir.join("a_events.json").exists());
    assert!(out_dir.join("b_events.json").exists());
}

#[test]
fn test_batch_partial_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let good = tmp.path().join("good.json");
    let bad = tmp.path().join("bad.json");
    write_input(&good, &[("C3", 12.0)]);
    std::fs::write(&bad, "{not json").unwrap();

    sleepdet()
        .args(["batch", "--method", "Moelle2011", "--continue-on-error", "--files"])
        .arg(&bad)
        .arg(&good)
        .assert()
        .code(3);
}

#[test]
fn test_batch_dry_run() {
    let tmp = tempfile::tempdir().unwrap();
    write_input(&tmp.path().join("a.json"), &[("C3", 12.0)]);
    let pattern = format!("{}/*.json", tmp.path().to_str().unwrap());

    sleepdet()
        .args(["batch", "--method", "FASST", "--dry-run", "--glob", &pattern])
        .assert()
        .success()
        .stdout(predicate::str::contains("a.json"));
}

// =============================================================================
// VALIDATE
// =============================================================================

#[test]
fn test_validate_document() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("night.json");
    write_input(&input, &[("C3", 12.0), ("C4", 12.0)]);

    sleepdet()
        .args(["validate", "--method", "Lacourse2018", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 subsegments, 2 channels"));
}

#[test]
fn test_validate_json_reports_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("night.json");
    write_input(&input, &[("C3", 12.0)]);

    let output = sleepdet()
        .args(["validate", "--json", "--method", "Nir2011", "--set", "highcut=200", "--input"])
        .arg(&input)
        .assert()
        .code(2);
    let parsed = parse_stdout(&output);
    assert_eq!(parsed["parsed"], true);
    assert!(parsed["error"].as_str().unwrap().contains("highcut"));
}

#[test]
fn test_validate_nonexistent_file() {
    sleepdet()
        .args(["validate", "--input", "/nonexistent/night.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

// =============================================================================
// AGREE / CONSENSUS
// =============================================================================

fn write_events(path: &Path, events: &[(&str, f64, f64)]) {
    let events: Vec<serde_json::Value> = events
        .iter()
        .map(|(channel, onset, offset)| {
            serde_json::json!({
                "channel": channel,
                "onset": onset,
                "offset": offset,
                "polarity": "positive",
                "method": "manual",
                "kind": "spindle",
            })
        })
        .collect();
    std::fs::write(path, serde_json::Value::Array(events).to_string()).unwrap();
}

#[test]
fn test_agree_json_scores() {
    let tmp = tempfile::tempdir().unwrap();
    let detection = tmp.path().join("detection.json");
    let standard = tmp.path().join("standard.json");
    write_events(&detection, &[("Cz", 10.0, 11.0), ("Cz", 20.0, 21.0)]);
    write_events(&standard, &[("Cz", 10.1, 11.1)]);

    let output = sleepdet()
        .args(["agree", "--json", "--details", "--detection"])
        .arg(&detection)
        .arg("--standard")
        .arg(&standard)
        .assert()
        .success();
    let parsed = parse_stdout(&output);
    assert_eq!(parsed["true_positives"], 1);
    assert_eq!(parsed["false_positives"], 1);
    assert_eq!(parsed["false_negatives"], 0);
    assert_eq!(parsed["precision"], 0.5);
    assert_eq!(parsed["recall"], 1.0);
    assert_eq!(parsed["unmatched_detection"], serde_json::json!([1]));
}

#[test]
fn test_agree_with_detect_output() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("night.json");
    let result = tmp.path().join("events.json");
    let standard = tmp.path().join("standard.json");
    write_input(&input, &[("C3", 12.0)]);
    write_events(&standard, &[("C3", 12.0, 13.0)]);

    sleepdet()
        .args(["detect", "--method", "Nir2011", "--quiet", "--input"])
        .arg(&input)
        .arg("-o")
        .arg(&result)
        .assert()
        .success();

    sleepdet()
        .args(["agree", "--detection"])
        .arg(&result)
        .arg("--standard")
        .arg(&standard)
        .assert()
        .success()
        .stdout(predicate::str::contains("TP 1  FP 0  FN 0"));
}

#[test]
fn test_agree_rejects_bad_threshold() {
    let tmp = tempfile::tempdir().unwrap();
    let events = tmp.path().join("events.json");
    write_events(&events, &[("Cz", 10.0, 11.0)]);

    sleepdet()
        .args(["agree", "--threshold", "1.5", "--detection"])
        .arg(&events)
        .arg("--standard")
        .arg(&events)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("threshold"));
}

#[test]
fn test_consensus_of_three_raters() {
    let tmp = tempfile::tempdir().unwrap();
    let raters: Vec<_> = [
        [("Cz", 10.0, 11.0)],
        [("Cz", 10.5, 11.5)],
        [("Cz", 40.0, 41.0)],
    ]
    .iter()
    .enumerate()
    .map(|(i, events)| {
        let path = tmp.path().join(format!("rater{}.json", i));
        write_events(&path, events);
        path
    })
    .collect();

    let output = sleepdet()
        .args(["consensus", "--threshold", "0.6", "--files"])
        .args(&raters)
        .assert()
        .success();
    let parsed = parse_stdout(&output);
    let events = parsed["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["method"], "consensus");
    assert!((events[0]["onset"].as_f64().unwrap() - 10.5).abs() < 1e-9);
    assert!((events[0]["offset"].as_f64().unwrap() - 11.0).abs() < 1e-9);
}
