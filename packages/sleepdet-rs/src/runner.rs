use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{DetectionError, Result};
use crate::extract::detect_events;
use crate::merge::{MergeRule, Merger};
use crate::method::params::MIN_INTERVAL;
use crate::method::{
    ChunkPlan, DetectionRule, Executor, MethodRegistry, MethodSpec, Overrides, ParamSet, Traces,
};
use crate::profiling::{ProfileScope, StageClock};
use crate::slowwave::detect_slow_waves;
use crate::transform::detrend;
use crate::types::*;

/// Seconds per scoring epoch, used for event density
pub const EPOCH_SECONDS: f64 = 30.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Overrides the method's `min_interval`
    pub min_interval: Option<f64>,
    pub cross_channel: bool,
    pub rule: MergeRule,
}

/// Everything about a run except the method and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub channels: Option<Vec<String>>,
    pub stages: Option<Vec<String>>,
    pub cycles: Option<Vec<u32>>,
    pub merge: MergeOptions,
    pub export_traces: bool,
    pub detrend: bool,
    /// Subsegments shorter than this many seconds are skipped
    pub min_subsegment_duration: f64,
    pub chunk_seconds: Option<f64>,
    pub chunk_overlap: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            channels: None,
            stages: None,
            cycles: None,
            merge: MergeOptions::default(),
            export_traces: false,
            detrend: false,
            min_subsegment_duration: 0.0,
            chunk_seconds: None,
            chunk_overlap: 5.0,
        }
    }
}

impl RunOptions {
    fn validate(&self) -> Result<()> {
        let negative = |name: &str, v: f64| {
            if v < 0.0 || !v.is_finite() {
                Err(DetectionError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, v
                )))
            } else {
                Ok(())
            }
        };
        if let Some(v) = self.merge.min_interval {
            negative("min_interval", v)?;
        }
        negative("min_subsegment_duration", self.min_subsegment_duration)?;
        negative("chunk_overlap", self.chunk_overlap)?;
        if let Some(v) = self.chunk_seconds {
            if v <= 0.0 || !v.is_finite() {
                return Err(DetectionError::Configuration(format!(
                    "chunk_seconds must be positive, got {}",
                    v
                )));
            }
        }
        Ok(())
    }

    /// Whether a subsegment passes the channel, stage and cycle filters
    pub fn selects(&self, segment: &Subsegment) -> bool {
        if let Some(channels) = &self.channels {
            if !channels.iter().any(|c| c == &segment.channel) {
                return false;
            }
        }
        if let Some(stages) = &self.stages {
            match &segment.stage {
                Some(stage) if stages.iter().any(|s| s.eq_ignore_ascii_case(stage)) => {}
                _ => return false,
            }
        }
        if let Some(cycles) = &self.cycles {
            match segment.cycle {
                Some(cycle) if cycles.contains(&cycle) => {}
                _ => return false,
            }
        }
        true
    }
}

/// One detection run: a method with a frozen parameter snapshot
#[derive(Debug, Clone)]
pub struct DetectionRun {
    id: String,
    spec: &'static MethodSpec,
    params: ParamSet,
    options: RunOptions,
    created_at: chrono::DateTime<chrono::Utc>,
}

struct UnitResult {
    events: Vec<Event>,
    stats: UnitStats,
    traces: Vec<DiagnosticTrace>,
}

enum UnitOutcome {
    Done(UnitResult),
    Skipped(SkippedUnit),
}

fn skipped(segment: &Subsegment, reason: &str, message: impl Into<String>) -> UnitOutcome {
    UnitOutcome::Skipped(SkippedUnit {
        channel: segment.channel.clone(),
        start_time: segment.start_time,
        reason: reason.to_string(),
        message: message.into(),
    })
}

impl DetectionRun {
    /// Look up `method` and resolve `overrides` against its schema
    pub fn new(
        registry: &MethodRegistry,
        method: &str,
        overrides: &Overrides,
        options: RunOptions,
    ) -> Result<Self> {
        Self::from_spec(registry.get(method)?, overrides, options)
    }

    pub fn from_spec(
        spec: &'static MethodSpec,
        overrides: &Overrides,
        options: RunOptions,
    ) -> Result<Self> {
        spec.validate()?;
        let params = spec.resolve_params(overrides)?;
        options.validate()?;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            spec,
            params,
            options,
            created_at: chrono::Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &'static MethodSpec {
        self.spec
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn created_at(&self) -> String {
        self.created_at.to_rfc3339()
    }

    /// Subsegments selected by the run's filters
    pub fn select<'s>(&self, subsegments: &'s [Subsegment]) -> Vec<&'s Subsegment> {
        subsegments
            .iter()
            .filter(|s| self.options.selects(s))
            .collect()
    }

    /// Check every selected subsegment against the parameters before running
    pub fn validate_units(&self, units: &[&Subsegment]) -> Result<()> {
        for unit in units {
            if !(unit.sample_rate.is_finite() && unit.sample_rate > 0.0) {
                return Err(DetectionError::Configuration(format!(
                    "{} has invalid sample rate {}",
                    unit.label(),
                    unit.sample_rate
                )));
            }
            if unit.samples.iter().any(|v| !v.is_finite()) {
                return Err(DetectionError::Configuration(format!(
                    "{} contains non-finite samples",
                    unit.label()
                )));
            }
            self.params
                .check_sample_rate(self.spec.params, unit.sample_rate)?;
        }
        Ok(())
    }

    pub fn execute(&self, input: &DetectionInput, token: &CancellationToken) -> Result<DetectionOutput> {
        self.execute_subsegments(&input.subsegments, &input.channel_groups, token)
    }

    /// Run every selected unit in parallel, then merge.
    ///
    /// Configuration problems abort before any unit runs. Units that cannot be
    /// processed are reported in `skipped`; once `token` is cancelled the
    /// remaining units are skipped and the completed ones are still merged.
    pub fn execute_subsegments(
        &self,
        subsegments: &[Subsegment],
        groups: &[ChannelGroup],
        token: &CancellationToken,
    ) -> Result<DetectionOutput> {
        let units = self.select(subsegments);
        self.validate_units(&units)?;
        log::info!(
            "Run {}: {} on {} of {} subsegments",
            self.id,
            self.spec.name,
            units.len(),
            subsegments.len()
        );
        let _scope = ProfileScope::new(format!("run {}", self.id));

        let outcomes: Vec<UnitOutcome> = units
            .par_iter()
            .map(|segment| {
                if token.is_cancelled() {
                    return Ok(skipped(segment, "cancelled", "run was cancelled"));
                }
                if segment.duration() < self.options.min_subsegment_duration {
                    return Ok(skipped(
                        segment,
                        "too_short",
                        format!(
                            "{:.3}s is shorter than the minimum {:.3}s",
                            segment.duration(),
                            self.options.min_subsegment_duration
                        ),
                    ));
                }
                match self.run_unit(segment) {
                    Ok(result) => Ok(UnitOutcome::Done(result)),
                    Err(e) if e.is_skippable() => {
                        log::warn!("Skipping {}: {}", segment.label(), e);
                        Ok(skipped(segment, e.kind(), e.to_string()))
                    }
                    Err(e) => Err(e),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let mut events = Vec::new();
        let mut skipped_units = Vec::new();
        let mut unit_stats = Vec::new();
        let mut traces = Vec::new();
        for outcome in outcomes {
            match outcome {
                UnitOutcome::Done(result) => {
                    events.extend(result.events);
                    unit_stats.push(result.stats);
                    traces.extend(result.traces);
                }
                UnitOutcome::Skipped(skip) => skipped_units.push(skip),
            }
        }

        let raw_count = events.len();
        let (events, diagnostics) = self.merge(events, groups);
        let cancelled = token.is_cancelled();
        log::info!(
            "Run {} finished: {} events ({} before merging), {} skipped{}",
            self.id,
            events.len(),
            raw_count,
            skipped_units.len(),
            if cancelled { ", cancelled" } else { "" }
        );

        Ok(DetectionOutput {
            run_id: self.id.clone(),
            method: self.spec.name.to_string(),
            created_at: self.created_at(),
            events,
            skipped: skipped_units,
            diagnostics,
            unit_stats,
            traces,
            cancelled,
        })
    }

    fn merge(&self, mut events: Vec<Event>, groups: &[ChannelGroup]) -> (Vec<Event>, Vec<Diagnostic>) {
        if self.spec.kind == EventKind::SlowWave {
            events.sort_by(|a, b| {
                a.onset
                    .total_cmp(&b.onset)
                    .then_with(|| a.channel.cmp(&b.channel))
            });
            return (events, Vec::new());
        }
        let min_interval = self
            .options
            .merge
            .min_interval
            .or_else(|| self.params.get(MIN_INTERVAL))
            .unwrap_or(0.0);
        let outcome = Merger::new(min_interval)
            .with_rule(self.options.merge.rule)
            .across_channels(self.options.merge.cross_channel)
            .merge(events, groups);
        (outcome.events, outcome.diagnostics)
    }

    fn chunk_plan(&self) -> Option<ChunkPlan> {
        self.options.chunk_seconds.map(|chunk| ChunkPlan {
            chunk,
            overlap: self.options.chunk_overlap,
        })
    }

    fn run_unit(&self, segment: &Subsegment) -> Result<UnitResult> {
        let mut clock = StageClock::start(format!("{} {}", self.spec.name, segment.label()));
        let fs = segment.sample_rate;
        let samples: Cow<[f64]> = if self.options.detrend {
            Cow::Owned(detrend(&segment.samples))
        } else {
            Cow::Borrowed(segment.samples.as_slice())
        };

        let traces = Executor::new(self.spec, &self.params).run_chunked(
            &samples,
            fs,
            self.chunk_plan(),
        )?;
        clock.lap("transform");

        let (events, det_value, sel_value) = match self.spec.rule {
            DetectionRule::ZeroCrossing { .. } => {
                let events = detect_slow_waves(self.spec, &self.params, segment, &traces)?;
                (events, None, None)
            }
            _ => {
                let (events, extraction) =
                    detect_events(self.spec, &self.params, segment, &traces)?;
                (events, extraction.det_value, extraction.sel_value)
            }
        };
        clock.lap("detect");

        let traces = if self.options.export_traces {
            let exported = export_traces(segment, traces);
            clock.lap("export");
            exported
        } else {
            Vec::new()
        };

        let (stages, elapsed_ms) = clock.finish();
        let duration = segment.duration();
        let stats = UnitStats {
            channel: segment.channel.clone(),
            start_time: segment.start_time,
            duration,
            det_value,
            sel_value,
            n_events: events.len(),
            density: if duration > 0.0 {
                events.len() as f64 * EPOCH_SECONDS / duration
            } else {
                0.0
            },
            elapsed_ms,
            stages,
        };
        log::debug!(
            "{}: {} events, det {:?}, sel {:?} in {:.1}ms",
            segment.label(),
            events.len(),
            det_value,
            sel_value,
            elapsed_ms
        );

        Ok(UnitResult {
            events,
            stats,
            traces,
        })
    }
}

fn export_traces(segment: &Subsegment, traces: Traces) -> Vec<DiagnosticTrace> {
    let mut exported: Vec<DiagnosticTrace> = traces
        .into_iter()
        .map(|(name, values)| DiagnosticTrace {
            channel: segment.channel.clone(),
            start_time: segment.start_time,
            sample_rate: segment.sample_rate,
            name: name.to_string(),
            values,
        })
        .collect();
    exported.sort_by(|a, b| a.name.cmp(&b.name));
    exported
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Deterministic broadband background
    fn background(n: usize, fs: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                [1.3, 4.7, 8.1, 12.9, 17.3, 23.9]
                    .iter()
                    .enumerate()
                    .map(|(k, f)| (2.0 * PI * f * t + k as f64).sin())
                    .sum::<f64>()
            })
            .collect()
    }

    fn run(method: &str, options: RunOptions) -> DetectionRun {
        DetectionRun::new(&MethodRegistry::builtin(), method, &Overrides::new(), options).unwrap()
    }

    #[test]
    fn test_unknown_method_and_bad_overrides() {
        let registry = MethodRegistry::builtin();
        let err = DetectionRun::new(&registry, "nope", &Overrides::new(), RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, DetectionError::UnknownMethod(_)));

        let mut overrides = Overrides::new();
        overrides.insert("min_duration".into(), 5.0);
        let err = DetectionRun::new(&registry, "Nir2011", &overrides, RunOptions::default())
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_nyquist_violation_aborts_before_units() {
        let seg = Subsegment::new("Cz", 0.0, 20.0, background(600, 20.0));
        let err = run("Ferrarelli2007", RunOptions::default())
            .execute_subsegments(&[seg], &[], &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, DetectionError::Configuration(_)));
    }

    #[test]
    fn test_short_unit_is_skipped_others_run() {
        let fs = 256.0;
        let long = Subsegment::new("Cz", 0.0, fs, background(256 * 20, fs));
        let short = Subsegment::new("Cz", 100.0, fs, background(10, fs));
        let out = run("Nir2011", RunOptions::default())
            .execute_subsegments(&[long, short], &[], &CancellationToken::new())
            .unwrap();
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, "insufficient_data");
        assert_eq!(out.skipped[0].start_time, 100.0);
        assert_eq!(out.unit_stats.len(), 1);
        assert!(out.unit_stats[0].det_value.is_some());
        assert!(!out.cancelled);
    }

    #[test]
    fn test_cancelled_before_start() {
        let fs = 256.0;
        let segs = vec![
            Subsegment::new("C3", 0.0, fs, background(2560, fs)),
            Subsegment::new("C4", 0.0, fs, background(2560, fs)),
        ];
        let token = CancellationToken::new();
        token.cancel();
        let out = run("FASST", RunOptions::default())
            .execute_subsegments(&segs, &[], &token)
            .unwrap();
        assert!(out.cancelled);
        assert!(out.events.is_empty());
        assert_eq!(out.skipped.len(), 2);
        assert!(out.skipped.iter().all(|s| s.reason == "cancelled"));
    }

    #[test]
    fn test_filters_and_minimum_duration() {
        let fs = 128.0;
        let segs = vec![
            Subsegment::new("C3", 0.0, fs, background(1280, fs)).with_stage("N2"),
            Subsegment::new("C3", 60.0, fs, background(1280, fs)).with_stage("N3"),
            Subsegment::new("C3", 120.0, fs, background(256, fs)).with_stage("n2"),
            Subsegment::new("C4", 0.0, fs, background(1280, fs)).with_stage("N2"),
        ];
        let options = RunOptions {
            channels: Some(vec!["C3".into()]),
            stages: Some(vec!["N2".into()]),
            min_subsegment_duration: 5.0,
            ..RunOptions::default()
        };
        let run = run("FASST", options);
        assert_eq!(run.select(&segs).len(), 2);
        let out = run
            .execute_subsegments(&segs, &[], &CancellationToken::new())
            .unwrap();
        assert_eq!(out.unit_stats.len(), 1);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].reason, "too_short");
    }

    #[test]
    fn test_trace_export() {
        let fs = 128.0;
        let seg = Subsegment::new("Cz", 0.0, fs, background(1280, fs));
        let options = RunOptions {
            export_traces: true,
            ..RunOptions::default()
        };
        let out = run("Moelle2011", options)
            .execute_subsegments(&[seg], &[], &CancellationToken::new())
            .unwrap();
        let names: Vec<&str> = out.traces.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["det", "filtered", "raw", "rms"]);
        assert!(out.traces.iter().all(|t| t.values.len() == 1280));

        let stages: Vec<&str> = out.unit_stats[0]
            .stages
            .iter()
            .map(|s| s.stage.as_str())
            .collect();
        assert_eq!(stages, ["transform", "detect", "export"]);
    }

    #[test]
    fn test_stage_timings_fit_in_unit_time() {
        let fs = 256.0;
        let seg = Subsegment::new("Cz", 0.0, fs, background(256 * 20, fs));
        let out = run("Nir2011", RunOptions::default())
            .execute_subsegments(&[seg], &[], &CancellationToken::new())
            .unwrap();
        let stats = &out.unit_stats[0];
        let stages: Vec<&str> = stats.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(stages, ["transform", "detect"]);
        let summed: f64 = stats.stages.iter().map(|s| s.elapsed_ms).sum();
        assert!(summed <= stats.elapsed_ms);
    }

    #[test]
    fn test_run_options_defaults_from_json() {
        let options: RunOptions =
            serde_json::from_str(r#"{"detrend": true, "merge": {"cross_channel": true}}"#).unwrap();
        assert!(options.detrend);
        assert!(options.merge.cross_channel);
        assert_eq!(options.merge.rule, MergeRule::EarliestOnset);
        assert_eq!(options.chunk_overlap, 5.0);
        assert!(RunOptions {
            chunk_seconds: Some(0.0),
            ..RunOptions::default()
        }
        .validate()
        .is_err());
    }
}
