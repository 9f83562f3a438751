//! Detection methods as static data interpreted by one executor.
//!
//! A [`MethodSpec`] lists transform [`Step`]s over named traces (the input
//! signal is always available as [`RAW`]), a [`DetectionRule`] that turns the
//! traces into events, optional [`Refinement`]s, and the parameter schema
//! that [`Value::Param`] references resolve against.

pub mod executor;
pub mod params;
pub mod registry;

use serde::Serialize;

use crate::error::{DetectionError, Result};
pub use crate::transform::filter::Transition;
use crate::transform::stats::{histogram_mode, mean, median, percentile, std};
use crate::types::EventKind;

pub use executor::{ChunkPlan, Executor, Traces};
pub use params::{Overrides, ParamKind, ParamSet, ParamSpec, HIGHCUT, LOWCUT};
pub use registry::{MethodRegistry, METHOD_REGISTRY};

/// Name of the trace holding the unprocessed input samples.
pub const RAW: &str = "raw";

/// Bins used by [`ThresholdKind::HistogramModeTimes`].
pub const HISTOGRAM_BINS: usize = 100;

/// A numeric argument of a step or threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Looked up in the run's parameters
    Param(&'static str),
    Const(f64),
    /// Midpoint of `lowcut` and `highcut`
    BandCenter,
}

impl Value {
    pub fn resolve(&self, params: &ParamSet) -> Result<f64> {
        match self {
            Value::Param(name) => params.require(name),
            Value::Const(v) => Ok(*v),
            Value::BandCenter => {
                let low = params.require(LOWCUT)?;
                let high = params.require(HIGHCUT)?;
                Ok((low + high) / 2.0)
            }
        }
    }

    /// Resolve a value used as a filter order or other count.
    pub fn resolve_count(&self, params: &ParamSet) -> Result<usize> {
        let v = self.resolve(params)?;
        if v < 0.0 || v.fract() != 0.0 {
            return Err(DetectionError::Configuration(format!(
                "expected a non-negative integer, got {}",
                v
            )));
        }
        Ok(v as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Butterworth { order: Value },
    /// Kaiser-windowed FIR with transition bands of `rolloff` Hz
    Kaiser { rolloff: Value, transition: Transition },
}

/// One transform. Durations are in seconds, frequencies in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Bandpass { low: Value, high: Value, filter: FilterKind },
    Lowpass { cutoff: Value, order: Value },
    Highpass { cutoff: Value, order: Value },
    /// Highpass then lowpass as separate zero-phase passes
    SequentialBandpass { low: Value, high: Value, order: Value },
    Rectify,
    Square,
    Envelope,
    Hilbert,
    MovingAverage { window: Value },
    MovingRms { window: Value, step: Option<Value> },
    Gaussian { sigma: Value },
    Triangular { window: Value },
    Morlet { freq: Value, sd: Value, n_sd: Value },
    RealWavelets {
        low: Value,
        high: Value,
        step: Value,
        duration: Value,
        width: Value,
        smoothing: Value,
    },
    Demodulate { freq: Value, cutoff: Value, order: Value },
    ZScore,
    TrimmedZScore,
    WindowedZScore { window: Value, trimmed: bool },
    Log10 { floor: f64 },
    MeanSquare { window: Value, step: Value },
    RelativePower {
        low: Value,
        high: Value,
        broad_low: Value,
        broad_high: Value,
        window: Value,
        step: Value,
    },
    /// Needs a second input
    Covariance { window: Value, step: Value },
    /// Needs a second input
    Correlation { window: Value, step: Value },
}

impl Op {
    pub fn needs_second_input(&self) -> bool {
        matches!(self, Op::Covariance { .. } | Op::Correlation { .. })
    }
}

/// Reads `input` (and `other` for two-signal ops) and writes `output`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Step {
    pub input: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<&'static str>,
    pub output: &'static str,
    pub op: Op,
}

impl Step {
    pub const fn new(input: &'static str, output: &'static str, op: Op) -> Self {
        Self {
            input,
            other: None,
            output,
            op,
        }
    }

    pub const fn pair(
        input: &'static str,
        other: &'static str,
        output: &'static str,
        op: Op,
    ) -> Self {
        Self {
            input,
            other: Some(other),
            output,
            op,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    Absolute,
    MeanTimes,
    MeanPlusSd,
    MedianPlusSd,
    Percentile,
    HistogramModeTimes,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub kind: ThresholdKind,
    pub value: Value,
    /// Trace the statistics come from, when not the thresholded one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basis: Option<&'static str>,
}

impl Threshold {
    pub const fn new(kind: ThresholdKind, value: Value) -> Self {
        Self {
            kind,
            value,
            basis: None,
        }
    }

    pub const fn on(mut self, basis: &'static str) -> Self {
        self.basis = Some(basis);
        self
    }

    /// Threshold value from the statistics of `data`.
    pub fn evaluate(&self, data: &[f64], params: &ParamSet) -> Result<f64> {
        let k = self.value.resolve(params)?;
        if data.is_empty() && self.kind != ThresholdKind::Absolute {
            return Err(DetectionError::InsufficientData(
                "cannot compute a threshold on an empty trace".to_string(),
            ));
        }
        Ok(match self.kind {
            ThresholdKind::Absolute => k,
            ThresholdKind::MeanTimes => mean(data) * k,
            ThresholdKind::MeanPlusSd => mean(data) + k * std(data),
            ThresholdKind::MedianPlusSd => median(data) + k * std(data),
            ThresholdKind::Percentile => percentile(data, k),
            ThresholdKind::HistogramModeTimes => histogram_mode(data, HISTOGRAM_BINS) * k,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Candidates {
    /// Contiguous runs at or above the detection threshold
    Runs,
    /// Strict local maxima above the detection threshold
    Maxima,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConjunctSignal {
    pub trace: &'static str,
    pub detection: Threshold,
    /// Falls back to `detection` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Threshold>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionRule {
    Threshold {
        trace: &'static str,
        /// Trace walked for boundaries; defaults to `trace`
        selection_trace: Option<&'static str>,
        detection: Threshold,
        selection: Option<Threshold>,
        ceiling: Option<Threshold>,
        candidates: Candidates,
    },
    Conjunctive {
        signals: &'static [ConjunctSignal],
        /// Signals whose selection thresholds bound the events
        boundary: &'static [&'static str],
    },
    ZeroCrossing { trace: &'static str },
}

impl DetectionRule {
    /// Trace used for peak location and area.
    pub fn primary_trace(&self) -> &'static str {
        match *self {
            DetectionRule::Threshold { trace, .. } => trace,
            DetectionRule::Conjunctive { signals, .. } => signals.first().map_or(RAW, |s| s.trace),
            DetectionRule::ZeroCrossing { trace } => trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Refinement {
    /// Keeps events whose in-band amplitude spectrum over the raw interval,
    /// relative to everything below `highcut`, exceeds `threshold`
    PowerRatio { threshold: Value },
    /// Fills `peak_freq` from the periodogram of the differenced raw interval
    PeakFrequency,
    /// Fills `peak_freq` like [`Refinement::PeakFrequency`] and drops events
    /// whose peak lies outside `[lowcut, highcut]`
    PeakInBand,
}

/// Upper frequency considered by [`Refinement::PeakFrequency`].
pub const MAX_FREQUENCY_OF_INTEREST: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct MethodSpec {
    pub name: &'static str,
    pub kind: EventKind,
    pub description: &'static str,
    pub reference: &'static str,
    pub params: &'static [ParamSpec],
    pub steps: &'static [Step],
    pub rule: DetectionRule,
    pub refinements: &'static [Refinement],
}

impl MethodSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Resolve caller overrides against this method's schema.
    pub fn resolve_params(&self, overrides: &Overrides) -> Result<ParamSet> {
        ParamSet::resolve(self.params, overrides)
    }

    /// Check that every trace a step or rule reads is produced earlier.
    pub fn validate(&self) -> Result<()> {
        let mut known: Vec<&str> = vec![RAW];
        let missing = |name: &str, known: &[&str]| -> Result<()> {
            if known.contains(&name) {
                Ok(())
            } else {
                Err(DetectionError::Configuration(format!(
                    "method {} reads trace '{}' before it is produced",
                    self.name, name
                )))
            }
        };
        for step in self.steps {
            missing(step.input, &known)?;
            match (step.op.needs_second_input(), step.other) {
                (true, Some(other)) => missing(other, &known)?,
                (true, None) => {
                    return Err(DetectionError::Configuration(format!(
                        "method {} step '{}' needs a second input",
                        self.name, step.output
                    )))
                }
                _ => {}
            }
            known.push(step.output);
        }

        let thresholds: Vec<(&str, Threshold)> = match self.rule {
            DetectionRule::Threshold {
                trace,
                selection_trace,
                detection,
                selection,
                ceiling,
                ..
            } => {
                missing(trace, &known)?;
                let sel_trace = selection_trace.unwrap_or(trace);
                missing(sel_trace, &known)?;
                let mut all = vec![(trace, detection)];
                all.extend(selection.map(|t| (sel_trace, t)));
                all.extend(ceiling.map(|t| (trace, t)));
                all
            }
            DetectionRule::Conjunctive { signals, boundary } => {
                if signals.is_empty() {
                    return Err(DetectionError::Configuration(format!(
                        "method {} has no conjunctive signals",
                        self.name
                    )));
                }
                for b in boundary.iter() {
                    if !signals.iter().any(|s| s.trace == *b) {
                        return Err(DetectionError::Configuration(format!(
                            "method {} boundary '{}' is not one of its signals",
                            self.name, b
                        )));
                    }
                }
                let mut all = Vec::new();
                for s in signals.iter() {
                    missing(s.trace, &known)?;
                    all.push((s.trace, s.detection));
                    all.extend(s.selection.map(|t| (s.trace, t)));
                }
                all
            }
            DetectionRule::ZeroCrossing { trace } => {
                missing(trace, &known)?;
                Vec::new()
            }
        };
        for (_, threshold) in thresholds {
            if let Some(basis) = threshold.basis {
                missing(basis, &known)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ParamSet {
        ParamSet::default()
            .with("lowcut", 11.0)
            .with("highcut", 15.0)
            .with("k", 2.0)
    }

    #[test]
    fn test_value_resolution() {
        let p = params();
        assert_eq!(Value::Const(3.5).resolve(&p).unwrap(), 3.5);
        assert_eq!(Value::Param("k").resolve(&p).unwrap(), 2.0);
        assert_eq!(Value::BandCenter.resolve(&p).unwrap(), 13.0);
        assert!(Value::Param("missing").resolve(&p).is_err());
        assert!(Value::Const(2.5).resolve_count(&p).is_err());
    }

    #[test]
    fn test_threshold_kinds() {
        let p = params();
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let eval = |kind, value| Threshold::new(kind, value).evaluate(&data, &p).unwrap();
        assert_eq!(eval(ThresholdKind::Absolute, Value::Const(7.0)), 7.0);
        assert_eq!(eval(ThresholdKind::MeanTimes, Value::Param("k")), 6.0);
        let sd = 2f64.sqrt();
        assert!((eval(ThresholdKind::MeanPlusSd, Value::Const(1.0)) - (3.0 + sd)).abs() < 1e-12);
        assert!((eval(ThresholdKind::MedianPlusSd, Value::Const(2.0)) - (3.0 + 2.0 * sd)).abs() < 1e-12);
        assert_eq!(eval(ThresholdKind::Percentile, Value::Const(50.0)), 3.0);
    }

    #[test]
    fn test_threshold_on_empty_trace() {
        let t = Threshold::new(ThresholdKind::MeanTimes, Value::Const(2.0));
        assert!(matches!(
            t.evaluate(&[], &params()),
            Err(DetectionError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_builtin_specs_are_consistent() {
        for spec in METHOD_REGISTRY {
            spec.validate().unwrap();
            ParamSet::defaults(spec.params);
        }
    }

    #[test]
    fn test_validate_rejects_unknown_trace() {
        const BROKEN: MethodSpec = MethodSpec {
            name: "Broken",
            kind: EventKind::Spindle,
            description: "",
            reference: "",
            params: &[],
            steps: &[Step::new("nowhere", "out", Op::Rectify)],
            rule: DetectionRule::ZeroCrossing { trace: "out" },
            refinements: &[],
        };
        assert!(matches!(
            BROKEN.validate(),
            Err(DetectionError::Configuration(_))
        ));
    }
}
