//! Runs a method's steps over named traces.

use std::collections::HashMap;

use super::{FilterKind, MethodSpec, Op, ParamSet, RAW};
use crate::error::{DetectionError, Result};
use crate::transform::filter::{
    butter_bandpass, butter_highpass, butter_lowpass, demodulate, fir_bandpass,
    sequential_bandpass,
};
use crate::transform::normalize::{
    trimmed_zscore, windowed_trimmed_zscore, windowed_zscore, zscore,
};
use crate::transform::smooth::{envelope, gaussian, moving_average, moving_rms, triangular};
use crate::transform::spectral::{hilbert_amplitude, morlet_amplitude, RealWaveletBank};
use crate::transform::windowed::{
    correlation, covariance, mean_square, relative_power, RelativePowerBands,
};
use crate::transform::{log10, rectify, square, window_samples};

/// Every trace produced for one unit, keyed by step output name
pub type Traces = HashMap<&'static str, Vec<f64>>;

/// Split long inputs into chunks of `chunk` seconds, each processed with
/// `overlap` seconds of context on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlan {
    pub chunk: f64,
    pub overlap: f64,
}

/// Core regions `[start, end)` covering `0..n`. A short remainder joins the
/// previous core.
pub fn chunk_cores(n: usize, chunk: usize) -> Vec<(usize, usize)> {
    let chunk = chunk.max(1);
    let mut cores = Vec::new();
    let mut start = 0;
    while start < n {
        let end = (start + chunk).min(n);
        cores.push((start, end));
        start = end;
    }
    if cores.len() > 1 {
        let (last_start, last_end) = cores[cores.len() - 1];
        if last_end - last_start < chunk / 2 {
            cores.pop();
            if let Some(prev) = cores.last_mut() {
                prev.1 = last_end;
            }
        }
    }
    cores
}

pub struct Executor<'a> {
    spec: &'a MethodSpec,
    params: &'a ParamSet,
}

impl<'a> Executor<'a> {
    pub fn new(spec: &'a MethodSpec, params: &'a ParamSet) -> Self {
        Self { spec, params }
    }

    /// Run all steps on one contiguous signal.
    pub fn run(&self, samples: &[f64], sample_rate: f64) -> Result<Traces> {
        let mut traces = Traces::new();
        traces.insert(RAW, samples.to_vec());
        for step in self.spec.steps {
            let input = lookup(&traces, step.input, self.spec.name)?;
            let other = match step.other {
                Some(name) => Some(lookup(&traces, name, self.spec.name)?),
                None => None,
            };
            let output = apply(&step.op, input, other, sample_rate, self.params)?;
            log::trace!(
                "{}: {} -> {} ({} samples)",
                self.spec.name,
                step.input,
                step.output,
                output.len()
            );
            traces.insert(step.output, output);
        }
        Ok(traces)
    }

    /// Run in chunks and stitch each trace back together from the chunk cores.
    pub fn run_chunked(
        &self,
        samples: &[f64],
        sample_rate: f64,
        plan: Option<ChunkPlan>,
    ) -> Result<Traces> {
        let Some(plan) = plan else {
            return self.run(samples, sample_rate);
        };
        let n = samples.len();
        let chunk = window_samples(plan.chunk, sample_rate);
        if n <= chunk {
            return self.run(samples, sample_rate);
        }
        crate::profile_scope!(format!("{} chunked", self.spec.name));
        let pad = (plan.overlap.max(0.0) * sample_rate).round() as usize;
        let cores = chunk_cores(n, chunk);
        log::debug!(
            "{}: {} samples in {} chunks (pad {})",
            self.spec.name,
            n,
            cores.len(),
            pad
        );

        let mut stitched = Traces::new();
        for (start, end) in cores {
            let lo = start.saturating_sub(pad);
            let hi = (end + pad).min(n);
            let part = self.run(&samples[lo..hi], sample_rate)?;
            for (name, values) in part {
                stitched
                    .entry(name)
                    .or_insert_with(|| Vec::with_capacity(n))
                    .extend_from_slice(&values[start - lo..end - lo]);
            }
        }
        Ok(stitched)
    }
}

fn lookup<'t>(traces: &'t Traces, name: &str, method: &str) -> Result<&'t [f64]> {
    traces.get(name).map(Vec::as_slice).ok_or_else(|| {
        DetectionError::Configuration(format!("method {} has no trace named '{}'", method, name))
    })
}

fn apply(
    op: &Op,
    x: &[f64],
    other: Option<&[f64]>,
    fs: f64,
    params: &ParamSet,
) -> Result<Vec<f64>> {
    let second = || {
        other.ok_or_else(|| {
            DetectionError::Configuration("two-signal step is missing its second input".to_string())
        })
    };
    match *op {
        Op::Bandpass { low, high, filter } => {
            let (low, high) = (low.resolve(params)?, high.resolve(params)?);
            match filter {
                FilterKind::Butterworth { order } => {
                    butter_bandpass(x, fs, low, high, order.resolve_count(params)?)
                }
                FilterKind::Kaiser {
                    rolloff,
                    transition,
                } => fir_bandpass(x, fs, low, high, rolloff.resolve(params)?, transition),
            }
        }
        Op::Lowpass { cutoff, order } => butter_lowpass(
            x,
            fs,
            cutoff.resolve(params)?,
            order.resolve_count(params)?,
        ),
        Op::Highpass { cutoff, order } => butter_highpass(
            x,
            fs,
            cutoff.resolve(params)?,
            order.resolve_count(params)?,
        ),
        Op::SequentialBandpass { low, high, order } => sequential_bandpass(
            x,
            fs,
            low.resolve(params)?,
            high.resolve(params)?,
            order.resolve_count(params)?,
        ),
        Op::Rectify => Ok(rectify(x)),
        Op::Square => Ok(square(x)),
        Op::Envelope => Ok(envelope(x)),
        Op::Hilbert => Ok(hilbert_amplitude(x)),
        Op::MovingAverage { window } => moving_average(x, fs, window.resolve(params)?),
        Op::MovingRms { window, step } => {
            let step = step.map(|s| s.resolve(params)).transpose()?;
            moving_rms(x, fs, window.resolve(params)?, step)
        }
        Op::Gaussian { sigma } => gaussian(x, fs, sigma.resolve(params)?),
        Op::Triangular { window } => triangular(x, fs, window.resolve(params)?),
        Op::Morlet { freq, sd, n_sd } => {
            let sd = sd.resolve(params)?;
            if sd <= 0.0 {
                return Err(DetectionError::Configuration(format!(
                    "Morlet spectral SD must be positive, got {}",
                    sd
                )));
            }
            morlet_amplitude(x, fs, freq.resolve(params)?, sd, n_sd.resolve(params)?)
        }
        Op::RealWavelets {
            low,
            high,
            step,
            duration,
            width,
            smoothing,
        } => RealWaveletBank {
            low: low.resolve(params)?,
            high: high.resolve(params)?,
            step: step.resolve(params)?,
            duration: duration.resolve(params)?,
            width: width.resolve(params)?,
            smoothing: smoothing.resolve(params)?,
        }
        .apply(x, fs),
        Op::Demodulate {
            freq,
            cutoff,
            order,
        } => demodulate(
            x,
            fs,
            freq.resolve(params)?,
            cutoff.resolve(params)?,
            order.resolve_count(params)?,
        ),
        Op::ZScore => Ok(zscore(x)),
        Op::TrimmedZScore => Ok(trimmed_zscore(x)),
        Op::WindowedZScore { window, trimmed } => {
            let window = window.resolve(params)?;
            if trimmed {
                windowed_trimmed_zscore(x, fs, window)
            } else {
                windowed_zscore(x, fs, window)
            }
        }
        Op::Log10 { floor } => Ok(log10(x, floor)),
        Op::MeanSquare { window, step } => {
            mean_square(x, fs, window.resolve(params)?, step.resolve(params)?)
        }
        Op::RelativePower {
            low,
            high,
            broad_low,
            broad_high,
            window,
            step,
        } => relative_power(
            x,
            fs,
            window.resolve(params)?,
            step.resolve(params)?,
            RelativePowerBands {
                low: low.resolve(params)?,
                high: high.resolve(params)?,
                broad_low: broad_low.resolve(params)?,
                broad_high: broad_high.resolve(params)?,
            },
        ),
        Op::Covariance { window, step } => covariance(
            x,
            second()?,
            fs,
            window.resolve(params)?,
            step.resolve(params)?,
        ),
        Op::Correlation { window, step } => correlation(
            x,
            second()?,
            fs,
            window.resolve(params)?,
            step.resolve(params)?,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::registry::{FERRARELLI2007, LACOURSE2018};
    use crate::method::{DetectionRule, Step, Value};
    use crate::types::EventKind;
    use std::f64::consts::PI;

    const SMOOTHED: MethodSpec = MethodSpec {
        name: "Smoothed",
        kind: EventKind::Spindle,
        description: "",
        reference: "",
        params: &[],
        steps: &[
            Step::new(RAW, "squared", Op::Square),
            Step::new(
                "squared",
                "det",
                Op::MovingAverage {
                    window: Value::Const(0.5),
                },
            ),
        ],
        rule: DetectionRule::ZeroCrossing { trace: "det" },
        refinements: &[],
    };

    fn test_signal(n: usize, fs: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * 3.0 * t).sin() + 0.5 * (2.0 * PI * 0.7 * t).cos()
            })
            .collect()
    }

    #[test]
    fn test_chunk_cores() {
        assert_eq!(chunk_cores(10, 4), vec![(0, 4), (4, 10)]);
        assert_eq!(chunk_cores(12, 4), vec![(0, 4), (4, 8), (8, 12)]);
        assert_eq!(chunk_cores(3, 4), vec![(0, 3)]);
    }

    #[test]
    fn test_run_produces_every_trace() {
        let fs = 256.0;
        let params = ParamSet::defaults(FERRARELLI2007.params);
        let traces = Executor::new(&FERRARELLI2007, &params)
            .run(&test_signal(2560, fs), fs)
            .unwrap();
        for name in ["raw", "filtered", "rectified", "envelope"] {
            assert_eq!(traces[name].len(), 2560, "trace {}", name);
        }
    }

    #[test]
    fn test_chunked_run_matches_whole_run() {
        let fs = 100.0;
        let x = test_signal(3000, fs);
        let params = ParamSet::default();
        let exec = Executor::new(&SMOOTHED, &params);
        let whole = exec.run(&x, fs).unwrap();
        let chunked = exec
            .run_chunked(
                &x,
                fs,
                Some(ChunkPlan {
                    chunk: 7.0,
                    overlap: 1.0,
                }),
            )
            .unwrap();
        assert_eq!(chunked["det"].len(), whole["det"].len());
        for (a, b) in chunked["det"].iter().zip(&whole["det"]) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_short_for_lacourse_window() {
        let fs = 256.0;
        let params = ParamSet::defaults(LACOURSE2018.params);
        let err = Executor::new(&LACOURSE2018, &params)
            .run(&test_signal(256 * 10, fs), fs)
            .unwrap_err();
        assert!(err.is_skippable());
    }
}
