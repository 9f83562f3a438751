//! Zero-crossing slow-wave validation.
//!
//! A slow wave is a negative half-wave (down-crossing to up-crossing)
//! followed by a positive half-wave that ends at the next down-crossing.
//! Half-waves cut off by either end of the subsegment are never reported.

use crate::error::{DetectionError, Result};
use crate::method::{DetectionRule, MethodSpec, ParamSet, Traces};
use crate::transform::stats::{argmax, argmin};
use crate::types::{Event, Polarity, SlowWaveMorphology, Subsegment};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlowWaveCriteria {
    pub min_trough_duration: f64,
    pub max_trough_duration: f64,
    pub max_trough_amp: f64,
    pub min_ptp: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub invert: bool,
}

impl SlowWaveCriteria {
    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let (min_duration, max_duration) = params.duration_bounds();
        Ok(Self {
            min_trough_duration: params.require("min_trough_duration")?,
            max_trough_duration: params.require("max_trough_duration")?,
            max_trough_amp: params.require("max_trough_amp")?,
            min_ptp: params.require("min_ptp")?,
            min_duration,
            max_duration,
            invert: params.flag("invert"),
        })
    }
}

/// Sample indices of one accepted wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wave {
    /// First negative sample
    pub down: usize,
    pub trough: usize,
    /// First non-negative sample
    pub up: usize,
    pub peak: usize,
    /// First negative sample of the next wave
    pub end: usize,
}

/// Find waves in `x` meeting `criteria`. With `invert` the signal is negated
/// first, so troughs are positive deflections of `x`.
pub fn find_waves(x: &[f64], sample_rate: f64, criteria: &SlowWaveCriteria) -> Vec<Wave> {
    let sign = if criteria.invert { -1.0 } else { 1.0 };
    let y: Vec<f64> = x.iter().map(|v| v * sign).collect();
    let n = y.len();
    let downs: Vec<usize> = (1..n).filter(|&i| y[i - 1] >= 0.0 && y[i] < 0.0).collect();
    let ups: Vec<usize> = (1..n).filter(|&i| y[i - 1] < 0.0 && y[i] >= 0.0).collect();

    let mut waves = Vec::new();
    for pair in downs.windows(2) {
        let (down, end) = (pair[0], pair[1]);
        let up = match ups.get(ups.partition_point(|&u| u <= down)) {
            Some(&u) if u < end => u,
            _ => continue,
        };

        let trough_duration = (up - down) as f64 / sample_rate;
        if trough_duration < criteria.min_trough_duration
            || trough_duration > criteria.max_trough_duration
        {
            continue;
        }
        let Some(trough) = argmin(&y[down..up]).map(|i| down + i) else {
            continue;
        };
        if y[trough] > criteria.max_trough_amp {
            continue;
        }
        let Some(peak) = argmax(&y[up..end]).map(|i| up + i) else {
            continue;
        };
        if y[peak] - y[trough] < criteria.min_ptp {
            continue;
        }
        let duration = (end - down) as f64 / sample_rate;
        if duration < criteria.min_duration || duration > criteria.max_duration {
            continue;
        }
        waves.push(Wave {
            down,
            trough,
            up,
            peak,
            end,
        });
    }
    waves
}

/// Validate slow waves on the method's zero-crossing trace of one unit.
pub fn detect_slow_waves(
    spec: &MethodSpec,
    params: &ParamSet,
    segment: &Subsegment,
    traces: &Traces,
) -> Result<Vec<Event>> {
    let DetectionRule::ZeroCrossing { trace } = spec.rule else {
        return Err(DetectionError::Configuration(format!(
            "method {} does not use a zero-crossing rule",
            spec.name
        )));
    };
    let x = traces
        .get(trace)
        .ok_or_else(|| DetectionError::Configuration(format!("no trace named '{}'", trace)))?;
    let criteria = SlowWaveCriteria::from_params(params)?;
    let polarity = if criteria.invert {
        Polarity::Negative
    } else {
        Polarity::Positive
    };

    let events = find_waves(x, segment.sample_rate, &criteria)
        .into_iter()
        .map(|w| {
            let mut event = Event::new(
                segment.channel.clone(),
                segment.time_at(w.down),
                segment.time_at(w.end),
                spec.name,
                spec.kind,
            );
            event.polarity = polarity;
            event.peak_time = Some(segment.time_at(w.trough));
            event.peak_value = Some(x[w.trough]);
            event.morphology = Some(SlowWaveMorphology {
                trough_time: segment.time_at(w.trough),
                trough_value: x[w.trough],
                zero_time: segment.time_at(w.up),
                peak_time: segment.time_at(w.peak),
                peak_value: x[w.peak],
                ptp: (x[w.peak] - x[w.trough]).abs(),
            });
            event
        })
        .collect();
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn half_wave(amp: f64, samples: usize) -> impl Iterator<Item = f64> {
        (0..samples).map(move |k| amp * (PI * (k as f64 + 0.5) / samples as f64).sin())
    }

    /// Positive lobe, then three (trough, positive lobe) periods.
    fn wave_train() -> Vec<f64> {
        let mut x: Vec<f64> = half_wave(50.0, 100).collect();
        for _ in 0..3 {
            x.extend(half_wave(-100.0, 50));
            x.extend(half_wave(50.0, 100));
        }
        x
    }

    fn massimini() -> SlowWaveCriteria {
        SlowWaveCriteria {
            min_trough_duration: 0.3,
            max_trough_duration: 1.0,
            max_trough_amp: -80.0,
            min_ptp: 140.0,
            min_duration: 0.0,
            max_duration: f64::INFINITY,
            invert: false,
        }
    }

    #[test]
    fn test_finds_complete_waves_only() {
        let waves = find_waves(&wave_train(), 100.0, &massimini());
        // the last trough has no following down-crossing
        assert_eq!(waves.len(), 2);
        let w = waves[0];
        assert_eq!((w.down, w.up, w.end), (100, 150, 250));
        assert!((124..=125).contains(&w.trough));
        assert!((199..=200).contains(&w.peak));
    }

    #[test]
    fn test_amplitude_criteria() {
        let x = wave_train();
        let strict = SlowWaveCriteria {
            min_ptp: 200.0,
            ..massimini()
        };
        assert!(find_waves(&x, 100.0, &strict).is_empty());
        let shallow = SlowWaveCriteria {
            max_trough_amp: -120.0,
            ..massimini()
        };
        assert!(find_waves(&x, 100.0, &shallow).is_empty());
    }

    #[test]
    fn test_duration_criteria() {
        let x = wave_train();
        let short = SlowWaveCriteria {
            max_trough_duration: 0.4,
            ..massimini()
        };
        assert!(find_waves(&x, 100.0, &short).is_empty());
        let total = SlowWaveCriteria {
            max_duration: 1.2,
            ..massimini()
        };
        assert!(find_waves(&x, 100.0, &total).is_empty());
    }

    #[test]
    fn test_inverted_detection() {
        let criteria = SlowWaveCriteria {
            max_trough_amp: -40.0,
            invert: true,
            ..massimini()
        };
        let waves = find_waves(&wave_train(), 100.0, &criteria);
        assert_eq!(waves.len(), 2);
        assert_eq!((waves[0].down, waves[0].up, waves[0].end), (150, 250, 300));
    }
}
