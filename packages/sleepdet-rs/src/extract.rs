//! Threshold-based event extraction.
//!
//! Candidates come from runs (or local maxima) of the detection trace at or
//! above the detection threshold. Each candidate is widened outward while the
//! selection trace stays at or above the selection threshold, then filtered
//! by the ceiling and the duration bounds.

use crate::error::{DetectionError, Result};
use crate::method::{
    Candidates, DetectionRule, MethodSpec, ParamSet, Refinement, Threshold, Traces, HIGHCUT,
    LOWCUT, MAX_FREQUENCY_OF_INTEREST, RAW,
};
use crate::transform::spectral::periodogram;
use crate::transform::stats::argmax;
use crate::types::{Event, Subsegment};

/// Half-open sample range `[start, end)` with the index of its peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
    pub peak: usize,
}

impl Interval {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration(&self, sample_rate: f64) -> f64 {
        self.len() as f64 / sample_rate
    }
}

/// Intervals found in one unit together with the threshold values used.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub intervals: Vec<Interval>,
    pub det_value: Option<f64>,
    pub sel_value: Option<f64>,
}

/// Maximal runs of samples at or above `threshold`.
pub fn runs_above(x: &[f64], threshold: f64) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &v) in x.iter().enumerate() {
        match (v >= threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push((s, x.len()));
    }
    runs
}

/// Runs where every mask entry is true.
fn runs_of(mask: &[bool]) -> Vec<(usize, usize)> {
    let as_values: Vec<f64> = mask.iter().map(|&m| if m { 1.0 } else { 0.0 }).collect();
    runs_above(&as_values, 1.0)
}

/// Strict local maxima at or above `threshold`.
pub fn local_maxima_above(x: &[f64], threshold: f64) -> Vec<usize> {
    (1..x.len().saturating_sub(1))
        .filter(|&i| x[i] > x[i - 1] && x[i] > x[i + 1] && x[i] >= threshold)
        .collect()
}

/// Grow `[start, end)` while `keep` holds for the neighbouring sample.
fn widen<F>(start: usize, end: usize, n: usize, keep: F) -> (usize, usize)
where
    F: Fn(usize) -> bool,
{
    let mut s = start;
    while s > 0 && keep(s - 1) {
        s -= 1;
    }
    let mut e = end;
    while e < n && keep(e) {
        e += 1;
    }
    (s, e)
}

fn trace<'t>(traces: &'t Traces, name: &str) -> Result<&'t [f64]> {
    traces
        .get(name)
        .map(Vec::as_slice)
        .ok_or_else(|| DetectionError::Configuration(format!("no trace named '{}'", name)))
}

fn evaluate(
    threshold: &Threshold,
    thresholded: &[f64],
    traces: &Traces,
    params: &ParamSet,
) -> Result<f64> {
    match threshold.basis {
        Some(basis) => threshold.evaluate(trace(traces, basis)?, params),
        None => threshold.evaluate(thresholded, params),
    }
}

fn peak_of(x: &[f64], start: usize, end: usize) -> usize {
    start + argmax(&x[start..end]).unwrap_or(0)
}

/// Apply a threshold or conjunctive rule to the traces of one unit.
pub fn extract(
    rule: &DetectionRule,
    params: &ParamSet,
    traces: &Traces,
    sample_rate: f64,
) -> Result<Extraction> {
    let mut extraction = match *rule {
        DetectionRule::Threshold {
            trace: name,
            selection_trace,
            detection,
            selection,
            ceiling,
            candidates,
        } => {
            let det = trace(traces, name)?;
            let n = det.len();
            let det_value = evaluate(&detection, det, traces, params)?;

            let mut intervals: Vec<Interval> = match candidates {
                Candidates::Runs => runs_above(det, det_value)
                    .into_iter()
                    .map(|(start, end)| Interval {
                        start,
                        end,
                        peak: peak_of(det, start, end),
                    })
                    .collect(),
                Candidates::Maxima => local_maxima_above(det, det_value)
                    .into_iter()
                    .map(|p| Interval {
                        start: p,
                        end: p + 1,
                        peak: p,
                    })
                    .collect(),
            };

            let mut sel_value = None;
            if let Some(selection) = selection {
                let sel = trace(traces, selection_trace.unwrap_or(name))?;
                let value = evaluate(&selection, sel, traces, params)?;
                for iv in intervals.iter_mut() {
                    let (start, end) = widen(iv.start, iv.end, n, |i| sel[i] >= value);
                    iv.start = start;
                    iv.end = end;
                    iv.peak = peak_of(det, start, end);
                }
                sel_value = Some(value);
            }

            if let Some(ceiling) = ceiling {
                let limit = evaluate(&ceiling, det, traces, params)?;
                intervals.retain(|iv| det[iv.peak] <= limit);
            }

            Extraction {
                intervals,
                det_value: Some(det_value),
                sel_value,
            }
        }
        DetectionRule::Conjunctive { signals, boundary } => {
            let mut detected = Vec::with_capacity(signals.len());
            for signal in signals {
                let data = trace(traces, signal.trace)?;
                let value = evaluate(&signal.detection, data, traces, params)?;
                detected.push((data, value));
            }
            let Some(&(primary, det_value)) = detected.first() else {
                return Ok(Extraction::default());
            };
            let n = detected.iter().map(|(d, _)| d.len()).min().unwrap_or(0);
            let mask: Vec<bool> = (0..n)
                .map(|i| detected.iter().all(|(d, v)| d[i] >= *v))
                .collect();

            let mut bounds = Vec::with_capacity(boundary.len());
            for signal in signals.iter().filter(|s| boundary.contains(&s.trace)) {
                let data = trace(traces, signal.trace)?;
                let threshold = signal.selection.unwrap_or(signal.detection);
                bounds.push((data, evaluate(&threshold, data, traces, params)?));
            }

            let intervals = runs_of(&mask)
                .into_iter()
                .map(|(start, end)| {
                    let (start, end) = if bounds.is_empty() {
                        (start, end)
                    } else {
                        widen(start, end, n, |i| bounds.iter().all(|(d, v)| d[i] >= *v))
                    };
                    Interval {
                        start,
                        end,
                        peak: peak_of(primary, start, end),
                    }
                })
                .collect();

            Extraction {
                intervals,
                det_value: Some(det_value),
                sel_value: bounds.first().map(|(_, v)| *v),
            }
        }
        DetectionRule::ZeroCrossing { .. } => {
            return Err(DetectionError::Configuration(
                "zero-crossing rules are handled by the slow-wave validator".to_string(),
            ))
        }
    };

    let (min_dur, max_dur) = params.duration_bounds();
    extraction.intervals.retain(|iv| {
        let d = iv.duration(sample_rate);
        d >= min_dur && d <= max_dur
    });
    let primary = trace(traces, rule.primary_trace())?;
    extraction.intervals = remove_duplicates(extraction.intervals, primary);
    Ok(extraction)
}

/// Collapse intervals with identical bounds, keeping the higher peak.
pub fn remove_duplicates(mut intervals: Vec<Interval>, values: &[f64]) -> Vec<Interval> {
    intervals.sort_by_key(|iv| (iv.start, iv.end, iv.peak));
    let before = intervals.len();
    let mut out: Vec<Interval> = Vec::with_capacity(before);
    for iv in intervals {
        match out.last_mut() {
            Some(last) if last.start == iv.start && last.end == iv.end => {
                if values[iv.peak] > values[last.peak] {
                    last.peak = iv.peak;
                }
            }
            _ => out.push(iv),
        }
    }
    if out.len() < before {
        log::debug!("Removed {} duplicate events", before - out.len());
    }
    out
}

/// Mean amplitude spectrum inside `[low, high]` relative to everything up to `high`.
pub fn band_amplitude_ratio(x: &[f64], sample_rate: f64, low: f64, high: f64) -> f64 {
    let (freqs, power) = periodogram(x, sample_rate);
    let mut inside = (0.0, 0usize);
    let mut below = (0.0, 0usize);
    for (f, p) in freqs.iter().zip(&power) {
        let amp = p.sqrt();
        if *f <= high {
            below.0 += amp;
            below.1 += 1;
            if *f >= low {
                inside.0 += amp;
                inside.1 += 1;
            }
        }
    }
    if inside.1 == 0 || below.0 <= 0.0 {
        return 0.0;
    }
    (inside.0 / inside.1 as f64) / (below.0 / below.1 as f64)
}

/// Frequency of the largest periodogram peak below 50 Hz of the differenced signal.
pub fn peak_frequency(x: &[f64], sample_rate: f64) -> Option<f64> {
    if x.len() < 3 {
        return None;
    }
    let diffed: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let (freqs, power) = periodogram(&diffed, sample_rate);
    let usable = freqs
        .iter()
        .take_while(|f| **f < MAX_FREQUENCY_OF_INTEREST)
        .count();
    argmax(&power[..usable]).map(|i| freqs[i])
}

/// An accepted interval and the refinement results attached to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refined {
    pub interval: Interval,
    pub peak_freq: Option<f64>,
}

/// Run the method's refinements over the raw samples of each interval.
pub fn refine(
    intervals: Vec<Interval>,
    refinements: &[Refinement],
    raw: &[f64],
    sample_rate: f64,
    params: &ParamSet,
) -> Result<Vec<Refined>> {
    let mut refined: Vec<Refined> = intervals
        .into_iter()
        .map(|interval| Refined {
            interval,
            peak_freq: None,
        })
        .collect();
    for refinement in refinements {
        match refinement {
            Refinement::PowerRatio { threshold } => {
                let threshold = threshold.resolve(params)?;
                let (low, high) = (params.require(LOWCUT)?, params.require(HIGHCUT)?);
                refined.retain(|r| {
                    let iv = r.interval;
                    band_amplitude_ratio(&raw[iv.start..iv.end], sample_rate, low, high)
                        > threshold
                });
            }
            Refinement::PeakFrequency => {
                for r in refined.iter_mut() {
                    let iv = r.interval;
                    r.peak_freq = peak_frequency(&raw[iv.start..iv.end], sample_rate);
                }
            }
            Refinement::PeakInBand => {
                let (low, high) = (params.require(LOWCUT)?, params.require(HIGHCUT)?);
                let before = refined.len();
                refined.retain_mut(|r| {
                    let iv = r.interval;
                    r.peak_freq = peak_frequency(&raw[iv.start..iv.end], sample_rate);
                    r.peak_freq.is_some_and(|f| f >= low && f <= high)
                });
                if refined.len() < before {
                    log::debug!(
                        "Dropped {} events peaking outside {}-{} Hz",
                        before - refined.len(),
                        low,
                        high
                    );
                }
            }
        }
    }
    Ok(refined)
}

/// Turn refined intervals into events timed against `segment`.
pub fn to_events(
    refined: &[Refined],
    segment: &Subsegment,
    spec: &MethodSpec,
    primary: &[f64],
) -> Vec<Event> {
    let fs = segment.sample_rate;
    refined
        .iter()
        .map(|r| {
            let iv = r.interval;
            let mut event = Event::new(
                segment.channel.clone(),
                segment.time_at(iv.start),
                segment.time_at(iv.end - 1) + 1.0 / fs,
                spec.name,
                spec.kind,
            );
            event.peak_time = Some(segment.time_at(iv.peak));
            event.peak_value = Some(primary[iv.peak]);
            event.peak_freq = r.peak_freq;
            event.area_under_curve = Some(primary[iv.start..iv.end].iter().sum::<f64>() / fs);
            event
        })
        .collect()
}

/// Extract, refine and time the events of one threshold-rule unit.
pub fn detect_events(
    spec: &MethodSpec,
    params: &ParamSet,
    segment: &Subsegment,
    traces: &Traces,
) -> Result<(Vec<Event>, Extraction)> {
    let fs = segment.sample_rate;
    let mut extraction = extract(&spec.rule, params, traces, fs)?;
    let intervals = std::mem::take(&mut extraction.intervals);
    let refined = refine(intervals, spec.refinements, trace(traces, RAW)?, fs, params)?;
    let events = to_events(&refined, segment, spec, trace(traces, spec.rule.primary_trace())?);
    extraction.intervals = refined.iter().map(|r| r.interval).collect();
    Ok((events, extraction))
}
