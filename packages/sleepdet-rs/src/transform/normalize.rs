//! Z-score normalisation, plain, trimmed, and over sliding windows.

use super::stats::{mean, percentile_sorted, std};
use super::{check_window, window_samples};
use crate::error::Result;

/// Percentiles bounding the values used for the trimmed standard deviation.
pub const TRIM_LOW: f64 = 10.0;
pub const TRIM_HIGH: f64 = 90.0;

fn scale(x: &[f64], centre: f64, sd: f64) -> Vec<f64> {
    if sd <= 0.0 || !sd.is_finite() {
        return vec![0.0; x.len()];
    }
    x.iter().map(|v| (v - centre) / sd).collect()
}

pub fn zscore(x: &[f64]) -> Vec<f64> {
    scale(x, mean(x), std(x))
}

/// Standard deviation of the values lying between the 10th and 90th percentiles.
pub fn trimmed_std(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mut sorted = x.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let lo = percentile_sorted(&sorted, TRIM_LOW);
    let hi = percentile_sorted(&sorted, TRIM_HIGH);
    let kept: Vec<f64> = sorted.into_iter().filter(|v| *v >= lo && *v <= hi).collect();
    std(&kept)
}

/// Z-score whose spread comes from the central 80% of values.
pub fn trimmed_zscore(x: &[f64]) -> Vec<f64> {
    scale(x, mean(x), trimmed_std(x))
}

/// Z-score against the mean and SD of a centred window of `window` seconds.
pub fn windowed_zscore(x: &[f64], sample_rate: f64, window: f64) -> Result<Vec<f64>> {
    let w = window_samples(window, sample_rate);
    check_window(w, x.len(), "z-score")?;
    let n = x.len();
    let mut s1 = vec![0.0; n + 1];
    let mut s2 = vec![0.0; n + 1];
    for (i, &v) in x.iter().enumerate() {
        s1[i + 1] = s1[i] + v;
        s2[i + 1] = s2[i] + v * v;
    }
    let before = (w - 1) / 2;
    let after = w - 1 - before;
    Ok((0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(n);
            let count = (hi - lo) as f64;
            let m = (s1[hi] - s1[lo]) / count;
            let var = ((s2[hi] - s2[lo]) / count - m * m).max(0.0);
            let sd = var.sqrt();
            if sd > 0.0 {
                (x[i] - m) / sd
            } else {
                0.0
            }
        })
        .collect())
}

/// Trimmed z-score against a centred window of `window` seconds.
///
/// Window statistics are evaluated at anchors spaced one thirtieth of the
/// window apart and linearly interpolated in between.
pub fn windowed_trimmed_zscore(x: &[f64], sample_rate: f64, window: f64) -> Result<Vec<f64>> {
    let w = window_samples(window, sample_rate);
    check_window(w, x.len(), "trimmed z-score")?;
    let n = x.len();
    let spacing = (w / 30).max(1);
    let before = (w - 1) / 2;
    let after = w - 1 - before;

    let mut anchors: Vec<usize> = (0..n).step_by(spacing).collect();
    if anchors.last() != Some(&(n - 1)) {
        anchors.push(n - 1);
    }
    let stats: Vec<(f64, f64)> = anchors
        .iter()
        .map(|&a| {
            let lo = a.saturating_sub(before);
            let hi = (a + after + 1).min(n);
            let slice = &x[lo..hi];
            (mean(slice), trimmed_std(slice))
        })
        .collect();

    let mut out = vec![0.0; n];
    for (k, pair) in anchors.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let (m0, s0) = stats[k];
        let (m1, s1) = stats[k + 1];
        let span = (b - a).max(1) as f64;
        for i in a..=b {
            let t = (i - a) as f64 / span;
            let m = m0 + (m1 - m0) * t;
            let sd = s0 + (s1 - s0) * t;
            out[i] = if sd > 0.0 { (x[i] - m) / sd } else { 0.0 };
        }
    }
    if anchors.len() == 1 {
        let (m, sd) = stats[0];
        out[0] = if sd > 0.0 { (x[0] - m) / sd } else { 0.0 };
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore() {
        let z = zscore(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((z[0] + 1.5).abs() < 1e-12);
        assert!((z[7] - 2.0).abs() < 1e-12);
        assert!(zscore(&[1.0; 5]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_trimmed_std_ignores_outliers() {
        let mut x: Vec<f64> = (0..100).map(|i| (i % 10) as f64).collect();
        let plain = std(&x);
        x[0] = 1e6;
        x[1] = -1e6;
        let trimmed = trimmed_std(&x);
        assert!(trimmed < plain * 1.5);
        assert!(std(&x) > 1e4);
    }

    #[test]
    fn test_windowed_zscore_removes_slow_drift() {
        let fs = 10.0;
        let x: Vec<f64> = (0..1000)
            .map(|i| i as f64 * 0.5 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let z = windowed_zscore(&x, fs, 10.0).unwrap();
        // drift dominates globally but each window is centred on the sample
        for v in &z[100..900] {
            assert!(v.abs() < 2.0);
        }
    }

    #[test]
    fn test_windowed_trimmed_zscore_constant_window() {
        let x: Vec<f64> = (0..600).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let z = windowed_trimmed_zscore(&x, 10.0, 30.0).unwrap();
        assert!((z[300] - 1.0).abs() < 0.05);
        assert!((z[301] + 1.0).abs() < 0.05);
    }
}
