//! Features computed over short sliding windows and resampled to the signal rate.
//!
//! Each window of `window` seconds advances by `step` seconds. The feature
//! value is placed at the window centre and linearly interpolated back to one
//! value per input sample; before the first and after the last centre the
//! nearest value is held.

use super::spectral::{band_power, periodogram};
use super::stats::mean;
use super::{check_window, window_samples};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct SlidingWindow {
    pub length: usize,
    pub step: usize,
}

impl SlidingWindow {
    pub fn from_seconds(window: f64, step: f64, sample_rate: f64) -> Self {
        Self {
            length: window_samples(window, sample_rate),
            step: window_samples(step, sample_rate),
        }
    }

    /// Start indices of all complete windows.
    pub fn starts(&self, n: usize) -> Vec<usize> {
        if self.length > n {
            return Vec::new();
        }
        (0..=n - self.length).step_by(self.step).collect()
    }

    fn centre(&self, start: usize) -> f64 {
        start as f64 + (self.length - 1) as f64 / 2.0
    }

    /// Evaluate `feature` on every window and resample to `n` points.
    pub fn apply<F>(&self, n: usize, feature: F) -> Result<Vec<f64>>
    where
        F: Fn(usize, usize) -> f64,
    {
        check_window(self.length, n, "feature")?;
        let starts = self.starts(n);
        let centres: Vec<f64> = starts.iter().map(|&s| self.centre(s)).collect();
        let values: Vec<f64> = starts
            .iter()
            .map(|&s| feature(s, s + self.length))
            .collect();
        Ok(interpolate(&centres, &values, n))
    }
}

/// Linear interpolation of `(positions, values)` onto sample indices `0..n`.
pub fn interpolate(positions: &[f64], values: &[f64], n: usize) -> Vec<f64> {
    if positions.is_empty() {
        return vec![0.0; n];
    }
    let last = positions.len() - 1;
    let mut k = 0;
    (0..n)
        .map(|i| {
            let t = i as f64;
            if t <= positions[0] {
                return values[0];
            }
            if t >= positions[last] {
                return values[last];
            }
            while positions[k + 1] < t {
                k += 1;
            }
            let span = positions[k + 1] - positions[k];
            let frac = (t - positions[k]) / span;
            values[k] + (values[k + 1] - values[k]) * frac
        })
        .collect()
}

/// Windowed mean square (absolute power).
pub fn mean_square(x: &[f64], sample_rate: f64, window: f64, step: f64) -> Result<Vec<f64>> {
    let sw = SlidingWindow::from_seconds(window, step, sample_rate);
    sw.apply(x.len(), |lo, hi| {
        x[lo..hi].iter().map(|v| v * v).sum::<f64>() / (hi - lo) as f64
    })
}

/// Settings for [`relative_power`].
#[derive(Debug, Clone, Copy)]
pub struct RelativePowerBands {
    pub low: f64,
    pub high: f64,
    pub broad_low: f64,
    pub broad_high: f64,
}

/// Ratio of in-band periodogram power to broad-band power over each window.
pub fn relative_power(
    x: &[f64],
    sample_rate: f64,
    window: f64,
    step: f64,
    bands: RelativePowerBands,
) -> Result<Vec<f64>> {
    let sw = SlidingWindow::from_seconds(window, step, sample_rate);
    sw.apply(x.len(), |lo, hi| {
        let (freqs, power) = periodogram(&x[lo..hi], sample_rate);
        let broad = band_power(&freqs, &power, bands.broad_low, bands.broad_high);
        if broad <= 0.0 {
            return 0.0;
        }
        band_power(&freqs, &power, bands.low, bands.high) / broad
    })
}

fn cov(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / a.len() as f64
}

/// Windowed covariance of two aligned signals.
pub fn covariance(
    a: &[f64],
    b: &[f64],
    sample_rate: f64,
    window: f64,
    step: f64,
) -> Result<Vec<f64>> {
    let n = a.len().min(b.len());
    let sw = SlidingWindow::from_seconds(window, step, sample_rate);
    sw.apply(n, |lo, hi| cov(&a[lo..hi], &b[lo..hi]))
}

/// Windowed Pearson correlation of two aligned signals.
pub fn correlation(
    a: &[f64],
    b: &[f64],
    sample_rate: f64,
    window: f64,
    step: f64,
) -> Result<Vec<f64>> {
    let n = a.len().min(b.len());
    let sw = SlidingWindow::from_seconds(window, step, sample_rate);
    sw.apply(n, |lo, hi| {
        let (wa, wb) = (&a[lo..hi], &b[lo..hi]);
        let denom = (cov(wa, wa) * cov(wb, wb)).sqrt();
        if denom > 0.0 {
            cov(wa, wb) / denom
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, fs: f64, n: usize, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_window_starts() {
        let sw = SlidingWindow { length: 4, step: 2 };
        assert_eq!(sw.starts(10), vec![0, 2, 4, 6]);
        assert!(sw.starts(3).is_empty());
    }

    #[test]
    fn test_interpolate_holds_edges() {
        let y = interpolate(&[2.0, 4.0], &[1.0, 3.0], 6);
        assert_eq!(y, vec![1.0, 1.0, 1.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_mean_square_of_sine() {
        let fs = 250.0;
        let x = sine(12.5, fs, 1000, 4.0);
        let y = mean_square(&x, fs, 0.4, 0.1).unwrap();
        assert!((y[500] - 8.0).abs() < 0.05);
    }

    #[test]
    fn test_correlation_and_covariance() {
        let fs = 100.0;
        let a = sine(5.0, fs, 500, 2.0);
        let b: Vec<f64> = a.iter().map(|v| 0.5 * v).collect();
        let neg: Vec<f64> = a.iter().map(|v| -v).collect();
        let r = correlation(&a, &b, fs, 0.4, 0.1).unwrap();
        assert!(r[250] > 0.999);
        let r = correlation(&a, &neg, fs, 0.4, 0.1).unwrap();
        assert!(r[250] < -0.999);
        let c = covariance(&a, &b, fs, 0.4, 0.1).unwrap();
        assert!((c[250] - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_relative_power_high_in_band() {
        let fs = 256.0;
        let bands = RelativePowerBands {
            low: 11.0,
            high: 16.0,
            broad_low: 4.5,
            broad_high: 30.0,
        };
        let x = sine(13.0, fs, 2048, 1.0);
        let y = relative_power(&x, fs, 2.0, 0.5, bands).unwrap();
        assert!(y[1024] > 0.95);
        let x = sine(6.0, fs, 2048, 1.0);
        let y = relative_power(&x, fs, 2.0, 0.5, bands).unwrap();
        assert!(y[1024] < 0.05);
    }
}
