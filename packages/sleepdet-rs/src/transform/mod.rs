//! Signal transforms used by the detection pipelines.
//!
//! Every function here is pure: it takes samples (and a sample rate where a
//! duration is involved) and returns a new trace of the same length.

pub mod filter;
pub mod normalize;
pub mod smooth;
pub mod spectral;
pub mod stats;
pub mod windowed;

use crate::error::{DetectionError, Result};

/// Convert a window length in seconds to a sample count (at least one sample).
pub fn window_samples(seconds: f64, sample_rate: f64) -> usize {
    ((seconds * sample_rate).round() as usize).max(1)
}

/// Fail with `InsufficientData` when a window does not fit in the signal.
pub fn check_window(window: usize, len: usize, what: &str) -> Result<()> {
    if window > len {
        return Err(DetectionError::InsufficientData(format!(
            "{} window of {} samples exceeds signal length {}",
            what, window, len
        )));
    }
    Ok(())
}

pub fn rectify(x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| v.abs()).collect()
}

pub fn square(x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| v * v).collect()
}

/// Base-10 logarithm, floored at `floor` to keep silent stretches finite.
pub fn log10(x: &[f64], floor: f64) -> Vec<f64> {
    x.iter().map(|v| v.max(floor).log10()).collect()
}

/// Remove the least-squares line from a signal.
pub fn detrend(x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n < 2 {
        return x.iter().map(|_| 0.0).collect();
    }
    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let x_mean = x.iter().sum::<f64>() / nf;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &v) in x.iter().enumerate() {
        let dt = i as f64 - t_mean;
        sxy += dt * (v - x_mean);
        sxx += dt * dt;
    }
    let slope = sxy / sxx;
    x.iter()
        .enumerate()
        .map(|(i, &v)| v - x_mean - slope * (i as f64 - t_mean))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_samples() {
        assert_eq!(window_samples(0.2, 256.0), 51);
        assert_eq!(window_samples(0.0, 256.0), 1);
        assert_eq!(window_samples(1.0, 100.0), 100);
    }

    #[test]
    fn test_check_window() {
        assert!(check_window(10, 10, "rms").is_ok());
        let err = check_window(11, 10, "rms").unwrap_err();
        assert!(matches!(err, DetectionError::InsufficientData(_)));
    }

    #[test]
    fn test_detrend_removes_line() {
        let x: Vec<f64> = (0..100).map(|i| 3.0 + 0.5 * i as f64).collect();
        let d = detrend(&x);
        assert!(d.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_log10_floor() {
        let y = log10(&[0.0, 10.0, 100.0], 1e-10);
        assert_eq!(y, vec![-10.0, 1.0, 2.0]);
    }
}
