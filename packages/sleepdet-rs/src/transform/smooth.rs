//! Sliding-window smoothers and envelopes.
//!
//! Windows are centred on each output sample. Near the edges the window is
//! truncated to the samples that exist and the weights are renormalised, so a
//! constant input always yields the same constant.

use super::{check_window, window_samples};
use crate::error::Result;

/// Centred window bounds `[lo, hi)` for a window of `w` samples at index `i`.
fn window_bounds(i: usize, w: usize, n: usize) -> (usize, usize) {
    let before = (w - 1) / 2;
    let after = w - 1 - before;
    (i.saturating_sub(before), (i + after + 1).min(n))
}

fn prefix_sums(x: &[f64]) -> Vec<f64> {
    let mut sums = Vec::with_capacity(x.len() + 1);
    sums.push(0.0);
    let mut acc = 0.0;
    for &v in x {
        acc += v;
        sums.push(acc);
    }
    sums
}

/// Flat moving average over `window` seconds.
pub fn moving_average(x: &[f64], sample_rate: f64, window: f64) -> Result<Vec<f64>> {
    let w = window_samples(window, sample_rate);
    check_window(w, x.len(), "moving average")?;
    let sums = prefix_sums(x);
    Ok((0..x.len())
        .map(|i| {
            let (lo, hi) = window_bounds(i, w, x.len());
            (sums[hi] - sums[lo]) / (hi - lo) as f64
        })
        .collect())
}

/// Moving root-mean-square over `window` seconds.
///
/// With a `step`, the signal is cut into consecutive blocks of `step`
/// seconds and every sample of a block takes the RMS of the window centred
/// on that block.
pub fn moving_rms(
    x: &[f64],
    sample_rate: f64,
    window: f64,
    step: Option<f64>,
) -> Result<Vec<f64>> {
    let w = window_samples(window, sample_rate);
    check_window(w, x.len(), "moving RMS")?;
    let n = x.len();
    let sums = prefix_sums(&super::square(x));
    let rms_at = |centre: usize| {
        let (lo, hi) = window_bounds(centre, w, n);
        ((sums[hi] - sums[lo]) / (hi - lo) as f64).sqrt()
    };

    match step {
        None => Ok((0..n).map(rms_at).collect()),
        Some(step) => {
            let s = window_samples(step, sample_rate);
            let mut out = vec![0.0; n];
            let mut start = 0;
            while start < n {
                let end = (start + s).min(n);
                let value = rms_at((start + end) / 2);
                out[start..end].iter_mut().for_each(|v| *v = value);
                start = end;
            }
            Ok(out)
        }
    }
}

/// Convolution with a symmetric kernel, renormalised where the kernel hangs off an edge.
fn weighted_centred(x: &[f64], kernel: &[f64]) -> Vec<f64> {
    let n = x.len() as isize;
    let half = (kernel.len() / 2) as isize;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            let mut weight = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let j = i + k as isize - half;
                if j >= 0 && j < n {
                    acc += w * x[j as usize];
                    weight += w;
                }
            }
            if weight > 0.0 {
                acc / weight
            } else {
                0.0
            }
        })
        .collect()
}

/// Gaussian smoothing with standard deviation `sigma` seconds, truncated at 4 sigma.
pub fn gaussian(x: &[f64], sample_rate: f64, sigma: f64) -> Result<Vec<f64>> {
    let sd = (sigma * sample_rate).max(f64::EPSILON);
    let half = (4.0 * sd).ceil() as usize;
    check_window(2 * half + 1, x.len(), "gaussian")?;
    let kernel: Vec<f64> = (0..=2 * half)
        .map(|k| {
            let t = k as f64 - half as f64;
            (-0.5 * t * t / (sd * sd)).exp()
        })
        .collect();
    Ok(weighted_centred(x, &kernel))
}

/// Convolution with a normalised triangular window of `window` seconds.
pub fn triangular(x: &[f64], sample_rate: f64, window: f64) -> Result<Vec<f64>> {
    let mut w = window_samples(window, sample_rate);
    if w % 2 == 0 {
        w += 1;
    }
    check_window(w, x.len(), "triangular")?;
    let half = (w / 2) as f64;
    let kernel: Vec<f64> = (0..w)
        .map(|k| half + 1.0 - (k as f64 - half).abs())
        .collect();
    Ok(weighted_centred(x, &kernel))
}

/// Envelope from the local maxima of the rectified signal.
///
/// Maxima are joined by straight lines and the first and last maxima are held
/// out to the edges.
pub fn envelope(x: &[f64]) -> Vec<f64> {
    let r = super::rectify(x);
    let n = r.len();
    let mut peaks = Vec::new();
    for i in 1..n.saturating_sub(1) {
        if r[i] > r[i - 1] && r[i] >= r[i + 1] {
            peaks.push(i);
        }
    }
    if peaks.is_empty() {
        return r;
    }

    let mut out = vec![0.0; n];
    let first = peaks[0];
    let last = peaks[peaks.len() - 1];
    out[..=first].iter_mut().for_each(|v| *v = r[first]);
    out[last..].iter_mut().for_each(|v| *v = r[last]);
    for pair in peaks.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let span = (b - a) as f64;
        for (i, v) in out[a..=b].iter_mut().enumerate() {
            let t = i as f64 / span;
            *v = r[a] * (1.0 - t) + r[b] * t;
        }
    }
    out
}
