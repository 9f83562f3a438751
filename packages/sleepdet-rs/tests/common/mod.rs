#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Gaussian noise from a fixed seed
pub fn noise(n: usize, sd: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
            let u2: f64 = rng.random::<f64>();
            sd * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
        })
        .collect()
}

/// Slow background rhythm plus light noise, nothing in the sigma band
pub fn background(duration: f64, fs: f64, seed: u64) -> Vec<f64> {
    let n = (duration * fs).round() as usize;
    let mut x = noise(n, 0.2, seed);
    for (i, v) in x.iter_mut().enumerate() {
        let t = i as f64 / fs;
        *v += 2.0 * (2.0 * PI * 0.8 * t).sin()
            + 1.5 * (2.0 * PI * 2.1 * t + 0.4).sin()
            + 1.0 * (2.0 * PI * 3.3 * t + 1.1).sin();
    }
    x
}

/// Add a sinusoidal burst of `amp` at `freq` Hz starting at `onset` seconds
pub fn add_burst(x: &mut [f64], fs: f64, onset: f64, duration: f64, freq: f64, amp: f64) {
    let start = (onset * fs).round() as usize;
    let len = (duration * fs).round() as usize;
    for (k, v) in x.iter_mut().skip(start).take(len).enumerate() {
        *v += amp * (2.0 * PI * freq * k as f64 / fs).sin();
    }
}

/// A positive lobe followed by `periods` of (trough, positive lobe)
pub fn slow_wave_train(periods: usize, trough_amp: f64, peak_amp: f64) -> Vec<f64> {
    let half = |amp: f64, samples: usize| {
        (0..samples).map(move |k| amp * (PI * (k as f64 + 0.5) / samples as f64).sin())
    };
    let mut x: Vec<f64> = half(peak_amp, 100).collect();
    for _ in 0..periods {
        x.extend(half(-trough_amp, 50));
        x.extend(half(peak_amp, 100));
    }
    x
}
