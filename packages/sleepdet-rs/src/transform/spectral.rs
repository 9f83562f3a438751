//! FFT-based transforms: convolution, analytic amplitude, wavelets, periodogram.

use rustfft::{num_complex::Complex, FftPlanner};
use std::cell::RefCell;
use std::f64::consts::PI;

use super::{check_window, window_samples};
use crate::error::{DetectionError, Result};

thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

/// Kernels at or below this length are convolved directly.
const DIRECT_CONVOLUTION_MAX: usize = 64;

fn fft_in_place(buffer: &mut [Complex<f64>], inverse: bool) {
    FFT_PLANNER.with(|planner| {
        let mut planner = planner.borrow_mut();
        let fft = if inverse {
            planner.plan_fft_inverse(buffer.len())
        } else {
            planner.plan_fft_forward(buffer.len())
        };
        fft.process(buffer);
    });
}

/// Full linear convolution of two complex sequences.
pub fn fft_convolve_full(a: &[Complex<f64>], b: &[Complex<f64>]) -> Vec<Complex<f64>> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let n_out = a.len() + b.len() - 1;
    let n_fft = n_out.next_power_of_two();

    let mut fa = vec![Complex::new(0.0, 0.0); n_fft];
    fa[..a.len()].copy_from_slice(a);
    let mut fb = vec![Complex::new(0.0, 0.0); n_fft];
    fb[..b.len()].copy_from_slice(b);

    fft_in_place(&mut fa, false);
    fft_in_place(&mut fb, false);
    for (x, y) in fa.iter_mut().zip(fb.iter()) {
        *x *= *y;
    }
    fft_in_place(&mut fa, true);

    let scale = 1.0 / n_fft as f64;
    fa.truncate(n_out);
    for v in fa.iter_mut() {
        *v *= scale;
    }
    fa
}

/// Convolution of a real signal with a complex kernel, centred to the signal length.
pub fn convolve_same_complex(x: &[f64], kernel: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let xc: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let full = fft_convolve_full(&xc, kernel);
    centre(&full, x.len(), kernel.len())
}

/// Convolution of two real sequences, centred to the length of `x`.
pub fn convolve_same(x: &[f64], kernel: &[f64]) -> Vec<f64> {
    if x.is_empty() || kernel.is_empty() {
        return vec![0.0; x.len()];
    }
    if kernel.len() <= DIRECT_CONVOLUTION_MAX {
        let offset = (kernel.len() - 1) / 2;
        return (0..x.len())
            .map(|i| {
                let mut acc = 0.0;
                for (k, &w) in kernel.iter().enumerate() {
                    // full index i + offset, contributes x[i + offset - k]
                    let j = i + offset;
                    if j >= k && j - k < x.len() {
                        acc += w * x[j - k];
                    }
                }
                acc
            })
            .collect();
    }
    let xc: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let kc: Vec<Complex<f64>> = kernel.iter().map(|&v| Complex::new(v, 0.0)).collect();
    let full = fft_convolve_full(&xc, &kc);
    centre(&full, x.len(), kernel.len())
        .into_iter()
        .map(|c| c.re)
        .collect()
}

fn centre<T: Copy>(full: &[T], len: usize, kernel_len: usize) -> Vec<T> {
    let start = (kernel_len - 1) / 2;
    full[start..start + len].to_vec()
}

/// Magnitude of the analytic signal.
pub fn hilbert_amplitude(x: &[f64]) -> Vec<f64> {
    analytic_signal(x).iter().map(|c| c.norm()).collect()
}

pub fn analytic_signal(x: &[f64]) -> Vec<Complex<f64>> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fft_in_place(&mut buf, false);

    // one-sided spectrum: keep DC (and Nyquist for even n), double positive bins
    let half = n / 2;
    for (k, v) in buf.iter_mut().enumerate() {
        let h = if k == 0 || (n % 2 == 0 && k == half) {
            1.0
        } else if k < n.div_ceil(2) {
            2.0
        } else {
            0.0
        };
        *v *= h;
    }
    fft_in_place(&mut buf, true);
    let scale = 1.0 / n as f64;
    buf.iter().map(|c| *c * scale).collect()
}

/// Complex Morlet wavelet centred on `f0`.
///
/// `sd` is the spectral standard deviation in Hz and `n_sd` the half-length of
/// the kernel in temporal standard deviations.
pub fn morlet_kernel(f0: f64, sd: f64, sample_rate: f64, n_sd: f64) -> Vec<Complex<f64>> {
    let st = 1.0 / (2.0 * PI * sd);
    let half = (n_sd * st * sample_rate).floor() as i64;
    let norm = (PI.sqrt() * st * sample_rate).sqrt();
    (-half..=half)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let envelope = (-t * t / (2.0 * st * st)).exp();
            let phase = 2.0 * PI * f0 * t;
            Complex::new(phase.cos(), phase.sin()) * (envelope / norm)
        })
        .collect()
}

/// Amplitude of the complex Morlet transform at one frequency.
pub fn morlet_amplitude(
    x: &[f64],
    sample_rate: f64,
    f0: f64,
    sd: f64,
    n_sd: f64,
) -> Result<Vec<f64>> {
    let kernel = morlet_kernel(f0, sd, sample_rate, n_sd);
    check_window(kernel.len(), x.len(), "morlet")?;
    Ok(convolve_same_complex(x, &kernel)
        .iter()
        .map(|c| c.norm())
        .collect())
}

/// Tukey (tapered cosine) window over `len` points.
pub fn tukey(len: usize, alpha: f64) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len)
        .map(|i| {
            let x = i as f64 / (len - 1) as f64;
            if x < alpha / 2.0 {
                0.5 * (1.0 + (2.0 * PI / alpha * (x - alpha / 2.0)).cos())
            } else if x >= 1.0 - alpha / 2.0 {
                0.5 * (1.0 + (2.0 * PI / alpha * (x - 1.0 + alpha / 2.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}

/// Settings for the real cosine-Gaussian wavelet bank.
#[derive(Debug, Clone, Copy)]
pub struct RealWaveletBank {
    pub low: f64,
    pub high: f64,
    pub step: f64,
    /// Kernel duration in seconds
    pub duration: f64,
    /// Gaussian width parameter in seconds
    pub width: f64,
    /// Tukey smoothing window in seconds
    pub smoothing: f64,
}

impl RealWaveletBank {
    pub fn frequencies(&self) -> Vec<f64> {
        let mut freqs = Vec::new();
        let mut f = self.low;
        while f < self.high + self.step - 1e-9 {
            freqs.push(f);
            f += self.step;
        }
        freqs
    }

    pub fn kernel(&self, freq: f64, sample_rate: f64) -> Vec<f64> {
        let n = (self.duration * sample_rate).round() as usize;
        (0..n)
            .map(|i| {
                let t = -self.duration / 2.0 + i as f64 / sample_rate;
                let g = (-PI * t * t / (self.width * self.width)).exp();
                (2.0 * PI * freq * t).cos() * g
            })
            .collect()
    }

    /// Band-averaged, Tukey-smoothed rectified wavelet response.
    pub fn apply(&self, x: &[f64], sample_rate: f64) -> Result<Vec<f64>> {
        if self.step <= 0.0 || self.high < self.low {
            return Err(DetectionError::Configuration(format!(
                "invalid wavelet bank {}-{} Hz step {}",
                self.low, self.high, self.step
            )));
        }
        let kernel_len = (self.duration * sample_rate).round() as usize;
        check_window(kernel_len, x.len(), "wavelet")?;
        let win = window_samples(self.smoothing, sample_rate);
        check_window(win, x.len(), "wavelet smoothing")?;

        let taper = tukey(win, 0.5);
        let taper_sum: f64 = taper.iter().sum();
        let taper: Vec<f64> = taper.iter().map(|w| w / taper_sum).collect();

        let freqs = self.frequencies();
        let mut acc = vec![0.0; x.len()];
        for &f in &freqs {
            let response: Vec<f64> = convolve_same(x, &self.kernel(f, sample_rate))
                .iter()
                .map(|v| v.abs())
                .collect();
            let smoothed = convolve_same(&response, &taper);
            for (a, s) in acc.iter_mut().zip(smoothed) {
                *a += s;
            }
        }
        let n = freqs.len().max(1) as f64;
        Ok(acc.into_iter().map(|v| v / n).collect())
    }
}

/// One-sided amplitude spectrum of a boxcar-windowed segment.
///
/// Returns `(frequencies, power)` where power is in signal units squared.
pub fn periodogram(x: &[f64], sample_rate: f64) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let m = x.iter().sum::<f64>() / n as f64;
    let mut buf: Vec<Complex<f64>> = x.iter().map(|&v| Complex::new(v - m, 0.0)).collect();
    fft_in_place(&mut buf, false);

    let n_pos = n / 2 + 1;
    let freqs = (0..n_pos).map(|k| k as f64 * sample_rate / n as f64).collect();
    let power = (0..n_pos)
        .map(|k| {
            let p = buf[k].norm_sqr() / (n as f64 * n as f64);
            // fold negative frequencies except DC and Nyquist
            if k == 0 || (n % 2 == 0 && k == n / 2) {
                p
            } else {
                2.0 * p
            }
        })
        .collect();
    (freqs, power)
}

/// Summed periodogram power between `low` and `high` inclusive.
pub fn band_power(freqs: &[f64], power: &[f64], low: f64, high: f64) -> f64 {
    freqs
        .iter()
        .zip(power)
        .filter(|(f, _)| **f >= low && **f <= high)
        .map(|(_, p)| *p)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amp * (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_convolve_same_matches_direct() {
        let x: Vec<f64> = (0..300).map(|i| ((i * 7) % 11) as f64).collect();
        let kernel: Vec<f64> = (0..101).map(|i| 1.0 / (1.0 + i as f64)).collect();
        let fft = convolve_same(&x, &kernel);

        let offset = (kernel.len() - 1) / 2;
        for i in [0usize, 17, 150, 299] {
            let mut direct = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let j = i + offset;
                if j >= k && j - k < x.len() {
                    direct += w * x[j - k];
                }
            }
            assert!((fft[i] - direct).abs() < 1e-8, "mismatch at {}", i);
        }
    }

    #[test]
    fn test_hilbert_amplitude_of_sine() {
        let x = sine(10.0, 256.0, 1024, 3.0);
        let amp = hilbert_amplitude(&x);
        for v in &amp[100..900] {
            assert!((v - 3.0).abs() < 0.05, "amplitude {}", v);
        }
    }

    #[test]
    fn test_morlet_responds_in_band() {
        let fs = 256.0;
        let in_band = morlet_amplitude(&sine(13.0, fs, 2048, 1.0), fs, 13.0, 0.8, 3.0).unwrap();
        let out_band = morlet_amplitude(&sine(4.0, fs, 2048, 1.0), fs, 13.0, 0.8, 3.0).unwrap();
        let mid = 1024;
        assert!(in_band[mid] > 10.0 * out_band[mid]);
    }

    #[test]
    fn test_morlet_kernel_length() {
        let kernel = morlet_kernel(13.0, 0.8, 256.0, 1.0);
        // st = 1/(2π·0.8) ≈ 0.199 s → floor(50.9) = 50 half-width
        assert_eq!(kernel.len(), 101);
    }

    #[test]
    fn test_tukey_shape() {
        let w = tukey(11, 0.5);
        assert!(w[0].abs() < 1e-12);
        assert!(w[10].abs() < 1e-12);
        assert!((w[5] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_real_wavelet_bank_frequencies() {
        let bank = RealWaveletBank {
            low: 10.0,
            high: 16.0,
            step: 0.5,
            duration: 1.0,
            width: 0.5,
            smoothing: 0.5,
        };
        let freqs = bank.frequencies();
        assert_eq!(freqs.len(), 13);
        assert!((freqs[12] - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_periodogram_peak() {
        let fs = 200.0;
        let x = sine(20.0, fs, 400, 2.0);
        let (f, p) = periodogram(&x, fs);
        let idx = crate::transform::stats::argmax(&p).unwrap();
        assert!((f[idx] - 20.0).abs() < 1e-9);
        // a sine of amplitude A has total power A²/2
        assert!((p.iter().sum::<f64>() - 2.0).abs() < 1e-6);
    }
}
