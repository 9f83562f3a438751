//! Zero-phase digital filters.
//!
//! IIR filters are Butterworth designs realised as cascaded second-order
//! sections (biquads) for numerical stability. FIR bandpass filters use a
//! Kaiser-windowed sinc with an explicit transition width. Both are applied
//! forward and backward so the output has no phase delay.

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::spectral::convolve_same;
use crate::error::{DetectionError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
}

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Direct Form II Transposed state for a constant input `level`.
    fn steady_state(&self, level: f64) -> (f64, f64) {
        let g = self.dc_gain();
        let z2 = (self.b2 - self.a2 * g) * level;
        let z1 = (self.b1 - self.a1 * g) * level + z2;
        (z1, z2)
    }

    fn response(&self, omega: f64) -> (f64, f64) {
        // |B(e^jw)|, |A(e^jw)|
        let (c1, s1) = (omega.cos(), omega.sin());
        let (c2, s2) = ((2.0 * omega).cos(), (2.0 * omega).sin());
        let b_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let b_im = -(self.b1 * s1 + self.b2 * s2);
        let a_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let a_im = -(self.a1 * s1 + self.a2 * s2);
        (b_re.hypot(b_im), a_re.hypot(a_im))
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }

    /// Minimum edge padding used by [`SosFilter::filtfilt`].
    pub fn padlen(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Samples needed for the slowest pole to decay by 60 dB.
    pub fn settling_samples(&self) -> usize {
        let radius = self
            .sections
            .iter()
            .map(|s| {
                let disc = s.a1 * s.a1 - 4.0 * s.a2;
                if disc < 0.0 {
                    s.a2.sqrt()
                } else {
                    let root = disc.sqrt();
                    ((-s.a1 + root) / 2.0).abs().max(((-s.a1 - root) / 2.0).abs())
                }
            })
            .fold(0.0f64, f64::max);
        if radius <= 0.0 || radius >= 1.0 {
            return 0;
        }
        ((1e-3f64).ln() / radius.ln()).ceil() as usize
    }

    /// Single causal pass starting from rest.
    pub fn filter(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        for s in &self.sections {
            let (mut z1, mut z2) = (0.0, 0.0);
            for v in out.iter_mut() {
                let y = s.b0 * *v + z1;
                z1 = s.b1 * *v - s.a1 * y + z2;
                z2 = s.b2 * *v - s.a2 * y;
                *v = y;
            }
        }
        out
    }

    /// Causal pass with every section initialised to its steady state for the first sample.
    fn filter_settled(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        let mut level = signal.first().copied().unwrap_or(0.0);
        for s in &self.sections {
            let (mut z1, mut z2) = s.steady_state(level);
            for v in out.iter_mut() {
                let y = s.b0 * *v + z1;
                z1 = s.b1 * *v - s.a1 * y + z2;
                z2 = s.b2 * *v - s.a2 * y;
                *v = y;
            }
            level *= s.dc_gain();
        }
        out
    }

    /// Forward-backward filtering with odd-reflection padding.
    ///
    /// Padding is extended to the filter's settling time when the signal allows.
    pub fn filtfilt(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let required = self.padlen();
        if signal.len() <= required {
            return Err(DetectionError::InsufficientData(format!(
                "signal of {} samples is too short for filter padding of {}",
                signal.len(),
                required
            )));
        }
        let padlen = required.max(self.settling_samples()).min(signal.len() - 1);
        let padded = odd_extend(signal, padlen)?;

        let forward = self.filter_settled(&padded);
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let mut backward = self.filter_settled(&reversed);
        backward.reverse();

        Ok(backward[padlen..padlen + signal.len()].to_vec())
    }

    /// Magnitude response of a single pass at `freq`.
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let omega = 2.0 * PI * freq / sample_rate;
        self.sections
            .iter()
            .map(|s| {
                let (num, den) = s.response(omega);
                num / den
            })
            .product()
    }
}

fn odd_extend(signal: &[f64], padlen: usize) -> Result<Vec<f64>> {
    let n = signal.len();
    if n <= padlen {
        return Err(DetectionError::InsufficientData(format!(
            "signal of {} samples is too short for filter padding of {}",
            n, padlen
        )));
    }
    let first = signal[0];
    let last = signal[n - 1];
    let mut out = Vec::with_capacity(n + 2 * padlen);
    out.extend((1..=padlen).rev().map(|i| 2.0 * first - signal[i]));
    out.extend_from_slice(signal);
    out.extend((1..=padlen).map(|i| 2.0 * last - signal[n - 1 - i]));
    Ok(out)
}

fn validate_cutoff(freq: f64, sample_rate: f64, label: &str) -> Result<()> {
    let nyquist = sample_rate / 2.0;
    if !(freq > 0.0) {
        return Err(DetectionError::FilterDesign(format!(
            "{} cutoff ({} Hz) must be positive",
            label, freq
        )));
    }
    if freq >= nyquist {
        return Err(DetectionError::FilterDesign(format!(
            "{} cutoff ({} Hz) must be less than Nyquist ({} Hz)",
            label, freq, nyquist
        )));
    }
    Ok(())
}

fn validate_order(order: usize) -> Result<()> {
    if order == 0 {
        return Err(DetectionError::FilterDesign(
            "filter order must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Butterworth filter designer
pub struct ButterworthFilter;

impl ButterworthFilter {
    pub fn lowpass(cutoff: f64, sample_rate: f64, order: usize) -> Result<SosFilter> {
        validate_cutoff(cutoff, sample_rate, "Lowpass")?;
        validate_order(order)?;
        let wn = Self::prewarp(cutoff, sample_rate);
        Ok(SosFilter::new(Self::design(wn, order, FilterType::Lowpass)))
    }

    pub fn highpass(cutoff: f64, sample_rate: f64, order: usize) -> Result<SosFilter> {
        validate_cutoff(cutoff, sample_rate, "Highpass")?;
        validate_order(order)?;
        let wn = Self::prewarp(cutoff, sample_rate);
        Ok(SosFilter::new(Self::design(wn, order, FilterType::Highpass)))
    }

    /// Bandpass from the analog lowpass-to-bandpass transform.
    ///
    /// The design has `order` sections (twice the prototype order), each with
    /// zeros at DC and Nyquist, scaled to unit gain at the band centre.
    pub fn bandpass(low: f64, high: f64, sample_rate: f64, order: usize) -> Result<SosFilter> {
        validate_cutoff(low, sample_rate, "Low")?;
        validate_cutoff(high, sample_rate, "High")?;
        validate_order(order)?;
        if low >= high {
            return Err(DetectionError::FilterDesign(format!(
                "Low cutoff ({} Hz) must be less than high cutoff ({} Hz)",
                low, high
            )));
        }
        let w1 = Self::prewarp(low, sample_rate);
        let w2 = Self::prewarp(high, sample_rate);
        let bw = w2 - w1;
        let w0_sq = w1 * w2;

        let mut upper = Vec::with_capacity(order);
        let mut real = Vec::new();
        for k in 0..order {
            let theta = PI * (2.0 * k as f64 + order as f64 + 1.0) / (2.0 * order as f64);
            let p = Complex::new(theta.cos(), theta.sin());
            let disc = (p * p * bw * bw - 4.0 * w0_sq).sqrt();
            for s in [(p * bw + disc) / 2.0, (p * bw - disc) / 2.0] {
                let z = (1.0 + s) / (1.0 - s);
                if z.im > 1e-12 {
                    upper.push(z);
                } else if z.im.abs() <= 1e-12 {
                    real.push(z.re);
                }
            }
        }

        let mut sections: Vec<BiquadCoeffs> = upper
            .iter()
            .map(|z| BiquadCoeffs {
                b0: 1.0,
                b1: 0.0,
                b2: -1.0,
                a1: -2.0 * z.re,
                a2: z.norm_sqr(),
            })
            .collect();
        for pair in real.chunks(2) {
            let (r1, r2) = (pair[0], pair.get(1).copied().unwrap_or(0.0));
            sections.push(BiquadCoeffs {
                b0: 1.0,
                b1: 0.0,
                b2: -1.0,
                a1: -(r1 + r2),
                a2: r1 * r2,
            });
        }

        let centre = 2.0 * w0_sq.sqrt().atan();
        for s in sections.iter_mut() {
            let (num, den) = s.response(centre);
            let g = den / num;
            s.b0 *= g;
            s.b1 *= g;
            s.b2 *= g;
        }
        Ok(SosFilter::new(sections))
    }

    /// Prewarp frequency for bilinear transform
    fn prewarp(freq: f64, sample_rate: f64) -> f64 {
        (PI * freq / sample_rate).tan()
    }

    fn design(wn: f64, order: usize, filter_type: FilterType) -> Vec<BiquadCoeffs> {
        let num_sections = order.div_ceil(2);
        let mut sections = Vec::with_capacity(num_sections);
        let wn2 = wn * wn;

        for k in 0..num_sections {
            // For odd order, last section holds the real pole
            if order % 2 == 1 && k == num_sections - 1 {
                let a1 = (wn - 1.0) / (wn + 1.0);
                let coeffs = match filter_type {
                    FilterType::Highpass => {
                        let g = 1.0 / (1.0 + wn);
                        BiquadCoeffs { b0: g, b1: -g, b2: 0.0, a1, a2: 0.0 }
                    }
                    _ => {
                        let g = wn / (1.0 + wn);
                        BiquadCoeffs { b0: g, b1: g, b2: 0.0, a1, a2: 0.0 }
                    }
                };
                sections.push(coeffs);
                continue;
            }

            // conjugate pole pair: s^2 + 2 sin(theta) s + 1
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
            let damping = 2.0 * theta.sin();
            let denom = 1.0 + damping * wn + wn2;
            let a1 = 2.0 * (wn2 - 1.0) / denom;
            let a2 = (1.0 - damping * wn + wn2) / denom;

            let coeffs = match filter_type {
                FilterType::Highpass => BiquadCoeffs {
                    b0: 1.0 / denom,
                    b1: -2.0 / denom,
                    b2: 1.0 / denom,
                    a1,
                    a2,
                },
                _ => BiquadCoeffs {
                    b0: wn2 / denom,
                    b1: 2.0 * wn2 / denom,
                    b2: wn2 / denom,
                    a1,
                    a2,
                },
            };
            sections.push(coeffs);
        }

        sections
    }
}

/// Where a FIR bandpass puts its transition bands relative to `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Flat passband over the whole of `[low, high]`; the band edges start to
    /// roll off beyond it.
    Outside,
    /// `low` and `high` are stopband edges. Everything outside the band is
    /// attenuated, and the flat passband is `rolloff` narrower on each side.
    Inside,
}

/// Linear-phase FIR filter
#[derive(Debug, Clone)]
pub struct FirFilter {
    taps: Vec<f64>,
}

/// Stopband attenuation targeted by the Kaiser design, in dB.
const KAISER_ATTENUATION_DB: f64 = 60.0;

impl FirFilter {
    /// Kaiser-windowed sinc bandpass over `[low, high]` with `rolloff` Hz
    /// transition bands placed according to `transition`.
    pub fn kaiser_bandpass(
        low: f64,
        high: f64,
        rolloff: f64,
        transition: Transition,
        sample_rate: f64,
    ) -> Result<Self> {
        validate_cutoff(low, sample_rate, "Low")?;
        validate_cutoff(high, sample_rate, "High")?;
        if low >= high {
            return Err(DetectionError::FilterDesign(format!(
                "Low cutoff ({} Hz) must be less than high cutoff ({} Hz)",
                low, high
            )));
        }
        if !(rolloff > 0.0) {
            return Err(DetectionError::FilterDesign(format!(
                "Transition width ({} Hz) must be positive",
                rolloff
            )));
        }
        let (f1, f2) = match transition {
            Transition::Outside => (low - rolloff / 2.0, high + rolloff / 2.0),
            Transition::Inside => {
                if high - low <= rolloff {
                    return Err(DetectionError::FilterDesign(format!(
                        "Transition width ({} Hz) leaves no passband inside {}-{} Hz",
                        rolloff, low, high
                    )));
                }
                (low + rolloff / 2.0, high - rolloff / 2.0)
            }
        };
        validate_cutoff(f1, sample_rate, "Low transition edge")?;
        validate_cutoff(f2, sample_rate, "High transition edge")?;

        let beta = 0.1102 * (KAISER_ATTENUATION_DB - 8.7);
        let delta_w = 2.0 * PI * rolloff / sample_rate;
        let mut n = ((KAISER_ATTENUATION_DB - 7.95) / (2.285 * delta_w)).ceil() as usize + 1;
        if n % 2 == 0 {
            n += 1;
        }

        let m = (n - 1) as f64 / 2.0;
        let (c1, c2) = (f1 / sample_rate, f2 / sample_rate);
        let i0_beta = bessel_i0(beta);
        let mut taps: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 - m;
                let ideal = 2.0 * c2 * sinc(2.0 * c2 * t) - 2.0 * c1 * sinc(2.0 * c1 * t);
                let r = t / m;
                let window = bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / i0_beta;
                ideal * window
            })
            .collect();

        // unit gain at band centre
        let centre = (low + high) / 2.0;
        let gain: f64 = taps
            .iter()
            .enumerate()
            .map(|(i, h)| h * (2.0 * PI * centre / sample_rate * (i as f64 - m)).cos())
            .sum();
        if gain.abs() < f64::EPSILON {
            return Err(DetectionError::FilterDesign(
                "FIR design produced zero passband gain".to_string(),
            ));
        }
        for h in taps.iter_mut() {
            *h /= gain;
        }

        Ok(Self { taps })
    }

    pub fn taps(&self) -> &[f64] {
        &self.taps
    }

    pub fn padlen(&self) -> usize {
        self.taps.len()
    }

    /// Forward-backward filtering: the squared magnitude response with zero phase.
    pub fn filtfilt(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let padlen = self.padlen();
        let padded = odd_extend(signal, padlen)?;
        // symmetric taps: the centred convolution is already its own time reverse
        let once = convolve_same(&padded, &self.taps);
        let twice = convolve_same(&once, &self.taps);
        Ok(twice[padlen..padlen + signal.len()].to_vec())
    }

    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let m = (self.taps.len() - 1) as f64 / 2.0;
        self.taps
            .iter()
            .enumerate()
            .map(|(i, h)| h * (2.0 * PI * freq / sample_rate * (i as f64 - m)).cos())
            .sum::<f64>()
            .abs()
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Zeroth-order modified Bessel function of the first kind.
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    loop {
        term *= (half / k) * (half / k);
        sum += term;
        if term < 1e-14 * sum {
            break;
        }
        k += 1.0;
    }
    sum
}

/// Zero-phase Butterworth bandpass.
pub fn butter_bandpass(
    x: &[f64],
    sample_rate: f64,
    low: f64,
    high: f64,
    order: usize,
) -> Result<Vec<f64>> {
    ButterworthFilter::bandpass(low, high, sample_rate, order)?.filtfilt(x)
}

pub fn butter_lowpass(x: &[f64], sample_rate: f64, cutoff: f64, order: usize) -> Result<Vec<f64>> {
    ButterworthFilter::lowpass(cutoff, sample_rate, order)?.filtfilt(x)
}

pub fn butter_highpass(x: &[f64], sample_rate: f64, cutoff: f64, order: usize) -> Result<Vec<f64>> {
    ButterworthFilter::highpass(cutoff, sample_rate, order)?.filtfilt(x)
}

/// Highpass then lowpass as two separate zero-phase passes.
///
/// Keeps very low corner frequencies stable where a single cascade would not.
pub fn sequential_bandpass(
    x: &[f64],
    sample_rate: f64,
    low: f64,
    high: f64,
    order: usize,
) -> Result<Vec<f64>> {
    if low >= high {
        return Err(DetectionError::FilterDesign(format!(
            "Low cutoff ({} Hz) must be less than high cutoff ({} Hz)",
            low, high
        )));
    }
    let highpassed = butter_highpass(x, sample_rate, low, order)?;
    butter_lowpass(&highpassed, sample_rate, high, order)
}

/// Zero-phase Kaiser FIR bandpass.
pub fn fir_bandpass(
    x: &[f64],
    sample_rate: f64,
    low: f64,
    high: f64,
    rolloff: f64,
    transition: Transition,
) -> Result<Vec<f64>> {
    FirFilter::kaiser_bandpass(low, high, rolloff, transition, sample_rate)?.filtfilt(x)
}

/// Instantaneous amplitude by complex demodulation at `freq`.
///
/// The signal is shifted to baseband, both quadratures are lowpassed at
/// `cutoff`, and the magnitude is doubled back to the oscillation amplitude.
pub fn demodulate(
    x: &[f64],
    sample_rate: f64,
    freq: f64,
    cutoff: f64,
    order: usize,
) -> Result<Vec<f64>> {
    validate_cutoff(freq, sample_rate, "Demodulation")?;
    let lowpass = ButterworthFilter::lowpass(cutoff, sample_rate, order)?;
    let (re, im): (Vec<f64>, Vec<f64>) = x
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let phase = 2.0 * PI * freq * i as f64 / sample_rate;
            (v * phase.cos(), -v * phase.sin())
        })
        .unzip();
    let re = lowpass.filtfilt(&re)?;
    let im = lowpass.filtfilt(&im)?;
    Ok(re
        .iter()
        .zip(&im)
        .map(|(a, b)| 2.0 * a.hypot(*b))
        .collect())
}
