//! Butterworth filtering: low-pass, high-pass, band-pass and band-stop.
//!
//! Every design is a cascade of second-order sections built via the bilinear
//! transform with frequency prewarping. Low- and high-pass designs add one
//! first-order section for odd orders. Band designs are order `2 * order`, one
//! section per prototype pole. Zero-phase filtering runs the cascade forward and
//! backward over an odd-reflected, steady-state-initialized signal so the ends do
//! not ring.
//!
//! Rig logs are not always uniformly sampled. When a time channel is supplied and
//! its steps vary, the signal is linearly resampled onto the median step, filtered,
//! and interpolated back onto the recorded timestamps.

use std::f64::consts::PI;

use clap::ValueEnum;
use log::debug;
use nalgebra::Complex;
use serde::{Deserialize, Serialize};

use crate::error::TireError;
use crate::math::median_mut;

/// Highest supported filter order.
pub const MAX_ORDER: usize = 10;

/// Relative step deviation below which a time channel counts as uniform.
const UNIFORM_TOL: f64 = 1e-3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

impl FilterType {
    pub fn is_band(self) -> bool {
        matches!(self, FilterType::Bandpass | FilterType::Bandstop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterType,
    /// Cutoff, or the lower band edge for band filters, Hz.
    pub cutoff_hz: f64,
    /// Upper band edge, Hz. Required by band filters, ignored otherwise.
    pub high_cutoff_hz: Option<f64>,
    pub order: usize,
    /// Forward-backward filtering (doubles the effective order, no phase lag).
    pub zero_phase: bool,
}

impl FilterSpec {
    pub fn lowpass(cutoff_hz: f64, order: usize) -> Self {
        Self {
            kind: FilterType::Lowpass,
            cutoff_hz,
            high_cutoff_hz: None,
            order,
            zero_phase: true,
        }
    }

    pub fn highpass(cutoff_hz: f64, order: usize) -> Self {
        Self {
            kind: FilterType::Highpass,
            ..Self::lowpass(cutoff_hz, order)
        }
    }

    pub fn bandpass(low_hz: f64, high_hz: f64, order: usize) -> Self {
        Self {
            kind: FilterType::Bandpass,
            high_cutoff_hz: Some(high_hz),
            ..Self::lowpass(low_hz, order)
        }
    }

    pub fn bandstop(low_hz: f64, high_hz: f64, order: usize) -> Self {
        Self {
            kind: FilterType::Bandstop,
            ..Self::bandpass(low_hz, high_hz, order)
        }
    }

    /// Second-order sections for a signal sampled at `sample_rate_hz`.
    pub fn design(&self, sample_rate_hz: f64) -> Result<Vec<Section>, TireError> {
        match self.kind {
            FilterType::Lowpass => design_lowpass(self.order, self.cutoff_hz, sample_rate_hz),
            FilterType::Highpass => design_highpass(self.order, self.cutoff_hz, sample_rate_hz),
            FilterType::Bandpass | FilterType::Bandstop => {
                let high = self.high_cutoff_hz.ok_or_else(|| {
                    TireError::validation(None, format!("{:?} filter needs an upper band edge", self.kind))
                })?;
                design_band(self.kind, self.order, self.cutoff_hz, high, sample_rate_hz)
            }
        }
    }
}

/// How samples are spaced in time.
#[derive(Debug, Clone, Copy)]
pub enum SampleClock<'a> {
    /// Uniform sampling at a known rate (Hz).
    Rate(f64),
    /// Recorded timestamps (seconds), one per sample.
    Time(&'a [f64]),
}

/// One section in transposed direct form II. First-order sections have `b2 = a2 = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Section {
    /// Gain for a constant input.
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Complex response at `z = exp(j * omega)`, `omega` in rad/sample.
    pub fn response(&self, omega: f64) -> Complex<f64> {
        let z1 = Complex::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        (z1 * self.b1 + z2 * self.b2 + self.b0) / (z1 * self.a1 + z2 * self.a2 + 1.0)
    }
}

/// Magnitude response of a cascade at `freq_hz`.
pub fn gain_at(sections: &[Section], freq_hz: f64, sample_rate_hz: f64) -> f64 {
    let omega = 2.0 * PI * freq_hz / sample_rate_hz;
    sections.iter().map(|s| s.response(omega).norm()).product()
}

fn check_design(order: usize, edges: &[f64], sample_rate_hz: f64) -> Result<(), TireError> {
    if order == 0 || order > MAX_ORDER {
        return Err(TireError::validation(
            None,
            format!("filter order must be in 1..={MAX_ORDER}, got {order}"),
        ));
    }
    if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
        return Err(TireError::validation(None, format!("invalid sample rate {sample_rate_hz} Hz")));
    }
    let nyquist = 0.5 * sample_rate_hz;
    for &cutoff_hz in edges {
        if !(cutoff_hz.is_finite() && cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(TireError::validation(
                None,
                format!("cutoff {cutoff_hz} Hz must be in (0, {nyquist}) for a {sample_rate_hz} Hz signal"),
            ));
        }
    }
    Ok(())
}

/// Design a digital Butterworth low-pass cascade.
pub fn design_lowpass(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Vec<Section>, TireError> {
    check_design(order, &[cutoff_hz], sample_rate_hz)?;
    let k = (PI * cutoff_hz / sample_rate_hz).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    for i in 0..order / 2 {
        let theta = (2 * i + 1) as f64 * PI / (2 * order) as f64;
        let q = 1.0 / (2.0 * theta.sin());
        let norm = 1.0 / (1.0 + k / q + k2);
        let b0 = k2 * norm;
        sections.push(Section {
            b0,
            b1: 2.0 * b0,
            b2: b0,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - k / q + k2) * norm,
        });
    }
    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        sections.push(Section {
            b0: k * norm,
            b1: k * norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        });
    }
    Ok(sections)
}

/// Design a digital Butterworth high-pass cascade.
pub fn design_highpass(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Vec<Section>, TireError> {
    check_design(order, &[cutoff_hz], sample_rate_hz)?;
    let k = (PI * cutoff_hz / sample_rate_hz).tan();
    let k2 = k * k;
    let mut sections = Vec::with_capacity(order.div_ceil(2));

    for i in 0..order / 2 {
        let theta = (2 * i + 1) as f64 * PI / (2 * order) as f64;
        let q = 1.0 / (2.0 * theta.sin());
        let norm = 1.0 / (1.0 + k / q + k2);
        sections.push(Section {
            b0: norm,
            b1: -2.0 * norm,
            b2: norm,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - k / q + k2) * norm,
        });
    }
    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        sections.push(Section {
            b0: norm,
            b1: -norm,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        });
    }
    Ok(sections)
}

/// Design a digital Butterworth band-pass or band-stop cascade between `low_hz`
/// and `high_hz`.
///
/// Each analog prototype pole maps to a pole pair through the band transform, and
/// each pair becomes one section. Band-pass sections put their zeros at DC and
/// Nyquist and have unit gain at the band centre. Band-stop sections put their zeros
/// on the centre frequency and have unit gain at DC.
pub fn design_band(
    kind: FilterType,
    order: usize,
    low_hz: f64,
    high_hz: f64,
    sample_rate_hz: f64,
) -> Result<Vec<Section>, TireError> {
    check_design(order, &[low_hz, high_hz], sample_rate_hz)?;
    if low_hz >= high_hz {
        return Err(TireError::validation(
            None,
            format!("band edges must satisfy low < high, got {low_hz} and {high_hz} Hz"),
        ));
    }
    if !kind.is_band() {
        return Err(TireError::validation(None, format!("{kind:?} is not a band filter")));
    }

    let fs2 = 2.0 * sample_rate_hz;
    let w1 = fs2 * (PI * low_hz / sample_rate_hz).tan();
    let w2 = fs2 * (PI * high_hz / sample_rate_hz).tan();
    let bw = w2 - w1;
    let w0_sq = w1 * w2;
    // Digital centre frequency, rad/sample.
    let omega0 = 2.0 * (w0_sq.sqrt() / fs2).atan();

    // Upper-half-plane analog poles; each comes with its conjugate.
    let mut analog: Vec<Complex<f64>> = Vec::with_capacity(2 * order);
    for i in 0..order {
        let theta = PI * (2 * i + order + 1) as f64 / (2 * order) as f64;
        let p = Complex::from_polar(1.0, theta);
        let centre = match kind {
            FilterType::Bandpass => p * bw,
            _ => Complex::new(bw, 0.0) / p,
        };
        let disc = (centre * centre - 4.0 * w0_sq).sqrt();
        analog.push((centre + disc) * 0.5);
        analog.push((centre - disc) * 0.5);
    }
    let digital: Vec<Complex<f64>> = analog
        .into_iter()
        .map(|s| (Complex::new(fs2, 0.0) + s) / (Complex::new(fs2, 0.0) - s))
        .collect();

    let (b0, b1, b2) = match kind {
        FilterType::Bandpass => (1.0, 0.0, -1.0),
        _ => (1.0, -2.0 * omega0.cos(), 1.0),
    };
    let reference = match kind {
        FilterType::Bandpass => omega0,
        _ => 0.0,
    };

    let mut sections = Vec::with_capacity(order);
    for (a1, a2) in pair_poles(&digital) {
        let raw = Section { b0, b1, b2, a1, a2 };
        let g = raw.response(reference).norm();
        sections.push(Section {
            b0: b0 / g,
            b1: b1 / g,
            b2: b2 / g,
            a1,
            a2,
        });
    }
    Ok(sections)
}

/// Denominator coefficients `(a1, a2)` from conjugate-closed poles: each complex
/// pole with its conjugate, real poles two at a time.
fn pair_poles(poles: &[Complex<f64>]) -> Vec<(f64, f64)> {
    const IMAG_EPS: f64 = 1e-12;
    let mut out = Vec::with_capacity(poles.len() / 2);
    let mut reals = Vec::new();
    for p in poles {
        if p.im > IMAG_EPS {
            out.push((-2.0 * p.re, p.norm_sqr()));
        } else if p.im.abs() <= IMAG_EPS {
            reals.push(p.re);
        }
    }
    for pair in reals.chunks(2) {
        match pair {
            [r1, r2] => out.push((-(r1 + r2), r1 * r2)),
            [r] => out.push((-r, 0.0)),
            _ => {}
        }
    }
    out
}

/// Run the cascade in place, each section starting in steady state for `x[0]`.
fn run_cascade(sections: &[Section], x: &mut [f64]) {
    let Some(&first) = x.first() else { return };
    let mut x0 = first;
    for s in sections {
        let y0 = s.dc_gain() * x0;
        let mut z1 = y0 - s.b0 * x0;
        let mut z2 = s.b2 * x0 - s.a2 * y0;
        for v in x.iter_mut() {
            let xin = *v;
            let y = s.b0 * xin + z1;
            z1 = s.b1 * xin - s.a1 * y + z2;
            z2 = s.b2 * xin - s.a2 * y;
            *v = y;
        }
        x0 = y0;
    }
}

fn filter_uniform(values: &[f64], sections: &[Section], zero_phase: bool) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }
    if !zero_phase {
        let mut out = values.to_vec();
        run_cascade(sections, &mut out);
        return out;
    }

    let pad = (3 * (2 * sections.len() + 1)).min(n - 1);
    let first = values[0];
    let last = values[n - 1];
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - values[i]));
    ext.extend_from_slice(values);
    ext.extend((1..=pad).map(|i| 2.0 * last - values[n - 1 - i]));

    run_cascade(sections, &mut ext);
    ext.reverse();
    run_cascade(sections, &mut ext);
    ext.reverse();

    ext[pad..pad + n].to_vec()
}

/// Filter a channel with the Butterworth design `spec` describes.
///
/// Non-finite samples are rejected: mask or drop them before filtering.
pub fn butterworth(values: &[f64], clock: SampleClock<'_>, spec: &FilterSpec) -> Result<Vec<f64>, TireError> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(TireError::validation(None, "cannot filter a channel containing non-finite samples"));
    }

    match clock {
        SampleClock::Rate(fs) => {
            let sections = spec.design(fs)?;
            Ok(filter_uniform(values, &sections, spec.zero_phase))
        }
        SampleClock::Time(t) => {
            if t.len() != values.len() {
                return Err(TireError::validation(
                    None,
                    format!("time channel has {} samples, signal has {}", t.len(), values.len()),
                ));
            }
            if values.len() < 2 {
                return Ok(values.to_vec());
            }
            let step = median_step(t)?;
            let sections = spec.design(1.0 / step)?;

            let uniform = t
                .windows(2)
                .all(|w| ((w[1] - w[0]) - step).abs() <= UNIFORM_TOL * step);
            if uniform {
                return Ok(filter_uniform(values, &sections, spec.zero_phase));
            }

            debug!("Non-uniform time base; resampling to {step:.6e} s before filtering");
            let t0 = t[0];
            let span = t[t.len() - 1] - t0;
            let m = (span / step).floor() as usize + 1;
            let grid: Vec<f64> = (0..m).map(|i| t0 + i as f64 * step).collect();
            let resampled = interpolate(t, values, &grid);
            let filtered = filter_uniform(&resampled, &sections, spec.zero_phase);
            Ok(interpolate(&grid, &filtered, t))
        }
    }
}

/// Median sample step of a strictly increasing, finite time channel.
pub fn median_step(t: &[f64]) -> Result<f64, TireError> {
    let mut steps = Vec::with_capacity(t.len().saturating_sub(1));
    for w in t.windows(2) {
        let d = w[1] - w[0];
        if !(d.is_finite() && d > 0.0) {
            return Err(TireError::validation(None, "time channel must be finite and strictly increasing"));
        }
        steps.push(d);
    }
    median_mut(&mut steps).ok_or_else(|| TireError::validation(None, "time channel needs at least two samples"))
}

/// Linear interpolation of `(xs, ys)` at ascending `at`; clamps outside the range.
fn interpolate(xs: &[f64], ys: &[f64], at: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut j = 0usize;
    at.iter()
        .map(|&x| {
            if x <= xs[0] {
                return ys[0];
            }
            if x >= xs[n - 1] {
                return ys[n - 1];
            }
            while j + 1 < n && xs[j + 1] < x {
                j += 1;
            }
            let (x0, x1) = (xs[j], xs[j + 1]);
            let u = (x - x0) / (x1 - x0);
            ys[j] + u * (ys[j + 1] - ys[j])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms(v: &[f64]) -> f64 {
        (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt()
    }

    #[test]
    fn second_order_design_matches_reference() {
        // scipy.signal.butter(2, 0.2): b=[0.0674553, 0.1349105, 0.0674553], a=[1, -1.1429805, 0.4128016]
        let s = design_lowpass(2, 10.0, 100.0).unwrap();
        assert_eq!(s.len(), 1);
        assert!((s[0].b0 - 0.067_455_3).abs() < 1e-6);
        assert!((s[0].a1 + 1.142_980_5).abs() < 1e-6);
        assert!((s[0].a2 - 0.412_801_6).abs() < 1e-6);
    }

    #[test]
    fn odd_order_adds_first_order_section() {
        let s = design_lowpass(3, 5.0, 100.0).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[1].b2, 0.0);
    }

    #[test]
    fn highpass_design_matches_reference() {
        // scipy.signal.butter(2, 0.2, 'high'): b=[0.6389455, -1.2778911, 0.6389455]
        let s = design_highpass(2, 10.0, 100.0).unwrap();
        assert_eq!(s.len(), 1);
        assert!((s[0].b0 - 0.638_945_5).abs() < 1e-6);
        assert!((s[0].b1 + 1.277_891_1).abs() < 1e-6);
        assert!((s[0].a1 + 1.142_980_5).abs() < 1e-6);
        assert!(s[0].dc_gain().abs() < 1e-12);
    }

    #[test]
    fn response_of_every_filter_type() {
        let fs = 100.0;
        let half_power = std::f64::consts::FRAC_1_SQRT_2;

        let lp = FilterSpec::lowpass(10.0, 4).design(fs).unwrap();
        assert!((gain_at(&lp, 0.0, fs) - 1.0).abs() < 1e-9);
        assert!((gain_at(&lp, 10.0, fs) - half_power).abs() < 1e-6);
        assert!(gain_at(&lp, 40.0, fs) < 1e-3);

        let hp = FilterSpec::highpass(10.0, 3).design(fs).unwrap();
        assert_eq!(hp.len(), 2);
        assert!(gain_at(&hp, 0.5, fs) < 1e-3);
        assert!((gain_at(&hp, 10.0, fs) - half_power).abs() < 1e-6);
        assert!(gain_at(&hp, 45.0, fs) > 0.99);

        let bp = FilterSpec::bandpass(5.0, 15.0, 2).design(fs).unwrap();
        assert_eq!(bp.len(), 2);
        assert!((gain_at(&bp, 5.0, fs) - half_power).abs() < 1e-6);
        assert!((gain_at(&bp, 15.0, fs) - half_power).abs() < 1e-6);
        assert!(gain_at(&bp, 0.2, fs) < 1e-2);
        assert!(gain_at(&bp, 45.0, fs) < 1e-2);
        assert!(gain_at(&bp, 9.0, fs) > 0.999);

        let bs = FilterSpec::bandstop(5.0, 15.0, 2).design(fs).unwrap();
        let warp = |f: f64| (PI * f / fs).tan();
        let centre = (warp(5.0) * warp(15.0)).sqrt().atan() * fs / PI;
        assert!((gain_at(&bs, 0.0, fs) - 1.0).abs() < 1e-9);
        assert!((gain_at(&bs, 5.0, fs) - half_power).abs() < 1e-6);
        assert!((gain_at(&bs, 15.0, fs) - half_power).abs() < 1e-6);
        assert!(gain_at(&bs, centre, fs) < 1e-9);
        assert!(gain_at(&bs, 49.0, fs) > 0.99);
    }

    #[test]
    fn odd_order_band_designs_are_stable() {
        for kind in [FilterType::Bandpass, FilterType::Bandstop] {
            let s = design_band(kind, 3, 2.0, 30.0, 100.0).unwrap();
            assert_eq!(s.len(), 3, "{kind:?}");
            // Both roots of 1 + a1 z^-1 + a2 z^-2 inside the unit circle.
            assert!(s.iter().all(|s| s.a2.abs() < 1.0 && s.a1.abs() < 1.0 + s.a2), "{kind:?}: {s:?}");
        }
    }

    #[test]
    fn highpass_removes_offset() {
        let fs = 100.0;
        let wave = sine(10.0, fs, 2000);
        let offset: Vec<f64> = wave.iter().map(|v| v + 100.0).collect();
        let y = butterworth(&offset, SampleClock::Rate(fs), &FilterSpec::highpass(1.0, 2)).unwrap();
        let err: Vec<f64> = y.iter().zip(&wave).map(|(a, b)| a - b).collect();
        assert!(rms(&err[200..1800]) < 0.02, "residual rms {}", rms(&err[200..1800]));
    }

    #[test]
    fn bandstop_notches_the_band() {
        let fs = 100.0;
        let keep = sine(0.5, fs, 3000);
        let hum = sine(9.0, fs, 3000);
        let mixed: Vec<f64> = keep.iter().zip(&hum).map(|(a, b)| a + b).collect();
        let y = butterworth(&mixed, SampleClock::Rate(fs), &FilterSpec::bandstop(5.0, 15.0, 2)).unwrap();
        let err: Vec<f64> = y.iter().zip(&keep).map(|(a, b)| a - b).collect();
        assert!(rms(&err[200..2800]) < 0.02, "residual rms {}", rms(&err[200..2800]));

        let bp = butterworth(&mixed, SampleClock::Rate(fs), &FilterSpec::bandpass(5.0, 15.0, 2)).unwrap();
        let err: Vec<f64> = bp.iter().zip(&hum).map(|(a, b)| a - b).collect();
        assert!(rms(&err[200..2800]) < 0.02, "residual rms {}", rms(&err[200..2800]));
    }

    #[test]
    fn band_filters_need_ordered_edges() {
        let mut spec = FilterSpec::bandpass(15.0, 5.0, 2);
        assert!(spec.design(100.0).is_err());
        spec.high_cutoff_hz = None;
        assert!(spec.design(100.0).is_err());
        assert!(design_band(FilterType::Lowpass, 2, 5.0, 15.0, 100.0).is_err());
    }

    #[test]
    fn rejects_cutoff_above_nyquist() {
        assert!(design_lowpass(4, 60.0, 100.0).is_err());
        assert!(design_lowpass(0, 10.0, 100.0).is_err());
    }

    #[test]
    fn constant_signal_passes_unchanged() {
        let x = vec![-445.0; 500];
        let y = butterworth(&x, SampleClock::Rate(100.0), &FilterSpec::lowpass(2.0, 4)).unwrap();
        assert!(y.iter().all(|v| (v + 445.0).abs() < 1e-9));
    }

    #[test]
    fn attenuates_high_frequency_and_keeps_low() {
        let fs = 100.0;
        let low = sine(0.5, fs, 2000);
        let high = sine(30.0, fs, 2000);
        let mixed: Vec<f64> = low.iter().zip(&high).map(|(a, b)| a + b).collect();
        let y = butterworth(&mixed, SampleClock::Rate(fs), &FilterSpec::lowpass(5.0, 4)).unwrap();
        let err: Vec<f64> = y.iter().zip(&low).map(|(a, b)| a - b).collect();
        assert_eq!(y.len(), mixed.len());
        assert!(rms(&err[100..1900]) < 0.02, "residual rms {}", rms(&err[100..1900]));
    }

    #[test]
    fn nonuniform_time_base_is_handled() {
        let mut t = Vec::new();
        let mut acc = 0.0;
        for i in 0..1500 {
            t.push(acc);
            acc += if i % 3 == 0 { 0.012 } else { 0.009 };
        }
        let x: Vec<f64> = t.iter().map(|&ti| (2.0 * PI * 0.4 * ti).sin()).collect();
        let y = butterworth(&x, SampleClock::Time(&t), &FilterSpec::lowpass(3.0, 2)).unwrap();
        assert_eq!(y.len(), x.len());
        let err: Vec<f64> = y.iter().zip(&x).map(|(a, b)| a - b).collect();
        assert!(rms(&err[100..1400]) < 0.02);
    }

    #[test]
    fn rejects_non_monotonic_time() {
        let t = [0.0, 0.01, 0.005];
        let x = [1.0, 2.0, 3.0];
        assert!(butterworth(&x, SampleClock::Time(&t), &FilterSpec::lowpass(1.0, 2)).is_err());
    }
}
