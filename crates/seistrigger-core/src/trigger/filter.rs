//! Causal Butterworth band-pass filter bank
//!
//! The band-pass is designed with the bilinear transform and evaluated as a
//! cascade of second-order sections in Direct Form II Transposed. Each section
//! keeps two delay taps, initialised to zero; the cold-start transient is part
//! of the expected output.

use super::SampleProcessor;
use crate::config::{ChannelConfig, ConfigError};
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Relative imaginary part below which a z-plane pole counts as real
const REAL_POLE_EPS: f64 = 1e-12;

/// Coefficients of one second-order section, normalised so that `a0 = 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    /// Transfer function evaluated at `z^-1`
    fn response(&self, z_inv: Complex<f64>) -> Complex<f64> {
        let z_inv2 = z_inv * z_inv;
        let num = z_inv * self.b1 + z_inv2 * self.b2 + self.b0;
        let den = z_inv * self.a1 + z_inv2 * self.a2 + 1.0;
        num / den
    }
}

/// Delay taps of every section in the cascade
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    delays: Vec<[f64; 2]>,
}

impl FilterState {
    fn zeroed(sections: usize) -> Self {
        Self {
            delays: vec![[0.0; 2]; sections],
        }
    }

    /// `[s0, s1]` per section, in cascade order
    pub fn delays(&self) -> &[[f64; 2]] {
        &self.delays
    }
}

/// Design a digital Butterworth band-pass as second-order sections
///
/// `order` is the total band-pass order and must be even; the result has
/// `order / 2` sections. Sections are ordered from the pole farthest from the
/// unit circle to the closest, and the overall gain sits in the first section
/// so that the magnitude is exactly one at the centre of the pass band.
pub fn butterworth_bandpass(
    order: usize,
    lowcut: f64,
    highcut: f64,
    sample_rate: f64,
) -> Result<Vec<Biquad>, ConfigError> {
    if order < 2 || order % 2 != 0 {
        return Err(ConfigError::InvalidFilterOrder(order));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(ConfigError::InvalidSampleRate(sample_rate));
    }
    let nyquist = sample_rate / 2.0;
    if !(lowcut > 0.0 && lowcut < highcut && highcut < nyquist) {
        return Err(ConfigError::InvalidBand {
            lowcut,
            highcut,
            nyquist,
        });
    }

    let prototype_order = order / 2;
    let fs2 = 2.0 * sample_rate;

    // Prewarp the corners so they land exactly after the bilinear map
    let w_low = fs2 * (PI * lowcut / sample_rate).tan();
    let w_high = fs2 * (PI * highcut / sample_rate).tan();
    let bandwidth = w_high - w_low;
    let w_center = (w_low * w_high).sqrt();

    let mut complex_poles: Vec<Complex<f64>> = Vec::with_capacity(prototype_order);
    let mut real_poles: Vec<f64> = Vec::new();

    for k in 0..prototype_order {
        let prototype = if 2 * k + 1 == prototype_order {
            Complex::new(-1.0, 0.0)
        } else {
            let theta = PI * (2 * k + prototype_order + 1) as f64 / (2 * prototype_order) as f64;
            Complex::from_polar(1.0, theta)
        };

        // Low-pass to band-pass: s^2 - p*bw*s + w0^2 = 0
        let half = prototype * (bandwidth / 2.0);
        let disc = (half * half - w_center * w_center).sqrt();

        for s in [half + disc, half - disc] {
            let z = (s + fs2) / (-s + fs2);
            if z.im.abs() <= REAL_POLE_EPS * z.norm() {
                real_poles.push(z.re);
            } else if z.im > 0.0 {
                complex_poles.push(z);
            }
        }
    }

    // (a1, a2, largest pole radius)
    let mut denominators: Vec<(f64, f64, f64)> = complex_poles
        .iter()
        .map(|z| (-2.0 * z.re, z.norm_sqr(), z.norm()))
        .collect();

    real_poles.sort_by(f64::total_cmp);
    debug_assert!(real_poles.len() % 2 == 0, "real poles must pair up");
    for pair in real_poles.chunks_exact(2) {
        let (p, q) = (pair[0], pair[1]);
        denominators.push((-(p + q), p * q, p.abs().max(q.abs())));
    }

    denominators.sort_by(|a, b| a.2.total_cmp(&b.2));

    // Band-pass zeros at z = +1 and z = -1 give each section 1 - z^-2
    let mut sections: Vec<Biquad> = denominators
        .into_iter()
        .map(|(a1, a2, _)| Biquad {
            b0: 1.0,
            b1: 0.0,
            b2: -1.0,
            a1,
            a2,
        })
        .collect();

    let omega_center = 2.0 * (w_center / fs2).atan();
    let z_inv = Complex::from_polar(1.0, -omega_center);
    let response = sections
        .iter()
        .fold(Complex::new(1.0, 0.0), |acc, s| acc * s.response(z_inv));
    let gain = 1.0 / response.norm();

    if let Some(first) = sections.first_mut() {
        first.b0 *= gain;
        first.b1 *= gain;
        first.b2 *= gain;
    }

    Ok(sections)
}

/// Band-pass filter with persistent per-section state for streaming use
///
/// # Example
/// ```
/// use seistrigger_core::trigger::filter::FilterBank;
/// use seistrigger_core::trigger::SampleProcessor;
///
/// let mut filter = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
/// assert_eq!(filter.section_count(), 4);
/// let y = filter.process(1.0);
/// assert!(y.is_finite());
/// ```
#[derive(Debug, Clone)]
pub struct FilterBank {
    sections: Vec<Biquad>,
    state: FilterState,
    sample_rate: f64,
}

impl FilterBank {
    /// Create a filter bank from explicit sections
    pub fn new(sections: Vec<Biquad>, sample_rate: f64) -> Self {
        let state = FilterState::zeroed(sections.len());
        Self {
            sections,
            state,
            sample_rate,
        }
    }

    /// Design a Butterworth band-pass bank
    pub fn bandpass(
        order: usize,
        lowcut: f64,
        highcut: f64,
        sample_rate: f64,
    ) -> Result<Self, ConfigError> {
        let sections = butterworth_bandpass(order, lowcut, highcut, sample_rate)?;
        Ok(Self::new(sections, sample_rate))
    }

    /// Design the bank described by a channel config
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        Self::bandpass(
            config.filter_order,
            config.lowcut,
            config.highcut,
            config.sample_rate,
        )
    }

    /// Run one sample through every section in cascade order
    #[inline]
    pub fn filter(&mut self, raw: f64) -> f64 {
        let mut x = raw;
        for (section, delay) in self.sections.iter().zip(self.state.delays.iter_mut()) {
            let y = section.b0 * x + delay[0];
            delay[0] = section.b1 * x + delay[1] - section.a1 * y;
            delay[1] = section.b2 * x - section.a2 * y;
            x = y;
        }
        x
    }

    /// Magnitude response of the whole cascade at `freq` Hz
    pub fn magnitude_at(&self, freq: f64) -> f64 {
        let z_inv = Complex::from_polar(1.0, -2.0 * PI * freq / self.sample_rate);
        self.sections
            .iter()
            .fold(Complex::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
            .norm()
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Copy the delay taps into `snapshot`, reusing its allocation
    pub fn save_state(&self, snapshot: &mut FilterState) {
        snapshot.delays.clone_from(&self.state.delays);
    }

    pub fn restore_state(&mut self, snapshot: &FilterState) {
        self.state.delays.clone_from(&snapshot.delays);
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

impl SampleProcessor for FilterBank {
    fn process(&mut self, sample: f64) -> f64 {
        self.filter(sample)
    }

    fn reset(&mut self) {
        for delay in &mut self.state.delays {
            *delay = [0.0; 2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rustfft::FftPlanner;

    const HALF_POWER: f64 = std::f64::consts::FRAC_1_SQRT_2;

    #[test]
    fn test_section_count_is_half_the_order() {
        for order in [2, 4, 6, 8, 10] {
            let filter = FilterBank::bandpass(order, 0.5, 5.0, 50.0).unwrap();
            assert_eq!(filter.section_count(), order / 2, "order {}", order);
        }
    }

    #[test]
    fn test_rejects_invalid_design() {
        assert!(FilterBank::bandpass(3, 0.1, 2.0, 100.0).is_err());
        assert!(FilterBank::bandpass(4, 2.0, 0.1, 100.0).is_err());
        assert!(FilterBank::bandpass(4, 0.1, 60.0, 100.0).is_err());
    }

    #[test]
    fn test_half_power_at_corners() {
        let filter = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        assert_abs_diff_eq!(filter.magnitude_at(0.1), HALF_POWER, epsilon = 1e-9);
        assert_abs_diff_eq!(filter.magnitude_at(2.0), HALF_POWER, epsilon = 1e-9);
    }

    #[test]
    fn test_wide_band_with_real_poles() {
        // Wide enough that the odd prototype pole maps to two real poles
        for order in [2, 6] {
            let filter = FilterBank::bandpass(order, 1.0, 20.0, 100.0).unwrap();
            assert_eq!(filter.section_count(), order / 2);
            assert_abs_diff_eq!(filter.magnitude_at(1.0), HALF_POWER, epsilon = 1e-9);
            assert_abs_diff_eq!(filter.magnitude_at(20.0), HALF_POWER, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_passband_peak_is_unity() {
        let filter = FilterBank::bandpass(4, 1.0, 10.0, 100.0).unwrap();
        let peak = (1..=1000)
            .map(|i| filter.magnitude_at(i as f64 * 0.01))
            .fold(0.0f64, f64::max);
        assert!(peak <= 1.0 + 1e-9, "peak {}", peak);
        assert!(peak > 0.999, "peak {}", peak);
    }

    #[test]
    fn test_rejects_dc_and_nyquist() {
        let filter = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        assert!(filter.magnitude_at(0.0) < 1e-12);
        assert!(filter.magnitude_at(50.0) < 1e-12);
    }

    #[test]
    fn test_sections_are_stable() {
        let filter = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        for s in filter.sections() {
            assert!(s.a2 < 1.0, "a2 = {}", s.a2);
            assert!(s.a1.abs() < 1.0 + s.a2, "a1 = {}, a2 = {}", s.a1, s.a2);
        }
    }

    #[test]
    fn test_zero_input_stays_zero() {
        let mut filter = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        for _ in 0..1000 {
            assert_eq!(filter.process(0.0), 0.0);
        }
    }

    #[test]
    fn test_deterministic_output() {
        let mut a = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        let mut b = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        let input: Vec<f64> = (0..2000).map(|i| (i as f64 * 0.37).sin() * 100.0).collect();

        let out_a = a.process_buffer(&input);
        let out_b = b.process_buffer(&input);

        for (i, (x, y)) in out_a.iter().zip(&out_b).enumerate() {
            assert_eq!(x.to_bits(), y.to_bits(), "sample {}", i);
        }
    }

    #[test]
    fn test_state_continuity_across_chunks() {
        let mut continuous = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        let mut chunked = FilterBank::bandpass(8, 0.1, 2.0, 100.0).unwrap();
        let samples: Vec<f64> = (0..100).map(|i| (i as f64).sin()).collect();

        let expected = continuous.process_buffer(&samples);
        let mut actual = Vec::new();
        for chunk in samples.chunks(25) {
            actual.extend(chunked.process_buffer(chunk));
        }

        assert_eq!(expected, actual);
    }

    #[test]
    fn test_reset_restores_cold_state() {
        let mut filter = FilterBank::bandpass(4, 1.0, 10.0, 100.0).unwrap();
        let samples: Vec<f64> = (0..300).map(|i| (i as f64 * 0.2).cos()).collect();

        let first = filter.process_buffer(&samples);
        assert!(filter.state().delays().iter().any(|d| d[0] != 0.0));

        filter.reset();
        assert!(filter.state().delays().iter().all(|d| *d == [0.0, 0.0]));

        let second = filter.process_buffer(&samples);
        assert_eq!(first, second);
    }

    #[test]
    fn test_restore_state_undoes_samples() {
        let mut filter = FilterBank::bandpass(4, 1.0, 10.0, 100.0).unwrap();
        let samples: Vec<f64> = (0..200).map(|i| (i as f64 * 0.3).sin()).collect();
        filter.process_buffer(&samples);

        let mut snapshot = filter.state().clone();
        filter.save_state(&mut snapshot);
        let expected = filter.clone().process_buffer(&samples);

        filter.process(1e200);
        assert_ne!(filter.state(), &snapshot);
        filter.restore_state(&snapshot);
        assert_eq!(filter.process_buffer(&samples), expected);
    }

    #[test]
    fn test_impulse_response_spectrum() {
        let sample_rate = 100.0;
        let n = 4096;
        let mut filter = FilterBank::bandpass(8, 1.0, 10.0, sample_rate).unwrap();

        let mut spectrum: Vec<Complex<f64>> = (0..n)
            .map(|i| {
                let x = if i == 0 { 1.0 } else { 0.0 };
                Complex::new(filter.process(x), 0.0)
            })
            .collect();

        let mut planner = FftPlanner::new();
        planner.plan_fft_forward(n).process(&mut spectrum);

        let bin = |freq: f64| (freq * n as f64 / sample_rate).round() as usize;
        let in_band = spectrum[bin(3.0)].norm();
        let above = spectrum[bin(30.0)].norm();
        let below = spectrum[bin(0.1)].norm();

        assert!(in_band > 0.95, "in-band magnitude {}", in_band);
        assert!(above < 0.02, "30 Hz magnitude {}", above);
        assert!(below < 0.02, "0.1 Hz magnitude {}", below);
    }
}
