//! Per-channel signal chain
//!
//! This module contains the three stages every channel runs per sample:
//! - Causal Butterworth band-pass conditioning ([`filter`])
//! - Recursive STA/LTA energy ratio ([`stalta`])
//! - Trigger/reset hysteresis with timeout ([`alarm`])

pub mod alarm;
pub mod filter;
pub mod stalta;

/// A stage that accepts one sample and returns one value
///
/// Implemented by the filter bank (raw → filtered) and the energy trigger
/// (filtered → ratio) so both can be driven and tested the same way.
pub trait SampleProcessor {
    /// Process a single sample, updating internal state
    fn process(&mut self, sample: f64) -> f64;

    /// Return to the cold, freshly constructed state
    fn reset(&mut self);

    /// Process a buffer of samples in order
    fn process_buffer(&mut self, samples: &[f64]) -> Vec<f64> {
        samples.iter().map(|&s| self.process(s)).collect()
    }
}
