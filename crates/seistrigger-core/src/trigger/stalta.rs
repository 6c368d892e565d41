//! Recursive STA/LTA energy trigger
//!
//! Short- and long-term exponentially weighted averages of the squared
//! filtered amplitude. The first sample of a stream only primes the state and
//! the first `nlta` outputs are forced to zero.

use super::SampleProcessor;
use crate::config::{ChannelConfig, LtaUpdate};
use crate::LTA_FLOOR;

/// Mutable averages of one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerState {
    /// Short-term average of squared amplitude
    pub sta: f64,
    /// Long-term average of squared amplitude, never below [`LTA_FLOOR`]
    pub lta: f64,
    /// Samples consumed since construction or the last reset
    pub samples_seen: u64,
    /// Squared value of the previous sample
    pub prev_sq: f64,
}

impl TriggerState {
    fn cold() -> Self {
        Self {
            sta: 0.0,
            lta: LTA_FLOOR,
            samples_seen: 0,
            prev_sq: 0.0,
        }
    }
}

/// Recursive STA/LTA estimator
#[derive(Debug, Clone)]
pub struct EnergyTrigger {
    csta: f64,
    clta: f64,
    nlta: u64,
    variant: LtaUpdate,
    state: TriggerState,
}

impl EnergyTrigger {
    /// Create a trigger from window lengths in seconds
    ///
    /// # Arguments
    /// * `sta_seconds` - Short-term window
    /// * `lta_seconds` - Long-term window, also the warm-up length
    /// * `sample_rate` - Samples per second
    /// * `variant` - LTA recurrence
    pub fn new(sta_seconds: f64, lta_seconds: f64, sample_rate: f64, variant: LtaUpdate) -> Self {
        Self {
            csta: 1.0 / (sta_seconds * sample_rate),
            clta: 1.0 / (lta_seconds * sample_rate),
            nlta: (lta_seconds * sample_rate).round() as u64,
            variant,
            state: TriggerState::cold(),
        }
    }

    /// Create a trigger from window lengths in samples
    pub fn with_lengths(nsta: usize, nlta: usize, variant: LtaUpdate) -> Self {
        Self {
            csta: 1.0 / nsta as f64,
            clta: 1.0 / nlta as f64,
            nlta: nlta as u64,
            variant,
            state: TriggerState::cold(),
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(
            config.sta_seconds,
            config.lta_seconds,
            config.sample_rate,
            config.lta_update,
        )
    }

    /// Consume one filtered sample and return the STA/LTA ratio
    ///
    /// # Returns
    /// `0.0` during warm-up, `sta / lta` afterwards
    #[inline]
    pub fn update(&mut self, filtered: f64) -> f64 {
        let sq = filtered * filtered;
        let s = &mut self.state;
        s.samples_seen += 1;

        if s.samples_seen == 1 {
            s.prev_sq = sq;
            return 0.0;
        }

        let lta_input = match self.variant {
            LtaUpdate::Symmetric => sq,
            LtaUpdate::Delayed => s.prev_sq,
        };
        s.sta += (sq - s.sta) * self.csta;
        s.lta += (lta_input - s.lta) * self.clta;
        s.prev_sq = sq;

        if s.lta < LTA_FLOOR {
            s.sta = 0.0;
            s.lta = LTA_FLOOR;
        }

        if s.samples_seen <= self.nlta {
            0.0
        } else {
            s.sta / s.lta
        }
    }

    pub fn state(&self) -> &TriggerState {
        &self.state
    }

    /// Put back a state previously taken with [`state`](Self::state)
    pub fn restore_state(&mut self, state: TriggerState) {
        self.state = state;
    }

    pub fn sta(&self) -> f64 {
        self.state.sta
    }

    pub fn lta(&self) -> f64 {
        self.state.lta
    }

    pub fn samples_seen(&self) -> u64 {
        self.state.samples_seen
    }

    /// Number of leading outputs forced to zero
    pub fn warmup_len(&self) -> u64 {
        self.nlta
    }

    /// True once the next ratio will no longer be suppressed
    pub fn is_warm(&self) -> bool {
        self.state.samples_seen >= self.nlta
    }

    pub fn variant(&self) -> LtaUpdate {
        self.variant
    }
}

impl SampleProcessor for EnergyTrigger {
    fn process(&mut self, sample: f64) -> f64 {
        self.update(sample)
    }

    fn reset(&mut self) {
        self.state = TriggerState::cold();
    }
}
