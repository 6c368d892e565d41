//! Channel and engine configuration
//!
//! A [`ChannelConfig`] describes one monitored sensor channel: its sample rate,
//! band-pass corners, STA/LTA windows and alarm thresholds. An [`EngineConfig`]
//! bundles the channel list with the event sink settings and can be stored as
//! JSON on disk.
//!
//! All checks run in [`ChannelConfig::validate`]; a channel that fails
//! validation is never registered.

use crate::engine::event::ChannelId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors raised while validating configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Channel id must not be empty")]
    EmptyChannelId,

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("Band-pass corners must satisfy 0 < lowcut < highcut < {nyquist} Hz, got {lowcut}..{highcut}")]
    InvalidBand {
        lowcut: f64,
        highcut: f64,
        nyquist: f64,
    },

    #[error("Filter order must be even and at least 2, got {0}")]
    InvalidFilterOrder(usize),

    #[error("STA window must be shorter than LTA window, got sta={sta}s lta={lta}s")]
    InvalidWindows { sta: f64, lta: f64 },

    #[error("STA window of {sta}s spans less than one sample at {sample_rate} Hz")]
    WindowTooShort { sta: f64, sample_rate: f64 },

    #[error("Thresholds must satisfy trigger > reset > 0, got trigger={trigger} reset={reset}")]
    InvalidThresholds { trigger: f64, reset: f64 },

    #[error("{field} must be finite and {requirement}, got {value}")]
    InvalidDuration {
        field: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("Sensitivity must be positive and finite, got {0}")]
    InvalidSensitivity(f64),

    #[error("Duplicate channel id: {0}")]
    DuplicateChannel(ChannelId),

    #[error("Sink capacity must be at least 1")]
    InvalidSinkCapacity,
}

/// LTA recurrence used by the energy trigger
///
/// `Symmetric` feeds the current squared sample into both averages and is the
/// classic recursive STA/LTA. `Delayed` feeds the previous squared sample into
/// the LTA while the STA stays on the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LtaUpdate {
    /// `lta += (sq - lta) * clta`
    #[default]
    Symmetric,
    /// `lta += (sq_prev - lta) * clta`
    Delayed,
}

/// What the event sink does when its queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Block the producing channel until the consumer catches up
    Block,
    /// Drop the event, count it and log a warning
    #[default]
    Drop,
}

fn default_filter_order() -> usize {
    8
}

fn default_sink_capacity() -> usize {
    256
}

/// Immutable description of one monitored channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel identifier, e.g. `AM.R6E01.00.EHZ`
    pub channel_id: ChannelId,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Lower band-pass corner in Hz
    pub lowcut: f64,
    /// Upper band-pass corner in Hz
    pub highcut: f64,
    /// Total band-pass order (even); the cascade has `filter_order / 2` sections
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,
    /// Short-term window in seconds
    pub sta_seconds: f64,
    /// Long-term window in seconds
    pub lta_seconds: f64,
    /// Ratio at or above which an alarm starts
    pub trigger_threshold: f64,
    /// Ratio at or below which an alarm ends
    pub reset_threshold: f64,
    /// Longest alarm episode in seconds before a timeout reset
    pub max_event_duration: f64,
    /// LTA recurrence variant
    #[serde(default)]
    pub lta_update: LtaUpdate,
    /// Seconds the ratio must stay above the trigger threshold before alarming
    #[serde(default)]
    pub min_trigger_duration: f64,
    /// Counts per physical unit; raw samples are divided by it when set
    #[serde(default)]
    pub sensitivity: Option<f64>,
    /// Extra seconds of silence tolerated between samples before state is reset
    #[serde(default)]
    pub gap_tolerance: Option<f64>,
}

impl ChannelConfig {
    /// Create a channel config with common Raspberry Shake trigger defaults
    ///
    /// Band 0.1-2.0 Hz (order 8), STA 6 s, LTA 30 s, trigger 1.7, reset 1.6,
    /// and a 60 s cap on alarm episodes.
    pub fn new(channel_id: impl Into<ChannelId>, sample_rate: f64) -> Self {
        Self {
            channel_id: channel_id.into(),
            sample_rate,
            lowcut: 0.1,
            highcut: 2.0,
            filter_order: default_filter_order(),
            sta_seconds: 6.0,
            lta_seconds: 30.0,
            trigger_threshold: 1.7,
            reset_threshold: 1.6,
            max_event_duration: 60.0,
            lta_update: LtaUpdate::default(),
            min_trigger_duration: 0.0,
            sensitivity: None,
            gap_tolerance: None,
        }
    }

    pub fn with_band(mut self, lowcut: f64, highcut: f64) -> Self {
        self.lowcut = lowcut;
        self.highcut = highcut;
        self
    }

    pub fn with_filter_order(mut self, order: usize) -> Self {
        self.filter_order = order;
        self
    }

    pub fn with_windows(mut self, sta_seconds: f64, lta_seconds: f64) -> Self {
        self.sta_seconds = sta_seconds;
        self.lta_seconds = lta_seconds;
        self
    }

    pub fn with_thresholds(mut self, trigger: f64, reset: f64) -> Self {
        self.trigger_threshold = trigger;
        self.reset_threshold = reset;
        self
    }

    pub fn with_max_event_duration(mut self, seconds: f64) -> Self {
        self.max_event_duration = seconds;
        self
    }

    pub fn with_lta_update(mut self, variant: LtaUpdate) -> Self {
        self.lta_update = variant;
        self
    }

    pub fn with_min_trigger_duration(mut self, seconds: f64) -> Self {
        self.min_trigger_duration = seconds;
        self
    }

    pub fn with_sensitivity(mut self, counts_per_unit: f64) -> Self {
        self.sensitivity = Some(counts_per_unit);
        self
    }

    pub fn with_gap_tolerance(mut self, seconds: f64) -> Self {
        self.gap_tolerance = Some(seconds);
        self
    }

    /// Nyquist frequency in Hz
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    /// Number of samples whose ratio output is suppressed during warm-up
    pub fn warmup_samples(&self) -> u64 {
        (self.lta_seconds * self.sample_rate).round() as u64
    }

    /// Nominal spacing between consecutive samples
    pub fn sample_interval(&self) -> chrono::Duration {
        seconds_to_delta(1.0 / self.sample_rate)
    }

    /// Check every invariant of the channel description
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_id.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyChannelId);
        }

        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }

        let nyquist = self.nyquist();
        let band_ok = self.lowcut.is_finite()
            && self.highcut.is_finite()
            && self.lowcut > 0.0
            && self.lowcut < self.highcut
            && self.highcut < nyquist;
        if !band_ok {
            return Err(ConfigError::InvalidBand {
                lowcut: self.lowcut,
                highcut: self.highcut,
                nyquist,
            });
        }

        if self.filter_order < 2 || self.filter_order % 2 != 0 {
            return Err(ConfigError::InvalidFilterOrder(self.filter_order));
        }

        let windows_ok = self.sta_seconds.is_finite()
            && self.lta_seconds.is_finite()
            && self.sta_seconds > 0.0
            && self.sta_seconds < self.lta_seconds;
        if !windows_ok {
            return Err(ConfigError::InvalidWindows {
                sta: self.sta_seconds,
                lta: self.lta_seconds,
            });
        }

        // csta must not exceed 1 or the short-term average overshoots
        if self.sta_seconds * self.sample_rate < 1.0 {
            return Err(ConfigError::WindowTooShort {
                sta: self.sta_seconds,
                sample_rate: self.sample_rate,
            });
        }

        let thresholds_ok = self.trigger_threshold.is_finite()
            && self.reset_threshold.is_finite()
            && self.reset_threshold > 0.0
            && self.trigger_threshold > self.reset_threshold;
        if !thresholds_ok {
            return Err(ConfigError::InvalidThresholds {
                trigger: self.trigger_threshold,
                reset: self.reset_threshold,
            });
        }

        if !(self.max_event_duration.is_finite() && self.max_event_duration > 0.0) {
            return Err(ConfigError::InvalidDuration {
                field: "max_event_duration",
                requirement: "positive",
                value: self.max_event_duration,
            });
        }

        if !(self.min_trigger_duration.is_finite() && self.min_trigger_duration >= 0.0) {
            return Err(ConfigError::InvalidDuration {
                field: "min_trigger_duration",
                requirement: "non-negative",
                value: self.min_trigger_duration,
            });
        }

        if let Some(sensitivity) = self.sensitivity {
            if !(sensitivity.is_finite() && sensitivity > 0.0) {
                return Err(ConfigError::InvalidSensitivity(sensitivity));
            }
        }

        if let Some(tolerance) = self.gap_tolerance {
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                return Err(ConfigError::InvalidDuration {
                    field: "gap_tolerance",
                    requirement: "non-negative",
                    value: tolerance,
                });
            }
        }

        Ok(())
    }
}

/// Event sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Bounded queue length between the engine and the consumer
    #[serde(default = "default_sink_capacity")]
    pub capacity: usize,
    /// Behaviour when the queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: default_sink_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Monitored channels
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Event sink settings
    #[serde(default)]
    pub sink: SinkConfig,
}

impl EngineConfig {
    /// Validate every channel, reject duplicate ids and an empty sink queue
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink.capacity == 0 {
            return Err(ConfigError::InvalidSinkCapacity);
        }

        let mut seen = HashSet::with_capacity(self.channels.len());
        for channel in &self.channels {
            channel.validate()?;
            if !seen.insert(channel.channel_id.clone()) {
                return Err(ConfigError::DuplicateChannel(channel.channel_id.clone()));
            }
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json_str(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            channels = config.channels.len(),
            "Loaded engine config"
        );
        Ok(config)
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Engine config saved to disk");
        Ok(())
    }
}

/// Convert fractional seconds to a chrono duration with nanosecond resolution
pub(crate) fn seconds_to_delta(seconds: f64) -> chrono::Duration {
    chrono::Duration::nanoseconds((seconds * 1e9).round() as i64)
}
