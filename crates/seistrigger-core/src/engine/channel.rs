//! One channel's processing chain
//!
//! raw → (sensitivity) → [`FilterBank`] → [`EnergyTrigger`] → [`AlarmStateMachine`]
//!
//! All state is created from the channel's config at construction and owned
//! by the pipeline. A pipeline is driven by exactly one caller at a time.

use crate::config::{seconds_to_delta, ChannelConfig};
use crate::diagnostics::DiagnosticRecord;
use crate::engine::event::{ChannelId, Event};
use crate::engine::EngineError;
use crate::stats::store::{RunningStats, StatsStore};
use crate::trigger::alarm::AlarmStateMachine;
use crate::trigger::filter::{FilterBank, FilterState};
use crate::trigger::stalta::EnergyTrigger;
use crate::trigger::SampleProcessor;
use chrono::{DateTime, Duration, Utc};

/// Intermediate values of one sample
#[derive(Debug, Clone, Copy)]
struct Stages {
    filtered: f64,
    ratio: f64,
}

/// Filter, trigger and alarm of one channel
#[derive(Debug, Clone)]
pub struct ChannelPipeline {
    config: ChannelConfig,
    filter: FilterBank,
    /// Filter taps before the sample in flight, restored if it is rejected
    saved_filter: FilterState,
    trigger: EnergyTrigger,
    alarm: AlarmStateMachine,
    stats: StatsStore,
    /// Index the next accepted sample will get
    next_index: u64,
    last_timestamp: Option<DateTime<Utc>>,
    /// Largest spacing between samples before state is reset
    max_spacing: Option<Duration>,
}

impl ChannelPipeline {
    /// Validate the config and build the chain
    ///
    /// # Returns
    /// `EngineError::InvalidConfig` when the config breaks an invariant;
    /// no state is created in that case.
    pub fn new(config: ChannelConfig) -> Result<Self, EngineError> {
        let invalid = |source| EngineError::InvalidConfig {
            channel: config.channel_id.to_string(),
            source,
        };
        config.validate().map_err(invalid)?;
        let filter = FilterBank::from_config(&config).map_err(invalid)?;

        let max_spacing = config
            .gap_tolerance
            .map(|tolerance| config.sample_interval() + seconds_to_delta(tolerance));

        tracing::debug!(
            channel = %config.channel_id,
            sections = filter.section_count(),
            warmup = config.warmup_samples(),
            "Channel pipeline built"
        );

        Ok(Self {
            trigger: EnergyTrigger::from_config(&config),
            alarm: AlarmStateMachine::from_config(&config),
            saved_filter: filter.state().clone(),
            filter,
            stats: StatsStore::new(),
            next_index: 0,
            last_timestamp: None,
            max_spacing,
            config,
        })
    }

    /// Process one raw sample
    ///
    /// # Arguments
    /// * `timestamp` - Sample time; must increase from call to call
    /// * `raw` - Raw amplitude in counts
    ///
    /// # Returns
    /// The event produced by this sample, if any. A non-finite sample is
    /// rejected with `EngineError::NonFiniteSample`, and a finite one whose
    /// energy no longer fits in an `f64` with `EngineError::SampleOverflow`.
    /// Either way all state is left as it was.
    pub fn process(&mut self, timestamp: DateTime<Utc>, raw: f64) -> Result<Option<Event>, EngineError> {
        self.step(timestamp, raw).map(|(_, _, event)| event)
    }

    /// Like [`process`](Self::process) but also returns the sample's trace row
    pub fn process_traced(
        &mut self,
        timestamp: DateTime<Utc>,
        raw: f64,
    ) -> Result<(DiagnosticRecord, Option<Event>), EngineError> {
        let (index, stages, event) = self.step(timestamp, raw)?;
        let record = DiagnosticRecord {
            sample_index: index,
            timestamp,
            raw,
            filtered: stages.filtered,
            sta: self.trigger.sta(),
            lta: self.trigger.lta(),
            ratio: stages.ratio,
        };
        Ok((record, event))
    }

    fn step(&mut self, timestamp: DateTime<Utc>, raw: f64) -> Result<(u64, Stages, Option<Event>), EngineError> {
        if !raw.is_finite() {
            self.reject(raw, "Rejected non-finite sample");
            return Err(EngineError::NonFiniteSample {
                channel: self.config.channel_id.to_string(),
                value: raw,
            });
        }

        let index = self.next_index;
        let gap = self.gap_before(timestamp);

        self.filter.save_state(&mut self.saved_filter);
        let saved_trigger = *self.trigger.state();
        if gap.is_some() {
            self.filter.reset();
            self.trigger.reset();
        }

        let amplitude = match self.config.sensitivity {
            Some(counts_per_unit) => raw / counts_per_unit,
            None => raw,
        };
        let filtered = self.filter.filter(amplitude);
        let ratio = self.trigger.update(filtered);

        let finite = [amplitude, filtered, ratio, self.trigger.sta(), self.trigger.lta()]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            self.filter.restore_state(&self.saved_filter);
            self.trigger.restore_state(saved_trigger);
            self.reject(raw, "Rejected sample overflowing the trigger state");
            return Err(EngineError::SampleOverflow {
                channel: self.config.channel_id.to_string(),
                value: raw,
            });
        }

        let gap_event = match gap {
            Some(spacing) => {
                tracing::warn!(
                    channel = %self.config.channel_id,
                    gap_ms = spacing.num_milliseconds(),
                    "Stream gap, restarting warm-up"
                );
                self.stats.record_gap_reset();
                self.alarm.force_reset(timestamp, index)
            }
            None => None,
        };
        let event = self.alarm.update(ratio, timestamp, index).or(gap_event);

        self.next_index += 1;
        self.last_timestamp = Some(timestamp);
        self.stats.record_ratio(ratio, timestamp);
        if let Some(event) = &event {
            self.stats.record_event(event);
        }

        Ok((index, Stages { filtered, ratio }, event))
    }

    fn reject(&mut self, raw: f64, reason: &'static str) {
        self.stats.record_rejected();
        tracing::warn!(
            channel = %self.config.channel_id,
            value = raw,
            rejected = self.stats.stats().samples_rejected,
            "{}",
            reason
        );
    }

    /// Spacing since the last sample when it exceeds the gap tolerance
    fn gap_before(&self, timestamp: DateTime<Utc>) -> Option<Duration> {
        let (Some(max_spacing), Some(last)) = (self.max_spacing, self.last_timestamp) else {
            return None;
        };
        let spacing = timestamp - last;
        (spacing > max_spacing).then_some(spacing)
    }

    /// Return to the cold state, keeping counters
    pub fn reset(&mut self) {
        self.filter.reset();
        self.trigger.reset();
        self.alarm.reset();
        self.last_timestamp = None;
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.config.channel_id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn filter(&self) -> &FilterBank {
        &self.filter
    }

    pub fn trigger(&self) -> &EnergyTrigger {
        &self.trigger
    }

    pub fn alarm(&self) -> &AlarmStateMachine {
        &self.alarm
    }

    pub fn stats(&self) -> &RunningStats {
        self.stats.stats()
    }

    pub fn store(&self) -> &StatsStore {
        &self.stats
    }

    /// Samples accepted so far
    pub fn samples_processed(&self) -> u64 {
        self.next_index
    }
}
