//! Running statistics and event history for one channel
//!
//! Keeps counters for every sample outcome plus the most recent events, with
//! automatic eviction of the oldest entries.

use crate::engine::event::{Event, EventKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Maximum number of events kept in recent history
const MAX_EVENT_HISTORY: usize = 256;

/// Running statistics of one channel
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RunningStats {
    /// Samples that went through the full chain
    pub samples_processed: u64,
    /// Non-finite samples rejected before the filter
    pub samples_rejected: u64,
    /// `Triggered` events emitted
    pub triggers: u64,
    /// `Reset` events emitted
    pub resets: u64,
    /// `TimeoutReset` events emitted
    pub timeout_resets: u64,
    /// State resets caused by gaps in the sample stream
    pub gap_resets: u64,
    /// Most recent ratio
    pub current_ratio: f64,
    /// Highest ratio observed since the last clear
    pub max_ratio: f64,
    /// Timestamp of the most recent processed sample
    pub last_sample: Option<DateTime<Utc>>,
}

/// Statistics store for one channel
#[derive(Debug, Clone)]
pub struct StatsStore {
    /// Recent events, oldest first
    events: VecDeque<Event>,
    /// Maximum event history size
    max_events: usize,
    stats: RunningStats,
}

impl StatsStore {
    /// Create a new statistics store
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENT_HISTORY)
    }

    /// Create a store keeping at most `max_events` events
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(MAX_EVENT_HISTORY)),
            max_events: max_events.max(1),
            stats: RunningStats::default(),
        }
    }

    /// Record the ratio of a processed sample
    ///
    /// # Arguments
    /// * `ratio` - STA/LTA ratio (0 during warm-up)
    /// * `timestamp` - Sample timestamp
    pub fn record_ratio(&mut self, ratio: f64, timestamp: DateTime<Utc>) {
        self.stats.samples_processed += 1;
        self.stats.current_ratio = ratio;
        self.stats.max_ratio = self.stats.max_ratio.max(ratio);
        self.stats.last_sample = Some(timestamp);
    }

    /// Record a rejected (non-finite) sample
    pub fn record_rejected(&mut self) {
        self.stats.samples_rejected += 1;
    }

    /// Record a stream-gap state reset
    pub fn record_gap_reset(&mut self) {
        self.stats.gap_resets += 1;
    }

    /// Record an emitted event
    pub fn record_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::Triggered => self.stats.triggers += 1,
            EventKind::Reset => self.stats.resets += 1,
            EventKind::TimeoutReset => self.stats.timeout_resets += 1,
        }

        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event.clone());
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Recent events, oldest first
    pub fn recent_events(&self) -> &VecDeque<Event> {
        &self.events
    }

    /// Events at or after `since`
    pub fn events_since(&self, since: DateTime<Utc>) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }

    /// Most recent event, if any
    pub fn last_event(&self) -> Option<&Event> {
        self.events.back()
    }

    /// Clear all counters and history
    pub fn clear(&mut self) {
        self.events.clear();
        self.stats = RunningStats::default();
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}
