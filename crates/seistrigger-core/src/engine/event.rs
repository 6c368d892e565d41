//! Channel identifiers and trigger events
//!
//! Events are immutable values handed to the external sink. Within one
//! channel they are produced in strictly increasing timestamp order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Cheaply clonable channel identifier (e.g. `AM.R6E01.00.EHZ`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl Borrow<str> for ChannelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of alarm transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Ratio reached the trigger threshold while idle
    Triggered,
    /// Ratio fell to the reset threshold while alarmed
    Reset,
    /// Alarm lasted longer than the maximum event duration
    TimeoutReset,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Triggered => "TRIGGERED",
            EventKind::Reset => "RESET",
            EventKind::TimeoutReset => "TIMEOUT RESET",
        };
        f.write_str(name)
    }
}

/// Alarm transition emitted by a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Channel that produced the event
    pub channel_id: ChannelId,
    /// Timestamp of the sample that caused the transition
    pub timestamp: DateTime<Utc>,
    /// Zero-based index of that sample within the channel's stream
    pub sample_index: u64,
    /// STA/LTA ratio at the transition
    pub ratio: f64,
    /// Highest ratio seen during the alarm episode
    pub peak_ratio: f64,
    /// Transition kind
    pub kind: EventKind,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Channel {}: {} (ratio: {:.4}, peak: {:.4})",
            self.timestamp, self.channel_id, self.kind, self.ratio, self.peak_ratio
        )
    }
}
