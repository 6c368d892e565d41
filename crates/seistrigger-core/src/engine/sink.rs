//! Bounded event hand-off to the external consumer
//!
//! The engine side holds an [`EventSink`] (cheap to clone, one per worker);
//! the consumer side holds the [`EventReceiver`]. Delivery failures are
//! counted and logged but never propagate into per-sample processing.

use crate::config::{OverflowPolicy, SinkConfig};
use crate::engine::event::Event;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why an event was not delivered
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[error("Event queue full, event dropped")]
    Full,

    #[error("Event receiver disconnected")]
    Disconnected,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of the sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    /// Events accepted by the queue
    pub delivered: u64,
    /// Events dropped because the queue was full
    pub dropped: u64,
    /// Events lost because the receiver was gone
    pub failed: u64,
}

/// Producer side of the event queue
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<Event>,
    policy: OverflowPolicy,
    counters: Arc<Counters>,
}

/// Consumer side of the event queue
#[derive(Debug)]
pub struct EventReceiver {
    rx: Receiver<Event>,
}

impl EventSink {
    /// Create a bounded sink/receiver pair
    ///
    /// # Arguments
    /// * `config` - Queue capacity and overflow policy
    pub fn bounded(config: &SinkConfig) -> (EventSink, EventReceiver) {
        let (tx, rx) = crossbeam_channel::bounded(config.capacity.max(1));
        let sink = EventSink {
            tx,
            policy: config.overflow,
            counters: Arc::new(Counters::default()),
        };
        (sink, EventReceiver { rx })
    }

    /// Hand an event to the consumer according to the overflow policy
    pub fn deliver(&self, event: Event) -> Result<(), SinkError> {
        let result = match self.policy {
            OverflowPolicy::Block => self.tx.send(event).map_err(|_| SinkError::Disconnected),
            OverflowPolicy::Drop => self.tx.try_send(event).map_err(|e| match e {
                TrySendError::Full(_) => SinkError::Full,
                TrySendError::Disconnected(_) => SinkError::Disconnected,
            }),
        };

        match result {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(SinkError::Full) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped, "Event queue full, dropping event");
            }
            Err(SinkError::Disconnected) => {
                let failed = self.counters.failed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(failed, "Event receiver gone, event lost");
            }
        }
        result
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl EventReceiver {
    /// Block until an event arrives; `None` once every sink is dropped
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    /// Wait at most `timeout` for an event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Take every event currently queued
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Iterate until every sink is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.rx.iter()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
