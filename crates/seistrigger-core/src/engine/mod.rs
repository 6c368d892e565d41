//! Channel routing and event hand-off
//!
//! Provides:
//! - [`channel::ChannelPipeline`]: one channel's filter → trigger → alarm chain
//! - [`orchestrator::ChannelOrchestrator`]: inline routing by channel id
//! - [`worker::WorkerPool`]: one thread per channel
//! - [`sink::EventSink`]: bounded hand-off of events to the consumer

pub mod channel;
pub mod event;
pub mod orchestrator;
pub mod sink;
pub mod worker;

use crate::config::ConfigError;
use thiserror::Error;

/// Errors that can occur while registering channels or routing samples
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration for channel {channel}")]
    InvalidConfig {
        channel: String,
        #[source]
        source: ConfigError,
    },

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel already registered: {0}")]
    DuplicateChannel(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Rejected non-finite sample {value} on channel {channel}")]
    NonFiniteSample { channel: String, value: f64 },

    #[error("Rejected sample {value} on channel {channel}: trigger state would overflow")]
    SampleOverflow { channel: String, value: f64 },

    #[error("Worker for channel {0} has stopped")]
    WorkerStopped(String),

    #[error("Failed to spawn worker for channel {channel}")]
    WorkerSpawn {
        channel: String,
        #[source]
        source: std::io::Error,
    },
}
