//! Seistrigger Core - band-pass conditioning, recursive STA/LTA and alarm logic
//!
//! This library turns a continuous stream of digitized ground-motion samples
//! into trigger/reset events. Each channel owns a causal Butterworth band-pass
//! filter, a recursive STA/LTA energy estimator and a threshold/hysteresis
//! alarm state machine. Channels are routed by the [`ChannelOrchestrator`]
//! (inline) or the [`WorkerPool`] (one thread per channel).

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod stats;
pub mod trigger;
pub mod validation;

pub use config::{ChannelConfig, ConfigError, EngineConfig, LtaUpdate, OverflowPolicy, SinkConfig};
pub use diagnostics::{DiagnosticRecord, DiagnosticWriter, DiagnosticsError};
pub use engine::{
    channel::ChannelPipeline,
    event::{ChannelId, Event, EventKind},
    orchestrator::ChannelOrchestrator,
    sink::{EventReceiver, EventSink, SinkStats},
    worker::WorkerPool,
    EngineError,
};
pub use stats::store::{RunningStats, StatsStore};
pub use trigger::{alarm::AlarmStateMachine, filter::FilterBank, stalta::EnergyTrigger, SampleProcessor};
pub use validation::{Harness, ValidationConfig, ValidationReport};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate in Hz (Raspberry Shake geophone channels)
pub const DEFAULT_SAMPLE_RATE: f64 = 100.0;

/// Smallest LTA value the energy trigger will hold
pub const LTA_FLOOR: f64 = 1e-99;

/// Default maximum per-sample ratio divergence accepted by the validation harness
pub const DEFAULT_RATIO_TOLERANCE: f64 = 1e-6;

/// Default maximum event timestamp drift (seconds) accepted by the validation harness
pub const DEFAULT_EVENT_DRIFT_SECS: f64 = 0.5;
