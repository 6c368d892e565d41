//! Seistrigger - streaming STA/LTA seismic event trigger
//!
//! This library re-exports the band-pass filter, energy trigger, alarm state
//! machine, channel routing and validation harness from `seistrigger-core`.
//!
//! The `seistrigger` binary replays recorded samples through the engine and
//! compares diagnostic traces of two runs.

pub use seistrigger_core::config;
pub use seistrigger_core::diagnostics;
pub use seistrigger_core::engine;
pub use seistrigger_core::stats;
pub use seistrigger_core::trigger;
pub use seistrigger_core::validation;

pub use seistrigger_core::{
    AlarmStateMachine, ChannelConfig, ChannelId, ChannelOrchestrator, ChannelPipeline, EnergyTrigger,
    EngineConfig, EngineError, Event, EventKind, EventReceiver, EventSink, FilterBank, Harness,
    SampleProcessor, ValidationConfig, WorkerPool,
};
pub use seistrigger_core::{
    DEFAULT_EVENT_DRIFT_SECS, DEFAULT_RATIO_TOLERANCE, DEFAULT_SAMPLE_RATE, LTA_FLOOR, VERSION,
};
