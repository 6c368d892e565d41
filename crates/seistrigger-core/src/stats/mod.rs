//! Per-channel statistics
//!
//! Running counters and a bounded history of recent events.

pub mod store;
