//! Offline comparison of two independent runs
//!
//! Used to certify a reimplementation against a reference before it goes
//! live. Nothing here runs on the per-sample path.

pub mod harness;

pub use harness::{
    EventComparison, EventMatch, EventRow, Harness, RatioComparison, RatioMismatch, TraceComparison,
    ValidationConfig, ValidationReport,
};
