//! Ratio, trace and event comparison
//!
//! Both streams are aligned by sequence position. Ratios pass when every
//! per-sample difference is within the tolerance and the lengths agree.
//! Events pass when every pair has the same kind and a timestamp drift
//! strictly below the allowed window.

use crate::diagnostics::DiagnosticRecord;
use crate::engine::event::{Event, EventKind};
use crate::{DEFAULT_EVENT_DRIFT_SECS, DEFAULT_RATIO_TOLERANCE};
use serde::{Deserialize, Serialize};

/// Number of ratio mismatches kept for the report
const MAX_REPORTED_MISMATCHES: usize = 10;

fn default_ratio_tolerance() -> f64 {
    DEFAULT_RATIO_TOLERANCE
}

fn default_event_drift() -> f64 {
    DEFAULT_EVENT_DRIFT_SECS
}

/// Acceptance limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Largest accepted per-sample ratio difference
    #[serde(default = "default_ratio_tolerance")]
    pub ratio_tolerance: f64,
    /// Event timestamps must differ by less than this many seconds
    #[serde(default = "default_event_drift")]
    pub event_drift: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            ratio_tolerance: default_ratio_tolerance(),
            event_drift: default_event_drift(),
        }
    }
}

/// One sample whose ratio differs by more than the tolerance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioMismatch {
    pub index: usize,
    pub reference: f64,
    pub candidate: f64,
    pub diff: f64,
}

/// Result of a per-sample ratio comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioComparison {
    /// Samples compared (the shorter of the two lengths)
    pub compared: usize,
    pub max_abs_diff: f64,
    /// Position of `max_abs_diff`
    pub max_diff_index: Option<usize>,
    /// Samples above the tolerance
    pub exceed_count: usize,
    /// First mismatches, in stream order
    pub mismatches: Vec<RatioMismatch>,
    /// `(reference_len, candidate_len)` when they differ
    pub length_mismatch: Option<(usize, usize)>,
    pub tolerance: f64,
}

impl RatioComparison {
    pub fn passed(&self) -> bool {
        self.exceed_count == 0 && self.length_mismatch.is_none()
    }
}

/// Result of comparing two diagnostic traces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceComparison {
    pub max_filtered_diff: f64,
    pub max_sta_diff: f64,
    pub max_lta_diff: f64,
    pub ratios: RatioComparison,
}

impl TraceComparison {
    pub fn passed(&self) -> bool {
        self.ratios.passed()
    }
}

/// Classification of one aligned event pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMatch {
    /// Same kind, drift below the window
    Match,
    /// Same kind, drift at or above the window
    TimeDrift,
    /// Different kinds at the same position
    KindMismatch,
    /// Only the reference has an event at this position
    ReferenceOnly,
    /// Only the candidate has an event at this position
    CandidateOnly,
}

/// One row of the event comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub position: usize,
    pub status: EventMatch,
    pub reference: Option<Event>,
    pub candidate: Option<Event>,
    /// `candidate - reference` in seconds, when both exist
    pub drift_secs: Option<f64>,
}

/// Result of an event comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventComparison {
    pub rows: Vec<EventRow>,
    /// Largest absolute drift over all paired rows
    pub max_drift_secs: f64,
    pub drift_window: f64,
}

impl EventComparison {
    pub fn passed(&self) -> bool {
        self.rows.iter().all(|r| r.status == EventMatch::Match)
    }

    /// Rows with the given status
    pub fn count(&self, status: EventMatch) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }
}

/// Combined acceptance report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub config: ValidationConfig,
    pub traces: Option<TraceComparison>,
    pub ratios: Option<RatioComparison>,
    pub events: Option<EventComparison>,
}

impl ValidationReport {
    /// True when every comparison that ran passed
    pub fn passed(&self) -> bool {
        self.traces.as_ref().map_or(true, |t| t.passed())
            && self.ratios.as_ref().map_or(true, |r| r.passed())
            && self.events.as_ref().map_or(true, |e| e.passed())
    }
}

/// Runs comparisons under one set of acceptance limits
#[derive(Debug, Clone, Copy, Default)]
pub struct Harness {
    config: ValidationConfig,
}

impl Harness {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Compare two ratio sequences position by position
    ///
    /// A non-finite value on either side counts as an infinite difference.
    pub fn compare_ratios(&self, reference: &[f64], candidate: &[f64]) -> RatioComparison {
        let tolerance = self.config.ratio_tolerance;
        let mut result = RatioComparison {
            compared: reference.len().min(candidate.len()),
            max_abs_diff: 0.0,
            max_diff_index: None,
            exceed_count: 0,
            mismatches: Vec::new(),
            length_mismatch: (reference.len() != candidate.len())
                .then_some((reference.len(), candidate.len())),
            tolerance,
        };

        for (index, (&r, &c)) in reference.iter().zip(candidate).enumerate() {
            let diff = abs_diff(r, c);
            if diff > result.max_abs_diff || result.max_diff_index.is_none() {
                result.max_abs_diff = diff;
                result.max_diff_index = Some(index);
            }
            if diff > tolerance {
                result.exceed_count += 1;
                if result.mismatches.len() < MAX_REPORTED_MISMATCHES {
                    result.mismatches.push(RatioMismatch {
                        index,
                        reference: r,
                        candidate: c,
                        diff,
                    });
                }
            }
        }

        tracing::debug!(
            compared = result.compared,
            max_abs_diff = result.max_abs_diff,
            exceeded = result.exceed_count,
            "Ratio comparison done"
        );
        result
    }

    /// Compare two diagnostic traces on every intermediate value
    pub fn compare_traces(&self, reference: &[DiagnosticRecord], candidate: &[DiagnosticRecord]) -> TraceComparison {
        let max_of = |field: fn(&DiagnosticRecord) -> f64| {
            reference
                .iter()
                .zip(candidate)
                .map(|(r, c)| abs_diff(field(r), field(c)))
                .fold(0.0, f64::max)
        };

        let reference_ratios: Vec<f64> = reference.iter().map(|r| r.ratio).collect();
        let candidate_ratios: Vec<f64> = candidate.iter().map(|r| r.ratio).collect();

        TraceComparison {
            max_filtered_diff: max_of(|r| r.filtered),
            max_sta_diff: max_of(|r| r.sta),
            max_lta_diff: max_of(|r| r.lta),
            ratios: self.compare_ratios(&reference_ratios, &candidate_ratios),
        }
    }

    /// Align two event streams by position and classify every row
    pub fn compare_events(&self, reference: &[Event], candidate: &[Event]) -> EventComparison {
        let rows_len = reference.len().max(candidate.len());
        let mut rows = Vec::with_capacity(rows_len);
        let mut max_drift_secs: f64 = 0.0;

        for position in 0..rows_len {
            let r = reference.get(position);
            let c = candidate.get(position);

            let (status, drift_secs) = match (r, c) {
                (Some(r), Some(c)) => {
                    let drift = (c.timestamp - r.timestamp)
                        .num_nanoseconds()
                        .map_or(f64::INFINITY, |ns| ns as f64 / 1e9);
                    max_drift_secs = max_drift_secs.max(drift.abs());
                    (classify(r.kind, c.kind, drift, self.config.event_drift), Some(drift))
                }
                (Some(_), None) => (EventMatch::ReferenceOnly, None),
                (None, _) => (EventMatch::CandidateOnly, None),
            };

            rows.push(EventRow {
                position,
                status,
                reference: r.cloned(),
                candidate: c.cloned(),
                drift_secs,
            });
        }

        EventComparison {
            rows,
            max_drift_secs,
            drift_window: self.config.event_drift,
        }
    }

    /// Run every comparison that has input
    pub fn report(
        &self,
        ratios: Option<(&[f64], &[f64])>,
        traces: Option<(&[DiagnosticRecord], &[DiagnosticRecord])>,
        events: Option<(&[Event], &[Event])>,
    ) -> ValidationReport {
        let report = ValidationReport {
            config: self.config,
            traces: traces.map(|(r, c)| self.compare_traces(r, c)),
            ratios: ratios.map(|(r, c)| self.compare_ratios(r, c)),
            events: events.map(|(r, c)| self.compare_events(r, c)),
        };
        tracing::info!(passed = report.passed(), "Validation finished");
        report
    }
}

fn abs_diff(a: f64, b: f64) -> f64 {
    if a.is_finite() && b.is_finite() {
        (a - b).abs()
    } else if a.to_bits() == b.to_bits() {
        0.0
    } else {
        f64::INFINITY
    }
}

fn classify(reference: EventKind, candidate: EventKind, drift: f64, window: f64) -> EventMatch {
    if reference != candidate {
        EventMatch::KindMismatch
    } else if drift.abs() < window {
        EventMatch::Match
    } else {
        EventMatch::TimeDrift
    }
}
