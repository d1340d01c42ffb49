//! Incident analysis: baseline modeling, anomaly classification,
//! deduplication, and timeline reconstruction.
//!
//! The pipeline is strictly linear and single-threaded per query:
//! normalized events -> frozen baseline -> ordered rule classification ->
//! duplicate collapse -> incident timeline. See [`engine`] for the wiring.

pub mod baseline;
pub mod classify;
pub mod dedup;
pub mod engine;
pub mod timeline;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::event::normalize::NormalizeStats;
use crate::prefix::{Prefix, PrefixError};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid target prefix '{prefix}': {source}")]
    InvalidPrefix {
        prefix: String,
        #[source]
        source: PrefixError,
    },
    /// Internal consistency violation: the normalizer guarantees sorted
    /// output, so out-of-order events reaching the classifier are a bug,
    /// not bad input.
    #[error("events reached the classifier out of order at position {position}")]
    NonMonotonicEvents { position: usize },
    #[error("analysis window ends before it starts")]
    WindowInverted,
}

/// Severity of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// The mutually-exclusive anomaly classes, in rule-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    MoreSpecificHijack,
    OriginMismatch,
    RouteLeak,
}

/// One classified routing anomaly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    pub timestamp: DateTime<Utc>,
    pub prefix: Prefix,
    pub observed_origin: u32,
    pub expected_origin: Option<u32>,
    pub as_path: Vec<u32>,
    /// Baseline path(s) consulted when this anomaly was raised.
    pub evidence: Vec<Vec<u32>>,
    pub severity: Severity,
    /// The network held responsible: the rogue origin for hijacks, the
    /// injected intermediate AS for leaks.
    pub offending_asn: u32,
    /// Corroborating collectors; grows as duplicates are merged.
    pub collectors: Vec<String>,
}

impl AnomalyEvent {
    pub fn dedup_key(&self) -> (u32, AnomalyKind) {
        (self.offending_asn, self.kind)
    }
}

/// Chronological incident narrative built from surviving anomalies.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentTimeline {
    /// Time-ordered anomalies; owned by the timeline once aggregated.
    pub anomalies: Vec<AnomalyEvent>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// True when no recovery announcement was seen before window end.
    pub ongoing: bool,
    pub duration_secs: i64,
    pub distinct_offender_count: usize,
    pub anomaly_count: usize,
    pub recovered_at: Option<DateTime<Utc>>,
}

/// The engine's structured output, consumable by a report renderer or an
/// AI-synthesis collaborator.
#[derive(Debug, Serialize)]
pub struct InvestigationReport {
    pub id: uuid::Uuid,
    pub target: Prefix,
    pub expected_origin: Option<u32>,
    /// Set when no expected origin was supplied and none could be inferred;
    /// classification then runs path-shape heuristics only.
    pub unknown_baseline: bool,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub stats: NormalizeStats,
    pub announcements: usize,
    pub withdrawals: usize,
    pub baseline: baseline::Baseline,
    pub timeline: IncidentTimeline,
    /// Distinct ASes appearing in anomalous paths, expected origin excluded.
    pub involved_asns: Vec<u32>,
}
