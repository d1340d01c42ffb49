//! Per-query orchestration of the analysis pipeline.
//!
//! One call to [`run`] owns everything a query needs: the frozen baseline,
//! the classifier's dedup state, and the timeline. Nothing survives the
//! call, so concurrent queries can never contaminate each other.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::baseline;
use super::classify::classify;
use super::dedup;
use super::timeline;
use super::{AnalysisError, AnomalyEvent, InvestigationReport};
use crate::event::normalize::normalize;
use crate::event::{RawRecord, UpdateEvent};
use crate::prefix::Prefix;

/// Repeated-AS threshold above which a path is loop-flagged.
pub const DEFAULT_MAX_AS_REPEATS: usize = 4;

/// Window within which multi-collector duplicates of one anomaly merge.
pub const DEFAULT_MERGE_TOLERANCE_SECS: i64 = 300;

/// Configuration for one investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target prefix in CIDR notation.
    pub target_prefix: String,
    /// Expected origin AS; inferred from the window when absent.
    pub expected_origin: Option<u32>,
    pub window_start: DateTime<Utc>,
    pub window_duration_secs: i64,
    /// Restricts which events feed the baseline; defaults to the whole
    /// analysis window.
    pub baseline_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub max_as_repeats: usize,
    pub merge_tolerance_secs: i64,
}

impl EngineConfig {
    pub fn new(target_prefix: &str, window_start: DateTime<Utc>, window_duration_secs: i64) -> Self {
        Self {
            target_prefix: target_prefix.to_string(),
            expected_origin: None,
            window_start,
            window_duration_secs,
            baseline_window: None,
            max_as_repeats: DEFAULT_MAX_AS_REPEATS,
            merge_tolerance_secs: DEFAULT_MERGE_TOLERANCE_SECS,
        }
    }

    pub fn with_expected_origin(mut self, asn: u32) -> Self {
        self.expected_origin = Some(asn);
        self
    }
}

/// Run one investigation over an already-collected window of raw records.
///
/// The pass is single-threaded and strictly sequential: dedup state and
/// baseline freezing are order-dependent.
pub fn run(
    config: &EngineConfig,
    records: Vec<RawRecord>,
) -> Result<InvestigationReport, AnalysisError> {
    let target: Prefix =
        config
            .target_prefix
            .parse()
            .map_err(|source| AnalysisError::InvalidPrefix {
                prefix: config.target_prefix.clone(),
                source,
            })?;
    if config.window_duration_secs < 0 {
        return Err(AnalysisError::WindowInverted);
    }
    let window_start = config.window_start;
    let window_end = window_start + Duration::seconds(config.window_duration_secs);

    info!(%target, %window_start, %window_end, records = records.len(), "starting investigation");

    let (events, stats) = normalize(records, config.max_as_repeats);

    // Restrict to the analysis window and the target's address space. An
    // empty result is "no anomalies found", never an error.
    let relevant: Vec<UpdateEvent> = events
        .into_iter()
        .filter(|e| e.timestamp >= window_start && e.timestamp <= window_end)
        .filter(|e| e.prefix.matches_target(&target))
        .collect();

    let announcements = relevant.iter().filter(|e| e.is_announce()).count();
    let withdrawals = relevant.iter().filter(|e| e.is_withdraw()).count();

    let frozen = baseline::build(&relevant, target, config.expected_origin, config.baseline_window);
    if frozen.is_unknown() {
        warn!(%target, "no baseline origin established; path-shape heuristics only");
    }

    let found = classify(&relevant, &frozen)?;
    let merged = dedup::merge(found, Duration::seconds(config.merge_tolerance_secs));
    let timeline = timeline::build(merged, &relevant, &frozen);
    let involved_asns = involved_asns(&timeline.anomalies, frozen.expected_origin);

    info!(
        anomalies = timeline.anomaly_count,
        offenders = timeline.distinct_offender_count,
        ongoing = timeline.ongoing,
        "investigation complete"
    );

    Ok(InvestigationReport {
        id: Uuid::new_v4(),
        target,
        expected_origin: frozen.expected_origin,
        unknown_baseline: frozen.is_unknown(),
        window_start,
        window_end,
        stats,
        announcements,
        withdrawals,
        baseline: frozen,
        timeline,
        involved_asns,
    })
}

fn involved_asns(anomalies: &[AnomalyEvent], expected_origin: Option<u32>) -> Vec<u32> {
    let mut involved: BTreeSet<u32> = BTreeSet::new();
    for anomaly in anomalies {
        involved.extend(anomaly.as_path.iter().copied());
        involved.insert(anomaly.offending_asn);
    }
    if let Some(expected) = expected_origin {
        involved.remove(&expected);
    }
    involved.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AsToken, TimestampToken};

    fn record(ts: &str, kind: &str, prefix: &str, path: &[u32], collector: &str) -> RawRecord {
        RawRecord {
            timestamp: TimestampToken::Text(ts.to_string()),
            kind: kind.to_string(),
            prefix: prefix.to_string(),
            as_path: path.iter().map(|a| AsToken::Number(*a)).collect(),
            collector: collector.to_string(),
            peer_asn: None,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::new(
            "1.1.1.0/24",
            "2024-06-27T18:00:00Z".parse().unwrap(),
            24 * 3600,
        )
        .with_expected_origin(13335)
    }

    #[test]
    fn test_empty_input_is_no_anomalies() {
        let report = run(&config(), Vec::new()).unwrap();
        assert_eq!(report.timeline.anomaly_count, 0);
        assert_eq!(report.timeline.start_time, None);
        assert_eq!(report.timeline.end_time, None);
        assert!(!report.unknown_baseline);
        assert!(report.involved_asns.is_empty());
    }

    #[test]
    fn test_invalid_target_prefix_is_an_error() {
        let mut bad = config();
        bad.target_prefix = "not-a-prefix".to_string();
        assert!(matches!(
            run(&bad, Vec::new()),
            Err(AnalysisError::InvalidPrefix { .. })
        ));
    }

    #[test]
    fn test_inverted_window_is_an_error() {
        let mut bad = config();
        bad.window_duration_secs = -1;
        assert!(matches!(
            run(&bad, Vec::new()),
            Err(AnalysisError::WindowInverted)
        ));
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let records = vec![
            // before the window
            record("2024-06-27T17:59:59Z", "A", "1.1.1.0/24", &[50763, 267613], "rrc00"),
            // after the window
            record("2024-06-28T18:00:01Z", "A", "1.1.1.0/24", &[50763, 267613], "rrc00"),
        ];
        let report = run(&config(), records).unwrap();
        assert_eq!(report.announcements, 0);
        assert_eq!(report.timeline.anomaly_count, 0);
    }

    #[test]
    fn test_unknown_baseline_marker_set() {
        let cfg = EngineConfig::new(
            "1.1.1.0/24",
            "2024-06-27T18:00:00Z".parse().unwrap(),
            24 * 3600,
        );
        // only a more-specific announce, nothing for the exact target
        let records = vec![record(
            "2024-06-27T18:30:00Z",
            "A",
            "1.1.1.1/32",
            &[50763, 267613],
            "rrc00",
        )];
        let report = run(&cfg, records).unwrap();
        assert!(report.unknown_baseline);
        assert_eq!(report.expected_origin, None);
        // origin rules disabled: the rogue more-specific is not reported
        assert_eq!(report.timeline.anomaly_count, 0);
    }

    #[test]
    fn test_involved_asns_exclude_expected_origin() {
        let records = vec![
            record("2024-06-27T18:10:00Z", "A", "1.1.1.0/24", &[1299, 13335], "rrc00"),
            record("2024-06-27T18:49:06Z", "A", "1.1.1.0/24", &[50763, 262504, 13335], "rrc00"),
        ];
        let report = run(&config(), records).unwrap();
        assert_eq!(report.involved_asns, vec![50763, 262504]);
    }
}
