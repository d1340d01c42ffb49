//! Timeline Builder: orders surviving anomalies into an incident narrative
//! with start, end (or ongoing), and recovery detection.

use std::collections::HashSet;

use tracing::debug;

use super::baseline::Baseline;
use super::{AnomalyEvent, IncidentTimeline};
use crate::event::UpdateEvent;

/// Build the incident timeline.
///
/// `events` is the full window (announces and retained withdraws) used to
/// find a recovery announcement: the first event after the last anomaly
/// that re-announces the exact target from the expected origin over a
/// baseline-matching path. Without one the incident is ongoing at window
/// end.
pub fn build(
    anomalies: Vec<AnomalyEvent>,
    events: &[UpdateEvent],
    baseline: &Baseline,
) -> IncidentTimeline {
    if anomalies.is_empty() {
        return IncidentTimeline {
            anomalies,
            start_time: None,
            end_time: None,
            ongoing: false,
            duration_secs: 0,
            distinct_offender_count: 0,
            anomaly_count: 0,
            recovered_at: None,
        };
    }

    let start = anomalies[0].timestamp;
    let last = anomalies[anomalies.len() - 1].timestamp;

    let recovered_at = events
        .iter()
        .filter(|e| e.timestamp > last && e.is_announce() && e.prefix == baseline.target)
        .find(|e| baseline.matches_normal(e))
        .map(|e| e.timestamp);

    let (end, ongoing) = match recovered_at {
        Some(ts) => (ts, false),
        None => (last, true),
    };

    let offenders: HashSet<u32> = anomalies.iter().map(|a| a.offending_asn).collect();

    debug!(
        anomalies = anomalies.len(),
        offenders = offenders.len(),
        ongoing,
        "timeline assembled"
    );

    IncidentTimeline {
        anomaly_count: anomalies.len(),
        distinct_offender_count: offenders.len(),
        anomalies,
        start_time: Some(start),
        end_time: Some(end),
        ongoing,
        duration_secs: (end - start).num_seconds(),
        recovered_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnomalyKind, Severity};
    use crate::event::UpdateKind;
    use crate::prefix::Prefix;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeSet;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn target() -> Prefix {
        "1.1.1.0/24".parse().unwrap()
    }

    fn baseline() -> Baseline {
        Baseline {
            target: target(),
            expected_origin: Some(13335),
            normal_paths: [vec![1299, 13335]].into_iter().collect::<BTreeSet<_>>(),
        }
    }

    fn anomaly_at(when: &str) -> AnomalyEvent {
        AnomalyEvent {
            kind: AnomalyKind::OriginMismatch,
            timestamp: ts(when),
            prefix: target(),
            observed_origin: 267613,
            expected_origin: Some(13335),
            as_path: vec![50763, 267613],
            evidence: Vec::new(),
            severity: Severity::High,
            offending_asn: 267613,
            collectors: vec!["rrc00".to_string()],
        }
    }

    fn announce_at(when: &str, prefix: &str, path: &[u32]) -> UpdateEvent {
        UpdateEvent {
            timestamp: ts(when),
            prefix: prefix.parse().unwrap(),
            kind: UpdateKind::Announce,
            as_path: path.to_vec(),
            collector: "rrc00".to_string(),
            peer_asn: None,
            loop_flagged: false,
        }
    }

    #[test]
    fn test_ongoing_without_recovery() {
        let anomalies = vec![
            anomaly_at("2024-06-27T18:49:06Z"),
            anomaly_at("2024-06-28T02:28:00Z"),
        ];
        let timeline = build(anomalies, &[], &baseline());
        assert_eq!(timeline.start_time, Some(ts("2024-06-27T18:49:06Z")));
        assert_eq!(timeline.end_time, Some(ts("2024-06-28T02:28:00Z")));
        assert!(timeline.ongoing);
        assert_eq!(timeline.recovered_at, None);
        assert_eq!(timeline.duration_secs, 7 * 3600 + 38 * 60 + 54);
        assert_eq!(timeline.anomaly_count, 2);
        assert_eq!(timeline.distinct_offender_count, 1);
    }

    #[test]
    fn test_recovery_closes_incident() {
        let anomalies = vec![anomaly_at("2024-06-27T18:49:06Z")];
        let events = vec![
            // wrong origin after the anomaly: not a recovery
            announce_at("2024-06-27T19:00:00Z", "1.1.1.0/24", &[50763, 267613]),
            // expected origin over the trusted path: recovery
            announce_at("2024-06-27T20:15:00Z", "1.1.1.0/24", &[1299, 13335]),
            announce_at("2024-06-27T21:00:00Z", "1.1.1.0/24", &[1299, 13335]),
        ];
        let timeline = build(anomalies, &events, &baseline());
        assert!(!timeline.ongoing);
        assert_eq!(timeline.end_time, Some(ts("2024-06-27T20:15:00Z")));
        assert_eq!(timeline.recovered_at, Some(ts("2024-06-27T20:15:00Z")));
    }

    #[test]
    fn test_recovery_must_follow_last_anomaly() {
        let anomalies = vec![
            anomaly_at("2024-06-27T18:49:06Z"),
            anomaly_at("2024-06-27T21:00:00Z"),
        ];
        // good announcement between the anomalies, none after the last one
        let events = vec![announce_at(
            "2024-06-27T19:30:00Z",
            "1.1.1.0/24",
            &[1299, 13335],
        )];
        let timeline = build(anomalies, &events, &baseline());
        assert!(timeline.ongoing);
        assert_eq!(timeline.end_time, Some(ts("2024-06-27T21:00:00Z")));
    }

    #[test]
    fn test_more_specific_announce_is_not_recovery() {
        let anomalies = vec![anomaly_at("2024-06-27T18:49:06Z")];
        let events = vec![announce_at(
            "2024-06-27T19:00:00Z",
            "1.1.1.0/25",
            &[1299, 13335],
        )];
        let timeline = build(anomalies, &events, &baseline());
        assert!(timeline.ongoing);
    }

    #[test]
    fn test_empty_anomalies_yield_null_timeline() {
        let timeline = build(Vec::new(), &[], &baseline());
        assert_eq!(timeline.start_time, None);
        assert_eq!(timeline.end_time, None);
        assert!(!timeline.ongoing);
        assert_eq!(timeline.duration_secs, 0);
        assert_eq!(timeline.anomaly_count, 0);
        assert_eq!(timeline.distinct_offender_count, 0);
    }
}
