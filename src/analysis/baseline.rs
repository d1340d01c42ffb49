//! Baseline Builder: what does "normal" routing look like for this prefix?
//!
//! The baseline is computed once, before classification begins, and is never
//! mutated by events observed afterward. Letting classified events feed back
//! into the trust set would allow an attacker's own leaked path to whitelist
//! itself.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::event::UpdateEvent;
use crate::prefix::Prefix;

/// Paths of at most this many hops (origin plus at most one transit) are
/// treated as the trusted shape of legitimate routing.
pub const MAX_DIRECT_HOPS: usize = 2;

/// Frozen per-query snapshot of expected routing behavior.
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub target: Prefix,
    /// None means "unknown baseline": no origin was supplied and none could
    /// be inferred from in-window announcements.
    pub expected_origin: Option<u32>,
    /// Distinct direct paths considered trusted, origin last.
    pub normal_paths: BTreeSet<Vec<u32>>,
}

impl Baseline {
    pub fn is_unknown(&self) -> bool {
        self.expected_origin.is_none()
    }

    /// Does this announcement look like a return to normal routing?
    ///
    /// Requires the expected origin, with a baseline-matching path when any
    /// normal paths exist; with none, the check degrades to origin-only.
    pub fn matches_normal(&self, event: &UpdateEvent) -> bool {
        let Some(expected) = self.expected_origin else {
            return false;
        };
        if event.origin() != Some(expected) {
            return false;
        }
        self.normal_paths.is_empty() || self.normal_paths.contains(&event.as_path)
    }
}

/// Build the baseline from normalized events.
///
/// The expected origin is the supplied override, or the most frequent origin
/// across announce events for the exact target prefix (ties broken toward
/// the lower ASN for determinism). `baseline_window` restricts which events
/// feed the baseline; by default the whole analysis window does.
pub fn build(
    events: &[UpdateEvent],
    target: Prefix,
    supplied_origin: Option<u32>,
    baseline_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Baseline {
    let in_window = |event: &UpdateEvent| {
        baseline_window.map_or(true, |(start, end)| {
            event.timestamp >= start && event.timestamp <= end
        })
    };

    let exact: Vec<&UpdateEvent> = events
        .iter()
        .filter(|e| e.is_announce() && e.prefix == target && in_window(e))
        .collect();

    let expected_origin = supplied_origin.or_else(|| infer_origin(&exact));

    // Trusted shapes: distinct direct paths from the expected origin. An
    // unknown origin means no exact-target announces existed to infer it
    // from, so the trusted set is empty with it.
    let normal_paths: BTreeSet<Vec<u32>> = exact
        .iter()
        .filter(|e| !e.as_path.is_empty() && e.as_path.len() <= MAX_DIRECT_HOPS)
        .filter(|e| e.origin() == expected_origin)
        .map(|e| e.as_path.clone())
        .collect();

    debug!(
        %target,
        ?expected_origin,
        normal_paths = normal_paths.len(),
        "baseline frozen"
    );

    Baseline {
        target,
        expected_origin,
        normal_paths,
    }
}

fn infer_origin(exact_announces: &[&UpdateEvent]) -> Option<u32> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for event in exact_announces {
        if let Some(origin) = event.origin() {
            *counts.entry(origin).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(asn_a, count_a), (asn_b, count_b)| {
            count_a.cmp(count_b).then_with(|| asn_b.cmp(asn_a))
        })
        .map(|(asn, _)| asn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::UpdateKind;
    use chrono::TimeZone;

    fn announce(ts_secs: i64, prefix: &str, path: &[u32]) -> UpdateEvent {
        UpdateEvent {
            timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            prefix: prefix.parse().unwrap(),
            kind: UpdateKind::Announce,
            as_path: path.to_vec(),
            collector: "rrc00".to_string(),
            peer_asn: None,
            loop_flagged: false,
        }
    }

    fn target() -> Prefix {
        "1.1.1.0/24".parse().unwrap()
    }

    #[test]
    fn test_supplied_origin_wins_over_inference() {
        let events = vec![announce(0, "1.1.1.0/24", &[1299, 64500])];
        let baseline = build(&events, target(), Some(13335), None);
        assert_eq!(baseline.expected_origin, Some(13335));
    }

    #[test]
    fn test_origin_inferred_from_most_frequent() {
        let events = vec![
            announce(0, "1.1.1.0/24", &[1299, 13335]),
            announce(1, "1.1.1.0/24", &[6453, 13335]),
            announce(2, "1.1.1.0/24", &[3356, 64500]),
        ];
        let baseline = build(&events, target(), None, None);
        assert_eq!(baseline.expected_origin, Some(13335));
    }

    #[test]
    fn test_origin_tie_breaks_to_lower_asn() {
        let events = vec![
            announce(0, "1.1.1.0/24", &[1299, 64501]),
            announce(1, "1.1.1.0/24", &[1299, 64500]),
        ];
        let baseline = build(&events, target(), None, None);
        assert_eq!(baseline.expected_origin, Some(64500));
    }

    #[test]
    fn test_normal_paths_are_short_and_from_expected_origin() {
        let events = vec![
            announce(0, "1.1.1.0/24", &[1299, 13335]),
            announce(1, "1.1.1.0/24", &[13335]),
            // too long to be a trusted shape
            announce(2, "1.1.1.0/24", &[3356, 1299, 13335]),
            // wrong origin
            announce(3, "1.1.1.0/24", &[1299, 64500]),
            // wrong prefix: more specifics never feed the baseline
            announce(4, "1.1.1.0/25", &[174, 13335]),
        ];
        let baseline = build(&events, target(), Some(13335), None);
        assert_eq!(baseline.normal_paths.len(), 2);
        assert!(baseline.normal_paths.contains(&vec![1299, 13335]));
        assert!(baseline.normal_paths.contains(&vec![13335]));
    }

    #[test]
    fn test_unknown_baseline_marker() {
        // only a more-specific announce: nothing for the exact target
        let events = vec![announce(0, "1.1.1.1/32", &[64500])];
        let baseline = build(&events, target(), None, None);
        assert!(baseline.is_unknown());
        // an unknown origin always comes with an empty trusted set: any
        // exact-target announce would have made inference succeed
        assert!(baseline.normal_paths.is_empty());
    }

    #[test]
    fn test_baseline_window_override() {
        let events = vec![
            announce(100, "1.1.1.0/24", &[1299, 13335]),
            announce(500, "1.1.1.0/24", &[6453, 64500]),
        ];
        let window = (
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(200, 0).unwrap(),
        );
        let baseline = build(&events, target(), None, Some(window));
        // only the first announce is in the baseline window
        assert_eq!(baseline.expected_origin, Some(13335));
        assert_eq!(baseline.normal_paths.len(), 1);
    }

    #[test]
    fn test_recovery_match() {
        let events = vec![announce(0, "1.1.1.0/24", &[1299, 13335])];
        let baseline = build(&events, target(), Some(13335), None);
        assert!(baseline.matches_normal(&announce(10, "1.1.1.0/24", &[1299, 13335])));
        assert!(!baseline.matches_normal(&announce(10, "1.1.1.0/24", &[3356, 1299, 13335])));
        assert!(!baseline.matches_normal(&announce(10, "1.1.1.0/24", &[1299, 64500])));
    }
}
