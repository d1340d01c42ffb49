//! Deduplicator/Aggregator: collapse the same logical anomaly observed by
//! multiple collectors and peers into one representative record.
//!
//! Anomalies sharing (kind, offending AS, prefix) within the time tolerance
//! of the group's earliest member merge into it: the earliest timestamp is
//! kept and corroborating collector ids are unioned as evidence.

use chrono::Duration;

use super::AnomalyEvent;

/// Merge duplicates. Input must be time-ordered; output stays time-ordered.
pub fn merge(anomalies: Vec<AnomalyEvent>, tolerance: Duration) -> Vec<AnomalyEvent> {
    let mut merged: Vec<AnomalyEvent> = Vec::new();

    'next_anomaly: for mut candidate in anomalies {
        for kept in merged.iter_mut() {
            if kept.kind == candidate.kind
                && kept.offending_asn == candidate.offending_asn
                && kept.prefix == candidate.prefix
                && candidate.timestamp - kept.timestamp <= tolerance
            {
                for collector in std::mem::take(&mut candidate.collectors) {
                    if !kept.collectors.contains(&collector) {
                        kept.collectors.push(collector);
                    }
                }
                kept.collectors.sort();
                continue 'next_anomaly;
            }
        }
        merged.push(candidate);
    }

    merged
}
