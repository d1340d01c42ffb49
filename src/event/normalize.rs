//! Event Normalizer: heterogeneous provider records in, canonical
//! time-sorted events out.
//!
//! Malformed records are dropped and counted, never fatal. The output order
//! is deterministic: ascending timestamp, ties broken by collector id, then
//! by arrival order (stable sort).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::{AsToken, RawRecord, TimestampToken, UpdateEvent, UpdateKind};
use crate::prefix::Prefix;

/// Counters for one normalization pass, surfaced in the final report.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct NormalizeStats {
    pub accepted: usize,
    pub dropped: usize,
    pub loop_flagged: usize,
}

/// Convert raw records into sorted canonical events.
///
/// `max_as_repeats` is the repeated-AS threshold above which a path is
/// loop-flagged (a prepend run counts once per occurrence).
pub fn normalize(records: Vec<RawRecord>, max_as_repeats: usize) -> (Vec<UpdateEvent>, NormalizeStats) {
    let mut stats = NormalizeStats::default();
    let mut events = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        match canonicalize(record, max_as_repeats) {
            Ok(event) => {
                if event.loop_flagged {
                    stats.loop_flagged += 1;
                }
                events.push(event);
            }
            Err(reason) => {
                stats.dropped += 1;
                debug!(record = index, %reason, "dropping malformed record");
            }
        }
    }
    stats.accepted = events.len();
    if stats.dropped > 0 {
        warn!(dropped = stats.dropped, accepted = stats.accepted, "skipped malformed provider records");
    }

    // Stable sort: equal (timestamp, collector) keys keep arrival order.
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.collector.cmp(&b.collector))
    });

    (events, stats)
}

fn canonicalize(record: RawRecord, max_as_repeats: usize) -> Result<UpdateEvent, String> {
    let timestamp = parse_timestamp(&record.timestamp)?;

    let kind = match record.kind.to_ascii_lowercase().as_str() {
        "a" | "announce" | "announcement" => UpdateKind::Announce,
        "w" | "withdraw" | "withdrawal" => UpdateKind::Withdraw,
        other => return Err(format!("unknown update kind '{other}'")),
    };

    let prefix: Prefix = record
        .prefix
        .parse()
        .map_err(|e| format!("bad prefix '{}': {e}", record.prefix))?;

    let mut as_path = Vec::with_capacity(record.as_path.len());
    for token in &record.as_path {
        match token {
            AsToken::Number(asn) => as_path.push(*asn),
            AsToken::Text(text) => {
                // AS-set tokens like "{64512,64513}" are malformed here
                let asn: u32 = text
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad AS-path token '{text}'"))?;
                as_path.push(asn);
            }
        }
    }

    if kind == UpdateKind::Announce && as_path.is_empty() {
        return Err("announce without AS path".to_string());
    }

    let loop_flagged = has_repeated_as(&as_path, max_as_repeats);
    if loop_flagged {
        debug!(%prefix, ?as_path, "path repeats an AS beyond threshold, flagging");
    }

    Ok(UpdateEvent {
        timestamp,
        prefix,
        kind,
        as_path,
        collector: record.collector,
        peer_asn: record.peer_asn,
        loop_flagged,
    })
}

fn parse_timestamp(token: &TimestampToken) -> Result<DateTime<Utc>, String> {
    match token {
        TimestampToken::Epoch(secs) => Utc
            .timestamp_opt(*secs, 0)
            .single()
            .ok_or_else(|| format!("epoch timestamp {secs} out of range")),
        TimestampToken::Text(text) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
                return Ok(ts.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                    return Ok(Utc.from_utc_datetime(&naive));
                }
            }
            Err(format!("unparsable timestamp '{text}'"))
        }
    }
}

fn has_repeated_as(path: &[u32], max_as_repeats: usize) -> bool {
    if max_as_repeats == 0 {
        return false;
    }
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for asn in path {
        let count = counts.entry(*asn).or_insert(0);
        *count += 1;
        if *count > max_as_repeats {
            return true;
        }
    }
    false
}
