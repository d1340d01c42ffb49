//! RouteTriage -- forensic reconstruction of BGP hijack and route-leak
//! incidents.
//!
//! The engine classifies a bounded, already-collected window of routing
//! update records against a frozen baseline of expected behavior and
//! rebuilds the incident timeline, including recovery detection. Fetching
//! records from archival or live providers and rendering reports belong to
//! external collaborators; this crate consumes an orderable collection of
//! raw records and produces a structured [`analysis::InvestigationReport`].

pub mod analysis;
pub mod event;
pub mod prefix;

pub use analysis::engine::EngineConfig;
pub use analysis::{AnalysisError, InvestigationReport};
pub use event::RawRecord;

/// Run one investigation over an already-collected window of raw records.
pub fn investigate(
    config: &EngineConfig,
    records: Vec<RawRecord>,
) -> Result<InvestigationReport, AnalysisError> {
    analysis::engine::run(config, records)
}
