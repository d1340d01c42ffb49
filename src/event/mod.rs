//! Routing-update events: raw provider records and their canonical form.

pub mod normalize;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prefix::Prefix;

/// Announce/withdraw indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Announce,
    Withdraw,
}

/// A raw update record as emitted by an archival or live data provider.
///
/// Field shapes are deliberately loose: providers disagree on timestamp
/// encoding (RFC 3339, naive datetime, epoch seconds) and on whether AS-path
/// entries arrive as numbers or strings. The normalizer resolves all of that
/// or drops the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: TimestampToken,
    /// `A`/`W` or `announce`/`withdraw`, case insensitive.
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    pub prefix: String,
    #[serde(default)]
    pub as_path: Vec<AsToken>,
    pub collector: String,
    #[serde(default)]
    pub peer_asn: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampToken {
    Epoch(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AsToken {
    Number(u32),
    Text(String),
}

/// A canonical update event. AS-path is ordered with the origin last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEvent {
    pub timestamp: DateTime<Utc>,
    pub prefix: Prefix,
    pub kind: UpdateKind,
    pub as_path: Vec<u32>,
    pub collector: String,
    pub peer_asn: Option<u32>,
    /// Set when the path repeats one AS beyond the configured threshold.
    /// Flagged events still flow through classification.
    pub loop_flagged: bool,
}

impl UpdateEvent {
    pub fn is_announce(&self) -> bool {
        self.kind == UpdateKind::Announce
    }

    pub fn is_withdraw(&self) -> bool {
        self.kind == UpdateKind::Withdraw
    }

    /// Origin AS: the last entry of the path, if any.
    pub fn origin(&self) -> Option<u32> {
        self.as_path.last().copied()
    }
}
