use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entry::LedgerEntry;
use super::transaction::Transaction;

/// Which stage produced a committed match. Purely an audit tag; it does not
/// affect matching behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOrigin {
    Pass1,
    Pass2,
    Manual,
    Duplicate,
    Divergence,
    Synthesized,
    MappingRule,
}

impl fmt::Display for MatchOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOrigin::Pass1 => write!(f, "pass1"),
            MatchOrigin::Pass2 => write!(f, "pass2"),
            MatchOrigin::Manual => write!(f, "manual"),
            MatchOrigin::Duplicate => write!(f, "duplicate"),
            MatchOrigin::Divergence => write!(f, "divergence"),
            MatchOrigin::Synthesized => write!(f, "synthesized"),
            MatchOrigin::MappingRule => write!(f, "mapping-rule"),
        }
    }
}

/// A committed (transaction, entry) pairing with its score.
///
/// Destroyed only by an explicit human undo, which must also emit a
/// `HumanDecision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub transaction: Transaction,
    pub entry: LedgerEntry,
    /// Similarity score in [0, 1] at commit time.
    pub score: f64,
    /// True when the score cleared the configured automatic threshold.
    /// Pass-2 and manual matches are always false.
    pub automatic: bool,
    pub origin: MatchOrigin,
    pub matched_at: DateTime<Utc>,
}

impl MatchCandidate {
    pub fn new(
        transaction: Transaction,
        entry: LedgerEntry,
        score: f64,
        automatic: bool,
        origin: MatchOrigin,
    ) -> Self {
        MatchCandidate {
            transaction,
            entry,
            score: score.clamp(0.0, 1.0),
            automatic,
            origin,
            matched_at: Utc::now(),
        }
    }
}
