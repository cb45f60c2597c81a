use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    Accept,
    Ignore,
    Correct,
    Undo,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionKind::Accept => write!(f, "accept"),
            DecisionKind::Ignore => write!(f, "ignore"),
            DecisionKind::Correct => write!(f, "correct"),
            DecisionKind::Undo => write!(f, "undo"),
        }
    }
}

impl FromStr for DecisionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(DecisionKind::Accept),
            "ignore" => Ok(DecisionKind::Ignore),
            "correct" => Ok(DecisionKind::Correct),
            "undo" => Ok(DecisionKind::Undo),
            other => Err(format!("Unknown decision kind: '{other}'")),
        }
    }
}

/// One reviewer action on a proposed or existing match, with the pair
/// features observed at decision time. Append-only audit record; the
/// learner consumes these, nothing mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanDecision {
    pub kind: DecisionKind,
    pub transaction_id: String,
    pub entry_id: Option<String>,
    /// Relative value difference of the pair at decision time.
    pub value_divergence: f64,
    /// Calendar days between transaction and entry at decision time.
    pub day_gap: u32,
    /// Description similarity of the pair at decision time, in [0, 1].
    pub text_similarity: f64,
    pub actor: String,
    pub decided_at: DateTime<Utc>,
}

impl HumanDecision {
    pub fn new(kind: DecisionKind, transaction_id: &str, entry_id: Option<&str>, actor: &str) -> Self {
        HumanDecision {
            kind,
            transaction_id: transaction_id.to_string(),
            entry_id: entry_id.map(|s| s.to_string()),
            value_divergence: 0.0,
            day_gap: 0,
            text_similarity: 0.0,
            actor: actor.to_string(),
            decided_at: Utc::now(),
        }
    }

    pub fn with_observations(mut self, value_divergence: f64, day_gap: u32, text_similarity: f64) -> Self {
        self.value_divergence = value_divergence;
        self.day_gap = day_gap;
        self.text_similarity = text_similarity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_kind_round_trips_through_str() {
        for kind in [
            DecisionKind::Accept,
            DecisionKind::Ignore,
            DecisionKind::Correct,
            DecisionKind::Undo,
        ] {
            assert_eq!(kind.to_string().parse::<DecisionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("reject".parse::<DecisionKind>().is_err());
    }
}
