use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::transaction::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Revenue,
    Expense,
    Transfer,
}

impl EntryKind {
    /// Kind compatibility with a transaction direction: credits reconcile
    /// against revenue, debits against expenses. Transfers never auto-match.
    pub fn compatible_with(self, direction: Direction) -> bool {
        matches!(
            (direction, self),
            (Direction::Credit, EntryKind::Revenue) | (Direction::Debit, EntryKind::Expense)
        )
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Credit => EntryKind::Revenue,
            Direction::Debit => EntryKind::Expense,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Revenue => write!(f, "revenue"),
            EntryKind::Expense => write!(f, "expense"),
            EntryKind::Transfer => write!(f, "transfer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Unclassified,
    Classified,
    Reconciled,
    Pending,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Unclassified => write!(f, "unclassified"),
            EntryStatus::Classified => write!(f, "classified"),
            EntryStatus::Reconciled => write!(f, "reconciled"),
            EntryStatus::Pending => write!(f, "pending"),
        }
    }
}

/// A bookkeeping record owned by the accounting collaborator.
///
/// The engine never deletes entries. It mutates them only through the
/// helpers below: rewriting the amount during divergence correction,
/// appending an explanatory note, or flipping the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub kind: EntryKind,
    pub description: String,
    pub category: Option<String>,
    pub counterparty: Option<String>,
    /// Classification confidence in [0, 1].
    pub confidence: f64,
    pub status: EntryStatus,
    pub note: Option<String>,
}

impl LedgerEntry {
    pub fn new(id: &str, date: NaiveDate, amount: Money, kind: EntryKind, description: &str) -> Self {
        LedgerEntry {
            id: id.to_string(),
            date,
            amount,
            kind,
            description: description.to_string(),
            category: None,
            counterparty: None,
            confidence: 0.0,
            status: EntryStatus::Unclassified,
            note: None,
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_counterparty(mut self, counterparty: &str) -> Self {
        self.counterparty = Some(counterparty.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Rewrite the recorded amount, keeping the previous value in the note.
    pub fn correct_amount(&mut self, corrected: Money, reason: &str) {
        let previous = self.amount;
        self.amount = corrected;
        self.append_note(&format!("{reason} (was {previous})"));
    }

    pub fn append_note(&mut self, text: &str) {
        match &mut self.note {
            Some(note) => {
                note.push_str("; ");
                note.push_str(text);
            }
            None => self.note = Some(text.to_string()),
        }
    }

    pub fn mark_reconciled(&mut self) {
        self.status = EntryStatus::Reconciled;
    }

    pub fn mark_pending(&mut self) {
        self.status = EntryStatus::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LedgerEntry {
        LedgerEntry::new(
            "e1",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Money::from_cents(150_000),
            EntryKind::Revenue,
            "Client 12 payment",
        )
    }

    #[test]
    fn kind_compatibility() {
        assert!(EntryKind::Revenue.compatible_with(Direction::Credit));
        assert!(EntryKind::Expense.compatible_with(Direction::Debit));
        assert!(!EntryKind::Revenue.compatible_with(Direction::Debit));
        assert!(!EntryKind::Transfer.compatible_with(Direction::Credit));
        assert!(!EntryKind::Transfer.compatible_with(Direction::Debit));
    }

    #[test]
    fn kind_from_direction() {
        assert_eq!(EntryKind::from_direction(Direction::Credit), EntryKind::Revenue);
        assert_eq!(EntryKind::from_direction(Direction::Debit), EntryKind::Expense);
    }

    #[test]
    fn correct_amount_keeps_history_in_note() {
        let mut e = entry();
        e.correct_amount(Money::from_cents(149_000), "adjusted to bank amount");
        assert_eq!(e.amount.to_cents(), 149_000);
        let note = e.note.unwrap();
        assert!(note.contains("adjusted to bank amount"));
        assert!(note.contains("$1500.00"));
    }

    #[test]
    fn append_note_concatenates() {
        let mut e = entry();
        e.append_note("first");
        e.append_note("second");
        assert_eq!(e.note.as_deref(), Some("first; second"));
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(entry().with_confidence(1.7).confidence, 1.0);
        assert_eq!(entry().with_confidence(-0.2).confidence, 0.0);
    }
}
