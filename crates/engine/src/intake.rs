use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use concilia_core::{Direction, EntryKind, EntryStatus, LedgerEntry, Money, Transaction};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Invalid date: '{0}'")]
    InvalidDate(String),
    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),
    #[error("Unknown direction: '{0}'")]
    UnknownDirection(String),
    #[error("Unknown entry kind: '{0}'")]
    UnknownKind(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// One record skipped during intake, with the id it carried.
#[derive(Debug)]
pub struct RecordError {
    pub record_id: String,
    pub error: IntakeError,
}

/// A bank transaction as the remote store returns it, all fields still
/// strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    pub id: String,
    pub date: String,
    pub amount: String,
    pub direction: String,
    pub description: String,
    pub counterparty: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: String,
    pub date: String,
    pub amount: String,
    pub kind: String,
    pub description: String,
    pub category: Option<String>,
    pub counterparty: Option<String>,
    pub confidence: Option<f64>,
    pub status: Option<String>,
}

/// Parse raw transactions, skipping malformed records. One bad record never
/// aborts the batch; it lands in the error list instead.
pub fn parse_transactions(raw: &[RawTransaction]) -> (Vec<Transaction>, Vec<RecordError>) {
    let mut parsed = Vec::new();
    let mut errors = Vec::new();
    for record in raw {
        match parse_transaction(record) {
            Ok(transaction) => parsed.push(transaction),
            Err(error) => {
                tracing::warn!(record = %record.id, %error, "skipping malformed transaction");
                errors.push(RecordError {
                    record_id: record.id.clone(),
                    error,
                });
            }
        }
    }
    (parsed, errors)
}

pub fn parse_entries(raw: &[RawEntry]) -> (Vec<LedgerEntry>, Vec<RecordError>) {
    let mut parsed = Vec::new();
    let mut errors = Vec::new();
    for record in raw {
        match parse_entry(record) {
            Ok(entry) => parsed.push(entry),
            Err(error) => {
                tracing::warn!(record = %record.id, %error, "skipping malformed entry");
                errors.push(RecordError {
                    record_id: record.id.clone(),
                    error,
                });
            }
        }
    }
    (parsed, errors)
}

fn parse_transaction(record: &RawTransaction) -> Result<Transaction, IntakeError> {
    if record.id.trim().is_empty() {
        return Err(IntakeError::MissingField("id"));
    }
    let date = parse_date(&record.date)?;
    let amount = parse_amount(&record.amount)?;
    let direction = match record.direction.to_lowercase().as_str() {
        "credit" => Direction::Credit,
        "debit" => Direction::Debit,
        other => return Err(IntakeError::UnknownDirection(other.to_string())),
    };
    let mut transaction = Transaction::new(&record.id, date, amount, direction, &record.description);
    transaction.counterparty = record.counterparty.clone().filter(|s| !s.trim().is_empty());
    transaction.category = record.category.clone().filter(|s| !s.trim().is_empty());
    Ok(transaction)
}

fn parse_entry(record: &RawEntry) -> Result<LedgerEntry, IntakeError> {
    if record.id.trim().is_empty() {
        return Err(IntakeError::MissingField("id"));
    }
    let date = parse_date(&record.date)?;
    let amount = parse_amount(&record.amount)?;
    let kind = match record.kind.to_lowercase().as_str() {
        "revenue" => EntryKind::Revenue,
        "expense" => EntryKind::Expense,
        "transfer" => EntryKind::Transfer,
        other => return Err(IntakeError::UnknownKind(other.to_string())),
    };
    let status = match record.status.as_deref() {
        None => EntryStatus::Unclassified,
        Some(s) => match s.to_lowercase().as_str() {
            "unclassified" | "" => EntryStatus::Unclassified,
            "classified" => EntryStatus::Classified,
            "reconciled" => EntryStatus::Reconciled,
            "pending" => EntryStatus::Pending,
            _ => EntryStatus::Unclassified,
        },
    };
    let mut entry = LedgerEntry::new(&record.id, date, amount, kind, &record.description);
    entry.category = record.category.clone().filter(|s| !s.trim().is_empty());
    entry.counterparty = record.counterparty.clone().filter(|s| !s.trim().is_empty());
    entry.confidence = record.confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    entry.status = status;
    Ok(entry)
}

fn parse_date(s: &str) -> Result<NaiveDate, IntakeError> {
    let s = s.trim();
    for fmt in &[
        "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    Err(IntakeError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str) -> Result<Money, IntakeError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned = s.replace([',', '$', ' '], "");
    let mut dec =
        Decimal::from_str(&cleaned).map_err(|_| IntakeError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(Money::from_decimal(dec))
}
