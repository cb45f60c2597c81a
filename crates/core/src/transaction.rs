use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

/// Side of a bank-account movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Credit,
    Debit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Credit => write!(f, "credit"),
            Direction::Debit => write!(f, "debit"),
        }
    }
}

/// A single bank-account movement, owned by the banking collaborator.
/// Immutable once fetched; the engine never creates or mutates these.
///
/// `amount` is the absolute value of the movement; the sign lives in
/// `direction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub direction: Direction,
    pub description: String,
    pub counterparty: Option<String>,
    pub category: Option<String>,
}

impl Transaction {
    pub fn new(
        id: &str,
        date: NaiveDate,
        amount: Money,
        direction: Direction,
        description: &str,
    ) -> Self {
        Transaction {
            id: id.to_string(),
            date,
            amount: amount.abs(),
            direction,
            description: description.to_string(),
            counterparty: None,
            category: None,
        }
    }

    pub fn with_counterparty(mut self, counterparty: &str) -> Self {
        self.counterparty = Some(counterparty.to_string());
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stores_absolute_amount() {
        let t = Transaction::new(
            "t1",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Money::from_cents(-5000),
            Direction::Debit,
            "Card purchase",
        );
        assert_eq!(t.amount.to_cents(), 5000);
        assert_eq!(t.direction, Direction::Debit);
    }

    #[test]
    fn builder_helpers() {
        let t = Transaction::new(
            "t2",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Money::from_cents(100),
            Direction::Credit,
            "x",
        )
        .with_counterparty("Client 12")
        .with_category("Services");
        assert_eq!(t.counterparty.as_deref(), Some("Client 12"));
        assert_eq!(t.category.as_deref(), Some("Services"));
    }
}
