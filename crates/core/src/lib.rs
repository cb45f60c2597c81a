pub mod candidate;
pub mod config;
pub mod decision;
pub mod entry;
pub mod money;
pub mod transaction;

pub use candidate::{MatchCandidate, MatchOrigin};
pub use config::{ConfigError, ReconciliationConfig, ResolutionConfig, Strategy};
pub use decision::{DecisionKind, HumanDecision};
pub use entry::{EntryKind, EntryStatus, LedgerEntry};
pub use money::Money;
pub use transaction::{Direction, Transaction};
