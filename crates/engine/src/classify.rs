use std::time::Duration;

use concilia_core::LedgerEntry;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Classification timed out after {0:?}")]
    Timeout(Duration),
    #[error("Classification service unavailable: {0}")]
    Unavailable(String),
    #[error("Classification rejected entry: {0}")]
    Rejected(String),
}

/// A classified entry plus the classifier's own confidence in it.
#[derive(Debug, Clone)]
pub struct Classified {
    pub entry: LedgerEntry,
    pub confidence: f64,
}

/// Abstraction over the external entry-classification service consulted
/// during orphan-entry synthesis.
///
/// Implementations own their timeout; callers treat any error as "use the
/// generic draft instead" and never fail the batch over it.
pub trait EntryClassifier: Send + Sync {
    fn classify(&self, draft: &LedgerEntry) -> Result<Classified, ClassifyError>;
}

/// Echoes the draft back unchanged — useful for tests and for callers that
/// have no classification service wired up.
pub struct NullClassifier;

impl EntryClassifier for NullClassifier {
    fn classify(&self, draft: &LedgerEntry) -> Result<Classified, ClassifyError> {
        Ok(Classified {
            entry: draft.clone(),
            confidence: draft.confidence,
        })
    }
}
