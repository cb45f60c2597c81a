use concilia_core::{
    ConfigError, DecisionKind, HumanDecision, LedgerEntry, MatchCandidate, MatchOrigin,
    ReconciliationConfig, Transaction,
};

use crate::text::{description_similarity, normalize, shared_long_tokens, tokens};

const VALUE_WEIGHT: f64 = 0.5;
const DATE_WEIGHT: f64 = 0.3;
const DESCRIPTION_WEIGHT: f64 = 0.2;
const COUNTERPARTY_BONUS: f64 = 0.1;

/// Result of one batch matching run. Pure data: persistence is the
/// caller's responsibility.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matched: Vec<MatchCandidate>,
    pub unmatched_transactions: Vec<Transaction>,
    pub unmatched_entries: Vec<LedgerEntry>,
    pub pass1_matches: usize,
    pub pass2_matches: usize,
}

/// Scores (transaction, entry) pairs and runs the two-pass batch matching
/// algorithm over kind-compatible candidates.
pub struct Matcher {
    config: ReconciliationConfig,
}

impl Matcher {
    pub fn new(config: ReconciliationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Matcher { config })
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Similarity score in [0, 1]: value (0.5) + date (0.3) + description
    /// (0.2), with an optional counterparty bonus added after clamping the
    /// base to 0.9 of headroom.
    pub fn score(&self, transaction: &Transaction, entry: &LedgerEntry) -> f64 {
        self.score_with_tolerance(transaction, entry, self.config.value_tolerance_pct)
    }

    fn score_with_tolerance(
        &self,
        transaction: &Transaction,
        entry: &LedgerEntry,
        value_tolerance_pct: f64,
    ) -> f64 {
        let base = value_term(transaction, entry, value_tolerance_pct)
            + date_term(transaction, entry, self.config.date_tolerance_days)
            + description_term(&transaction.description, &entry.description);

        let score = if self.config.consider_counterparty && same_counterparty(transaction, entry) {
            base.min(1.0 - COUNTERPARTY_BONUS) + COUNTERPARTY_BONUS
        } else {
            base
        };

        score.clamp(0.0, 1.0)
    }

    /// Two-pass batch matching.
    ///
    /// Pass 1 commits, per transaction, the single best-scoring compatible
    /// entry at or above the strategy's acceptance cutoff. Pass 2 (skipped
    /// under `Conservative`) retries the leftovers with the value tolerance
    /// doubled and accepts at the strategy's rejection floor, always
    /// flagging the result for human review. Committed entries leave the
    /// pool immediately; ties break to the first entry in input order.
    pub fn run(&self, transactions: &[Transaction], entries: &[LedgerEntry]) -> MatchOutcome {
        let mut matched = Vec::new();
        let mut remaining_entries: Vec<LedgerEntry> = entries.to_vec();
        let mut leftover_transactions: Vec<Transaction> = Vec::new();

        let cutoff = self.config.strategy.acceptance_cutoff();
        for transaction in transactions {
            let best = self.best_candidate(
                transaction,
                &remaining_entries,
                self.config.value_tolerance_pct,
            );
            match best {
                Some((index, score)) if score >= cutoff => {
                    let mut entry = remaining_entries.remove(index);
                    entry.mark_reconciled();
                    let automatic = score >= self.config.automatic_score_threshold;
                    matched.push(MatchCandidate::new(
                        transaction.clone(),
                        entry,
                        score,
                        automatic,
                        MatchOrigin::Pass1,
                    ));
                }
                _ => leftover_transactions.push(transaction.clone()),
            }
        }
        let pass1_matches = matched.len();

        let mut unmatched_transactions = Vec::new();
        if let Some(floor) = self.config.strategy.rejection_floor() {
            let relaxed_tolerance = self.config.value_tolerance_pct * 2.0;
            for transaction in leftover_transactions {
                let best = self.best_candidate(&transaction, &remaining_entries, relaxed_tolerance);
                match best {
                    Some((index, score)) if score >= floor => {
                        let mut entry = remaining_entries.remove(index);
                        entry.mark_pending();
                        // Relaxed matches always require human review.
                        matched.push(MatchCandidate::new(
                            transaction,
                            entry,
                            score,
                            false,
                            MatchOrigin::Pass2,
                        ));
                    }
                    _ => unmatched_transactions.push(transaction),
                }
            }
        } else {
            unmatched_transactions = leftover_transactions;
        }
        let pass2_matches = matched.len() - pass1_matches;

        tracing::debug!(
            strategy = %self.config.strategy,
            pass1 = pass1_matches,
            pass2 = pass2_matches,
            unmatched_transactions = unmatched_transactions.len(),
            unmatched_entries = remaining_entries.len(),
            "batch matching finished"
        );

        MatchOutcome {
            matched,
            unmatched_transactions,
            unmatched_entries: remaining_entries,
            pass1_matches,
            pass2_matches,
        }
    }

    /// Index and score of the best-scoring kind-compatible entry. The first
    /// entry reaching the maximum wins, keeping repeated runs deterministic
    /// for stable input order.
    fn best_candidate(
        &self,
        transaction: &Transaction,
        entries: &[LedgerEntry],
        value_tolerance_pct: f64,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (index, entry) in entries.iter().enumerate() {
            if !entry.kind.compatible_with(transaction.direction) {
                continue;
            }
            let score = self.score_with_tolerance(transaction, entry, value_tolerance_pct);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }
        best
    }

    /// Boolean reduction of the score test, used by the resolver's duplicate
    /// lookup: compatibility, date window, value tolerance, and description
    /// overlap must all hold.
    pub fn corresponds(&self, transaction: &Transaction, entry: &LedgerEntry) -> bool {
        entry.kind.compatible_with(transaction.direction)
            && day_gap(transaction, entry) <= self.config.date_tolerance_days as i64
            && transaction.amount.relative_difference(entry.amount)
                <= self.config.value_tolerance_pct
            && crate::text::descriptions_overlap(&transaction.description, &entry.description)
    }

    /// Pair a transaction and entry by hand. The score is computed for the
    /// audit trail but the pairing is never flagged automatic.
    pub fn match_manually(&self, transaction: Transaction, mut entry: LedgerEntry) -> MatchCandidate {
        let score = self.score(&transaction, &entry);
        entry.mark_reconciled();
        MatchCandidate::new(transaction, entry, score, false, MatchOrigin::Manual)
    }
}

/// Split a committed match back into its parts. Pure: the caller must
/// persist the split and emit the corresponding `HumanDecision`.
pub fn undo_match(candidate: MatchCandidate) -> (Transaction, LedgerEntry) {
    let mut entry = candidate.entry;
    entry.status = concilia_core::EntryStatus::Classified;
    (candidate.transaction, entry)
}

/// Build the audit record for a reviewer action on a candidate, capturing
/// the pair features observed at decision time for the learner.
pub fn observe_decision(
    kind: DecisionKind,
    candidate: &MatchCandidate,
    actor: &str,
) -> HumanDecision {
    HumanDecision::new(
        kind,
        &candidate.transaction.id,
        Some(&candidate.entry.id),
        actor,
    )
    .with_observations(
        candidate
            .transaction
            .amount
            .relative_difference(candidate.entry.amount),
        (candidate.transaction.date - candidate.entry.date)
            .num_days()
            .unsigned_abs() as u32,
        description_similarity(&candidate.transaction.description, &candidate.entry.description),
    )
}

fn value_term(transaction: &Transaction, entry: &LedgerEntry, tolerance_pct: f64) -> f64 {
    if transaction.amount == entry.amount {
        return VALUE_WEIGHT;
    }
    if tolerance_pct <= 0.0 {
        return 0.0;
    }
    let relative = transaction.amount.relative_difference(entry.amount);
    if relative >= tolerance_pct {
        return 0.0;
    }
    VALUE_WEIGHT * (1.0 - relative / tolerance_pct)
}

fn date_term(transaction: &Transaction, entry: &LedgerEntry, tolerance_days: u32) -> f64 {
    let gap = day_gap(transaction, entry);
    if gap == 0 {
        return DATE_WEIGHT;
    }
    if tolerance_days == 0 || gap >= tolerance_days as i64 {
        return 0.0;
    }
    DATE_WEIGHT * (1.0 - gap as f64 / tolerance_days as f64)
}

fn description_term(a: &str, b: &str) -> f64 {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return DESCRIPTION_WEIGHT;
    }
    if contains_other(&na, &nb) {
        return 0.15;
    }
    match shared_long_tokens(a, b) {
        0 => 0.0,
        1 | 2 => 0.05,
        _ => 0.1,
    }
}

/// One description contains the other: substring either way, or every token
/// of one side appears somewhere in the other.
fn contains_other(na: &str, nb: &str) -> bool {
    if na.contains(nb) || nb.contains(na) {
        return true;
    }
    let ta = tokens(na, 0);
    let tb = tokens(nb, 0);
    !ta.is_empty() && !tb.is_empty() && (ta.is_subset(&tb) || tb.is_subset(&ta))
}

fn same_counterparty(transaction: &Transaction, entry: &LedgerEntry) -> bool {
    match (&transaction.counterparty, &entry.counterparty) {
        (Some(a), Some(b)) => normalize(a) == normalize(b),
        _ => false,
    }
}

fn day_gap(transaction: &Transaction, entry: &LedgerEntry) -> i64 {
    (transaction.date - entry.date).num_days().abs()
}
