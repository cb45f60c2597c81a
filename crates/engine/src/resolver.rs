use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::RegexSet;

use concilia_core::{
    ConfigError, EntryKind, EntryStatus, LedgerEntry, MatchCandidate, MatchOrigin,
    ResolutionConfig, Transaction,
};

use crate::classify::EntryClassifier;
use crate::matcher::{MatchOutcome, Matcher};
use crate::text::descriptions_overlap;

/// Result of the resolution pipeline. Every input transaction lands in
/// exactly one of `matched`, `unmatched_transactions`, or
/// `ignored_transactions`.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub matched: Vec<MatchCandidate>,
    pub unmatched_transactions: Vec<Transaction>,
    pub unmatched_entries: Vec<LedgerEntry>,
    pub corrected_entries: Vec<LedgerEntry>,
    pub synthesized_entries: Vec<LedgerEntry>,
    pub ignored_transactions: Vec<Transaction>,
    pub duplicates_resolved: usize,
    pub divergences_corrected: usize,
    pub entries_synthesized: usize,
}

/// Works through the matcher's residual unmatched sets in a fixed stage
/// order: duplicates, divergences, internal transfers, orphan synthesis.
/// Each stage has its own toggle in `ResolutionConfig`.
pub struct Resolver<'a, C: EntryClassifier> {
    config: ResolutionConfig,
    matcher: &'a Matcher,
    classifier: &'a C,
}

impl<'a, C: EntryClassifier> Resolver<'a, C> {
    pub fn new(
        config: ResolutionConfig,
        matcher: &'a Matcher,
        classifier: &'a C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Resolver {
            config,
            matcher,
            classifier,
        })
    }

    pub fn resolve(&self, outcome: MatchOutcome) -> ResolveOutcome {
        let mut matched = outcome.matched;
        let mut transactions = outcome.unmatched_transactions;
        let mut entries = outcome.unmatched_entries;

        let mut corrected_entries = Vec::new();
        let mut synthesized_entries = Vec::new();
        let mut ignored_transactions = Vec::new();
        let mut duplicates_resolved = 0;
        let mut divergences_corrected = 0;
        let mut entries_synthesized = 0;

        if self.config.resolve_duplicates {
            duplicates_resolved =
                self.resolve_duplicates(&mut transactions, &mut entries, &mut matched);
        }

        if self.config.correct_divergences {
            divergences_corrected = self.correct_divergences(
                &mut transactions,
                &mut entries,
                &mut matched,
                &mut corrected_entries,
            );
        }

        if self.config.ignore_internal_transfers {
            let (internal, external): (Vec<_>, Vec<_>) = transactions
                .into_iter()
                .partition(|t| is_internal_movement(&t.description));
            ignored_transactions = internal;
            transactions = external;
        }

        if self.config.synthesize_orphan_entries {
            entries_synthesized = self.synthesize_orphans(
                std::mem::take(&mut transactions),
                &mut matched,
                &mut synthesized_entries,
            );
        }

        tracing::info!(
            duplicates_resolved,
            divergences_corrected,
            entries_synthesized,
            ignored = ignored_transactions.len(),
            "resolution pipeline finished"
        );

        ResolveOutcome {
            matched,
            unmatched_transactions: transactions,
            unmatched_entries: entries,
            corrected_entries,
            synthesized_entries,
            ignored_transactions,
            duplicates_resolved,
            divergences_corrected,
            entries_synthesized,
        }
    }

    /// Collapse unmatched entries that share (kind, date, amount) down to
    /// the highest-confidence principal, then attempt one correspondence
    /// lookup for the principal among unmatched transactions. Discarded
    /// siblings count as resolved only when the lookup succeeds.
    fn resolve_duplicates(
        &self,
        transactions: &mut Vec<Transaction>,
        entries: &mut Vec<LedgerEntry>,
        matched: &mut Vec<MatchCandidate>,
    ) -> usize {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, entry) in entries.iter().enumerate() {
            let key = format!("{}|{}|{}", entry.kind, entry.date, entry.amount.to_cents());
            groups.entry(key).or_default().push(index);
        }

        let mut resolved = 0;
        let mut dropped: Vec<usize> = Vec::new();

        for indices in groups.values() {
            if indices.len() < 2 {
                continue;
            }
            // Highest classification confidence wins; ties keep input order.
            let principal = indices
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    entries[a]
                        .confidence
                        .partial_cmp(&entries[b].confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.cmp(&a))
                })
                .unwrap_or(indices[0]);
            let siblings = indices.len() - 1;
            dropped.extend(indices.iter().copied().filter(|&i| i != principal));

            let hit = transactions
                .iter()
                .position(|t| self.matcher.corresponds(t, &entries[principal]));
            if let Some(position) = hit {
                let transaction = transactions.remove(position);
                let mut entry = entries[principal].clone();
                entry.mark_reconciled();
                let score = self.matcher.score(&transaction, &entry);
                let automatic = score >= self.matcher.config().automatic_score_threshold;
                matched.push(MatchCandidate::new(
                    transaction,
                    entry,
                    score,
                    automatic,
                    MatchOrigin::Duplicate,
                ));
                dropped.push(principal);
                resolved += siblings;
            }
        }

        dropped.sort_unstable();
        dropped.dedup();
        for index in dropped.into_iter().rev() {
            entries.remove(index);
        }

        resolved
    }

    /// Pair transactions with entries whose amounts agree within tolerance,
    /// rewriting the entry amount to the bank amount when the two differ.
    fn correct_divergences(
        &self,
        transactions: &mut Vec<Transaction>,
        entries: &mut Vec<LedgerEntry>,
        matched: &mut Vec<MatchCandidate>,
        corrected_entries: &mut Vec<LedgerEntry>,
    ) -> usize {
        let mut corrected = 0;
        let mut remaining = Vec::new();

        for transaction in transactions.drain(..) {
            let hit = entries.iter().position(|entry| {
                entry.kind.compatible_with(transaction.direction)
                    && (transaction.date - entry.date).num_days().unsigned_abs()
                        <= u64::from(self.config.max_backtrack_days)
                    && descriptions_overlap(&transaction.description, &entry.description)
                    && transaction.amount.relative_difference(entry.amount)
                        <= self.config.divergence_tolerance_pct
            });

            match hit {
                Some(position) => {
                    let mut entry = entries.remove(position);
                    entry.mark_reconciled();
                    if transaction.amount != entry.amount {
                        entry.correct_amount(
                            transaction.amount,
                            &format!("amount adjusted to bank transaction {}", transaction.id),
                        );
                        corrected_entries.push(entry.clone());
                        corrected += 1;
                    }
                    let score = self.matcher.score(&transaction, &entry);
                    matched.push(MatchCandidate::new(
                        transaction,
                        entry,
                        score,
                        true,
                        MatchOrigin::Divergence,
                    ));
                }
                None => remaining.push(transaction),
            }
        }

        *transactions = remaining;
        corrected
    }

    /// Every transaction still unmatched gets a synthesized ledger entry,
    /// refined by the external classifier when it answers confidently
    /// enough. Classifier failure falls back to the generic draft; a single
    /// bad record never aborts the batch.
    fn synthesize_orphans(
        &self,
        transactions: Vec<Transaction>,
        matched: &mut Vec<MatchCandidate>,
        synthesized_entries: &mut Vec<LedgerEntry>,
    ) -> usize {
        let mut synthesized = 0;

        for transaction in transactions {
            let draft = draft_entry(&transaction);
            let mut entry = match self.classifier.classify(&draft) {
                Ok(classified) if classified.confidence >= self.config.min_confidence_to_resolve => {
                    classified.entry
                }
                Ok(_) => draft,
                Err(error) => {
                    tracing::warn!(
                        transaction = %transaction.id,
                        %error,
                        "classifier failed, keeping generic entry"
                    );
                    draft
                }
            };
            entry.mark_reconciled();
            synthesized_entries.push(entry.clone());
            let score = self.matcher.score(&transaction, &entry);
            matched.push(MatchCandidate::new(
                transaction,
                entry,
                score,
                true,
                MatchOrigin::Synthesized,
            ));
            synthesized += 1;
        }

        synthesized
    }
}

fn draft_entry(transaction: &Transaction) -> LedgerEntry {
    let category = transaction
        .category
        .clone()
        .unwrap_or_else(|| "Miscellaneous".to_string());
    let mut entry = LedgerEntry::new(
        &format!("gen-{}", transaction.id),
        transaction.date,
        transaction.amount,
        EntryKind::from_direction(transaction.direction),
        &transaction.description,
    )
    .with_category(&category)
    .with_confidence(0.7);
    if let Some(counterparty) = &transaction.counterparty {
        entry = entry.with_counterparty(counterparty);
    }
    entry.append_note("auto-generated from unmatched bank transaction");
    entry.status = EntryStatus::Pending;
    entry
}

/// Fixed description patterns for non-reconcilable internal movements:
/// own-account transfers, bank fees and maintenance charges, yield and
/// interest credits, own withdrawals.
fn is_internal_movement(description: &str) -> bool {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    let set = PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)transfer between own accounts",
            r"(?i)own[ -]account transfer",
            r"(?i)internal transfer",
            r"(?i)account[ -]to[ -]account transfer",
            r"(?i)bank fee",
            r"(?i)maintenance (fee|charge)",
            r"(?i)service charge",
            r"(?i)interest (credit|earned|payment)",
            r"(?i)yield (credit|payment)",
            r"(?i)savings yield",
            r"(?i)(atm|cash) withdrawal",
        ])
        .expect("internal movement patterns compile")
    });
    set.is_match(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use concilia_core::{Direction, Money, ReconciliationConfig, Strategy};

    use crate::classify::{Classified, ClassifyError, NullClassifier};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn tx(id: &str, day: u32, cents: i64, desc: &str) -> Transaction {
        Transaction::new(id, date(day), Money::from_cents(cents), Direction::Credit, desc)
    }

    fn entry(id: &str, day: u32, cents: i64, desc: &str) -> LedgerEntry {
        LedgerEntry::new(id, date(day), Money::from_cents(cents), EntryKind::Revenue, desc)
    }

    fn matcher() -> Matcher {
        Matcher::new(ReconciliationConfig {
            strategy: Strategy::Moderate,
            ..Default::default()
        })
        .unwrap()
    }

    fn outcome(transactions: Vec<Transaction>, entries: Vec<LedgerEntry>) -> MatchOutcome {
        MatchOutcome {
            matched: Vec::new(),
            unmatched_transactions: transactions,
            unmatched_entries: entries,
            pass1_matches: 0,
            pass2_matches: 0,
        }
    }

    struct FailingClassifier;

    impl EntryClassifier for FailingClassifier {
        fn classify(&self, _draft: &LedgerEntry) -> Result<Classified, ClassifyError> {
            Err(ClassifyError::Unavailable("connection refused".into()))
        }
    }

    struct RefiningClassifier {
        confidence: f64,
    }

    impl EntryClassifier for RefiningClassifier {
        fn classify(&self, draft: &LedgerEntry) -> Result<Classified, ClassifyError> {
            let mut entry = draft.clone().with_category("Consulting Revenue");
            entry.confidence = self.confidence;
            Ok(Classified {
                entry,
                confidence: self.confidence,
            })
        }
    }

    #[test]
    fn triplicate_entries_collapse_to_one_match() {
        let m = matcher();
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &NullClassifier).unwrap();

        let t = tx("t1", 10, 90_000, "Invoice 55 payment");
        let dup = |id: &str, confidence: f64| {
            entry(id, 10, 90_000, "Invoice 55").with_confidence(confidence)
        };
        let result = resolver.resolve(outcome(
            vec![t],
            vec![dup("e1", 0.5), dup("e2", 0.9), dup("e3", 0.5)],
        ));

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].entry.id, "e2", "principal is highest confidence");
        assert_eq!(result.matched[0].origin, MatchOrigin::Duplicate);
        assert_eq!(result.duplicates_resolved, 2);
        assert!(result.unmatched_entries.is_empty());
        assert!(result.unmatched_transactions.is_empty());
    }

    #[test]
    fn duplicate_siblings_not_counted_without_correspondence() {
        let m = matcher();
        let config = ResolutionConfig {
            correct_divergences: false,
            synthesize_orphan_entries: false,
            ..Default::default()
        };
        let resolver = Resolver::new(config, &m, &NullClassifier).unwrap();

        // No transaction corresponds to the duplicated entries.
        let result = resolver.resolve(outcome(
            vec![tx("t1", 10, 10_000, "unrelated rent")],
            vec![
                entry("e1", 10, 90_000, "Invoice 55"),
                entry("e2", 10, 90_000, "Invoice 55"),
            ],
        ));

        assert_eq!(result.duplicates_resolved, 0);
        assert!(result.matched.is_empty());
        assert_eq!(result.unmatched_entries.len(), 1, "siblings still collapse");
    }

    #[test]
    fn divergence_is_corrected_within_tolerance() {
        let m = matcher();
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &NullClassifier).unwrap();

        let t = tx("t1", 10, 150_000, "Client 12 payment");
        let e = entry("e1", 9, 152_500, "Client 12 payment"); // ~1.67% off
        let result = resolver.resolve(outcome(vec![t], vec![e]));

        assert_eq!(result.divergences_corrected, 1);
        let candidate = &result.matched[0];
        assert_eq!(candidate.origin, MatchOrigin::Divergence);
        assert!(candidate.automatic);
        assert_eq!(candidate.entry.amount.to_cents(), 150_000);
        assert!(candidate.entry.note.as_ref().unwrap().contains("t1"));
        assert_eq!(result.corrected_entries.len(), 1);
    }

    #[test]
    fn equal_amount_pair_is_paired_without_rewrite() {
        let m = matcher();
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &NullClassifier).unwrap();

        // A five-day gap keeps the pair below the matcher cutoffs, but the
        // divergence stage still pairs it. Equal amounts mean nothing is
        // rewritten and nothing is counted as corrected.
        let t = tx("t1", 10, 90_000, "Payment invoice 55");
        let e = entry("e1", 15, 90_000, "Invoice 55");
        let result = resolver.resolve(outcome(vec![t], vec![e]));

        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].origin, MatchOrigin::Divergence);
        assert_eq!(result.matched[0].entry.amount.to_cents(), 90_000);
        assert!(result.matched[0].entry.note.is_none());
        assert_eq!(result.divergences_corrected, 0);
        assert!(result.corrected_entries.is_empty());
        assert_eq!(result.entries_synthesized, 0);
    }

    #[test]
    fn divergence_correction_respects_tolerance_bound() {
        let m = matcher();
        let config = ResolutionConfig {
            divergence_tolerance_pct: 0.01,
            synthesize_orphan_entries: false,
            ..Default::default()
        };
        let resolver = Resolver::new(config, &m, &NullClassifier).unwrap();

        let t = tx("t1", 10, 150_000, "Client 12 payment");
        let e = entry("e1", 10, 153_500, "Client 12 payment"); // 2.33% off
        let result = resolver.resolve(outcome(vec![t], vec![e]));

        assert_eq!(result.divergences_corrected, 0);
        assert_eq!(result.unmatched_transactions.len(), 1);
        assert_eq!(result.unmatched_entries.len(), 1);
        assert_eq!(result.unmatched_entries[0].amount.to_cents(), 153_500);
    }

    #[test]
    fn internal_movements_are_ignored_not_synthesized() {
        let m = matcher();
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &NullClassifier).unwrap();

        let internal = tx("t1", 10, 50_000, "Internal transfer between own accounts");
        let fee = Transaction::new(
            "t2",
            date(11),
            Money::from_cents(1500),
            Direction::Debit,
            "Monthly bank fee",
        );
        let ordinary = tx("t3", 12, 80_000, "Invoice 90 payment");
        let result = resolver.resolve(outcome(vec![internal, fee, ordinary], vec![]));

        assert_eq!(result.ignored_transactions.len(), 2);
        let ignored_ids: Vec<_> = result
            .ignored_transactions
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ignored_ids, vec!["t1", "t2"]);
        // The ordinary transaction is synthesized, never the internal ones.
        assert_eq!(result.entries_synthesized, 1);
        assert_eq!(result.matched[0].transaction.id, "t3");
    }

    #[test]
    fn orphan_synthesis_defaults_category_and_kind() {
        let m = matcher();
        let config = ResolutionConfig {
            min_confidence_to_resolve: 0.9, // refuse the classifier's answer
            ..Default::default()
        };
        let resolver = Resolver::new(config, &m, &NullClassifier).unwrap();

        let t = Transaction::new(
            "t1",
            date(10),
            Money::from_cents(4200),
            Direction::Debit,
            "Hardware store purchase",
        );
        let result = resolver.resolve(outcome(vec![t], vec![]));

        assert_eq!(result.entries_synthesized, 1);
        let entry = &result.synthesized_entries[0];
        assert_eq!(entry.kind, EntryKind::Expense);
        assert_eq!(entry.category.as_deref(), Some("Miscellaneous"));
        assert_eq!(entry.confidence, 0.7);
        assert!(entry.note.as_ref().unwrap().contains("auto-generated"));
        let candidate = &result.matched[0];
        assert!(candidate.automatic);
        assert_eq!(candidate.origin, MatchOrigin::Synthesized);
    }

    #[test]
    fn confident_classifier_refines_synthesized_entry() {
        let m = matcher();
        let classifier = RefiningClassifier { confidence: 0.95 };
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &classifier).unwrap();

        let t = tx("t1", 10, 90_000, "Consulting payment").with_category("Services");
        let result = resolver.resolve(outcome(vec![t], vec![]));

        let entry = &result.synthesized_entries[0];
        assert_eq!(entry.category.as_deref(), Some("Consulting Revenue"));
        assert_eq!(entry.confidence, 0.95);
    }

    #[test]
    fn classifier_failure_falls_back_to_generic_entry() {
        let m = matcher();
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &FailingClassifier).unwrap();

        let t = tx("t1", 10, 90_000, "Consulting payment");
        let result = resolver.resolve(outcome(vec![t], vec![]));

        assert_eq!(result.entries_synthesized, 1, "batch continues past failure");
        assert_eq!(result.synthesized_entries[0].confidence, 0.7);
        assert!(result.unmatched_transactions.is_empty());
    }

    #[test]
    fn every_transaction_is_accounted_for_exactly_once() {
        let m = matcher();
        let resolver = Resolver::new(ResolutionConfig::default(), &m, &NullClassifier).unwrap();

        let transactions = vec![
            tx("t1", 10, 150_000, "Client 12 payment"),
            tx("t2", 11, 50_000, "Internal transfer between own accounts"),
            tx("t3", 12, 7000, "Fresh unexplained deposit"),
        ];
        let entries = vec![entry("e1", 10, 150_000, "Client 12 payment")];
        let total = transactions.len();
        let result = resolver.resolve(outcome(transactions, entries));

        assert_eq!(
            result.matched.len()
                + result.unmatched_transactions.len()
                + result.ignored_transactions.len(),
            total
        );
    }

    #[test]
    fn disabled_stages_do_nothing() {
        let m = matcher();
        let config = ResolutionConfig {
            resolve_duplicates: false,
            correct_divergences: false,
            ignore_internal_transfers: false,
            synthesize_orphan_entries: false,
            ..Default::default()
        };
        let resolver = Resolver::new(config, &m, &NullClassifier).unwrap();

        let transactions = vec![tx("t1", 10, 50_000, "Internal transfer between own accounts")];
        let entries = vec![
            entry("e1", 10, 90_000, "Invoice 55"),
            entry("e2", 10, 90_000, "Invoice 55"),
        ];
        let result = resolver.resolve(outcome(transactions, entries));

        assert!(result.matched.is_empty());
        assert_eq!(result.unmatched_transactions.len(), 1);
        assert_eq!(result.unmatched_entries.len(), 2);
        assert!(result.ignored_transactions.is_empty());
    }

    #[test]
    fn internal_movement_patterns() {
        assert!(is_internal_movement("TRANSFER BETWEEN OWN ACCOUNTS"));
        assert!(is_internal_movement("monthly maintenance fee"));
        assert!(is_internal_movement("Savings yield"));
        assert!(is_internal_movement("ATM withdrawal 14:02"));
        assert!(!is_internal_movement("Client 12 payment"));
    }
}
