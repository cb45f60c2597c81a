use concilia_core::{
    ConfigError, HumanDecision, LedgerEntry, MatchCandidate, ReconciliationConfig,
    ResolutionConfig, Transaction,
};

use crate::classify::EntryClassifier;
use crate::intake::{parse_entries, parse_transactions, RawEntry, RawTransaction, RecordError};
use crate::learner::{AdaptiveLearner, LearnerStats};
use crate::matcher::Matcher;
use crate::patterns::{apply_mapping_rules, AnalysisResult, PatternCatalog, PatternConfig, PatternMiner};
use crate::resolver::Resolver;

/// Counts rendered for humans after a batch; purely informational.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub matched: usize,
    pub ignored: usize,
    pub corrected: usize,
    pub synthesized: usize,
    pub unmatched_transactions: usize,
    pub unmatched_entries: usize,
}

/// Sink for human-readable batch summaries. Never required for
/// correctness; failures here must not affect the batch.
pub trait Notifier {
    fn notify(&self, summary: &BatchSummary);
}

/// Logs the summary through `tracing`.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, summary: &BatchSummary) {
        tracing::info!(
            matched = summary.matched,
            ignored = summary.ignored,
            corrected = summary.corrected,
            synthesized = summary.synthesized,
            unmatched_transactions = summary.unmatched_transactions,
            unmatched_entries = summary.unmatched_entries,
            "reconciliation batch complete"
        );
    }
}

/// Aggregate result of one full reconciliation batch.
#[derive(Debug)]
pub struct BatchReport {
    pub matched: Vec<MatchCandidate>,
    pub unmatched_transactions: Vec<Transaction>,
    pub unmatched_entries: Vec<LedgerEntry>,
    pub corrected_entries: Vec<LedgerEntry>,
    pub synthesized_entries: Vec<LedgerEntry>,
    pub ignored_transactions: Vec<Transaction>,
    pub duplicates_resolved: usize,
    pub divergences_corrected: usize,
    pub entries_synthesized: usize,
    pub pass1_matches: usize,
    pub pass2_matches: usize,
    pub rule_matches: usize,
    pub analysis: AnalysisResult,
    pub intake_errors: Vec<RecordError>,
}

impl BatchReport {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            matched: self.matched.len(),
            ignored: self.ignored_transactions.len(),
            corrected: self.corrected_entries.len(),
            synthesized: self.synthesized_entries.len(),
            unmatched_transactions: self.unmatched_transactions.len(),
            unmatched_entries: self.unmatched_entries.len(),
        }
    }
}

/// Sequences matcher → pattern miner → mapping rules → resolver over one
/// batch and owns the long-lived catalog and learner. Single-threaded per
/// batch; callers running batches concurrently must wrap the orchestrator
/// in their own serialization.
pub struct Orchestrator<C: EntryClassifier, N: Notifier = TracingNotifier> {
    reconciliation: ReconciliationConfig,
    resolution: ResolutionConfig,
    catalog: PatternCatalog,
    miner: PatternMiner,
    learner: AdaptiveLearner,
    classifier: C,
    notifier: N,
}

impl<C: EntryClassifier, N: Notifier> Orchestrator<C, N> {
    pub fn new(
        reconciliation: ReconciliationConfig,
        resolution: ResolutionConfig,
        classifier: C,
        notifier: N,
    ) -> Result<Self, ConfigError> {
        reconciliation.validate()?;
        resolution.validate()?;
        Ok(Orchestrator {
            reconciliation,
            resolution,
            catalog: PatternCatalog::default(),
            miner: PatternMiner::new(PatternConfig::default()),
            learner: AdaptiveLearner::new(),
            classifier,
            notifier,
        })
    }

    pub fn with_catalog(mut self, catalog: PatternCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    pub fn run_batch(
        &mut self,
        transactions: Vec<Transaction>,
        entries: Vec<LedgerEntry>,
    ) -> Result<BatchReport, ConfigError> {
        self.run(transactions, entries, Vec::new())
    }

    /// Batch entry point for raw records straight from the remote store.
    /// Malformed records are reported, never fatal.
    pub fn run_batch_raw(
        &mut self,
        raw_transactions: &[RawTransaction],
        raw_entries: &[RawEntry],
    ) -> Result<BatchReport, ConfigError> {
        let (transactions, mut intake_errors) = parse_transactions(raw_transactions);
        let (entries, entry_errors) = parse_entries(raw_entries);
        intake_errors.extend(entry_errors);
        self.run(transactions, entries, intake_errors)
    }

    fn run(
        &mut self,
        transactions: Vec<Transaction>,
        entries: Vec<LedgerEntry>,
        intake_errors: Vec<RecordError>,
    ) -> Result<BatchReport, ConfigError> {
        let matcher = Matcher::new(self.reconciliation.clone())?;

        let mut outcome = matcher.run(&transactions, &entries);
        let pass1_matches = outcome.pass1_matches;
        let pass2_matches = outcome.pass2_matches;

        let analysis = self
            .miner
            .mine(&transactions, &outcome.matched, &mut self.catalog);

        let rule_proposals = apply_mapping_rules(
            &mut self.catalog,
            &outcome.unmatched_transactions,
            &outcome.unmatched_entries,
        );
        let rule_matches = rule_proposals.len();
        for proposal in rule_proposals {
            outcome
                .unmatched_transactions
                .retain(|t| t.id != proposal.transaction.id);
            outcome.unmatched_entries.retain(|e| e.id != proposal.entry.id);
            outcome.matched.push(proposal);
        }

        let resolver = Resolver::new(self.resolution.clone(), &matcher, &self.classifier)?;
        let resolved = resolver.resolve(outcome);

        let report = BatchReport {
            matched: resolved.matched,
            unmatched_transactions: resolved.unmatched_transactions,
            unmatched_entries: resolved.unmatched_entries,
            corrected_entries: resolved.corrected_entries,
            synthesized_entries: resolved.synthesized_entries,
            ignored_transactions: resolved.ignored_transactions,
            duplicates_resolved: resolved.duplicates_resolved,
            divergences_corrected: resolved.divergences_corrected,
            entries_synthesized: resolved.entries_synthesized,
            pass1_matches,
            pass2_matches,
            rule_matches,
            analysis,
            intake_errors,
        };
        self.notifier.notify(&report.summary());
        Ok(report)
    }

    pub fn record_decision(&mut self, decision: HumanDecision) {
        self.learner.record_decision(decision);
    }

    pub fn train(&mut self) -> bool {
        self.learner.train()
    }

    pub fn recommended_config(&self) -> (ReconciliationConfig, ResolutionConfig) {
        self.learner
            .recommended_config(&self.reconciliation, &self.resolution)
    }

    /// Replace the live configs, e.g. after the caller reviewed the
    /// learner's recommendation. Validation applies as at construction.
    pub fn apply_config(
        &mut self,
        reconciliation: ReconciliationConfig,
        resolution: ResolutionConfig,
    ) -> Result<(), ConfigError> {
        reconciliation.validate()?;
        resolution.validate()?;
        self.reconciliation = reconciliation;
        self.resolution = resolution;
        Ok(())
    }

    pub fn learner_stats(&self) -> LearnerStats {
        self.learner.stats()
    }
}
