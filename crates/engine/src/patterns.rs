use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use concilia_core::{LedgerEntry, MatchCandidate, MatchOrigin, Transaction};

use crate::text::tokens;

const BASE_PATTERN_CONFIDENCE: f64 = 0.6;
const BASE_RULE_CONFIDENCE: f64 = 0.7;
const SIZE_BONUS_PER_OCCURRENCE: f64 = 0.03;
const MAX_SIZE_BONUS: f64 = 0.3;
const REDETECTION_BUMP: f64 = 0.05;
const MAX_RETAINED_EXAMPLES: usize = 5;
const RULE_APPLICATION_THRESHOLD: f64 = 0.6;

/// Grouping key token length for mining; rule tokens use the same cut.
const MIN_KEY_TOKEN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Recurring,
    Seasonal,
    Periodic,
    Singular,
}

/// Cadence detail for recurring patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cadence {
    Monthly,
    Quarterly,
    DayOfMonth(u32),
}

/// All-tokens-must-appear text rule mined from a transaction group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRule {
    pub tokens: Vec<String>,
}

impl TokenRule {
    pub fn new(mut rule_tokens: Vec<String>) -> Self {
        rule_tokens.sort();
        rule_tokens.dedup();
        TokenRule { tokens: rule_tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        if self.tokens.is_empty() {
            return false;
        }
        let text_tokens = tokens(text, 0);
        self.tokens.iter().all(|t| text_tokens.contains(t))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub kind: PatternKind,
    pub cadence: Option<Cadence>,
    pub rule: TokenRule,
    /// Monotonically increasing with accumulated occurrences, capped at 1.0.
    pub confidence: f64,
    pub occurrences: u32,
    pub last_seen: NaiveDate,
    /// Up to five example descriptions.
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RuleMode {
    Manual,
    Automatic,
    #[default]
    Suggested,
}

/// A learned transaction-side/entry-side text-rule pair. Confidence is
/// recomputed from the success rate after every use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRule {
    pub id: String,
    pub transaction_rule: TokenRule,
    pub entry_rule: Option<TokenRule>,
    pub confidence: f64,
    pub successes: u32,
    pub failures: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub mode: RuleMode,
}

impl MappingRule {
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.successes += 1;
        self.recompute_confidence();
        self.last_used = Some(now);
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.failures += 1;
        self.recompute_confidence();
        self.last_used = Some(now);
    }

    /// `0.5 + 0.5 · successRate · min(1, uses/20)` — experience discounts a
    /// small sample.
    fn recompute_confidence(&mut self) {
        let total = self.successes + self.failures;
        if total == 0 {
            return;
        }
        let success_rate = f64::from(self.successes) / f64::from(total);
        let experience = (f64::from(total) / 20.0).min(1.0);
        self.confidence = 0.5 + 0.5 * success_rate * experience;
    }
}

/// The only long-lived mutable state of the engine. Explicitly owned by the
/// caller and passed in by reference; concurrent batches must serialize
/// access to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternCatalog {
    pub patterns: BTreeMap<String, Pattern>,
    pub rules: Vec<MappingRule>,
}

impl PatternCatalog {
    pub fn rule_by_id(&self, id: &str) -> Option<&MappingRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Minimum group size before a pattern is emitted.
    pub min_occurrences: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig { min_occurrences: 3 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub patterns_detected: usize,
    pub patterns_updated: usize,
    pub rules_created: usize,
}

/// Detects recurring transaction groups and timing patterns, and promotes
/// confirmed matches into reusable mapping rules.
pub struct PatternMiner {
    config: PatternConfig,
}

impl PatternMiner {
    pub fn new(config: PatternConfig) -> Self {
        PatternMiner { config }
    }

    pub fn mine(
        &self,
        transactions: &[Transaction],
        confirmed_matches: &[MatchCandidate],
        catalog: &mut PatternCatalog,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::default();

        for (key, group) in group_transactions(transactions) {
            if group.len() < self.config.min_occurrences {
                continue;
            }
            let rule = shared_token_rule(group.iter().map(|t| t.description.as_str()));
            if rule.is_empty() {
                continue;
            }
            let dates: Vec<NaiveDate> = group.iter().map(|t| t.date).collect();
            let (kind, cadence) = classify_periodicity(&dates);
            self.upsert_pattern(
                catalog,
                format!("txt:{key}"),
                kind,
                cadence,
                rule,
                &group,
                &mut result,
            );
        }

        for ((day, counterparty), group) in group_by_day_of_month(transactions) {
            if group.len() < self.config.min_occurrences {
                continue;
            }
            let rule = shared_token_rule(group.iter().map(|t| t.description.as_str()));
            self.upsert_pattern(
                catalog,
                format!("dom:{day:02}:{counterparty}"),
                PatternKind::Recurring,
                Some(Cadence::DayOfMonth(day)),
                rule,
                &group,
                &mut result,
            );
        }

        result.rules_created = self.promote_rules(confirmed_matches, catalog);

        tracing::debug!(
            detected = result.patterns_detected,
            updated = result.patterns_updated,
            rules = result.rules_created,
            "pattern mining finished"
        );

        result
    }

    #[allow(clippy::too_many_arguments)]
    fn upsert_pattern(
        &self,
        catalog: &mut PatternCatalog,
        id: String,
        kind: PatternKind,
        cadence: Option<Cadence>,
        rule: TokenRule,
        group: &[&Transaction],
        result: &mut AnalysisResult,
    ) {
        let last_seen = group.iter().map(|t| t.date).max().unwrap_or_default();
        match catalog.patterns.get_mut(&id) {
            Some(existing) => {
                existing.occurrences += group.len() as u32;
                existing.confidence = (existing.confidence + REDETECTION_BUMP).min(1.0);
                existing.last_seen = existing.last_seen.max(last_seen);
                for transaction in group {
                    if existing.examples.len() >= MAX_RETAINED_EXAMPLES {
                        break;
                    }
                    if !existing.examples.contains(&transaction.description) {
                        existing.examples.push(transaction.description.clone());
                    }
                }
                result.patterns_updated += 1;
            }
            None => {
                let size_bonus =
                    (SIZE_BONUS_PER_OCCURRENCE * group.len() as f64).min(MAX_SIZE_BONUS);
                let examples = group
                    .iter()
                    .take(MAX_RETAINED_EXAMPLES)
                    .map(|t| t.description.clone())
                    .collect();
                catalog.patterns.insert(
                    id.clone(),
                    Pattern {
                        id,
                        kind,
                        cadence,
                        rule,
                        confidence: (BASE_PATTERN_CONFIDENCE + size_bonus).min(1.0),
                        occurrences: group.len() as u32,
                        last_seen,
                        examples,
                    },
                );
                result.patterns_detected += 1;
            }
        }
    }

    /// Groups confirmed matches the way transactions are grouped and mines
    /// an entry-side rule from the matched entries' descriptions.
    fn promote_rules(&self, confirmed: &[MatchCandidate], catalog: &mut PatternCatalog) -> usize {
        let mut groups: BTreeMap<String, Vec<&MatchCandidate>> = BTreeMap::new();
        for candidate in confirmed {
            if let Some(key) = grouping_key(&candidate.transaction) {
                groups.entry(key).or_default().push(candidate);
            }
        }

        let mut created = 0;
        for (key, group) in groups {
            if group.len() < self.config.min_occurrences {
                continue;
            }
            let id = format!("rule:{key}");
            if catalog.rule_by_id(&id).is_some() {
                continue;
            }
            let transaction_rule =
                shared_token_rule(group.iter().map(|c| c.transaction.description.as_str()));
            let entry_rule = shared_token_rule(group.iter().map(|c| c.entry.description.as_str()));
            if transaction_rule.is_empty() {
                continue;
            }
            let size_bonus = (SIZE_BONUS_PER_OCCURRENCE * group.len() as f64).min(MAX_SIZE_BONUS);
            catalog.rules.push(MappingRule {
                id,
                transaction_rule,
                entry_rule: if entry_rule.is_empty() {
                    None
                } else {
                    Some(entry_rule)
                },
                confidence: (BASE_RULE_CONFIDENCE + size_bonus).min(1.0),
                successes: 0,
                failures: 0,
                last_used: None,
                mode: RuleMode::Suggested,
            });
            created += 1;
        }
        created
    }
}

/// Applies the catalog's mapping rules to brand-new unmatched pairs. A rule
/// whose transaction side matches proposes the best entry among entry-rule
/// matches, scored half by value proximity and half by date proximity.
/// Rule counters and confidence are updated in place.
pub fn apply_mapping_rules(
    catalog: &mut PatternCatalog,
    transactions: &[Transaction],
    entries: &[LedgerEntry],
) -> Vec<MatchCandidate> {
    let now = Utc::now();
    let mut proposals = Vec::new();
    let mut taken_entries: Vec<bool> = vec![false; entries.len()];

    for transaction in transactions {
        let rule_index = catalog.rules.iter().position(|rule| {
            rule.mode != RuleMode::Manual && rule.transaction_rule.matches(&transaction.description)
        });
        let Some(rule_index) = rule_index else {
            continue;
        };

        let mut best: Option<(usize, f64)> = None;
        for (index, entry) in entries.iter().enumerate() {
            if taken_entries[index] || !entry.kind.compatible_with(transaction.direction) {
                continue;
            }
            if let Some(entry_rule) = &catalog.rules[rule_index].entry_rule {
                if !entry_rule.matches(&entry.description) {
                    continue;
                }
            }
            let score = pair_proximity(transaction, entry);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }

        match best {
            Some((index, score)) if score >= RULE_APPLICATION_THRESHOLD => {
                taken_entries[index] = true;
                let mut entry = entries[index].clone();
                entry.mark_pending();
                let automatic = catalog.rules[rule_index].mode == RuleMode::Automatic;
                proposals.push(MatchCandidate::new(
                    transaction.clone(),
                    entry,
                    score,
                    automatic,
                    MatchOrigin::MappingRule,
                ));
                catalog.rules[rule_index].record_success(now);
            }
            _ => catalog.rules[rule_index].record_failure(now),
        }
    }

    proposals
}

/// Half-weighted value/date proximity used when applying mapping rules.
/// Value proximity reaches zero at 5% divergence, date proximity at 30 days.
fn pair_proximity(transaction: &Transaction, entry: &LedgerEntry) -> f64 {
    let relative = transaction.amount.relative_difference(entry.amount);
    let value_proximity = (1.0 - relative / 0.05).max(0.0);
    let gap = (transaction.date - entry.date).num_days().abs() as f64;
    let date_proximity = (1.0 - gap / 30.0).max(0.0);
    0.5 * value_proximity + 0.5 * date_proximity
}

/// Counterparty when present, else a canonical key from description tokens
/// longer than four characters. `None` when neither yields anything.
fn grouping_key(transaction: &Transaction) -> Option<String> {
    if let Some(counterparty) = &transaction.counterparty {
        let normalized = crate::text::normalize(counterparty);
        if !normalized.is_empty() {
            return Some(format!("cp:{normalized}"));
        }
    }
    let key_tokens = tokens(&transaction.description, MIN_KEY_TOKEN_LEN);
    if key_tokens.is_empty() {
        return None;
    }
    Some(key_tokens.into_iter().collect::<Vec<_>>().join("-"))
}

fn group_transactions(transactions: &[Transaction]) -> BTreeMap<String, Vec<&Transaction>> {
    let mut groups: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
    for transaction in transactions {
        if let Some(key) = grouping_key(transaction) {
            groups.entry(key).or_default().push(transaction);
        }
    }
    groups
}

fn group_by_day_of_month(
    transactions: &[Transaction],
) -> BTreeMap<(u32, String), Vec<&Transaction>> {
    let mut groups: BTreeMap<(u32, String), Vec<&Transaction>> = BTreeMap::new();
    for transaction in transactions {
        if let Some(counterparty) = &transaction.counterparty {
            let normalized = crate::text::normalize(counterparty);
            if normalized.is_empty() {
                continue;
            }
            groups
                .entry((transaction.date.day(), normalized))
                .or_default()
                .push(transaction);
        }
    }
    groups
}

/// Intersection of token sets across all texts in the group.
fn shared_token_rule<'a>(texts: impl Iterator<Item = &'a str>) -> TokenRule {
    let mut shared: Option<std::collections::BTreeSet<String>> = None;
    for text in texts {
        let text_tokens = tokens(text, MIN_KEY_TOKEN_LEN);
        shared = Some(match shared {
            Some(acc) => acc.intersection(&text_tokens).cloned().collect(),
            None => text_tokens,
        });
    }
    TokenRule::new(shared.unwrap_or_default().into_iter().collect())
}

/// Periodicity from the statistics of inter-occurrence day gaps.
fn classify_periodicity(dates: &[NaiveDate]) -> (PatternKind, Option<Cadence>) {
    if dates.len() < 2 {
        return (PatternKind::Singular, None);
    }
    let mut sorted = dates.to_vec();
    sorted.sort();
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    let std_dev = variance.sqrt();

    if (25.0..=35.0).contains(&mean) && std_dev < 5.0 {
        return (PatternKind::Recurring, Some(Cadence::Monthly));
    }
    if (85.0..=95.0).contains(&mean) && std_dev < 10.0 {
        return (PatternKind::Recurring, Some(Cadence::Quarterly));
    }
    if (350.0..=380.0).contains(&mean) {
        return (PatternKind::Seasonal, None);
    }
    if mean > 0.0 && std_dev < 0.3 * mean {
        return (PatternKind::Periodic, None);
    }
    (PatternKind::Singular, None)
}
