use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use concilia_core::{DecisionKind, HumanDecision, ReconciliationConfig, ResolutionConfig};

const MIN_SAMPLE_SIZE: usize = 10;
const RETRAIN_INTERVAL_HOURS: i64 = 24;
/// Undo share above which an auto-resolution feature is recommended off.
const UNDO_DANGER_RATIO: f64 = 0.3;
const VALUE_TOLERANCE_FLOOR: f64 = 0.005;
const DAY_WINDOW_FLOOR: u32 = 7;
const PRECISION_CAP: f64 = 0.95;

/// Parameters derived from the decision log. Advisory: callers merge them
/// through `recommended_config`, nothing applies them automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedParameters {
    pub value_tolerance_pct: f64,
    pub date_tolerance_days: u32,
    pub recommend_duplicate_resolution: bool,
    pub recommend_divergence_correction: bool,
    /// Advisory confidence multiplier for mined textual patterns.
    pub pattern_confidence: f64,
    /// Advisory confidence multiplier for correspondence rules.
    pub rule_confidence: f64,
    pub precision: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerStats {
    pub trained: bool,
    pub decision_count: usize,
    pub model_version: u32,
    pub last_trained: Option<DateTime<Utc>>,
    pub precision: f64,
}

/// Ingests human override decisions and periodically retunes the matching
/// and resolution parameters from them. Not a statistical model: every
/// derived value is an explicit percentile or ratio over the log.
#[derive(Debug, Default)]
pub struct AdaptiveLearner {
    decisions: Vec<HumanDecision>,
    parameters: Option<LearnedParameters>,
    last_trained: Option<DateTime<Utc>>,
    trained_decision_count: usize,
    model_version: u32,
}

impl AdaptiveLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&mut self, decision: HumanDecision) {
        self.decisions.push(decision);
    }

    pub fn decisions(&self) -> &[HumanDecision] {
        &self.decisions
    }

    pub fn parameters(&self) -> Option<&LearnedParameters> {
        self.parameters.as_ref()
    }

    /// Retrains when the log holds at least `MIN_SAMPLE_SIZE` decisions, a
    /// day has passed since the last pass, and new decisions arrived since.
    /// Returns whether retraining actually ran; insufficiency is a no-op,
    /// never an error.
    pub fn train(&mut self) -> bool {
        self.train_at(Utc::now())
    }

    pub fn train_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.decisions.len() < MIN_SAMPLE_SIZE {
            return false;
        }
        if self.decisions.len() == self.trained_decision_count {
            return false;
        }
        if let Some(last) = self.last_trained {
            if now - last < Duration::hours(RETRAIN_INTERVAL_HOURS) {
                return false;
            }
        }

        self.parameters = Some(derive_parameters(&self.decisions));
        self.last_trained = Some(now);
        self.trained_decision_count = self.decisions.len();
        self.model_version += 1;
        tracing::info!(
            version = self.model_version,
            samples = self.decisions.len(),
            "learner retrained"
        );
        true
    }

    /// Merge learned parameters into copies of the live configs. Tolerances
    /// are replaced by their learned values; stage toggles are only ever
    /// switched off, never force-enabled. Untrained learners return the
    /// configs unchanged.
    pub fn recommended_config(
        &self,
        reconciliation: &ReconciliationConfig,
        resolution: &ResolutionConfig,
    ) -> (ReconciliationConfig, ResolutionConfig) {
        let mut reconciliation = reconciliation.clone();
        let mut resolution = resolution.clone();
        if let Some(parameters) = &self.parameters {
            reconciliation.value_tolerance_pct = parameters.value_tolerance_pct;
            reconciliation.date_tolerance_days = parameters.date_tolerance_days;
            resolution.resolve_duplicates =
                resolution.resolve_duplicates && parameters.recommend_duplicate_resolution;
            resolution.correct_divergences =
                resolution.correct_divergences && parameters.recommend_divergence_correction;
        }
        (reconciliation, resolution)
    }

    pub fn stats(&self) -> LearnerStats {
        LearnerStats {
            trained: self.parameters.is_some(),
            decision_count: self.decisions.len(),
            model_version: self.model_version,
            last_trained: self.last_trained,
            precision: self
                .parameters
                .as_ref()
                .map(|p| p.precision)
                .unwrap_or(0.0),
        }
    }
}

/// Pure function of the log, so retraining on an unchanged log always
/// yields the same parameters.
fn derive_parameters(decisions: &[HumanDecision]) -> LearnedParameters {
    let mut divergences: Vec<f64> = decisions
        .iter()
        .filter(|d| matches!(d.kind, DecisionKind::Accept | DecisionKind::Correct))
        .map(|d| d.value_divergence)
        .collect();
    divergences.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut day_gaps: Vec<f64> = decisions
        .iter()
        .filter(|d| d.kind == DecisionKind::Accept)
        .map(|d| f64::from(d.day_gap))
        .collect();
    day_gaps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let value_tolerance_pct = percentile(&divergences, 0.90).max(VALUE_TOLERANCE_FLOOR);
    let date_tolerance_days = (percentile(&day_gaps, 0.95).ceil() as u32).max(DAY_WINDOW_FLOOR);

    let undo_count = decisions
        .iter()
        .filter(|d| d.kind == DecisionKind::Undo)
        .count();
    let undo_ratio = undo_count as f64 / decisions.len() as f64;
    let resolution_safe = undo_ratio < UNDO_DANGER_RATIO;

    let accepts = decisions
        .iter()
        .filter(|d| d.kind == DecisionKind::Accept)
        .count();
    let corrects = decisions
        .iter()
        .filter(|d| d.kind == DecisionKind::Correct)
        .count();
    let pattern_confidence = 0.5 + 0.4 * (accepts as f64 / 50.0).min(1.0);
    let rule_confidence = 0.5 + 0.4 * ((accepts + corrects) as f64 / 50.0).min(1.0);

    let precision = (0.5 + 0.45 * (decisions.len() as f64 / 100.0).min(1.0)).min(PRECISION_CAP);

    LearnedParameters {
        value_tolerance_pct,
        date_tolerance_days,
        recommend_duplicate_resolution: resolution_safe,
        recommend_divergence_correction: resolution_safe,
        pattern_confidence,
        rule_confidence,
        precision,
    }
}

/// Nearest-rank percentile over a pre-sorted sample. Empty samples yield 0.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    sorted[rank - 1]
}
