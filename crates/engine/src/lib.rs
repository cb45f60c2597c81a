pub mod classify;
pub mod intake;
pub mod learner;
pub mod matcher;
pub mod patterns;
pub mod pipeline;
pub mod resolver;
pub(crate) mod text;

pub use classify::{Classified, ClassifyError, EntryClassifier, NullClassifier};
pub use intake::{parse_entries, parse_transactions, RawEntry, RawTransaction, RecordError};
pub use learner::{AdaptiveLearner, LearnedParameters, LearnerStats};
pub use matcher::{observe_decision, undo_match, MatchOutcome, Matcher};
pub use patterns::{
    apply_mapping_rules, AnalysisResult, Cadence, MappingRule, Pattern, PatternCatalog,
    PatternConfig, PatternKind, PatternMiner, RuleMode, TokenRule,
};
pub use pipeline::{BatchReport, BatchSummary, Notifier, Orchestrator, TracingNotifier};
pub use resolver::{ResolveOutcome, Resolver};
pub use text::description_similarity;
