use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be within {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Named preset controlling how permissive matching is.
///
/// Each strategy derives an acceptance cutoff for pass 1 and, except for
/// `Conservative`, a rejection floor for the relaxed pass 2. Cutoffs fall
/// monotonically with aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Strategy {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl Strategy {
    pub fn acceptance_cutoff(self) -> f64 {
        match self {
            Strategy::Conservative => 0.9,
            Strategy::Moderate => 0.8,
            Strategy::Aggressive => 0.7,
        }
    }

    /// Minimum score for a relaxed pass-2 match. `None` disables pass 2.
    pub fn rejection_floor(self) -> Option<f64> {
        match self {
            Strategy::Conservative => None,
            Strategy::Moderate => Some(0.5),
            Strategy::Aggressive => Some(0.3),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Conservative => write!(f, "conservative"),
            Strategy::Moderate => write!(f, "moderate"),
            Strategy::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(Strategy::Conservative),
            "moderate" => Ok(Strategy::Moderate),
            "aggressive" => Ok(Strategy::Aggressive),
            other => Err(format!("Unknown strategy: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Score at or above which a pass-1 match is flagged automatic, in (0, 1].
    pub automatic_score_threshold: f64,
    pub date_tolerance_days: u32,
    /// Relative value tolerance as a fraction (0.02 = 2%).
    pub value_tolerance_pct: f64,
    pub consider_counterparty: bool,
    pub strategy: Strategy,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        ReconciliationConfig {
            automatic_score_threshold: 0.85,
            date_tolerance_days: 3,
            value_tolerance_pct: 0.02,
            consider_counterparty: true,
            strategy: Strategy::Moderate,
        }
    }
}

impl ReconciliationConfig {
    /// Range validation. Invalid values are hard errors, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.automatic_score_threshold > 0.0 && self.automatic_score_threshold <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "automatic_score_threshold",
                range: "(0, 1]",
                value: self.automatic_score_threshold,
            });
        }
        if self.value_tolerance_pct < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "value_tolerance_pct",
                range: "[0, ∞)",
                value: self.value_tolerance_pct,
            });
        }
        Ok(())
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ReconciliationConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub resolve_duplicates: bool,
    pub correct_divergences: bool,
    pub ignore_internal_transfers: bool,
    pub synthesize_orphan_entries: bool,
    /// Relative value tolerance for divergence correction, as a fraction.
    pub divergence_tolerance_pct: f64,
    /// Classifier confidence required to keep a refined synthesized entry.
    pub min_confidence_to_resolve: f64,
    /// Date window, in days, searched during duplicate lookup and
    /// divergence correction.
    pub max_backtrack_days: u32,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig {
            resolve_duplicates: true,
            correct_divergences: true,
            ignore_internal_transfers: true,
            synthesize_orphan_entries: true,
            divergence_tolerance_pct: 0.02,
            min_confidence_to_resolve: 0.6,
            max_backtrack_days: 7,
        }
    }
}

impl ResolutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.divergence_tolerance_pct < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "divergence_tolerance_pct",
                range: "[0, ∞)",
                value: self.divergence_tolerance_pct,
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence_to_resolve) {
            return Err(ConfigError::OutOfRange {
                field: "min_confidence_to_resolve",
                range: "[0, 1]",
                value: self.min_confidence_to_resolve,
            });
        }
        Ok(())
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ResolutionConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_cutoffs_fall_with_aggressiveness() {
        assert!(
            Strategy::Conservative.acceptance_cutoff() > Strategy::Moderate.acceptance_cutoff()
        );
        assert!(Strategy::Moderate.acceptance_cutoff() > Strategy::Aggressive.acceptance_cutoff());
        assert_eq!(Strategy::Conservative.rejection_floor(), None);
        assert!(
            Strategy::Moderate.rejection_floor().unwrap()
                > Strategy::Aggressive.rejection_floor().unwrap()
        );
    }

    #[test]
    fn strategy_parses_case_insensitive() {
        assert_eq!("AGGRESSIVE".parse::<Strategy>().unwrap(), Strategy::Aggressive);
        assert!("reckless".parse::<Strategy>().is_err());
    }

    #[test]
    fn default_reconciliation_config_is_valid() {
        assert!(ReconciliationConfig::default().validate().is_ok());
    }

    #[test]
    fn threshold_above_one_is_rejected() {
        let config = ReconciliationConfig {
            automatic_score_threshold: 1.2,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "automatic_score_threshold", .. })
        ));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let config = ReconciliationConfig {
            automatic_score_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_tolerance_is_rejected_not_clamped() {
        let config = ReconciliationConfig {
            value_tolerance_pct: -0.01,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let resolution = ResolutionConfig {
            divergence_tolerance_pct: -0.5,
            ..Default::default()
        };
        assert!(resolution.validate().is_err());
    }

    #[test]
    fn min_confidence_outside_unit_interval_is_rejected() {
        let config = ResolutionConfig {
            min_confidence_to_resolve: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reconciliation_config_from_toml() {
        let config = ReconciliationConfig::from_toml(
            r#"
            automatic_score_threshold = 0.9
            date_tolerance_days = 5
            value_tolerance_pct = 0.01
            consider_counterparty = false
            strategy = "Conservative"
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::Conservative);
        assert_eq!(config.date_tolerance_days, 5);
        assert!(!config.consider_counterparty);
    }

    #[test]
    fn from_toml_rejects_invalid_ranges() {
        let result = ResolutionConfig::from_toml(
            r#"
            resolve_duplicates = true
            correct_divergences = true
            ignore_internal_transfers = true
            synthesize_orphan_entries = true
            divergence_tolerance_pct = -0.02
            min_confidence_to_resolve = 0.6
            max_backtrack_days = 7
            "#,
        );
        assert!(result.is_err());
    }
}
