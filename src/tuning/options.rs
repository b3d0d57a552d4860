//! Fine-search hyperparameters and penalty configuration.

use super::ConfigError;
use super::criteria::Criterion;
use super::table::PenaltyAxis;
use crate::inference::McmcConfig;

/// How the fine grid is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Random-effect penalty first at the smallest fixed-effect penalty, then
    /// the fixed-effect penalty at the chosen random-effect penalty.
    #[default]
    Abbreviated,
    /// Every `(lambda_fixed, lambda_random)` pair in one engine call.
    FullGrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PenaltyType {
    Lasso,
    #[default]
    Mcp,
    Scad,
}

impl PenaltyType {
    /// Conventional concavity parameter for the penalty.
    #[must_use]
    pub const fn default_gamma(self) -> f64 {
        match self {
            Self::Scad => 3.7,
            Self::Lasso | Self::Mcp => 4.0,
        }
    }
}

/// Penalty family and its shape parameters, forwarded unchanged to every fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyConfig {
    pub penalty: PenaltyType,
    /// Concavity parameter; ignored by the lasso.
    pub gamma_penalty: f64,
    /// Elastic-net mixing between the penalty (1) and ridge (0).
    pub alpha: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self::new(PenaltyType::default())
    }
}

impl PenaltyConfig {
    #[must_use]
    pub const fn new(penalty: PenaltyType) -> Self {
        Self {
            penalty,
            gamma_penalty: penalty.default_gamma(),
            alpha: 1.0,
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPenalty` if the shape parameters are out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha.is_nan() || self.alpha <= 0.0 || self.alpha > 1.0 {
            return Err(ConfigError::InvalidPenalty("alpha must lie in (0, 1]"));
        }
        let gamma_ok = |floor: f64| self.gamma_penalty.is_finite() && self.gamma_penalty > floor;
        match self.penalty {
            PenaltyType::Mcp if !gamma_ok(1.0) => Err(ConfigError::InvalidPenalty(
                "MCP requires gamma_penalty greater than 1",
            )),
            PenaltyType::Scad if !gamma_ok(2.0) => Err(ConfigError::InvalidPenalty(
                "SCAD requires gamma_penalty greater than 2",
            )),
            _ => Ok(()),
        }
    }
}

/// Options for the fine penalty search.
#[derive(Debug, Clone)]
pub struct FineSearchOptions {
    /// Candidate values generated per penalty axis.
    pub nlambda: usize,
    /// Half-width, in coarse-grid positions, of the window around the coarse optimum.
    pub idx_range: usize,
    pub criterion: Criterion,
    pub search: SearchMode,
    /// Caller-supplied fixed-effect sequence; bypasses grid construction.
    pub lambda_fixed: Option<Vec<f64>>,
    /// Caller-supplied random-effect sequence; bypasses grid construction.
    pub lambda_random: Option<Vec<f64>>,
    /// Compute BICq even when selecting on another criterion.
    pub compute_bicq: bool,
    /// Posterior store key of the minimum-penalty reference sample.
    pub bicq_posterior_key: String,
    pub mcmc: McmcConfig,
}

impl Default for FineSearchOptions {
    fn default() -> Self {
        Self {
            nlambda: 10,
            idx_range: 2,
            criterion: Criterion::default(),
            search: SearchMode::default(),
            lambda_fixed: None,
            lambda_random: None,
            compute_bicq: false,
            bicq_posterior_key: "bicq_posterior".to_string(),
            mcmc: McmcConfig::default(),
        }
    }
}

impl FineSearchOptions {
    /// # Errors
    ///
    /// Returns `ConfigError` if any hyperparameter is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idx_range == 0 {
            return Err(ConfigError::InvalidIdxRange);
        }
        if self.nlambda < 2 {
            return Err(ConfigError::InvalidNlambda(self.nlambda));
        }
        if let Some(values) = &self.lambda_fixed {
            validate_sequence(PenaltyAxis::Fixed, values)?;
        }
        if let Some(values) = &self.lambda_random {
            validate_sequence(PenaltyAxis::Random, values)?;
        }
        self.mcmc.validate()?;
        if self.bicq_requested() && self.bicq_posterior_key.trim().is_empty() {
            return Err(ConfigError::EmptyPosteriorKey);
        }
        Ok(())
    }

    /// Whether fits must produce BICq values.
    #[must_use]
    pub fn bicq_requested(&self) -> bool {
        self.compute_bicq || self.criterion.needs_reference_posterior()
    }
}

fn validate_sequence(axis: PenaltyAxis, values: &[f64]) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(ConfigError::InvalidLambdaSequence {
            axis,
            reason: "sequence is empty",
        });
    }
    if values.iter().any(|value| !value.is_finite()) {
        return Err(ConfigError::InvalidLambdaSequence {
            axis,
            reason: "values must be finite",
        });
    }
    if values.iter().any(|&value| value < 0.0) {
        return Err(ConfigError::InvalidLambdaSequence {
            axis,
            reason: "values must be non-negative",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceError;

    #[test]
    fn defaults_are_valid() {
        let options = FineSearchOptions::default();
        assert_eq!(options.validate(), Ok(()));
        assert!(options.bicq_requested());
        assert_eq!(PenaltyConfig::default().validate(), Ok(()));
        assert!((PenaltyConfig::new(PenaltyType::Scad).gamma_penalty - 3.7).abs() < 1e-12);
    }

    #[test]
    fn zero_idx_range_is_rejected() {
        let options = FineSearchOptions {
            idx_range: 0,
            ..FineSearchOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::InvalidIdxRange));
    }

    #[test]
    fn short_nlambda_is_rejected() {
        let options = FineSearchOptions {
            nlambda: 1,
            ..FineSearchOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::InvalidNlambda(1)));
    }

    #[test]
    fn supplied_sequences_are_checked() {
        let options = FineSearchOptions {
            lambda_random: Some(vec![0.1, -0.2]),
            ..FineSearchOptions::default()
        };
        let err = options.validate().expect_err("negative penalty");
        assert!(matches!(
            err,
            ConfigError::InvalidLambdaSequence {
                axis: PenaltyAxis::Random,
                ..
            }
        ));

        let options = FineSearchOptions {
            lambda_fixed: Some(Vec::new()),
            ..FineSearchOptions::default()
        };
        let err = options.validate().expect_err("empty sequence");
        assert!(matches!(
            err,
            ConfigError::InvalidLambdaSequence {
                axis: PenaltyAxis::Fixed,
                ..
            }
        ));
    }

    #[test]
    fn mcmc_errors_are_wrapped() {
        let options = FineSearchOptions {
            mcmc: McmcConfig {
                thin: 0,
                ..McmcConfig::default()
            },
            ..FineSearchOptions::default()
        };
        assert_eq!(
            options.validate(),
            Err(ConfigError::Mcmc(InferenceError::InvalidThinning))
        );
    }

    #[test]
    fn blank_posterior_key_only_matters_for_bicq() {
        let mut options = FineSearchOptions {
            bicq_posterior_key: "  ".to_string(),
            ..FineSearchOptions::default()
        };
        assert_eq!(options.validate(), Err(ConfigError::EmptyPosteriorKey));
        options.criterion = Criterion::BicH;
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn penalty_shape_limits() {
        let mcp = PenaltyConfig {
            gamma_penalty: 1.0,
            ..PenaltyConfig::new(PenaltyType::Mcp)
        };
        assert!(matches!(mcp.validate(), Err(ConfigError::InvalidPenalty(_))));
        let scad = PenaltyConfig {
            gamma_penalty: 2.0,
            ..PenaltyConfig::new(PenaltyType::Scad)
        };
        assert!(scad.validate().is_err());
        let lasso = PenaltyConfig {
            gamma_penalty: 0.5,
            ..PenaltyConfig::new(PenaltyType::Lasso)
        };
        assert_eq!(lasso.validate(), Ok(()));
        let ridge_only = PenaltyConfig {
            alpha: 0.0,
            ..PenaltyConfig::default()
        };
        assert!(ridge_only.validate().is_err());
    }
}
