//! Coarse-search output of a penalized GLMM, the starting point of a fine search.

use crate::family::GlmFamily;
use crate::input::{GlmmInput, Standardization};
use crate::tuning::assemble::check_names;
use crate::tuning::{
    CoefficientTable, ConfigError, PenaltyConfig, SelectionError, SelectionTable, WarmStart,
};

/// A penalized GLMM after its coarse penalty search.
///
/// `input.fixed_design` holds the standardized design the model was fit on;
/// `standardization` maps coefficients back to the raw design.
#[derive(Debug, Clone)]
pub struct PglmmFit {
    pub input: GlmmInput,
    pub standardization: Standardization,
    pub family: GlmFamily,
    pub penalty: PenaltyConfig,
    /// One row per coarse penalty combination.
    pub coarse_results: SelectionTable,
    /// Standardized coefficients aligned with `coarse_results`.
    pub coarse_coefficients: Option<CoefficientTable>,
    /// Explicit starting state; takes precedence over the coarse coefficients.
    pub warm_start: Option<WarmStart>,
    pub fixed_names: Vec<String>,
    pub random_names: Vec<String>,
}

impl PglmmFit {
    /// Model over an already standardized design, with generated names.
    #[must_use]
    pub fn new(input: GlmmInput, family: GlmFamily, coarse_results: SelectionTable) -> Self {
        let p = input.fixed_count();
        let q = input.random_count();
        let fixed_names = (0..p)
            .map(|j| {
                if j == 0 {
                    "(Intercept)".to_string()
                } else {
                    format!("X{j}")
                }
            })
            .collect();
        let random_names = (0..q).map(|j| format!("Z{j}")).collect();
        Self {
            standardization: Standardization::identity(p.saturating_sub(1)),
            input,
            family,
            penalty: PenaltyConfig::default(),
            coarse_results,
            coarse_coefficients: None,
            warm_start: None,
            fixed_names,
            random_names,
        }
    }

    /// Standardize the raw fixed-effects design of `input` and keep the transform.
    #[must_use]
    pub fn standardized(
        input: GlmmInput,
        family: GlmFamily,
        coarse_results: SelectionTable,
    ) -> Self {
        let standardization = Standardization::fit(&input.fixed_design);
        let input = GlmmInput {
            fixed_design: standardization.apply(&input.fixed_design),
            ..input
        };
        Self::new(input, family, coarse_results).with_standardization(standardization)
    }

    #[must_use]
    pub fn with_standardization(mut self, standardization: Standardization) -> Self {
        self.standardization = standardization;
        self
    }

    #[must_use]
    pub const fn with_penalty(mut self, penalty: PenaltyConfig) -> Self {
        self.penalty = penalty;
        self
    }

    #[must_use]
    pub fn with_coarse_coefficients(mut self, coefficients: CoefficientTable) -> Self {
        self.coarse_coefficients = Some(coefficients);
        self
    }

    #[must_use]
    pub fn with_warm_start(mut self, warm_start: WarmStart) -> Self {
        self.warm_start = Some(warm_start);
        self
    }

    #[must_use]
    pub fn with_names(mut self, fixed_names: Vec<String>, random_names: Vec<String>) -> Self {
        self.fixed_names = fixed_names;
        self.random_names = random_names;
        self
    }

    /// Coefficient count per fit: fixed effects plus the `q x q` `Gamma` block.
    #[must_use]
    pub fn coefficient_count(&self) -> usize {
        let q = self.input.random_count();
        self.input.fixed_count() + q * q
    }

    /// # Errors
    ///
    /// Returns `SelectionError` if the input, the penalty, or any stored state
    /// disagrees with the design dimensions.
    pub fn validate(&self) -> Result<(), SelectionError> {
        self.input.validate()?;
        self.penalty.validate()?;
        let p = self.input.fixed_count();
        let q = self.input.random_count();
        if self.standardization.slopes() != p - 1 {
            return Err(ConfigError::StandardizationMismatch {
                expected: p - 1,
                found: self.standardization.slopes(),
            }
            .into());
        }
        self.standardization.validate()?;
        check_names("fixed-effect", p, &self.fixed_names)?;
        check_names("random-effect", q, &self.random_names)?;
        if let Some(start) = &self.warm_start
            && (start.coefficients.nrows() != self.coefficient_count()
                || start.keep.len() != q)
        {
            return Err(ConfigError::WarmStartShape {
                expected: self.coefficient_count(),
                found: start.coefficients.nrows(),
            }
            .into());
        }
        if let Some(coefficients) = &self.coarse_coefficients {
            if coefficients.fixed_count() != p || coefficients.random_count() != q {
                return Err(ConfigError::CoefficientShape {
                    expected: self.coefficient_count(),
                    found: coefficients.values().ncols(),
                }
                .into());
            }
            if coefficients.nrows() != self.coarse_results.len() {
                return Err(ConfigError::RowMismatch {
                    results: self.coarse_results.len(),
                    coefficients: coefficients.nrows(),
                }
                .into());
            }
        }
        Ok(())
    }
}
