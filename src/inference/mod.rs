//! Monte Carlo E-step schedule shared by every fit and the final recomputation.

use thiserror::Error;

/// Errors for the E-step sampling schedule.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("posterior draws per E-step must be positive")]
    InvalidDraws,
    #[error("starting draws ({draws}) must not exceed the maximum ({max_draws})")]
    DrawsAboveMaximum { draws: usize, max_draws: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
}

/// Sampler used to draw random effects from their posterior in each E-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampler {
    /// No-U-Turn sampler delegated to an external back-end.
    #[default]
    Stan,
    /// Metropolis-within-Gibbs with adaptive random-walk proposals.
    RandomWalk,
    /// Metropolis-within-Gibbs with independence proposals.
    Independence,
}

/// Monte Carlo schedule for the MCECM E-step.
#[derive(Debug, Clone, Copy)]
pub struct McmcConfig {
    /// Draws discarded before the first retained draw of each E-step.
    pub burn_in_draws: usize,
    /// Retained draws in the first E-step.
    pub draws: usize,
    /// Upper bound on retained draws as the E-step sample grows.
    pub max_draws: usize,
    /// Draws used by the final E-step that reports diagnostics.
    pub report_draws: usize,
    pub thin: usize,
    pub seed: u64,
    pub sampler: Sampler,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            burn_in_draws: 100,
            draws: 100,
            max_draws: 1_000,
            report_draws: 5_000,
            thin: 1,
            seed: 42,
            sampler: Sampler::Stan,
        }
    }
}

impl McmcConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.draws == 0 || self.report_draws == 0 {
            return Err(InferenceError::InvalidDraws);
        }
        if self.draws > self.max_draws {
            return Err(InferenceError::DrawsAboveMaximum {
                draws: self.draws,
                max_draws: self.max_draws,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        Ok(())
    }

    /// Draws the sampler must generate to retain `draws` after burn-in and thinning.
    #[must_use]
    pub const fn total_iterations(self) -> usize {
        self.burn_in_draws + self.draws * self.thin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_valid() {
        assert_eq!(McmcConfig::default().validate(), Ok(()));
        assert_eq!(McmcConfig::default().total_iterations(), 200);
    }

    #[test]
    fn config_validation_rejects_zero_draws() {
        let config = McmcConfig {
            draws: 0,
            ..McmcConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidDraws));
    }

    #[test]
    fn config_validation_rejects_draws_above_maximum() {
        let config = McmcConfig {
            draws: 2_000,
            ..McmcConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(InferenceError::DrawsAboveMaximum {
                draws: 2_000,
                max_draws: 1_000
            })
        );
    }

    #[test]
    fn config_validation_rejects_zero_thinning() {
        let config = McmcConfig {
            thin: 0,
            ..McmcConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidThinning));
    }
}
