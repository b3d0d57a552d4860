//! Response distributions: valid mean ranges, clamping, and variance functions.

use std::fmt;
use std::str::FromStr;

use faer::Mat;

use super::FamilyError;

// Validity is a stricter test than the clamp target; keep the two sets separate.
const BINOMIAL_VALID_MIN: f64 = 0.0001;
const BINOMIAL_VALID_MAX: f64 = 0.9999;
const POISSON_VALID_MIN: f64 = 0.0001;
const GAMMA_VALID_MIN: f64 = 0.001;

const BINOMIAL_CLAMP_MIN: f64 = 0.001;
const BINOMIAL_CLAMP_MAX: f64 = 0.999;
const POISSON_CLAMP_MIN: f64 = 0.001;
const GAMMA_CLAMP_MIN: f64 = 0.001;

/// Exponential-family response distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Binomial,
    Poisson,
    Gaussian,
    Gamma,
}

impl Family {
    /// Canonical name, as accepted by `FromStr`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Binomial => "binomial",
            Self::Poisson => "poisson",
            Self::Gaussian => "gaussian",
            Self::Gamma => "Gamma",
        }
    }

    /// Starting mean estimate from raw responses.
    ///
    /// # Errors
    ///
    /// Returns `FamilyError::Domain` if a response lies outside the family support.
    pub fn initial_mean(self, y: &Mat<f64>) -> Result<Mat<f64>, FamilyError> {
        for i in 0..y.nrows() {
            self.check_support(i, y[(i, 0)])?;
        }
        Ok(Mat::from_fn(y.nrows(), 1, |i, _| {
            let yi = y[(i, 0)];
            match self {
                Self::Binomial => (yi + 0.5) / 2.0,
                Self::Poisson | Self::Gamma => yi + 0.1,
                Self::Gaussian => yi,
            }
        }))
    }

    fn check_support(self, index: usize, value: f64) -> Result<(), FamilyError> {
        let reason = match self {
            Self::Binomial if value < 0.0 => "negative values are not allowed",
            Self::Binomial if value > 1.0 => "success proportion is larger than 1",
            Self::Poisson if value < 0.0 => "negative values are not allowed",
            Self::Gamma if value <= 0.0 => "non-positive values are not allowed",
            _ => return Ok(()),
        };
        Err(FamilyError::Domain {
            family: self,
            index,
            value,
            reason,
        })
    }

    /// Whether a single mean lies strictly inside the family's valid interval.
    #[must_use]
    pub fn mean_in_range(self, mu: f64) -> bool {
        match self {
            Self::Binomial => mu > BINOMIAL_VALID_MIN && mu < BINOMIAL_VALID_MAX,
            Self::Poisson => mu > POISSON_VALID_MIN,
            Self::Gamma => mu > GAMMA_VALID_MIN,
            Self::Gaussian => true,
        }
    }

    /// Element-wise validity of a mean vector.
    #[must_use]
    pub fn mean_is_valid(self, mu: &Mat<f64>) -> Vec<bool> {
        (0..mu.nrows())
            .map(|i| self.mean_in_range(mu[(i, 0)]))
            .collect()
    }

    /// Clip means that fall outside the family's clamp interval onto its boundary.
    #[must_use]
    pub fn clamp_mean(self, mu: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(mu.nrows(), 1, |i, _| self.clamp_scalar(mu[(i, 0)]))
    }

    fn clamp_scalar(self, mu: f64) -> f64 {
        match self {
            Self::Binomial if mu < BINOMIAL_CLAMP_MIN => BINOMIAL_CLAMP_MIN,
            Self::Binomial if mu > BINOMIAL_CLAMP_MAX => BINOMIAL_CLAMP_MAX,
            Self::Poisson if mu < POISSON_CLAMP_MIN => POISSON_CLAMP_MIN,
            Self::Gamma if mu < GAMMA_CLAMP_MIN => GAMMA_CLAMP_MIN,
            _ => mu,
        }
    }

    /// Variance function `V(mu)`.
    #[must_use]
    pub fn variance(self, mu: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(mu.nrows(), 1, |i, _| self.variance_scalar(mu[(i, 0)]))
    }

    pub(crate) fn variance_scalar(self, mu: f64) -> f64 {
        match self {
            Self::Binomial => mu * (1.0 - mu),
            Self::Poisson => mu,
            Self::Gaussian => 1.0,
            Self::Gamma => mu * mu,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = FamilyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binomial" => Ok(Self::Binomial),
            "poisson" => Ok(Self::Poisson),
            "gaussian" => Ok(Self::Gaussian),
            "Gamma" | "gamma" => Ok(Self::Gamma),
            other => Err(FamilyError::InvalidFamily(other.to_string())),
        }
    }
}
