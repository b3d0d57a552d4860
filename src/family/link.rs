//! Link functions mapping the mean `mu` to the linear predictor `eta`.
//!
//! Probit and unrecognized codes are accepted but evaluate to zero vectors.

use std::fmt;

use faer::Mat;

use super::Family;

/// Link between the linear predictor and the mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    Logit,
    /// Reserved; every transform returns zeros.
    Probit,
    Cloglog,
    Log,
    Identity,
    Inverse,
    /// Any integer code outside the known set; every transform returns zeros.
    Unrecognized(i32),
}

impl Link {
    /// Resolve an integer link code (10 logit, 11 probit, 12 cloglog, 20 log,
    /// 30 identity, 40 inverse).
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            10 => Self::Logit,
            11 => Self::Probit,
            12 => Self::Cloglog,
            20 => Self::Log,
            30 => Self::Identity,
            40 => Self::Inverse,
            other => Self::Unrecognized(other),
        }
    }

    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Logit => 10,
            Self::Probit => 11,
            Self::Cloglog => 12,
            Self::Log => 20,
            Self::Identity => 30,
            Self::Inverse => 40,
            Self::Unrecognized(code) => code,
        }
    }

    /// Canonical link for a family.
    #[must_use]
    pub const fn canonical(family: Family) -> Self {
        match family {
            Family::Binomial => Self::Logit,
            Family::Poisson => Self::Log,
            Family::Gaussian => Self::Identity,
            Family::Gamma => Self::Inverse,
        }
    }

    /// `eta = g(mu)`.
    #[must_use]
    pub fn link(self, mu: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(mu.nrows(), 1, |i, _| self.link_scalar(mu[(i, 0)]))
    }

    /// `mu = g^{-1}(eta)`.
    #[must_use]
    pub fn inverse_link(self, eta: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(eta.nrows(), 1, |i, _| self.inverse_scalar(eta[(i, 0)]))
    }

    /// `d(eta)/d(mu)` evaluated at `mu`.
    #[must_use]
    pub fn dlink(self, mu: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(mu.nrows(), 1, |i, _| self.dlink_scalar(mu[(i, 0)]))
    }

    pub(crate) fn link_scalar(self, mu: f64) -> f64 {
        match self {
            Self::Logit => (mu / (1.0 - mu)).ln(),
            Self::Cloglog => (-(1.0 - mu).ln()).ln(),
            Self::Log => mu.ln(),
            Self::Identity => mu,
            Self::Inverse => 1.0 / mu,
            Self::Probit | Self::Unrecognized(_) => 0.0,
        }
    }

    pub(crate) fn inverse_scalar(self, eta: f64) -> f64 {
        match self {
            Self::Logit => eta.exp() / (1.0 + eta.exp()),
            Self::Cloglog => 1.0 - (-eta.exp()).exp(),
            Self::Log => eta.exp(),
            Self::Identity => eta,
            Self::Inverse => -1.0 / eta,
            Self::Probit | Self::Unrecognized(_) => 0.0,
        }
    }

    pub(crate) fn dlink_scalar(self, mu: f64) -> f64 {
        match self {
            Self::Logit => 1.0 / (mu * (1.0 - mu)),
            // Negative on (0, 1); consumers depend on this sign.
            Self::Cloglog => 1.0 / ((1.0 - mu).ln() * (1.0 - mu)),
            Self::Log => 1.0 / mu,
            Self::Identity => 1.0,
            Self::Inverse => -1.0 / (mu * mu),
            Self::Probit | Self::Unrecognized(_) => 0.0,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logit => f.write_str("logit"),
            Self::Probit => f.write_str("probit"),
            Self::Cloglog => f.write_str("cloglog"),
            Self::Log => f.write_str("log"),
            Self::Identity => f.write_str("identity"),
            Self::Inverse => f.write_str("inverse"),
            Self::Unrecognized(code) => write!(f, "unrecognized({code})"),
        }
    }
}
