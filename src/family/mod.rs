/////////////////////////////////////////////////////////////////////////////////////////////\
//
// GLM family kernels used inside every iteratively reweighted fitting step.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Families and links
//!
//! A [`GlmFamily`] pairs a response [`Family`] with a [`Link`]. It is chosen once
//! when a model is configured and handed to every fit as a capability object, so
//! no call site branches on string tags.
//!
//! Unknown family names fail when parsed. Unknown link codes evaluate to zero
//! vectors instead.

use faer::Mat;
use thiserror::Error;

pub mod distribution;
pub mod link;

pub use distribution::Family;
pub use link::Link;

/// Errors raised by family kernels.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FamilyError {
    #[error("response {value} at row {index} is outside the {family} support: {reason}")]
    Domain {
        family: Family,
        index: usize,
        value: f64,
        reason: &'static str,
    },
    #[error("invalid family: {0}")]
    InvalidFamily(String),
}

/// Family/link capability threaded through every fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlmFamily {
    pub family: Family,
    pub link: Link,
}

impl GlmFamily {
    #[must_use]
    pub const fn new(family: Family, link: Link) -> Self {
        Self { family, link }
    }

    /// Family paired with its canonical link.
    #[must_use]
    pub const fn canonical(family: Family) -> Self {
        Self {
            family,
            link: Link::canonical(family),
        }
    }

    /// # Errors
    ///
    /// Returns `FamilyError::Domain` if a response lies outside the family support.
    pub fn initial_mean(&self, y: &Mat<f64>) -> Result<Mat<f64>, FamilyError> {
        self.family.initial_mean(y)
    }

    #[must_use]
    pub fn mean_is_valid(&self, mu: &Mat<f64>) -> Vec<bool> {
        self.family.mean_is_valid(mu)
    }

    #[must_use]
    pub fn all_means_valid(&self, mu: &Mat<f64>) -> bool {
        (0..mu.nrows()).all(|i| self.family.mean_in_range(mu[(i, 0)]))
    }

    #[must_use]
    pub fn clamp_mean(&self, mu: &Mat<f64>) -> Mat<f64> {
        self.family.clamp_mean(mu)
    }

    #[must_use]
    pub fn variance(&self, mu: &Mat<f64>) -> Mat<f64> {
        self.family.variance(mu)
    }

    #[must_use]
    pub fn link(&self, mu: &Mat<f64>) -> Mat<f64> {
        self.link.link(mu)
    }

    #[must_use]
    pub fn inverse_link(&self, eta: &Mat<f64>) -> Mat<f64> {
        self.link.inverse_link(eta)
    }

    #[must_use]
    pub fn dlink(&self, mu: &Mat<f64>) -> Mat<f64> {
        self.link.dlink(mu)
    }

    /// IRLS working weights `1 / (V(mu) * g'(mu)^2)`, floored at `min_weight`.
    #[must_use]
    pub fn working_weights(&self, mu: &Mat<f64>, min_weight: f64) -> Mat<f64> {
        Mat::from_fn(mu.nrows(), 1, |i, _| {
            let m = mu[(i, 0)];
            let deriv = self.link.dlink_scalar(m);
            let w = 1.0 / (self.family.variance_scalar(m) * deriv * deriv);
            if w.is_finite() { w.max(min_weight) } else { min_weight }
        })
    }

    /// IRLS working response `eta + (y - mu) * g'(mu)`.
    #[must_use]
    pub fn working_response(&self, y: &Mat<f64>, eta: &Mat<f64>, mu: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(mu.nrows(), 1, |i, _| {
            let m = mu[(i, 0)];
            (y[(i, 0)] - m).mul_add(self.link.dlink_scalar(m), eta[(i, 0)])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn canonical_pairs() {
        let binomial = GlmFamily::canonical(Family::Binomial);
        assert_eq!(binomial.link, Link::Logit);
        assert_eq!(GlmFamily::canonical(Family::Poisson).link, Link::Log);
        assert_eq!(GlmFamily::canonical(Family::Gaussian).link, Link::Identity);
    }

    #[test]
    fn logistic_working_weights_equal_binomial_variance() {
        let glm = GlmFamily::canonical(Family::Binomial);
        let mu = Mat::from_fn(2, 1, |i, _| if i == 0 { 0.5 } else { 0.2 });
        let w = glm.working_weights(&mu, 1e-12);
        assert_relative_eq!(w[(0, 0)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(w[(1, 0)], 0.16, epsilon = 1e-12);
    }

    #[test]
    fn working_response_for_poisson_log() {
        let glm = GlmFamily::canonical(Family::Poisson);
        let y = Mat::from_fn(1, 1, |_, _| 3.0);
        let mu = Mat::from_fn(1, 1, |_, _| 2.0);
        let eta = glm.link(&mu);
        let z = glm.working_response(&y, &eta, &mu);
        assert_relative_eq!(z[(0, 0)], 2.0f64.ln() + 0.5);
    }

    #[test]
    fn zero_derivative_links_fall_back_to_min_weight() {
        let glm = GlmFamily::new(Family::Binomial, Link::Probit);
        let mu = Mat::from_fn(1, 1, |_, _| 0.5);
        let w = glm.working_weights(&mu, 1e-6);
        assert_relative_eq!(w[(0, 0)], 1e-6);
    }
}
