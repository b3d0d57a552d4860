/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Fixed-effects GLM fitted by penalized IRLS.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Fixed-effects GLM
//!
//! Ridge-stabilized IRLS for the fixed-effects-only GLM. The mixed-model search
//! uses it to seed fixed-effect coefficients when the upstream fit carries no
//! warm start. Every iteration runs through the [`GlmFamily`] kernels: initial
//! mean, link derivative, variance, validity check with step halving, and
//! clamping.

use faer::Mat;
use statrs::function::gamma::ln_gamma;
use thiserror::Error;

use crate::family::{Family, FamilyError, GlmFamily, Link};
use crate::utils::{matrix_is_finite, max_abs_diff, solve_linear_system, usize_to_f64};

/// Tuning parameters for GLM fitting.
#[derive(Debug, Clone, Copy)]
pub struct GlmOptions {
    /// Maximum IRLS iterations.
    pub max_iter: usize,
    /// Convergence tolerance on coefficient changes.
    pub tolerance: f64,
    /// Lower bound on IRLS weights.
    pub min_weight: f64,
    /// L2 (ridge) penalty strength.
    pub l2_penalty: f64,
    /// Step halvings attempted when an update leaves the valid mean region.
    pub max_step_halving: usize,
}

impl Default for GlmOptions {
    fn default() -> Self {
        Self {
            max_iter: 50,
            tolerance: 1e-8,
            min_weight: 1e-10,
            l2_penalty: 1e-8,
            max_step_halving: 10,
        }
    }
}

/// Errors returned by GLM fitting.
#[derive(Debug, Error)]
pub enum GlmError {
    #[error("design matrix rows ({rows}) must match response length ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("design matrix must have at least one column")]
    EmptyDesign,
    #[error("inputs contain non-finite values")]
    NonFiniteInput,
    #[error("link {0} cannot be used for fitting")]
    UnsupportedLink(Link),
    #[error(transparent)]
    Family(#[from] FamilyError),
    #[error("linear solve failed")]
    SolveFailed,
    #[error("model failed to converge")]
    NonConvergence,
}

/// Fitted GLM coefficients and fit statistics.
#[derive(Debug, Clone)]
pub struct GlmFit {
    pub beta: Mat<f64>,
    pub mean: Mat<f64>,
    pub iterations: usize,
    pub deviance: f64,
    pub log_likelihood: f64,
}

/// Fit a GLM by penalized IRLS.
///
/// # Errors
///
/// Returns `GlmError` if inputs are malformed, a response is outside the family
/// support, or the solver fails.
pub fn fit_glm(
    x: &Mat<f64>,
    y: &Mat<f64>,
    family: GlmFamily,
    options: GlmOptions,
) -> Result<GlmFit, GlmError> {
    if x.ncols() == 0 {
        return Err(GlmError::EmptyDesign);
    }
    if x.nrows() != y.nrows() {
        return Err(GlmError::DimensionMismatch {
            rows: x.nrows(),
            len: y.nrows(),
        });
    }
    if !matrix_is_finite(x) || !matrix_is_finite(y) {
        return Err(GlmError::NonFiniteInput);
    }
    // The inverse link maps eta back to -mu, so IRLS cannot use it.
    if matches!(
        family.link,
        Link::Probit | Link::Inverse | Link::Unrecognized(_)
    ) {
        return Err(GlmError::UnsupportedLink(family.link));
    }

    let mut mu = family.initial_mean(y)?;
    let mut eta = family.link(&mu);
    let mut beta: Option<Mat<f64>> = None;
    let lambda = options.l2_penalty.max(0.0);

    for iteration in 1..=options.max_iter {
        let weights = family.working_weights(&mu, options.min_weight);
        let z = family.working_response(y, &eta, &mu);
        let mut xtwx = weighted_xtx(x, &weights);
        if lambda > 0.0 {
            for j in 1..x.ncols() {
                xtwx[(j, j)] += lambda;
            }
        }
        let xtwz = weighted_xtz(x, &weights, &z);
        let mut beta_next =
            solve_linear_system(&xtwx, &xtwz).map_err(|_| GlmError::SolveFailed)?;

        let mut eta_next = x * &beta_next;
        let mut mu_next = family.inverse_link(&eta_next);
        if let Some(previous) = &beta {
            let mut halvings = 0;
            while !family.all_means_valid(&mu_next) && halvings < options.max_step_halving {
                beta_next = Mat::from_fn(beta_next.nrows(), 1, |i, _| {
                    0.5 * (beta_next[(i, 0)] + previous[(i, 0)])
                });
                eta_next = x * &beta_next;
                mu_next = family.inverse_link(&eta_next);
                halvings += 1;
            }
        }
        mu_next = family.clamp_mean(&mu_next);

        let converged = beta
            .as_ref()
            .is_some_and(|previous| max_abs_diff(&beta_next, previous) < options.tolerance);
        mu = mu_next;
        eta = eta_next;
        beta = Some(beta_next);

        if converged {
            let beta = beta.ok_or(GlmError::NonConvergence)?;
            let deviance = deviance(family.family, y, &mu);
            let log_likelihood = log_likelihood(family.family, y, &mu, x.ncols());
            log::debug!(
                "GLM ({}, {}) converged after {iteration} iterations, deviance {deviance:.6}",
                family.family,
                family.link
            );
            return Ok(GlmFit {
                beta,
                mean: mu,
                iterations: iteration,
                deviance,
                log_likelihood,
            });
        }
    }

    Err(GlmError::NonConvergence)
}

/// Residual deviance of fitted means for a family.
#[must_use]
pub fn deviance(family: Family, y: &Mat<f64>, mu: &Mat<f64>) -> f64 {
    let mut total = 0.0;
    for i in 0..y.nrows() {
        let yi = y[(i, 0)];
        let mi = mu[(i, 0)];
        total += match family {
            Family::Binomial => 2.0 * (x_log_ratio(yi, mi) + x_log_ratio(1.0 - yi, 1.0 - mi)),
            Family::Poisson => 2.0 * (x_log_ratio(yi, mi) - (yi - mi)),
            Family::Gaussian => (yi - mi).powi(2),
            Family::Gamma => 2.0 * ((yi - mi) / mi - (yi / mi).ln()),
        };
    }
    total
}

/// Log-likelihood of fitted means; dispersion is estimated for gaussian and gamma.
#[must_use]
pub fn log_likelihood(family: Family, y: &Mat<f64>, mu: &Mat<f64>, n_params: usize) -> f64 {
    let n = usize_to_f64(y.nrows());
    match family {
        Family::Binomial => (0..y.nrows())
            .map(|i| {
                let yi = y[(i, 0)];
                let mi = mu[(i, 0)];
                yi.mul_add(mi.ln(), (1.0 - yi) * (1.0 - mi).ln())
            })
            .sum(),
        Family::Poisson => (0..y.nrows())
            .map(|i| {
                let yi = y[(i, 0)];
                let mi = mu[(i, 0)];
                yi.mul_add(mi.ln(), -mi) - ln_gamma(yi + 1.0)
            })
            .sum(),
        Family::Gaussian => {
            let sigma_sq = (deviance(family, y, mu) / n).max(f64::MIN_POSITIVE);
            -0.5 * n * ((std::f64::consts::TAU * sigma_sq).ln() + 1.0)
        }
        Family::Gamma => {
            let df = (n - usize_to_f64(n_params)).max(1.0);
            let pearson = (0..y.nrows())
                .map(|i| ((y[(i, 0)] - mu[(i, 0)]) / mu[(i, 0)]).powi(2))
                .sum::<f64>();
            let shape = df / pearson.max(f64::MIN_POSITIVE);
            (0..y.nrows())
                .map(|i| {
                    let ratio = shape * y[(i, 0)] / mu[(i, 0)];
                    shape.mul_add(ratio.ln(), -ratio) - y[(i, 0)].ln() - ln_gamma(shape)
                })
                .sum()
        }
    }
}

fn x_log_ratio(x: f64, m: f64) -> f64 {
    if x <= 0.0 { 0.0 } else { x * (x / m).ln() }
}

fn weighted_xtx(x: &Mat<f64>, weights: &Mat<f64>) -> Mat<f64> {
    let p = x.ncols();
    let mut xtx = Mat::<f64>::zeros(p, p);
    for i in 0..x.nrows() {
        let w = weights[(i, 0)];
        for col_i in 0..p {
            let wxi = w * x[(i, col_i)];
            for col_j in 0..p {
                xtx[(col_i, col_j)] += wxi * x[(i, col_j)];
            }
        }
    }
    xtx
}

fn weighted_xtz(x: &Mat<f64>, weights: &Mat<f64>, z: &Mat<f64>) -> Mat<f64> {
    let p = x.ncols();
    let mut xtz = Mat::<f64>::zeros(p, 1);
    for i in 0..x.nrows() {
        let wz = weights[(i, 0)] * z[(i, 0)];
        for col in 0..p {
            xtz[(col, 0)] += x[(i, col)] * wz;
        }
    }
    xtz
}
