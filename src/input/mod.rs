//! # Model inputs
//!
//! Defines the container for a grouped GLMM dataset (response, fixed-effects
//! design, random-effects design, group labels) and the column standardization
//! applied to the fixed-effects design before penalized fitting.
//!
//! # Examples
//!
//! ```
//! use faer::Mat;
//! use pglmm_tune::GlmmInput;
//!
//! fn idx_to_f64(idx: usize) -> f64 {
//!     f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
//! }
//!
//! let x = Mat::from_fn(4, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) });
//! let z = Mat::from_fn(4, 1, |_, _| 1.0);
//! let y = Mat::from_fn(4, 1, |i, _| idx_to_f64(i % 2));
//! let input = GlmmInput::new(y, x, z, vec![1, 1, 2, 2]);
//!
//! assert!(input.validate().is_ok());
//! assert_eq!(input.group_count(), 2);
//! ```

use std::collections::BTreeSet;

use faer::Mat;
use thiserror::Error;

use crate::utils::{matrix_is_finite, usize_to_f64};

/// Errors returned when validating model inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("fixed-effects design must have at least one column")]
    EmptyFixedDesign,
    #[error("random-effects design must have at least one column")]
    EmptyRandomDesign,
    #[error("response must be a single column matrix")]
    InvalidResponseShape,
    #[error("design rows (fixed {fixed_rows}, random {random_rows}) must match response rows ({len})")]
    DimensionMismatch {
        fixed_rows: usize,
        random_rows: usize,
        len: usize,
    },
    #[error("group labels length ({labels}) must match response rows ({rows})")]
    InvalidGroupLength { labels: usize, rows: usize },
    #[error("design matrices contain non-finite values")]
    NonFiniteDesign,
    #[error("response contains non-finite values")]
    NonFiniteResponse,
    #[error("standardization has {centers} centers but {scales} scales")]
    StandardizationLength { centers: usize, scales: usize },
    #[error("standardization for slope {index} must have a finite center and a finite non-zero scale")]
    InvalidStandardization { index: usize },
}

/// Grouped data for a generalized linear mixed model.
///
/// Column 0 of `fixed_design` is the intercept.
#[derive(Debug, Clone)]
pub struct GlmmInput {
    pub response: Mat<f64>,
    pub fixed_design: Mat<f64>,
    pub random_design: Mat<f64>,
    pub groups: Vec<u64>,
}

impl GlmmInput {
    #[must_use]
    pub const fn new(
        response: Mat<f64>,
        fixed_design: Mat<f64>,
        random_design: Mat<f64>,
        groups: Vec<u64>,
    ) -> Self {
        Self {
            response,
            fixed_design,
            random_design,
            groups,
        }
    }

    #[must_use]
    pub fn n_obs(&self) -> usize {
        self.response.nrows()
    }

    /// Number of fixed-effect coefficients, intercept included.
    #[must_use]
    pub fn fixed_count(&self) -> usize {
        self.fixed_design.ncols()
    }

    /// Number of random effects per group.
    #[must_use]
    pub fn random_count(&self) -> usize {
        self.random_design.ncols()
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.iter().collect::<BTreeSet<_>>().len()
    }

    /// # Errors
    ///
    /// Returns `InputError` if shapes or values are malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.fixed_design.ncols() == 0 {
            return Err(InputError::EmptyFixedDesign);
        }
        if self.random_design.ncols() == 0 {
            return Err(InputError::EmptyRandomDesign);
        }
        if self.response.ncols() != 1 {
            return Err(InputError::InvalidResponseShape);
        }
        let rows = self.response.nrows();
        if self.fixed_design.nrows() != rows || self.random_design.nrows() != rows {
            return Err(InputError::DimensionMismatch {
                fixed_rows: self.fixed_design.nrows(),
                random_rows: self.random_design.nrows(),
                len: rows,
            });
        }
        if self.groups.len() != rows {
            return Err(InputError::InvalidGroupLength {
                labels: self.groups.len(),
                rows,
            });
        }
        if !matrix_is_finite(&self.fixed_design) || !matrix_is_finite(&self.random_design) {
            return Err(InputError::NonFiniteDesign);
        }
        if !matrix_is_finite(&self.response) {
            return Err(InputError::NonFiniteResponse);
        }
        Ok(())
    }
}

/// Centering and scaling of the non-intercept fixed-effects columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardization {
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardization {
    /// Identity transform for `slopes` non-intercept columns.
    #[must_use]
    pub fn identity(slopes: usize) -> Self {
        Self {
            center: vec![0.0; slopes],
            scale: vec![1.0; slopes],
        }
    }

    /// Column means and population standard deviations of columns `1..`.
    ///
    /// Constant columns receive a scale of one so they pass through unchanged.
    #[must_use]
    pub fn fit(x: &Mat<f64>) -> Self {
        let n = usize_to_f64(x.nrows()).max(1.0);
        let mut center = Vec::with_capacity(x.ncols().saturating_sub(1));
        let mut scale = Vec::with_capacity(x.ncols().saturating_sub(1));
        for col in 1..x.ncols() {
            let mean = (0..x.nrows()).map(|row| x[(row, col)]).sum::<f64>() / n;
            let var = (0..x.nrows())
                .map(|row| (x[(row, col)] - mean).powi(2))
                .sum::<f64>()
                / n;
            let sd = var.sqrt();
            center.push(mean);
            scale.push(if sd > 0.0 { sd } else { 1.0 });
        }
        Self { center, scale }
    }

    #[must_use]
    pub fn slopes(&self) -> usize {
        self.center.len()
    }

    /// # Errors
    ///
    /// Returns `InputError` if centers and scales differ in length or a slope
    /// cannot be mapped back to the raw design.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.scale.len() != self.center.len() {
            return Err(InputError::StandardizationLength {
                centers: self.center.len(),
                scales: self.scale.len(),
            });
        }
        let unusable = self
            .center
            .iter()
            .zip(&self.scale)
            .position(|(center, &scale)| {
                !center.is_finite() || !scale.is_finite() || scale == 0.0
            });
        match unusable {
            Some(index) => Err(InputError::InvalidStandardization { index }),
            None => Ok(()),
        }
    }

    /// Standardized copy of `x`; column 0 is left as is.
    #[must_use]
    pub fn apply(&self, x: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(x.nrows(), x.ncols(), |row, col| {
            if col == 0 || col > self.center.len() {
                x[(row, col)]
            } else {
                (x[(row, col)] - self.center[col - 1]) / self.scale[col - 1]
            }
        })
    }
}
