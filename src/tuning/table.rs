//! Per-combination selection records and the matching coefficient rows.

use std::fmt;

use faer::Mat;

use super::ConfigError;
use super::criteria::Criterion;
use crate::utils::matrix_ops::{select_row, stack_rows};
use crate::utils::unique_in_order;

/// Which of the two penalties a sequence belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PenaltyAxis {
    /// Penalty on fixed-effect coefficients (`lambda0`).
    Fixed,
    /// Penalty on random-effect variance components (`lambda1`).
    Random,
}

impl fmt::Display for PenaltyAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("fixed-effect"),
            Self::Random => f.write_str("random-effect"),
        }
    }
}

/// One fitted penalty combination. Missing criteria are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRow {
    pub lambda_fixed: f64,
    pub lambda_random: f64,
    pub bic_h: f64,
    pub bic: f64,
    pub bic_q: f64,
    pub bic_ngrp: f64,
    pub log_lik: f64,
    pub nonzero_fixed: usize,
    pub nonzero_random: usize,
}

impl SelectionRow {
    /// Row for a penalty combination with every criterion missing.
    #[must_use]
    pub const fn new(lambda_fixed: f64, lambda_random: f64) -> Self {
        Self {
            lambda_fixed,
            lambda_random,
            bic_h: f64::NAN,
            bic: f64::NAN,
            bic_q: f64::NAN,
            bic_ngrp: f64::NAN,
            log_lik: f64::NAN,
            nonzero_fixed: 0,
            nonzero_random: 0,
        }
    }

    #[must_use]
    pub const fn criterion(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::BicH => self.bic_h,
            Criterion::Bic => self.bic,
            Criterion::BicQ => self.bic_q,
            Criterion::BicNgrp => self.bic_ngrp,
        }
    }

    #[must_use]
    pub const fn lambda(&self, axis: PenaltyAxis) -> f64 {
        match axis {
            PenaltyAxis::Fixed => self.lambda_fixed,
            PenaltyAxis::Random => self.lambda_random,
        }
    }
}

/// Append-only table of fitted penalty combinations, in fit order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionTable {
    pub rows: Vec<SelectionRow>,
}

impl SelectionTable {
    #[must_use]
    pub const fn new(rows: Vec<SelectionRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row-wise concatenation; `self` rows come first.
    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        let mut combined = self.clone();
        combined.append(other);
        combined
    }

    pub fn append(&mut self, other: &Self) {
        self.rows.extend_from_slice(&other.rows);
    }

    #[must_use]
    pub fn criterion_values(&self, criterion: Criterion) -> Vec<f64> {
        self.rows.iter().map(|row| row.criterion(criterion)).collect()
    }

    /// Distinct penalty values along one axis, in first-seen order.
    #[must_use]
    pub fn distinct_values(&self, axis: PenaltyAxis) -> Vec<f64> {
        let values: Vec<f64> = self.rows.iter().map(|row| row.lambda(axis)).collect();
        unique_in_order(&values)
    }

    /// Number of distinct `(lambda_fixed, lambda_random)` pairs.
    #[must_use]
    pub fn distinct_combinations(&self) -> usize {
        let mut seen: Vec<(f64, f64)> = Vec::new();
        for row in &self.rows {
            let pair = (row.lambda_fixed, row.lambda_random);
            if !seen.contains(&pair) {
                seen.push(pair);
            }
        }
        seen.len()
    }

    /// Smallest penalty seen along an axis, or `NaN` for an empty table.
    #[must_use]
    pub fn min_lambda(&self, axis: PenaltyAxis) -> f64 {
        self.rows
            .iter()
            .map(|row| row.lambda(axis))
            .reduce(f64::min)
            .unwrap_or(f64::NAN)
    }
}

/// Coefficients for each fitted combination.
///
/// Columns hold the `fixed_count` fixed effects followed by the row-major
/// `random_count x random_count` lower-triangular factor `Gamma` of the
/// random-effect covariance.
#[derive(Debug, Clone)]
pub struct CoefficientTable {
    fixed_count: usize,
    random_count: usize,
    values: Mat<f64>,
}

impl CoefficientTable {
    /// # Errors
    ///
    /// Returns `ConfigError::CoefficientShape` if `values` does not have
    /// `fixed_count + random_count^2` columns.
    pub fn new(
        fixed_count: usize,
        random_count: usize,
        values: Mat<f64>,
    ) -> Result<Self, ConfigError> {
        let expected = fixed_count + random_count * random_count;
        if values.ncols() != expected {
            return Err(ConfigError::CoefficientShape {
                expected,
                found: values.ncols(),
            });
        }
        Ok(Self {
            fixed_count,
            random_count,
            values,
        })
    }

    #[must_use]
    pub const fn fixed_count(&self) -> usize {
        self.fixed_count
    }

    #[must_use]
    pub const fn random_count(&self) -> usize {
        self.random_count
    }

    #[must_use]
    pub const fn values(&self) -> &Mat<f64> {
        &self.values
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Full coefficient row as a column vector.
    #[must_use]
    pub fn row(&self, index: usize) -> Mat<f64> {
        select_row(&self.values, index)
    }

    #[must_use]
    pub fn gamma(&self, index: usize) -> Vec<f64> {
        (self.fixed_count..self.values.ncols())
            .map(|col| self.values[(index, col)])
            .collect()
    }

    /// Random-effect variances `diag(Gamma Gamma^T)` for one row.
    #[must_use]
    pub fn random_effect_variances(&self, index: usize) -> Vec<f64> {
        let q = self.random_count;
        (0..q)
            .map(|i| {
                (0..q)
                    .map(|j| self.values[(index, self.fixed_count + i * q + j)].powi(2))
                    .sum()
            })
            .collect()
    }

    /// Row-wise concatenation; `self` rows come first.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CoefficientShape` if the column layouts differ.
    pub fn concat(&self, other: &Self) -> Result<Self, ConfigError> {
        if self.fixed_count != other.fixed_count || self.random_count != other.random_count {
            return Err(ConfigError::CoefficientShape {
                expected: self.values.ncols(),
                found: other.values.ncols(),
            });
        }
        Ok(Self {
            fixed_count: self.fixed_count,
            random_count: self.random_count,
            values: stack_rows(&self.values, &other.values),
        })
    }

    pub(crate) fn with_values(&self, values: Mat<f64>) -> Self {
        Self {
            fixed_count: self.fixed_count,
            random_count: self.random_count,
            values,
        }
    }
}
