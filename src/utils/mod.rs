/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and numeric helpers.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Helpers for solving linear systems, building evenly spaced sequences,
//! and working with faer column vectors.

use faer::Mat;
use faer::prelude::Solve;
use num_traits::ToPrimitive;

pub mod matrix_ops;

/// Marker error for a linear solve that produced non-finite values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("linear solve produced non-finite values")]
pub struct SolveError;

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    value.to_f64().unwrap_or(f64::MAX)
}

#[must_use]
pub fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut max = 0.0;
    for i in 0..a.nrows() {
        let diff = (a[(i, 0)] - b[(i, 0)]).abs();
        if diff > max {
            max = diff;
        }
    }
    max
}

/// # Errors
///
/// Returns `SolveError` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, SolveError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(SolveError);
    }
    Ok(solution)
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

/// `n` evenly spaced values from `from` to `to`, both ends included.
#[must_use]
pub fn linear_spaced(from: f64, to: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![from],
        _ => {
            let step = (to - from) / usize_to_f64(n - 1);
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        to
                    } else {
                        step.mul_add(usize_to_f64(i), from)
                    }
                })
                .collect()
        }
    }
}

/// `n` values evenly spaced on the log scale between two positive bounds.
#[must_use]
pub fn log_spaced(from: f64, to: f64, n: usize) -> Vec<f64> {
    linear_spaced(from.ln(), to.ln(), n)
        .into_iter()
        .map(f64::exp)
        .collect()
}

/// Drop repeated values, keeping the first occurrence and the original order.
#[must_use]
pub fn unique_in_order(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(values.len());
    for &value in values {
        if !out.iter().any(|&seen| seen == value) {
            out.push(value);
        }
    }
    out
}
