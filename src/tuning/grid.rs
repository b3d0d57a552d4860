//! Fine penalty sequences derived from the coarse optimum.

use super::ConfigError;
use super::options::FineSearchOptions;
use super::table::{PenaltyAxis, SelectionRow, SelectionTable};
use crate::utils::{linear_spaced, log_spaced, unique_in_order};

/// Candidate penalty sequences for the fine search.
#[derive(Debug, Clone, PartialEq)]
pub struct FineGrid {
    pub lambda_fixed: Vec<f64>,
    pub lambda_random: Vec<f64>,
}

impl FineGrid {
    #[must_use]
    pub fn sequence(&self, axis: PenaltyAxis) -> &[f64] {
        match axis {
            PenaltyAxis::Fixed => &self.lambda_fixed,
            PenaltyAxis::Random => &self.lambda_random,
        }
    }

    /// Number of combinations in the full cross product.
    #[must_use]
    pub fn combinations(&self) -> usize {
        self.lambda_fixed.len() * self.lambda_random.len()
    }
}

/// Penalty values at the edges of the window of `idx_range` positions either
/// side of `best_value` in the ascending `distinct_values`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidIdxRange` for a zero window and
/// `ConfigError::BestValueMissing` if `best_value` is not one of the values.
pub fn fine_bounds(
    axis: PenaltyAxis,
    distinct_values: &[f64],
    best_value: f64,
    idx_range: usize,
) -> Result<(f64, f64), ConfigError> {
    if idx_range == 0 {
        return Err(ConfigError::InvalidIdxRange);
    }
    let best_index = distinct_values
        .iter()
        .position(|value| value.total_cmp(&best_value).is_eq())
        .ok_or(ConfigError::BestValueMissing {
            axis,
            value: best_value,
        })?;
    let low = best_index.saturating_sub(idx_range);
    let high = best_index
        .saturating_add(idx_range)
        .min(distinct_values.len() - 1);
    Ok((distinct_values[low], distinct_values[high]))
}

/// `nlambda` values between the bounds, linear when the window starts at zero
/// and log-spaced otherwise, with repeats collapsed.
#[must_use]
pub fn fine_sequence(low: f64, high: f64, nlambda: usize) -> Vec<f64> {
    let values = if low == 0.0 {
        linear_spaced(low, high, nlambda)
    } else {
        log_spaced(low, high, nlambda)
    };
    unique_in_order(&values)
}

/// Fine grid around `coarse.rows[best_index]`.
///
/// A sequence supplied in `options` replaces construction for its axis and is
/// only deduplicated.
///
/// # Errors
///
/// Returns `ConfigError` for an out-of-range `best_index` or invalid window.
pub fn build_fine_grid(
    coarse: &SelectionTable,
    best_index: usize,
    options: &FineSearchOptions,
) -> Result<FineGrid, ConfigError> {
    let best = coarse.rows.get(best_index).ok_or(ConfigError::EmptyTable)?;
    let lambda_fixed = axis_sequence(
        coarse,
        best,
        PenaltyAxis::Fixed,
        options.lambda_fixed.as_deref(),
        options,
    )?;
    let lambda_random = axis_sequence(
        coarse,
        best,
        PenaltyAxis::Random,
        options.lambda_random.as_deref(),
        options,
    )?;
    log::debug!(
        "fine grid: {} fixed-effect x {} random-effect penalties",
        lambda_fixed.len(),
        lambda_random.len()
    );
    Ok(FineGrid {
        lambda_fixed,
        lambda_random,
    })
}

fn axis_sequence(
    coarse: &SelectionTable,
    best: &SelectionRow,
    axis: PenaltyAxis,
    supplied: Option<&[f64]>,
    options: &FineSearchOptions,
) -> Result<Vec<f64>, ConfigError> {
    if let Some(values) = supplied {
        return Ok(unique_in_order(values));
    }
    let mut distinct = coarse.distinct_values(axis);
    if distinct.iter().any(|value| !value.is_finite() || *value < 0.0) {
        return Err(ConfigError::InvalidLambdaSequence {
            axis,
            reason: "coarse penalties must be finite and non-negative",
        });
    }
    distinct.sort_by(f64::total_cmp);
    let (low, high) = fine_bounds(axis, &distinct, best.lambda(axis), options.idx_range)?;
    log::debug!("{axis} penalty window [{low}, {high}]");
    Ok(fine_sequence(low, high, options.nlambda))
}
