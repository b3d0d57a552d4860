//! Original-scale coefficients and the packaged fine-search result.

use faer::Mat;

use super::ConfigError;
use super::engine::FinalDiagnostics;
use super::grid::FineGrid;
use super::options::SearchMode;
use super::table::{CoefficientTable, SelectionRow, SelectionTable};
use crate::input::Standardization;
use crate::utils::usize_to_f64;

/// Leading columns of a [`CombinedTable`], before coefficient names.
pub const SELECTION_COLUMNS: [&str; 9] = [
    "lambda0",
    "lambda1",
    "BICh",
    "BIC",
    "BICq",
    "BICNgrp",
    "LogLik",
    "Non0_Fixef",
    "Non0_Ranef",
];

/// Map standardized fixed effects back to the scale of the raw design.
///
/// `beta_0 = alpha_0 - sum(alpha_j * center_j / scale_j)`, `beta_j = alpha_j / scale_j`.
/// The `Gamma` block is copied unchanged.
///
/// # Errors
///
/// Returns `ConfigError::StandardizationMismatch` if the standardization does
/// not cover exactly the non-intercept fixed effects.
pub fn unstandardize(
    coefficients: &CoefficientTable,
    standardization: &Standardization,
) -> Result<CoefficientTable, ConfigError> {
    let slopes = coefficients.fixed_count().saturating_sub(1);
    if coefficients.fixed_count() == 0 || standardization.slopes() != slopes {
        return Err(ConfigError::StandardizationMismatch {
            expected: slopes,
            found: standardization.slopes(),
        });
    }
    let values = coefficients.values();
    let original = Mat::from_fn(values.nrows(), values.ncols(), |row, col| {
        if col == 0 {
            let shift: f64 = (0..slopes)
                .map(|j| {
                    values[(row, j + 1)] * standardization.center[j] / standardization.scale[j]
                })
                .sum();
            values[(row, 0)] - shift
        } else if col <= slopes {
            values[(row, col)] / standardization.scale[col - 1]
        } else {
            values[(row, col)]
        }
    });
    Ok(coefficients.with_values(original))
}

/// Selection records joined with their coefficients, one row per fit.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl CombinedTable {
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column, or `None` for an unknown name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// `Gamma[a,b]` column names for the row-major `Gamma` block.
#[must_use]
pub fn gamma_names(random_names: &[String]) -> Vec<String> {
    random_names
        .iter()
        .flat_map(|row| {
            random_names
                .iter()
                .map(move |col| format!("Gamma[{row},{col}]"))
        })
        .collect()
}

/// Join selection rows with coefficient rows under consistent column names.
///
/// # Errors
///
/// Returns `ConfigError` if row counts or name counts disagree with the tables.
pub fn combine_tables(
    results: &SelectionTable,
    coefficients: &CoefficientTable,
    fixed_names: &[String],
    random_names: &[String],
) -> Result<CombinedTable, ConfigError> {
    if results.len() != coefficients.nrows() {
        return Err(ConfigError::RowMismatch {
            results: results.len(),
            coefficients: coefficients.nrows(),
        });
    }
    check_names("fixed-effect", coefficients.fixed_count(), fixed_names)?;
    check_names("random-effect", coefficients.random_count(), random_names)?;

    let mut columns: Vec<String> = SELECTION_COLUMNS.iter().map(ToString::to_string).collect();
    columns.extend(fixed_names.iter().cloned());
    columns.extend(gamma_names(random_names));

    let values = coefficients.values();
    let rows = results
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut out = selection_values(row);
            out.extend((0..values.ncols()).map(|j| values[(i, j)]));
            out
        })
        .collect();
    Ok(CombinedTable { columns, rows })
}

fn selection_values(row: &SelectionRow) -> Vec<f64> {
    vec![
        row.lambda_fixed,
        row.lambda_random,
        row.bic_h,
        row.bic,
        row.bic_q,
        row.bic_ngrp,
        row.log_lik,
        usize_to_f64(row.nonzero_fixed),
        usize_to_f64(row.nonzero_random),
    ]
}

pub(crate) fn check_names(
    kind: &'static str,
    expected: usize,
    names: &[String],
) -> Result<(), ConfigError> {
    if names.len() == expected {
        Ok(())
    } else {
        Err(ConfigError::NameMismatch {
            kind,
            expected,
            found: names.len(),
        })
    }
}

/// Overwrite a row's approximate criteria with the converged final values.
/// BICq is kept when the final E-step did not recompute it.
pub fn apply_final_diagnostics(row: &mut SelectionRow, diagnostics: &FinalDiagnostics) {
    row.log_lik = diagnostics.log_lik;
    row.bic_h = diagnostics.bic_h;
    row.bic = diagnostics.bic;
    row.bic_ngrp = diagnostics.bic_ngrp;
    if let Some(bic_q) = diagnostics.bic_q {
        row.bic_q = bic_q;
    }
}

/// Output of a fine search.
#[derive(Debug, Clone)]
pub struct FineSearchResult {
    /// Every fitted combination, in fit order, optimum row finalized.
    pub results: SelectionTable,
    /// Coefficients on the original design scale.
    pub coefficients: CoefficientTable,
    pub combined: CombinedTable,
    pub optimum_index: usize,
    pub optimum: SelectionRow,
    /// Original-scale fixed effects at the optimum.
    pub fixed_effects: Vec<f64>,
    /// Row-major `Gamma` at the optimum.
    pub gamma: Vec<f64>,
    pub diagnostics: FinalDiagnostics,
    pub grid: FineGrid,
    pub search: SearchMode,
}
