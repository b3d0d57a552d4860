//! Information criteria and minimum-criterion row selection.

use std::fmt;
use std::str::FromStr;

use super::ConfigError;
use super::table::SelectionTable;

/// Information criterion used to rank penalty combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Criterion {
    /// BIC on the hierarchical likelihood.
    BicH,
    /// Standard BIC with the observation count as sample size.
    Bic,
    /// Integrated-likelihood BIC; needs a minimum-penalty reference posterior.
    #[default]
    BicQ,
    /// BIC with the number of groups as sample size.
    BicNgrp,
}

impl Criterion {
    pub const ALL: [Self; 4] = [Self::BicH, Self::Bic, Self::BicQ, Self::BicNgrp];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BicH => "BICh",
            Self::Bic => "BIC",
            Self::BicQ => "BICq",
            Self::BicNgrp => "BICNgrp",
        }
    }

    /// Whether evaluating this criterion requires the reference posterior sample.
    #[must_use]
    pub const fn needs_reference_posterior(self) -> bool {
        matches!(self, Self::BicQ)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Criterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|criterion| criterion.name() == s)
            .ok_or_else(|| ConfigError::UnknownCriterion(s.to_string()))
    }
}

/// # Errors
///
/// Returns `ConfigError::EmptyTable` for an empty table and
/// `ConfigError::CriterionUnavailable` if any row lacks the criterion.
pub fn ensure_available(table: &SelectionTable, criterion: Criterion) -> Result<(), ConfigError> {
    if table.is_empty() {
        return Err(ConfigError::EmptyTable);
    }
    if table
        .rows
        .iter()
        .any(|row| row.criterion(criterion).is_nan())
    {
        return Err(ConfigError::CriterionUnavailable(criterion));
    }
    Ok(())
}

/// Index of the row minimizing `criterion`; ties resolve to the earliest row.
///
/// # Errors
///
/// Returns `ConfigError` if the table is empty or the criterion column has a
/// missing value anywhere.
pub fn select_best(table: &SelectionTable, criterion: Criterion) -> Result<usize, ConfigError> {
    ensure_available(table, criterion)?;
    let mut best_index = 0;
    let mut best_value = f64::INFINITY;
    for (index, row) in table.rows.iter().enumerate() {
        let value = row.criterion(criterion);
        if index == 0 || value < best_value {
            best_index = index;
            best_value = value;
        }
    }
    Ok(best_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::table::SelectionRow;

    fn table_with_bic(values: &[f64]) -> SelectionTable {
        SelectionTable::new(
            values
                .iter()
                .enumerate()
                .map(|(i, &bic)| SelectionRow {
                    bic,
                    bic_h: 1.0,
                    ..SelectionRow::new(0.1 * f64::from(u32::try_from(i).unwrap_or(0)), 0.0)
                })
                .collect(),
        )
    }

    #[test]
    fn selects_unique_minimum() {
        let table = table_with_bic(&[10.0, 4.0, 7.0]);
        assert_eq!(select_best(&table, Criterion::Bic), Ok(1));
    }

    #[test]
    fn ties_resolve_to_first_row() {
        let table = table_with_bic(&[5.0, 3.0, 9.0, 3.0]);
        assert_eq!(select_best(&table, Criterion::Bic), Ok(1));
        assert_eq!(select_best(&table, Criterion::BicH), Ok(0));
    }

    #[test]
    fn missing_value_invalidates_selection() {
        let table = table_with_bic(&[5.0, f64::NAN, 1.0]);
        assert_eq!(
            select_best(&table, Criterion::Bic),
            Err(ConfigError::CriterionUnavailable(Criterion::Bic))
        );
        assert_eq!(
            select_best(&table, Criterion::BicQ),
            Err(ConfigError::CriterionUnavailable(Criterion::BicQ))
        );
    }

    #[test]
    fn empty_table_is_rejected() {
        assert_eq!(
            select_best(&SelectionTable::default(), Criterion::Bic),
            Err(ConfigError::EmptyTable)
        );
    }

    #[test]
    fn names_parse_and_unknown_names_fail() {
        for criterion in Criterion::ALL {
            assert_eq!(criterion.name().parse::<Criterion>(), Ok(criterion));
        }
        assert_eq!(
            "AIC".parse::<Criterion>(),
            Err(ConfigError::UnknownCriterion("AIC".to_string()))
        );
        assert!(Criterion::BicQ.needs_reference_posterior());
        assert!(!Criterion::BicH.needs_reference_posterior());
    }
}
