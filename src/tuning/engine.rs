//! Interfaces to the collaborators that do the expensive work: the penalized
//! MCECM fitting engine, the final E-step recomputation and the store holding
//! posterior draws of the minimum-penalty reference model.

use std::collections::HashMap;

use faer::Mat;
use thiserror::Error;

use super::criteria::Criterion;
use super::options::PenaltyConfig;
use super::table::{CoefficientTable, SelectionTable};
use crate::family::GlmFamily;
use crate::inference::McmcConfig;
use crate::input::GlmmInput;

/// Errors reported by collaborators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("fit at lambda0 = {lambda_fixed}, lambda1 = {lambda_random} failed: {message}")]
    FitFailed {
        lambda_fixed: f64,
        lambda_random: f64,
        message: String,
    },
    #[error("E-step failed: {0}")]
    EStep(String),
    #[error("posterior store error: {0}")]
    Store(String),
    #[error(
        "engine returned {results} result rows, {coefficients} coefficient rows and {posteriors} posterior initial values"
    )]
    MisalignedOutcome {
        results: usize,
        coefficients: usize,
        posteriors: usize,
    },
    #[error("engine returned {found} coefficient columns; expected {expected}")]
    CoefficientShape { expected: usize, found: usize },
}

/// State a fit starts from.
#[derive(Debug, Clone)]
pub struct WarmStart {
    /// Fixed effects followed by the row-major `Gamma` block, as a column vector.
    pub coefficients: Mat<f64>,
    /// Random-effect posterior modes to start the first E-step from (`q x groups`).
    pub posterior_init: Option<Mat<f64>>,
    /// Random effects the engine may keep non-zero.
    pub keep: Vec<bool>,
}

impl WarmStart {
    /// Warm start from fixed effects alone, with an identity `Gamma` block.
    #[must_use]
    pub fn from_fixed_effects(beta: &Mat<f64>, random_count: usize) -> Self {
        let p = beta.nrows();
        let coefficients = Mat::from_fn(p + random_count * random_count, 1, |i, _| {
            if i < p {
                beta[(i, 0)]
            } else {
                let k = i - p;
                if k / random_count == k % random_count {
                    1.0
                } else {
                    0.0
                }
            }
        });
        Self {
            coefficients,
            posterior_init: None,
            keep: vec![true; random_count],
        }
    }
}

/// Smallest coarse-grid penalties, used to locate the BICq reference model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePenalty {
    pub lambda_fixed: f64,
    pub lambda_random: f64,
}

/// What the engine should compute beyond the default criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionRequest {
    pub criterion: Criterion,
    /// Store key of the reference posterior; `None` when BICq is not needed.
    pub bicq_posterior_key: Option<String>,
    /// Whether the reference posterior was already in the store.
    pub reference_cached: bool,
}

/// One engine call over a pair of penalty sequences.
///
/// The engine forms the combinations itself and warm-starts each fit from
/// the previous one.
#[derive(Debug, Clone, Copy)]
pub struct FitRequest<'a> {
    pub input: &'a GlmmInput,
    pub lambda_fixed: &'a [f64],
    pub lambda_random: &'a [f64],
    pub family: GlmFamily,
    pub penalty: PenaltyConfig,
    pub warm_start: &'a WarmStart,
    pub prescreen: bool,
    pub reference: ReferencePenalty,
    pub criterion: &'a CriterionRequest,
    pub mcmc: McmcConfig,
}

/// State at the end of the last fit in a call.
#[derive(Debug, Clone)]
pub struct FittedState {
    pub coefficients: Mat<f64>,
    pub posterior_init: Option<Mat<f64>>,
}

/// Everything an engine call produced, one entry per combination in fit order.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub results: SelectionTable,
    pub coefficients: CoefficientTable,
    pub posterior_inits: Vec<Mat<f64>>,
    pub final_state: FittedState,
}

/// Penalized MCECM solver.
pub trait FittingEngine {
    /// # Errors
    ///
    /// Any failure aborts the whole search.
    fn fit(
        &mut self,
        request: &FitRequest<'_>,
        store: &mut dyn PosteriorStore,
    ) -> Result<FitOutcome, EngineError>;
}

/// Input to the final E-step recomputation at the selected optimum.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeRequest<'a> {
    pub input: &'a GlmmInput,
    pub family: GlmFamily,
    pub state: &'a FittedState,
    pub diagnostics: bool,
    pub mcmc: McmcConfig,
    pub bicq_posterior_key: Option<&'a str>,
}

/// Converged diagnostics for the selected model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalDiagnostics {
    pub log_lik: f64,
    pub bic_h: f64,
    pub bic: f64,
    pub bic_ngrp: f64,
    pub bic_q: Option<f64>,
}

/// Final E-step with the larger report sample.
pub trait ExpectationStep {
    /// # Errors
    ///
    /// Returns `EngineError` if the recomputation fails.
    fn finalize(&mut self, request: &FinalizeRequest<'_>) -> Result<FinalDiagnostics, EngineError>;
}

/// Keyed storage for posterior draws.
pub trait PosteriorStore {
    fn get(&self, key: &str) -> Option<Mat<f64>>;

    /// # Errors
    ///
    /// Returns `EngineError::Store` if the draws cannot be written.
    fn put(&mut self, key: &str, draws: Mat<f64>) -> Result<(), EngineError>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryPosteriorStore {
    draws: HashMap<String, Mat<f64>>,
}

impl MemoryPosteriorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.draws.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

impl PosteriorStore for MemoryPosteriorStore {
    fn get(&self, key: &str) -> Option<Mat<f64>> {
        self.draws.get(key).cloned()
    }

    fn put(&mut self, key: &str, draws: Mat<f64>) -> Result<(), EngineError> {
        self.draws.insert(key.to_string(), draws);
        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        self.draws.contains_key(key)
    }
}
