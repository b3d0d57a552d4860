/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Fine penalty-grid search for penalized GLMMs fit by MCECM.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Fine penalty search
//!
//! Starting from a coarse search over `(lambda_fixed, lambda_random)`, the fine
//! search narrows the grid around the coarse optimum and refits the penalized
//! mixed model, either over the full cross product or in two abbreviated stages
//! (random-effect penalty first, then fixed-effect penalty). Each fit warm-starts
//! from the state returned by the previous one.
//!
//! The penalized M-step solver, the E-step sampler and the posterior-draw store
//! are collaborators injected through [`FittingEngine`], [`ExpectationStep`] and
//! [`PosteriorStore`].

use thiserror::Error;

use crate::inference::InferenceError;
use crate::input::InputError;
use crate::models::glm::GlmError;

pub mod assemble;
pub mod criteria;
pub mod engine;
pub mod grid;
pub mod options;
pub mod report;
pub mod search;
pub mod stages;
pub mod table;

pub use assemble::{
    CombinedTable, FineSearchResult, apply_final_diagnostics, combine_tables, unstandardize,
};
pub use criteria::{Criterion, select_best};
pub use engine::{
    CriterionRequest, EngineError, ExpectationStep, FinalDiagnostics, FinalizeRequest,
    FitOutcome, FitRequest, FittedState, FittingEngine, MemoryPosteriorStore, PosteriorStore,
    ReferencePenalty, WarmStart,
};
pub use grid::{FineGrid, build_fine_grid, fine_bounds, fine_sequence};
pub use options::{FineSearchOptions, PenaltyConfig, PenaltyType, SearchMode};
pub use report::render_selection_table;
pub use search::fine_search;
pub use stages::{StageContext, StageOutcome, run_stages, stage_two_warm_start};
pub use table::{CoefficientTable, PenaltyAxis, SelectionRow, SelectionTable};

/// Invalid hyperparameters or unusable selection inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("idx_range must be a positive integer")]
    InvalidIdxRange,
    #[error("nlambda must be at least 2; found {0}")]
    InvalidNlambda(usize),
    #[error("unrecognized information criterion: {0}")]
    UnknownCriterion(String),
    #[error("criterion {0} is missing for at least one penalty combination")]
    CriterionUnavailable(Criterion),
    #[error("selection table has no rows")]
    EmptyTable,
    #[error("coarse grid must contain at least two distinct penalty combinations")]
    SingleCombination,
    #[error("{axis} lambda sequence is invalid: {reason}")]
    InvalidLambdaSequence {
        axis: PenaltyAxis,
        reason: &'static str,
    },
    #[error("{axis} penalty {value} of the selected row is not part of the coarse grid")]
    BestValueMissing { axis: PenaltyAxis, value: f64 },
    #[error("invalid penalty configuration: {0}")]
    InvalidPenalty(&'static str),
    #[error(transparent)]
    Mcmc(#[from] InferenceError),
    #[error("coefficient table needs {expected} columns; found {found}")]
    CoefficientShape { expected: usize, found: usize },
    #[error("{results} selection rows but {coefficients} coefficient rows")]
    RowMismatch { results: usize, coefficients: usize },
    #[error("standardization covers {found} slopes; design has {expected}")]
    StandardizationMismatch { expected: usize, found: usize },
    #[error("{kind} names ({found}) must match coefficient count ({expected})")]
    NameMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("warm start has {found} coefficients; expected {expected}")]
    WarmStartShape { expected: usize, found: usize },
    #[error("posterior store key for BICq must not be empty")]
    EmptyPosteriorKey,
}

/// Errors returned by the fine search.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid model input: {0}")]
    Input(#[from] InputError),
    #[error("fitting collaborator failed: {0}")]
    Engine(#[from] EngineError),
    #[error("initial GLM fit failed: {0}")]
    Glm(#[from] GlmError),
}
