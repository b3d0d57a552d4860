#![forbid(unsafe_code)]

//! # `pglmm_tune`
//!
//! Penalty tuning for penalized generalized linear mixed models fit by Monte
//! Carlo ECM. The crate provides the GLM family kernels used inside every
//! reweighting step, and a fine search that refines a coarse
//! `(lambda_fixed, lambda_random)` grid around its optimum, refits the model
//! with warm starts, and selects the final penalties by an information
//! criterion.
//!
//! The penalized solver, the E-step sampler and posterior storage are
//! supplied by the caller through the [`FittingEngine`], [`ExpectationStep`]
//! and [`PosteriorStore`] traits.

pub mod family;
pub mod inference;
pub mod input;
pub mod models;
pub mod tuning;
pub mod utils;

pub use family::{Family, FamilyError, GlmFamily, Link};
pub use inference::{InferenceError, McmcConfig, Sampler};
pub use input::{GlmmInput, InputError, Standardization};
pub use models::glm::{GlmError, GlmFit, GlmOptions, fit_glm};
pub use models::pglmm::PglmmFit;
pub use tuning::{
    CoefficientTable, CombinedTable, ConfigError, Criterion, CriterionRequest, EngineError,
    ExpectationStep, FinalDiagnostics, FinalizeRequest, FineGrid, FineSearchOptions,
    FineSearchResult, FitOutcome, FitRequest, FittedState, FittingEngine, MemoryPosteriorStore,
    PenaltyAxis, PenaltyConfig, PenaltyType, PosteriorStore, ReferencePenalty, SearchMode,
    SelectionError, SelectionRow, SelectionTable, WarmStart, fine_search, render_selection_table,
};
