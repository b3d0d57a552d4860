//! Fine search driver.

use faer::Mat;

use super::assemble::{FineSearchResult, apply_final_diagnostics, combine_tables, unstandardize};
use super::criteria::select_best;
use super::engine::{
    ExpectationStep, FinalizeRequest, FittedState, FittingEngine, PosteriorStore,
    ReferencePenalty, WarmStart,
};
use super::grid::build_fine_grid;
use super::options::FineSearchOptions;
use super::stages::{StageContext, run_stages};
use super::table::PenaltyAxis;
use super::{ConfigError, SelectionError};
use crate::models::glm::{GlmError, GlmOptions, fit_glm};
use crate::models::pglmm::PglmmFit;
use crate::utils::usize_to_f64;

/// Refine the coarse penalty search of `model`.
///
/// All checks on options and the coarse grid happen before the first fit.
/// The optimum row of the returned table carries the diagnostics of the final
/// E-step; coefficients are reported on the raw design scale.
///
/// # Errors
///
/// Returns `SelectionError` for invalid options or model state, an incomplete
/// coarse grid, or any collaborator failure. There is no partial result.
pub fn fine_search(
    model: &PglmmFit,
    options: &FineSearchOptions,
    engine: &mut dyn FittingEngine,
    estep: &mut dyn ExpectationStep,
    store: &mut dyn PosteriorStore,
) -> Result<FineSearchResult, SelectionError> {
    options.validate()?;
    model.validate()?;
    let coarse = &model.coarse_results;
    if coarse.distinct_combinations() < 2 {
        return Err(ConfigError::SingleCombination.into());
    }
    let coarse_best = select_best(coarse, options.criterion)?;
    let grid = build_fine_grid(coarse, coarse_best, options)?;
    let reference = ReferencePenalty {
        lambda_fixed: coarse.min_lambda(PenaltyAxis::Fixed),
        lambda_random: coarse.min_lambda(PenaltyAxis::Random),
    };
    let warm_start = initial_warm_start(model, coarse_best)?;

    let bicq_posterior_key = options
        .bicq_requested()
        .then_some(options.bicq_posterior_key.as_str());
    let context = StageContext {
        input: &model.input,
        family: model.family,
        penalty: model.penalty,
        mcmc: options.mcmc,
        reference,
        criterion: options.criterion,
        bicq_posterior_key,
    };
    let staged = run_stages(&context, &grid, &warm_start, options.search, engine, store)?;

    let optimum_index = select_best(&staged.results, options.criterion)?;
    let state = FittedState {
        coefficients: staged.coefficients.row(optimum_index),
        posterior_init: staged.posterior_inits.get(optimum_index).cloned(),
    };
    let diagnostics = estep.finalize(&FinalizeRequest {
        input: &model.input,
        family: model.family,
        state: &state,
        diagnostics: true,
        mcmc: options.mcmc,
        bicq_posterior_key,
    })?;

    let mut results = staged.results;
    let row = results
        .rows
        .get_mut(optimum_index)
        .ok_or(ConfigError::EmptyTable)?;
    apply_final_diagnostics(row, &diagnostics);
    let optimum = *row;

    let coefficients = unstandardize(&staged.coefficients, &model.standardization)?;
    let combined = combine_tables(
        &results,
        &coefficients,
        &model.fixed_names,
        &model.random_names,
    )?;
    let fixed_effects = (0..coefficients.fixed_count())
        .map(|j| coefficients.values()[(optimum_index, j)])
        .collect();
    let gamma = coefficients.gamma(optimum_index);
    log::info!(
        "fine search optimum: lambda0 = {}, lambda1 = {}, {} = {:.4}",
        optimum.lambda_fixed,
        optimum.lambda_random,
        options.criterion,
        optimum.criterion(options.criterion)
    );

    Ok(FineSearchResult {
        results,
        coefficients,
        combined,
        optimum_index,
        optimum,
        fixed_effects,
        gamma,
        diagnostics,
        grid,
        search: options.search,
    })
}

/// The model's own warm start, else the coarse optimum's coefficients, else a
/// fixed-effects GLM with identity `Gamma`.
fn initial_warm_start(model: &PglmmFit, coarse_best: usize) -> Result<WarmStart, SelectionError> {
    let q = model.input.random_count();
    if let Some(start) = &model.warm_start {
        return Ok(start.clone());
    }
    if let Some(coefficients) = &model.coarse_coefficients {
        log::debug!("warm start from coarse row {coarse_best}");
        return Ok(WarmStart {
            coefficients: coefficients.row(coarse_best),
            posterior_init: None,
            keep: vec![true; q],
        });
    }
    log::debug!("no stored warm start; fitting the fixed-effects GLM");
    let beta = match fit_glm(
        &model.input.fixed_design,
        &model.input.response,
        model.family,
        GlmOptions::default(),
    ) {
        Ok(fit) => fit.beta,
        Err(GlmError::UnsupportedLink(link)) => {
            log::warn!("GLM cannot fit the {link} link; starting from an intercept-only model");
            intercept_only(model)
        }
        Err(err) => return Err(err.into()),
    };
    Ok(WarmStart::from_fixed_effects(&beta, q))
}

/// Link of the mean response as the intercept, all slopes zero.
fn intercept_only(model: &PglmmFit) -> Mat<f64> {
    let response = &model.input.response;
    let mean = (0..response.nrows())
        .map(|i| response[(i, 0)])
        .sum::<f64>()
        / usize_to_f64(response.nrows()).max(1.0);
    let intercept = model.family.link(&Mat::from_fn(1, 1, |_, _| mean))[(0, 0)];
    let intercept = if intercept.is_finite() { intercept } else { 0.0 };
    Mat::from_fn(model.input.fixed_count(), 1, |j, _| {
        if j == 0 { intercept } else { 0.0 }
    })
}
