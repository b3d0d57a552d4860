//! Sequential refitting over the fine grid.
//!
//! Fits run strictly in order. Each engine call receives an explicit
//! [`WarmStart`] and returns a new [`FitOutcome`]; nothing is mutated in place.

use faer::Mat;

use super::criteria::{Criterion, select_best};
use super::engine::{
    CriterionRequest, EngineError, FitOutcome, FitRequest, FittedState, FittingEngine,
    PosteriorStore, ReferencePenalty, WarmStart,
};
use super::grid::FineGrid;
use super::options::{PenaltyConfig, SearchMode};
use super::table::{CoefficientTable, SelectionTable};
use super::SelectionError;
use crate::family::GlmFamily;
use crate::inference::McmcConfig;
use crate::input::GlmmInput;

/// Fixed inputs shared by every engine call in a search.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub input: &'a GlmmInput,
    pub family: GlmFamily,
    pub penalty: PenaltyConfig,
    pub mcmc: McmcConfig,
    pub reference: ReferencePenalty,
    pub criterion: Criterion,
    /// Reference posterior key when BICq must be computed.
    pub bicq_posterior_key: Option<&'a str>,
}

/// Rows of every stage, concatenated in fit order.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub results: SelectionTable,
    pub coefficients: CoefficientTable,
    pub posterior_inits: Vec<Mat<f64>>,
    pub final_state: FittedState,
    /// Rows contributed by each stage.
    pub stage_sizes: Vec<usize>,
    /// Warm start handed from stage 1 to stage 2 in abbreviated mode.
    pub stage_two_start: Option<WarmStart>,
}

/// Run the fine search in the requested mode.
///
/// # Errors
///
/// Any engine failure, misaligned engine output, or stage-1 table lacking the
/// selection criterion aborts the run.
pub fn run_stages(
    context: &StageContext<'_>,
    grid: &FineGrid,
    warm_start: &WarmStart,
    mode: SearchMode,
    engine: &mut dyn FittingEngine,
    store: &mut dyn PosteriorStore,
) -> Result<StageOutcome, SelectionError> {
    match mode {
        SearchMode::FullGrid => {
            log::info!(
                "full-grid search over {} penalty combinations",
                grid.combinations()
            );
            let outcome = run_fit(
                context,
                &grid.lambda_fixed,
                &grid.lambda_random,
                warm_start,
                engine,
                store,
            )?;
            let rows = outcome.results.len();
            Ok(StageOutcome {
                results: outcome.results,
                coefficients: outcome.coefficients,
                posterior_inits: outcome.posterior_inits,
                final_state: outcome.final_state,
                stage_sizes: vec![rows],
                stage_two_start: None,
            })
        }
        SearchMode::Abbreviated => run_abbreviated(context, grid, warm_start, engine, store),
    }
}

fn run_abbreviated(
    context: &StageContext<'_>,
    grid: &FineGrid,
    warm_start: &WarmStart,
    engine: &mut dyn FittingEngine,
    store: &mut dyn PosteriorStore,
) -> Result<StageOutcome, SelectionError> {
    let smallest_fixed = grid
        .lambda_fixed
        .iter()
        .copied()
        .reduce(f64::min)
        .ok_or(super::ConfigError::EmptyTable)?;
    log::info!(
        "stage 1: {} random-effect penalties at lambda0 = {smallest_fixed}",
        grid.lambda_random.len()
    );
    let first = run_fit(
        context,
        &[smallest_fixed],
        &grid.lambda_random,
        warm_start,
        engine,
        store,
    )?;

    let best = select_best(&first.results, context.criterion)?;
    let lam_ref = first.results.rows[best].lambda_random;
    let second_start = stage_two_warm_start(&first, best);
    log::info!(
        "stage 2: {} fixed-effect penalties at lambda1 = {lam_ref}; keeping {} of {} random effects",
        grid.lambda_fixed.len(),
        second_start.keep.iter().filter(|&&keep| keep).count(),
        second_start.keep.len()
    );
    let second = run_fit(
        context,
        &grid.lambda_fixed,
        &[lam_ref],
        &second_start,
        engine,
        store,
    )?;

    let stage_sizes = vec![first.results.len(), second.results.len()];
    let coefficients = first.coefficients.concat(&second.coefficients)?;
    let mut posterior_inits = first.posterior_inits;
    posterior_inits.extend(second.posterior_inits);
    Ok(StageOutcome {
        results: first.results.concat(&second.results),
        coefficients,
        posterior_inits,
        final_state: second.final_state,
        stage_sizes,
        stage_two_start: Some(second_start),
    })
}

/// Warm start taken from row `best` of a stage: its coefficients, its posterior
/// initial values, and a keep mask of random effects with positive variance.
#[must_use]
pub fn stage_two_warm_start(outcome: &FitOutcome, best: usize) -> WarmStart {
    let keep = outcome
        .coefficients
        .random_effect_variances(best)
        .into_iter()
        .map(|variance| variance > 0.0)
        .collect();
    WarmStart {
        coefficients: outcome.coefficients.row(best),
        posterior_init: outcome.posterior_inits.get(best).cloned(),
        keep,
    }
}

fn run_fit(
    context: &StageContext<'_>,
    lambda_fixed: &[f64],
    lambda_random: &[f64],
    warm_start: &WarmStart,
    engine: &mut dyn FittingEngine,
    store: &mut dyn PosteriorStore,
) -> Result<FitOutcome, EngineError> {
    let reference_cached = context
        .bicq_posterior_key
        .is_some_and(|key| store.contains(key));
    if let Some(key) = context.bicq_posterior_key
        && !reference_cached
    {
        log::warn!(
            "reference posterior '{key}' not cached; engine must fit lambda0 = {}, lambda1 = {} first",
            context.reference.lambda_fixed,
            context.reference.lambda_random
        );
    }
    let criterion = CriterionRequest {
        criterion: context.criterion,
        bicq_posterior_key: context.bicq_posterior_key.map(str::to_string),
        reference_cached,
    };
    let request = FitRequest {
        input: context.input,
        lambda_fixed,
        lambda_random,
        family: context.family,
        penalty: context.penalty,
        warm_start,
        prescreen: false,
        reference: context.reference,
        criterion: &criterion,
        mcmc: context.mcmc,
    };
    let outcome = engine.fit(&request, store)?;
    check_outcome(context.input, &outcome)?;
    log::debug!("engine returned {} fitted combinations", outcome.results.len());
    Ok(outcome)
}

fn check_outcome(input: &GlmmInput, outcome: &FitOutcome) -> Result<(), EngineError> {
    let results = outcome.results.len();
    let coefficients = outcome.coefficients.nrows();
    let posteriors = outcome.posterior_inits.len();
    if results != coefficients || results != posteriors {
        return Err(EngineError::MisalignedOutcome {
            results,
            coefficients,
            posteriors,
        });
    }
    let p = input.fixed_count();
    let q = input.random_count();
    if outcome.coefficients.fixed_count() != p || outcome.coefficients.random_count() != q {
        return Err(EngineError::CoefficientShape {
            expected: p + q * q,
            found: outcome.coefficients.values().ncols(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Family;
    use crate::tuning::engine::MemoryPosteriorStore;
    use crate::tuning::table::SelectionRow;
    use crate::utils::usize_to_f64;
    use approx::assert_relative_eq;

    /// Scores each combination by distance from a target and records requests.
    struct TargetEngine {
        target: (f64, f64),
        calls: Vec<(Vec<f64>, Vec<f64>, Vec<f64>, bool)>,
        reference_flags: Vec<bool>,
    }

    impl TargetEngine {
        fn new(target: (f64, f64)) -> Self {
            Self {
                target,
                calls: Vec::new(),
                reference_flags: Vec::new(),
            }
        }
    }

    impl FittingEngine for TargetEngine {
        fn fit(
            &mut self,
            request: &FitRequest<'_>,
            store: &mut dyn PosteriorStore,
        ) -> Result<FitOutcome, EngineError> {
            let warm: Vec<f64> = (0..request.warm_start.coefficients.nrows())
                .map(|i| request.warm_start.coefficients[(i, 0)])
                .collect();
            self.calls.push((
                request.lambda_fixed.to_vec(),
                request.lambda_random.to_vec(),
                warm,
                request.prescreen,
            ));
            self.reference_flags.push(request.criterion.reference_cached);
            if let Some(key) = &request.criterion.bicq_posterior_key {
                store.put(key, Mat::zeros(1, 1))?;
            }
            let mut rows = Vec::new();
            for &lf in request.lambda_fixed {
                for &lr in request.lambda_random {
                    let score = (lf - self.target.0).powi(2) + (lr - self.target.1).powi(2);
                    rows.push(SelectionRow {
                        bic_q: score,
                        bic: score,
                        ..SelectionRow::new(lf, lr)
                    });
                }
            }
            let n = rows.len();
            // p = 1, q = 2; the first random effect is zeroed once lambda1 > 0.05
            let values = Mat::from_fn(n, 5, |i, j| {
                let row = &rows[i];
                match j {
                    0 => row.lambda_fixed + usize_to_f64(i),
                    1 if row.lambda_random > 0.05 => 0.0,
                    1 => 1.0,
                    4 => 0.5,
                    _ => 0.0,
                }
            });
            let coefficients = CoefficientTable::new(1, 2, values)
                .map_err(|err| EngineError::EStep(err.to_string()))?;
            let posterior_inits: Vec<Mat<f64>> = (0..n)
                .map(|i| Mat::from_fn(2, 1, |_, _| usize_to_f64(i)))
                .collect();
            let final_state = FittedState {
                coefficients: coefficients.row(n - 1),
                posterior_init: posterior_inits.last().cloned(),
            };
            Ok(FitOutcome {
                results: SelectionTable::new(rows),
                coefficients,
                posterior_inits,
                final_state,
            })
        }
    }

    fn input() -> GlmmInput {
        GlmmInput::new(
            Mat::from_fn(4, 1, |i, _| usize_to_f64(i % 2)),
            Mat::from_fn(4, 1, |_, _| 1.0),
            Mat::from_fn(4, 2, |i, j| if j == 0 { 1.0 } else { usize_to_f64(i) }),
            vec![1, 1, 2, 2],
        )
    }

    fn context(input: &GlmmInput) -> StageContext<'_> {
        StageContext {
            input,
            family: GlmFamily::canonical(Family::Binomial),
            penalty: PenaltyConfig::default(),
            mcmc: McmcConfig::default(),
            reference: ReferencePenalty {
                lambda_fixed: 0.01,
                lambda_random: 0.0,
            },
            criterion: Criterion::BicQ,
            bicq_posterior_key: Some("ref"),
        }
    }

    fn grid() -> FineGrid {
        FineGrid {
            lambda_fixed: vec![0.3, 0.1, 0.2],
            lambda_random: vec![0.0, 0.1, 0.3],
        }
    }

    #[test]
    fn abbreviated_runs_two_stages_and_hands_off_best_row() {
        let input = input();
        let context = context(&input);
        let mut engine = TargetEngine::new((0.2, 0.1));
        let mut store = MemoryPosteriorStore::new();
        let start = WarmStart::from_fixed_effects(&Mat::zeros(1, 1), 2);
        let outcome = run_stages(
            &context,
            &grid(),
            &start,
            SearchMode::Abbreviated,
            &mut engine,
            &mut store,
        )
        .expect("stages");

        assert_eq!(engine.calls.len(), 2);
        assert_eq!(engine.calls[0].0, vec![0.1]);
        assert_eq!(engine.calls[0].1, vec![0.0, 0.1, 0.3]);
        assert_eq!(engine.calls[1].0, vec![0.3, 0.1, 0.2]);
        assert_eq!(engine.calls[1].1, vec![0.1]);
        assert!(engine.calls.iter().all(|call| !call.3));

        assert_eq!(outcome.stage_sizes, vec![3, 3]);
        assert_eq!(outcome.results.len(), 6);
        assert_eq!(outcome.coefficients.nrows(), 6);
        assert_eq!(outcome.posterior_inits.len(), 6);

        let handed = outcome.stage_two_start.as_ref().expect("abbreviated");
        assert_eq!(engine.calls[1].2, column(&handed.coefficients));
        assert_relative_eq!(handed.coefficients[(0, 0)], 1.1);
        assert_eq!(handed.keep, vec![false, true]);
        let init = handed.posterior_init.as_ref().expect("posterior init");
        assert_relative_eq!(init[(0, 0)], 1.0);
    }

    #[test]
    fn reference_cache_flag_tracks_store() {
        let input = input();
        let context = context(&input);
        let mut engine = TargetEngine::new((0.2, 0.1));
        let mut store = MemoryPosteriorStore::new();
        let start = WarmStart::from_fixed_effects(&Mat::zeros(1, 1), 2);
        run_stages(
            &context,
            &grid(),
            &start,
            SearchMode::Abbreviated,
            &mut engine,
            &mut store,
        )
        .expect("stages");
        assert_eq!(engine.reference_flags, vec![false, true]);
    }

    #[test]
    fn full_grid_is_a_single_call() {
        let input = input();
        let context = context(&input);
        let mut engine = TargetEngine::new((0.2, 0.1));
        let mut store = MemoryPosteriorStore::new();
        let start = WarmStart::from_fixed_effects(&Mat::zeros(1, 1), 2);
        let outcome = run_stages(
            &context,
            &grid(),
            &start,
            SearchMode::FullGrid,
            &mut engine,
            &mut store,
        )
        .expect("stages");
        assert_eq!(engine.calls.len(), 1);
        assert_eq!(outcome.results.len(), 9);
        assert_eq!(outcome.stage_sizes, vec![9]);
        assert!(outcome.stage_two_start.is_none());
    }

    #[test]
    fn misaligned_outcome_is_rejected() {
        struct ShortEngine;
        impl FittingEngine for ShortEngine {
            fn fit(
                &mut self,
                request: &FitRequest<'_>,
                _store: &mut dyn PosteriorStore,
            ) -> Result<FitOutcome, EngineError> {
                let coefficients = CoefficientTable::new(1, 2, Mat::zeros(1, 5))
                    .map_err(|err| EngineError::EStep(err.to_string()))?;
                Ok(FitOutcome {
                    results: SelectionTable::new(vec![
                        SelectionRow::new(request.lambda_fixed[0], 0.0),
                        SelectionRow::new(request.lambda_fixed[0], 0.1),
                    ]),
                    coefficients,
                    posterior_inits: Vec::new(),
                    final_state: FittedState {
                        coefficients: Mat::zeros(5, 1),
                        posterior_init: None,
                    },
                })
            }
        }

        let input = input();
        let context = context(&input);
        let start = WarmStart::from_fixed_effects(&Mat::zeros(1, 1), 2);
        let err = run_stages(
            &context,
            &grid(),
            &start,
            SearchMode::FullGrid,
            &mut ShortEngine,
            &mut MemoryPosteriorStore::new(),
        )
        .expect_err("misaligned");
        assert!(matches!(
            err,
            SelectionError::Engine(EngineError::MisalignedOutcome {
                results: 2,
                coefficients: 1,
                posteriors: 0
            })
        ));
    }

    fn column(values: &Mat<f64>) -> Vec<f64> {
        (0..values.nrows()).map(|i| values[(i, 0)]).collect()
    }
}
