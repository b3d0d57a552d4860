use faer::Mat;
use pglmm_tune::{
    CoefficientTable, EngineError, ExpectationStep, Family, FinalDiagnostics, FinalizeRequest,
    FineSearchOptions, FitOutcome, FitRequest, FittedState, FittingEngine, GlmFamily, GlmmInput,
    MemoryPosteriorStore, PglmmFit, PosteriorStore, SelectionRow, SelectionTable, fine_search,
    render_selection_table,
};

/// Criteria shaped as a bowl around `(0.05, 0.02)`.
struct BowlEngine;

impl FittingEngine for BowlEngine {
    fn fit(
        &mut self,
        request: &FitRequest<'_>,
        store: &mut dyn PosteriorStore,
    ) -> Result<FitOutcome, EngineError> {
        if let Some(key) = &request.criterion.bicq_posterior_key
            && !request.criterion.reference_cached
        {
            store.put(key, Mat::zeros(1, 4))?;
        }
        let mut rows = Vec::new();
        for &lambda_fixed in request.lambda_fixed {
            for &lambda_random in request.lambda_random {
                rows.push(bowl_row(lambda_fixed, lambda_random));
            }
        }
        let n = rows.len();
        let values = Mat::from_fn(n, 3, |i, j| match j {
            0 => -0.5,
            1 => 0.8 - rows[i].lambda_fixed,
            _ => 1.0 - rows[i].lambda_random,
        });
        let coefficients = CoefficientTable::new(2, 1, values)
            .map_err(|err| EngineError::EStep(err.to_string()))?;
        let posterior_inits = vec![Mat::zeros(1, 4); n];
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

struct FixedEStep;

impl ExpectationStep for FixedEStep {
    fn finalize(
        &mut self,
        request: &FinalizeRequest<'_>,
    ) -> Result<FinalDiagnostics, EngineError> {
        Ok(FinalDiagnostics {
            log_lik: -12.0,
            bic_h: 30.0,
            bic: 31.0,
            bic_ngrp: 29.0,
            bic_q: request.bicq_posterior_key.map(|_| 28.5),
        })
    }
}

fn bowl_row(lambda_fixed: f64, lambda_random: f64) -> SelectionRow {
    let value = 30.0 + (lambda_fixed.ln() - 0.05f64.ln()).powi(2) + lambda_random * 50.0;
    SelectionRow {
        bic_h: value,
        bic: value + 1.0,
        bic_q: value - 1.0,
        bic_ngrp: value - 0.5,
        log_lik: -value / 2.0,
        nonzero_fixed: 2,
        nonzero_random: 1,
        ..SelectionRow::new(lambda_fixed, lambda_random)
    }
}

fn main() {
    let n = 20;
    let fixed = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) / 4.0 });
    let random = Mat::from_fn(n, 1, |_, _| 1.0);
    let response = Mat::from_fn(n, 1, |i, _| if i % 3 == 0 { 1.0 } else { 0.0 });
    let groups = (0..n).map(|i| u64::try_from(i / 5).unwrap_or(u64::MAX)).collect();
    let input = GlmmInput::new(response, fixed, random, groups);

    let mut coarse = Vec::new();
    for lambda_fixed in [0.01, 0.03, 0.1, 0.3] {
        for lambda_random in [0.0, 0.1] {
            coarse.push(bowl_row(lambda_fixed, lambda_random));
        }
    }
    let model = PglmmFit::standardized(
        input,
        GlmFamily::canonical(Family::Binomial),
        SelectionTable::new(coarse),
    );

    let result = fine_search(
        &model,
        &FineSearchOptions::default(),
        &mut BowlEngine,
        &mut FixedEStep,
        &mut MemoryPosteriorStore::new(),
    )
    .expect("fine search");

    println!(
        "Optimum: lambda0 = {:.4}, lambda1 = {:.4}",
        result.optimum.lambda_fixed, result.optimum.lambda_random
    );
    println!("Fixed effects (raw scale): {:?}", result.fixed_effects);
    println!(
        "{}",
        render_selection_table(&result.combined, Some(result.optimum_index))
    );
}

fn idx_to_f64(idx: usize) -> f64 {
    f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
}
