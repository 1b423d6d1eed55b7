//! End-to-end training run: assemble, split, fit, evaluate, export.
//!
//! Any stage error aborts the run; nothing is exported from a partial fit.

use ntuple_pattern::{
    catalog::PatternCatalog,
    encoder::{MalformedRecordError, RowGrouping},
    record::PositionRecord,
};

use crate::{
    design_matrix::{DesignMatrix, HoldoutSplit},
    export::{CoefficientTable, ExportError},
    metrics::RegressionMetrics,
    sgd::{LinearEstimator, TrainingError},
};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum PipelineError {
    #[display("malformed input: {_0}")]
    Malformed(MalformedRecordError),
    #[display("training failed: {_0}")]
    Training(TrainingError),
    #[display("export failed: {_0}")]
    Export(ExportError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub grouping: RowGrouping,
    /// Hold-out partition to evaluate on; `None` trains on everything.
    pub holdout: Option<HoldoutSplit>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub table: CoefficientTable,
    pub train_records: usize,
    pub eval_records: usize,
    pub train_metrics: RegressionMetrics,
    /// `None` without a hold-out, or when the hold-out came out empty.
    pub eval_metrics: Option<RegressionMetrics>,
}

/// Trains `estimator` on `records` and exports its coefficients.
///
/// `records` are used as given, so any ply filtering must already be done.
pub fn train<E>(
    catalog: &PatternCatalog,
    records: &[PositionRecord],
    config: &TrainingConfig,
    estimator: &mut E,
) -> Result<TrainingOutcome, PipelineError>
where
    E: LinearEstimator,
{
    let design = DesignMatrix::assemble(catalog, config.grouping, records)?;
    log::info!(
        "Design matrix: {} rows x {} columns, {} nonzeros",
        design.n_rows(),
        design.features().n_cols(),
        design.features().nnz(),
    );

    let (train, eval) = match &config.holdout {
        Some(split) => {
            let (train, eval) = design.split(split);
            (train, Some(eval))
        }
        None => (design, None),
    };
    let eval = eval.filter(|eval| eval.n_rows() > 0);
    log::info!(
        "Fitting on {} records ({} held out)",
        train.record_count(),
        eval.as_ref().map_or(0, DesignMatrix::record_count),
    );

    let table = CoefficientTable::from_coefficients(
        catalog,
        estimator.fit(train.features(), train.labels())?,
    )?;

    let train_metrics =
        evaluate(estimator, &train)?.ok_or(TrainingError::EmptyTrainingSet)?;
    let eval_metrics = match &eval {
        Some(eval) => evaluate(estimator, eval)?,
        None => None,
    };
    log::info!(
        "Train RMSE {:.4}, R² {:.4}",
        train_metrics.rmse,
        train_metrics.r2
    );
    if let Some(metrics) = &eval_metrics {
        log::info!("Eval RMSE {:.4}, R² {:.4}", metrics.rmse, metrics.r2);
    }

    Ok(TrainingOutcome {
        table,
        train_records: train.record_count(),
        eval_records: eval.as_ref().map_or(0, DesignMatrix::record_count),
        train_metrics,
        eval_metrics,
    })
}

fn evaluate<E>(
    estimator: &E,
    design: &DesignMatrix,
) -> Result<Option<RegressionMetrics>, TrainingError>
where
    E: LinearEstimator,
{
    let predictions = estimator.predict(design.features())?;
    Ok(RegressionMetrics::new(&predictions, design.labels()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sgd::{LearningRate, SgdParams, SgdRegressor};

    fn small_catalog() -> PatternCatalog {
        PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap()
    }

    /// Scores generated by a known additive model over both patterns.
    fn synthetic_records(count: u64) -> Vec<PositionRecord> {
        let single = [1.0, -2.0, 0.5];
        let pair = [3.0, 0.0, -1.0, 2.0, 1.5, -0.5, 0.25, -3.0, 1.0];
        (0..count)
            .map(|i| {
                let a = usize::try_from(i % 3).unwrap();
                let b = usize::try_from((i * 7 + i / 3) % 9).unwrap();
                let score = single[a] + pair[b];
                let codes = vec![i64::try_from(a).unwrap(), i64::try_from(b).unwrap()];
                PositionRecord::new(i + 1, 20, score, 1, codes)
            })
            .collect()
    }

    fn params() -> SgdParams {
        SgdParams {
            alpha: 0.0,
            eta0: 0.05,
            learning_rate: LearningRate::Constant,
            max_epochs: 300,
            tol: None,
            ..SgdParams::default()
        }
    }

    #[test]
    fn test_train_with_holdout() {
        let catalog = small_catalog();
        let records = synthetic_records(90);
        let config = TrainingConfig {
            grouping: RowGrouping::OneRowPerPosition,
            holdout: Some(HoldoutSplit::Shuffled {
                eval_fraction: 0.2,
                seed: 3,
            }),
        };
        let mut model = SgdRegressor::new(params());
        let outcome = train(&catalog, &records, &config, &mut model).unwrap();

        assert_eq!(outcome.table.len(), 12);
        assert_eq!(outcome.train_records, 72);
        assert_eq!(outcome.eval_records, 18);
        assert!(outcome.train_metrics.rmse < 0.05, "{:?}", outcome.train_metrics);
        let eval = outcome.eval_metrics.unwrap();
        assert_eq!(eval.count, 18);
        assert!(eval.r2 > 0.9, "{eval:?}");
    }

    #[test]
    fn test_train_without_holdout() {
        let catalog = small_catalog();
        let records = synthetic_records(30);
        let config = TrainingConfig::default();
        let mut model = SgdRegressor::new(params());
        let outcome = train(&catalog, &records, &config, &mut model).unwrap();

        assert_eq!(outcome.train_records, 30);
        assert_eq!(outcome.train_metrics.count, 60);
        assert!(outcome.eval_metrics.is_none());
        assert_eq!(outcome.table.weights(), model.coefficients().unwrap());
    }

    #[test]
    fn test_zero_records_fail_to_train() {
        let catalog = small_catalog();
        let mut model = SgdRegressor::new(params());
        let err = train(&catalog, &[], &TrainingConfig::default(), &mut model).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Training(TrainingError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_malformed_record_aborts() {
        let catalog = small_catalog();
        let mut records = synthetic_records(10);
        records.push(PositionRecord::new(99, 20, 0.0, 1, vec![0, 9]));
        let mut model = SgdRegressor::new(params());
        let err = train(&catalog, &records, &TrainingConfig::default(), &mut model).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Malformed(MalformedRecordError::CodeOutOfRange { record_id: 99, .. })
        ));
        assert!(model.coefficients().is_none());
    }
}
