use std::path::PathBuf;

use anyhow::Context as _;
use chrono::Utc;
use ntuple_pattern::{encoder::RowGrouping, record::PositionRecord};
use ntuple_training::{
    design_matrix::HoldoutSplit,
    metrics::{DescriptiveStats, RegressionMetrics},
    pipeline::{self, PipelineError, TrainingConfig},
    sgd::{LearningRate, SgdParams, SgdRegressor},
};

use crate::{
    schema::run_summary::RunSummary,
    util::{Output, RecordInputArg},
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum RowGroupingArg {
    /// One row per position with every pattern's hits
    PerPosition,
    /// One row per position and pattern type
    #[default]
    PerPattern,
}

impl From<RowGroupingArg> for RowGrouping {
    fn from(arg: RowGroupingArg) -> Self {
        match arg {
            RowGroupingArg::PerPosition => RowGrouping::OneRowPerPosition,
            RowGroupingArg::PerPattern => RowGrouping::OneRowPerPositionPerPattern,
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LearningRateArg {
    /// eta = eta0
    Constant,
    /// eta = eta0 / t^power_t
    #[default]
    Invscaling,
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    #[clap(flatten)]
    input: RecordInputArg,
    /// How encoded pattern hits are grouped into design-matrix rows
    #[arg(long, value_enum, default_value_t)]
    row_grouping: RowGroupingArg,
    /// Fraction of records held out for evaluation
    #[arg(long, default_value_t = 0.0)]
    eval_fraction: f64,
    /// Pick the hold-out records at random with this seed instead of taking the last ones
    #[arg(long)]
    split_seed: Option<u64>,
    /// L2 regularization strength
    #[arg(long, default_value_t = 1e-4)]
    alpha: f64,
    /// Initial learning rate
    #[arg(long, default_value_t = 0.01)]
    eta0: f64,
    #[arg(long, value_enum, default_value_t)]
    learning_rate: LearningRateArg,
    /// Exponent of the inverse-scaling learning rate
    #[arg(long, default_value_t = 0.25)]
    power_t: f64,
    /// Maximum passes over the training rows
    #[arg(long, default_value_t = 1000)]
    max_epochs: usize,
    /// Minimum epoch loss improvement that resets early stopping
    #[arg(long, default_value_t = 1e-3)]
    tol: f64,
    /// Epochs without improvement before stopping
    #[arg(long, default_value_t = 5)]
    n_iter_no_change: usize,
    /// Always run max-epochs passes
    #[arg(long)]
    no_early_stopping: bool,
    /// Visit rows in input order instead of reshuffling every epoch
    #[arg(long)]
    no_shuffle: bool,
    /// Seed for epoch shuffling
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Coefficient table CSV output (stdout if omitted)
    #[arg(long)]
    table: Option<PathBuf>,
    /// Flat weight dump, one weight per line in table order
    #[arg(long)]
    weights: Option<PathBuf>,
    /// Fractional digits in the flat weight dump
    #[arg(long, default_value_t = 6)]
    precision: usize,
    /// Run summary JSON output
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Name recorded in the run summary
    #[arg(long, default_value = "ntuple")]
    name: String,
}

impl TrainArg {
    fn sgd_params(&self) -> SgdParams {
        SgdParams {
            alpha: self.alpha,
            eta0: self.eta0,
            learning_rate: match self.learning_rate {
                LearningRateArg::Constant => LearningRate::Constant,
                LearningRateArg::Invscaling => LearningRate::InvScaling {
                    power_t: self.power_t,
                },
            },
            max_epochs: self.max_epochs,
            tol: (!self.no_early_stopping).then_some(self.tol),
            n_iter_no_change: self.n_iter_no_change,
            shuffle: !self.no_shuffle,
            seed: self.seed,
        }
    }

    fn holdout(&self) -> anyhow::Result<Option<HoldoutSplit>> {
        let eval_fraction = self.eval_fraction;
        anyhow::ensure!(
            (0.0..=1.0).contains(&eval_fraction),
            "--eval-fraction must be in [0, 1], got {eval_fraction}"
        );
        if eval_fraction <= 0.0 {
            return Ok(None);
        }
        Ok(Some(match self.split_seed {
            Some(seed) => HoldoutSplit::Shuffled {
                eval_fraction,
                seed,
            },
            None => HoldoutSplit::Positional { eval_fraction },
        }))
    }
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let catalog = arg.input.load_catalog()?;
    let params = arg.sgd_params();
    params.validate()?;
    let config = TrainingConfig {
        grouping: arg.row_grouping.into(),
        holdout: arg.holdout()?,
    };

    let (records, sources) = arg.input.load_records(&catalog)?;
    let labels = DescriptiveStats::new(records.iter().map(PositionRecord::score));

    let mut model = SgdRegressor::new(params);
    let outcome = match pipeline::train(&catalog, &records, &config, &mut model) {
        Err(PipelineError::Malformed(err)) => return Err(sources.explain(err)),
        result => result?,
    };
    eprintln!("Training finished after {} epochs", model.epochs_run());
    if let Some(loss) = model.epoch_losses().last() {
        eprintln!("  Final epoch loss: {loss:.6}");
    }
    eprintln!("  Train records:    {}", outcome.train_records);
    print_metrics("Train", &outcome.train_metrics);
    if let Some(metrics) = &outcome.eval_metrics {
        eprintln!("  Eval records:     {}", outcome.eval_records);
        print_metrics("Eval", metrics);
    }

    let mut output = Output::from_output_path(arg.table.clone())?;
    outcome
        .table
        .write_csv(&mut output)
        .with_context(|| format!("Failed to write coefficient table to {}", output.display_path()))?;
    if let Some(path) = &arg.weights {
        let mut output = Output::open(path.clone())?;
        outcome
            .table
            .write_flat_weights(&mut output, arg.precision)
            .with_context(|| format!("Failed to write weights to {}", output.display_path()))?;
    }

    if let Some(path) = &arg.summary {
        let summary = RunSummary {
            name: arg.name.clone(),
            trained_at: Utc::now(),
            patterns: catalog.specs(),
            row_grouping: config.grouping,
            min_ply: arg.input.min_ply,
            max_ply: arg.input.max_ply,
            sgd: params,
            epochs: model.epochs_run(),
            train_records: outcome.train_records,
            eval_records: outcome.eval_records,
            labels,
            train_metrics: outcome.train_metrics,
            eval_metrics: outcome.eval_metrics,
            coefficient_count: outcome.table.len(),
        };
        Output::save_json(&summary, Some(path.clone()))?;
    }
    Ok(())
}

fn print_metrics(partition: &str, metrics: &RegressionMetrics) {
    eprintln!("  {partition} metrics:");
    eprintln!("    Rows: {}", metrics.count);
    eprintln!("    RMSE: {:.4}", metrics.rmse);
    eprintln!("    MAE:  {:.4}", metrics.mae);
    eprintln!("    R²:   {:.4}", metrics.r2);
}
