use chrono::{DateTime, Utc};
use ntuple_pattern::{catalog::PatternSpec, encoder::RowGrouping};
use ntuple_training::{
    metrics::{DescriptiveStats, RegressionMetrics},
    sgd::SgdParams,
};
use serde::{Deserialize, Serialize};

/// What was trained, on what, and how well it fit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub trained_at: DateTime<Utc>,
    pub patterns: Vec<PatternSpec>,
    pub row_grouping: RowGrouping,
    pub min_ply: Option<u32>,
    pub max_ply: Option<u32>,
    pub sgd: SgdParams,
    pub epochs: usize,
    pub train_records: usize,
    pub eval_records: usize,
    pub labels: Option<DescriptiveStats>,
    pub train_metrics: RegressionMetrics,
    pub eval_metrics: Option<RegressionMetrics>,
    pub coefficient_count: usize,
}
