//! Fit quality and label summaries.

use serde::{Deserialize, Serialize};

/// Regression error measures of predictions against labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Number of evaluated rows.
    pub count: usize,
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error, in label units.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    ///
    /// When the labels are constant this is 1 for a perfect fit and 0
    /// otherwise.
    pub r2: f64,
}

impl RegressionMetrics {
    /// Compares `predictions` to `labels` row by row.
    ///
    /// Returns `None` when there are no rows.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length.
    ///
    /// # Examples
    ///
    /// ```
    /// use ntuple_training::metrics::RegressionMetrics;
    ///
    /// let metrics = RegressionMetrics::new(&[1.0, 2.0, 5.0], &[1.0, 3.0, 3.0]).unwrap();
    /// assert_eq!(metrics.count, 3);
    /// assert!((metrics.mae - 1.0).abs() < 1e-12);
    /// assert!((metrics.mse - 5.0 / 3.0).abs() < 1e-12);
    /// ```
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn new(predictions: &[f64], labels: &[f64]) -> Option<Self> {
        assert_eq!(
            predictions.len(),
            labels.len(),
            "one prediction per label is required"
        );
        if labels.is_empty() {
            return None;
        }

        let n = labels.len() as f64;
        let label_mean = labels.iter().sum::<f64>() / n;
        let mut squared = 0.0;
        let mut absolute = 0.0;
        let mut total = 0.0;
        for (prediction, label) in predictions.iter().zip(labels) {
            let residual = prediction - label;
            squared += residual * residual;
            absolute += residual.abs();
            total += (label - label_mean).powi(2);
        }

        let mse = squared / n;
        let r2 = if total > 0.0 {
            1.0 - squared / total
        } else if squared <= 0.0 {
            1.0
        } else {
            0.0
        };
        Some(Self {
            count: labels.len(),
            mse,
            rmse: mse.sqrt(),
            mae: absolute / n,
            r2,
        })
    }
}

/// Summary of a set of values, such as the labels of a training set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl DescriptiveStats {
    /// Summarizes unsorted values. Returns `None` for an empty input.
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut values = values.into_iter().collect::<Vec<_>>();
        values.sort_by(f64::total_cmp);
        Self::from_sorted(&values)
    }

    /// Summarizes values already sorted in ascending order.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn from_sorted(sorted_values: &[f64]) -> Option<Self> {
        let (&min, &max) = (sorted_values.first()?, sorted_values.last()?);
        let count = sorted_values.len();
        let n = count as f64;
        let mean = sorted_values.iter().sum::<f64>() / n;
        let median = if count % 2 == 0 {
            f64::midpoint(sorted_values[count / 2 - 1], sorted_values[count / 2])
        } else {
            sorted_values[count / 2]
        };
        let variance = sorted_values
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(Self {
            count,
            min,
            max,
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }
}
