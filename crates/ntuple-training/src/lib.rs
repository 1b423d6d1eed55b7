//! Linear n-tuple weight training.
//!
//! Builds on [`ntuple_pattern`]: encoded position records are stacked into a
//! sparse design matrix, a linear model is fit to the final game scores, and
//! the learned weights are exported per `(pattern, local index)`.
//!
//! # Modules
//!
//! - [`design_matrix`] - CSR design matrix assembly and hold-out splits
//! - [`sgd`] - SGD regressor with L2 regularization
//! - [`metrics`] - regression metrics and label statistics
//! - [`export`] - coefficient table and flat weight dump
//! - [`pipeline`] - a whole training run in one call
//!
//! # Example
//!
//! ```
//! use ntuple_pattern::{catalog::PatternCatalog, encoder::RowGrouping, record::PositionRecord};
//! use ntuple_training::{
//!     design_matrix::DesignMatrix,
//!     export::CoefficientTable,
//!     sgd::{LinearEstimator as _, SgdParams, SgdRegressor},
//! };
//!
//! let catalog = PatternCatalog::new(&["single", "pair"], &[1, 2]).unwrap();
//! let records = [
//!     PositionRecord::new(1, 20, 12.0, 1, vec![1, 4]),
//!     PositionRecord::new(2, 21, -6.0, 1, vec![2, 0]),
//! ];
//! let design =
//!     DesignMatrix::assemble(&catalog, RowGrouping::OneRowPerPosition, &records).unwrap();
//!
//! let mut model = SgdRegressor::new(SgdParams::default());
//! let coefficients = model.fit(design.features(), design.labels()).unwrap();
//! let table = CoefficientTable::from_coefficients(&catalog, coefficients).unwrap();
//! assert_eq!(table.len(), 12);
//! ```

pub mod design_matrix;
pub mod export;
pub mod metrics;
pub mod pipeline;
pub mod sgd;
