//! Online least-squares regression by stochastic gradient descent.
//!
//! [`SgdRegressor`] minimises
//!
//! ```text
//! 1/n Σ ½ (w·xᵢ - yᵢ)²  +  α/2 ‖w‖²
//! ```
//!
//! over binary sparse rows, visiting one row per step. There is no
//! intercept: the score of a position is the sum of its pattern weights.
//!
//! # L2 shrinkage
//!
//! Weight decay touches every coefficient on every step, which would make a
//! step cost the full feature dimension. Instead the weights are stored as
//! `scale * v`: decay multiplies `scale`, and the gradient step only updates
//! the few entries of `v` the row selects. `scale` is folded back into `v`
//! when it gets small and at the end of every public call, so
//! [`LinearEstimator::coefficients`] always sees plain weights.

use rand::{SeedableRng as _, seq::SliceRandom};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::design_matrix::SparseMatrix;

/// `scale` below which it is folded back into the stored weights.
const MIN_SCALE: f64 = 1e-9;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum TrainingError {
    #[display("training set is empty")]
    EmptyTrainingSet,
    #[display("design matrix has {rows} rows but {labels} labels were given")]
    LabelCountMismatch { rows: usize, labels: usize },
    #[display("design matrix has {actual} columns, model was fit on {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[display("model has not been fit")]
    NotFitted,
    #[display("invalid SGD parameters: {reason}")]
    InvalidParams { reason: String },
    #[display("weights diverged in epoch {epoch}; try a smaller learning rate")]
    Diverged { epoch: usize },
}

/// A linear model fit on a binary sparse design matrix.
pub trait LinearEstimator {
    /// Fits from scratch, discarding any previous state.
    fn fit(&mut self, x: &SparseMatrix, y: &[f64]) -> Result<&[f64], TrainingError>;

    /// Runs one more pass over `x`, starting from zero weights if unfit.
    fn partial_fit(&mut self, x: &SparseMatrix, y: &[f64]) -> Result<&[f64], TrainingError>;

    fn predict(&self, x: &SparseMatrix) -> Result<Vec<f64>, TrainingError>;

    /// Learned weights, one per column, or `None` before the first fit.
    fn coefficients(&self) -> Option<&[f64]>;
}

/// Step-size schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LearningRate {
    /// `eta = eta0`
    Constant,
    /// `eta = eta0 / t^power_t`, `t` counting steps from 1
    InvScaling { power_t: f64 },
}

impl Default for LearningRate {
    fn default() -> Self {
        Self::InvScaling { power_t: 0.25 }
    }
}

impl LearningRate {
    #[expect(clippy::cast_precision_loss)]
    fn eta(self, eta0: f64, step: u64) -> f64 {
        match self {
            LearningRate::Constant => eta0,
            LearningRate::InvScaling { power_t } => eta0 / (step as f64).powf(power_t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SgdParams {
    /// L2 regularization strength.
    pub alpha: f64,
    /// Initial learning rate.
    pub eta0: f64,
    pub learning_rate: LearningRate,
    /// Upper bound on passes over the data in [`LinearEstimator::fit`].
    pub max_epochs: usize,
    /// Stop once the mean epoch loss fails to improve on the best loss by
    /// at least `tol` for `n_iter_no_change` consecutive epochs. `None`
    /// always runs `max_epochs`.
    pub tol: Option<f64>,
    pub n_iter_no_change: usize,
    /// Visit rows in a fresh random order every epoch.
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for SgdParams {
    fn default() -> Self {
        Self {
            alpha: 1e-4,
            eta0: 0.01,
            learning_rate: LearningRate::default(),
            max_epochs: 1000,
            tol: Some(1e-3),
            n_iter_no_change: 5,
            shuffle: true,
            seed: 0,
        }
    }
}

impl SgdParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        let invalid = |reason: &str| {
            Err(TrainingError::InvalidParams {
                reason: reason.to_owned(),
            })
        };
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return invalid("alpha must be finite and non-negative");
        }
        if !(self.eta0.is_finite() && self.eta0 > 0.0) {
            return invalid("eta0 must be finite and positive");
        }
        if self.eta0 * self.alpha >= 1.0 {
            return invalid("eta0 * alpha must be below 1");
        }
        if let LearningRate::InvScaling { power_t } = self.learning_rate {
            if !(power_t.is_finite() && power_t >= 0.0) {
                return invalid("power_t must be finite and non-negative");
            }
        }
        if self.max_epochs == 0 {
            return invalid("max_epochs must be at least 1");
        }
        if self.tol.is_some_and(|tol| !(tol.is_finite() && tol >= 0.0)) {
            return invalid("tol must be finite and non-negative");
        }
        if self.n_iter_no_change == 0 {
            return invalid("n_iter_no_change must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SgdState {
    weights: Vec<f64>,
    scale: f64,
    step: u64,
    rng: Pcg64,
}

impl SgdState {
    fn new(n_cols: u32, seed: u64) -> Self {
        Self {
            weights: vec![0.0; n_cols as usize],
            scale: 1.0,
            step: 0,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    fn fold_scale(&mut self) {
        for weight in &mut self.weights {
            *weight *= self.scale;
        }
        self.scale = 1.0;
    }

    fn predict_row(&self, row: &[u32]) -> f64 {
        self.scale
            * row
                .iter()
                .map(|&column| self.weights[column as usize])
                .sum::<f64>()
    }

    /// One pass over all rows. Returns the mean squared loss seen during the
    /// pass, measured before each row's update.
    #[expect(clippy::cast_precision_loss)]
    fn run_epoch(
        &mut self,
        params: &SgdParams,
        x: &SparseMatrix,
        y: &[f64],
        epoch: usize,
    ) -> Result<f64, TrainingError> {
        let mut order: Vec<usize> = (0..x.n_rows()).collect();
        if params.shuffle {
            order.shuffle(&mut self.rng);
        }

        let mut total_loss = 0.0;
        for index in order {
            let row = x.row(index);
            let error = self.predict_row(row) - y[index];
            if !error.is_finite() {
                return Err(TrainingError::Diverged { epoch });
            }
            total_loss += 0.5 * error * error;

            self.step += 1;
            let eta = params.learning_rate.eta(params.eta0, self.step);
            self.scale *= 1.0 - eta * params.alpha;
            if self.scale < MIN_SCALE {
                self.fold_scale();
            }
            let update = -eta * error / self.scale;
            for &column in row {
                self.weights[column as usize] += update;
            }
        }
        if !total_loss.is_finite() {
            return Err(TrainingError::Diverged { epoch });
        }
        Ok(total_loss / x.n_rows() as f64)
    }
}

/// Squared-loss linear regressor trained by SGD with L2 regularization.
#[derive(Debug, Clone)]
pub struct SgdRegressor {
    params: SgdParams,
    state: Option<SgdState>,
    epoch_losses: Vec<f64>,
}

impl SgdRegressor {
    #[must_use]
    pub fn new(params: SgdParams) -> Self {
        Self {
            params,
            state: None,
            epoch_losses: vec![],
        }
    }

    #[must_use]
    pub fn params(&self) -> &SgdParams {
        &self.params
    }

    /// Mean training loss of every epoch run since the last [`fit`].
    ///
    /// [`fit`]: LinearEstimator::fit
    #[must_use]
    pub fn epoch_losses(&self) -> &[f64] {
        &self.epoch_losses
    }

    #[must_use]
    pub fn epochs_run(&self) -> usize {
        self.epoch_losses.len()
    }
}

fn check_training_input(x: &SparseMatrix, y: &[f64]) -> Result<(), TrainingError> {
    if x.n_rows() != y.len() {
        return Err(TrainingError::LabelCountMismatch {
            rows: x.n_rows(),
            labels: y.len(),
        });
    }
    if x.n_rows() == 0 {
        return Err(TrainingError::EmptyTrainingSet);
    }
    Ok(())
}

impl LinearEstimator for SgdRegressor {
    /// Fits from scratch.
    ///
    /// Any previous state is dropped before the input is checked, so a
    /// failed call leaves the regressor unfit.
    fn fit(&mut self, x: &SparseMatrix, y: &[f64]) -> Result<&[f64], TrainingError> {
        self.state = None;
        self.epoch_losses.clear();
        self.params.validate()?;
        check_training_input(x, y)?;

        let params = self.params;
        let mut state = SgdState::new(x.n_cols(), params.seed);
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        for epoch in 1..=params.max_epochs {
            let loss = state.run_epoch(&params, x, y, epoch)?;
            self.epoch_losses.push(loss);
            log::debug!("epoch {epoch}: mean loss {loss:.6}");

            if let Some(tol) = params.tol {
                if loss > best_loss - tol {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                best_loss = best_loss.min(loss);
                if no_improvement >= params.n_iter_no_change {
                    log::debug!("converged after {epoch} epochs");
                    break;
                }
            }
        }
        if self.epoch_losses.len() == params.max_epochs && params.tol.is_some() {
            log::debug!("stopped at max_epochs ({}) before converging", params.max_epochs);
        }

        state.fold_scale();
        Ok(self.state.insert(state).weights.as_slice())
    }

    /// Runs one epoch on top of the current state.
    ///
    /// Invalid parameters or input leave the current state untouched. A
    /// diverging epoch discards it, leaving the regressor unfit.
    fn partial_fit(&mut self, x: &SparseMatrix, y: &[f64]) -> Result<&[f64], TrainingError> {
        self.params.validate()?;
        check_training_input(x, y)?;

        let mut state = match self.state.take() {
            Some(state) if state.weights.len() != x.n_cols() as usize => {
                let expected = state.weights.len();
                self.state = Some(state);
                return Err(TrainingError::DimensionMismatch {
                    expected,
                    actual: x.n_cols() as usize,
                });
            }
            Some(state) => state,
            None => {
                self.epoch_losses.clear();
                SgdState::new(x.n_cols(), self.params.seed)
            }
        };

        let epoch = self.epoch_losses.len() + 1;
        let loss = state.run_epoch(&self.params, x, y, epoch)?;
        self.epoch_losses.push(loss);
        log::debug!("epoch {epoch}: mean loss {loss:.6}");

        state.fold_scale();
        Ok(self.state.insert(state).weights.as_slice())
    }

    fn predict(&self, x: &SparseMatrix) -> Result<Vec<f64>, TrainingError> {
        let state = self.state.as_ref().ok_or(TrainingError::NotFitted)?;
        if state.weights.len() != x.n_cols() as usize {
            return Err(TrainingError::DimensionMismatch {
                expected: state.weights.len(),
                actual: x.n_cols() as usize,
            });
        }
        Ok(x.rows().map(|row| state.predict_row(row)).collect())
    }

    fn coefficients(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|state| state.weights.as_slice())
    }
}
