//! Joint training of an autoencoder and of the preference model fitted on its
//! latent space.
//!
//! One epoch is made of two phases:
//! * the reconstruction phase computes the autoencoder reconstruction loss and its
//!   gradient with regard to the autoencoder parameters,
//! * the downstream phase re-embeds the labeled outcomes with the current encoder,
//!   resets the preference model training data and computes its negative log
//!   marginal likelihood with its gradient with regard to the log10 hyperparameters.
//!
//! Embeddings are treated as fixed data by the downstream phase: the encoder only
//! receives the reconstruction gradient. Both gradients are concatenated and a
//! single Adam step updates the union of parameters.
use crate::errors::{ModelError, Result};
use crate::pairwise::{PairwiseGp, PairwiseGpValidParams};
use crate::projected::ProjectedUtilityModel;

use finitediff::FiniteDiff;
use log::{debug, info, warn};
use lowrank_subspace::{Adam, Autoencoder, FittedSubspace, FrozenAutoencoder, AE_LOG_EVERY};
use ndarray::{concatenate, s, Array1, Array2, ArrayBase, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Joint training settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointTrainConfig {
    pub(crate) epochs: usize,
    pub(crate) lr: f64,
    pub(crate) plateau_window: usize,
    pub(crate) plateau_tol: f64,
}

impl Default for JointTrainConfig {
    fn default() -> Self {
        JointTrainConfig {
            epochs: 200,
            lr: 1e-2,
            plateau_window: 20,
            plateau_tol: 1e-3,
        }
    }
}

impl JointTrainConfig {
    /// Default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fixed number of epochs
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the Adam learning rate
    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    /// Set the number of epochs averaged to detect a loss plateau
    pub fn plateau_window(mut self, plateau_window: usize) -> Self {
        self.plateau_window = plateau_window;
        self
    }

    /// Set the relative loss change under which training is considered converged
    pub fn plateau_tol(mut self, plateau_tol: f64) -> Self {
        self.plateau_tol = plateau_tol;
        self
    }

    /// Number of epochs
    pub fn n_epochs(&self) -> usize {
        self.epochs
    }

    /// Adam learning rate
    pub fn learning_rate(&self) -> f64 {
        self.lr
    }
}

/// Loss histories of a joint training
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Total loss per epoch
    pub losses: Vec<f64>,
    /// Reconstruction loss per epoch
    pub reconstruction: Vec<f64>,
    /// Preference model negative log marginal likelihood per epoch
    pub downstream: Vec<f64>,
    /// Whether the total loss reached a plateau within the epoch budget
    pub converged: bool,
}

/// Whether the mean loss of the last `window` epochs moved by less than `tol`
/// relatively to the previous `window` epochs
pub fn has_plateaued(losses: &[f64], window: usize, tol: f64) -> bool {
    if window == 0 || losses.len() < 2 * window {
        return false;
    }
    let n = losses.len();
    let mean = |part: &[f64]| part.iter().sum::<f64>() / part.len() as f64;
    let last = mean(&losses[n - window..]);
    let prev = mean(&losses[n - 2 * window..n - window]);
    (last - prev).abs() <= tol * prev.abs().max(1.)
}

/// Result of a joint training
#[derive(Clone, Debug)]
pub struct JointTrainOutput {
    /// Preference model in evaluation mode with the trained encoder attached
    pub utility: ProjectedUtilityModel,
    /// Frozen copy of the trained autoencoder
    pub autoencoder: FrozenAutoencoder,
    /// Loss histories
    pub report: TrainingReport,
}

/// Joint optimizer of an autoencoder and a preference model
#[derive(Clone, Debug)]
pub struct JointTrainer {
    autoencoder: Autoencoder,
    utility: PairwiseGp,
    outcomes: Array2<f64>,
    comparisons: Array2<usize>,
    config: JointTrainConfig,
    adam: Adam,
    params: Array1<f64>,
    report: TrainingReport,
}

impl JointTrainer {
    /// Prepares the joint training of `autoencoder` on labeled `outcomes`.
    /// The preference model hyperparameters are initialized by fitting
    /// `utility_params` on the current embeddings.
    pub fn new(
        autoencoder: Autoencoder,
        outcomes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
        utility_params: &PairwiseGpValidParams,
        config: JointTrainConfig,
    ) -> Result<Self> {
        if outcomes.ncols() != autoencoder.outcome_dim() {
            return Err(ModelError::DimensionMismatchError {
                expected: autoencoder.outcome_dim(),
                actual: outcomes.ncols(),
            });
        }
        if !(config.lr > 0. && config.lr.is_finite()) {
            return Err(ModelError::InvalidConfigError(format!(
                "joint training learning rate should be positive, got {}",
                config.lr
            )));
        }
        let z = autoencoder.encode(outcomes);
        let utility = utility_params.fit_comparisons(&z, comparisons)?;
        let params = concatenate![Axis(0), autoencoder.params(), utility.hyperparameters().clone()];
        Ok(JointTrainer {
            adam: Adam::new(params.len(), config.lr),
            autoencoder,
            utility,
            outcomes: outcomes.to_owned(),
            comparisons: comparisons.to_owned(),
            config,
            params,
            report: TrainingReport::default(),
        })
    }

    /// Current autoencoder
    pub fn autoencoder(&self) -> &Autoencoder {
        &self.autoencoder
    }

    /// Current preference model on latent points
    pub fn utility(&self) -> &PairwiseGp {
        &self.utility
    }

    /// Current union of parameters `[autoencoder params, log10 hyperparameters]`
    pub fn params(&self) -> &Array1<f64> {
        &self.params
    }

    /// Loss histories so far
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    fn n_ae_params(&self) -> usize {
        self.autoencoder.n_params()
    }

    /// Reconstruction loss averaged over outcome dimensions and its gradient with
    /// regard to the autoencoder parameters
    pub fn reconstruction_phase(&self) -> (f64, Array1<f64>) {
        let scale = 1. / self.autoencoder.outcome_dim() as f64;
        self.autoencoder.reconstruction_grads(&self.outcomes, scale)
    }

    /// Re-embeds the labeled outcomes, resets the preference model training data and
    /// returns its negative log marginal likelihood with the gradient with regard to
    /// the log10 hyperparameters
    pub fn downstream_phase(&mut self) -> Result<(f64, Array1<f64>)> {
        let z = self.autoencoder.encode(&self.outcomes);
        let hyper = self.params.slice(s![self.n_ae_params()..]).to_owned();
        self.utility = self.utility.refit_with(&z, &self.comparisons, &hyper)?;
        let nlml = self.utility.neg_log_marginal_likelihood();
        let utility = &self.utility;
        let f = |h: &Array1<f64>| -> f64 { utility.nlml_with(h).unwrap_or(f64::NAN) };
        let mut grad = utility.hyperparameters().central_diff(&f);
        if grad.iter().any(|g| !g.is_finite()) {
            debug!("Non finite marginal likelihood gradient {grad}, ignored entries");
            grad.mapv_inplace(|g| if g.is_finite() { g } else { 0. });
        }
        Ok((nlml, grad))
    }

    /// One epoch: both phases then one Adam step on the union of parameters.
    /// Returns the total loss before the step.
    pub fn step(&mut self) -> Result<f64> {
        let (rec_loss, rec_grad) = self.reconstruction_phase();
        let (util_loss, hyper_grad) = self.downstream_phase()?;
        let n_ae = self.n_ae_params();

        let mut grad = Array1::zeros(self.params.len());
        grad.slice_mut(s![..n_ae]).assign(&rec_grad);
        grad.slice_mut(s![n_ae..]).assign(&hyper_grad);
        self.adam.step(&mut self.params, &grad);

        for (h, (lo, up)) in self
            .params
            .slice_mut(s![n_ae..])
            .iter_mut()
            .zip(self.utility.hyperparameter_bounds())
        {
            *h = h.clamp(lo, up);
        }
        self.autoencoder
            .set_params(&self.params.slice(s![..n_ae]).to_owned())?;

        let loss = rec_loss + util_loss;
        self.report.losses.push(loss);
        self.report.reconstruction.push(rec_loss);
        self.report.downstream.push(util_loss);
        Ok(loss)
    }

    /// Runs the configured number of epochs and freezes the result
    pub fn train(mut self) -> Result<JointTrainOutput> {
        for epoch in 0..self.config.epochs {
            let loss = self.step()?;
            if epoch % AE_LOG_EVERY == 0 {
                info!("Joint training epoch {epoch}: loss = {loss}");
            }
        }
        self.report.converged = has_plateaued(
            &self.report.losses,
            self.config.plateau_window,
            self.config.plateau_tol,
        );
        if !self.report.converged {
            warn!(
                "Joint training did not reach a plateau within {} epochs",
                self.config.epochs
            );
        }

        let n_ae = self.n_ae_params();
        let z = self.autoencoder.encode(&self.outcomes);
        let hyper = self.params.slice(s![n_ae..]).to_owned();
        let utility = self.utility.refit_with(&z, &self.comparisons, &hyper)?;
        let autoencoder = self.autoencoder.snapshot();
        let embedding = FittedSubspace::Encoded(autoencoder.clone());
        Ok(JointTrainOutput {
            utility: ProjectedUtilityModel::with_embedding(utility, &embedding)?,
            autoencoder,
            report: self.report,
        })
    }
}
