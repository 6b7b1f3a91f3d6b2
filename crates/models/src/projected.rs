//! Models operating in a learned outcome subspace.
//!
//! Both wrappers hold a model trained on latent (embedded) data together with an
//! exclusive copy of the embedding. In [Mode::Training] they expose the latent
//! model as is, in [Mode::Evaluation] they accept raw outcomes (utility) or
//! return raw outcomes (outcome model) by going through the embedding.
use crate::errors::{ModelError, Result};
use crate::outcome::OutcomeGp;
use crate::pairwise::PairwiseGp;
use crate::traits::{OutcomeModel, UtilityModel};

use lowrank_subspace::{Embedding, FittedSubspace, FrozenAutoencoder};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand_xoshiro::Xoshiro256Plus;

/// Step of the central differences used to propagate latent variances through the decoder
const DECODE_JACOBIAN_STEP: f64 = 1e-6;

/// Whether a wrapper consumes latent data or raw outcomes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Inputs are latent points, used while fitting
    Training,
    /// Inputs are raw outcomes encoded through the embedding
    Evaluation,
}

fn check_latent_dim(embedding: &FittedSubspace, expected: usize) -> Result<()> {
    if embedding.latent_dim() != expected {
        return Err(ModelError::InvalidConfigError(format!(
            "embedding latent dimension {} does not match model dimension {expected}",
            embedding.latent_dim()
        )));
    }
    Ok(())
}

/// Preference model over the latent embedding of outcomes
#[derive(Clone, Debug)]
pub struct ProjectedUtilityModel {
    model: PairwiseGp,
    embedding: Option<FittedSubspace>,
    mode: Mode,
}

impl ProjectedUtilityModel {
    /// Wraps a model fitted on latent points, in training mode without embedding
    pub fn new(model: PairwiseGp) -> Self {
        ProjectedUtilityModel {
            model,
            embedding: None,
            mode: Mode::Training,
        }
    }

    /// Wraps a model fitted on latent points and attaches `embedding` in evaluation mode
    pub fn with_embedding(model: PairwiseGp, embedding: &FittedSubspace) -> Result<Self> {
        let mut wrapper = ProjectedUtilityModel::new(model);
        wrapper.set_embedding(embedding)?;
        wrapper.eval();
        Ok(wrapper)
    }

    /// Attaches a deep copy of `embedding`, its latent dimension has to match the model one
    pub fn set_embedding(&mut self, embedding: &FittedSubspace) -> Result<()> {
        check_latent_dim(embedding, self.model.input_dim())?;
        self.embedding = Some(embedding.clone());
        Ok(())
    }

    /// Attaches a copy of a trained autoencoder as embedding
    pub fn set_autoencoder(&mut self, autoencoder: &FrozenAutoencoder) -> Result<()> {
        self.set_embedding(&FittedSubspace::Encoded(autoencoder.clone()))
    }

    /// Attached embedding
    pub fn embedding(&self) -> Option<&FittedSubspace> {
        self.embedding.as_ref()
    }

    /// Switches to latent inputs
    pub fn train(&mut self) {
        self.mode = Mode::Training;
    }

    /// Switches to raw outcome inputs
    pub fn eval(&mut self) {
        self.mode = Mode::Evaluation;
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Underlying latent model
    pub fn inner(&self) -> &PairwiseGp {
        &self.model
    }

    /// Replaces the latent model, keeping embedding and mode
    pub fn set_inner(&mut self, model: PairwiseGp) -> Result<()> {
        if let Some(embedding) = &self.embedding {
            check_latent_dim(embedding, model.input_dim())?;
        }
        self.model = model;
        Ok(())
    }

    fn model_inputs(&self, y: ArrayView2<f64>) -> Result<Array2<f64>> {
        let expected = UtilityModel::input_dim(self);
        if y.ncols() != expected {
            return Err(ModelError::DimensionMismatchError {
                expected,
                actual: y.ncols(),
            });
        }
        match (self.mode, &self.embedding) {
            (Mode::Evaluation, Some(embedding)) => Ok(embedding.encode(y)),
            _ => Ok(y.to_owned()),
        }
    }
}

impl UtilityModel for ProjectedUtilityModel {
    fn input_dim(&self) -> usize {
        match (self.mode, &self.embedding) {
            (Mode::Evaluation, Some(embedding)) => embedding.outcome_dim(),
            _ => self.model.input_dim(),
        }
    }

    fn posterior_mean(&self, y: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.model.predict(&self.model_inputs(y)?)
    }

    fn posterior_var(&self, y: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.model.predict_var(&self.model_inputs(y)?)
    }

    fn posterior(&self, y: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        self.model.predict_joint(&self.model_inputs(y)?)
    }
}

/// Outcome model predicting latent embeddings of outcomes
#[derive(Clone, Debug)]
pub struct ProjectedOutcomeModel {
    model: OutcomeGp,
    embedding: Option<FittedSubspace>,
    mode: Mode,
}

impl ProjectedOutcomeModel {
    /// Wraps a model fitted on latent outcomes, in training mode without embedding
    pub fn new(model: OutcomeGp) -> Self {
        ProjectedOutcomeModel {
            model,
            embedding: None,
            mode: Mode::Training,
        }
    }

    /// Wraps a model fitted on latent outcomes and attaches `embedding` in evaluation mode
    pub fn with_embedding(model: OutcomeGp, embedding: &FittedSubspace) -> Result<Self> {
        let mut wrapper = ProjectedOutcomeModel::new(model);
        wrapper.set_embedding(embedding)?;
        wrapper.eval();
        Ok(wrapper)
    }

    /// Attaches a deep copy of `embedding`, its latent dimension has to match the
    /// number of modeled outputs
    pub fn set_embedding(&mut self, embedding: &FittedSubspace) -> Result<()> {
        check_latent_dim(embedding, self.model.output_dim())?;
        self.embedding = Some(embedding.clone());
        Ok(())
    }

    /// Attaches a copy of a trained autoencoder as embedding
    pub fn set_autoencoder(&mut self, autoencoder: &FrozenAutoencoder) -> Result<()> {
        self.set_embedding(&FittedSubspace::Encoded(autoencoder.clone()))
    }

    /// Attached embedding
    pub fn embedding(&self) -> Option<&FittedSubspace> {
        self.embedding.as_ref()
    }

    /// Switches to latent outputs
    pub fn train(&mut self) {
        self.mode = Mode::Training;
    }

    /// Switches to decoded outputs
    pub fn eval(&mut self) {
        self.mode = Mode::Evaluation;
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Underlying latent model
    pub fn inner(&self) -> &OutcomeGp {
        &self.model
    }

    fn decoder(&self) -> Option<&FittedSubspace> {
        match self.mode {
            Mode::Evaluation => self.embedding.as_ref(),
            Mode::Training => None,
        }
    }
}

/// First order propagation of latent variances through `embedding.decode`
fn decoded_variance(
    embedding: &FittedSubspace,
    z: &Array2<f64>,
    var_z: &Array2<f64>,
) -> Array2<f64> {
    let mut var_y = Array2::zeros((z.nrows(), embedding.outcome_dim()));
    for k in 0..z.ncols() {
        let mut zp = z.clone();
        let mut zm = z.clone();
        zp.column_mut(k).mapv_inplace(|v| v + DECODE_JACOBIAN_STEP);
        zm.column_mut(k).mapv_inplace(|v| v - DECODE_JACOBIAN_STEP);
        let jac = (embedding.decode(zp.view()) - embedding.decode(zm.view()))
            / (2. * DECODE_JACOBIAN_STEP);
        let var_k = var_z.column(k).insert_axis(Axis(1));
        var_y = var_y + jac.mapv(|v| v * v) * &var_k;
    }
    var_y
}

impl OutcomeModel for ProjectedOutcomeModel {
    fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    fn outcome_dim(&self) -> usize {
        match self.decoder() {
            Some(embedding) => embedding.outcome_dim(),
            None => self.model.output_dim(),
        }
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let z = self.model.predict(&x)?;
        match self.decoder() {
            Some(embedding) => Ok(embedding.decode(z.view())),
            None => Ok(z),
        }
    }

    fn predict_var(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let var_z = self.model.predict_var(&x)?;
        match self.decoder() {
            Some(embedding) => {
                let z = self.model.predict(&x)?;
                Ok(decoded_variance(embedding, &z, &var_z))
            }
            None => Ok(var_z),
        }
    }

    /// Latent draw decoded to the outcome space
    fn sample(&self, x: ArrayView2<f64>, rng: &mut Xoshiro256Plus) -> Result<Array2<f64>> {
        let z = OutcomeModel::sample(&self.model, x, rng)?;
        match self.decoder() {
            Some(embedding) => Ok(embedding.decode(z.view())),
            None => Ok(z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeGpParams;
    use crate::pairwise::PairwiseGpParams;
    use approx::assert_abs_diff_eq;
    use linfa::ParamGuard;
    use lowrank_subspace::{Autoencoder, Projection};
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;

    fn axis_embedding() -> FittedSubspace {
        // keeps the first coordinate of 3D outcomes
        FittedSubspace::Linear(Projection::new(array![[1., 0., 0.]]).unwrap())
    }

    fn latent_utility() -> PairwiseGp {
        let z = Array::linspace(0., 1., 6).insert_axis(Axis(1));
        let comps = array![[1, 0], [2, 1], [3, 2], [4, 3], [5, 4]];
        PairwiseGpParams::new()
            .n_start(1)
            .check()
            .unwrap()
            .fit_comparisons(&z, &comps)
            .unwrap()
    }

    #[test]
    fn test_utility_wrapper_modes() {
        let gp = latent_utility();
        let mut wrapper =
            ProjectedUtilityModel::with_embedding(gp.clone(), &axis_embedding()).unwrap();
        assert_eq!(wrapper.mode(), Mode::Evaluation);
        assert_eq!(UtilityModel::input_dim(&wrapper), 3);

        let y = array![[0.2, 5., -1.], [0.8, -3., 2.]];
        let expected = gp.predict(&array![[0.2], [0.8]]).unwrap();
        let mean = wrapper.posterior_mean(y.view()).unwrap();
        assert_abs_diff_eq!(mean, expected, epsilon = 1e-12);

        wrapper.train();
        assert_eq!(UtilityModel::input_dim(&wrapper), 1);
        assert!(wrapper.posterior_mean(y.view()).is_err());
        let mean = wrapper.posterior_mean(array![[0.2], [0.8]].view()).unwrap();
        assert_abs_diff_eq!(mean, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_embedding_dimension_mismatch() {
        let gp = latent_utility();
        let mut wrapper = ProjectedUtilityModel::new(gp);
        let wide =
            FittedSubspace::Linear(Projection::new(array![[1., 0., 0.], [0., 1., 0.]]).unwrap());
        match wrapper.set_embedding(&wide) {
            Err(ModelError::InvalidConfigError(_)) => (),
            other => panic!("expected configuration error, got {other:?}"),
        }
        assert!(wrapper.embedding().is_none());

        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let wide_ae = Autoencoder::new(2, 3, &mut rng).unwrap().snapshot();
        assert!(wrapper.set_autoencoder(&wide_ae).is_err());
        let ae = Autoencoder::new(1, 3, &mut rng).unwrap().snapshot();
        wrapper.set_autoencoder(&ae).unwrap();
        assert!(matches!(wrapper.embedding(), Some(FittedSubspace::Encoded(_))));
    }

    #[test]
    fn test_outcome_wrapper_decodes() {
        let x = Array::linspace(0., 1., 8).insert_axis(Axis(1));
        let z = x.mapv(|v| 2. * v - 1.);
        let gp = OutcomeGpParams::new()
            .n_start(1)
            .check()
            .unwrap()
            .fit_outcomes(&x, &z)
            .unwrap();
        let embedding = FittedSubspace::Linear(Projection::new(array![[0.6, 0.8]]).unwrap());
        let mut wrapper = ProjectedOutcomeModel::with_embedding(gp, &embedding).unwrap();
        assert_eq!(wrapper.outcome_dim(), 2);

        let xtest = array![[0.25], [0.5]];
        let y = wrapper.predict(xtest.view()).unwrap();
        assert_abs_diff_eq!(y, array![[-0.3, -0.4], [0., 0.]], epsilon = 1e-2);

        let var_y = wrapper.predict_var(xtest.view()).unwrap();
        wrapper.train();
        let var_z = wrapper.predict_var(xtest.view()).unwrap();
        assert_abs_diff_eq!(var_y.column(0).to_owned(), &var_z.column(0) * 0.36, epsilon = 1e-8);
        assert_abs_diff_eq!(var_y.column(1).to_owned(), &var_z.column(0) * 0.64, epsilon = 1e-8);

        wrapper.eval();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let draw = wrapper.sample(xtest.view(), &mut rng).unwrap();
        // decoded draws stay on the embedding line
        assert_abs_diff_eq!(&draw.column(0) * 0.8, &draw.column(1) * 0.6, epsilon = 1e-10);
    }
}
