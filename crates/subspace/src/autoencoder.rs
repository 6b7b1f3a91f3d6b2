//! Single hidden layer autoencoder for outcome vectors.
//!
//! The encoder is linear `z = W_e y + b_e`, the decoder applies a sigmoid to a
//! linear map, rescaled to the outcome range: `y_hat = lower + span * sigmoid(W_d z + b_d)`.
//! Gradients are computed analytically and parameters are handled as one flat
//! vector `[W_e, b_e, W_d, b_d]` (row-major) so that they can be optimized with
//! [`Adam`] together with downstream model hyperparameters.
use crate::adam::Adam;
use crate::errors::{Result, SubspaceError};
use crate::projection::{Embedding, Projection};
use crate::utils::row_normalize;

use log::info;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

/// Epoch period of training progress logs
pub const AE_LOG_EVERY: usize = 100;
/// Relative widening of the observed outcome range used as decoder output range
pub const AE_OUTPUT_MARGIN: f64 = 0.1;

/// Autoencoder training settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// Dimension of the latent space
    pub latent_dim: usize,
    /// Number of reconstruction-only training epochs
    pub pretrain_epochs: usize,
    /// Adam learning rate
    pub lr: f64,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        AutoencoderConfig {
            latent_dim: 2,
            pretrain_epochs: 200,
            lr: 1e-3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Encoder {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

impl Encoder {
    fn forward(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        y.dot(&self.weights.t()) + &self.bias
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Decoder {
    weights: Array2<f64>,
    bias: Array1<f64>,
    lower: Array1<f64>,
    span: Array1<f64>,
}

impl Decoder {
    /// Returns sigmoid activations and rescaled outputs
    fn forward(&self, z: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> (Array2<f64>, Array2<f64>) {
        let act = (z.dot(&self.weights.t()) + &self.bias).mapv(sigmoid);
        let out = &act * &self.span + &self.lower;
        (act, out)
    }
}

fn sigmoid(v: f64) -> f64 {
    1. / (1. + (-v).exp())
}

/// Trainable autoencoder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Autoencoder {
    encoder: Encoder,
    decoder: Decoder,
}

impl Autoencoder {
    /// Randomly initialized autoencoder, weights and biases drawn uniformly in
    /// `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`, decoder outputs in `[0, 1]`.
    pub fn new<R: Rng>(latent_dim: usize, outcome_dim: usize, rng: &mut R) -> Result<Self> {
        if latent_dim == 0 || outcome_dim == 0 {
            return Err(SubspaceError::InvalidValueError(format!(
                "autoencoder dimensions should be positive, got {latent_dim} x {outcome_dim}"
            )));
        }
        let enc_bound = 1. / (outcome_dim as f64).sqrt();
        let dec_bound = 1. / (latent_dim as f64).sqrt();
        let enc = Uniform::new_inclusive(-enc_bound, enc_bound);
        let dec = Uniform::new_inclusive(-dec_bound, dec_bound);
        Ok(Autoencoder {
            encoder: Encoder {
                weights: Array2::random_using((latent_dim, outcome_dim), enc, rng),
                bias: Array1::random_using(latent_dim, enc, rng),
            },
            decoder: Decoder {
                weights: Array2::random_using((outcome_dim, latent_dim), dec, rng),
                bias: Array1::random_using(outcome_dim, dec, rng),
                lower: Array1::zeros(outcome_dim),
                span: Array1::ones(outcome_dim),
            },
        })
    }

    /// Autoencoder with output range fitted on `y` and pretrained on it
    /// as specified by `config`
    pub fn pretrained<R: Rng>(
        config: &AutoencoderConfig,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        rng: &mut R,
    ) -> Result<Self> {
        let mut ae = Autoencoder::new(config.latent_dim, y.ncols(), rng)?
            .fit_output_range(y, AE_OUTPUT_MARGIN)?;
        ae.pretrain(y, config.pretrain_epochs, config.lr)?;
        Ok(ae)
    }

    /// Sets the decoder output range to the observed outcome range widened by `margin`
    /// times its width on each side. Constant outcomes get a unit span.
    pub fn fit_output_range(
        mut self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        margin: f64,
    ) -> Result<Self> {
        self.check_outcomes(y)?;
        if y.nrows() == 0 {
            return Err(SubspaceError::EmptyDataError);
        }
        for (j, col) in y.axis_iter(Axis(1)).enumerate() {
            let lo = col.fold(f64::INFINITY, |a, &b| a.min(b));
            let hi = col.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
            let width = hi - lo;
            if width > 0. {
                self.decoder.lower[j] = lo - margin * width;
                self.decoder.span[j] = width * (1. + 2. * margin);
            } else {
                self.decoder.lower[j] = lo - 0.5;
                self.decoder.span[j] = 1.;
            }
        }
        Ok(self)
    }

    /// Latent dimension
    pub fn latent_dim(&self) -> usize {
        self.encoder.weights.nrows()
    }

    /// Outcome dimension
    pub fn outcome_dim(&self) -> usize {
        self.encoder.weights.ncols()
    }

    fn check_outcomes(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<()> {
        if y.ncols() != self.outcome_dim() {
            return Err(SubspaceError::DimensionMismatchError {
                expected: self.outcome_dim(),
                actual: y.ncols(),
            });
        }
        Ok(())
    }

    /// Latent embeddings of outcomes
    pub fn encode(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        self.encoder.forward(y)
    }

    /// Decoded outcomes from latent embeddings
    pub fn decode(&self, z: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        self.decoder.forward(z).1
    }

    /// Reconstructed outcomes
    pub fn forward(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        self.decode(&self.encode(y))
    }

    /// Number of trainable parameters
    pub fn n_params(&self) -> usize {
        let (k, d) = self.encoder.weights.dim();
        2 * k * d + k + d
    }

    /// Trainable parameters as a flat vector `[W_e, b_e, W_d, b_d]`
    pub fn params(&self) -> Array1<f64> {
        let mut flat = Vec::with_capacity(self.n_params());
        flat.extend(self.encoder.weights.iter());
        flat.extend(self.encoder.bias.iter());
        flat.extend(self.decoder.weights.iter());
        flat.extend(self.decoder.bias.iter());
        Array1::from(flat)
    }

    /// Sets trainable parameters from a flat vector laid out as [`Autoencoder::params`]
    pub fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        if params.len() != self.n_params() {
            return Err(SubspaceError::DimensionMismatchError {
                expected: self.n_params(),
                actual: params.len(),
            });
        }
        if params.iter().any(|v| !v.is_finite()) {
            return Err(SubspaceError::InvalidValueError(
                "autoencoder parameters are not finite".to_string(),
            ));
        }
        let (k, d) = self.encoder.weights.dim();
        let mut offset = 0;
        let mut take = |len: usize| {
            let part = params.slice(s![offset..offset + len]).to_vec();
            offset += len;
            part
        };
        self.encoder.weights = Array2::from_shape_vec((k, d), take(k * d))
            .map_err(linfa_linalg::LinalgError::from)?;
        self.encoder.bias = Array1::from(take(k));
        self.decoder.weights = Array2::from_shape_vec((d, k), take(d * k))
            .map_err(linfa_linalg::LinalgError::from)?;
        self.decoder.bias = Array1::from(take(d));
        Ok(())
    }

    /// Reconstruction loss `scale * sum((y - y_hat)^2)`
    pub fn reconstruction_loss(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        scale: f64,
    ) -> f64 {
        scale * (&self.forward(y) - y).mapv(|v| v * v).sum()
    }

    /// Reconstruction loss and its gradient with regard to the flat parameters
    pub fn reconstruction_grads(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        scale: f64,
    ) -> (f64, Array1<f64>) {
        let z = self.encoder.forward(y);
        let (act, y_hat) = self.decoder.forward(&z);
        let resid = y_hat - y;
        let loss = scale * resid.mapv(|v| v * v).sum();

        let d_act = resid * (2. * scale) * &self.decoder.span;
        let d_pre = d_act * &act.mapv(|a| a * (1. - a));
        let d_wd = d_pre.t().dot(&z);
        let d_bd = d_pre.sum_axis(Axis(0));
        let d_z = d_pre.dot(&self.decoder.weights);
        let d_we = d_z.t().dot(y);
        let d_be = d_z.sum_axis(Axis(0));

        let mut flat = Vec::with_capacity(self.n_params());
        flat.extend(d_we.iter());
        flat.extend(d_be.iter());
        flat.extend(d_wd.iter());
        flat.extend(d_bd.iter());
        (loss, Array1::from(flat))
    }

    /// Gradient with regard to the flat parameters of a loss whose gradient with
    /// regard to the embeddings `z = encode(y)` is `d_z`. Decoder entries are zero.
    pub fn encoder_grads(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        d_z: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Array1<f64> {
        let d_we = d_z.t().dot(y);
        let d_be = d_z.sum_axis(Axis(0));
        let mut flat = Vec::with_capacity(self.n_params());
        flat.extend(d_we.iter());
        flat.extend(d_be.iter());
        flat.resize(self.n_params(), 0.);
        Array1::from(flat)
    }

    /// Trains on reconstruction loss only (sum of squares), returns the loss history
    pub fn pretrain(
        &mut self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        epochs: usize,
        lr: f64,
    ) -> Result<Vec<f64>> {
        self.check_outcomes(y)?;
        let mut adam = Adam::new(self.n_params(), lr);
        let mut params = self.params();
        let mut history = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let (loss, grad) = self.reconstruction_grads(y, 1.);
            if epoch % AE_LOG_EVERY == 0 {
                info!("Pre-train autoencoder epoch {epoch}: loss = {loss}");
            }
            history.push(loss);
            adam.step(&mut params, &grad);
            self.set_params(&params)?;
        }
        Ok(history)
    }

    /// Unit-norm rows of the encoder weights
    pub fn encoder_projection(&self) -> Result<Projection> {
        Projection::new(row_normalize(&self.encoder.weights))
    }

    /// Deep copy that can no longer be trained
    pub fn snapshot(&self) -> FrozenAutoencoder {
        FrozenAutoencoder { inner: self.clone() }
    }
}

/// Immutable autoencoder used to embed outcomes once training is over
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrozenAutoencoder {
    inner: Autoencoder,
}

impl FrozenAutoencoder {
    /// Unit-norm rows of the encoder weights
    pub fn encoder_projection(&self) -> Result<Projection> {
        self.inner.encoder_projection()
    }

    /// Trainable deep copy, the frozen weights are left untouched
    pub fn thaw(&self) -> Autoencoder {
        self.inner.clone()
    }
}

impl Embedding for FrozenAutoencoder {
    fn outcome_dim(&self) -> usize {
        self.inner.outcome_dim()
    }

    fn latent_dim(&self) -> usize {
        self.inner.latent_dim()
    }

    fn encode(&self, y: ArrayView2<f64>) -> Array2<f64> {
        self.inner.encode(&y)
    }

    fn decode(&self, z: ArrayView2<f64>) -> Array2<f64> {
        self.inner.decode(&z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn line_outcomes() -> Array2<f64> {
        let t = Array::linspace(-1., 1., 30).insert_axis(Axis(1));
        let dir = array![[0.3, -0.2, 0.1, 0.25]];
        t.dot(&dir) + 0.5
    }

    #[test]
    fn test_params_round_trip() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mut ae = Autoencoder::new(2, 5, &mut rng).unwrap();
        assert_eq!(ae.n_params(), 2 * 5 * 2 + 2 + 5);
        let p = ae.params().mapv(|v| v + 0.1);
        ae.set_params(&p).unwrap();
        assert_abs_diff_eq!(ae.params(), p);
        assert!(ae.set_params(&Array1::zeros(3)).is_err());
    }

    #[test]
    fn test_reconstruction_grads_match_finite_differences() {
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let y = line_outcomes();
        let ae = Autoencoder::new(2, 4, &mut rng)
            .unwrap()
            .fit_output_range(&y, 0.1)
            .unwrap();
        let (loss, grad) = ae.reconstruction_grads(&y, 0.25);
        assert_abs_diff_eq!(loss, ae.reconstruction_loss(&y, 0.25), epsilon = 1e-12);

        let f = |p: &Vec<f64>| {
            let mut other = ae.clone();
            other.set_params(&Array1::from(p.clone())).unwrap();
            other.reconstruction_loss(&y, 0.25)
        };
        let fd = ae.params().to_vec().central_diff(&f);
        assert_abs_diff_eq!(grad, Array1::from(fd), epsilon = 1e-5);
    }

    #[test]
    fn test_encoder_grads_chain_rule() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let y = line_outcomes();
        let ae = Autoencoder::new(1, 4, &mut rng).unwrap();
        // loss = sum(z), so d_z is a matrix of ones
        let d_z = Array2::ones((y.nrows(), 1));
        let grad = ae.encoder_grads(&y, &d_z);
        let f = |p: &Vec<f64>| {
            let mut other = ae.clone();
            other.set_params(&Array1::from(p.clone())).unwrap();
            other.encode(&y).sum()
        };
        let fd = ae.params().to_vec().central_diff(&f);
        assert_abs_diff_eq!(grad, Array1::from(fd), epsilon = 1e-6);
    }

    #[test]
    fn test_pretrain_reduces_loss() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let y = line_outcomes();
        let mut ae = Autoencoder::new(1, 4, &mut rng)
            .unwrap()
            .fit_output_range(&y, 0.1)
            .unwrap();
        let history = ae.pretrain(&y, 1500, 0.05).unwrap();
        assert_eq!(history.len(), 1500);
        assert!(ae.reconstruction_loss(&y, 1.) < 0.5 * history[0]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let y = line_outcomes();
        let mut ae = Autoencoder::new(1, 4, &mut rng).unwrap();
        let frozen = ae.snapshot();
        let before = frozen.encode(y.view());
        ae.pretrain(&y, 10, 0.1).unwrap();
        assert_abs_diff_eq!(frozen.encode(y.view()), before);
        assert_eq!(frozen.latent_dim(), 1);
        let proj = frozen.encoder_projection().unwrap();
        assert_abs_diff_eq!(proj.axes().row(0).dot(&proj.axes().row(0)), 1., epsilon = 1e-12);
    }

    #[test]
    fn test_thawed_copy_resumes_from_frozen_weights() {
        let mut rng = Xoshiro256Plus::seed_from_u64(6);
        let y = line_outcomes();
        let frozen = Autoencoder::pretrained(
            &AutoencoderConfig {
                latent_dim: 1,
                pretrain_epochs: 50,
                lr: 0.05,
            },
            &y,
            &mut rng,
        )
        .unwrap()
        .snapshot();
        let mut thawed = frozen.thaw();
        assert_abs_diff_eq!(thawed.params(), frozen.thaw().params());
        assert_abs_diff_eq!(thawed.encode(&y), frozen.encode(y.view()));

        let before = frozen.encode(y.view());
        thawed.pretrain(&y, 10, 0.1).unwrap();
        assert_abs_diff_eq!(frozen.encode(y.view()), before);
        let moved = (thawed.params() - frozen.thaw().params()).mapv(f64::abs).sum();
        assert!(moved > 0.);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let mut ae = Autoencoder::new(1, 4, &mut rng).unwrap();
        assert!(ae.pretrain(&Array2::zeros((3, 2)), 1, 0.1).is_err());
    }
}
