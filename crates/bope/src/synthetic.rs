//! Synthetic problems whose outcomes vary along a few known axes.
//!
//! Each outcome vector is `sum_k s_k f_k(x) a_k` where the `a_k` are orthonormal
//! ground truth axes, the `s_k` scaling factors and the `f_k` smooth latent
//! functions drawn from a gaussian process prior through random Fourier features.
use crate::errors::{BopeError, Result};
use crate::problem::{TestProblem, UtilityFunction};

use lowrank_subspace::orthonormalize_rows;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of random Fourier features of each latent function
pub const RFF_N_FEATURES: usize = 256;

/// `num_axes` orthonormal axes of dimension `outcome_dim` drawn at random
pub fn generate_principal_axes(
    outcome_dim: usize,
    num_axes: usize,
    seed: u64,
) -> Result<Array2<f64>> {
    if num_axes > outcome_dim {
        return Err(BopeError::InvalidValueError(format!(
            "cannot draw {num_axes} orthonormal axes in dimension {outcome_dim}"
        )));
    }
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let raw = Array2::<f64>::random_using((num_axes, outcome_dim), StandardNormal, &mut rng);
    Ok(orthonormalize_rows(&raw)?)
}

/// Unit coefficients of a linear utility whose alignment with the span of the
/// first `latent_dim` axes of `full_axes` is controlled by `alpha`.
///
/// `alpha = 0` puts the coefficients in that span, `alpha = 1` in its orthogonal
/// complement (spanned by the remaining axes). `full_axes` is expected to hold an
/// orthonormal basis of the outcome space.
pub fn make_controlled_coeffs(
    full_axes: &Array2<f64>,
    latent_dim: usize,
    alpha: f64,
    rng: &mut Xoshiro256Plus,
) -> Result<Array1<f64>> {
    let n_axes = full_axes.nrows();
    if !(0. ..=1.).contains(&alpha) {
        return Err(BopeError::InvalidValueError(format!(
            "alpha should be in [0, 1], got {alpha}"
        )));
    }
    if latent_dim == 0 || latent_dim > n_axes {
        return Err(BopeError::InvalidValueError(format!(
            "latent dim should be in [1, {n_axes}], got {latent_dim}"
        )));
    }
    if latent_dim == n_axes && alpha > 0. {
        return Err(BopeError::InvalidValueError(
            "no orthogonal complement to put coefficients in".to_string(),
        ));
    }
    let within = random_unit_combination(&full_axes.slice(s![..latent_dim, ..]), rng);
    let beta = if latent_dim < n_axes {
        let outside = random_unit_combination(&full_axes.slice(s![latent_dim.., ..]), rng);
        within * (1. - alpha).sqrt() + outside * alpha.sqrt()
    } else {
        within
    };
    Ok(beta)
}

fn random_unit_combination(axes: &ArrayView2<f64>, rng: &mut Xoshiro256Plus) -> Array1<f64> {
    let weights = Array1::<f64>::random_using(axes.nrows(), StandardNormal, rng);
    let v = weights.dot(axes);
    let norm = v.dot(&v).sqrt();
    if norm > 0. {
        v / norm
    } else {
        v
    }
}

/// Linear utility `g(y) = beta . y`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearUtil {
    beta: Array1<f64>,
}

impl LinearUtil {
    /// Constructor
    pub fn new(beta: Array1<f64>) -> Self {
        LinearUtil { beta }
    }

    /// Utility coefficients
    pub fn beta(&self) -> &Array1<f64> {
        &self.beta
    }
}

impl UtilityFunction for LinearUtil {
    fn utility(&self, y: ArrayView2<f64>) -> Array1<f64> {
        y.dot(&self.beta)
    }
}

/// A smooth function sampled from a squared exponential gaussian process prior
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LatentFunction {
    frequencies: Array2<f64>,
    phases: Array1<f64>,
    weights: Array1<f64>,
}

impl LatentFunction {
    fn sample(input_dim: usize, lengthscale: f64, rng: &mut Xoshiro256Plus) -> Self {
        let shape = (RFF_N_FEATURES, input_dim);
        let frequencies = Array2::<f64>::random_using(shape, StandardNormal, rng) / lengthscale;
        let phases = Array1::random_using(RFF_N_FEATURES, Uniform::new(0., 2. * PI), rng);
        let weights = Array1::<f64>::random_using(RFF_N_FEATURES, StandardNormal, rng)
            * (2. / RFF_N_FEATURES as f64).sqrt();
        LatentFunction {
            frequencies,
            phases,
            weights,
        }
    }

    fn eval(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let mut features = x.dot(&self.frequencies.t());
        features += &self.phases.view().insert_axis(Axis(0));
        features.mapv_inplace(f64::cos);
        features.dot(&self.weights)
    }
}

/// Builder of [`SyntheticProblem`]
#[derive(Clone, Debug)]
pub struct SyntheticProblemBuilder {
    input_dim: usize,
    true_axes: Array2<f64>,
    lengthscales: Vec<f64>,
    scaling_factors: Vec<f64>,
    noise_std: f64,
    seed: u64,
}

impl SyntheticProblemBuilder {
    /// Latent function lengthscales, one per axis
    pub fn lengthscales(mut self, lengthscales: &[f64]) -> Self {
        self.lengthscales = lengthscales.to_vec();
        self
    }

    /// Latent function amplitudes, one per axis
    pub fn scaling_factors(mut self, scaling_factors: &[f64]) -> Self {
        self.scaling_factors = scaling_factors.to_vec();
        self
    }

    /// Observation noise standard deviation
    pub fn noise_std(mut self, noise_std: f64) -> Self {
        self.noise_std = noise_std;
        self
    }

    /// Seed of the latent functions
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Samples the latent functions
    pub fn build(self) -> Result<SyntheticProblem> {
        let rank = self.true_axes.nrows();
        if self.input_dim == 0 || rank == 0 {
            return Err(BopeError::InvalidConfigError(
                "synthetic problem needs a positive input dim and at least one axis".to_string(),
            ));
        }
        if self.lengthscales.len() != rank || self.scaling_factors.len() != rank {
            return Err(BopeError::DimensionMismatchError {
                expected: rank,
                actual: if self.lengthscales.len() != rank {
                    self.lengthscales.len()
                } else {
                    self.scaling_factors.len()
                },
            });
        }
        if self.lengthscales.iter().any(|&l| l <= 0.) || self.noise_std < 0. {
            return Err(BopeError::InvalidConfigError(
                "lengthscales should be positive and noise std non negative".to_string(),
            ));
        }
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let latents = self
            .lengthscales
            .iter()
            .map(|&l| LatentFunction::sample(self.input_dim, l, &mut rng))
            .collect();
        Ok(SyntheticProblem {
            input_dim: self.input_dim,
            true_axes: self.true_axes,
            scaling_factors: Array1::from(self.scaling_factors),
            latents,
            noise_std: self.noise_std,
        })
    }
}

/// A problem on `[0, 1]^input_dim` whose outcomes lie in the span of known axes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyntheticProblem {
    input_dim: usize,
    true_axes: Array2<f64>,
    scaling_factors: Array1<f64>,
    latents: Vec<LatentFunction>,
    noise_std: f64,
}

impl SyntheticProblem {
    /// Builder of a problem varying along the rows of `true_axes`, with unit
    /// scaling factors, lengthscales of 0.5 and no noise by default
    pub fn builder(input_dim: usize, true_axes: Array2<f64>) -> SyntheticProblemBuilder {
        let rank = true_axes.nrows();
        SyntheticProblemBuilder {
            input_dim,
            true_axes,
            lengthscales: vec![0.5; rank],
            scaling_factors: vec![1.; rank],
            noise_std: 0.,
            seed: 0,
        }
    }

    /// Latent function values, one column per axis
    pub fn latent_values(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut z = Array2::zeros((x.nrows(), self.latents.len()));
        let scaled = self.latents.iter().zip(self.scaling_factors.iter());
        for (k, (latent, scale)) in scaled.enumerate() {
            z.column_mut(k).assign(&(latent.eval(&x) * *scale));
        }
        z
    }
}

impl TestProblem for SyntheticProblem {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn outcome_dim(&self) -> usize {
        self.true_axes.ncols()
    }

    fn bounds(&self) -> Array2<f64> {
        let mut bounds = Array2::zeros((self.input_dim, 2));
        bounds.column_mut(1).fill(1.);
        bounds
    }

    fn evaluate_true(&self, x: ArrayView2<f64>) -> Array2<f64> {
        self.latent_values(x).dot(&self.true_axes)
    }

    fn noise_std(&self) -> f64 {
        self.noise_std
    }

    fn true_axes(&self) -> Option<Array2<f64>> {
        Some(self.true_axes.clone())
    }
}
