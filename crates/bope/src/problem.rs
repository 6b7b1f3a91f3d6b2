//! Interfaces of the black boxes driven by an experiment.
use crate::errors::Result;

use lowrank_doe::{Random, SamplingMethod};
use ndarray::{Array1, Array2, ArrayView2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

/// A design problem mapping `(n, input_dim)` inputs to `(n, outcome_dim)` outcomes
pub trait TestProblem: Send + Sync {
    /// Input dimension
    fn input_dim(&self) -> usize;

    /// Outcome dimension
    fn outcome_dim(&self) -> usize;

    /// Input bounds as a `(input_dim, 2)` array of `[lower, upper]` rows
    fn bounds(&self) -> Array2<f64>;

    /// Noise free outcomes, deterministic given `x`
    fn evaluate_true(&self, x: ArrayView2<f64>) -> Array2<f64>;

    /// Standard deviation of the observation noise
    fn noise_std(&self) -> f64 {
        0.
    }

    /// Ground truth axes of the outcome subspace when known
    fn true_axes(&self) -> Option<Array2<f64>> {
        None
    }

    /// Observed outcomes: true outcomes with additive gaussian noise
    fn evaluate(&self, x: ArrayView2<f64>, rng: &mut Xoshiro256Plus) -> Array2<f64> {
        let y = self.evaluate_true(x);
        let noise_std = self.noise_std();
        if noise_std > 0. {
            let eps = Array2::<f64>::random_using(y.dim(), StandardNormal, rng);
            y + eps * noise_std
        } else {
            y
        }
    }
}

/// Ground truth utility of outcomes
pub trait UtilityFunction: Send + Sync {
    /// Utility of each `(n, outcome_dim)` outcome row
    fn utility(&self, y: ArrayView2<f64>) -> Array1<f64>;
}

/// `n` inputs drawn uniformly within problem bounds
pub fn generate_random_inputs(
    problem: &dyn TestProblem,
    n: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<Array2<f64>> {
    let doe = Random::new(&problem.bounds())?.seed(rng.gen());
    Ok(doe.sample(n))
}
