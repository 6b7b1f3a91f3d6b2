use crate::errors::Result;

use ndarray::{Array1, Array2, ArrayView2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

/// A model of the latent utility of outcome vectors learnt from pairwise comparisons
pub trait UtilityModel: Send + Sync {
    /// Dimension of the points the model is evaluated on
    fn input_dim(&self) -> usize;

    /// Posterior mean of the utility at `(n, input_dim)` points
    fn posterior_mean(&self, y: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Posterior variance of the utility at `(n, input_dim)` points
    fn posterior_var(&self, y: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Joint posterior mean and covariance of the utility at `(n, input_dim)` points
    fn posterior(&self, y: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)>;
}

/// A model of the outcome vectors produced by design inputs
pub trait OutcomeModel: Send + Sync {
    /// Input dimension
    fn input_dim(&self) -> usize;

    /// Outcome dimension
    fn outcome_dim(&self) -> usize;

    /// Posterior mean outcomes at `(n, input_dim)` inputs as a `(n, outcome_dim)` array
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// Posterior variance of each outcome at `(n, input_dim)` inputs
    fn predict_var(&self, x: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// One draw of the outcomes from the marginal posterior at each input
    fn sample(&self, x: ArrayView2<f64>, rng: &mut Xoshiro256Plus) -> Result<Array2<f64>> {
        let mean = self.predict(x)?;
        let std = self.predict_var(x)?.mapv(|v| v.max(0.).sqrt());
        let eps = Array2::<f64>::random_using(mean.dim(), StandardNormal, rng);
        Ok(mean + eps * std)
    }
}
