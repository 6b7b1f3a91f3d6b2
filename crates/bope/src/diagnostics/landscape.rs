//! Empirical statistics of a scalar function over a bounded domain.
use crate::errors::{BopeError, Result};

use lowrank_doe::{Lhs, Random, SamplingMethod};
use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_rand::rand::Rng;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// Max number of batches drawn when rejecting samples violating constraints
pub const MAX_REJECTION_ROUNDS: usize = 100;

/// Default quantile levels of [`get_function_statistics`]
pub const DEFAULT_QUANTILES: [f64; 3] = [0.25, 0.5, 0.75];

/// Linear inequality `sum_i x[indices[i]] * coefficients[i] >= rhs`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearConstraint {
    /// Constrained input indices
    pub indices: Vec<usize>,
    /// Coefficients of the constrained inputs
    pub coefficients: Vec<f64>,
    /// Lower bound of the combination
    pub rhs: f64,
}

impl LinearConstraint {
    /// Constructor
    pub fn new(indices: Vec<usize>, coefficients: Vec<f64>, rhs: f64) -> Result<Self> {
        if indices.len() != coefficients.len() {
            return Err(BopeError::DimensionMismatchError {
                expected: indices.len(),
                actual: coefficients.len(),
            });
        }
        Ok(LinearConstraint {
            indices,
            coefficients,
            rhs,
        })
    }

    /// Whether `x` satisfies the constraint
    pub fn is_satisfied(&self, x: &ArrayView1<f64>) -> bool {
        let lhs: f64 = self
            .indices
            .iter()
            .zip(self.coefficients.iter())
            .map(|(&i, c)| x[i] * c)
            .sum();
        lhs >= self.rhs
    }
}

/// Summary of sampled function values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionStatistics {
    /// Mean
    pub mean: f64,
    /// Unbiased standard deviation
    pub sd: f64,
    /// Minimum
    pub min: f64,
    /// Maximum
    pub max: f64,
    /// Nearest rank quantiles at the requested levels
    pub quantiles: Vec<f64>,
}

/// Outer function of a landscape, evaluated on `(n, d)` points
pub type LandscapeFn<'a> = dyn Fn(ArrayView2<f64>) -> Result<Array1<f64>> + 'a;
/// Optional inner function mapping sampled inputs to the outer function domain
pub type InnerFn<'a> = dyn Fn(ArrayView2<f64>) -> Result<Array2<f64>> + 'a;

fn sample_feasible(
    bounds: &Array2<f64>,
    constraints: &[LinearConstraint],
    n_samples: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<Array2<f64>> {
    if let Some(bad) = constraints
        .iter()
        .find(|c| c.indices.iter().any(|&i| i >= bounds.nrows()))
    {
        return Err(BopeError::InvalidValueError(format!(
            "constraint indices {:?} out of {} inputs",
            bad.indices,
            bounds.nrows()
        )));
    }
    if constraints.is_empty() {
        return Ok(Lhs::new(bounds)?.seed(rng.gen()).sample(n_samples));
    }
    let mut samples = Array2::zeros((0, bounds.nrows()));
    for _ in 0..MAX_REJECTION_ROUNDS {
        let batch = Random::new(bounds)?.seed(rng.gen()).sample(n_samples);
        let feasible: Vec<usize> = batch
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, x)| constraints.iter().all(|c| c.is_satisfied(x)))
            .map(|(i, _)| i)
            .collect();
        let needed = n_samples - samples.nrows();
        let kept = batch.select(Axis(0), &feasible[..feasible.len().min(needed)]);
        samples = concatenate![Axis(0), samples.view(), kept.view()];
        if samples.nrows() == n_samples {
            return Ok(samples);
        }
    }
    Err(BopeError::InvalidValueError(format!(
        "only {} of {n_samples} samples satisfy the constraints after {} rounds",
        samples.nrows(),
        MAX_REJECTION_ROUNDS
    )))
}

/// Statistics of `function` over `n_samples` points sampled within `bounds`,
/// a `(d, 2)` array of `[lower, upper]` rows.
///
/// Points are Latin hypercube samples, or uniform samples satisfying every
/// constraint when some are given. When `inner` is given, `function` is
/// evaluated on `inner` of the samples.
pub fn get_function_statistics(
    function: &LandscapeFn,
    bounds: &Array2<f64>,
    inner: Option<&InnerFn>,
    constraints: &[LinearConstraint],
    n_samples: usize,
    quantiles: &[f64],
    rng: &mut Xoshiro256Plus,
) -> Result<FunctionStatistics> {
    if n_samples == 0 {
        return Err(BopeError::InvalidValueError(
            "at least one sample is needed".to_string(),
        ));
    }
    if let Some(q) = quantiles.iter().find(|q| !(0. ..=1.).contains(*q)) {
        return Err(BopeError::InvalidValueError(format!(
            "quantile levels should be in [0, 1], got {q}"
        )));
    }
    let samples = sample_feasible(bounds, constraints, n_samples, rng)?;
    let values = match inner {
        Some(inner) => function(inner(samples.view())?.view())?,
        None => function(samples.view())?,
    };
    if values.len() != n_samples {
        return Err(BopeError::DimensionMismatchError {
            expected: n_samples,
            actual: values.len(),
        });
    }
    let min = *values
        .min()
        .map_err(|e| BopeError::NumericalInstabilityError(e.to_string()))?;
    let max = *values
        .max()
        .map_err(|e| BopeError::NumericalInstabilityError(e.to_string()))?;
    if !(min.is_finite() && max.is_finite()) {
        return Err(BopeError::NumericalInstabilityError(
            "function values are not finite".to_string(),
        ));
    }
    let mean = values.mean().unwrap_or(0.);
    let sd = if n_samples > 1 { values.std(1.) } else { 0. };

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let quantiles = quantiles
        .iter()
        .map(|q| sorted[(q * (n_samples - 1) as f64).round() as usize])
        .collect();
    Ok(FunctionStatistics {
        mean,
        sd,
        min,
        max,
        quantiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;

    fn sum_of_inputs(x: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(x.sum_axis(Axis(1)))
    }

    #[test]
    fn test_statistics_of_identity() {
        let bounds = array![[0., 1.]];
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let stats = get_function_statistics(
            &sum_of_inputs,
            &bounds,
            None,
            &[],
            1001,
            &DEFAULT_QUANTILES,
            &mut rng,
        )
        .unwrap();
        assert_abs_diff_eq!(stats.mean, 0.5, epsilon = 1e-2);
        assert_abs_diff_eq!(stats.sd, (1f64 / 12.).sqrt(), epsilon = 1e-2);
        assert!(stats.min >= 0. && stats.max <= 1.);
        assert_eq!(stats.quantiles.len(), 3);
        assert!(stats.quantiles.windows(2).all(|w| w[0] <= w[1]));
        assert_abs_diff_eq!(stats.quantiles[1], 0.5, epsilon = 1e-2);
    }

    #[test]
    fn test_constraints_and_inner_function() {
        let bounds = array![[0., 1.], [0., 1.]];
        let constraint = LinearConstraint::new(vec![0, 1], vec![1., 1.], 1.).unwrap();
        let double = |x: ArrayView2<f64>| -> Result<Array2<f64>> { Ok(x.to_owned() * 2.) };
        let inner: &InnerFn = &double;
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let stats = get_function_statistics(
            &sum_of_inputs,
            &bounds,
            Some(inner),
            &[constraint],
            200,
            &[0.],
            &mut rng,
        )
        .unwrap();
        assert!(stats.min >= 2.);
        assert_abs_diff_eq!(stats.quantiles[0], stats.min, epsilon = 1e-15);

        let infeasible = LinearConstraint::new(vec![0], vec![1.], 2.).unwrap();
        assert!(get_function_statistics(
            &sum_of_inputs,
            &bounds,
            None,
            &[infeasible],
            10,
            &[0.5],
            &mut rng
        )
        .is_err());
        assert!(LinearConstraint::new(vec![0, 1], vec![1.], 0.).is_err());
    }
}
