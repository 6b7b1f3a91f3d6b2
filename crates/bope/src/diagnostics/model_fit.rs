//! Goodness of fit of outcome and utility models on held-out designs.
use crate::data::{gen_initial_real_data, make_comparisons, validate_adjacent_pairs};
use crate::errors::{BopeError, Result};
use crate::problem::{generate_random_inputs, TestProblem, UtilityFunction};

use log::debug;
use lowrank_models::{OutcomeModel, UtilityModel};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::collections::BTreeMap;

fn check_finite_predictions<'a>(
    what: &str,
    values: impl IntoIterator<Item = &'a f64>,
) -> Result<()> {
    if values.into_iter().any(|v| !v.is_finite()) {
        return Err(BopeError::NumericalInstabilityError(format!(
            "{what} predictions contain non finite values"
        )));
    }
    Ok(())
}

/// Generalized `1 - R2` of the outcome model on `n_test` random designs,
/// `sum ||y_hat - y||^2 / sum ||y - y_mean||^2`.
///
/// When the true outcomes do not vary the squared error sum is returned as is.
pub fn check_outcome_model_fit(
    model: &dyn OutcomeModel,
    problem: &dyn TestProblem,
    n_test: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<f64> {
    if n_test == 0 {
        return Err(BopeError::InvalidValueError(
            "at least one test point is needed".to_string(),
        ));
    }
    let x = generate_random_inputs(problem, n_test, rng)?;
    let y = problem.evaluate_true(x.view());
    let pred = model.predict(x.view())?;
    if pred.dim() != y.dim() {
        return Err(BopeError::DimensionMismatchError {
            expected: y.ncols(),
            actual: pred.ncols(),
        });
    }
    check_finite_predictions("outcome model", pred.iter())?;
    let sse = (&pred - &y).mapv(|v| v * v).sum();
    let mean = y.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(y.ncols()));
    let sst = (&y - &mean.insert_axis(Axis(0))).mapv(|v| v * v).sum();
    if sst > 0. {
        Ok(sse / sst)
    } else {
        Ok(sse)
    }
}

/// Options of [`check_util_model_fit`]
#[derive(Clone, Debug)]
pub struct UtilFitOptions {
    /// `(latent_dim, outcome_dim)` projection applied to outcomes before evaluating
    /// a model trained on embeddings
    pub projection: Option<Array2<f64>>,
    /// Kendall's tau when true, adjacent pairs accuracy otherwise
    pub kendall_tau: bool,
    /// Fraction of the test outcomes with the highest utilities kept, in `(0, 1]`
    pub top_quantile: f64,
}

impl Default for UtilFitOptions {
    fn default() -> Self {
        UtilFitOptions {
            projection: None,
            kendall_tau: true,
            top_quantile: 1.,
        }
    }
}

/// Agreement between the utility model posterior mean and the true utility of the
/// true outcomes of `n_test` random designs (rounded up to an even number).
///
/// With `top_quantile < 1` only the best outcomes are kept and compared
/// in consecutive pairs of the utility ranking.
pub fn check_util_model_fit(
    model: &dyn UtilityModel,
    problem: &dyn TestProblem,
    util: &dyn UtilityFunction,
    n_test: usize,
    options: &UtilFitOptions,
    rng: &mut Xoshiro256Plus,
) -> Result<f64> {
    if !(options.top_quantile > 0. && options.top_quantile <= 1.) {
        return Err(BopeError::InvalidValueError(format!(
            "top quantile should be in (0, 1], got {}",
            options.top_quantile
        )));
    }
    let n_test = (n_test.max(2) + 1) / 2 * 2;
    let (_, mut y, mut comps) = gen_initial_real_data(n_test, problem, util, 0., rng)?;
    let mut utils = util.utility(y.view());

    if options.top_quantile < 1. {
        let mut n_select = (n_test as f64 * options.top_quantile) as usize;
        n_select = (n_select + n_select % 2).clamp(2, n_test);
        let mut order: Vec<usize> = (0..n_test).collect();
        order.sort_by(|&a, &b| utils[b].total_cmp(&utils[a]));
        order.truncate(n_select);
        y = y.select(Axis(0), &order);
        utils = utils.select(Axis(0), &order);
        comps = make_comparisons(&utils, 0., rng)?;
    }

    let mean = match &options.projection {
        Some(projection) => model.posterior_mean(y.dot(&projection.t()).view())?,
        None => model.posterior_mean(y.view())?,
    };
    check_finite_predictions("utility model", mean.iter())?;
    if options.kendall_tau {
        Ok(kendall_tau(&mean.to_vec(), &utils.to_vec()))
    } else {
        pairwise_accuracy(&mean, &comps)
    }
}

/// [`check_util_model_fit`] of several models with Kendall's tau, every model
/// being tested on the same designs drawn from `seed`
pub fn check_util_model_fit_many(
    models: &[(&str, &dyn UtilityModel)],
    problem: &dyn TestProblem,
    util: &dyn UtilityFunction,
    n_test: usize,
    seed: u64,
) -> Result<BTreeMap<String, f64>> {
    let options = UtilFitOptions::default();
    let mut accuracies = BTreeMap::new();
    for (name, model) in models {
        debug!("Checking fit of utility model {name}");
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let acc = check_util_model_fit(*model, problem, util, n_test, &options, &mut rng)?;
        accuracies.insert(name.to_string(), acc);
    }
    Ok(accuracies)
}

/// Agreement between the true utilities of `n_test` random designs (rounded up to
/// an even number) and the utility model evaluated on the outcome model posterior
/// mean at those designs
pub fn check_overall_fit(
    outcome_model: &dyn OutcomeModel,
    util_model: &dyn UtilityModel,
    problem: &dyn TestProblem,
    util: &dyn UtilityFunction,
    n_test: usize,
    kendall_tau_score: bool,
    rng: &mut Xoshiro256Plus,
) -> Result<f64> {
    let n_test = (n_test.max(2) + 1) / 2 * 2;
    let (x, y, comps) = gen_initial_real_data(n_test, problem, util, 0., rng)?;
    let utils = util.utility(y.view());
    let predicted_y = outcome_model.predict(x.view())?;
    let mean = util_model.posterior_mean(predicted_y.view())?;
    check_finite_predictions("overall model", mean.iter())?;
    if kendall_tau_score {
        Ok(kendall_tau(&mean.to_vec(), &utils.to_vec()))
    } else {
        pairwise_accuracy(&mean, &comps)
    }
}

/// Kendall's tau-b rank correlation, 0 when undefined
pub fn kendall_tau(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n != y.len() || n < 2 {
        return 0.;
    }
    let (mut concordant, mut discordant, mut ties_x, mut ties_y) = (0f64, 0f64, 0f64, 0f64);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0. && dy == 0. {
                continue;
            } else if dx == 0. {
                ties_x += 1.;
            } else if dy == 0. {
                ties_y += 1.;
            } else if (dx > 0.) == (dy > 0.) {
                concordant += 1.;
            } else {
                discordant += 1.;
            }
        }
    }
    let denom = ((concordant + discordant + ties_x) * (concordant + discordant + ties_y)).sqrt();
    if denom == 0. {
        0.
    } else {
        (concordant - discordant) / denom
    }
}

/// Fraction of comparisons whose winner gets the highest predicted utility.
///
/// Comparison `i` must be between items `2i` and `2i+1` of `predicted`.
pub fn pairwise_accuracy(
    predicted: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
) -> Result<f64> {
    validate_adjacent_pairs(comparisons, predicted.len())?;
    if comparisons.nrows() == 0 {
        return Ok(0.);
    }
    let correct = comparisons
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(i, row)| {
            let pred_diff = predicted[2 * i] - predicted[2 * i + 1];
            let comp_diff = row[0] as f64 - row[1] as f64;
            pred_diff * comp_diff < 0.
        })
        .count();
    Ok(correct as f64 / comparisons.nrows() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_principal_axes, LinearUtil, SyntheticProblem};
    use approx::assert_abs_diff_eq;
    use lowrank_models::Result as ModelResult;
    use ndarray::{array, ArrayView2};

    /// Utility model whose posterior mean is the true utility
    struct Oracle(LinearUtil, usize);

    impl UtilityModel for Oracle {
        fn input_dim(&self) -> usize {
            self.1
        }

        fn posterior_mean(&self, y: ArrayView2<f64>) -> ModelResult<Array1<f64>> {
            Ok(self.0.utility(y))
        }

        fn posterior_var(&self, y: ArrayView2<f64>) -> ModelResult<Array1<f64>> {
            Ok(Array1::zeros(y.nrows()))
        }

        fn posterior(&self, y: ArrayView2<f64>) -> ModelResult<(Array1<f64>, Array2<f64>)> {
            Ok((self.0.utility(y), Array2::zeros((y.nrows(), y.nrows()))))
        }
    }

    /// Outcome model predicting the true outcomes
    struct PerfectOutcomes(SyntheticProblem);

    impl OutcomeModel for PerfectOutcomes {
        fn input_dim(&self) -> usize {
            self.0.input_dim()
        }

        fn outcome_dim(&self) -> usize {
            self.0.outcome_dim()
        }

        fn predict(&self, x: ArrayView2<f64>) -> ModelResult<Array2<f64>> {
            Ok(self.0.evaluate_true(x))
        }

        fn predict_var(&self, x: ArrayView2<f64>) -> ModelResult<Array2<f64>> {
            Ok(Array2::zeros((x.nrows(), self.0.outcome_dim())))
        }
    }

    fn setup() -> (SyntheticProblem, LinearUtil) {
        let axes = generate_principal_axes(6, 2, 0).unwrap();
        let problem = SyntheticProblem::builder(1, axes.clone()).seed(1).build().unwrap();
        let util = LinearUtil::new(&axes.row(0) + &axes.row(1));
        (problem, util)
    }

    #[test]
    fn test_kendall_tau() {
        assert_abs_diff_eq!(kendall_tau(&[1., 2., 3.], &[10., 20., 30.]), 1., epsilon = 1e-12);
        assert_abs_diff_eq!(kendall_tau(&[1., 2., 3.], &[3., 2., 1.]), -1., epsilon = 1e-12);
        assert_eq!(kendall_tau(&[1.], &[1.]), 0.);
        assert_eq!(kendall_tau(&[1., 1.], &[1., 1.]), 0.);
    }

    #[test]
    fn test_pairwise_accuracy() {
        let predicted = array![1., 0., 0., 1.];
        assert_eq!(pairwise_accuracy(&predicted, &array![[0, 1], [3, 2]]).unwrap(), 1.);
        assert_eq!(pairwise_accuracy(&predicted, &array![[1, 0], [3, 2]]).unwrap(), 0.5);
        assert!(pairwise_accuracy(&predicted, &array![[0, 2], [1, 3]]).is_err());
    }

    #[test]
    fn test_perfect_util_model_accuracy_is_one() {
        let (problem, util) = setup();
        let oracle = Oracle(util.clone(), 6);
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let options = UtilFitOptions {
            kendall_tau: false,
            ..Default::default()
        };
        let acc = check_util_model_fit(&oracle, &problem, &util, 100, &options, &mut rng).unwrap();
        assert_eq!(acc, 1.);

        let top = UtilFitOptions {
            kendall_tau: false,
            top_quantile: 0.3,
            ..Default::default()
        };
        let acc = check_util_model_fit(&oracle, &problem, &util, 100, &top, &mut rng).unwrap();
        assert_eq!(acc, 1.);

        let options = UtilFitOptions::default();
        let tau = check_util_model_fit(&oracle, &problem, &util, 51, &options, &mut rng).unwrap();
        assert_abs_diff_eq!(tau, 1., epsilon = 1e-12);

        let models: [(&str, &dyn UtilityModel); 1] = [("oracle", &oracle)];
        let many = check_util_model_fit_many(&models, &problem, &util, 20, 0).unwrap();
        assert_abs_diff_eq!(many["oracle"], 1., epsilon = 1e-12);
    }

    #[test]
    fn test_perfect_outcome_model() {
        let (problem, util) = setup();
        let model = PerfectOutcomes(problem.clone());
        let mut rng = Xoshiro256Plus::seed_from_u64(4);
        let err = check_outcome_model_fit(&model, &problem, 30, &mut rng).unwrap();
        assert_abs_diff_eq!(err, 0., epsilon = 1e-12);

        let oracle = Oracle(util.clone(), 6);
        let acc = check_overall_fit(&model, &oracle, &problem, &util, 30, false, &mut rng).unwrap();
        assert_eq!(acc, 1.);
    }
}
