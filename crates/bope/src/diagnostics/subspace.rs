//! Quality of a learned subspace against the problem that generated the outcomes.
//!
//! Projections are `(num_axes, outcome_dim)` arrays whose rows are the axes `V`,
//! outcomes are projected with `V^T V`.
use crate::errors::{BopeError, Result};
use crate::problem::{generate_random_inputs, TestProblem, UtilityFunction};

use linfa_linalg::qr::QR;
use linfa_linalg::svd::SVD;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use rand_xoshiro::Xoshiro256Plus;
use std::f64::consts::FRAC_PI_2;

fn projector(projection: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
    projection.t().dot(projection)
}

fn orthogonal_projector(projection: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
    Array2::eye(projection.ncols()) - projector(projection)
}

fn check_outcome_dim(
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    outcome_dim: usize,
) -> Result<()> {
    if projection.ncols() != outcome_dim {
        return Err(BopeError::DimensionMismatchError {
            expected: outcome_dim,
            actual: projection.ncols(),
        });
    }
    Ok(())
}

/// `||(I - V^T V) A^T||_F^2 / k` where `A` holds the `k` true axes as rows.
///
/// 0 when the true axes lie in the learned subspace, 1 when they are orthogonal to it.
pub fn subspace_recovery_error(
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    true_axes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<f64> {
    check_outcome_dim(projection, true_axes.ncols())?;
    let latent_dim = true_axes.nrows();
    if latent_dim == 0 {
        return Ok(0.);
    }
    let lost = orthogonal_projector(projection).dot(&true_axes.t());
    Ok(lost.mapv(|v| v * v).sum() / latent_dim as f64)
}

/// Largest norm of the outcome components orthogonal to the subspace,
/// `max_i ||(I - V^T V) y_i||`
pub fn empirical_max_outcome_error(
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<f64> {
    check_outcome_dim(projection, y.ncols())?;
    let residuals = y.dot(&orthogonal_projector(projection));
    Ok(residuals
        .rows()
        .into_iter()
        .map(|r| r.dot(&r).sqrt())
        .fold(0., f64::max))
}

/// [`empirical_max_outcome_error`] on the true outcomes of `n_test` random designs
pub fn mc_max_outcome_error(
    problem: &dyn TestProblem,
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    n_test: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<f64> {
    let x = generate_random_inputs(problem, n_test, rng)?;
    let y = problem.evaluate_true(x.view());
    empirical_max_outcome_error(&y, projection)
}

/// Largest utility change when outcomes are replaced by their projections,
/// `max_i |g(y_i) - g(V^T V y_i)|`
pub fn empirical_max_util_error(
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    util: &dyn UtilityFunction,
) -> Result<f64> {
    check_outcome_dim(projection, y.ncols())?;
    let projected = y.dot(&projector(projection));
    let diff = util.utility(y.view()) - util.utility(projected.view());
    Ok(diff.iter().fold(0., |acc, d| acc.max(d.abs())))
}

/// [`empirical_max_util_error`] on the true outcomes of `n_test` random designs
pub fn mc_max_util_error(
    problem: &dyn TestProblem,
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    util: &dyn UtilityFunction,
    n_test: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<f64> {
    let x = generate_random_inputs(problem, n_test, rng)?;
    let y = problem.evaluate_true(x.view());
    empirical_max_util_error(&y, projection, util)
}

/// Max and mean utility of projected true outcomes of `n_test` random designs,
/// estimating the best and average utility reachable within the subspace
pub fn best_and_avg_util_in_subspace(
    problem: &dyn TestProblem,
    projection: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    util: &dyn UtilityFunction,
    n_test: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<(f64, f64)> {
    check_outcome_dim(projection, problem.outcome_dim())?;
    if n_test == 0 {
        return Err(BopeError::InvalidValueError(
            "at least one test point is needed".to_string(),
        ));
    }
    let x = generate_random_inputs(problem, n_test, rng)?;
    let y = problem.evaluate_true(x.view());
    let utils = util.utility(y.dot(&projector(projection)).view());
    let best = utils.fold(f64::NEG_INFINITY, |acc, &u| acc.max(u));
    Ok((best, utils.mean().unwrap_or(0.)))
}

/// Fraction of the total variance of `data` explained by each axis.
///
/// Axes are normalized first. Constant data gives zero fractions.
pub fn compute_variance_explained_per_axis(
    data: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    axes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<Array1<f64>> {
    check_outcome_dim(axes, data.ncols())?;
    if data.nrows() < 2 {
        return Ok(Array1::zeros(axes.nrows()));
    }
    let total_var = data.var_axis(Axis(0), 1.).sum();
    if total_var <= 0. {
        return Ok(Array1::zeros(axes.nrows()));
    }
    let axes = lowrank_subspace::row_normalize(axes);
    let scores = data.dot(&axes.t());
    Ok(scores.var_axis(Axis(0), 1.) / total_var)
}

/// Principal angles between two subspaces and their normalized Grassmannian distance
#[derive(Clone, Debug)]
pub struct Grassmannian {
    /// Cosines of the principal angles
    pub cosines: Array1<f64>,
    /// Principal angles in `[0, pi/2]`
    pub principal_angles: Array1<f64>,
    /// `sqrt(sum angles^2) / (sqrt(k) pi / 2)` in `[0, 1]`
    pub distance: f64,
}

fn principal_angles<'a>(
    subspace1: ArrayView2<'a, f64>,
    subspace2: ArrayView2<'a, f64>,
) -> Result<Grassmannian> {
    let k = subspace1.nrows().min(subspace2.nrows());
    if k == 0 {
        return Ok(Grassmannian {
            cosines: Array1::zeros(0),
            principal_angles: Array1::zeros(0),
            distance: 0.,
        });
    }
    // the larger span comes first so that the cosine matrix is tall
    let (wide, narrow) = if subspace1.nrows() >= subspace2.nrows() {
        (subspace1, subspace2)
    } else {
        (subspace2, subspace1)
    };
    let (q1, _) = wide.t().qr()?.into_decomp();
    let (q2, _) = narrow.t().qr()?.into_decomp();
    let (_, singular_values, _) = q1.t().dot(&q2).svd(false, false)?;
    let cosines = singular_values.mapv(|v| v.clamp(-1., 1.));
    let principal_angles = cosines.mapv(f64::acos);
    let distance =
        principal_angles.mapv(|a| a * a).sum().sqrt() / ((k as f64).sqrt() * FRAC_PI_2);
    Ok(Grassmannian {
        cosines,
        principal_angles,
        distance,
    })
}

/// Grassmannian distance between the spans of the rows of two matrices.
///
/// Only the first `k = min(k1, k2)` rows of each are compared. Zero rank
/// subspaces are at distance 0.
pub fn compute_grassmannian(
    subspace1: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    subspace2: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<Grassmannian> {
    check_outcome_dim(subspace2, subspace1.ncols())?;
    let k = subspace1.nrows().min(subspace2.nrows());
    principal_angles(subspace1.slice(s![..k, ..]), subspace2.slice(s![..k, ..]))
}

/// Grassmannian distance between the whole spans of the rows of two matrices.
///
/// The `min(k1, k2)` principal angles between the spans are used, so that a
/// subspace containing the other one is at distance 0 whatever its extra axes.
pub fn compute_span_grassmannian(
    subspace1: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    subspace2: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<Grassmannian> {
    check_outcome_dim(subspace2, subspace1.ncols())?;
    principal_angles(subspace1.view(), subspace2.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_principal_axes, LinearUtil, SyntheticProblem};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;

    #[test]
    fn test_recovery_error_of_itself_is_zero() {
        let v = generate_principal_axes(7, 3, 0).unwrap();
        assert_abs_diff_eq!(subspace_recovery_error(&v, &v).unwrap(), 0., epsilon = 1e-12);
        let w = generate_principal_axes(7, 7, 1).unwrap();
        assert_abs_diff_eq!(subspace_recovery_error(&w, &v).unwrap(), 0., epsilon = 1e-12);
        let empty = Array2::<f64>::zeros((0, 7));
        assert_abs_diff_eq!(subspace_recovery_error(&empty, &v).unwrap(), 1., epsilon = 1e-12);
    }

    #[test]
    fn test_recovery_error_orthogonal_axes() {
        let v = array![[1., 0., 0.]];
        let a = array![[0., 1., 0.], [1., 0., 0.]];
        assert_abs_diff_eq!(subspace_recovery_error(&v, &a).unwrap(), 0.5, epsilon = 1e-12);
        assert!(subspace_recovery_error(&v, &array![[1., 0.]]).is_err());
    }

    #[test]
    fn test_max_errors() {
        let v = array![[1., 0.]];
        let y = array![[1., 2.], [3., -4.]];
        assert_abs_diff_eq!(empirical_max_outcome_error(&y, &v).unwrap(), 4., epsilon = 1e-12);
        let util = LinearUtil::new(array![1., 1.]);
        let util_error = empirical_max_util_error(&y, &v, &util).unwrap();
        assert_abs_diff_eq!(util_error, 4., epsilon = 1e-12);
    }

    #[test]
    fn test_mc_errors_vanish_on_true_axes() {
        let axes = generate_principal_axes(6, 2, 5).unwrap();
        let problem = SyntheticProblem::builder(2, axes.clone()).build().unwrap();
        let util = LinearUtil::new(axes.row(0).to_owned());
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        assert_abs_diff_eq!(
            mc_max_outcome_error(&problem, &axes, 50, &mut rng).unwrap(),
            0.,
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(
            mc_max_util_error(&problem, &axes, &util, 50, &mut rng).unwrap(),
            0.,
            epsilon = 1e-10
        );
        let (best, avg) =
            best_and_avg_util_in_subspace(&problem, &axes, &util, 64, &mut rng).unwrap();
        assert!(best >= avg);
    }

    #[test]
    fn test_variance_explained() {
        let axes = generate_principal_axes(5, 5, 2).unwrap();
        let problem = SyntheticProblem::builder(1, axes.slice(s![..2, ..]).to_owned())
            .build()
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let x = generate_random_inputs(&problem, 40, &mut rng).unwrap();
        let y = problem.evaluate_true(x.view());
        let ratios = compute_variance_explained_per_axis(&y, &axes).unwrap();
        assert!(ratios.iter().all(|&r| (0. ..=1. + 1e-12).contains(&r)));
        assert_abs_diff_eq!(ratios.sum(), 1., epsilon = 1e-10);
        let partial = compute_variance_explained_per_axis(&y, &axes.slice(s![..1, ..])).unwrap();
        assert!(partial.sum() <= 1.);
        // unnormalized axes give the same fractions
        let scaled = compute_variance_explained_per_axis(&y, &(&axes * 3.)).unwrap();
        assert_abs_diff_eq!(scaled, ratios, epsilon = 1e-10);
    }

    #[test]
    fn test_grassmannian_properties() {
        let s1 = generate_principal_axes(8, 3, 0).unwrap();
        let s2 = generate_principal_axes(8, 3, 1).unwrap();
        let d12 = compute_grassmannian(&s1, &s2).unwrap().distance;
        let d21 = compute_grassmannian(&s2, &s1).unwrap().distance;
        assert_abs_diff_eq!(d12, d21, epsilon = 1e-10);
        assert!(d12 > 0. && d12 <= 1.);
        assert_abs_diff_eq!(compute_grassmannian(&s1, &s1).unwrap().distance, 0., epsilon = 1e-6);

        let reordered = ndarray::stack![Axis(0), s1.row(2), s1.row(0), s1.row(1)];
        assert_abs_diff_eq!(
            compute_grassmannian(&reordered, &s2).unwrap().distance,
            d12,
            epsilon = 1e-10
        );
        assert_abs_diff_eq!(
            compute_grassmannian(&reordered, &s1).unwrap().distance,
            0.,
            epsilon = 1e-6
        );

        let orthogonal = compute_grassmannian(&array![[1., 0.]], &array![[0., 1.]]).unwrap();
        assert_abs_diff_eq!(orthogonal.distance, 1., epsilon = 1e-12);
        let empty = Array2::<f64>::zeros((0, 8));
        assert_eq!(compute_grassmannian(&empty, &s1).unwrap().distance, 0.);
    }

    #[test]
    fn test_span_grassmannian_agrees_with_recovery_error() {
        let full = generate_principal_axes(6, 6, 3).unwrap();
        let truth = full.slice(s![..2, ..]).to_owned();

        // whole space and a larger subspace containing the truth after an extra axis
        let identity = Array2::<f64>::eye(6);
        let containing = ndarray::stack![Axis(0), full.row(4), full.row(1), full.row(0)];
        for learned in [&identity, &containing] {
            assert_abs_diff_eq!(
                subspace_recovery_error(learned, &truth).unwrap(),
                0.,
                epsilon = 1e-10
            );
            let span = compute_span_grassmannian(learned, &truth).unwrap();
            assert_eq!(span.principal_angles.len(), 2);
            assert_abs_diff_eq!(span.distance, 0., epsilon = 1e-6);
            let swapped = compute_span_grassmannian(&truth, learned).unwrap();
            assert_abs_diff_eq!(swapped.distance, span.distance, epsilon = 1e-10);
        }
        // truncation to the first rows misses the truth
        assert!(compute_grassmannian(&containing, &truth).unwrap().distance > 0.1);

        let complement = full.slice(s![2.., ..]).to_owned();
        assert_abs_diff_eq!(
            compute_span_grassmannian(&complement, &truth).unwrap().distance,
            1.,
            epsilon = 1e-10
        );

        let other = generate_principal_axes(6, 2, 4).unwrap();
        assert_abs_diff_eq!(
            compute_span_grassmannian(&other, &truth).unwrap().distance,
            compute_grassmannian(&other, &truth).unwrap().distance,
            epsilon = 1e-10
        );
        assert!(compute_span_grassmannian(&other, &array![[1., 0.]]).is_err());
    }
}
