use approx::assert_abs_diff_eq;
use linfa::ParamGuard;
use lowrank_bope::diagnostics::{
    compute_grassmannian, compute_variance_explained_per_axis, pairwise_accuracy,
    subspace_recovery_error,
};
use lowrank_bope::{generate_principal_axes, make_comparisons};
use lowrank_subspace::{Embedding, Pca};
use ndarray::{s, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn correlated_outcomes(n: usize, seed: u64) -> Array2<f64> {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let axes = generate_principal_axes(8, 8, seed).unwrap();
    let scales = Array1::from_shape_fn(8, |i| 2f64.powi(-(i as i32)));
    let z = Array2::<f64>::random_using((n, 8), StandardNormal, &mut rng) * &scales;
    z.dot(&axes)
}

#[test]
fn test_recovery_error_of_orthonormal_axes_against_themselves() {
    let axes = generate_principal_axes(12, 3, 5).unwrap();
    assert_abs_diff_eq!(subspace_recovery_error(&axes, &axes).unwrap(), 0., epsilon = 1e-10);
}

#[test]
fn test_grassmannian_properties() {
    let a = generate_principal_axes(10, 3, 1).unwrap();
    let b = generate_principal_axes(10, 3, 2).unwrap();
    let ab = compute_grassmannian(&a, &b).unwrap().distance;
    let ba = compute_grassmannian(&b, &a).unwrap().distance;
    assert_abs_diff_eq!(ab, ba, epsilon = 1e-8);
    assert!((0. ..=1.).contains(&ab));
    assert_abs_diff_eq!(compute_grassmannian(&a, &a).unwrap().distance, 0., epsilon = 1e-6);

    let reversed = a.slice(s![..;-1, ..]).to_owned();
    assert_abs_diff_eq!(
        compute_grassmannian(&reversed, &b).unwrap().distance,
        ab,
        epsilon = 1e-8
    );
}

#[test]
fn test_variance_explained_per_axis_is_a_partial_distribution() {
    let y = correlated_outcomes(100, 3);
    let axes = generate_principal_axes(8, 3, 4).unwrap();
    let explained = compute_variance_explained_per_axis(&y, &axes).unwrap();
    assert_eq!(explained.len(), 3);
    assert!(explained.iter().all(|v| (0. ..=1.).contains(v)));
    assert!(explained.sum() <= 1. + 1e-10);
}

#[test]
fn test_pca_reconstruction_error_is_non_increasing_in_rank() {
    let y = correlated_outcomes(60, 6);
    let centered = &y - &y.mean_axis(Axis(0)).unwrap();
    let errors: Vec<f64> = (1..=8)
        .map(|k| {
            let pca = Pca::params().fixed_rank(k).check().unwrap().fit_outcomes(&y).unwrap();
            let projection = pca.projection();
            let reconstructed = projection.decode(projection.encode(centered.view()).view());
            (&centered - &reconstructed).mapv(|v| v * v).sum()
        })
        .collect();
    assert!(errors.windows(2).all(|w| w[1] <= w[0] + 1e-10));
    assert_abs_diff_eq!(errors[7], 0., epsilon = 1e-8);
}

#[test]
fn test_pairwise_accuracy_of_perfect_model() {
    let utils = Array1::linspace(0., 1., 10).mapv(|u: f64| (5. * u).sin());
    let mut rng = Xoshiro256Plus::seed_from_u64(0);
    let comps = make_comparisons(&utils, 0., &mut rng).unwrap();
    assert_eq!(pairwise_accuracy(&utils, &comps).unwrap(), 1.0);
}
