//! Data-independent baseline subspaces.
use crate::errors::{Result, SubspaceError};
use crate::projection::Projection;
use crate::utils::orthonormalize_rows;

use ndarray::Array2;
use ndarray_rand::rand::seq::index::sample;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;

fn check_dims(latent_dim: usize, outcome_dim: usize) -> Result<()> {
    if latent_dim == 0 || latent_dim > outcome_dim {
        return Err(SubspaceError::InvalidValueError(format!(
            "latent dimension should be in [1, {outcome_dim}], got {latent_dim}"
        )));
    }
    Ok(())
}

/// Gaussian random matrix with orthonormalized rows
pub fn random_linear_projection<R: Rng>(
    latent_dim: usize,
    outcome_dim: usize,
    rng: &mut R,
) -> Result<Projection> {
    check_dims(latent_dim, outcome_dim)?;
    let gaussian = Array2::<f64>::random_using((latent_dim, outcome_dim), StandardNormal, rng);
    Projection::new(orthonormalize_rows(&gaussian)?)
}

/// Projection onto `latent_dim` distinct outcome coordinates drawn at random
pub fn random_subset_projection<R: Rng>(
    latent_dim: usize,
    outcome_dim: usize,
    rng: &mut R,
) -> Result<Projection> {
    check_dims(latent_dim, outcome_dim)?;
    let mut axes = Array2::zeros((latent_dim, outcome_dim));
    for (row, col) in sample(rng, outcome_dim, latent_dim).into_iter().enumerate() {
        axes[[row, col]] = 1.;
    }
    Projection::new(axes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_random_linear_is_orthonormal() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let p = random_linear_projection(3, 10, &mut rng).unwrap();
        assert_eq!(p.axes().dim(), (3, 10));
        assert!(p.is_orthonormal(1e-10));
    }

    #[test]
    fn test_random_subset_picks_coordinates() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let p = random_subset_projection(4, 6, &mut rng).unwrap();
        assert!(p.is_orthonormal(0.));
        assert_abs_diff_eq!(p.axes().sum(), 4.);
        for col in p.axes().columns() {
            assert!(col.sum() <= 1.);
        }
    }

    #[test]
    fn test_invalid_latent_dim() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        assert!(random_linear_projection(0, 3, &mut rng).is_err());
        assert!(random_subset_projection(4, 3, &mut rng).is_err());
    }
}
