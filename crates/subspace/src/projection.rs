//! Linear projections of outcome vectors onto low-dimensional subspaces.
use crate::errors::{Result, SubspaceError};
use ndarray::{Array2, ArrayBase, ArrayView2, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Capability of mapping outcomes to a latent space and back.
///
/// Implemented by linear projections and by frozen autoencoders so that the
/// model wrappers do not care about the kind of subspace they are attached to.
pub trait Embedding: Send + Sync {
    /// Dimension of the outcome space
    fn outcome_dim(&self) -> usize;
    /// Dimension of the latent space
    fn latent_dim(&self) -> usize;
    /// Maps (n, outcome_dim) outcomes to (n, latent_dim) embeddings
    fn encode(&self, y: ArrayView2<f64>) -> Array2<f64>;
    /// Maps (n, latent_dim) embeddings back to (n, outcome_dim) outcomes
    fn decode(&self, z: ArrayView2<f64>) -> Array2<f64>;
}

/// A (num_axes, outcome_dim) matrix whose rows span the retained subspace.
///
/// Rows are orthonormal when coming from PCA, PCR or random linear projections,
/// they are only unit-norm when extracted from an autoencoder encoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    axes: Array2<f64>,
}

impl Projection {
    /// Builds a projection from its axes given as rows
    pub fn new(axes: Array2<f64>) -> Result<Self> {
        if axes.nrows() > axes.ncols() {
            return Err(SubspaceError::InvalidValueError(format!(
                "projection has more axes ({}) than outcome dimensions ({})",
                axes.nrows(),
                axes.ncols()
            )));
        }
        if axes.iter().any(|v| !v.is_finite()) {
            return Err(SubspaceError::InvalidValueError(
                "projection axes contain non finite values".to_string(),
            ));
        }
        Ok(Projection { axes })
    }

    /// The identity projection of a `dim`-dimensional outcome space
    pub fn identity(dim: usize) -> Self {
        Projection {
            axes: Array2::eye(dim),
        }
    }

    /// Projection axes as a (num_axes, outcome_dim) matrix
    pub fn axes(&self) -> &Array2<f64> {
        &self.axes
    }

    /// Number of retained axes
    pub fn num_axes(&self) -> usize {
        self.axes.nrows()
    }

    /// Outcome coordinates of `y` (n, outcome_dim) along the axes
    pub fn embed(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        y.dot(&self.axes.t())
    }

    /// Maps latent coordinates back to the outcome space
    pub fn reconstruct(&self, z: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        z.dot(&self.axes)
    }

    /// Orthogonal projector `V^T V` onto the subspace (exact for orthonormal rows)
    pub fn projector(&self) -> Array2<f64> {
        self.axes.t().dot(&self.axes)
    }

    /// Whether rows are orthonormal within `tol`
    pub fn is_orthonormal(&self, tol: f64) -> bool {
        let gram = self.axes.dot(&self.axes.t());
        gram.indexed_iter().all(|((i, j), v)| {
            let expected = if i == j { 1. } else { 0. };
            (v - expected).abs() <= tol
        })
    }
}

impl Embedding for Projection {
    fn outcome_dim(&self) -> usize {
        self.axes.ncols()
    }

    fn latent_dim(&self) -> usize {
        self.axes.nrows()
    }

    fn encode(&self, y: ArrayView2<f64>) -> Array2<f64> {
        self.embed(&y)
    }

    fn decode(&self, z: ArrayView2<f64>) -> Array2<f64> {
        self.reconstruct(&z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_embed_reconstruct() {
        let p = Projection::new(array![[1., 0., 0.], [0., 0., 1.]]).unwrap();
        let y = array![[1., 2., 3.], [4., 5., 6.]];
        let z = p.embed(&y);
        assert_abs_diff_eq!(z, array![[1., 3.], [4., 6.]]);
        assert_abs_diff_eq!(p.reconstruct(&z), array![[1., 0., 3.], [4., 0., 6.]]);
        assert!(p.is_orthonormal(1e-12));
        assert_eq!(p.latent_dim(), 2);
        assert_eq!(p.outcome_dim(), 3);
    }

    #[test]
    fn test_too_many_axes() {
        assert!(Projection::new(Array2::eye(3).slice(ndarray::s![.., ..2]).to_owned()).is_err());
    }

    #[test]
    fn test_projector_is_idempotent() {
        let s = 1. / 2f64.sqrt();
        let p = Projection::new(array![[s, s, 0.]]).unwrap();
        let proj = p.projector();
        assert_abs_diff_eq!(proj.dot(&proj), proj, epsilon = 1e-12);
    }
}
