//! Principal component analysis of outcome samples.
//!
//! Axes are the right singular vectors of the (optionally standardized) centered
//! sample, the retained rank is the smallest one whose cumulative explained
//! variance reaches the threshold.
use crate::errors::{Result, SubspaceError};
use crate::projection::Projection;
use crate::utils::NormalizedData;

use linfa::dataset::{DatasetBase, Records};
use linfa::traits::Fit;
use linfa::ParamGuard;
use linfa_linalg::svd::{SvdSort, SVD};
use log::debug;
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Default cumulative explained variance threshold
pub const PCA_VAR_THRESHOLD: f64 = 0.95;
/// Rounding tolerance on cumulative explained variance
const RANK_TOL: f64 = 1e-12;

/// Validated PCA parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcaValidParams {
    /// Cumulative explained variance to reach, values >= 1 keep every component
    pub(crate) var_threshold: f64,
    /// Whether outcomes are scaled to unit variance before decomposition
    pub(crate) standardize: bool,
    /// Fixed number of retained axes, overrides the threshold when set
    pub(crate) rank: Option<usize>,
}

impl Default for PcaValidParams {
    fn default() -> Self {
        PcaValidParams {
            var_threshold: PCA_VAR_THRESHOLD,
            standardize: false,
            rank: None,
        }
    }
}

impl PcaValidParams {
    /// Variance threshold
    pub fn var_threshold(&self) -> f64 {
        self.var_threshold
    }

    /// Standardization flag
    pub fn standardize(&self) -> bool {
        self.standardize
    }

    /// Fixed rank if any
    pub fn rank(&self) -> Option<usize> {
        self.rank
    }

    /// Fits the principal axes of the given (n, outcome_dim) outcomes
    pub fn fit_outcomes(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<PcaFit> {
        if y.nrows() == 0 || y.ncols() == 0 {
            return Err(SubspaceError::EmptyDataError);
        }
        let normalized = if self.standardize {
            NormalizedData::new(y)
        } else {
            NormalizedData::centered(y)
        };
        let (_, singular_values, vt) = normalized.data.svd(false, true)?.sort_svd_desc();
        let vt = vt.ok_or_else(|| {
            SubspaceError::InvalidValueError("missing right singular vectors".to_string())
        })?;

        let variances = singular_values.mapv(|v| v * v);
        let total = variances.sum();
        let explained = if total > 0. {
            variances / total
        } else {
            Array1::zeros(singular_values.len())
        };

        let k = match self.rank {
            Some(rank) => rank.min(singular_values.len()),
            None => select_rank(&explained, self.var_threshold),
        };
        debug!(
            "PCA on {:?} outcomes keeps {k} axes (explained ratios {explained:?})",
            y.dim()
        );
        let projection = Projection::new(vt.slice(s![..k, ..]).to_owned())?;

        Ok(PcaFit {
            projection,
            components: vt,
            explained_variance_ratio: explained,
            singular_values,
            mean: normalized.mean,
            scale: normalized.std,
        })
    }
}

/// PCA hyperparameters builder
#[derive(Clone, Debug, Default)]
pub struct PcaParams(PcaValidParams);

impl PcaParams {
    /// Default parameters: 0.95 threshold on centered outcomes
    pub fn new() -> Self {
        Self(PcaValidParams::default())
    }

    /// Set the cumulative explained variance threshold
    pub fn var_threshold(mut self, var_threshold: f64) -> Self {
        self.0.var_threshold = var_threshold;
        self
    }

    /// Set whether outcomes are standardized
    pub fn standardize(mut self, standardize: bool) -> Self {
        self.0.standardize = standardize;
        self
    }

    /// Set a fixed number of retained axes
    pub fn rank(mut self, rank: Option<usize>) -> Self {
        self.0.rank = rank;
        self
    }

    /// Retain exactly `k` axes whatever the explained variance
    pub fn fixed_rank(self, k: usize) -> Self {
        self.rank(Some(k))
    }
}

impl From<PcaValidParams> for PcaParams {
    fn from(valid: PcaValidParams) -> Self {
        PcaParams(valid)
    }
}

impl ParamGuard for PcaParams {
    type Checked = PcaValidParams;
    type Error = SubspaceError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let threshold = self.0.var_threshold;
        if !threshold.is_finite() || threshold <= 0. {
            return Err(SubspaceError::InvalidValueError(format!(
                "PCA variance threshold should be positive, got {threshold}"
            )));
        }
        if self.0.rank == Some(0) {
            return Err(SubspaceError::InvalidValueError(
                "PCA rank cannot be 0".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl<D: Data<Elem = f64>, T> Fit<ArrayBase<D, Ix2>, T, SubspaceError> for PcaValidParams
where
    ArrayBase<D, Ix2>: Records,
{
    type Object = PcaFit;

    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        self.fit_outcomes(dataset.records())
    }
}

/// PCA entry point
pub struct Pca;

impl Pca {
    /// PCA parameters builder
    pub fn params() -> PcaParams {
        PcaParams::new()
    }
}

/// Result of a PCA fit
#[derive(Clone, Debug)]
pub struct PcaFit {
    projection: Projection,
    components: Array2<f64>,
    explained_variance_ratio: Array1<f64>,
    singular_values: Array1<f64>,
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl PcaFit {
    /// Retained axes
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Consumes the fit keeping only the retained axes
    pub fn into_projection(self) -> Projection {
        self.projection
    }

    /// Every principal axis as rows, in decreasing variance order
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Explained variance ratio of every principal axis
    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }

    /// Singular values in decreasing order
    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    /// Scores of `y` on every principal axis, computed in the normalized space
    pub fn scores(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        ((y - &self.mean) / &self.scale).dot(&self.components.t())
    }
}

/// Smallest number of axes whose cumulative explained variance reaches `threshold`.
///
/// A threshold of at least one keeps every axis, null total variance keeps a single one.
pub fn select_rank(explained_ratio: &Array1<f64>, threshold: f64) -> usize {
    let n = explained_ratio.len();
    if threshold >= 1. {
        return n;
    }
    if explained_ratio.sum() <= 0. {
        return n.min(1);
    }
    let mut cumsum = 0.;
    for (i, ratio) in explained_ratio.iter().enumerate() {
        cumsum += ratio;
        if cumsum >= threshold - RANK_TOL {
            return i + 1;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::StandardNormal;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    fn rank2_outcomes(n: usize) -> (Array2<f64>, Array2<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let s = 1. / 2f64.sqrt();
        let axes = array![[s, s, 0., 0., 0.], [0., 0., 0.6, 0.8, 0.]];
        let scores = Array2::<f64>::random_using((n, 2), StandardNormal, &mut rng) * array![3., 1.];
        (scores.dot(&axes), axes)
    }

    #[test]
    fn test_select_rank() {
        let ratio = array![0.6, 0.3, 0.08, 0.02];
        assert_eq!(select_rank(&ratio, 0.5), 1);
        assert_eq!(select_rank(&ratio, 0.9), 2);
        assert_eq!(select_rank(&ratio, 0.95), 3);
        assert_eq!(select_rank(&ratio, 1.0), 4);
        assert_eq!(select_rank(&ratio, 1.5), 4);
        assert_eq!(select_rank(&array![0., 0.], 0.9), 1);
    }

    #[test]
    fn test_pca_recovers_rank2_subspace() {
        let (y, axes) = rank2_outcomes(100);
        let fit = Pca::params()
            .standardize(false)
            .fit(&DatasetBase::new(y, ()))
            .unwrap();
        assert_eq!(fit.projection().num_axes(), 2);
        assert!(fit.projection().is_orthonormal(1e-10));
        let true_proj = axes.t().dot(&axes);
        assert_abs_diff_eq!(fit.projection().projector(), true_proj, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.explained_variance_ratio().sum(), 1., epsilon = 1e-10);
    }

    #[test]
    fn test_full_rank_threshold() {
        let (y, _) = rank2_outcomes(3);
        let fit = Pca::params()
            .var_threshold(1.)
            .check()
            .unwrap()
            .fit_outcomes(&y)
            .unwrap();
        // min(n, d) axes
        assert_eq!(fit.projection().num_axes(), 3);
    }

    #[test]
    fn test_reconstruction_error_non_increasing_in_rank() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let y = Array2::<f64>::random_using((30, 6), StandardNormal, &mut rng);
        let centered = NormalizedData::centered(&y).data;
        let mut previous = f64::INFINITY;
        for k in 1..=6 {
            let fit = Pca::params()
                .standardize(false)
                .rank(Some(k))
                .check()
                .unwrap()
                .fit_outcomes(&y)
                .unwrap();
            let proj = fit.projection().projector();
            let err = (&centered - &centered.dot(&proj)).mapv(|v| v * v).sum();
            assert!(err <= previous + 1e-10);
            previous = err;
        }
        assert_abs_diff_eq!(previous, 0., epsilon = 1e-10);
    }

    #[test]
    fn test_invalid_params() {
        assert!(Pca::params().var_threshold(0.).check().is_err());
        assert!(Pca::params().rank(Some(0)).check().is_err());
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            PcaValidParams::default().fit_outcomes(&empty),
            Err(SubspaceError::EmptyDataError)
        ));
    }
}
