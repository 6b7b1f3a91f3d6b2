//! Principal component regression: principal axes filtered by their relevance
//! for the observed preferences.
//!
//! Outcomes are decomposed with PCA keeping every axis, then a ridge regression
//! of the preference signal on the principal scores ranks the axes. Axes whose
//! effect `|coef| * std(score)` reaches `coef_ratio` times the largest effect
//! are kept.
use crate::errors::{Result, SubspaceError};
use crate::pca::PcaValidParams;
use crate::projection::Projection;
use crate::utils::column_std;

use linfa::ParamGuard;
use linfa_linalg::cholesky::SolveC;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// Default ratio of the largest axis effect an axis must reach to be kept
pub const PCR_COEF_RATIO: f64 = 0.1;
/// Default ridge penalty
pub const PCR_RIDGE: f64 = 1e-6;

/// Validated PCR parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcrValidParams {
    pub(crate) standardize: bool,
    pub(crate) coef_ratio: f64,
    pub(crate) ridge: f64,
    pub(crate) rank: Option<usize>,
}

impl Default for PcrValidParams {
    fn default() -> Self {
        PcrValidParams {
            standardize: false,
            coef_ratio: PCR_COEF_RATIO,
            ridge: PCR_RIDGE,
            rank: None,
        }
    }
}

/// PCR hyperparameters builder
#[derive(Clone, Debug, Default)]
pub struct PcrParams(PcrValidParams);

impl PcrParams {
    /// Default parameters
    pub fn new() -> Self {
        Self(PcrValidParams::default())
    }

    /// Set whether outcomes are standardized before PCA
    pub fn standardize(mut self, standardize: bool) -> Self {
        self.0.standardize = standardize;
        self
    }

    /// Set the relative effect threshold in `(0, 1]`
    pub fn coef_ratio(mut self, coef_ratio: f64) -> Self {
        self.0.coef_ratio = coef_ratio;
        self
    }

    /// Set the ridge penalty of the regression
    pub fn ridge(mut self, ridge: f64) -> Self {
        self.0.ridge = ridge;
        self
    }

    /// Keep exactly the `rank` most relevant axes instead of thresholding
    pub fn rank(mut self, rank: Option<usize>) -> Self {
        self.0.rank = rank;
        self
    }
}

impl ParamGuard for PcrParams {
    type Checked = PcrValidParams;
    type Error = SubspaceError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let ratio = self.0.coef_ratio;
        if !(ratio > 0. && ratio <= 1.) {
            return Err(SubspaceError::InvalidValueError(format!(
                "PCR coefficient ratio should be in (0, 1], got {ratio}"
            )));
        }
        if !(self.0.ridge >= 0.) {
            return Err(SubspaceError::InvalidValueError(format!(
                "PCR ridge penalty should be non negative, got {}",
                self.0.ridge
            )));
        }
        if self.0.rank == Some(0) {
            return Err(SubspaceError::InvalidValueError(
                "PCR rank cannot be 0".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// PCR entry point
pub struct Pcr;

impl Pcr {
    /// PCR parameters builder
    pub fn params() -> PcrParams {
        PcrParams::new()
    }
}

/// Result of a PCR fit
#[derive(Clone, Debug)]
pub struct PcrFit {
    projection: Projection,
    coefficients: Array1<f64>,
    effects: Array1<f64>,
    selected: Vec<usize>,
}

impl PcrFit {
    /// Retained axes ordered by decreasing effect
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Consumes the fit keeping only the retained axes
    pub fn into_projection(self) -> Projection {
        self.projection
    }

    /// Regression coefficient of every principal axis
    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Effect `|coef| * std(score)` of every principal axis
    pub fn effects(&self) -> &Array1<f64> {
        &self.effects
    }

    /// Indices of the retained principal axes
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }
}

impl PcrValidParams {
    /// Fits PCR from outcomes and pairwise comparisons given as `[winner, loser]` rows.
    ///
    /// Each comparison contributes the score difference `winner - loser` regressed on a
    /// unit target.
    pub fn fit_comparisons(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        comps: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    ) -> Result<PcrFit> {
        let n = y.nrows();
        if comps.ncols() != 2 {
            return Err(SubspaceError::InvalidValueError(format!(
                "comparisons should be [winner, loser] rows, got {} columns",
                comps.ncols()
            )));
        }
        if comps.nrows() == 0 {
            return Err(SubspaceError::EmptyDataError);
        }
        if let Some(bad) = comps.iter().find(|&&i| i >= n) {
            return Err(SubspaceError::InvalidValueError(format!(
                "comparison index {bad} out of range for {n} outcomes"
            )));
        }
        self.fit_with(y, |scores| {
            let winners = scores.select(Axis(0), &comps.column(0).to_vec());
            let losers = scores.select(Axis(0), &comps.column(1).to_vec());
            (winners - losers, Array1::ones(comps.nrows()))
        })
    }

    /// Fits PCR from outcomes and utility values observed at each outcome
    pub fn fit_values(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        values: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<PcrFit> {
        if values.len() != y.nrows() {
            return Err(SubspaceError::DimensionMismatchError {
                expected: y.nrows(),
                actual: values.len(),
            });
        }
        let centered = values - values.mean().unwrap_or(0.);
        self.fit_with(y, |scores| {
            let mean = scores
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(scores.ncols()));
            (scores - &mean, centered.clone())
        })
    }

    fn fit_with<F>(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>, design: F) -> Result<PcrFit>
    where
        F: Fn(&Array2<f64>) -> (Array2<f64>, Array1<f64>),
    {
        let pca = PcaValidParams {
            var_threshold: 1.,
            standardize: self.standardize,
            rank: None,
        }
        .fit_outcomes(y)?;
        let scores = pca.scores(y);
        let (features, target) = design(&scores);

        let p = features.ncols();
        let mut gram = features.t().dot(&features) + Array2::<f64>::eye(p) * self.ridge.max(1e-12);
        let rhs = features.t().dot(&target).insert_axis(Axis(1));
        let coefficients = gram.solvec(&rhs)?.remove_axis(Axis(1));

        let effects = &coefficients.mapv(f64::abs) * &column_std(&scores);
        let mut order: Vec<usize> = (0..p).collect();
        order.sort_by(|&a, &b| effects[b].total_cmp(&effects[a]));

        let selected: Vec<usize> = match self.rank {
            Some(rank) => order.into_iter().take(rank).collect(),
            None => {
                let max = effects.iter().cloned().fold(0., f64::max);
                order
                    .into_iter()
                    .filter(|&i| max > 0. && effects[i] >= self.coef_ratio * max)
                    .collect()
            }
        };
        let selected = if selected.is_empty() {
            vec![0]
        } else {
            selected
        };
        debug!("PCR keeps principal axes {selected:?} with effects {effects:?}");

        let axes = pca.components().select(Axis(0), &selected);
        Ok(PcrFit {
            projection: Projection::new(axes)?,
            coefficients,
            effects,
            selected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::StandardNormal;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_pcr_keeps_utility_relevant_axis() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        // large variance along e0, utility only driven by e1
        let scores = Array2::<f64>::random_using((60, 3), StandardNormal, &mut rng)
            * array![5., 1., 0.5];
        let y = scores.clone();
        let util = y.column(1).to_owned();

        let fit = Pcr::params()
            .coef_ratio(0.5)
            .check()
            .unwrap()
            .fit_values(&y, &util)
            .unwrap();
        assert_eq!(fit.projection().num_axes(), 1);
        let axis = fit.projection().axes().row(0).mapv(f64::abs);
        assert_abs_diff_eq!(axis, array![0., 1., 0.], epsilon = 0.1);
    }

    #[test]
    fn test_pcr_from_comparisons() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let y = Array2::<f64>::random_using((200, 4), StandardNormal, &mut rng)
            * array![4., 2., 1., 0.5];
        let util = y.column(2).to_owned();
        let comps: Vec<usize> = (0..100)
            .flat_map(|i| {
                let (a, b) = (2 * i, 2 * i + 1);
                if util[a] >= util[b] {
                    [a, b]
                } else {
                    [b, a]
                }
            })
            .collect();
        let comps = Array2::from_shape_vec((100, 2), comps).unwrap();
        let fit = Pcr::params()
            .rank(Some(1))
            .check()
            .unwrap()
            .fit_comparisons(&y, &comps)
            .unwrap();
        let axis = fit.projection().axes().row(0).mapv(f64::abs);
        assert!(axis[2] > 0.9);
        assert_eq!(fit.selected().len(), 1);
    }

    #[test]
    fn test_pcr_invalid_comparisons() {
        let y = Array2::<f64>::zeros((4, 2));
        let params = PcrValidParams::default();
        assert!(params.fit_comparisons(&y, &array![[0usize, 7]]).is_err());
        assert!(params
            .fit_comparisons(&y, &Array2::<usize>::zeros((0, 2)))
            .is_err());
        assert!(Pcr::params().coef_ratio(0.).check().is_err());
    }
}
