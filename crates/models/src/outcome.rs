//! Kriging model of vector outcomes.
//!
//! Each outcome component is modeled by an independent Gaussian process with a
//! constant mean and a squared exponential correlation with one weight per input
//! component. Inputs are standardized once for all components and each output
//! column is standardized on its own. Correlation weights are optimized on the
//! reduced likelihood in which the mean and the process variance are concentrated out.
use crate::errors::{ModelError, Result};
use crate::kernel::squared_exponential;
use crate::optimization::{
    cobyla_budget, multistart_minimize, prepare_multistart, GP_COBYLA_MAX_EVAL, GP_OPTIM_N_START,
};
use crate::traits::OutcomeModel;
use crate::utils::check_finite;

use linfa::prelude::{DatasetBase, Fit};
use linfa::ParamGuard;
use linfa_linalg::{cholesky::*, qr::*, triangular::*};
use log::debug;
use lowrank_subspace::NormalizedData;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default initial correlation weight
pub const OUTCOME_THETA_INIT: f64 = 1e-1;
/// Default correlation weight bounds
pub const OUTCOME_THETA_BOUNDS: (f64, f64) = (1e-2, 1e2);
/// Default diagonal regularization of the correlation matrix
pub const OUTCOME_NUGGET: f64 = 1e-6;

/// A set of validated outcome model parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutcomeGpValidParams {
    /// Initial guess of the correlation weights
    pub(crate) theta_init: f64,
    /// Bounds (lower, upper) of the correlation weights
    pub(crate) theta_bounds: (f64, f64),
    /// Number of internal likelihood optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
    /// Parameter to improve numerical stability
    pub(crate) nugget: f64,
}

impl Default for OutcomeGpValidParams {
    fn default() -> Self {
        OutcomeGpValidParams {
            theta_init: OUTCOME_THETA_INIT,
            theta_bounds: OUTCOME_THETA_BOUNDS,
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            nugget: OUTCOME_NUGGET,
        }
    }
}

impl OutcomeGpValidParams {
    /// Get initial correlation weight
    pub fn theta_init(&self) -> f64 {
        self.theta_init
    }

    /// Get correlation weight bounds
    pub fn theta_bounds(&self) -> (f64, f64) {
        self.theta_bounds
    }

    /// Get number of multistart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get max number of likelihood evaluations
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get nugget
    pub fn nugget(&self) -> f64 {
        self.nugget
    }

    /// Fits one process per column of `y` given `x` inputs
    pub fn fit_outcomes(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<OutcomeGp> {
        if x.nrows() != y.nrows() {
            return Err(ModelError::DimensionMismatchError {
                expected: x.nrows(),
                actual: y.nrows(),
            });
        }
        if x.nrows() < 2 || x.ncols() == 0 || y.ncols() == 0 {
            return Err(ModelError::InvalidConfigError(format!(
                "outcome model needs at least 2 non empty training points, got x {:?} y {:?}",
                x.dim(),
                y.dim()
            )));
        }
        check_finite("outcome training data", y)?;
        let xt_norm = NormalizedData::new(x);
        let y = y.to_owned();
        let columns = (0..y.ncols())
            .into_par_iter()
            .map(|j| self.fit_column(&xt_norm, y.column(j)))
            .collect::<Result<Vec<_>>>()?;
        Ok(OutcomeGp {
            columns,
            xt_norm,
            params: self.clone(),
            training_data: (x.to_owned(), y),
        })
    }

    fn fit_column(&self, xt_norm: &NormalizedData, y: ArrayView1<f64>) -> Result<ColumnGp> {
        let yt_norm = NormalizedData::new(&y.insert_axis(Axis(1)));
        let dim = xt_norm.ncols();
        let theta0 = Array1::from_elem(dim, self.theta_init);
        let objfn = |log10_theta: &[f64]| -> f64 {
            let theta = log10_theta.iter().map(|v| 10f64.powf(*v)).collect::<Array1<_>>();
            if theta.iter().any(|v| !v.is_finite()) {
                return f64::INFINITY;
            }
            let r_mx = correlation_matrix(&xt_norm.data, &theta, self.nugget);
            match reduced_likelihood(r_mx, &yt_norm.data) {
                Ok((lkh, _)) => -lkh,
                Err(_) => f64::INFINITY,
            }
        };
        let raw_bounds = vec![self.theta_bounds; dim];
        let (starts, bounds) = prepare_multistart(self.n_start, &theta0, &raw_bounds);
        let budget = cobyla_budget(dim, self.max_eval);
        let (fmin, opt) = multistart_minimize(objfn, &starts, &bounds, budget);
        debug!("Outcome column optimized: reduced likelihood = {}, log10(theta) = {}", -fmin, opt);
        ColumnGp::new(xt_norm, yt_norm, opt.mapv(|v| 10f64.powf(v)), self.nugget)
    }
}

/// Outcome model parameters builder
#[derive(Clone, Debug, Default)]
pub struct OutcomeGpParams(OutcomeGpValidParams);

impl OutcomeGpParams {
    /// Default parameters
    pub fn new() -> Self {
        Self(OutcomeGpValidParams::default())
    }

    /// Set initial correlation weight
    pub fn theta_init(mut self, theta_init: f64) -> Self {
        self.0.theta_init = theta_init;
        self
    }

    /// Set correlation weight bounds
    pub fn theta_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.0.theta_bounds = (lower, upper);
        self
    }

    /// Set number of optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set max number of likelihood evaluations per restart
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = max_eval;
        self
    }

    /// Set nugget value
    pub fn nugget(mut self, nugget: f64) -> Self {
        self.0.nugget = nugget;
        self
    }
}

impl From<OutcomeGpValidParams> for OutcomeGpParams {
    fn from(valid: OutcomeGpValidParams) -> Self {
        OutcomeGpParams(valid)
    }
}

impl ParamGuard for OutcomeGpParams {
    type Checked = OutcomeGpValidParams;
    type Error = ModelError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let (lo, up) = self.0.theta_bounds;
        if !(lo > 0. && lo <= up && up.is_finite()) {
            return Err(ModelError::InvalidConfigError(format!(
                "theta bounds should satisfy 0 < lower <= upper, got ({lo}, {up})"
            )));
        }
        if !(self.0.theta_init > 0. && self.0.theta_init.is_finite()) {
            return Err(ModelError::InvalidConfigError(format!(
                "theta init should be positive, got {}",
                self.0.theta_init
            )));
        }
        if !(self.0.nugget >= 0. && self.0.nugget.is_finite()) {
            return Err(ModelError::InvalidConfigError(format!(
                "nugget should be non negative, got {}",
                self.0.nugget
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>, ModelError>
    for OutcomeGpValidParams
{
    type Object = OutcomeGp;

    /// Fit correlation weights of every outcome using maximum likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix2>>,
    ) -> Result<OutcomeGp> {
        self.fit_outcomes(dataset.records(), dataset.targets())
    }
}

/// Internal parameters computed during training
/// used later on in prediction computations
#[derive(Clone, Debug, Serialize, Deserialize)]
struct GpInnerParams {
    /// Gaussian process variance (output scale)
    sigma2: f64,
    /// Generalized least-squares constant mean
    beta: Array2<f64>,
    /// Gaussian Process weights
    gamma: Array2<f64>,
    /// Cholesky decomposition of the correlation matrix \[R\]
    r_chol: Array2<f64>,
    /// Solution of the linear equation system : \[R\] x Ft = y
    ft: Array2<f64>,
    /// R upper triangle matrix of QR decomposition of the matrix Ft
    ft_qr_r: Array2<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ColumnGp {
    theta: Array1<f64>,
    likelihood: f64,
    inner: GpInnerParams,
    yt_norm: NormalizedData,
}

impl ColumnGp {
    fn new(
        xt_norm: &NormalizedData,
        yt_norm: NormalizedData,
        theta: Array1<f64>,
        nugget: f64,
    ) -> Result<Self> {
        check_finite("correlation weights", &theta)?;
        let r_mx = correlation_matrix(&xt_norm.data, &theta, nugget);
        let (likelihood, mut inner) = reduced_likelihood(r_mx, &yt_norm.data)?;
        inner.sigma2 *= yt_norm.std[0] * yt_norm.std[0];
        Ok(ColumnGp {
            theta,
            likelihood,
            inner,
            yt_norm,
        })
    }
}

/// Correlation matrix of training points with `1 + nugget` on the diagonal
fn correlation_matrix(
    xt: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    theta: &Array1<f64>,
    nugget: f64,
) -> Array2<f64> {
    let mut r_mx = squared_exponential(xt, xt, theta);
    r_mx.diag_mut().fill(1. + nugget);
    r_mx
}

/// Compute reduced likelihood function
/// r_mx: correlation matrix of the training points
/// ytrain: normalized output training values as a (n, 1) column
fn reduced_likelihood(
    r_mx: Array2<f64>,
    ytrain: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> Result<(f64, GpInnerParams)> {
    let n_obs = r_mx.nrows();
    let fx = Array2::ones((n_obs, 1));
    let r_chol = r_mx.cholesky()?;
    // Solve generalized least squared problem
    let ft = r_chol.solve_triangular(&fx, UPLO::Lower)?;
    let (ft_qr_q, ft_qr_r) = ft.qr()?.into_decomp();
    if ft_qr_r[[0, 0]].abs() < 1e-10 {
        return Err(ModelError::LikelihoodComputationError(
            "ft is too ill conditioned, try another theta again".to_string(),
        ));
    }
    let yt = r_chol.solve_triangular(ytrain, UPLO::Lower)?;

    let beta = ft_qr_r.solve_triangular_into(ft_qr_q.t().dot(&yt), UPLO::Upper)?;
    let rho = yt - ft.dot(&beta);
    let rho_sqr = rho.mapv(|v| v * v).sum();

    let gamma = r_chol.t().solve_triangular_into(rho, UPLO::Upper)?;
    // The determinant of R is equal to the squared product of
    // the diagonal elements of its Cholesky decomposition r_chol
    let n = n_obs as f64;
    let logdet = r_chol.diag().mapv(f64::log10).sum() * 2. / n;

    let sigma2 = (rho_sqr / n).max(f64::MIN_POSITIVE);
    let reduced_likelihood = -n * (sigma2.log10() + logdet);
    if !reduced_likelihood.is_finite() {
        return Err(ModelError::LikelihoodComputationError(format!(
            "reduced likelihood is not finite: {reduced_likelihood}"
        )));
    }

    Ok((
        reduced_likelihood,
        GpInnerParams {
            sigma2,
            beta,
            gamma,
            r_chol,
            ft,
            ft_qr_r,
        },
    ))
}

/// Fitted outcome model: one Kriging process per outcome component
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeGp {
    columns: Vec<ColumnGp>,
    xt_norm: NormalizedData,
    params: OutcomeGpValidParams,
    training_data: (Array2<f64>, Array2<f64>),
}

impl OutcomeGp {
    /// Outcome model parameters builder
    pub fn params() -> OutcomeGpParams {
        OutcomeGpParams::new()
    }

    /// Parameters used to fit the model
    pub fn fit_params(&self) -> &OutcomeGpValidParams {
        &self.params
    }

    /// Input dimension
    pub fn input_dim(&self) -> usize {
        self.xt_norm.ncols()
    }

    /// Output dimension
    pub fn output_dim(&self) -> usize {
        self.columns.len()
    }

    /// Training inputs and outputs
    pub fn training_data(&self) -> &(Array2<f64>, Array2<f64>) {
        &self.training_data
    }

    /// Correlation weights of the given output column
    pub fn theta(&self, col: usize) -> &Array1<f64> {
        &self.columns[col].theta
    }

    /// Reduced likelihood of each output column
    pub fn likelihoods(&self) -> Array1<f64> {
        self.columns.iter().map(|c| c.likelihood).collect()
    }

    /// Process variance of each output column
    pub fn variances(&self) -> Array1<f64> {
        self.columns.iter().map(|c| c.inner.sigma2).collect()
    }

    fn normalize_inputs(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        if x.ncols() != self.input_dim() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.input_dim(),
                actual: x.ncols(),
            });
        }
        Ok((x - &self.xt_norm.mean) / &self.xt_norm.std)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n output vectors as a (n, ny) matrix.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        let xnorm = self.normalize_inputs(x)?;
        let mut pred = Array2::zeros((x.nrows(), self.output_dim()));
        for (col, mut out) in self.columns.iter().zip(pred.columns_mut()) {
            let corr = squared_exponential(&xnorm, &self.xt_norm.data, &col.theta);
            let y_ = corr.dot(&col.inner.gamma) + col.inner.beta[[0, 0]];
            out.assign(&(y_.column(0).mapv(|v| v * col.yt_norm.std[0] + col.yt_norm.mean[0])));
        }
        check_finite("outcome prediction", &pred)?;
        Ok(pred)
    }

    /// Predict variance values at n given `x` points of nx components specified
    /// as a (n, nx) matrix.
    /// Returns variances as a (n, ny) matrix.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        let xnorm = self.normalize_inputs(x)?;
        let mut var = Array2::zeros((x.nrows(), self.output_dim()));
        for (col, mut out) in self.columns.iter().zip(var.columns_mut()) {
            let corr = squared_exponential(&xnorm, &self.xt_norm.data, &col.theta);
            let inners = &col.inner;
            let rt = inners.r_chol.solve_triangular(&corr.t(), UPLO::Lower)?;
            let rhs = inners.ft.t().dot(&rt) - 1.;
            let u = inners.ft_qr_r.t().solve_triangular(&rhs, UPLO::Lower)?;
            let mse = (rt.mapv(|v| v * v).sum_axis(Axis(0)) * -1. + 1.
                + u.mapv(|v| v * v).sum_axis(Axis(0)))
                * inners.sigma2;
            // Mean Squared Error might be slightly negative depending on
            // machine precision: set to zero in that case
            out.assign(&mse.mapv(|v| v.max(0.)));
        }
        check_finite("outcome variance", &var)?;
        Ok(var)
    }

    /// Negative reduced likelihood of the given output column for log10 correlation weights
    pub fn neg_log_likelihood(&self, col: usize, log10_theta: &Array1<f64>) -> Result<f64> {
        let column = self.columns.get(col).ok_or(ModelError::DimensionMismatchError {
            expected: self.output_dim(),
            actual: col,
        })?;
        if log10_theta.len() != self.input_dim() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.input_dim(),
                actual: log10_theta.len(),
            });
        }
        let theta = log10_theta.mapv(|v| 10f64.powf(v));
        check_finite("correlation weights", &theta)?;
        let r_mx = correlation_matrix(&self.xt_norm.data, &theta, self.params.nugget);
        let (lkh, _) = reduced_likelihood(r_mx, &column.yt_norm.data)?;
        Ok(-lkh)
    }

    /// Same training data with given correlation weights for each output column
    pub fn refit_with_theta(&self, thetas: &[Array1<f64>]) -> Result<OutcomeGp> {
        if thetas.len() != self.output_dim() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.output_dim(),
                actual: thetas.len(),
            });
        }
        let columns = self
            .columns
            .iter()
            .zip(thetas)
            .map(|(col, theta)| {
                if theta.len() != self.input_dim() {
                    return Err(ModelError::DimensionMismatchError {
                        expected: self.input_dim(),
                        actual: theta.len(),
                    });
                }
                ColumnGp::new(
                    &self.xt_norm,
                    col.yt_norm.clone(),
                    theta.to_owned(),
                    self.params.nugget,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(OutcomeGp {
            columns,
            ..self.clone()
        })
    }
}

impl OutcomeModel for OutcomeGp {
    fn input_dim(&self) -> usize {
        OutcomeGp::input_dim(self)
    }

    fn outcome_dim(&self) -> usize {
        self.output_dim()
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        OutcomeGp::predict(self, &x)
    }

    fn predict_var(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        OutcomeGp::predict_var(self, &x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, concatenate, Array};

    fn training() -> (Array2<f64>, Array2<f64>) {
        let x = Array::linspace(0., 4., 9).insert_axis(Axis(1));
        let y = concatenate![
            Axis(1),
            x.mapv(f64::sin),
            x.mapv(|v| 0.5 * v * v - v)
        ];
        (x, y)
    }

    #[test]
    fn test_outcome_gp_interpolates() {
        let (x, y) = training();
        let gp = OutcomeGp::params()
            .n_start(2)
            .fit(&DatasetBase::new(x.clone(), y.clone()))
            .expect("GP fitted");
        assert_eq!(gp.input_dim(), 1);
        assert_eq!(gp.output_dim(), 2);
        let pred = gp.predict(&x).unwrap();
        assert_abs_diff_eq!(pred, y, epsilon = 1e-2);
        let var = gp.predict_var(&x).unwrap();
        assert!(var.iter().all(|v| *v >= 0. && *v < 1e-2));
    }

    #[test]
    fn test_outcome_gp_predicts_between_points() {
        let (x, y) = training();
        let gp = OutcomeGp::params()
            .n_start(2)
            .check()
            .unwrap()
            .fit_outcomes(&x, &y)
            .unwrap();
        let xtest = array![[1.25], [2.75]];
        let pred = gp.predict(&xtest).unwrap();
        assert_abs_diff_eq!(pred[[0, 0]], 1.25f64.sin(), epsilon = 5e-2);
        assert_abs_diff_eq!(pred[[1, 0]], 2.75f64.sin(), epsilon = 5e-2);
        let far = gp.predict_var(&array![[10.]]).unwrap();
        let near = gp.predict_var(&xtest).unwrap();
        assert!(far[[0, 0]] > near[[0, 0]]);
    }

    #[test]
    fn test_neg_log_likelihood_matches_fit() {
        let (x, y) = training();
        let gp = OutcomeGp::params()
            .n_start(1)
            .check()
            .unwrap()
            .fit_outcomes(&x, &y)
            .unwrap();
        let log10_theta = gp.theta(0).mapv(f64::log10);
        let nll = gp.neg_log_likelihood(0, &log10_theta).unwrap();
        assert_abs_diff_eq!(nll, -gp.likelihoods()[0], epsilon = 1e-8);
        let refit = gp
            .refit_with_theta(&[array![1.], array![1.]])
            .unwrap();
        assert_abs_diff_eq!(refit.theta(1).to_owned(), array![1.]);
        assert!(gp.neg_log_likelihood(5, &log10_theta).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        let (x, y) = training();
        assert!(OutcomeGp::params().theta_bounds(1., 0.1).check().is_err());
        let params = OutcomeGpValidParams::default();
        assert!(params
            .fit_outcomes(&x.slice(ndarray::s![..1, ..]), &y.slice(ndarray::s![..1, ..]))
            .is_err());
        assert!(params.fit_outcomes(&x, &y.slice(ndarray::s![..3, ..])).is_err());
        let gp = OutcomeGp::params().n_start(1).check().unwrap().fit_outcomes(&x, &y).unwrap();
        assert!(matches!(
            gp.predict(&array![[1., 2.]]),
            Err(ModelError::DimensionMismatchError { .. })
        ));
    }
}
