//! Preference Gaussian process learnt from pairwise comparisons.
//!
//! The latent utility `f` has a zero mean Gaussian process prior with a scaled
//! squared exponential kernel `s * exp(-sum_l theta_l (a_l - b_l)^2)` evaluated on
//! inputs mapped onto the unit hypercube spanned by the training datapoints.
//! A comparison `[w, l]` states that datapoint `w` is preferred to datapoint `l` with
//! the probit likelihood `Phi((f_w - f_l) / sqrt(2))`.
//!
//! The posterior is approximated with the Laplace method: the mode is found by
//! Newton iterations on `log p(D|f) - 1/2 f^T K^-1 f` and the curvature of the
//! likelihood at the mode gives a Gaussian posterior. Hyperparameters minimize the
//! resulting approximation of the negative log marginal likelihood.
use crate::errors::{ModelError, Result};
use crate::kernel::squared_exponential;
use crate::optimization::{
    cobyla_budget, multistart_minimize, prepare_multistart, GP_COBYLA_MAX_EVAL,
};
use crate::traits::UtilityModel;
use crate::utils::{check_finite, inv_mills_ratio, log_norm_cdf, MinMaxScaler};

use linfa::prelude::{DatasetBase, Fit};
use linfa::ParamGuard;
use linfa_linalg::{cholesky::*, triangular::*};
use log::debug;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};

/// Default initial correlation weight
pub const PAIRWISE_THETA_INIT: f64 = 1.;
/// Default correlation weight bounds
pub const PAIRWISE_THETA_BOUNDS: (f64, f64) = (1e-2, 1e2);
/// Default initial kernel output scale
pub const PAIRWISE_OUTPUTSCALE_INIT: f64 = 1.;
/// Default kernel output scale bounds
pub const PAIRWISE_OUTPUTSCALE_BOUNDS: (f64, f64) = (1e-2, 1e2);
/// Default number of multistart for hyperparameters optimization
pub const PAIRWISE_N_START: usize = 5;
/// Default relative diagonal jitter of the prior covariance
pub const PAIRWISE_JITTER: f64 = 1e-6;

const LAPLACE_MAX_ITER: usize = 100;
const LAPLACE_TOL: f64 = 1e-8;
const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// A set of validated preference model parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PairwiseGpValidParams {
    pub(crate) theta_init: f64,
    pub(crate) theta_bounds: (f64, f64),
    pub(crate) outputscale_init: f64,
    pub(crate) outputscale_bounds: (f64, f64),
    pub(crate) n_start: usize,
    pub(crate) max_eval: usize,
    pub(crate) jitter: f64,
}

impl Default for PairwiseGpValidParams {
    fn default() -> Self {
        PairwiseGpValidParams {
            theta_init: PAIRWISE_THETA_INIT,
            theta_bounds: PAIRWISE_THETA_BOUNDS,
            outputscale_init: PAIRWISE_OUTPUTSCALE_INIT,
            outputscale_bounds: PAIRWISE_OUTPUTSCALE_BOUNDS,
            n_start: PAIRWISE_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            jitter: PAIRWISE_JITTER,
        }
    }
}

impl PairwiseGpValidParams {
    /// Get number of multistart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get max number of marginal likelihood evaluations
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Initial log10 hyperparameters `[theta_1, ..., theta_d, outputscale]`
    pub fn initial_hyperparameters(&self, dim: usize) -> Array1<f64> {
        let mut h = Array1::from_elem(dim + 1, self.theta_init.log10());
        h[dim] = self.outputscale_init.log10();
        h
    }

    /// Bounds of log10 hyperparameters
    pub fn hyperparameter_bounds(&self, dim: usize) -> Vec<(f64, f64)> {
        let mut bounds = vec![(self.theta_bounds.0.log10(), self.theta_bounds.1.log10()); dim];
        bounds.push((
            self.outputscale_bounds.0.log10(),
            self.outputscale_bounds.1.log10(),
        ));
        bounds
    }

    /// Fits hyperparameters and Laplace posterior on `datapoints` rows and
    /// `[winner, loser]` comparison rows
    pub fn fit_comparisons(
        &self,
        datapoints: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    ) -> Result<PairwiseGp> {
        check_comparisons(datapoints, comparisons)?;
        let dim = datapoints.ncols();
        let scaler = MinMaxScaler::fit(datapoints);
        let xt = scaler.transform(datapoints);
        let comparisons = comparisons.to_owned();

        let h0 = self.initial_hyperparameters(dim).mapv(|v| 10f64.powf(v));
        let raw_bounds: Vec<(f64, f64)> = self
            .hyperparameter_bounds(dim)
            .iter()
            .map(|(lo, up)| (10f64.powf(*lo), 10f64.powf(*up)))
            .collect();
        let objfn = |log10_h: &[f64]| -> f64 {
            let h = Array1::from(log10_h.to_vec());
            let state = kernel_matrix(&xt, &h, self.jitter)
                .and_then(|k| laplace(&k, &comparisons, None));
            match state {
                Ok(state) if state.nlml.is_finite() => state.nlml,
                _ => f64::INFINITY,
            }
        };
        let (starts, bounds) = prepare_multistart(self.n_start, &h0, &raw_bounds);
        let budget = cobyla_budget(dim + 1, self.max_eval);
        let (fmin, opt) = multistart_minimize(objfn, &starts, &bounds, budget);
        debug!("Preference model optimized: nlml = {fmin}, log10 hyperparameters = {opt}");
        PairwiseGp::build(self.clone(), opt, scaler, datapoints.to_owned(), comparisons, None)
    }
}

/// Preference model parameters builder
#[derive(Clone, Debug, Default)]
pub struct PairwiseGpParams(PairwiseGpValidParams);

impl PairwiseGpParams {
    /// Default parameters
    pub fn new() -> Self {
        Self(PairwiseGpValidParams::default())
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

    /// Set initial kernel output scale
    pub fn outputscale_init(mut self, outputscale_init: f64) -> Self {
        self.0.outputscale_init = outputscale_init;
        self
    }

    /// Set kernel output scale bounds
    pub fn outputscale_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.0.outputscale_bounds = (lower, upper);
        self
    }

    /// Set number of optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set max number of marginal likelihood evaluations per restart
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = max_eval;
        self
    }

    /// Set relative diagonal jitter
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.0.jitter = jitter;
        self
    }
}

impl From<PairwiseGpValidParams> for PairwiseGpParams {
    fn from(valid: PairwiseGpValidParams) -> Self {
        PairwiseGpParams(valid)
    }
}

fn check_positive_bounds(what: &str, init: f64, (lo, up): (f64, f64)) -> Result<()> {
    if !(lo > 0. && lo <= up && up.is_finite()) {
        return Err(ModelError::InvalidConfigError(format!(
            "{what} bounds should satisfy 0 < lower <= upper, got ({lo}, {up})"
        )));
    }
    if !(init > 0. && init.is_finite()) {
        return Err(ModelError::InvalidConfigError(format!(
            "{what} init should be positive, got {init}"
        )));
    }
    Ok(())
}

impl ParamGuard for PairwiseGpParams {
    type Checked = PairwiseGpValidParams;
    type Error = ModelError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_positive_bounds("theta", self.0.theta_init, self.0.theta_bounds)?;
        check_positive_bounds(
            "outputscale",
            self.0.outputscale_init,
            self.0.outputscale_bounds,
        )?;
        if !(self.0.jitter > 0. && self.0.jitter.is_finite()) {
            return Err(ModelError::InvalidConfigError(format!(
                "jitter should be positive, got {}",
                self.0.jitter
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl<D: Data<Elem = f64>, C: Data<Elem = usize>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<C, Ix2>, ModelError> for PairwiseGpValidParams
{
    type Object = PairwiseGp;

    /// Fit the preference model: records are datapoints, targets are comparisons
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<C, Ix2>>,
    ) -> Result<PairwiseGp> {
        self.fit_comparisons(dataset.records(), dataset.targets())
    }
}

fn check_comparisons(
    datapoints: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
) -> Result<()> {
    let n = datapoints.nrows();
    if n == 0 || datapoints.ncols() == 0 {
        return Err(ModelError::InvalidConfigError(
            "preference model needs non empty datapoints".to_string(),
        ));
    }
    if comparisons.ncols() != 2 || comparisons.nrows() == 0 {
        return Err(ModelError::InvalidConfigError(format!(
            "comparisons should be a non empty (m, 2) array, got {:?}",
            comparisons.dim()
        )));
    }
    for row in comparisons.rows() {
        if row[0] >= n || row[1] >= n || row[0] == row[1] {
            return Err(ModelError::InvalidConfigError(format!(
                "invalid comparison [{}, {}] for {n} datapoints",
                row[0], row[1]
            )));
        }
    }
    check_finite("preference datapoints", datapoints)
}

/// Prior covariance of normalized training points for log10 hyperparameters
fn kernel_matrix(xt: &Array2<f64>, log10_h: &Array1<f64>, jitter: f64) -> Result<Array2<f64>> {
    let (theta, outputscale) = split_hyperparameters(log10_h);
    check_finite("preference hyperparameters", &theta)?;
    let mut k = squared_exponential(xt, xt, &theta) * outputscale;
    k.diag_mut().mapv_inplace(|v| v + jitter * outputscale);
    Ok(k)
}

fn split_hyperparameters(log10_h: &Array1<f64>) -> (Array1<f64>, f64) {
    let dim = log10_h.len() - 1;
    let theta = log10_h.slice(s![..dim]).mapv(|v| 10f64.powf(v));
    (theta, 10f64.powf(log10_h[dim]))
}

/// Solves `C C^T x = v` given the lower Cholesky factor `C`
fn cho_solve(chol: &Array2<f64>, v: &Array1<f64>) -> Result<Array1<f64>> {
    let y = chol.solve_triangular(&v.view().insert_axis(Axis(1)), UPLO::Lower)?;
    let x = chol.t().solve_triangular_into(y, UPLO::Upper)?;
    Ok(x.column(0).to_owned())
}

/// Gradient of the log likelihood and its negative Hessian with regard to `f`
fn likelihood_derivatives(
    f: &Array1<f64>,
    comparisons: &Array2<usize>,
) -> (Array1<f64>, Array2<f64>) {
    let n = f.len();
    let mut grad = Array1::zeros(n);
    let mut hess = Array2::zeros((n, n));
    for row in comparisons.rows() {
        let (w, l) = (row[0], row[1]);
        let z = (f[w] - f[l]) / SQRT_2;
        let r = inv_mills_ratio(z);
        grad[w] += r / SQRT_2;
        grad[l] -= r / SQRT_2;
        let curv = r * (z + r) / 2.;
        hess[[w, w]] += curv;
        hess[[l, l]] += curv;
        hess[[w, l]] -= curv;
        hess[[l, w]] -= curv;
    }
    (grad, hess)
}

fn log_likelihood(f: &Array1<f64>, comparisons: &Array2<usize>) -> f64 {
    comparisons
        .rows()
        .into_iter()
        .map(|row| log_norm_cdf((f[row[0]] - f[row[1]]) / SQRT_2))
        .sum()
}

/// Unnormalized log posterior `log p(D|f) - 1/2 f^T K^-1 f`
fn log_posterior(
    l_chol: &Array2<f64>,
    f: &Array1<f64>,
    comparisons: &Array2<usize>,
) -> Result<f64> {
    let v = l_chol.solve_triangular(&f.view().insert_axis(Axis(1)), UPLO::Lower)?;
    Ok(log_likelihood(f, comparisons) - 0.5 * v.mapv(|e| e * e).sum())
}

/// Laplace approximation at the posterior mode
#[derive(Clone, Debug, Serialize, Deserialize)]
struct LaplaceState {
    /// Posterior mode of the latent utility at training points
    f_map: Array1<f64>,
    /// `K^-1 f_map`
    alpha: Array1<f64>,
    /// Lower Cholesky factor of the prior covariance
    l_chol: Array2<f64>,
    /// Lower Cholesky factor of `I + L^T W L`
    b_chol: Array2<f64>,
    /// Negative log marginal likelihood approximation
    nlml: f64,
}

fn curvature_chol(l_chol: &Array2<f64>, hess: &Array2<f64>) -> Result<Array2<f64>> {
    let n = l_chol.nrows();
    let b_mx = Array2::<f64>::eye(n) + l_chol.t().dot(hess).dot(l_chol);
    Ok(b_mx.cholesky()?)
}

/// Finds the posterior mode with damped Newton iterations starting from `f0` (zero by default)
fn laplace(
    k: &Array2<f64>,
    comparisons: &Array2<usize>,
    f0: Option<&Array1<f64>>,
) -> Result<LaplaceState> {
    let n = k.nrows();
    let l_chol = k.cholesky()?;
    let mut f = match f0 {
        Some(f0) if f0.len() == n => f0.to_owned(),
        _ => Array1::zeros(n),
    };
    let mut psi = log_posterior(&l_chol, &f, comparisons)?;
    for _ in 0..LAPLACE_MAX_ITER {
        let (grad, hess) = likelihood_derivatives(&f, comparisons);
        // f_new = (K^-1 + W)^-1 (W f + g) = L B^-1 L^T (W f + g)
        let b_chol = curvature_chol(&l_chol, &hess)?;
        let rhs = l_chol.t().dot(&(hess.dot(&f) + &grad));
        let f_new = l_chol.dot(&cho_solve(&b_chol, &rhs)?);

        let mut step = 1.;
        let mut f_try = f_new.clone();
        let mut psi_try = log_posterior(&l_chol, &f_try, comparisons)?;
        while !(psi_try >= psi) && step > 1e-4 {
            step *= 0.5;
            f_try = &f + &((&f_new - &f) * step);
            psi_try = log_posterior(&l_chol, &f_try, comparisons)?;
        }
        if !(psi_try >= psi) {
            break;
        }
        let delta = (&f_try - &f).fold(0., |acc: f64, v| acc.max(v.abs()));
        f = f_try;
        psi = psi_try;
        if delta < LAPLACE_TOL {
            break;
        }
    }
    check_finite("preference posterior mode", &f)?;
    let (_, hess) = likelihood_derivatives(&f, comparisons);
    let b_chol = curvature_chol(&l_chol, &hess)?;
    let alpha = cho_solve(&l_chol, &f)?;
    let nlml = -psi + b_chol.diag().mapv(f64::ln).sum();
    Ok(LaplaceState {
        f_map: f,
        alpha,
        l_chol,
        b_chol,
        nlml,
    })
}

/// Fitted preference model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairwiseGp {
    params: PairwiseGpValidParams,
    log10_hyper: Array1<f64>,
    scaler: MinMaxScaler,
    datapoints: Array2<f64>,
    comparisons: Array2<usize>,
    xt: Array2<f64>,
    state: LaplaceState,
}

impl PairwiseGp {
    /// Preference model parameters builder
    pub fn params() -> PairwiseGpParams {
        PairwiseGpParams::new()
    }

    fn build(
        params: PairwiseGpValidParams,
        log10_hyper: Array1<f64>,
        scaler: MinMaxScaler,
        datapoints: Array2<f64>,
        comparisons: Array2<usize>,
        f0: Option<&Array1<f64>>,
    ) -> Result<PairwiseGp> {
        check_finite("preference hyperparameters", &log10_hyper)?;
        let xt = scaler.transform(&datapoints);
        let k = kernel_matrix(&xt, &log10_hyper, params.jitter)?;
        let state = laplace(&k, &comparisons, f0)?;
        if !state.nlml.is_finite() {
            return Err(ModelError::NumericalInstabilityError(format!(
                "preference marginal likelihood is not finite: {}",
                state.nlml
            )));
        }
        Ok(PairwiseGp {
            params,
            log10_hyper,
            scaler,
            datapoints,
            comparisons,
            xt,
            state,
        })
    }

    /// Parameters used to fit the model
    pub fn fit_params(&self) -> &PairwiseGpValidParams {
        &self.params
    }

    /// Dimension of datapoints
    pub fn input_dim(&self) -> usize {
        self.datapoints.ncols()
    }

    /// Training datapoints
    pub fn datapoints(&self) -> &Array2<f64> {
        &self.datapoints
    }

    /// Training comparisons as `[winner, loser]` rows
    pub fn comparisons(&self) -> &Array2<usize> {
        &self.comparisons
    }

    /// Log10 hyperparameters `[theta_1, ..., theta_d, outputscale]`
    pub fn hyperparameters(&self) -> &Array1<f64> {
        &self.log10_hyper
    }

    /// Bounds of log10 hyperparameters
    pub fn hyperparameter_bounds(&self) -> Vec<(f64, f64)> {
        self.params.hyperparameter_bounds(self.input_dim())
    }

    /// Correlation weights on normalized inputs
    pub fn theta(&self) -> Array1<f64> {
        split_hyperparameters(&self.log10_hyper).0
    }

    /// Kernel output scale
    pub fn outputscale(&self) -> f64 {
        split_hyperparameters(&self.log10_hyper).1
    }

    /// Posterior mode of the utility at training datapoints
    pub fn f_map(&self) -> &Array1<f64> {
        &self.state.f_map
    }

    /// Laplace approximation of the negative log marginal likelihood
    pub fn neg_log_marginal_likelihood(&self) -> f64 {
        self.state.nlml
    }

    /// Negative log marginal likelihood on the training data for other log10
    /// hyperparameters, the search of the mode starts from the current one
    pub fn nlml_with(&self, log10_hyper: &Array1<f64>) -> Result<f64> {
        if log10_hyper.len() != self.log10_hyper.len() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.log10_hyper.len(),
                actual: log10_hyper.len(),
            });
        }
        let k = kernel_matrix(&self.xt, log10_hyper, self.params.jitter)?;
        Ok(laplace(&k, &self.comparisons, Some(&self.state.f_map))?.nlml)
    }

    /// Laplace posterior for new training data and log10 hyperparameters, the
    /// input normalization is refitted and the search of the mode starts from
    /// the current one when sizes agree
    pub fn refit_with(
        &self,
        datapoints: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
        log10_hyper: &Array1<f64>,
    ) -> Result<PairwiseGp> {
        check_comparisons(datapoints, comparisons)?;
        if datapoints.ncols() != self.input_dim() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.input_dim(),
                actual: datapoints.ncols(),
            });
        }
        if log10_hyper.len() != self.log10_hyper.len() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.log10_hyper.len(),
                actual: log10_hyper.len(),
            });
        }
        PairwiseGp::build(
            self.params.clone(),
            log10_hyper.to_owned(),
            MinMaxScaler::fit(datapoints),
            datapoints.to_owned(),
            comparisons.to_owned(),
            Some(&self.state.f_map),
        )
    }

    /// Same training data with other log10 hyperparameters
    pub fn with_hyperparameters(&self, log10_hyper: &Array1<f64>) -> Result<PairwiseGp> {
        self.refit_with(&self.datapoints, &self.comparisons, log10_hyper)
    }

    /// Same hyperparameters with new training data
    pub fn set_train_data(
        &self,
        datapoints: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    ) -> Result<PairwiseGp> {
        self.refit_with(datapoints, comparisons, &self.log10_hyper)
    }

    fn cross_covariance(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        if y.ncols() != self.input_dim() {
            return Err(ModelError::DimensionMismatchError {
                expected: self.input_dim(),
                actual: y.ncols(),
            });
        }
        let (theta, outputscale) = split_hyperparameters(&self.log10_hyper);
        let ynorm = self.scaler.transform(y);
        let k_star = squared_exponential(&self.xt, &ynorm, &theta) * outputscale;
        Ok((ynorm, k_star))
    }

    /// Posterior mean of the utility at `(n, input_dim)` points
    pub fn predict(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let (_, k_star) = self.cross_covariance(y)?;
        let mean = k_star.t().dot(&self.state.alpha);
        check_finite("preference posterior mean", &mean)?;
        Ok(mean)
    }

    /// Posterior variance of the utility at `(n, input_dim)` points
    pub fn predict_var(&self, y: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let (_, k_star) = self.cross_covariance(y)?;
        let v = self.state.l_chol.solve_triangular(&k_star, UPLO::Lower)?;
        let w = self.state.b_chol.solve_triangular(&v, UPLO::Lower)?;
        let var = (v.mapv(|e| e * e).sum_axis(Axis(0)) * -1.
            + w.mapv(|e| e * e).sum_axis(Axis(0)))
            + self.outputscale();
        check_finite("preference posterior variance", &var)?;
        Ok(var.mapv(|v| v.max(0.)))
    }

    /// Joint posterior mean and covariance of the utility at `(n, input_dim)` points
    pub fn predict_joint(
        &self,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let (ynorm, k_star) = self.cross_covariance(y)?;
        let mean = k_star.t().dot(&self.state.alpha);
        let v = self.state.l_chol.solve_triangular(&k_star, UPLO::Lower)?;
        let w = self.state.b_chol.solve_triangular(&v, UPLO::Lower)?;
        let k_ss = squared_exponential(&ynorm, &ynorm, &self.theta()) * self.outputscale();
        let cov = k_ss - v.t().dot(&v) + w.t().dot(&w);
        check_finite("preference posterior mean", &mean)?;
        check_finite("preference posterior covariance", &cov)?;
        Ok((mean, cov))
    }
}

impl UtilityModel for PairwiseGp {
    fn input_dim(&self) -> usize {
        PairwiseGp::input_dim(self)
    }

    fn posterior_mean(&self, y: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict(&y)
    }

    fn posterior_var(&self, y: ArrayView2<f64>) -> Result<Array1<f64>> {
        self.predict_var(&y)
    }

    fn posterior(&self, y: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        self.predict_joint(&y)
    }
}
