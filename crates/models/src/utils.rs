use crate::errors::{ModelError, Result};

use libm::{erfc, exp, log};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Dimension, Ix2};
use serde::{Deserialize, Serialize};

const INV_SQRT_2: f64 = std::f64::consts::FRAC_1_SQRT_2;
const SQRT_2PI: f64 = 2.5066282746310002;
const SQRT_2_OVER_PI: f64 = 0.7978845608028654;
const INV_SQRT_PI: f64 = 0.5641895835477563;

/// Standard normal density
pub fn norm_pdf(u: f64) -> f64 {
    exp(-0.5 * u * u) / SQRT_2PI
}

/// Standard normal cumulative distribution
pub fn norm_cdf(u: f64) -> f64 {
    0.5 * erfc(-u * INV_SQRT_2)
}

/// Scaled complementary error function `exp(u^2) erfc(u)`, asymptotic expansion
/// beyond the range where `erfc` underflows
fn erfcx(u: f64) -> f64 {
    if u < 25. {
        exp(u * u) * erfc(u)
    } else {
        let u2 = u * u;
        INV_SQRT_PI / u * (1. - 0.5 / u2 + 0.75 / (u2 * u2))
    }
}

/// `log(norm_cdf(u))` without underflow for large negative `u`
pub fn log_norm_cdf(u: f64) -> f64 {
    if u < 0. {
        log(0.5 * erfcx(-u * INV_SQRT_2)) - 0.5 * u * u
    } else {
        log(norm_cdf(u))
    }
}

/// Inverse Mills ratio `norm_pdf(u) / norm_cdf(u)`
pub fn inv_mills_ratio(u: f64) -> f64 {
    if u < 0. {
        SQRT_2_OVER_PI / erfcx(-u * INV_SQRT_2)
    } else {
        norm_pdf(u) / norm_cdf(u)
    }
}

/// Raises a numerical instability error when `values` holds NaN or infinite entries
pub fn check_finite<D: Dimension>(
    what: &str,
    values: &ArrayBase<impl Data<Elem = f64>, D>,
) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NumericalInstabilityError(format!(
            "{what} has non finite values"
        )))
    }
}

/// Affine map of each column onto `[0, 1]` learnt on training data.
/// Constant columns are only shifted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    lower: Array1<f64>,
    span: Array1<f64>,
}

impl MinMaxScaler {
    /// Learns the bounds of `x` columns
    pub fn fit(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Self {
        let lower = x.fold_axis(Axis(0), f64::INFINITY, |a, &b| a.min(b));
        let upper = x.fold_axis(Axis(0), f64::NEG_INFINITY, |a, &b| a.max(b));
        let span = (&upper - &lower).mapv(|v| if v > 0. && v.is_finite() { v } else { 1. });
        let lower = lower.mapv(|v| if v.is_finite() { v } else { 0. });
        MinMaxScaler { lower, span }
    }

    /// Number of scaled components
    pub fn ncols(&self) -> usize {
        self.lower.len()
    }

    /// Maps `x` with the learnt bounds
    pub fn transform(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        (x - &self.lower) / &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_log_norm_cdf_tails() {
        for u in [-3., -0.5, 0., 0.5, 3.] {
            assert_abs_diff_eq!(log_norm_cdf(u), norm_cdf(u).ln(), epsilon = 1e-10);
        }
        // log(Phi(-40)) ~ -804.6
        let v = log_norm_cdf(-40.);
        assert!(v.is_finite());
        assert_abs_diff_eq!(v, -804.608, epsilon = 1e-2);
    }

    #[test]
    fn test_inv_mills_ratio() {
        for u in [-3., -0.5, 0., 0.5, 3.] {
            assert_abs_diff_eq!(
                inv_mills_ratio(u),
                norm_pdf(u) / norm_cdf(u),
                epsilon = 1e-10
            );
        }
        // r(u) ~ -u for large negative u
        assert_abs_diff_eq!(inv_mills_ratio(-50.) / 50., 1., epsilon = 1e-3);
        assert!(inv_mills_ratio(40.) >= 0.);
    }

    #[test]
    fn test_min_max_scaler() {
        let x = array![[1., 5.], [3., 5.], [2., 5.]];
        let scaler = MinMaxScaler::fit(&x);
        assert_abs_diff_eq!(
            scaler.transform(&x),
            array![[0., 0.], [1., 0.], [0.5, 0.]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_check_finite() {
        assert!(check_finite("x", &array![1., 2.]).is_ok());
        assert!(matches!(
            check_finite("x", &array![1., f64::NAN]),
            Err(ModelError::NumericalInstabilityError(_))
        ));
    }
}
