//! Squared exponential correlation with automatic relevance determination.
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2, Zip};

/// Correlation matrix `r(a_i, b_j) = exp(-sum_l theta_l (a_il - b_jl)^2)` between
/// the rows of `a` and `b`
pub fn squared_exponential(
    a: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    b: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    theta: &Array1<f64>,
) -> Array2<f64> {
    let scale = theta.mapv(f64::sqrt);
    let a = a * &scale;
    let b = b * &scale;
    let a2 = a.mapv(|v| v * v).sum_axis(Axis(1));
    let b2 = b.mapv(|v| v * v).sum_axis(Axis(1));
    let mut d2 = a.dot(&b.t()) * -2.;
    Zip::from(d2.rows_mut()).and(&a2).for_each(|mut row, &ai| {
        Zip::from(&mut row)
            .and(&b2)
            .for_each(|v, &bj| *v = (*v + ai + bj).max(0.));
    });
    d2.mapv_inplace(|v| (-v).exp());
    d2
}
