use crate::errors::{Result, SubspaceError};
use linfa_linalg::qr::QR;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};

/// A structure to store (n, dim) matrix data and its mean and standard deviation vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedData {
    /// normalized data
    pub data: Array2<f64>,
    /// mean vector computed from data
    pub mean: Array1<f64>,
    /// standard deviation vector computed from data (zero deviations replaced by one)
    pub std: Array1<f64>,
}

impl NormalizedData {
    /// Standardizes `x` column-wise
    pub fn new(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> NormalizedData {
        let (data, mean, std) = normalize(x);
        NormalizedData { data, mean, std }
    }

    /// Only centers `x` column-wise, std is kept to one
    pub fn centered(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> NormalizedData {
        let mean = column_mean(x);
        NormalizedData {
            data: x - &mean,
            std: Array1::ones(x.ncols()),
            mean,
        }
    }

    /// Dimension of data points
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }
}

fn column_mean(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array1<f64> {
    x.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()))
}

/// Column-wise standardization using the unbiased standard deviation
pub fn normalize(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
    let x_mean = column_mean(x);
    let mut x_std = if x.nrows() > 1 {
        x.std_axis(Axis(0), 1.)
    } else {
        Array1::ones(x.ncols())
    };
    x_std.mapv_inplace(|v| if v == 0. { 1. } else { v });
    let xnorm = (x - &x_mean) / &x_std;

    (xnorm, x_mean, x_std)
}

/// Rows of `m` scaled to unit euclidean norm, null rows are left unchanged
pub fn row_normalize(m: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
    let mut res = m.to_owned();
    for mut row in res.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0. {
            row /= norm;
        }
    }
    res
}

/// Orthonormal basis of the row space of a (k, d) matrix with k <= d,
/// returned as a (k, d) matrix with orthonormal rows.
pub fn orthonormalize_rows(m: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
    let (k, d) = m.dim();
    if k == 0 {
        return Ok(Array2::zeros((0, d)));
    }
    if k > d {
        return Err(SubspaceError::InvalidValueError(format!(
            "cannot orthonormalize {k} rows in dimension {d}"
        )));
    }
    let q = m.t().qr()?.generate_q();
    Ok(q.t().to_owned())
}

/// Unbiased standard deviation of each column, zero when less than two rows
pub fn column_std(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array1<f64> {
    if x.nrows() < 2 {
        Array1::zeros(x.ncols())
    } else {
        x.std_axis(Axis(0), 1.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_normalized_data() {
        let x = array![[1., 5.], [3., 5.]];
        let nd = NormalizedData::new(&x);
        assert_abs_diff_eq!(nd.mean, array![2., 5.]);
        assert_abs_diff_eq!(nd.std, array![2f64.sqrt(), 1.]);
        assert_abs_diff_eq!(
            nd.data,
            array![[-1. / 2f64.sqrt(), 0.], [1. / 2f64.sqrt(), 0.]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_orthonormalize_rows() {
        let m = array![[1., 1., 0.], [1., 0., 1.]];
        let q = orthonormalize_rows(&m).unwrap();
        assert_abs_diff_eq!(q.dot(&q.t()), Array2::eye(2), epsilon = 1e-12);
        // same row space: projecting m on q rows keeps it unchanged
        let proj = m.dot(&q.t()).dot(&q);
        assert_abs_diff_eq!(proj, m, epsilon = 1e-12);
    }

    #[test]
    fn test_row_normalize() {
        let m = array![[3., 4.], [0., 0.]];
        assert_abs_diff_eq!(row_normalize(&m), array![[0.6, 0.8], [0., 0.]]);
    }
}
