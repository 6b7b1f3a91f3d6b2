use ndarray::{Array1, ArrayBase, Data, Ix2};

/// Condensed pairwise euclidean distances between rows of `x`
/// (row i against rows j > i, in row-major order)
pub fn pdist(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array1<f64> {
    let nrows = x.nrows();
    let mut res = Vec::with_capacity(nrows * nrows.saturating_sub(1) / 2);
    for i in 0..nrows {
        for j in (i + 1)..nrows {
            let d = (&x.row(i) - &x.row(j)).mapv(|v| v * v).sum();
            res.push(d.sqrt());
        }
    }
    Array1::from(res)
}
