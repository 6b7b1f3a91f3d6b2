use crate::errors::{DoeError, Result};
use ndarray::{Array2, ArrayBase, Data, Ix2};

/// Sampling method generating a set of points in a box-shaped sample space
/// `[lower_bound_xi, upper_bound_xi]^nx`.
pub trait SamplingMethod {
    /// Returns the (nx, 2) bounds of the sample space
    fn sampling_space(&self) -> &Array2<f64>;

    /// Generates a (ns, nx)-shaped array of samples belonging to `[0., 1.]^nx`
    fn normalized_sample(&self, ns: usize) -> Array2<f64>;

    /// Generates a (ns, nx)-shaped array of samples scaled to the sample space
    /// bounds returned by `sampling_space`.
    fn sample(&self, ns: usize) -> Array2<f64> {
        let xlimits = self.sampling_space();
        let lower = xlimits.column(0);
        let scaler = &xlimits.column(1) - &lower;
        self.normalized_sample(ns) * scaler + lower
    }
}

/// Checks a design space is a non-empty (nx, 2) matrix with lower <= upper bounds.
pub fn check_xlimits(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<()> {
    if xlimits.ncols() != 2 {
        return Err(DoeError::InvalidXlimitsError(format!(
            "xlimits must have 2 columns (lower, upper), got {}",
            xlimits.ncols()
        )));
    }
    if xlimits.nrows() == 0 {
        return Err(DoeError::InvalidXlimitsError(
            "xlimits must have at least one row".to_string(),
        ));
    }
    if let Some((i, row)) = xlimits
        .rows()
        .into_iter()
        .enumerate()
        .find(|(_, row)| !(row[0] <= row[1]))
    {
        return Err(DoeError::InvalidXlimitsError(format!(
            "bounds of component {i} are not ordered: [{}, {}]",
            row[0], row[1]
        )));
    }
    Ok(())
}
