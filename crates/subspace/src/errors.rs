use thiserror::Error;

/// A result type for subspace learning
pub type Result<T> = std::result::Result<T, SubspaceError>;

/// An error when learning or applying a low-rank subspace
#[derive(Error, Debug)]
pub enum SubspaceError {
    /// When a parameter or an input has an invalid value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When outcome dimensions of inputs disagree
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatchError {
        /// expected dimension
        expected: usize,
        /// actual dimension
        actual: usize,
    },
    /// When there is no outcome to learn a subspace from
    #[error("No outcome data to fit the subspace")]
    EmptyDataError,
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
