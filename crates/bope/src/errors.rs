use thiserror::Error;

/// A result type for preference exploration experiments
pub type Result<T> = std::result::Result<T, BopeError>;

/// An error when setting up or running a preference exploration experiment
#[derive(Error, Debug)]
pub enum BopeError {
    /// When the experiment configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When an invalid value is encountered
    #[error("Value error: {0}")]
    InvalidValueError(String),
    /// When a computed quantity is NaN or infinite
    #[error("Numerical instability: {0}")]
    NumericalInstabilityError(String),
    /// When array dimensions disagree
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatchError {
        /// expected dimension
        expected: usize,
        /// actual dimension
        actual: usize,
    },
    /// When a run panicked
    #[error("Run panicked: {0}")]
    PanicError(String),
    /// When fitting or evaluating a model fails
    #[error(transparent)]
    ModelError(#[from] lowrank_models::ModelError),
    /// When learning a subspace fails
    #[error(transparent)]
    SubspaceError(#[from] lowrank_subspace::SubspaceError),
    /// When sampling inputs fails
    #[error(transparent)]
    DoeError(#[from] lowrank_doe::DoeError),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When IO fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When JSON (de)serialization fails
    #[error("JSON error")]
    JsonError(#[from] serde_json::Error),
    /// When numpy array write fails
    #[error("IO error")]
    WriteNpyError(#[from] ndarray_npy::WriteNpyError),
    /// When numpy array read fails
    #[error("IO error")]
    ReadNpyError(#[from] ndarray_npy::ReadNpyError),
}
