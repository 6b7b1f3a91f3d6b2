use thiserror::Error;

/// A result type for outcome and utility models
pub type Result<T> = std::result::Result<T, ModelError>;

/// An error when fitting or evaluating outcome and utility models
#[derive(Error, Debug)]
pub enum ModelError {
    /// When models, embeddings or parameters are inconsistently configured
    #[error("Configuration error: {0}")]
    InvalidConfigError(String),
    /// When hyperparameters or posteriors become NaN or infinite
    #[error("Numerical instability: {0}")]
    NumericalInstabilityError(String),
    /// When likelihood computation fails
    #[error("Likelihood computation error: {0}")]
    LikelihoodComputationError(String),
    /// When input dimensions disagree
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatchError {
        /// expected dimension
        expected: usize,
        /// actual dimension
        actual: usize,
    },
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When learning or applying a subspace fails
    #[error(transparent)]
    SubspaceError(#[from] lowrank_subspace::SubspaceError),
    /// When sampling inputs fails
    #[error(transparent)]
    DoeError(#[from] lowrank_doe::DoeError),
}
