use thiserror::Error;

/// A result type for sampling errors
pub type Result<T> = std::result::Result<T, DoeError>;

/// An error when building a design of experiments
#[derive(Error, Debug)]
pub enum DoeError {
    /// When the design space is not a (nx, 2) matrix of ordered bounds
    #[error("Invalid design space: {0}")]
    InvalidXlimitsError(String),
}
