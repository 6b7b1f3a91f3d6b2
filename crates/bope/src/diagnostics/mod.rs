//! Scalar diagnostics of learned subspaces, fitted models and function landscapes.
//!
//! Diagnostics never modify their inputs.
mod landscape;
mod model_fit;
mod subspace;

pub use landscape::*;
pub use model_fit::*;
pub use subspace::*;
