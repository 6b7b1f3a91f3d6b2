//! This library implements the low-rank subspace learners used to model
//! high-dimensional outcomes in preference-based Bayesian optimization.
//!
//! A subspace is a map from outcome vectors of dimension `D` to latent vectors of
//! dimension `k <= D`. Linear subspaces are given by a [Projection] with
//! orthonormal rows, non linear ones by a [FrozenAutoencoder]. Both implement the
//! [Embedding] trait consumed by the model wrappers.
//!
//! Available learners:
//! * [Principal Component Analysis](Pca) on unlabeled outcomes,
//! * [Principal Component Regression](Pcr) selecting components that explain preferences,
//! * [random linear](random_linear_projection) and
//!   [random subset](random_subset_projection) baselines,
//! * a single hidden layer [Autoencoder] trained with [Adam].
//!
//! Learners are selected by name through [SubspaceMethod].
//!
//! Example:
//! ```
//! use lowrank_subspace::{Pca, Embedding};
//! use linfa::{traits::Fit, DatasetBase};
//! use ndarray::array;
//!
//! let y = array![[1., 2., 0.], [2., 4., 0.], [3., 6., 0.], [4., 8., 0.]];
//! let pca = Pca::params()
//!     .var_threshold(0.99)
//!     .fit(&DatasetBase::new(y.clone(), ()))
//!     .expect("PCA fitted");
//! let z = pca.projection().encode(y.view());
//! assert_eq!(z.ncols(), 1);
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod adam;
mod autoencoder;
mod errors;
mod method;
mod pca;
mod pcr;
mod projection;
mod random;
mod utils;

pub use adam::*;
pub use autoencoder::*;
pub use errors::*;
pub use method::*;
pub use pca::*;
pub use pcr::*;
pub use projection::*;
pub use random::*;
pub use utils::*;
