//! This library implements the outcome and preference models used by preference
//! exploration over high-dimensional outcomes.
//!
//! * [OutcomeGp] models each outcome component given design inputs with Kriging,
//! * [PairwiseGp] models a latent utility of outcome vectors from pairwise comparisons
//!   `[winner, loser]` with a probit likelihood and a Laplace approximation,
//! * [ProjectedUtilityModel] and [ProjectedOutcomeModel] wrap those models fitted in a
//!   low-rank subspace learned by `lowrank-subspace` and switch between latent
//!   ([Mode::Training]) and raw outcome ([Mode::Evaluation]) inputs,
//! * [JointTrainer] trains an autoencoder together with the preference model
//!   fitted on its latent space.
//!
//! Consumers use the [UtilityModel] and [OutcomeModel] traits.
//!
//! Example:
//! ```no_run
//! use lowrank_models::{PairwiseGp, UtilityModel};
//! use linfa::{traits::Fit, DatasetBase};
//! use ndarray::array;
//!
//! let outcomes = array![[0.], [0.25], [0.5], [0.75], [1.]];
//! // datapoint 1 is preferred to datapoint 0, ...
//! let comparisons = array![[1, 0], [2, 1], [3, 2], [4, 3]];
//! let model = PairwiseGp::params()
//!     .fit(&DatasetBase::new(outcomes.clone(), comparisons))
//!     .expect("preference model fitted");
//! let utility = model.posterior_mean(outcomes.view()).expect("posterior mean");
//! assert!(utility[4] > utility[0]);
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod errors;
mod fit;
mod joint;
mod kernel;
mod optimization;
mod outcome;
mod pairwise;
mod projected;
mod traits;
mod utils;

pub use errors::*;
pub use fit::*;
pub use joint::*;
pub use kernel::*;
pub use optimization::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START};
pub use outcome::*;
pub use pairwise::*;
pub use projected::*;
pub use traits::*;
pub use utils::*;
