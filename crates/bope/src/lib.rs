//! This library implements Bayesian optimization with preference exploration (BOPE)
//! for problems whose designs produce high-dimensional outcome vectors.
//!
//! A decision maker prefers some outcomes to others but can only express it through
//! pairwise comparisons. Each [experiment pipeline](Pipeline) alternates between
//! * learning a low-rank outcome subspace with one of the `lowrank-subspace`
//!   methods (`st`, `pca`, `pcr`, `true_proj`, `random_linear_proj`,
//!   `random_subset`, `autoencoder`),
//! * fitting outcome and preference models in that subspace,
//! * querying comparisons chosen by a [preference exploration strategy](PeStrategy),
//! * evaluating the design maximizing the posterior mean utility.
//!
//! [BopeExperiment] runs every (method, strategy) pipeline of a trial, in parallel
//! when configured, and gathers their results in an [ExperimentLog] which
//! [summarize] aggregates over trials.
//!
//! Synthetic problems with known principal outcome axes are provided by
//! [SyntheticProblem], and [diagnostics] measures subspace recovery and model fit.
//!
//! Example:
//! ```no_run
//! use lowrank_bope::{
//!     generate_principal_axes, make_controlled_coeffs, render_table, summarize,
//!     BopeConfig, BopeExperiment, LinearUtil, ReportConfig, SyntheticProblem,
//! };
//! use ndarray_rand::rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256Plus;
//!
//! let axes = generate_principal_axes(20, 2, 0).expect("principal axes");
//! let problem = SyntheticProblem::builder(1, axes.clone())
//!     .scaling_factors(&[2., 1.])
//!     .noise_std(0.1)
//!     .build()
//!     .expect("synthetic problem");
//! let mut rng = Xoshiro256Plus::seed_from_u64(0);
//! let beta = make_controlled_coeffs(&axes, 1, 0.2, &mut rng).expect("coefficients");
//! let util = LinearUtil::new(beta);
//!
//! let config = BopeConfig::new().comps_per_iteration(12).n_check_post_mean(4);
//! let experiment = BopeExperiment::new(&problem, &util, &["st", "pca"], &["EUBO-zeta"], config)
//!     .expect("valid experiment");
//! let log = experiment.run().expect("experiment log");
//! println!("{}", render_table(&summarize(&log, &ReportConfig::default())));
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod checkpoint;
mod config;
mod data;
pub mod diagnostics;
mod errors;
mod experiment;
mod pe;
mod problem;
mod report;
mod results;
mod synthetic;

pub use checkpoint::*;
pub use config::*;
pub use data::*;
pub use errors::*;
pub use experiment::*;
pub use pe::*;
pub use problem::*;
pub use report::*;
pub use results::*;
pub use synthetic::*;
