//! Preference exploration experiment configuration.
use crate::errors::{BopeError, Result};

use lowrank_models::JointTrainConfig;
use lowrank_subspace::MethodSettings;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Experiment configuration shared by every (method, strategy) pipeline of a trial
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BopeConfig {
    /// Number of random designs evaluated before the first outer iteration
    pub(crate) initial_design: usize,
    /// Number of comparisons between random outcomes before the first outer iteration
    pub(crate) initial_comps: usize,
    /// Number of outer iterations (subspace fit, model fit, exploration, experimentation)
    pub(crate) outer_iterations: usize,
    /// Number of comparisons queried in each preference exploration sub-loop
    pub(crate) comps_per_iteration: usize,
    /// Number of comparisons between two evaluations of the posterior best design
    /// within a sub-loop (the last comparison always triggers one)
    pub(crate) n_check_post_mean: usize,
    /// Standard deviation of the gaussian noise added to utilities when comparing
    pub(crate) comp_noise: f64,
    /// Number of outcome model draws scored by information based strategies
    pub(crate) n_candidates: usize,
    /// Max number of candidate pairs scored for one query
    pub(crate) max_pairs: usize,
    /// Number of random designs among which the posterior best design is chosen
    pub(crate) n_design_candidates: usize,
    /// Number of outcome model draws used as unlabeled outcomes by unsupervised
    /// subspace methods (0: fit on compared outcomes only)
    pub(crate) n_unlabeled: usize,
    /// Number of held-out points of model fit diagnostics
    pub(crate) n_test: usize,
    /// Number of starts of hyperparameters optimizations
    pub(crate) model_n_start: usize,
    /// Subspace methods settings (see [lowrank_subspace])
    pub(crate) settings: MethodSettings,
    /// Autoencoder and preference model joint training
    pub(crate) joint: JointTrainConfig,
    /// Trial seed from which every random stream of the trial is derived
    pub(crate) seed: u64,
    /// Directory to save per pipeline checkpoints to
    pub(crate) output_dir: Option<PathBuf>,
    /// Whether pipelines run in parallel
    pub(crate) parallel: bool,
}

impl Default for BopeConfig {
    fn default() -> Self {
        BopeConfig {
            initial_design: 16,
            initial_comps: 4,
            outer_iterations: 1,
            comps_per_iteration: 10,
            n_check_post_mean: 2,
            comp_noise: 0.,
            n_candidates: 64,
            max_pairs: 128,
            n_design_candidates: 256,
            n_unlabeled: 0,
            n_test: 200,
            model_n_start: 3,
            settings: MethodSettings::default(),
            joint: JointTrainConfig::default(),
            seed: 0,
            output_dir: None,
            parallel: true,
        }
    }
}

impl BopeConfig {
    /// Default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial design size
    pub fn initial_design(mut self, initial_design: usize) -> Self {
        self.initial_design = initial_design;
        self
    }

    /// Sets the number of initial comparisons
    pub fn initial_comps(mut self, initial_comps: usize) -> Self {
        self.initial_comps = initial_comps;
        self
    }

    /// Sets the number of outer iterations
    pub fn outer_iterations(mut self, outer_iterations: usize) -> Self {
        self.outer_iterations = outer_iterations;
        self
    }

    /// Sets the number of comparisons of each exploration sub-loop
    pub fn comps_per_iteration(mut self, comps_per_iteration: usize) -> Self {
        self.comps_per_iteration = comps_per_iteration;
        self
    }

    /// Sets the cadence of posterior best design checks within a sub-loop
    pub fn n_check_post_mean(mut self, n_check_post_mean: usize) -> Self {
        self.n_check_post_mean = n_check_post_mean;
        self
    }

    /// Sets the comparison noise
    pub fn comp_noise(mut self, comp_noise: f64) -> Self {
        self.comp_noise = comp_noise;
        self
    }

    /// Sets the number of candidates of information based strategies
    pub fn n_candidates(mut self, n_candidates: usize) -> Self {
        self.n_candidates = n_candidates;
        self
    }

    /// Sets the max number of scored candidate pairs
    pub fn max_pairs(mut self, max_pairs: usize) -> Self {
        self.max_pairs = max_pairs;
        self
    }

    /// Sets the number of design candidates
    pub fn n_design_candidates(mut self, n_design_candidates: usize) -> Self {
        self.n_design_candidates = n_design_candidates;
        self
    }

    /// Sets the number of unlabeled outcomes
    pub fn n_unlabeled(mut self, n_unlabeled: usize) -> Self {
        self.n_unlabeled = n_unlabeled;
        self
    }

    /// Sets the number of held-out points of model fit diagnostics
    pub fn n_test(mut self, n_test: usize) -> Self {
        self.n_test = n_test;
        self
    }

    /// Sets the number of hyperparameters optimization starts
    pub fn model_n_start(mut self, model_n_start: usize) -> Self {
        self.model_n_start = model_n_start;
        self
    }

    /// Sets the subspace methods settings
    pub fn settings(mut self, settings: MethodSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the joint training configuration
    pub fn joint(mut self, joint: JointTrainConfig) -> Self {
        self.joint = joint;
        self
    }

    /// Sets the trial seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the checkpoint directory
    pub fn output_dir<P: AsRef<Path>>(mut self, output_dir: Option<P>) -> Self {
        self.output_dir = output_dir.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Sets whether pipelines run in parallel
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Trial seed
    pub fn trial_seed(&self) -> u64 {
        self.seed
    }

    /// Subspace methods settings
    pub fn method_settings(&self) -> &MethodSettings {
        &self.settings
    }

    /// Checkpoint directory
    pub fn checkpoint_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Checks values consistency
    pub fn validate(&self) -> Result<()> {
        let positive = [
            (self.initial_design >= 2, "initial_design should be at least 2"),
            (self.initial_comps >= 1, "initial_comps should be positive"),
            (self.comps_per_iteration >= 1, "comps_per_iteration should be positive"),
            (self.n_check_post_mean >= 1, "n_check_post_mean should be positive"),
            (self.n_candidates >= 2, "n_candidates should be at least 2"),
            (self.max_pairs >= 1, "max_pairs should be positive"),
            (self.n_design_candidates >= 1, "n_design_candidates should be positive"),
            (self.n_test >= 2, "n_test should be at least 2"),
            (self.model_n_start >= 1, "model_n_start should be positive"),
        ];
        if let Some((_, msg)) = positive.iter().find(|(ok, _)| !ok) {
            return Err(BopeError::InvalidConfigError(msg.to_string()));
        }
        if !(self.comp_noise >= 0. && self.comp_noise.is_finite()) {
            return Err(BopeError::InvalidConfigError(format!(
                "comp_noise should be non negative, got {}",
                self.comp_noise
            )));
        }
        Ok(())
    }

    /// Reads a configuration saved as JSON
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: BopeConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as JSON
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
