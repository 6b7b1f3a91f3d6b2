//! In-memory result log of an experiment: trial, method, strategy, iteration.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final state of a (method, strategy) pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every outer iteration completed
    Completed,
    /// The pipeline stopped on an error or a panic during `iteration`
    Failed {
        /// error message
        error: String,
        /// outer iteration at which the pipeline stopped
        iteration: usize,
    },
}

/// Diagnostics recorded at the end of an outer iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Outer iteration index
    pub iteration: usize,
    /// Number of comparisons in the utility model training data
    pub n_comps: usize,
    /// Number of evaluated designs
    pub n_outcomes: usize,
    /// Dimension of the learned subspace
    pub latent_dim: usize,
    /// Subspace recovery error against the true axes when known
    pub recovery_error: Option<f64>,
    /// Grassmannian distance to the true axes when known
    pub grassmannian: Option<f64>,
    /// Outcome model 1 - generalized R2 on held-out designs
    pub outcome_fit_error: f64,
    /// Utility model Kendall's tau on held-out outcomes
    pub util_fit_tau: f64,
    /// True utility of the design evaluated at this iteration
    pub util: f64,
    /// Best true utility of the evaluated designs so far
    pub best_util_so_far: f64,
    /// Whether the joint autoencoder training plateaued, for autoencoded methods
    pub joint_converged: Option<bool>,
}

/// True utility of the posterior best design checked within a sub-loop
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithinSessionRecord {
    /// Outer iteration index
    pub iteration: usize,
    /// Number of comparisons when checked
    pub n_comps: usize,
    /// True utility of the posterior best design
    pub util: f64,
    /// Best of the checked utilities so far
    pub best_util_so_far: f64,
}

/// Results of one (method, strategy) pipeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Subspace method name
    pub method: String,
    /// Preference exploration strategy name
    pub strategy: String,
    /// Trial seed
    pub trial: u64,
    /// Final state
    pub status: RunStatus,
    /// One record per completed outer iteration
    pub iterations: Vec<IterationRecord>,
    /// Posterior best design checks, in order
    pub within_session: Vec<WithinSessionRecord>,
}

impl RunRecord {
    /// An empty record
    pub fn new(method: &str, strategy: &str, trial: u64) -> Self {
        RunRecord {
            method: method.to_string(),
            strategy: strategy.to_string(),
            trial,
            status: RunStatus::Completed,
            iterations: vec![],
            within_session: vec![],
        }
    }

    /// Whether the pipeline completed
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Best true utility reached by the pipeline
    pub fn best_util(&self) -> Option<f64> {
        self.within_session
            .last()
            .map(|r| r.best_util_so_far)
            .into_iter()
            .chain(self.iterations.last().map(|r| r.best_util_so_far))
            .reduce(f64::max)
    }
}

/// Results of every pipeline of every trial
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentLog {
    /// trial -> method -> strategy -> record
    pub runs: BTreeMap<u64, BTreeMap<String, BTreeMap<String, RunRecord>>>,
}

impl ExperimentLog {
    /// An empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the record of its (trial, method, strategy)
    pub fn insert(&mut self, record: RunRecord) {
        self.runs
            .entry(record.trial)
            .or_default()
            .entry(record.method.clone())
            .or_default()
            .insert(record.strategy.clone(), record);
    }

    /// Record of the given pipeline
    pub fn get(&self, trial: u64, method: &str, strategy: &str) -> Option<&RunRecord> {
        self.runs.get(&trial)?.get(method)?.get(strategy)
    }

    /// Number of pipeline records
    pub fn len(&self) -> usize {
        self.records().count()
    }

    /// Whether the log has no record
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record ordered by trial, method and strategy
    pub fn records(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs
            .values()
            .flat_map(|methods| methods.values())
            .flat_map(|strategies| strategies.values())
    }

    /// Adds every record of `other`, replacing records of the same pipelines
    pub fn merge(&mut self, other: ExperimentLog) {
        for (_, methods) in other.runs {
            for (_, strategies) in methods {
                for (_, record) in strategies {
                    self.insert(record);
                }
            }
        }
    }
}
