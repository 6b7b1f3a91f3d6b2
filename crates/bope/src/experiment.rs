//! Bayesian optimization with preference exploration over a set of subspace
//! methods and preference exploration strategies.
//!
//! Every (method, strategy) pair runs its own [`Pipeline`], a state machine going
//! through
//!
//! ```text
//! Init -> OutcomeWarmup -> SubspaceFit -> ModelFit -> PeSubloop -> Checkpoint
//!                              ^                                       |
//!                              +------------ next iteration -----------+-> Done
//! ```
//!
//! Pipelines share nothing mutable: each one owns its samples, comparisons and
//! models, and draws its random numbers from streams derived from the trial seed.
//! The initial design and comparisons are drawn from streams that do not depend on
//! the method nor on the strategy so that every pipeline of a trial starts from
//! the same data.
use crate::checkpoint::Checkpointer;
use crate::config::BopeConfig;
use crate::data::{make_comparisons, ComparisonSet, OutcomeSamples};
use crate::diagnostics::{
    check_outcome_model_fit, check_util_model_fit, compute_span_grassmannian,
    subspace_recovery_error, UtilFitOptions,
};
use crate::errors::{BopeError, Result};
use crate::pe::{CandidateSource, PeStrategy};
use crate::problem::{generate_random_inputs, TestProblem, UtilityFunction};
use crate::results::{ExperimentLog, IterationRecord, RunRecord, RunStatus, WithinSessionRecord};

use linfa::ParamGuard;
use log::{debug, info, warn};
use lowrank_doe::{Lhs, SamplingMethod};
use lowrank_models::{
    fit_pretrained_autoencoded_utility_model, fit_projected_outcome_model,
    fit_projected_utility_model, fit_standard_outcome_model, fit_standard_utility_model,
    unlabeled_outcomes, OutcomeGpParams, OutcomeGpValidParams, OutcomeModel, PairwiseGpParams,
    PairwiseGpValidParams, UtilityModel,
};
use lowrank_subspace::{Embedding, FittedSubspace, SubspaceData, SubspaceMethod};
use ndarray::{Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Seed of the `index`-th draw of the named random stream of a trial
pub fn derive_seed(seed: u64, stream: &str, index: u64) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in stream.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    splitmix64(seed ^ splitmix64(hash ^ splitmix64(index)))
}

/// Stage of a pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Checks the configuration against the problem
    Init,
    /// Evaluates the initial design and makes the initial comparisons
    OutcomeWarmup,
    /// Learns the outcome subspace
    SubspaceFit,
    /// Fits the utility and outcome models in the learned subspace
    ModelFit,
    /// Queries comparisons chosen by the strategy
    PeSubloop,
    /// Evaluates the posterior best design and records the iteration
    Checkpoint,
    /// Every iteration is done
    Done,
}

/// Outer iteration diagnostics collected before the checkpoint
#[derive(Clone, Debug, Default)]
struct PendingDiagnostics {
    recovery_error: Option<f64>,
    grassmannian: Option<f64>,
    outcome_fit_error: f64,
}

/// One (method, strategy) run of the preference exploration loop
pub struct Pipeline<'a> {
    problem: &'a dyn TestProblem,
    util: &'a dyn UtilityFunction,
    method: SubspaceMethod,
    strategy: PeStrategy,
    config: &'a BopeConfig,
    utility_params: PairwiseGpValidParams,
    outcome_params: OutcomeGpValidParams,
    stage: Stage,
    iteration: usize,
    rng: Xoshiro256Plus,
    samples: Option<OutcomeSamples>,
    comparisons: ComparisonSet,
    unlabeled: Array2<f64>,
    subspace: Option<FittedSubspace>,
    outcome_model: Option<Box<dyn OutcomeModel>>,
    utility_model: Option<Box<dyn UtilityModel>>,
    joint_converged: Option<bool>,
    best_design: Option<Array2<f64>>,
    best_util: f64,
    pending: PendingDiagnostics,
    record: RunRecord,
}

impl<'a> Pipeline<'a> {
    /// A pipeline ready to start
    pub fn new(
        problem: &'a dyn TestProblem,
        util: &'a dyn UtilityFunction,
        method: SubspaceMethod,
        strategy: PeStrategy,
        config: &'a BopeConfig,
    ) -> Result<Self> {
        let utility_params = PairwiseGpParams::new()
            .n_start(config.model_n_start)
            .check()?;
        let outcome_params = OutcomeGpParams::new()
            .n_start(config.model_n_start)
            .check()?;
        let stream = format!("pipeline/{}/{}", method.name(), strategy.name());
        let rng = Xoshiro256Plus::seed_from_u64(derive_seed(config.seed, &stream, 0));
        let record = RunRecord::new(method.name(), strategy.name(), config.seed);
        Ok(Pipeline {
            problem,
            util,
            method,
            strategy,
            config,
            utility_params,
            outcome_params,
            stage: Stage::Init,
            iteration: 0,
            rng,
            samples: None,
            comparisons: ComparisonSet::new(problem.outcome_dim()),
            unlabeled: Array2::zeros((0, problem.outcome_dim())),
            subspace: None,
            outcome_model: None,
            utility_model: None,
            joint_converged: None,
            best_design: None,
            best_util: f64::NEG_INFINITY,
            pending: PendingDiagnostics::default(),
            record,
        })
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Current outer iteration
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Results recorded so far
    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Evaluated designs
    pub fn samples(&self) -> Option<&OutcomeSamples> {
        self.samples.as_ref()
    }

    /// Comparisons made so far
    pub fn comparisons(&self) -> &ComparisonSet {
        &self.comparisons
    }

    /// Runs the current stage and moves to the next one
    pub fn step(&mut self) -> Result<Stage> {
        let next = match self.stage {
            Stage::Init => self.init()?,
            Stage::OutcomeWarmup => self.outcome_warmup()?,
            Stage::SubspaceFit => self.subspace_fit()?,
            Stage::ModelFit => self.model_fit()?,
            Stage::PeSubloop => self.pe_subloop()?,
            Stage::Checkpoint => self.checkpoint()?,
            Stage::Done => Stage::Done,
        };
        debug!(
            "{}/{} iteration {}: {:?} -> {:?}",
            self.method, self.strategy, self.iteration, self.stage, next
        );
        self.stage = next;
        Ok(next)
    }

    /// Runs every stage, a failure stops the pipeline and is recorded in its status
    pub fn run(mut self) -> RunRecord {
        while self.stage != Stage::Done {
            if let Err(err) = self.step() {
                warn!(
                    "Pipeline {}/{} of trial {} failed at iteration {} ({:?}): {}",
                    self.method, self.strategy, self.config.seed, self.iteration, self.stage, err
                );
                self.record.status = RunStatus::Failed {
                    error: err.to_string(),
                    iteration: self.iteration,
                };
                break;
            }
        }
        self.record
    }

    fn stream_rng(&self, stream: &str, index: usize) -> Xoshiro256Plus {
        Xoshiro256Plus::seed_from_u64(derive_seed(self.config.seed, stream, index as u64))
    }

    fn init(&mut self) -> Result<Stage> {
        self.config.validate()?;
        let bounds = self.problem.bounds();
        if bounds.dim() != (self.problem.input_dim(), 2) {
            return Err(BopeError::InvalidConfigError(format!(
                "problem bounds should be ({}, 2), got {:?}",
                self.problem.input_dim(),
                bounds.dim()
            )));
        }
        info!(
            "Starting {}/{} on trial {}: {} outer iterations of {} comparisons",
            self.method,
            self.strategy,
            self.config.seed,
            self.config.outer_iterations,
            self.config.comps_per_iteration
        );
        Ok(if self.config.outer_iterations == 0 {
            Stage::Done
        } else {
            Stage::OutcomeWarmup
        })
    }

    fn outcome_warmup(&mut self) -> Result<Stage> {
        let mut rng = self.stream_rng("warmup", 0);
        let x = Lhs::new(&self.problem.bounds())?
            .seed(derive_seed(self.config.seed, "initial_design", 0))
            .sample(self.config.initial_design);
        let y = self.problem.evaluate(x.view(), &mut rng);
        let samples = OutcomeSamples::new(x, y)?;

        let xc = generate_random_inputs(self.problem, 2 * self.config.initial_comps, &mut rng)?;
        let yc = self.problem.evaluate(xc.view(), &mut rng);
        let comps = make_comparisons(
            &self.util.utility(yc.view()),
            self.config.comp_noise,
            &mut rng,
        )?;
        self.comparisons = ComparisonSet::from_parts(yc, comps)?;

        if self.config.n_unlabeled > 0 {
            let model = fit_standard_outcome_model(&samples.x, &samples.y, &self.outcome_params)?;
            self.outcome_model = Some(Box::new(model));
        }
        info!(
            "{}/{} warmed up with {} designs and {} comparisons",
            self.method,
            self.strategy,
            samples.len(),
            self.comparisons.len()
        );
        self.samples = Some(samples);
        Ok(Stage::SubspaceFit)
    }

    fn samples_ref(&self) -> Result<&OutcomeSamples> {
        self.samples
            .as_ref()
            .ok_or_else(|| BopeError::InvalidValueError("no outcome sample yet".to_string()))
    }

    fn subspace_ref(&self) -> Result<&FittedSubspace> {
        self.subspace
            .as_ref()
            .ok_or_else(|| BopeError::InvalidValueError("no subspace fitted yet".to_string()))
    }

    fn subspace_fit(&mut self) -> Result<Stage> {
        let samples = self.samples_ref()?;
        let unlabeled = match self.outcome_model.as_deref() {
            Some(model) if self.config.n_unlabeled > 0 => unlabeled_outcomes(
                model,
                &self.problem.bounds(),
                self.config.n_unlabeled,
                &samples.y,
                derive_seed(self.config.seed, "unlabeled", self.iteration as u64),
            )?,
            _ => samples.y.clone(),
        };
        let data = SubspaceData {
            unlabeled: unlabeled.view(),
            labeled: self.comparisons.outcomes().view(),
            comparisons: self.comparisons.comparisons().view(),
        };
        let seed = derive_seed(
            self.config.seed,
            &format!("subspace/{}", self.method.name()),
            self.iteration as u64,
        );
        let subspace = self.method.fit(&data, seed)?;
        info!(
            "{}/{} iteration {}: subspace of dimension {}",
            self.method,
            self.strategy,
            self.iteration,
            subspace.latent_dim()
        );
        self.pending = PendingDiagnostics::default();
        self.unlabeled = unlabeled;
        self.subspace = Some(subspace);
        Ok(Stage::ModelFit)
    }

    /// Preference model of the current comparisons in the current subspace
    fn fit_utility(&self) -> Result<Box<dyn UtilityModel>> {
        let outcomes = self.comparisons.outcomes();
        let comps = self.comparisons.comparisons();
        let model: Box<dyn UtilityModel> = match self.subspace_ref()? {
            FittedSubspace::Identity(_) => Box::new(fit_standard_utility_model(
                outcomes,
                comps,
                &self.utility_params,
            )?),
            subspace => Box::new(fit_projected_utility_model(
                outcomes,
                comps,
                subspace,
                &self.utility_params,
            )?),
        };
        Ok(model)
    }

    fn fit_outcome(&self) -> Result<Box<dyn OutcomeModel>> {
        let samples = self.samples_ref()?;
        let model: Box<dyn OutcomeModel> = match self.subspace_ref()? {
            FittedSubspace::Identity(_) => Box::new(fit_standard_outcome_model(
                &samples.x,
                &samples.y,
                &self.outcome_params,
            )?),
            subspace => Box::new(fit_projected_outcome_model(
                &samples.x,
                &samples.y,
                subspace,
                &self.outcome_params,
            )?),
        };
        Ok(model)
    }

    /// Recovery diagnostics of the subspace the models are fitted in
    fn record_subspace_diagnostics(&mut self) -> Result<()> {
        if let Some(true_axes) = self.problem.true_axes() {
            let projection = self.subspace_ref()?.projection()?;
            self.pending.recovery_error =
                Some(subspace_recovery_error(projection.axes(), &true_axes)?);
            self.pending.grassmannian =
                Some(compute_span_grassmannian(projection.axes(), &true_axes)?.distance);
        }
        Ok(())
    }

    fn model_fit(&mut self) -> Result<Stage> {
        if let SubspaceMethod::Autoencoder(_) = self.method {
            // joint training resumes from the encoder pretrained at subspace fit
            let output = match self.subspace_ref()? {
                FittedSubspace::Encoded(pretrained) => fit_pretrained_autoencoded_utility_model(
                    self.comparisons.outcomes(),
                    self.comparisons.comparisons(),
                    pretrained,
                    &self.config.joint,
                    &self.utility_params,
                )?,
                _ => {
                    return Err(BopeError::InvalidValueError(
                        "autoencoder method did not fit an autoencoder".to_string(),
                    ))
                }
            };
            self.joint_converged = Some(output.report.converged);
            self.subspace = Some(FittedSubspace::Encoded(output.autoencoder));
            self.utility_model = Some(Box::new(output.utility));
        } else {
            self.utility_model = Some(self.fit_utility()?);
        }
        self.record_subspace_diagnostics()?;
        let outcome_model = self.fit_outcome()?;

        let mut rng = self.stream_rng("diagnostics/outcome", self.iteration);
        self.pending.outcome_fit_error = check_outcome_model_fit(
            &*outcome_model,
            self.problem,
            self.config.n_test,
            &mut rng,
        )?;
        self.outcome_model = Some(outcome_model);
        info!(
            "{}/{} iteration {}: models fitted (outcome fit error {:.4}, recovery error {:?})",
            self.method,
            self.strategy,
            self.iteration,
            self.pending.outcome_fit_error,
            self.pending.recovery_error
        );
        Ok(Stage::PeSubloop)
    }

    fn models(&self) -> Result<(&dyn OutcomeModel, &dyn UtilityModel)> {
        match (self.outcome_model.as_deref(), self.utility_model.as_deref()) {
            (Some(outcome), Some(utility)) => Ok((outcome, utility)),
            _ => Err(BopeError::InvalidValueError(
                "models are not fitted yet".to_string(),
            )),
        }
    }

    fn candidates(&mut self) -> Result<Array2<f64>> {
        let n = self.strategy.n_candidates(self.config.n_candidates);
        let x = generate_random_inputs(self.problem, n, &mut self.rng)?;
        match self.strategy.candidate_source() {
            CandidateSource::OutcomeModel => {
                let model = self.outcome_model.as_deref().ok_or_else(|| {
                    BopeError::InvalidValueError("outcome model is not fitted yet".to_string())
                })?;
                Ok(model.sample(x.view(), &mut self.rng)?)
            }
            CandidateSource::TrueProblem => Ok(self.problem.evaluate(x.view(), &mut self.rng)),
        }
    }

    fn query_comparison(&mut self) -> Result<()> {
        let candidates = self.candidates()?;
        let model = self.utility_model.as_deref().ok_or_else(|| {
            BopeError::InvalidValueError("utility model is not fitted yet".to_string())
        })?;
        let (i, j) = self.strategy.select_pair(
            model,
            &candidates,
            self.config.max_pairs,
            &mut self.rng,
        )?;
        let pair = candidates.select(Axis(0), &[i, j]);
        let comp = make_comparisons(
            &self.util.utility(pair.view()),
            self.config.comp_noise,
            &mut self.rng,
        )?;
        self.comparisons.push_pair(pair.row(0), pair.row(1), comp[[0, 0]])?;
        self.utility_model = Some(self.fit_utility()?);
        Ok(())
    }

    /// Design maximizing the utility posterior mean of the predicted outcomes among
    /// random designs, with its true utility
    fn posterior_best_design(&mut self) -> Result<(Array2<f64>, f64)> {
        let n = self.config.n_design_candidates;
        let x = generate_random_inputs(self.problem, n, &mut self.rng)?;
        let (outcome_model, utility_model) = self.models()?;
        let y = outcome_model.predict(x.view())?;
        let mean = utility_model.posterior_mean(y.view())?;
        let best = mean
            .argmax()
            .map_err(|e| BopeError::NumericalInstabilityError(e.to_string()))?;
        let best_x = x.select(Axis(0), &[best]);
        let util = self.util.utility(self.problem.evaluate_true(best_x.view()).view())[0];
        Ok((best_x, util))
    }

    fn check_posterior_best(&mut self) -> Result<()> {
        let (best_x, util) = self.posterior_best_design()?;
        self.best_util = self.best_util.max(util);
        self.best_design = Some(best_x);
        self.record.within_session.push(WithinSessionRecord {
            iteration: self.iteration,
            n_comps: self.comparisons.len(),
            util,
            best_util_so_far: self.best_util,
        });
        debug!(
            "{}/{} {} comparisons: posterior best design utility {:.4}",
            self.method,
            self.strategy,
            self.comparisons.len(),
            util
        );
        Ok(())
    }

    fn pe_subloop(&mut self) -> Result<Stage> {
        for k in 1..=self.config.comps_per_iteration {
            self.query_comparison()?;
            if k % self.config.n_check_post_mean == 0 || k == self.config.comps_per_iteration {
                self.check_posterior_best()?;
            }
        }
        info!(
            "{}/{} iteration {}: {} comparisons, best utility so far {:.4}",
            self.method,
            self.strategy,
            self.iteration,
            self.comparisons.len(),
            self.best_util
        );
        Ok(Stage::Checkpoint)
    }

    fn checkpoint(&mut self) -> Result<Stage> {
        let best_x = match self.best_design.take() {
            Some(x) => x,
            None => self.posterior_best_design()?.0,
        };
        let best_y = self.problem.evaluate(best_x.view(), &mut self.rng);
        let util = self.util.utility(self.problem.evaluate_true(best_x.view()).view())[0];
        self.best_util = self.best_util.max(util);
        match self.samples.as_mut() {
            Some(samples) => samples.append(&best_x, &best_y)?,
            None => {
                return Err(BopeError::InvalidValueError(
                    "no outcome sample yet".to_string(),
                ))
            }
        }

        let (_, utility_model) = self.models()?;
        let mut rng = self.stream_rng("diagnostics/utility", self.iteration);
        let util_fit_tau = check_util_model_fit(
            utility_model,
            self.problem,
            self.util,
            self.config.n_test,
            &UtilFitOptions::default(),
            &mut rng,
        )?;
        let record = IterationRecord {
            iteration: self.iteration,
            n_comps: self.comparisons.len(),
            n_outcomes: self.samples_ref()?.len(),
            latent_dim: self.subspace_ref()?.latent_dim(),
            recovery_error: self.pending.recovery_error,
            grassmannian: self.pending.grassmannian,
            outcome_fit_error: self.pending.outcome_fit_error,
            util_fit_tau,
            util,
            best_util_so_far: self.best_util,
            joint_converged: self.joint_converged,
        };
        self.record.iterations.push(record);

        if let Some(dir) = self.config.checkpoint_dir() {
            let checkpointer = Checkpointer::new(dir);
            checkpointer.save_run(&self.record)?;
            checkpointer.save_samples(
                self.config.seed,
                self.method.name(),
                self.strategy.name(),
                self.samples_ref()?,
            )?;
        }
        info!(
            "{}/{} iteration {} done: design utility {:.4}, util fit tau {:.3}",
            self.method, self.strategy, self.iteration, util, util_fit_tau
        );

        self.iteration += 1;
        Ok(if self.iteration < self.config.outer_iterations {
            Stage::SubspaceFit
        } else {
            Stage::Done
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Preference exploration experiment of one trial
pub struct BopeExperiment<'a> {
    problem: &'a dyn TestProblem,
    util: &'a dyn UtilityFunction,
    methods: Vec<String>,
    strategies: Vec<PeStrategy>,
    config: BopeConfig,
}

impl<'a> BopeExperiment<'a> {
    /// Experiment running every named method with every named strategy
    pub fn new(
        problem: &'a dyn TestProblem,
        util: &'a dyn UtilityFunction,
        methods: &[&str],
        strategies: &[&str],
        config: BopeConfig,
    ) -> Result<Self> {
        config.validate()?;
        if methods.is_empty() || strategies.is_empty() {
            return Err(BopeError::InvalidConfigError(
                "at least one method and one strategy are needed".to_string(),
            ));
        }
        let mut config = config;
        if config.settings.true_axes.is_none() {
            if let Some(axes) = problem.true_axes() {
                config.settings.true_axes = Some(lowrank_subspace::Projection::new(axes)?);
            }
        }
        for method in methods {
            SubspaceMethod::from_name(method, &config.settings)?;
        }
        let strategies = strategies
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<PeStrategy>>>()?;
        Ok(BopeExperiment {
            problem,
            util,
            methods: methods.iter().map(|m| m.to_string()).collect(),
            strategies,
            config,
        })
    }

    /// Experiment configuration
    pub fn config(&self) -> &BopeConfig {
        &self.config
    }

    fn run_one(&self, method: &str, strategy: PeStrategy) -> RunRecord {
        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<RunRecord> {
            let method = SubspaceMethod::from_name(method, &self.config.settings)?;
            Ok(Pipeline::new(self.problem, self.util, method, strategy, &self.config)?.run())
        }));
        let failure = match outcome {
            Ok(Ok(record)) => return record,
            Ok(Err(err)) => err,
            Err(payload) => BopeError::PanicError(panic_message(payload)),
        };
        warn!(
            "Pipeline {}/{} of trial {} aborted: {}",
            method, strategy, self.config.seed, failure
        );
        let mut record = RunRecord::new(method, strategy.name(), self.config.seed);
        record.status = RunStatus::Failed {
            error: failure.to_string(),
            iteration: 0,
        };
        record
    }

    /// Runs every (method, strategy) pipeline, in parallel when configured, and
    /// merges their results.
    ///
    /// A failing pipeline is recorded as such and does not stop the others.
    pub fn run(&self) -> Result<ExperimentLog> {
        let combinations: Vec<(&str, PeStrategy)> = self
            .methods
            .iter()
            .flat_map(|m| self.strategies.iter().map(move |s| (m.as_str(), *s)))
            .collect();
        info!(
            "Running {} pipelines of trial {}",
            combinations.len(),
            self.config.seed
        );
        let records: Vec<RunRecord> = if self.config.parallel {
            combinations
                .into_par_iter()
                .map(|(m, s)| self.run_one(m, s))
                .collect()
        } else {
            combinations
                .into_iter()
                .map(|(m, s)| self.run_one(m, s))
                .collect()
        };
        let mut log = ExperimentLog::new();
        for record in records {
            log.insert(record);
        }
        if let Some(dir) = self.config.checkpoint_dir() {
            Checkpointer::new(dir).save_log(&log)?;
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{generate_principal_axes, LinearUtil, SyntheticProblem};
    use approx::assert_abs_diff_eq;
    use lowrank_models::JointTrainConfig;
    use lowrank_subspace::AutoencoderConfig;
    use ndarray::s;

    fn small_config() -> BopeConfig {
        BopeConfig::new()
            .initial_design(8)
            .initial_comps(3)
            .comps_per_iteration(2)
            .n_check_post_mean(1)
            .n_candidates(6)
            .n_design_candidates(16)
            .n_test(10)
            .model_n_start(1)
            .parallel(false)
    }

    fn setup() -> (SyntheticProblem, LinearUtil) {
        let axes = generate_principal_axes(4, 1, 0).unwrap();
        let problem = SyntheticProblem::builder(1, axes.clone()).seed(2).build().unwrap();
        (problem, LinearUtil::new(axes.row(0).to_owned()))
    }

    #[test]
    fn test_derive_seed() {
        assert_eq!(derive_seed(1, "a", 0), derive_seed(1, "a", 0));
        assert_ne!(derive_seed(1, "a", 0), derive_seed(1, "b", 0));
        assert_ne!(derive_seed(1, "a", 0), derive_seed(1, "a", 1));
        assert_ne!(derive_seed(1, "a", 0), derive_seed(2, "a", 0));
    }

    #[test]
    fn test_pipeline_stages() {
        let (problem, util) = setup();
        let config = small_config();
        let method = SubspaceMethod::Standard;
        let mut pipeline =
            Pipeline::new(&problem, &util, method, PeStrategy::RandomF, &config).unwrap();
        let expected = [
            Stage::OutcomeWarmup,
            Stage::SubspaceFit,
            Stage::ModelFit,
            Stage::PeSubloop,
            Stage::Checkpoint,
            Stage::Done,
        ];
        for stage in expected {
            assert_eq!(pipeline.step().unwrap(), stage);
        }
        assert_eq!(pipeline.comparisons().len(), 5);
        assert_eq!(pipeline.samples().unwrap().len(), 9);
        let record = pipeline.record();
        assert_eq!(record.iterations.len(), 1);
        assert_eq!(record.within_session.len(), 2);
        assert!(record.iterations[0].recovery_error.is_some());
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let (problem, util) = setup();
        let config = small_config();
        assert!(BopeExperiment::new(&problem, &util, &["nope"], &["Random-f"], config).is_err());
        assert!(BopeExperiment::new(&problem, &util, &["st"], &["qNEI"], small_config()).is_err());
    }

    #[test]
    fn test_failing_pipeline_does_not_stop_others() {
        let (problem, util) = setup();
        // more random axes than outcome dimensions cannot be drawn
        let mut config = small_config();
        config.settings.latent_dim = 5;
        let methods = ["st", "random_linear_proj"];
        let experiment =
            BopeExperiment::new(&problem, &util, &methods, &["Random-f"], config).unwrap();
        let log = experiment.run().unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.get(0, "st", "Random-f").unwrap().is_completed());
        let failed = log.get(0, "random_linear_proj", "Random-f").unwrap();
        assert!(matches!(failed.status, RunStatus::Failed { iteration: 0, .. }));
    }

    #[test]
    fn test_unlabeled_outcomes_complete_the_samples() {
        let (problem, util) = setup();
        let config = small_config().n_unlabeled(5);
        let method = SubspaceMethod::from_name("pca", &config.settings).unwrap();
        let mut pipeline =
            Pipeline::new(&problem, &util, method, PeStrategy::RandomF, &config).unwrap();
        while pipeline.stage() != Stage::ModelFit {
            pipeline.step().unwrap();
        }
        let y = &pipeline.samples().unwrap().y;
        assert_eq!(pipeline.unlabeled.dim(), (y.nrows() + 5, 4));
        assert_abs_diff_eq!(pipeline.unlabeled.slice(s![..y.nrows(), ..]), y.view());
        assert_eq!(pipeline.step().unwrap(), Stage::PeSubloop);
    }

    #[test]
    fn test_autoencoder_diagnostics_describe_the_jointly_trained_encoder() {
        let (problem, util) = setup();
        let config = small_config().joint(JointTrainConfig::new().epochs(5));
        let method = SubspaceMethod::Autoencoder(AutoencoderConfig {
            latent_dim: 1,
            pretrain_epochs: 20,
            lr: 1e-2,
        });
        let mut pipeline =
            Pipeline::new(&problem, &util, method, PeStrategy::RandomF, &config).unwrap();
        while pipeline.stage() != Stage::ModelFit {
            pipeline.step().unwrap();
        }
        let pretrained = pipeline.subspace_ref().unwrap().projection().unwrap();
        assert!(pipeline.pending.recovery_error.is_none());
        assert_eq!(pipeline.step().unwrap(), Stage::PeSubloop);

        let trained = pipeline.subspace_ref().unwrap().projection().unwrap();
        let moved = (trained.axes() - pretrained.axes()).mapv(f64::abs).sum();
        assert!(moved > 0.);
        let true_axes = problem.true_axes().unwrap();
        assert_abs_diff_eq!(
            pipeline.pending.recovery_error.unwrap(),
            subspace_recovery_error(trained.axes(), &true_axes).unwrap(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            pipeline.pending.grassmannian.unwrap(),
            compute_span_grassmannian(trained.axes(), &true_axes).unwrap().distance,
            epsilon = 1e-12
        );
        assert!(pipeline.joint_converged.is_some());
    }
}
