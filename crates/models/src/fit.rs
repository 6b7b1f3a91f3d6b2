//! Fitting entry points used by the preference exploration loop, one per way of
//! representing outcomes: raw, linearly projected or autoencoded.
use crate::errors::{ModelError, Result};
use crate::joint::{JointTrainConfig, JointTrainOutput, JointTrainer};
use crate::outcome::{OutcomeGp, OutcomeGpValidParams};
use crate::pairwise::{PairwiseGp, PairwiseGpValidParams};
use crate::projected::{ProjectedOutcomeModel, ProjectedUtilityModel};
use crate::traits::OutcomeModel;

use log::info;
use lowrank_doe::{Lhs, SamplingMethod};
use lowrank_subspace::{
    Autoencoder, AutoencoderConfig, Embedding, FittedSubspace, FrozenAutoencoder,
};
use ndarray::{concatenate, Array2, ArrayBase, Axis, Data, Ix2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// Preference model on raw outcomes
pub fn fit_standard_utility_model(
    outcomes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    params: &PairwiseGpValidParams,
) -> Result<PairwiseGp> {
    params.fit_comparisons(outcomes, comparisons)
}

/// Preference model on the embeddings of outcomes through `embedding`, returned in
/// evaluation mode so that it consumes raw outcomes
pub fn fit_projected_utility_model(
    outcomes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    embedding: &FittedSubspace,
    params: &PairwiseGpValidParams,
) -> Result<ProjectedUtilityModel> {
    check_outcome_dim(embedding, outcomes.ncols())?;
    let z = embedding.encode(outcomes.view());
    let model = params.fit_comparisons(&z, comparisons)?;
    ProjectedUtilityModel::with_embedding(model, embedding)
}

/// Pretrains an autoencoder on `unlabeled` outcomes (labeled ones when empty) then
/// trains it jointly with a preference model on the labeled outcomes
pub fn fit_autoencoded_utility_model(
    outcomes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    unlabeled: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    autoencoder: &AutoencoderConfig,
    joint: &JointTrainConfig,
    params: &PairwiseGpValidParams,
    seed: u64,
) -> Result<JointTrainOutput> {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let ae = if unlabeled.nrows() > 0 {
        Autoencoder::pretrained(autoencoder, unlabeled, &mut rng)?
    } else {
        Autoencoder::pretrained(autoencoder, outcomes, &mut rng)?
    };
    fit_pretrained_autoencoded_utility_model(outcomes, comparisons, &ae.snapshot(), joint, params)
}

/// Trains a copy of an already pretrained autoencoder jointly with a preference model
/// on the labeled outcomes, `pretrained` itself is left untouched
pub fn fit_pretrained_autoencoded_utility_model(
    outcomes: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    pretrained: &FrozenAutoencoder,
    joint: &JointTrainConfig,
    params: &PairwiseGpValidParams,
) -> Result<JointTrainOutput> {
    info!(
        "Joint training of the pretrained autoencoder on {} outcomes and {} comparisons",
        outcomes.nrows(),
        comparisons.nrows()
    );
    JointTrainer::new(pretrained.thaw(), outcomes, comparisons, params, joint.clone())?.train()
}

/// Outcome model on raw outcomes
pub fn fit_standard_outcome_model(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    params: &OutcomeGpValidParams,
) -> Result<OutcomeGp> {
    params.fit_outcomes(x, y)
}

/// Outcome model of the embeddings of outcomes, returned in evaluation mode so that
/// it predicts decoded outcomes
pub fn fit_projected_outcome_model(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    embedding: &FittedSubspace,
    params: &OutcomeGpValidParams,
) -> Result<ProjectedOutcomeModel> {
    check_outcome_dim(embedding, y.ncols())?;
    let z = embedding.encode(y.view());
    let model = params.fit_outcomes(x, &z)?;
    ProjectedOutcomeModel::with_embedding(model, embedding)
}

/// Outcome model of the embeddings of outcomes through an already trained encoder
pub fn fit_outcome_model_under_encoder(
    x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    autoencoder: &FrozenAutoencoder,
    params: &OutcomeGpValidParams,
) -> Result<ProjectedOutcomeModel> {
    fit_projected_outcome_model(x, y, &FittedSubspace::Encoded(autoencoder.clone()), params)
}

/// Observed outcomes completed with one posterior draw of `model` at `n_samples`
/// Latin hypercube inputs within `xlimits`
pub fn unlabeled_outcomes(
    model: &dyn OutcomeModel,
    xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    n_samples: usize,
    observed: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    seed: u64,
) -> Result<Array2<f64>> {
    if observed.ncols() != model.outcome_dim() {
        return Err(ModelError::DimensionMismatchError {
            expected: model.outcome_dim(),
            actual: observed.ncols(),
        });
    }
    if n_samples == 0 {
        return Ok(observed.to_owned());
    }
    let x = Lhs::new(xlimits)?.seed(seed).sample(n_samples);
    let mut rng = Xoshiro256Plus::seed_from_u64(seed.wrapping_add(1));
    let sampled = model.sample(x.view(), &mut rng)?;
    Ok(concatenate![Axis(0), observed.view(), sampled.view()])
}

fn check_outcome_dim(embedding: &FittedSubspace, actual: usize) -> Result<()> {
    if embedding.outcome_dim() != actual {
        return Err(ModelError::DimensionMismatchError {
            expected: embedding.outcome_dim(),
            actual,
        });
    }
    Ok(())
}
