//! Outcome samples and pairwise comparisons accumulated along an experiment.
use crate::errors::{BopeError, Result};
use crate::problem::{generate_random_inputs, TestProblem, UtilityFunction};

use ndarray::{concatenate, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};

/// Design inputs with their observed outcomes, growing over iterations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeSamples {
    /// Inputs `(n, input_dim)`
    pub x: Array2<f64>,
    /// Outcomes `(n, outcome_dim)`
    pub y: Array2<f64>,
}

impl OutcomeSamples {
    /// Constructor, `x` and `y` must have the same number of rows
    pub fn new(x: Array2<f64>, y: Array2<f64>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(BopeError::DimensionMismatchError {
                expected: x.nrows(),
                actual: y.nrows(),
            });
        }
        Ok(OutcomeSamples { x, y })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    /// Whether there is no sample
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends new samples
    pub fn append(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<()> {
        if x.nrows() != y.nrows() || x.ncols() != self.x.ncols() || y.ncols() != self.y.ncols() {
            return Err(BopeError::InvalidValueError(format!(
                "cannot append samples of shapes {:?} and {:?} to ({}, {}) and ({}, {})",
                x.dim(),
                y.dim(),
                self.len(),
                self.x.ncols(),
                self.len(),
                self.y.ncols()
            )));
        }
        self.x = concatenate![Axis(0), self.x.view(), x.view()];
        self.y = concatenate![Axis(0), self.y.view(), y.view()];
        Ok(())
    }
}

/// Compared outcomes and comparison results.
///
/// Comparisons are `[winner, loser]` rows indexing `outcomes`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComparisonSet {
    outcomes: Array2<f64>,
    comparisons: Array2<usize>,
}

impl ComparisonSet {
    /// An empty set of comparisons between outcomes of dimension `outcome_dim`
    pub fn new(outcome_dim: usize) -> Self {
        ComparisonSet {
            outcomes: Array2::zeros((0, outcome_dim)),
            comparisons: Array2::zeros((0, 2)),
        }
    }

    /// Set made of `outcomes` and `comparisons` rows indexing them
    pub fn from_parts(outcomes: Array2<f64>, comparisons: Array2<usize>) -> Result<Self> {
        if comparisons.ncols() != 2 {
            return Err(BopeError::DimensionMismatchError {
                expected: 2,
                actual: comparisons.ncols(),
            });
        }
        for row in comparisons.rows() {
            if row[0] >= outcomes.nrows() || row[1] >= outcomes.nrows() || row[0] == row[1] {
                return Err(BopeError::InvalidValueError(format!(
                    "invalid comparison {row} between {} outcomes",
                    outcomes.nrows()
                )));
            }
        }
        Ok(ComparisonSet {
            outcomes,
            comparisons,
        })
    }

    /// Compared outcomes
    pub fn outcomes(&self) -> &Array2<f64> {
        &self.outcomes
    }

    /// `[winner, loser]` rows
    pub fn comparisons(&self) -> &Array2<usize> {
        &self.comparisons
    }

    /// Number of comparisons
    pub fn len(&self) -> usize {
        self.comparisons.nrows()
    }

    /// Whether no comparison was made yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records that `pair[preferred]` was preferred to the other outcome of the pair
    pub fn push_pair(
        &mut self,
        y0: ArrayView1<f64>,
        y1: ArrayView1<f64>,
        preferred: usize,
    ) -> Result<()> {
        if preferred > 1 {
            return Err(BopeError::InvalidValueError(format!(
                "preferred index should be 0 or 1, got {preferred}"
            )));
        }
        let dim = self.outcomes.ncols();
        if y0.len() != dim || y1.len() != dim {
            return Err(BopeError::DimensionMismatchError {
                expected: dim,
                actual: if y0.len() != dim { y0.len() } else { y1.len() },
            });
        }
        let n = self.outcomes.nrows();
        self.outcomes = concatenate![
            Axis(0),
            self.outcomes.view(),
            y0.insert_axis(Axis(0)),
            y1.insert_axis(Axis(0))
        ];
        let row = Array2::from_shape_vec((1, 2), vec![n + preferred, n + 1 - preferred])
            .map_err(|e| BopeError::InvalidValueError(e.to_string()))?;
        self.comparisons = concatenate![Axis(0), self.comparisons.view(), row.view()];
        Ok(())
    }
}

/// Comparisons of consecutive outcome pairs `(2i, 2i+1)` given their utilities,
/// noisy when `noise_std > 0`, as `[winner, loser]` rows
pub fn make_comparisons(
    utils: &Array1<f64>,
    noise_std: f64,
    rng: &mut Xoshiro256Plus,
) -> Result<Array2<usize>> {
    let n = utils.len();
    if n % 2 != 0 {
        return Err(BopeError::InvalidValueError(format!(
            "comparisons need an even number of outcomes, got {n}"
        )));
    }
    let noisy = if noise_std > 0. {
        utils + &(Array1::<f64>::random_using(n, StandardNormal, rng) * noise_std)
    } else {
        utils.to_owned()
    };
    let comps = Array2::from_shape_fn((n / 2, 2), |(i, j)| {
        let first_wins = noisy[2 * i] >= noisy[2 * i + 1];
        match (first_wins, j) {
            (true, 0) | (false, 1) => 2 * i,
            _ => 2 * i + 1,
        }
    });
    Ok(comps)
}

/// Random designs with their noise free outcomes compared in consecutive pairs.
///
/// `n` must be even: comparison `i` is always between outcomes `2i` and `2i+1`.
pub fn gen_initial_real_data(
    n: usize,
    problem: &dyn TestProblem,
    util: &dyn UtilityFunction,
    comp_noise: f64,
    rng: &mut Xoshiro256Plus,
) -> Result<(Array2<f64>, Array2<f64>, Array2<usize>)> {
    let x = generate_random_inputs(problem, n, rng)?;
    let y = problem.evaluate_true(x.view());
    let utils = util.utility(y.view());
    let comps = make_comparisons(&utils, comp_noise, rng)?;
    Ok((x, y, comps))
}

/// Checks that comparison `i` involves exactly outcomes `2i` and `2i+1` out of `n_outcomes`
pub fn validate_adjacent_pairs(
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    n_outcomes: usize,
) -> Result<()> {
    if comparisons.ncols() != 2 {
        return Err(BopeError::DimensionMismatchError {
            expected: 2,
            actual: comparisons.ncols(),
        });
    }
    if 2 * comparisons.nrows() != n_outcomes {
        return Err(BopeError::InvalidValueError(format!(
            "{} adjacent comparisons cannot cover {n_outcomes} outcomes",
            comparisons.nrows()
        )));
    }
    for (i, row) in comparisons.rows().into_iter().enumerate() {
        let (lo, hi) = (row[0].min(row[1]), row[0].max(row[1]));
        if lo != 2 * i || hi != 2 * i + 1 {
            return Err(BopeError::InvalidValueError(format!(
                "comparison {i} is {row}, expected outcomes {} and {}",
                2 * i,
                2 * i + 1
            )));
        }
    }
    Ok(())
}
