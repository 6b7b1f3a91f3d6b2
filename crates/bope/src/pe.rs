//! Preference exploration: choosing which pair of outcomes to compare next.
use crate::errors::{BopeError, Result};

use lowrank_models::{norm_cdf, norm_pdf, UtilityModel};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::rand::Rng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pair standard deviation below which EUBO is the larger of both means
const EUBO_MIN_STD: f64 = 1e-12;

/// Where preference exploration candidates come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    /// Posterior draws of the outcome model at random designs
    OutcomeModel,
    /// True outcomes of the problem at random designs
    TrueProblem,
}

/// A preference exploration strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeStrategy {
    /// Pair maximizing the expected utility of the best option, among outcome
    /// model draws, `EUBO-zeta`
    #[serde(rename = "EUBO-zeta")]
    EuboZeta,
    /// Random pair of true outcomes, `Random-f`
    #[serde(rename = "Random-f")]
    RandomF,
}

impl PeStrategy {
    /// Every known strategy name
    pub const NAMES: [&'static str; 2] = ["EUBO-zeta", "Random-f"];

    /// Name of the strategy
    pub fn name(&self) -> &'static str {
        match self {
            PeStrategy::EuboZeta => "EUBO-zeta",
            PeStrategy::RandomF => "Random-f",
        }
    }

    /// Where the strategy takes its candidates from
    pub fn candidate_source(&self) -> CandidateSource {
        match self {
            PeStrategy::EuboZeta => CandidateSource::OutcomeModel,
            PeStrategy::RandomF => CandidateSource::TrueProblem,
        }
    }

    /// Number of candidates the strategy needs, given the configured pool size
    pub fn n_candidates(&self, pool_size: usize) -> usize {
        match self {
            PeStrategy::EuboZeta => pool_size.max(2),
            PeStrategy::RandomF => 2,
        }
    }

    /// Indices of the candidates to compare.
    ///
    /// `EUBO-zeta` scores up to `max_pairs` random pairs (every pair when there are
    /// fewer) with the joint utility posterior and returns the best one. `Random-f`
    /// returns a random pair without looking at the model.
    pub fn select_pair(
        &self,
        model: &dyn UtilityModel,
        candidates: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        max_pairs: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(usize, usize)> {
        let n = candidates.nrows();
        if n < 2 {
            return Err(BopeError::InvalidValueError(format!(
                "at least 2 candidates are needed to select a pair, got {n}"
            )));
        }
        match self {
            PeStrategy::RandomF => Ok(random_pair(n, rng)),
            PeStrategy::EuboZeta => {
                let (mean, cov) = model.posterior(candidates.view())?;
                let pairs = candidate_pairs(n, max_pairs, rng);
                let mut best = (pairs[0], f64::NEG_INFINITY);
                for &(i, j) in pairs.iter() {
                    let m = Array1::from(vec![mean[i], mean[j]]);
                    let c = Array2::from_shape_vec(
                        (2, 2),
                        vec![cov[[i, i]], cov[[i, j]], cov[[j, i]], cov[[j, j]]],
                    )
                    .map_err(|e| BopeError::InvalidValueError(e.to_string()))?;
                    let score = eubo(&m, &c);
                    if !score.is_finite() {
                        return Err(BopeError::NumericalInstabilityError(format!(
                            "EUBO of pair ({i}, {j}) is {score}"
                        )));
                    }
                    if score > best.1 {
                        best = ((i, j), score);
                    }
                }
                Ok(best.0)
            }
        }
    }
}

impl fmt::Display for PeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PeStrategy {
    type Err = BopeError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "EUBO-zeta" => Ok(PeStrategy::EuboZeta),
            "Random-f" => Ok(PeStrategy::RandomF),
            other => Err(BopeError::InvalidConfigError(format!(
                "unknown preference exploration strategy {other}, expected one of {:?}",
                Self::NAMES
            ))),
        }
    }
}

fn random_pair(n: usize, rng: &mut Xoshiro256Plus) -> (usize, usize) {
    let i = rng.gen_range(0..n);
    let j = (i + rng.gen_range(1..n)) % n;
    (i, j)
}

fn candidate_pairs(n: usize, max_pairs: usize, rng: &mut Xoshiro256Plus) -> Vec<(usize, usize)> {
    let n_all = n * (n - 1) / 2;
    if n_all <= max_pairs.max(1) {
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect()
    } else {
        (0..max_pairs.max(1)).map(|_| random_pair(n, rng)).collect()
    }
}

/// Expected utility of the best option of a pair, `E[max(u1, u2)]`, for a gaussian
/// utility posterior of mean `mean` and covariance `cov` over the pair
pub fn eubo(mean: &Array1<f64>, cov: &Array2<f64>) -> f64 {
    let (m1, m2) = (mean[0], mean[1]);
    let var = cov[[0, 0]] + cov[[1, 1]] - cov[[0, 1]] - cov[[1, 0]];
    let sigma = var.max(0.).sqrt();
    if sigma < EUBO_MIN_STD {
        return m1.max(m2);
    }
    let d = (m1 - m2) / sigma;
    m1 * norm_cdf(d) + m2 * norm_cdf(-d) + sigma * norm_pdf(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use lowrank_models::Result as ModelResult;
    use ndarray::{array, ArrayView2};
    use ndarray_rand::rand::SeedableRng;

    struct KnownPosterior {
        mean: Array1<f64>,
        std: f64,
    }

    impl UtilityModel for KnownPosterior {
        fn input_dim(&self) -> usize {
            1
        }

        fn posterior_mean(&self, y: ArrayView2<f64>) -> ModelResult<Array1<f64>> {
            Ok(self.mean.slice(ndarray::s![..y.nrows()]).to_owned())
        }

        fn posterior_var(&self, y: ArrayView2<f64>) -> ModelResult<Array1<f64>> {
            Ok(Array1::from_elem(y.nrows(), self.std * self.std))
        }

        fn posterior(&self, y: ArrayView2<f64>) -> ModelResult<(Array1<f64>, Array2<f64>)> {
            let n = y.nrows();
            Ok((
                self.posterior_mean(y)?,
                Array2::eye(n) * (self.std * self.std),
            ))
        }
    }

    #[test]
    fn test_eubo_degenerate_and_symmetric() {
        let cov = Array2::zeros((2, 2));
        assert_abs_diff_eq!(eubo(&array![1., 3.], &cov), 3., epsilon = 1e-15);
        let cov = array![[1., 0.], [0., 1.]];
        // E[max] of two iid standard normals is 1 / sqrt(pi)
        assert_abs_diff_eq!(
            eubo(&array![0., 0.], &cov),
            (2f64).sqrt() / (2. * std::f64::consts::PI).sqrt(),
            epsilon = 1e-7
        );
        assert_abs_diff_eq!(
            eubo(&array![1., 2.], &cov),
            eubo(&array![2., 1.], &cov),
            epsilon = 1e-12
        );
        assert!(eubo(&array![1., 2.], &cov) > 2.);
    }

    #[test]
    fn test_eubo_selects_best_pair() {
        let model = KnownPosterior {
            mean: array![0., 5., 1., 4., 2.],
            std: 0.5,
        };
        let candidates = Array2::zeros((5, 1));
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let (i, j) = PeStrategy::EuboZeta
            .select_pair(&model, &candidates, 100, &mut rng)
            .unwrap();
        let mut pair = [i, j];
        pair.sort();
        assert_eq!(pair, [1, 3]);
    }

    #[test]
    fn test_random_pair_is_valid() {
        let model = KnownPosterior {
            mean: array![0., 1., 2.],
            std: 1.,
        };
        let candidates = Array2::zeros((3, 1));
        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        for _ in 0..50 {
            let (i, j) = PeStrategy::RandomF
                .select_pair(&model, &candidates, 10, &mut rng)
                .unwrap();
            assert!(i < 3 && j < 3 && i != j);
        }
        assert!(PeStrategy::RandomF
            .select_pair(&model, &Array2::zeros((1, 1)), 10, &mut rng)
            .is_err());
    }

    #[test]
    fn test_names() {
        for name in PeStrategy::NAMES {
            assert_eq!(name.parse::<PeStrategy>().unwrap().name(), name);
        }
        assert!("qNEI".parse::<PeStrategy>().is_err());
        assert_eq!(PeStrategy::EuboZeta.candidate_source(), CandidateSource::OutcomeModel);
    }
}
