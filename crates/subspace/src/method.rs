//! Uniform dispatch over subspace learning methods.
use crate::autoencoder::{Autoencoder, AutoencoderConfig, FrozenAutoencoder};
use crate::errors::{Result, SubspaceError};
use crate::pca::PcaValidParams;
use crate::pcr::PcrValidParams;
use crate::projection::{Embedding, Projection};
use crate::random::{random_linear_projection, random_subset_projection};

use log::info;
use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcomes available to learn a subspace
#[derive(Clone, Debug)]
pub struct SubspaceData<'a> {
    /// Outcomes without preference labels, possibly empty
    pub unlabeled: ArrayView2<'a, f64>,
    /// Outcomes involved in pairwise comparisons
    pub labeled: ArrayView2<'a, f64>,
    /// Comparisons as `[winner, loser]` rows indexing `labeled`
    pub comparisons: ArrayView2<'a, usize>,
}

impl<'a> SubspaceData<'a> {
    /// Outcomes used by unsupervised methods: unlabeled ones when there are some,
    /// labeled ones otherwise
    pub fn fitting_outcomes(&self) -> ArrayView2<'a, f64> {
        if self.unlabeled.nrows() > 0 {
            self.unlabeled
        } else {
            self.labeled
        }
    }

    /// Outcome dimension
    pub fn outcome_dim(&self) -> usize {
        self.labeled.ncols()
    }
}

/// Settings shared by the methods built from their names
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodSettings {
    /// PCA parameters
    pub pca: PcaValidParams,
    /// PCR parameters
    pub pcr: PcrValidParams,
    /// Latent dimension of random projections
    pub latent_dim: usize,
    /// Autoencoder settings
    pub autoencoder: AutoencoderConfig,
    /// Ground truth axes when known
    pub true_axes: Option<Projection>,
}

impl Default for MethodSettings {
    fn default() -> Self {
        MethodSettings {
            pca: PcaValidParams::default(),
            pcr: PcrValidParams::default(),
            latent_dim: 2,
            autoencoder: AutoencoderConfig::default(),
            true_axes: None,
        }
    }
}

/// A subspace learning method
#[derive(Clone, Debug)]
pub enum SubspaceMethod {
    /// No reduction, `st`
    Standard,
    /// Principal component analysis, `pca`
    Pca(PcaValidParams),
    /// Principal component regression on preferences, `pcr`
    Pcr(PcrValidParams),
    /// Oracle projection on known axes, `true_proj`
    TrueProjection(Projection),
    /// Random orthonormal projection, `random_linear_proj`
    RandomLinear {
        /// number of axes
        latent_dim: usize,
    },
    /// Random subset of outcome coordinates, `random_subset`
    RandomSubset {
        /// number of coordinates
        latent_dim: usize,
    },
    /// Pretrained autoencoder, `autoencoder`
    Autoencoder(AutoencoderConfig),
}

impl SubspaceMethod {
    /// Every known method name
    pub const NAMES: [&'static str; 7] = [
        "st",
        "pca",
        "pcr",
        "true_proj",
        "random_linear_proj",
        "random_subset",
        "autoencoder",
    ];

    /// Builds the method registered under `name`
    pub fn from_name(name: &str, settings: &MethodSettings) -> Result<Self> {
        let method = match name {
            "st" => SubspaceMethod::Standard,
            "pca" => SubspaceMethod::Pca(settings.pca.clone()),
            "pcr" => SubspaceMethod::Pcr(settings.pcr.clone()),
            "true_proj" => match &settings.true_axes {
                Some(axes) => SubspaceMethod::TrueProjection(axes.clone()),
                None => {
                    return Err(SubspaceError::InvalidValueError(
                        "true_proj requires known ground truth axes".to_string(),
                    ))
                }
            },
            "random_linear_proj" => SubspaceMethod::RandomLinear {
                latent_dim: settings.latent_dim,
            },
            "random_subset" => SubspaceMethod::RandomSubset {
                latent_dim: settings.latent_dim,
            },
            "autoencoder" => SubspaceMethod::Autoencoder(settings.autoencoder.clone()),
            other => {
                return Err(SubspaceError::InvalidValueError(format!(
                    "unknown subspace method {other}, expected one of {:?}",
                    Self::NAMES
                )))
            }
        };
        Ok(method)
    }

    /// Name of the method
    pub fn name(&self) -> &'static str {
        match self {
            SubspaceMethod::Standard => "st",
            SubspaceMethod::Pca(_) => "pca",
            SubspaceMethod::Pcr(_) => "pcr",
            SubspaceMethod::TrueProjection(_) => "true_proj",
            SubspaceMethod::RandomLinear { .. } => "random_linear_proj",
            SubspaceMethod::RandomSubset { .. } => "random_subset",
            SubspaceMethod::Autoencoder(_) => "autoencoder",
        }
    }

    /// Learns the subspace from the given outcomes, stochastic methods use `seed`
    pub fn fit(&self, data: &SubspaceData, seed: u64) -> Result<FittedSubspace> {
        let outcome_dim = data.outcome_dim();
        let outcomes = data.fitting_outcomes();
        if outcomes.ncols() != outcome_dim {
            return Err(SubspaceError::DimensionMismatchError {
                expected: outcome_dim,
                actual: outcomes.ncols(),
            });
        }
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let fitted = match self {
            SubspaceMethod::Standard => FittedSubspace::Identity(outcome_dim),
            SubspaceMethod::Pca(params) => {
                FittedSubspace::Linear(params.fit_outcomes(&outcomes)?.into_projection())
            }
            SubspaceMethod::Pcr(params) => FittedSubspace::Linear(
                params
                    .fit_comparisons(&data.labeled, &data.comparisons)?
                    .into_projection(),
            ),
            SubspaceMethod::TrueProjection(axes) => {
                if axes.outcome_dim() != outcome_dim {
                    return Err(SubspaceError::DimensionMismatchError {
                        expected: outcome_dim,
                        actual: axes.outcome_dim(),
                    });
                }
                FittedSubspace::Linear(axes.clone())
            }
            SubspaceMethod::RandomLinear { latent_dim } => FittedSubspace::Linear(
                random_linear_projection(*latent_dim, outcome_dim, &mut rng)?,
            ),
            SubspaceMethod::RandomSubset { latent_dim } => FittedSubspace::Linear(
                random_subset_projection(*latent_dim, outcome_dim, &mut rng)?,
            ),
            SubspaceMethod::Autoencoder(config) => {
                if outcomes.nrows() == 0 {
                    return Err(SubspaceError::EmptyDataError);
                }
                let ae = Autoencoder::pretrained(config, &outcomes, &mut rng)?;
                FittedSubspace::Encoded(ae.snapshot())
            }
        };
        info!(
            "Subspace method {} fitted on {} outcomes: latent dim {}",
            self.name(),
            outcomes.nrows(),
            fitted.latent_dim()
        );
        Ok(fitted)
    }
}

impl fmt::Display for SubspaceMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SubspaceMethod {
    type Err = SubspaceError;

    /// Builds the named method with default settings
    fn from_str(name: &str) -> Result<Self> {
        SubspaceMethod::from_name(name, &MethodSettings::default())
    }
}

/// A learned subspace
#[derive(Clone, Debug)]
pub enum FittedSubspace {
    /// The whole outcome space of the given dimension
    Identity(usize),
    /// A linear projection
    Linear(Projection),
    /// A frozen autoencoder
    Encoded(FrozenAutoencoder),
}

impl FittedSubspace {
    /// Linear approximation of the subspace: the projection itself, the identity,
    /// or the normalized encoder weights of an autoencoder
    pub fn projection(&self) -> Result<Projection> {
        match self {
            FittedSubspace::Identity(dim) => Ok(Projection::identity(*dim)),
            FittedSubspace::Linear(p) => Ok(p.clone()),
            FittedSubspace::Encoded(ae) => ae.encoder_projection(),
        }
    }
}

impl Embedding for FittedSubspace {
    fn outcome_dim(&self) -> usize {
        match self {
            FittedSubspace::Identity(dim) => *dim,
            FittedSubspace::Linear(p) => p.outcome_dim(),
            FittedSubspace::Encoded(ae) => ae.outcome_dim(),
        }
    }

    fn latent_dim(&self) -> usize {
        match self {
            FittedSubspace::Identity(dim) => *dim,
            FittedSubspace::Linear(p) => p.latent_dim(),
            FittedSubspace::Encoded(ae) => ae.latent_dim(),
        }
    }

    fn encode(&self, y: ArrayView2<f64>) -> Array2<f64> {
        match self {
            FittedSubspace::Identity(_) => y.to_owned(),
            FittedSubspace::Linear(p) => p.encode(y),
            FittedSubspace::Encoded(ae) => ae.encode(y),
        }
    }

    fn decode(&self, z: ArrayView2<f64>) -> Array2<f64> {
        match self {
            FittedSubspace::Identity(_) => z.to_owned(),
            FittedSubspace::Linear(p) => p.decode(z),
            FittedSubspace::Encoded(ae) => ae.decode(z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn data() -> (Array2<f64>, Array2<usize>) {
        let y = array![
            [1., 2., 0.5],
            [2., 4., 0.4],
            [3., 6.1, 0.6],
            [4., 8., 0.5],
            [5., 9.9, 0.3],
            [6., 12., 0.7]
        ];
        let comps = array![[1, 0], [3, 2], [5, 4]];
        (y, comps)
    }

    #[test]
    fn test_every_name_builds() {
        let settings = MethodSettings {
            latent_dim: 1,
            true_axes: Some(Projection::new(array![[1., 0., 0.]]).unwrap()),
            ..MethodSettings::default()
        };
        let (y, comps) = data();
        let empty = Array2::<f64>::zeros((0, 3));
        let data = SubspaceData {
            unlabeled: empty.view(),
            labeled: y.view(),
            comparisons: comps.view(),
        };
        for name in SubspaceMethod::NAMES {
            let method = SubspaceMethod::from_name(name, &settings).unwrap();
            assert_eq!(method.name(), name);
            let fitted = method.fit(&data, 0).unwrap();
            assert_eq!(fitted.outcome_dim(), 3);
            let z = fitted.encode(y.view());
            assert_eq!(z.dim(), (6, fitted.latent_dim()));
            assert_eq!(fitted.decode(z.view()).dim(), (6, 3));
        }
        assert!(SubspaceMethod::from_name("unknown", &settings).is_err());
    }

    #[test]
    fn test_parse_method() {
        let method: SubspaceMethod = "pca".parse().unwrap();
        assert_eq!(method.to_string(), "pca");
        assert!("true_proj".parse::<SubspaceMethod>().is_err());
    }

    #[test]
    fn test_true_proj_requires_axes() {
        assert!(SubspaceMethod::from_name("true_proj", &MethodSettings::default()).is_err());
    }

    #[test]
    fn test_fallback_to_labeled_outcomes() {
        let (y, comps) = data();
        let empty = Array2::<f64>::zeros((0, 3));
        let with_empty = SubspaceData {
            unlabeled: empty.view(),
            labeled: y.view(),
            comparisons: comps.view(),
        };
        let with_labeled = SubspaceData {
            unlabeled: y.view(),
            labeled: y.view(),
            comparisons: comps.view(),
        };
        let pca = SubspaceMethod::Pca(PcaValidParams::default());
        let p1 = pca.fit(&with_empty, 0).unwrap().projection().unwrap();
        let p2 = pca.fit(&with_labeled, 0).unwrap().projection().unwrap();
        assert_abs_diff_eq!(p1.projector(), p2.projector(), epsilon = 1e-12);
    }

    #[test]
    fn test_seeded_methods_are_reproducible() {
        let (y, comps) = data();
        let data = SubspaceData {
            unlabeled: y.view(),
            labeled: y.view(),
            comparisons: comps.view(),
        };
        let method = SubspaceMethod::RandomLinear { latent_dim: 2 };
        let a = method.fit(&data, 7).unwrap().projection().unwrap();
        let b = method.fit(&data, 7).unwrap().projection().unwrap();
        assert_eq!(a, b);
    }
}
