use crate::errors::Result;
use crate::traits::{check_xlimits, SamplingMethod};
use ndarray::{Array, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{rand::SeedableRng, rand_distr::Uniform, RandomExt};
use rand_xoshiro::Xoshiro256Plus;

/// The Random design consists in drawing samples uniformly in the sample space.
#[derive(Clone, Debug)]
pub struct Random {
    xlimits: Array2<f64>,
    rng: Xoshiro256Plus,
}

impl Random {
    /// Constructor given a design space as a (nx, 2) matrix \[\[lower bound, upper bound\], ...\]
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Self> {
        check_xlimits(xlimits)?;
        Ok(Random {
            xlimits: xlimits.to_owned(),
            rng: Xoshiro256Plus::from_entropy(),
        })
    }

    /// Sets the random generator
    pub fn with_rng(mut self, rng: Xoshiro256Plus) -> Self {
        self.rng = rng;
        self
    }

    /// Seeds the random generator
    pub fn seed(self, seed: u64) -> Self {
        self.with_rng(Xoshiro256Plus::seed_from_u64(seed))
    }
}

impl SamplingMethod for Random {
    fn sampling_space(&self) -> &Array2<f64> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<f64> {
        let mut rng = self.rng.clone();
        let nx = self.xlimits.nrows();
        Array::random_using((ns, nx), Uniform::new(0., 1.), &mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn test_random() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let actual = Random::new(&xlimits).unwrap().seed(42).sample(9);
        assert_eq!(actual.dim(), (9, 2));
        assert!(actual.column(0).iter().all(|v| (5. ..10.).contains(v)));
        assert!(actual.column(1).iter().all(|v| (0. ..1.).contains(v)));
        assert_abs_diff_eq!(actual, Random::new(&xlimits).unwrap().seed(42).sample(9));
    }

    #[test]
    fn test_random_invalid_space() {
        assert!(Random::new(&arr2(&[[1., 0.]])).is_err());
    }
}
