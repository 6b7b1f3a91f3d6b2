use crate::errors::Result;
use crate::traits::{check_xlimits, SamplingMethod};
use crate::utils::pdist;
use ndarray::{s, Array, Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{
    rand::seq::SliceRandom, rand::SeedableRng, rand_distr::Uniform, RandomExt,
};
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;

/// Number of candidate designs drawn by maximin LHS
const MAXIMIN_N_ITER: usize = 5;

/// Point placement within Latin hypercube cells
#[derive(Clone, Debug, Default, Copy, PartialEq, Eq)]
pub enum LhsKind {
    /// uniform draw inside each cell
    Classic,
    /// center of each cell
    Centered,
    /// best of several classic designs with regard to the minimal distance between points
    #[default]
    Maximin,
}

/// Latin hypercube sampling: every input range is split into `n` equal cells, `n`
/// being the sample size, and each cell of each input holds exactly one point.
///
/// Sampling twice with the same generator state gives the same design,
/// the random generator is cloned on each call.
#[derive(Clone, Debug)]
pub struct Lhs {
    xlimits: Array2<f64>,
    kind: LhsKind,
    rng: Xoshiro256Plus,
}

impl Lhs {
    /// Constructor given a design space as a (nx, 2) matrix \[\[lower bound, upper bound\], ...\]
    ///
    /// ```
    /// use lowrank_doe::Lhs;
    /// use ndarray::arr2;
    ///
    /// let doe = Lhs::new(&arr2(&[[0.0, 1.0], [5.0, 10.0]])).unwrap();
    /// ```
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Self> {
        check_xlimits(xlimits)?;
        Ok(Lhs {
            xlimits: xlimits.to_owned(),
            kind: LhsKind::default(),
            rng: Xoshiro256Plus::from_entropy(),
        })
    }

    /// Sets the kind of LHS
    pub fn kind(mut self, kind: LhsKind) -> Self {
        self.kind = kind;
        self
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

    fn classic_lhs(&self, ns: usize, rng: &mut Xoshiro256Plus) -> Array2<f64> {
        let nx = self.xlimits.nrows();
        let cut = Array::linspace(0., 1., ns + 1);
        let lower = cut.slice(s![..ns]);
        let width = &cut.slice(s![1..]) - &lower;

        let rnd = Array::random_using((ns, nx), Uniform::new(0., 1.), rng);
        let mut lhs = Array2::zeros((ns, nx));
        for j in 0..nx {
            let mut col: Vec<f64> = (&rnd.column(j) * &width + &lower).to_vec();
            col.shuffle(rng);
            lhs.column_mut(j).assign(&Array1::from(col));
        }
        lhs
    }

    fn centered_lhs(&self, ns: usize, rng: &mut Xoshiro256Plus) -> Array2<f64> {
        let nx = self.xlimits.nrows();
        let mut centers: Vec<f64> = (0..ns).map(|i| (i as f64 + 0.5) / ns as f64).collect();
        let mut lhs = Array2::zeros((ns, nx));
        for j in 0..nx {
            centers.shuffle(rng);
            lhs.column_mut(j).assign(&Array1::from(centers.clone()));
        }
        lhs
    }

    fn maximin_lhs(&self, ns: usize, rng: &mut Xoshiro256Plus) -> Array2<f64> {
        let mut best = self.classic_lhs(ns, rng);
        if ns < 2 {
            return best;
        }
        let mut best_dist = min_distance(&best);
        for _ in 1..MAXIMIN_N_ITER {
            let lhs = self.classic_lhs(ns, rng);
            let d = min_distance(&lhs);
            if d > best_dist {
                best_dist = d;
                best = lhs;
            }
        }
        best
    }
}

fn min_distance(x: &Array2<f64>) -> f64 {
    pdist(x).min().map(|v| *v).unwrap_or(f64::INFINITY)
}

impl SamplingMethod for Lhs {
    fn sampling_space(&self) -> &Array2<f64> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<f64> {
        let mut rng = self.rng.clone();
        match self.kind {
            LhsKind::Classic => self.classic_lhs(ns, &mut rng),
            LhsKind::Centered => self.centered_lhs(ns, &mut rng),
            LhsKind::Maximin => self.maximin_lhs(ns, &mut rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Axis};

    fn assert_latin(doe: &Array2<f64>) {
        let ns = doe.nrows();
        for col in doe.axis_iter(Axis(1)) {
            let mut bins: Vec<usize> = col.iter().map(|v| (v * ns as f64) as usize).collect();
            bins.sort_unstable();
            assert_eq!(bins, (0..ns).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_lhs_kinds_are_latin() {
        let xlimits = arr2(&[[0., 1.], [0., 1.], [0., 1.]]);
        for kind in [LhsKind::Classic, LhsKind::Centered, LhsKind::Maximin] {
            let doe = Lhs::new(&xlimits).unwrap().kind(kind).seed(42);
            assert_latin(&doe.normalized_sample(12));
        }
    }

    #[test]
    fn test_lhs_scaled_to_bounds() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let actual = Lhs::new(&xlimits).unwrap().seed(42).sample(20);
        assert_eq!(actual.dim(), (20, 2));
        assert!(actual.column(0).iter().all(|v| (5. ..=10.).contains(v)));
        assert!(actual.column(1).iter().all(|v| (0. ..=1.).contains(v)));
    }

    #[test]
    fn test_lhs_is_reproducible() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let doe = Lhs::new(&xlimits).unwrap().seed(7);
        let first = doe.sample(8);
        assert_abs_diff_eq!(first, doe.sample(8));
        assert_abs_diff_eq!(first, Lhs::new(&xlimits).unwrap().seed(7).sample(8));
    }

    #[test]
    fn test_centered_lhs() {
        let xlimits = arr2(&[[5., 10.], [0., 1.]]);
        let actual = Lhs::new(&xlimits)
            .unwrap()
            .kind(LhsKind::Centered)
            .seed(0)
            .sample(5);
        let mut col0 = actual.column(0).to_vec();
        col0.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_abs_diff_eq!(
            Array1::from(col0),
            ndarray::array![5.5, 6.5, 7.5, 8.5, 9.5],
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_maximin_not_worse_than_first_draw() {
        let xlimits = arr2(&[[0., 1.], [0., 1.]]);
        let lhs = Lhs::new(&xlimits).unwrap().seed(3);
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let first = lhs.classic_lhs(10, &mut rng);
        let maximin = lhs.kind(LhsKind::Maximin).normalized_sample(10);
        assert!(min_distance(&maximin) >= min_distance(&first));
    }

    #[test]
    fn test_single_point() {
        let xlimits = arr2(&[[0., 1.]]);
        let actual = Lhs::new(&xlimits).unwrap().seed(1).sample(1);
        assert_eq!(actual.dim(), (1, 1));
    }
}
