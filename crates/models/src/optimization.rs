use lowrank_doe::{Lhs, LhsKind, SamplingMethod};

use log::warn;
use ndarray::{arr1, s, Array1, Array2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// Default number of multistart for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 1000;

const MULTISTART_SEED: u64 = 42;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Starting points on log10 scale: the given guess then `n_start` maximin LHS
/// points within bounds. Returns starting points and log10 bounds.
pub(crate) fn prepare_multistart(
    n_start: usize,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
) -> (Array2<f64>, Vec<(f64, f64)>) {
    let bounds: Vec<(f64, f64)> = bounds
        .iter()
        .map(|(lo, up)| (lo.log10(), up.log10()))
        .collect();

    let mut starts = Array2::zeros((n_start + 1, param0.len()));
    starts.row_mut(0).assign(&param0.mapv(f64::log10));

    match n_start.cmp(&1) {
        std::cmp::Ordering::Equal => {
            let mut rng = Xoshiro256Plus::seed_from_u64(MULTISTART_SEED);
            let vals: Vec<f64> = bounds
                .iter()
                .map(|(a, b)| if a < b { rng.gen_range(*a..*b) } else { *a })
                .collect();
            starts.row_mut(1).assign(&Array1::from(vals))
        }
        std::cmp::Ordering::Greater => {
            let mut xlimits = Array2::zeros((bounds.len(), 2));
            Zip::from(xlimits.rows_mut())
                .and(&bounds)
                .for_each(|mut row, limits| row.assign(&arr1(&[limits.0, limits.1])));
            // Seeded: starting points only need to be spread over the bounds
            match Lhs::new(&xlimits) {
                Ok(lhs) => {
                    let seeds = lhs
                        .kind(LhsKind::Maximin)
                        .with_rng(Xoshiro256Plus::seed_from_u64(MULTISTART_SEED))
                        .sample(n_start);
                    starts.slice_mut(s![1.., ..]).assign(&seeds);
                }
                Err(err) => {
                    warn!("Multistart falls back on initial guess: {err}");
                    for mut row in starts.slice_mut(s![1.., ..]).rows_mut() {
                        row.assign(&param0.mapv(f64::log10));
                    }
                }
            }
        }
        std::cmp::Ordering::Less => (),
    };
    (starts, bounds)
}

/// Minimizes `objfn` with COBYLA from `param0` within `bounds`.
/// Returns the best value (infinite on failure) and the corresponding parameters.
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64]) -> f64,
{
    use cobyla::{minimize, Func, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0 = param0.to_vec();

    match minimize(
        |x: &[f64], _u: &mut ()| objfn(x),
        &param0,
        bounds,
        &cons,
        (),
        cobyla.maxeval,
        cobyla::RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, arr1(&x_opt))
        }
        Err((status, x_opt, _)) => {
            warn!("Cobyla optimizer failed with status={status:?}");
            (f64::INFINITY, arr1(&x_opt))
        }
    }
}

/// COBYLA evaluation budget for `n_params` parameters capped by `max_eval`
pub(crate) fn cobyla_budget(n_params: usize, max_eval: usize) -> usize {
    (10 * n_params).clamp(GP_COBYLA_MIN_EVAL, max_eval.max(GP_COBYLA_MIN_EVAL))
}

/// Runs [`optimize_params`] in parallel from every row of `starts` and keeps the best
pub(crate) fn multistart_minimize<ObjF>(
    objfn: ObjF,
    starts: &Array2<f64>,
    bounds: &[(f64, f64)],
    maxeval: usize,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64]) -> f64 + Sync,
{
    (0..starts.nrows())
        .into_par_iter()
        .map(|i| {
            optimize_params(
                &objfn,
                &starts.row(i).to_owned(),
                bounds,
                CobylaParams {
                    maxeval,
                    ..CobylaParams::default()
                },
            )
        })
        .reduce(
            || (f64::INFINITY, starts.row(0).to_owned()),
            |a, b| if b.0 < a.0 { b } else { a },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_prepare_multistart() {
        let (starts, bounds) = prepare_multistart(4, &array![0.1, 1.], &[(1e-2, 1e1), (1e-1, 1e2)]);
        assert_eq!(starts.dim(), (5, 2));
        assert_abs_diff_eq!(starts.row(0).to_owned(), array![-1., 0.], epsilon = 1e-12);
        assert_eq!(bounds.len(), 2);
        for row in starts.rows() {
            assert!(row[0] >= -2. && row[0] <= 1.);
            assert!(row[1] >= -1. && row[1] <= 2.);
        }
    }

    #[test]
    fn test_cobyla_budget() {
        assert_eq!(cobyla_budget(1, 1000), GP_COBYLA_MIN_EVAL);
        assert_eq!(cobyla_budget(5, 1000), 50);
        assert_eq!(cobyla_budget(500, 1000), 1000);
    }

    #[test]
    fn test_multistart_minimize_quadratic() {
        let (starts, bounds) = prepare_multistart(3, &array![1., 1.], &[(1e-3, 1e3), (1e-3, 1e3)]);
        let (fmin, xopt) = multistart_minimize(
            |x: &[f64]| (x[0] - 1.).powi(2) + (x[1] + 0.5).powi(2),
            &starts,
            &bounds,
            500,
        );
        assert_abs_diff_eq!(fmin, 0., epsilon = 1e-3);
        assert_abs_diff_eq!(xopt, array![1., -0.5], epsilon = 5e-2);
    }
}
