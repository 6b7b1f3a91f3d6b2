use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

/// Adam first-order optimizer over a flat parameter vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: Array1<f64>,
    v: Array1<f64>,
    t: i32,
}

impl Adam {
    /// Default first moment decay
    pub const BETA1: f64 = 0.9;
    /// Default second moment decay
    pub const BETA2: f64 = 0.999;
    /// Default denominator offset
    pub const EPS: f64 = 1e-8;

    /// Optimizer for `n_params` parameters with learning rate `lr`
    pub fn new(n_params: usize, lr: f64) -> Self {
        Adam {
            lr,
            beta1: Self::BETA1,
            beta2: Self::BETA2,
            eps: Self::EPS,
            m: Array1::zeros(n_params),
            v: Array1::zeros(n_params),
            t: 0,
        }
    }

    /// Learning rate
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Number of steps done so far
    pub fn n_steps(&self) -> usize {
        self.t as usize
    }

    /// Updates `params` in place along the given gradient
    pub fn step(&mut self, params: &mut Array1<f64>, grad: &Array1<f64>) {
        self.t += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let bias1 = 1. - b1.powi(self.t);
        let bias2 = 1. - b2.powi(self.t);
        let (lr, eps) = (self.lr, self.eps);
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = b1 * *m + (1. - b1) * g;
                *v = b2 * *v + (1. - b2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_adam_first_step_is_lr_sized() {
        let mut adam = Adam::new(2, 0.1);
        let mut p = array![1., -1.];
        adam.step(&mut p, &array![3., -0.5]);
        assert_abs_diff_eq!(p, array![0.9, -0.9], epsilon = 1e-6);
        assert_eq!(adam.n_steps(), 1);
    }

    #[test]
    fn test_adam_minimizes_quadratic() {
        let mut adam = Adam::new(2, 0.05);
        let mut p = array![3., -2.];
        for _ in 0..2000 {
            let grad = p.mapv(|v| 2. * (v - 0.5));
            adam.step(&mut p, &grad);
        }
        assert_abs_diff_eq!(p, array![0.5, 0.5], epsilon = 1e-2);
    }
}
