//! Update rules that turn an ES gradient estimate into a weight delta.

use super::brain::{Matrix, Weights};
use super::params::{AdamParams, OptimizerKind, TrainParams};

/// Bias-corrected Adam.
///
/// Moments are stored as `1 × n` matrices over the flattened parameters, visited
/// in [`Weights::iter`] order.
#[derive(Debug, Clone)]
pub struct Adam {
    m: Matrix,
    v: Matrix,
    t: u64,
    beta1_pow: f32,
    beta2_pow: f32,
    alpha: f32,
    params: AdamParams,
}

impl Adam {
    /// Fresh optimizer state for `num_params` parameters.
    pub fn new(num_params: usize, alpha: f32, params: AdamParams) -> Self {
        Self {
            m: Matrix::zeros(1, num_params),
            v: Matrix::zeros(1, num_params),
            t: 0,
            beta1_pow: 1.0,
            beta2_pow: 1.0,
            alpha,
            params,
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Replaces `grad` with the Adam update for it.
    pub fn transform(&mut self, grad: &mut Weights) {
        assert_eq!(
            grad.num_params(),
            self.m.len(),
            "gradient size does not match Adam state"
        );
        self.transform_iter(grad.iter_mut());
    }

    /// Replaces each entry of `grad` with its Adam update.
    pub fn transform_slice(&mut self, grad: &mut [f32]) {
        assert_eq!(
            grad.len(),
            self.m.len(),
            "gradient size does not match Adam state"
        );
        self.transform_iter(grad.iter_mut());
    }

    fn transform_iter<'a>(&mut self, grad: impl Iterator<Item = &'a mut f32>) {
        let AdamParams {
            beta1,
            beta2,
            epsilon,
        } = self.params;
        self.t += 1;
        self.beta1_pow *= beta1;
        self.beta2_pow *= beta2;
        let m_correction = 1.0 / (1.0 - self.beta1_pow);
        let v_correction = 1.0 / (1.0 - self.beta2_pow);
        let alpha = self.alpha;

        for ((g, m), v) in grad.zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            *m = beta1 * *m + (1.0 - beta1) * *g;
            *v = beta2 * *v + (1.0 - beta2) * *g * *g;
            let m_hat = *m * m_correction;
            let v_hat = *v * v_correction;
            *g = alpha * m_hat / (v_hat.sqrt() + epsilon);
        }
    }
}

/// The optimizer selected for a run.
#[derive(Debug, Clone)]
pub enum Optimizer {
    /// `delta = learning_rate · grad`.
    Sgd {
        /// Step size.
        learning_rate: f32,
    },
    /// `delta = Adam(grad)`.
    Adam(Adam),
}

impl Optimizer {
    /// Optimizer described by `params` for `num_params` parameters.
    pub fn from_params(params: &TrainParams, num_params: usize) -> Self {
        match params.optimizer {
            OptimizerKind::Sgd => Optimizer::Sgd {
                learning_rate: params.learning_rate,
            },
            OptimizerKind::Adam => {
                Optimizer::Adam(Adam::new(num_params, params.learning_rate, params.adam))
            }
        }
    }

    /// Turns a gradient estimate into the delta to add to the weights, in place.
    pub fn apply(&mut self, grad: &mut Weights) {
        match self {
            Optimizer::Sgd { learning_rate } => grad.scale(*learning_rate),
            Optimizer::Adam(adam) => adam.transform(grad),
        }
    }
}
