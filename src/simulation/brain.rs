//! Snake policy network.
//!
//! The network reads the raw board and the apple position:
//!
//! ```text
//! hidden = f(board · W0 ⊕ W1[apple])
//! logits = hidden · W2
//! ```
//!
//! where `⊕` is addition or elementwise multiplication depending on
//! [`AppleBias`], and `f` is a bounded rational activation.

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use super::game::Action;
use super::rng::RandomStream;

pub mod matrix;

pub use matrix::Matrix;

/// Number of policy outputs, one per [`Action`].
pub const NUM_ACTIONS: usize = 3;

/// How the apple-indexed row of `W1` is combined with `board · W0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppleBias {
    /// `hidden + W1[apple]`.
    Additive,
    /// `hidden * W1[apple]`, elementwise.
    Multiplicative,
}

/// Bounded rational activation: `2x / (x² + 1)` on `[-1, 1]`, saturated outside.
#[inline]
pub fn activation(x: f32) -> f32 {
    if x < -1.0 {
        -1.0
    } else if x > 1.0 {
        1.0
    } else {
        2.0 * x / (x * x + 1.0)
    }
}

/// The three weight matrices of a policy.
///
/// Also used as the shape of noise and gradient buffers, so every elementwise
/// operation visits `W0`, `W1`, `W2` in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    /// Board-to-hidden weights (`cells × hidden`).
    pub w0: Matrix,
    /// Apple-position bias rows (`cells × hidden`).
    pub w1: Matrix,
    /// Hidden-to-logit weights (`hidden × 3`).
    pub w2: Matrix,
}

impl Weights {
    /// All-zero weights for a `size × size` board.
    pub fn zeros(size: usize, hidden_size: usize) -> Self {
        let cells = size * size;
        Self {
            w0: Matrix::zeros(cells, hidden_size),
            w1: Matrix::zeros(cells, hidden_size),
            w2: Matrix::zeros(hidden_size, NUM_ACTIONS),
        }
    }

    /// Weights drawn from `U(-scale, scale)`.
    pub fn random_uniform(
        size: usize,
        hidden_size: usize,
        scale: f32,
        rng: &mut RandomStream,
    ) -> Self {
        let cells = size * size;
        Self {
            w0: Matrix::random_uniform(cells, hidden_size, scale, rng),
            w1: Matrix::random_uniform(cells, hidden_size, scale, rng),
            w2: Matrix::random_uniform(hidden_size, NUM_ACTIONS, scale, rng),
        }
    }

    fn matrices(&self) -> [&Matrix; 3] {
        [&self.w0, &self.w1, &self.w2]
    }

    fn matrices_mut(&mut self) -> [&mut Matrix; 3] {
        [&mut self.w0, &mut self.w1, &mut self.w2]
    }

    /// Total number of scalar parameters.
    pub fn num_params(&self) -> usize {
        self.matrices().iter().map(|m| m.len()).sum()
    }

    /// Iterates every parameter in `W0`, `W1`, `W2` order.
    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.w0.iter().chain(self.w1.iter()).chain(self.w2.iter())
    }

    /// Mutable counterpart of [`Weights::iter`].
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.w0
            .iter_mut()
            .chain(self.w1.iter_mut())
            .chain(self.w2.iter_mut())
    }

    /// Sets every parameter to zero.
    pub fn zero(&mut self) {
        self.matrices_mut().into_iter().for_each(Matrix::zero);
    }

    /// Overwrites these weights with `other`.
    pub fn copy_from(&mut self, other: &Weights) {
        for (dst, src) in self.matrices_mut().into_iter().zip(other.matrices()) {
            dst.copy_from(src);
        }
    }

    /// `self += other`.
    pub fn add(&mut self, other: &Weights) {
        for (dst, src) in self.matrices_mut().into_iter().zip(other.matrices()) {
            dst.add(src);
        }
    }

    /// `self *= factor`.
    pub fn scale(&mut self, factor: f32) {
        for m in self.matrices_mut() {
            m.scale(factor);
        }
    }

    /// Adds Gaussian noise to every parameter.
    pub fn add_noise(&mut self, rng: &mut RandomStream, sigma: f32) {
        for m in self.matrices_mut() {
            m.add_noise(rng, sigma);
        }
    }

    /// Replaces every parameter with Gaussian noise, consuming the same draws as
    /// [`Weights::add_noise`].
    pub fn set_noise(&mut self, rng: &mut RandomStream, sigma: f32) {
        for m in self.matrices_mut() {
            m.set_noise(rng, sigma);
        }
    }

    /// Sum of squared parameters.
    pub fn squared_norm(&self) -> f32 {
        self.matrices().iter().map(|m| m.squared_norm()).sum()
    }

    /// Sum of squared differences to `other`.
    pub fn squared_distance(&self, other: &Weights) -> f32 {
        self.matrices()
            .iter()
            .zip(other.matrices())
            .map(|(a, b)| a.squared_distance(b))
            .sum()
    }
}

/// A policy: weights plus the scratch buffer its forward pass writes into.
#[derive(Debug, Clone)]
pub struct Policy {
    size: usize,
    hidden_size: usize,
    apple_bias: AppleBias,
    weights: Weights,
    hidden: Array1<f32>,
}

impl Policy {
    /// Policy with all-zero weights.
    pub fn new(size: usize, hidden_size: usize, apple_bias: AppleBias) -> Self {
        Self::from_weights(size, hidden_size, apple_bias, Weights::zeros(size, hidden_size))
    }

    /// Policy with weights drawn from `U(-scale, scale)`.
    pub fn new_random(
        size: usize,
        hidden_size: usize,
        apple_bias: AppleBias,
        scale: f32,
        rng: &mut RandomStream,
    ) -> Self {
        let weights = Weights::random_uniform(size, hidden_size, scale, rng);
        Self::from_weights(size, hidden_size, apple_bias, weights)
    }

    /// Wraps existing weights.
    ///
    /// # Panics
    ///
    /// Panics if the matrix shapes do not match `size` and `hidden_size`.
    pub fn from_weights(
        size: usize,
        hidden_size: usize,
        apple_bias: AppleBias,
        weights: Weights,
    ) -> Self {
        let cells = size * size;
        assert_eq!((weights.w0.rows(), weights.w0.cols()), (cells, hidden_size));
        assert_eq!((weights.w1.rows(), weights.w1.cols()), (cells, hidden_size));
        assert_eq!(
            (weights.w2.rows(), weights.w2.cols()),
            (hidden_size, NUM_ACTIONS)
        );
        Self {
            size,
            hidden_size,
            apple_bias,
            weights,
            hidden: Array1::zeros(hidden_size),
        }
    }

    /// Board side length the policy was built for.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Hidden layer width.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Apple bias rule.
    pub fn apple_bias(&self) -> AppleBias {
        self.apple_bias
    }

    /// Total number of scalar parameters.
    pub fn num_params(&self) -> usize {
        self.weights.num_params()
    }

    /// The weights.
    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Mutable access to the weights.
    pub fn weights_mut(&mut self) -> &mut Weights {
        &mut self.weights
    }

    /// Consumes the policy, returning its weights.
    pub fn into_weights(self) -> Weights {
        self.weights
    }

    /// Computes action logits for a board and apple position into `out` (1 × 3).
    ///
    /// Allocation-free: only the policy's hidden buffer and `out` are written.
    pub fn forward(&mut self, board: &[u8], apple: usize, out: &mut Matrix) {
        debug_assert_eq!(board.len(), self.size * self.size);
        debug_assert_eq!(out.len(), NUM_ACTIONS);

        self.hidden.fill(0.0);
        for (cell, &value) in board.iter().enumerate() {
            if value != 0 {
                self.hidden
                    .scaled_add(f32::from(value), &self.weights.w0.row(cell));
            }
        }

        let bias = self.weights.w1.row(apple);
        match self.apple_bias {
            AppleBias::Additive => {
                Zip::from(&mut self.hidden)
                    .and(&bias)
                    .for_each(|h, &b| *h = activation(*h + b));
            }
            AppleBias::Multiplicative => {
                Zip::from(&mut self.hidden)
                    .and(&bias)
                    .for_each(|h, &b| *h = activation(*h * b));
            }
        }

        let mut logits = out.row_mut(0);
        for (action, logit) in logits.iter_mut().enumerate() {
            *logit = self.hidden.dot(&self.weights.w2.column(action));
        }
    }
}

/// Samples an action from logits: softmax in place, then inverse-CDF on one draw.
///
/// The first action whose cumulative probability exceeds the draw wins, in
/// [`Action::ALL`] order.
pub fn sample_action(out: &mut Matrix, rng: &mut RandomStream) -> Action {
    out.softmax();
    let draw = rng.next_uniform();
    let mut cumulative = 0.0;
    for (action, &p) in Action::ALL.iter().zip(out.iter()) {
        cumulative += p;
        if draw < cumulative {
            return *action;
        }
    }
    Action::NoTurn
}

/// Uniformly random action, ignoring any policy.
pub fn random_action(rng: &mut RandomStream) -> Action {
    let index = ((3.0 * rng.next_uniform()) as usize).min(2);
    Action::ALL[index]
}
