//! Training parameters.
//!
//! Every knob of a run lives in [`TrainParams`]. Values are fixed for the whole
//! run and are handed to the trainer at construction.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::brain::AppleBias;
use super::game::{GameRules, SnakeGrowth};

/// Widest hidden layer a run or a checkpoint may declare.
pub const MAX_HIDDEN_SIZE: usize = 1 << 16;

/// Which update rule turns the ES gradient estimate into a weight delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Plain gradient ascent scaled by the learning rate.
    Sgd,
    /// Bias-corrected Adam with `alpha = learning_rate`.
    Adam,
}

/// How a rollout's result is turned into a fitness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMode {
    /// Apples eaten per game.
    Apples,
    /// Apples eaten divided by the number of steps taken.
    ApplesPerStep,
}

/// Adam decay and stability constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamParams {
    /// First moment decay.
    pub beta1: f32,
    /// Second moment decay.
    pub beta2: f32,
    /// Denominator guard.
    pub epsilon: f32,
}

impl Default for AdamParams {
    fn default() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Errors raised while loading or validating parameters.
#[derive(Debug, Error)]
pub enum ParamsError {
    /// Reading or writing the parameter file failed.
    #[error("failed to access parameter file: {0}")]
    Io(#[from] std::io::Error),
    /// The parameter file is not valid JSON for [`TrainParams`].
    #[error("malformed parameter file: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is outside its allowed range.
    #[error("invalid parameter `{field}`: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Human-readable constraint.
        reason: String,
    },
}

/// Parameters of an ES training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    /// Board side length in cells.
    pub board_size: usize,
    /// Snake length after reset.
    pub initial_length: usize,
    /// Whether eating grows the snake.
    pub growth: SnakeGrowth,
    /// How the apple-indexed row of `W1` enters the hidden layer.
    pub apple_bias: AppleBias,
    /// Hidden layer width.
    pub hidden_size: usize,
    /// Perturbations evaluated per training step.
    pub trials: usize,
    /// Games played per perturbation.
    pub rollouts_per_trial: usize,
    /// Standard deviation of the weight noise.
    pub sigma: f32,
    /// SGD step size, or Adam `alpha`.
    pub learning_rate: f32,
    /// Steps without an apple before a rollout is cut off. Defaults to the cell count.
    pub apple_tolerance: Option<usize>,
    /// Update rule.
    pub optimizer: OptimizerKind,
    /// Adam constants, ignored for SGD.
    pub adam: AdamParams,
    /// Fitness definition.
    pub fitness: FitnessMode,
    /// Half-width of the uniform initial weights. Zero starts from all-zero weights.
    pub init_scale: f32,
    /// Seed of the noise stream. `None` draws one from the OS at startup.
    pub seed: Option<u32>,
    /// Seed of the environment stream shared by all trials of a step.
    pub game_seed: Option<u32>,
    /// Evaluate trials on the rayon pool.
    pub parallel: bool,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            board_size: 4,
            initial_length: 3,
            growth: SnakeGrowth::Grow,
            apple_bias: AppleBias::Additive,
            hidden_size: 16,
            trials: 1000,
            rollouts_per_trial: 100,
            sigma: 1e-2,
            learning_rate: 1e-3,
            apple_tolerance: None,
            optimizer: OptimizerKind::Sgd,
            adam: AdamParams::default(),
            fitness: FitnessMode::Apples,
            init_scale: 0.0,
            seed: Some(42),
            game_seed: Some(42),
            parallel: true,
        }
    }
}

impl TrainParams {
    /// Rules for the games played during training.
    pub fn game_rules(&self) -> GameRules {
        GameRules {
            size: self.board_size,
            initial_length: self.initial_length,
            growth: self.growth,
        }
    }

    /// Apple tolerance with the cell-count default applied.
    pub fn effective_apple_tolerance(&self) -> usize {
        self.apple_tolerance
            .unwrap_or(self.board_size * self.board_size)
    }

    /// Checks every range constraint the trainer relies on.
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.game_rules().validate()?;
        if !(1..=MAX_HIDDEN_SIZE).contains(&self.hidden_size) {
            return Err(invalid(
                "hidden_size",
                format!("must lie in 1..={MAX_HIDDEN_SIZE}"),
            ));
        }
        if self.trials < 2 {
            return Err(invalid("trials", "need at least 2 trials for a spread"));
        }
        if self.rollouts_per_trial == 0 {
            return Err(invalid("rollouts_per_trial", "must be at least 1"));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(invalid("sigma", "must be a positive finite number"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", "must be a positive finite number"));
        }
        if !(self.init_scale.is_finite() && self.init_scale >= 0.0) {
            return Err(invalid("init_scale", "must be finite and non-negative"));
        }
        if self.optimizer == OptimizerKind::Adam {
            let AdamParams {
                beta1,
                beta2,
                epsilon,
            } = self.adam;
            if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                return Err(invalid("adam", "betas must lie in [0, 1)"));
            }
            if epsilon.is_nan() || epsilon <= 0.0 {
                return Err(invalid("adam.epsilon", "must be positive"));
            }
        }
        Ok(())
    }

    /// Saves the parameters as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ParamsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads and validates parameters from a JSON file. Missing fields take defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let json = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&json)?;
        params.validate()?;
        Ok(params)
    }
}

pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> ParamsError {
    ParamsError::Invalid {
        field,
        reason: reason.into(),
    }
}
