//! Evolution Strategies training loop.
//!
//! Each step perturbs the live weights once per trial, scores every perturbation
//! by playing games, and moves the weights along the fitness-weighted sum of the
//! perturbations:
//!
//! ```text
//! grad = 1/(N·σ) · Σᵢ εᵢ · (Fᵢ − mean F) / std F
//! ```
//!
//! Noise vectors are never stored. Each trial owns a seed; the noise is drawn from
//! it once to build the candidate and drawn again later to rebuild `εᵢ` alone.

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::brain::{Policy, Weights};
use super::checkpoint::{self, CheckpointError};
use super::game::Game;
use super::optimizer::Optimizer;
use super::params::{invalid, ParamsError, TrainParams};
use super::rng::RandomStream;
use super::rollout::{self, RolloutSettings, Scratch};
use super::stats::StepStats;

/// Fitness summary of one batch of trials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessSummary {
    /// Mean fitness.
    pub mean: f32,
    /// Population standard deviation.
    pub std: f32,
    /// Best fitness.
    pub max: f32,
}

impl FitnessSummary {
    /// Summarizes a non-empty slice of scores.
    ///
    /// A batch of identical scores has exactly zero spread. Summing them in
    /// `f32` can leave the mean a rounding step away from the common value, so
    /// that case is settled before any arithmetic.
    pub fn from_scores(scores: &[f32]) -> Self {
        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let uniform = scores
            .first()
            .filter(|&&first| scores.iter().all(|&score| score == first));
        if let Some(&first) = uniform {
            return Self {
                mean: first,
                std: 0.0,
                max,
            };
        }
        let n = scores.len() as f32;
        let mean = scores.iter().sum::<f32>() / n;
        let variance = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
        Self {
            mean,
            std: variance.sqrt(),
            max,
        }
    }

    /// Standardized score, or `None` when the batch has no usable spread.
    pub fn standardize(&self, score: f32) -> Option<f32> {
        (self.std > 0.0 && self.std.is_finite()).then(|| (score - self.mean) / self.std)
    }
}

/// ES trainer owning the live policy, optimizer state and RNG streams.
#[derive(Debug)]
pub struct Trainer {
    params: TrainParams,
    settings: RolloutSettings,
    policy: Policy,
    initial: Weights,
    optimizer: Optimizer,
    reference: Game,
    noise_rng: RandomStream,
    game_rng: RandomStream,
    gradient: Weights,
    noise: Weights,
    step: u64,
}

impl Trainer {
    /// Builds a trainer with a freshly initialized policy.
    ///
    /// `seed` drives the noise stream, `game_seed` the environment stream.
    pub fn new(params: TrainParams, seed: u32, game_seed: u32) -> Result<Self, ParamsError> {
        params.validate()?;
        let mut noise_rng = RandomStream::new(seed);
        let policy = Policy::new_random(
            params.board_size,
            params.hidden_size,
            params.apple_bias,
            params.init_scale,
            &mut noise_rng,
        );
        Self::build(params, policy, noise_rng, game_seed)
    }

    /// Builds a trainer that continues from an existing policy.
    ///
    /// Fails with [`ParamsError::Invalid`] on field `policy` when the policy
    /// shape differs from `params`.
    pub fn with_policy(
        params: TrainParams,
        policy: Policy,
        seed: u32,
        game_seed: u32,
    ) -> Result<Self, ParamsError> {
        params.validate()?;
        let shape = (policy.size(), policy.hidden_size());
        if shape != (params.board_size, params.hidden_size) {
            return Err(invalid(
                "policy",
                format!(
                    "shape {}x{} does not match board_size {} and hidden_size {}",
                    shape.0, shape.1, params.board_size, params.hidden_size
                ),
            ));
        }
        Self::build(params, policy, RandomStream::new(seed), game_seed)
    }

    fn build(
        params: TrainParams,
        policy: Policy,
        noise_rng: RandomStream,
        game_seed: u32,
    ) -> Result<Self, ParamsError> {
        let mut game_rng = RandomStream::new(game_seed);
        let reference = Game::new(params.game_rules(), &mut game_rng);
        let settings = RolloutSettings {
            games: params.rollouts_per_trial,
            apple_tolerance: params.effective_apple_tolerance(),
            fitness: params.fitness,
        };
        let optimizer = Optimizer::from_params(&params, policy.num_params());
        let zeros = Weights::zeros(params.board_size, params.hidden_size);
        Ok(Self {
            settings,
            initial: policy.weights().clone(),
            optimizer,
            reference,
            noise_rng,
            game_rng,
            gradient: zeros.clone(),
            noise: zeros,
            step: 0,
            policy,
            params,
        })
    }

    /// The live policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run parameters.
    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    /// Game every rollout starts from.
    pub fn reference_game(&self) -> &Game {
        &self.reference
    }

    /// Rollout settings derived from the parameters.
    pub fn rollout_settings(&self) -> &RolloutSettings {
        &self.settings
    }

    /// Steps completed so far.
    pub fn steps_done(&self) -> u64 {
        self.step
    }

    /// Draws the per-trial noise seeds and the shared game seed for the next step,
    /// advancing both streams.
    pub fn draw_seeds(&mut self) -> (Vec<u32>, u32) {
        let trial_seeds = (0..self.params.trials)
            .map(|_| self.noise_rng.next_u32())
            .collect();
        (trial_seeds, self.game_rng.next_u32())
    }

    /// Fitness of `weights + noise(trial_seed)`, played from the reference game with
    /// the environment stream seeded by `game_seed`.
    pub fn evaluate_trial(&self, scratch: &mut Scratch, trial_seed: u32, game_seed: u32) -> f32 {
        let candidate = scratch.policy.weights_mut();
        candidate.copy_from(self.policy.weights());
        candidate.add_noise(&mut RandomStream::new(trial_seed), self.params.sigma);
        let mut env_rng = RandomStream::new(game_seed);
        rollout::evaluate(&self.reference, scratch, &mut env_rng, &self.settings)
    }

    /// Scores every trial seed. Order matches `trial_seeds` in both execution modes.
    pub fn evaluate_trials(&self, trial_seeds: &[u32], game_seed: u32) -> Vec<f32> {
        let new_scratch = || Scratch::new(&self.policy, &self.reference);
        if self.params.parallel {
            trial_seeds
                .par_iter()
                .map_init(new_scratch, |scratch, &seed| {
                    self.evaluate_trial(scratch, seed, game_seed)
                })
                .collect()
        } else {
            let mut scratch = new_scratch();
            trial_seeds
                .iter()
                .map(|&seed| self.evaluate_trial(&mut scratch, seed, game_seed))
                .collect()
        }
    }

    /// Fitness-weighted noise sum scaled by `1/(N·σ)`, before the optimizer.
    ///
    /// Returns `None` for a zero-variance batch.
    pub fn estimate_gradient(
        &mut self,
        trial_seeds: &[u32],
        scores: &[f32],
        summary: &FitnessSummary,
    ) -> Option<&Weights> {
        summary.standardize(summary.mean)?;
        let sigma = self.params.sigma;
        self.gradient.zero();
        for (&seed, &score) in trial_seeds.iter().zip(scores) {
            let weight = summary.standardize(score)?;
            self.noise.set_noise(&mut RandomStream::new(seed), sigma);
            self.noise.scale(weight);
            self.gradient.add(&self.noise);
        }
        self.gradient.scale(1.0 / (trial_seeds.len() as f32 * sigma));
        Some(&self.gradient)
    }

    /// Runs one perturb, evaluate, aggregate, update cycle.
    pub fn step(&mut self) -> StepStats {
        let (trial_seeds, game_seed) = self.draw_seeds();
        let scores = self.evaluate_trials(&trial_seeds, game_seed);
        let summary = FitnessSummary::from_scores(&scores);

        let updated = self
            .estimate_gradient(&trial_seeds, &scores, &summary)
            .is_some();
        let gradient_norm = if updated {
            self.optimizer.apply(&mut self.gradient);
            self.policy.weights_mut().add(&self.gradient);
            self.gradient.squared_norm().sqrt()
        } else {
            warn!(
                step = self.step,
                mean = summary.mean,
                "all trials scored the same, skipping update"
            );
            0.0
        };

        let stats = StepStats {
            step: self.step,
            mean_fitness: summary.mean,
            std_fitness: summary.std,
            max_fitness: summary.max,
            gradient_norm,
            distance_from_init: self.policy.weights().squared_distance(&self.initial).sqrt(),
            updated,
        };
        debug!(?stats, "training step finished");
        self.step += 1;
        stats
    }

    /// Trains until `max_steps` steps are done (forever when `None`), saving a
    /// checkpoint after every step and passing each step's stats to `observer`.
    pub fn train(
        &mut self,
        max_steps: Option<u64>,
        checkpoint_path: Option<&Path>,
        mut observer: impl FnMut(&StepStats),
    ) -> Result<(), CheckpointError> {
        info!(
            params = self.policy.num_params(),
            trials = self.params.trials,
            rollouts = self.params.rollouts_per_trial,
            "starting ES training"
        );
        let mut remaining = max_steps;
        while remaining != Some(0) {
            let stats = self.step();
            if let Some(path) = checkpoint_path {
                checkpoint::save(&self.policy, path)?;
            }
            observer(&stats);
            remaining = remaining.map(|r| r - 1);
        }
        Ok(())
    }
}
