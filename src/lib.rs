//! # Snake ES - Evolution Strategies for a grid snake policy
//!
//! Trains a small neural policy to play snake on a tiny square board, using
//! Evolution Strategies: perturb the weights with Gaussian noise, score each
//! perturbation by playing games, and step along the fitness-weighted noise.
//!
//! ## Features
//!
//! - Allocation-free snake simulation encoded directly on a `u8` board
//! - One-hidden-layer policy with an apple-position bias
//! - Seed-replayed noise, so perturbations are never stored
//! - SGD or Adam updates
//! - Parallel trial evaluation with results identical to sequential runs
//! - Atomic binary checkpoints
//! - Random-search planner as a non-learned baseline
//!
//! ## Core Modules
//!
//! - [`simulation::game`] - Board, snake and apple state machine
//! - [`simulation::brain`] - Policy network and weight buffers
//! - [`simulation::evolution`] - The ES trainer
//! - [`simulation::rollout`] - Playing games with a policy or at random
//! - [`simulation::checkpoint`] - Binary weight files

/// Core simulation and training logic.
pub mod simulation {
    /// Policy network, weight buffers and action sampling.
    pub mod brain;
    /// Binary checkpoint codec for policy weights.
    pub mod checkpoint;
    /// Evolution Strategies trainer.
    pub mod evolution;
    /// Snake game state machine.
    pub mod game;
    /// SGD and Adam update rules.
    pub mod optimizer;
    /// Training parameters.
    pub mod params;
    /// Deterministic random stream threaded through every consumer.
    pub mod rng;
    /// Game rollouts and the random-search planner.
    pub mod rollout;
    /// Per-step training statistics.
    pub mod stats;
}
