//! Playing games to the end: policy rollouts and the random-search planner.
//!
//! A rollout is a pure function of the reference game, the policy weights and the
//! RNG it is handed. Callers own every scratch buffer, which keeps rollouts free to
//! run on any worker thread.

use super::brain::{self, Matrix, NUM_ACTIONS, Policy};
use super::game::{Action, Game, GameView, StepOutcome};
use super::params::FitnessMode;
use super::rng::RandomStream;

/// Settings shared by every rollout of a training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RolloutSettings {
    /// Games played per evaluation; the fitness is their mean.
    pub games: usize,
    /// A game is cut off after more than this many steps without an apple.
    pub apple_tolerance: usize,
    /// Fitness definition.
    pub fitness: FitnessMode,
}

/// Buffers one worker needs to evaluate policies without allocating.
#[derive(Debug, Clone)]
pub struct Scratch {
    /// Policy whose weights get overwritten per evaluation.
    pub policy: Policy,
    /// Game reset from the reference via [`Game::copy_state`].
    pub game: Game,
    /// 1 × 3 logit buffer.
    pub logits: Matrix,
}

impl Scratch {
    /// Scratch shaped like `policy` and `game`.
    pub fn new(policy: &Policy, game: &Game) -> Self {
        Self {
            policy: policy.clone(),
            game: game.clone(),
            logits: Matrix::zeros(1, NUM_ACTIONS),
        }
    }
}

/// Result of one finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameResult {
    /// Apples eaten.
    pub score: u32,
    /// Steps taken, including the terminal one.
    pub steps: u32,
}

impl GameResult {
    /// Fitness of this game under `mode`.
    pub fn fitness(self, mode: FitnessMode) -> f32 {
        match mode {
            FitnessMode::Apples => self.score as f32,
            FitnessMode::ApplesPerStep => self.score as f32 / self.steps.max(1) as f32,
        }
    }
}

/// Step counter with the apple-tolerance cutoff shared by every full-game loop.
#[derive(Debug, Default)]
struct AppleClock {
    steps: u32,
    last_apple_step: u32,
}

impl AppleClock {
    /// Records one step and reports whether the game should stop.
    ///
    /// A game stops on a terminal outcome, or once more than `apple_tolerance`
    /// steps separate a non-eating move from the last apple (or the start).
    fn tick(&mut self, outcome: StepOutcome, apple_tolerance: usize) -> bool {
        let stop = match outcome {
            StepOutcome::Ate => {
                self.last_apple_step = self.steps;
                false
            }
            StepOutcome::Over(_) => true,
            StepOutcome::Moved => (self.steps - self.last_apple_step) as usize > apple_tolerance,
        };
        self.steps += 1;
        stop
    }

    fn finish(&self, game: &Game) -> GameResult {
        GameResult {
            score: game.score(),
            steps: self.steps,
        }
    }
}

/// Plays `game` to the end with actions sampled from `policy`.
pub fn play_policy(
    policy: &mut Policy,
    game: &mut Game,
    logits: &mut Matrix,
    rng: &mut RandomStream,
    apple_tolerance: usize,
) -> GameResult {
    let mut clock = AppleClock::default();
    loop {
        policy.forward(game.cells(), game.apple(), logits);
        let action = brain::sample_action(logits, rng);
        let outcome = game.step(action, rng);
        if clock.tick(outcome, apple_tolerance) {
            return clock.finish(game);
        }
    }
}

/// Mean fitness of the scratch policy over `settings.games` games, each started
/// from `reference`.
///
/// Every game keeps the reference apple, so all games open on the same board.
pub fn evaluate(
    reference: &Game,
    scratch: &mut Scratch,
    rng: &mut RandomStream,
    settings: &RolloutSettings,
) -> f32 {
    evaluate_games(reference, scratch, rng, settings, false)
}

/// Like [`evaluate`], but each game re-places the apple before the first move.
///
/// The snake still starts from the reference layout; only the apple varies
/// between games.
pub fn evaluate_fresh_apples(
    reference: &Game,
    scratch: &mut Scratch,
    rng: &mut RandomStream,
    settings: &RolloutSettings,
) -> f32 {
    evaluate_games(reference, scratch, rng, settings, true)
}

fn evaluate_games(
    reference: &Game,
    scratch: &mut Scratch,
    rng: &mut RandomStream,
    settings: &RolloutSettings,
    fresh_apples: bool,
) -> f32 {
    let mut total = 0.0;
    for _ in 0..settings.games {
        scratch.game.copy_state(reference);
        if fresh_apples {
            scratch.game.place_apple(rng);
        }
        let result = play_policy(
            &mut scratch.policy,
            &mut scratch.game,
            &mut scratch.logits,
            rng,
            settings.apple_tolerance,
        );
        total += result.fitness(settings.fitness);
    }
    total / settings.games as f32
}

/// Plays `game` with one forced action followed by uniformly random actions, for
/// at most `max_steps` further moves. Returns the final score.
pub fn play_random(
    game: &mut Game,
    first: Action,
    max_steps: usize,
    rng: &mut RandomStream,
) -> u32 {
    if !game.step(first, rng).is_over() {
        for _ in 0..max_steps {
            if game.step(brain::random_action(rng), rng).is_over() {
                break;
            }
        }
    }
    game.score()
}

/// Plays `game` to the end with [`plan_random_search`] choosing every move.
///
/// Uses the same apple-tolerance cutoff as [`play_policy`].
pub fn play_search(
    game: &mut Game,
    scratch: &mut Game,
    iters: usize,
    apple_tolerance: usize,
    rng: &mut RandomStream,
) -> GameResult {
    let mut clock = AppleClock::default();
    loop {
        let action = plan_random_search(game, scratch, iters, rng);
        let outcome = game.step(action, rng);
        if clock.tick(outcome, apple_tolerance) {
            return clock.finish(game);
        }
    }
}

/// Picks a move for `game` by random search.
///
/// Each candidate first action is tried `iters` times with a random continuation
/// of up to `size²` moves; the best score seen per action ranks them. A strictly
/// better turn wins, otherwise the snake keeps its heading.
pub fn plan_random_search(
    game: &Game,
    scratch: &mut Game,
    iters: usize,
    rng: &mut RandomStream,
) -> Action {
    let horizon = game.rules().cells();
    let mut best = [0_u32; 3];
    for _ in 0..iters {
        for (slot, &action) in best.iter_mut().zip(Action::ALL.iter()) {
            scratch.copy_state(game);
            *slot = (*slot).max(play_random(scratch, action, horizon, rng));
        }
    }
    let [left, right, straight] = best;
    if left > right && left > straight {
        Action::TurnLeft
    } else if right > left && right > straight {
        Action::TurnRight
    } else {
        Action::NoTurn
    }
}
