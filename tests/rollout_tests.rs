#![allow(missing_docs)]

use std::collections::HashSet;

use snake_es::simulation::brain::{AppleBias, Matrix, NUM_ACTIONS, Policy, Weights};
use snake_es::simulation::game::{Action, Game, GameRules, GameView};
use snake_es::simulation::params::FitnessMode;
use snake_es::simulation::rng::RandomStream;
use snake_es::simulation::rollout::{
    self, GameResult, RolloutSettings, Scratch, plan_random_search, play_random, play_search,
};

/// Policy that keeps its heading on every board: saturated hidden units feed a
/// `NoTurn` logit large enough to take all of the softmax mass.
fn create_straight_policy(size: usize, hidden_size: usize) -> Policy {
    let cells = size * size;
    let w2 = (0..hidden_size).flat_map(|_| [0.0, 0.0, 100.0]).collect();
    let weights = Weights {
        w0: Matrix::from_vec(cells, hidden_size, vec![1.0; cells * hidden_size]),
        w1: Matrix::zeros(cells, hidden_size),
        w2: Matrix::from_vec(hidden_size, NUM_ACTIONS, w2),
    };
    Policy::from_weights(size, hidden_size, AppleBias::Additive, weights)
}

fn create_test_settings() -> RolloutSettings {
    RolloutSettings {
        games: 20,
        apple_tolerance: 16,
        fitness: FitnessMode::Apples,
    }
}

#[test]
fn test_fitness_modes() {
    let result = GameResult { score: 3, steps: 12 };
    assert_eq!(result.fitness(FitnessMode::Apples), 3.0);
    assert_eq!(result.fitness(FitnessMode::ApplesPerStep), 0.25);

    let empty = GameResult { score: 0, steps: 0 };
    assert_eq!(empty.fitness(FitnessMode::ApplesPerStep), 0.0);
}

#[test]
fn test_play_policy_terminates_within_tolerance() {
    let mut rng = RandomStream::new(8);
    let mut policy = Policy::new(4, 8, AppleBias::Additive);
    let reference = Game::new(GameRules::new(4), &mut rng);
    let mut scratch = Scratch::new(&policy, &reference);

    for tolerance in [0, 3, 16] {
        for _ in 0..20 {
            scratch.game.copy_state(&reference);
            let result = rollout::play_policy(
                &mut policy,
                &mut scratch.game,
                &mut scratch.logits,
                &mut rng,
                tolerance,
            );
            assert!(result.steps >= 1);
            assert!(result.score <= GameRules::new(4).max_score());
            // Without apples the game is cut after tolerance + 1 moves at the latest.
            if result.score == 0 {
                assert!(result.steps as usize <= tolerance + 2);
            }
        }
    }
}

#[test]
fn test_evaluate_is_deterministic_and_leaves_reference_untouched() {
    let mut rng = RandomStream::new(40);
    let policy = Policy::new_random(4, 8, AppleBias::Additive, 0.5, &mut rng);
    let reference = Game::new(GameRules::new(4), &mut rng);
    let snapshot = reference.clone();

    let run = |seed: u32| {
        let mut scratch = Scratch::new(&policy, &reference);
        rollout::evaluate(
            &reference,
            &mut scratch,
            &mut RandomStream::new(seed),
            &create_test_settings(),
        )
    };
    let first = run(3);
    assert_eq!(first, run(3));
    assert!(first >= 0.0);
    assert_eq!(reference, snapshot);
}

#[test]
fn test_play_random_forced_wall_move_scores_nothing_more() {
    let mut rng = RandomStream::new(2);
    let mut game = Game::new(GameRules::new(4), &mut rng);
    game.step(Action::NoTurn, &mut rng);
    assert_eq!(game.head(), 11);

    let score_before = game.score();
    let mut scratch = game.clone();
    let score = play_random(&mut scratch, Action::NoTurn, 16, &mut rng);
    assert_eq!(score, score_before);
    assert!(scratch.is_over());
}

#[test]
fn test_planner_is_deterministic() {
    let mut rng = RandomStream::new(14);
    let game = Game::new(GameRules::new(4), &mut rng);
    let mut scratch = game.clone();

    let plan =
        |scratch: &mut Game| plan_random_search(&game, scratch, 50, &mut RandomStream::new(1));
    let first = plan(&mut scratch);
    assert_eq!(first, plan(&mut scratch));
    assert!(Action::ALL.contains(&first));
}

#[test]
fn test_play_search_finishes() {
    let mut rng = RandomStream::new(9);
    let mut game = Game::new(GameRules::new(4), &mut rng);
    let mut scratch = game.clone();
    let result = play_search(&mut game, &mut scratch, 20, 16, &mut rng);
    assert!(result.steps >= 1);
    assert_eq!(result.score, game.score());
}

#[test]
fn test_search_and_policy_share_apple_cutoff() {
    // Head at 112 facing right; keep a start whose apple is off that row.
    let rules = GameRules::new(15);
    let start = (0..)
        .map(|seed| Game::new(rules, &mut RandomStream::new(seed)))
        .find(|game| !(113..=119).contains(&game.apple()))
        .unwrap();
    assert_eq!(start.head(), 112);
    let mut policy = create_straight_policy(15, 2);
    let mut logits = Matrix::zeros(1, NUM_ACTIONS);

    // Seven moves reach the wall, the eighth hits it.
    for (tolerance, steps) in [(0, 2), (1, 3), (3, 5), (5, 7), (20, 8)] {
        let expected = GameResult { score: 0, steps };

        let mut searched = start.clone();
        let mut scratch = start.clone();
        let search = play_search(
            &mut searched,
            &mut scratch,
            0,
            tolerance,
            &mut RandomStream::new(1),
        );
        assert_eq!(search, expected, "search with tolerance {tolerance}");

        let mut played = start.clone();
        let policy_result = rollout::play_policy(
            &mut policy,
            &mut played,
            &mut logits,
            &mut RandomStream::new(1),
            tolerance,
        );
        assert_eq!(policy_result, expected, "policy with tolerance {tolerance}");
        assert_eq!(searched.cells(), played.cells());
        assert_eq!(searched.is_over(), played.is_over());
    }
}

#[test]
fn test_fresh_apple_evaluation_replaces_apple_per_game() {
    let mut rng = RandomStream::new(40);
    let policy = Policy::new_random(4, 8, AppleBias::Additive, 0.5, &mut rng);
    let reference = Game::new(GameRules::new(4), &mut rng);
    let snapshot = reference.clone();
    let settings = create_test_settings();

    let mut scratch = Scratch::new(&policy, &reference);
    let mean = rollout::evaluate_fresh_apples(
        &reference,
        &mut scratch,
        &mut RandomStream::new(3),
        &settings,
    );
    assert_eq!(reference, snapshot);

    // Same games by hand: start from the reference, draw a new apple, play.
    let mut env = RandomStream::new(3);
    let mut game = reference.clone();
    let mut player = policy.clone();
    let mut logits = Matrix::zeros(1, NUM_ACTIONS);
    let mut apples = HashSet::new();
    let mut total = 0.0;
    for _ in 0..settings.games {
        game.copy_state(&reference);
        game.place_apple(&mut env);
        apples.insert(game.apple());
        let result = rollout::play_policy(
            &mut player,
            &mut game,
            &mut logits,
            &mut env,
            settings.apple_tolerance,
        );
        total += result.fitness(settings.fitness);
    }
    assert_eq!(mean, total / settings.games as f32);
    assert!(apples.len() > 1, "every game opened on the same apple");
}
