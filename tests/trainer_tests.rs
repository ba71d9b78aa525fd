#![allow(missing_docs)]

use snake_es::simulation::brain::{Policy, Weights};
use snake_es::simulation::checkpoint;
use snake_es::simulation::evolution::{FitnessSummary, Trainer};
use snake_es::simulation::game::{Game, GameView};
use snake_es::simulation::params::{FitnessMode, OptimizerKind, ParamsError, TrainParams};
use snake_es::simulation::rng::RandomStream;
use snake_es::simulation::rollout::{self, RolloutSettings, Scratch};
use snake_es::simulation::stats::StepStats;

fn create_test_params() -> TrainParams {
    TrainParams {
        board_size: 4,
        hidden_size: 4,
        trials: 8,
        rollouts_per_trial: 4,
        sigma: 0.1,
        learning_rate: 0.05,
        init_scale: 0.5,
        ..TrainParams::default()
    }
}

fn run_steps(params: TrainParams, steps: usize) -> (Vec<StepStats>, Weights) {
    let mut trainer = Trainer::new(params, 11, 22).unwrap();
    let stats = (0..steps).map(|_| trainer.step()).collect();
    (stats, trainer.policy().weights().clone())
}

#[test]
fn test_same_seeds_reproduce() {
    let (stats_a, weights_a) = run_steps(create_test_params(), 3);
    let (stats_b, weights_b) = run_steps(create_test_params(), 3);
    assert_eq!(stats_a, stats_b);
    assert_eq!(weights_a, weights_b);
}

#[test]
fn test_parallel_matches_sequential() {
    let parallel = TrainParams {
        parallel: true,
        ..create_test_params()
    };
    let sequential = TrainParams {
        parallel: false,
        ..create_test_params()
    };
    assert_eq!(run_steps(parallel, 3), run_steps(sequential, 3));

    let adam = TrainParams {
        optimizer: OptimizerKind::Adam,
        ..create_test_params()
    };
    let adam_sequential = TrainParams {
        parallel: false,
        ..adam.clone()
    };
    assert_eq!(run_steps(adam, 2), run_steps(adam_sequential, 2));
}

/// Settings of the recorded run below: zero initial weights, four trials of
/// four games each, plain SGD.
fn create_recorded_params(parallel: bool) -> TrainParams {
    TrainParams {
        board_size: 4,
        hidden_size: 2,
        trials: 4,
        rollouts_per_trial: 4,
        sigma: 0.5,
        learning_rate: 0.1,
        init_scale: 0.0,
        optimizer: OptimizerKind::Sgd,
        fitness: FitnessMode::Apples,
        apple_tolerance: None,
        parallel,
        ..TrainParams::default()
    }
}

#[test]
fn test_recorded_steps() {
    for parallel in [false, true] {
        let mut trainer = Trainer::new(create_recorded_params(parallel), 6, 1).unwrap();
        assert_eq!(trainer.reference_game().apple(), 12);

        let first = trainer.step();
        assert_eq!(first.mean_fitness, 0.4375);
        assert_eq!(first.std_fitness, 0.207_289_05);
        assert_eq!(first.max_fitness, 0.75);
        assert!(first.updated);

        // Starting from zero, the weights now hold exactly the first update.
        let weights = trainer.policy().weights();
        assert_eq!(weights.w0.get(0, 0), -0.011_400_215);
        assert_eq!(weights.w0.get(10, 1), -0.000_856_861_5);
        assert_eq!(weights.w1.get(12, 0), -0.043_633_35);
        assert_eq!(weights.w2.get(0, 0), 0.100_976_82);
        assert_eq!(weights.w2.get(1, 2), 0.038_081_564);

        let second = trainer.step();
        assert_eq!(second.mean_fitness, 0.3125);
        assert_eq!(second.std_fitness, 0.272_431_2);
        assert_eq!(second.max_fitness, 0.75);
        assert!(second.updated);

        let weights = trainer.policy().weights();
        assert_eq!(weights.w0.get(0, 0), -0.061_149_59);
        assert_eq!(weights.w0.get(10, 1), 0.038_155_5);
        assert_eq!(weights.w1.get(12, 0), -0.072_037_056);
        assert_eq!(weights.w2.get(0, 0), 0.015_442_14);
        assert_eq!(weights.w2.get(1, 2), -0.021_394_752);
    }
}

#[test]
fn test_step_matches_independent_reconstruction() {
    let params = TrainParams {
        parallel: false,
        ..create_test_params()
    };
    let (seed, game_seed) = (5, 6);
    let mut trainer = Trainer::new(params.clone(), seed, game_seed).unwrap();

    // Rebuild the initial state and one step from public building blocks.
    let mut noise_rng = RandomStream::new(seed);
    let policy = Policy::new_random(
        params.board_size,
        params.hidden_size,
        params.apple_bias,
        params.init_scale,
        &mut noise_rng,
    );
    assert_eq!(policy.weights(), trainer.policy().weights());

    let mut game_rng = RandomStream::new(game_seed);
    let reference = Game::new(params.game_rules(), &mut game_rng);
    assert_eq!(&reference, trainer.reference_game());

    let trial_seeds: Vec<u32> = (0..params.trials).map(|_| noise_rng.next_u32()).collect();
    let step_game_seed = game_rng.next_u32();

    let settings = RolloutSettings {
        games: params.rollouts_per_trial,
        apple_tolerance: params.effective_apple_tolerance(),
        fitness: params.fitness,
    };
    let mut scratch = Scratch::new(&policy, &reference);
    let scores: Vec<f32> = trial_seeds
        .iter()
        .map(|&trial_seed| {
            let candidate = scratch.policy.weights_mut();
            candidate.copy_from(policy.weights());
            candidate.add_noise(&mut RandomStream::new(trial_seed), params.sigma);
            let mut env = RandomStream::new(step_game_seed);
            rollout::evaluate(&reference, &mut scratch, &mut env, &settings)
        })
        .collect();

    let n = scores.len() as f32;
    let mean = scores.iter().sum::<f32>() / n;
    let std = (scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n).sqrt();

    let mut expected = policy.weights().clone();
    if std > 0.0 {
        let mut grad = Weights::zeros(params.board_size, params.hidden_size);
        for (&trial_seed, &score) in trial_seeds.iter().zip(&scores) {
            let mut noise = Weights::zeros(params.board_size, params.hidden_size);
            noise.set_noise(&mut RandomStream::new(trial_seed), params.sigma);
            noise.scale((score - mean) / std);
            grad.add(&noise);
        }
        grad.scale(params.learning_rate / (n * params.sigma));
        expected.add(&grad);
    }

    let stats = trainer.step();
    assert_eq!(stats.mean_fitness, mean);
    assert_eq!(stats.std_fitness, std);
    assert_eq!(stats.updated, std > 0.0);
    for (actual, wanted) in trainer.policy().weights().iter().zip(expected.iter()) {
        assert!(
            (actual - wanted).abs() <= 1e-6 * (1.0 + wanted.abs()),
            "weight {actual} differs from reconstruction {wanted}"
        );
    }
}

#[test]
fn test_zero_variance_skips_update() {
    // Noise this small cannot change any softmax output, so every trial plays the
    // same games and scores the same.
    let params = TrainParams {
        sigma: 1e-12,
        init_scale: 0.0,
        ..create_test_params()
    };
    let mut trainer = Trainer::new(params, 3, 4).unwrap();
    let stats = trainer.step();

    assert_eq!(stats.std_fitness, 0.0);
    assert!(!stats.updated);
    assert_eq!(stats.gradient_norm, 0.0);
    assert_eq!(stats.distance_from_init, 0.0);
    assert!(trainer.policy().weights().iter().all(|&w| w == 0.0));
    assert_eq!(trainer.steps_done(), 1);
}

#[test]
fn test_fitness_summary() {
    let summary = FitnessSummary::from_scores(&[1.0, 3.0]);
    assert_eq!(summary.mean, 2.0);
    assert_eq!(summary.std, 1.0);
    assert_eq!(summary.max, 3.0);
    assert_eq!(summary.standardize(3.0), Some(1.0));

    let flat = FitnessSummary::from_scores(&[2.0, 2.0, 2.0]);
    assert_eq!(flat.std, 0.0);
    assert_eq!(flat.standardize(2.0), None);
}

#[test]
fn test_identical_scores_have_no_spread() {
    // 0.37 is not representable, and summing a thousand copies in f32 drifts
    // away from it.
    for (value, count) in [(0.37_f32, 1000), (0.1, 3), (1.0 / 3.0, 7), (12.5, 1)] {
        let scores = vec![value; count];
        let summary = FitnessSummary::from_scores(&scores);
        assert_eq!(summary.mean, value);
        assert_eq!(summary.std, 0.0);
        assert_eq!(summary.max, value);
        assert_eq!(summary.standardize(value), None);
    }
}

#[test]
fn test_train_writes_checkpoint_and_reports_steps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.bin");
    let params = create_test_params();
    let mut trainer = Trainer::new(params.clone(), 1, 2).unwrap();

    let mut seen = Vec::new();
    trainer
        .train(Some(3), Some(path.as_path()), |stats| seen.push(stats.step))
        .unwrap();
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(trainer.steps_done(), 3);

    let saved = checkpoint::load_expecting(
        &path,
        params.board_size,
        params.hidden_size,
        params.apple_bias,
    )
    .unwrap();
    assert_eq!(saved.weights(), trainer.policy().weights());
}

#[test]
fn test_resume_continues_from_policy() {
    let params = create_test_params();
    let mut first = Trainer::new(params.clone(), 1, 2).unwrap();
    first.train(Some(2), None, |_| {}).unwrap();

    let policy = first.policy().clone();
    let resumed = Trainer::with_policy(params, policy, 9, 9).unwrap();
    assert_eq!(resumed.policy().weights(), first.policy().weights());
    assert_eq!(resumed.steps_done(), 0);
}

#[test]
fn test_resume_rejects_wrong_shape() {
    let params = create_test_params();
    for (size, hidden) in [(4, 7), (5, 4)] {
        let policy = Policy::new(size, hidden, params.apple_bias);
        let result = Trainer::with_policy(params.clone(), policy, 1, 1);
        assert!(
            matches!(result, Err(ParamsError::Invalid { field: "policy", .. })),
            "({size}, {hidden}) was accepted"
        );
    }
}

#[test]
fn test_invalid_params_rejected() {
    let params = TrainParams {
        trials: 1,
        ..create_test_params()
    };
    assert!(Trainer::new(params, 1, 1).is_err());
}
