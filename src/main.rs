use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use snake_es::simulation::checkpoint;
use snake_es::simulation::evolution::Trainer;
use snake_es::simulation::game::Game;
use snake_es::simulation::params::{OptimizerKind, TrainParams};
use snake_es::simulation::rng::RandomStream;
use snake_es::simulation::rollout::{self, RolloutSettings, Scratch};
use snake_es::simulation::stats::TrainingHistory;

/// Steps between history snapshots while training.
const HISTORY_SAVE_INTERVAL: u64 = 10;

#[derive(Parser)]
#[command(name = "snake-es")]
#[command(version, about = "Train a snake policy with Evolution Strategies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a policy, checkpointing after every step
    Train(TrainArgs),
    /// Report the mean score of a saved policy
    Evaluate(EvaluateArgs),
    /// Report the mean score of the random-search planner
    Search(SearchArgs),
    /// Write the default parameters as JSON
    InitConfig {
        /// Destination file
        #[arg(long, default_value = "snake-es.json")]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct TrainArgs {
    /// JSON parameter file; defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Checkpoint written after every step
    #[arg(long, default_value = "policy.bin")]
    checkpoint: PathBuf,

    /// Continue from the existing checkpoint instead of fresh weights
    #[arg(long)]
    resume: bool,

    /// Stop after this many steps (runs until interrupted otherwise)
    #[arg(long)]
    steps: Option<u64>,

    /// Write per-step statistics to this JSON file
    #[arg(long)]
    history: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

/// Command-line overrides applied on top of the parameter file.
#[derive(clap::Args)]
struct Overrides {
    /// Board side length
    #[arg(long)]
    board_size: Option<usize>,

    /// Hidden layer width
    #[arg(long)]
    hidden_size: Option<usize>,

    /// Perturbations per step
    #[arg(long)]
    trials: Option<usize>,

    /// Games per perturbation
    #[arg(long)]
    rollouts: Option<usize>,

    /// Noise standard deviation
    #[arg(long)]
    sigma: Option<f32>,

    /// Learning rate (Adam alpha)
    #[arg(long)]
    learning_rate: Option<f32>,

    /// Update rule
    #[arg(long)]
    optimizer: Option<OptimizerArg>,

    /// Noise stream seed
    #[arg(long)]
    seed: Option<u32>,

    /// Environment stream seed
    #[arg(long)]
    game_seed: Option<u32>,

    /// Evaluate trials on a single thread
    #[arg(long, default_value_t = false)]
    sequential: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OptimizerArg {
    Sgd,
    Adam,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(arg: OptimizerArg) -> Self {
        match arg {
            OptimizerArg::Sgd => OptimizerKind::Sgd,
            OptimizerArg::Adam => OptimizerKind::Adam,
        }
    }
}

#[derive(clap::Args)]
struct EvaluateArgs {
    /// Policy checkpoint to score
    #[arg(long, default_value = "policy.bin")]
    checkpoint: PathBuf,

    /// JSON parameter file describing the board and network
    #[arg(long)]
    config: Option<PathBuf>,

    /// Games to average over
    #[arg(long, default_value = "1000")]
    games: usize,

    /// Seed for the games; drawn at random when absent
    #[arg(long)]
    seed: Option<u32>,
}

#[derive(clap::Args)]
struct SearchArgs {
    /// JSON parameter file describing the board
    #[arg(long)]
    config: Option<PathBuf>,

    /// Games to average over
    #[arg(long, default_value = "100")]
    games: usize,

    /// Random continuations per candidate move
    #[arg(long, default_value = "100")]
    iters: usize,

    /// Seed for the games; drawn at random when absent
    #[arg(long)]
    seed: Option<u32>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Evaluate(args) => evaluate(args),
        Command::Search(args) => search(args),
        Command::InitConfig { output } => {
            TrainParams::default()
                .save_to_file(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), "wrote default parameters");
            Ok(())
        }
    }
}

fn load_params(config: Option<&Path>) -> Result<TrainParams> {
    match config {
        Some(path) => TrainParams::load_from_file(path)
            .with_context(|| format!("loading parameters from {}", path.display())),
        None => Ok(TrainParams::default()),
    }
}

/// Uses the configured seed, or draws and logs a fresh one so the run can be replayed.
fn resolve_seed(seed: Option<u32>, stream: &str) -> u32 {
    seed.unwrap_or_else(|| {
        let seed = rand::random::<u32>();
        info!(stream, seed, "drew fresh seed");
        seed
    })
}

fn apply_overrides(params: &mut TrainParams, overrides: &Overrides) {
    if let Some(board_size) = overrides.board_size {
        params.board_size = board_size;
    }
    if let Some(hidden_size) = overrides.hidden_size {
        params.hidden_size = hidden_size;
    }
    if let Some(trials) = overrides.trials {
        params.trials = trials;
    }
    if let Some(rollouts) = overrides.rollouts {
        params.rollouts_per_trial = rollouts;
    }
    if let Some(sigma) = overrides.sigma {
        params.sigma = sigma;
    }
    if let Some(learning_rate) = overrides.learning_rate {
        params.learning_rate = learning_rate;
    }
    if let Some(optimizer) = overrides.optimizer {
        params.optimizer = optimizer.into();
    }
    if overrides.seed.is_some() {
        params.seed = overrides.seed;
    }
    if overrides.game_seed.is_some() {
        params.game_seed = overrides.game_seed;
    }
    if overrides.sequential {
        params.parallel = false;
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut params = load_params(args.config.as_deref())?;
    apply_overrides(&mut params, &args.overrides);
    params.validate().context("invalid training parameters")?;

    let seed = resolve_seed(params.seed, "noise");
    let game_seed = resolve_seed(params.game_seed, "game");

    let mut trainer = if args.resume {
        let policy = checkpoint::load_expecting(
            &args.checkpoint,
            params.board_size,
            params.hidden_size,
            params.apple_bias,
        )
        .with_context(|| format!("resuming from {}", args.checkpoint.display()))?;
        info!(path = %args.checkpoint.display(), "resuming from checkpoint");
        Trainer::with_policy(params, policy, seed, game_seed)?
    } else {
        Trainer::new(params, seed, game_seed)?
    };
    info!(
        num_params = trainer.policy().num_params(),
        board_size = trainer.params().board_size,
        hidden_size = trainer.params().hidden_size,
        "policy ready"
    );

    let mut history = TrainingHistory::default();
    let history_path = args.history.as_deref();
    trainer
        .train(args.steps, Some(args.checkpoint.as_path()), |stats| {
            info!(
                step = stats.step,
                mean = stats.mean_fitness,
                std = stats.std_fitness,
                max = stats.max_fitness,
                grad_norm = stats.gradient_norm,
                distance = stats.distance_from_init,
                "step"
            );
            history.record(*stats);
            let due = (stats.step + 1) % HISTORY_SAVE_INTERVAL == 0;
            if let Some(path) = history_path.filter(|_| due) {
                if let Err(err) = history.save_to_file(path) {
                    warn!(path = %path.display(), "failed to save history: {err}");
                }
            }
        })
        .with_context(|| format!("writing checkpoint {}", args.checkpoint.display()))?;

    if let Some(path) = history_path {
        history
            .save_to_file(path)
            .map_err(|err| anyhow!("writing history {}: {err}", path.display()))?;
    }
    if let Some(best) = history.best_mean() {
        info!(best_mean = best, "training finished");
    }
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let params = load_params(args.config.as_deref())?;
    let policy = checkpoint::load_expecting(
        &args.checkpoint,
        params.board_size,
        params.hidden_size,
        params.apple_bias,
    )
    .with_context(|| format!("loading {}", args.checkpoint.display()))?;

    let mut rng = RandomStream::new(resolve_seed(args.seed, "game"));
    let reference = Game::new(params.game_rules(), &mut rng);
    let mut scratch = Scratch::new(&policy, &reference);
    let settings = RolloutSettings {
        games: args.games.max(1),
        apple_tolerance: params.effective_apple_tolerance(),
        fitness: params.fitness,
    };
    let mean = rollout::evaluate_fresh_apples(&reference, &mut scratch, &mut rng, &settings);
    info!(games = settings.games, mean_fitness = mean, "evaluation finished");
    println!("{mean}");
    Ok(())
}

fn search(args: SearchArgs) -> Result<()> {
    let params = load_params(args.config.as_deref())?;
    let mut rng = RandomStream::new(resolve_seed(args.seed, "game"));
    let mut game = Game::new(params.game_rules(), &mut rng);
    let mut scratch = game.clone();
    let games = args.games.max(1);

    let mut total = 0_u64;
    for index in 0..games {
        game.reset(&mut rng);
        let result = rollout::play_search(
            &mut game,
            &mut scratch,
            args.iters,
            params.effective_apple_tolerance(),
            &mut rng,
        );
        debug!(
            game = index,
            score = result.score,
            steps = result.steps,
            "search game"
        );
        total += u64::from(result.score);
    }
    let mean = total as f32 / games as f32;
    info!(games, iters = args.iters, mean_score = mean, "search finished");
    println!("{mean}");
    Ok(())
}
