//! Per-step training metrics and a bounded history of them.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

/// Summary of one ES step, handed to the run's observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    /// Zero-based step index.
    pub step: u64,
    /// Mean trial fitness.
    pub mean_fitness: f32,
    /// Population standard deviation of trial fitness.
    pub std_fitness: f32,
    /// Best trial fitness.
    pub max_fitness: f32,
    /// L2 norm of the applied weight delta (0 when skipped).
    pub gradient_norm: f32,
    /// L2 distance of the live weights from the initial weights.
    pub distance_from_init: f32,
    /// Whether the weights were updated; `false` for zero-variance batches.
    pub updated: bool,
}

/// Recent step statistics, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingHistory {
    steps: VecDeque<StepStats>,
    max_history: usize,
    best_mean: Option<f32>,
}

impl Default for TrainingHistory {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl TrainingHistory {
    /// History keeping at most `max_history` steps.
    pub fn new(max_history: usize) -> Self {
        Self {
            steps: VecDeque::with_capacity(max_history),
            max_history,
            best_mean: None,
        }
    }

    /// Appends a step, dropping the oldest one when full.
    pub fn record(&mut self, stats: StepStats) {
        self.best_mean = Some(
            self.best_mean
                .map_or(stats.mean_fitness, |best| best.max(stats.mean_fitness)),
        );
        self.steps.push_back(stats);
        while self.steps.len() > self.max_history {
            self.steps.pop_front();
        }
    }

    /// Retained steps, oldest first.
    pub fn steps(&self) -> &VecDeque<StepStats> {
        &self.steps
    }

    /// Most recent step.
    pub fn last(&self) -> Option<&StepStats> {
        self.steps.back()
    }

    /// Highest mean fitness ever recorded, including evicted steps.
    pub fn best_mean(&self) -> Option<f32> {
        self.best_mean
    }

    /// Mean fitness averaged over the last `window` steps.
    pub fn moving_average(&self, window: usize) -> Option<f32> {
        let count = window.min(self.steps.len());
        if count == 0 {
            return None;
        }
        let sum: f32 = self
            .steps
            .iter()
            .rev()
            .take(count)
            .map(|s| s.mean_fitness)
            .sum();
        Some(sum / count as f32)
    }

    /// Saves the history as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
