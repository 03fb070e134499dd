use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Aggregate statistics of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainingSummary {
    pub steps: usize,
    pub learning_steps: usize,
    pub target_syncs: usize,
    pub episodes: usize,
    /// Returns of the most recent completed episodes, oldest first
    pub recent_returns: Vec<f32>,
    pub mean_recent_return: Option<f32>,
    pub best_return: Option<f32>,
    /// Mean loss over the most recent learning steps
    pub mean_recent_loss: Option<f32>,
    pub last_loss: Option<f32>,
}

impl TrainingSummary {
    /// Write the summary as pretty-printed JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Tracks losses and episode returns during training.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    history_size: usize,
    losses: VecDeque<f32>,
    returns: VecDeque<f32>,

    current_return: f32,
    current_length: usize,
    episodes: usize,
    best_return: Option<f32>,
    last_loss: Option<f32>,
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        let history_size = history_size.max(1);
        MetricsTracker {
            history_size,
            losses: VecDeque::with_capacity(history_size),
            returns: VecDeque::with_capacity(history_size),
            current_return: 0.0,
            current_length: 0,
            episodes: 0,
            best_return: None,
            last_loss: None,
        }
    }

    /// Record a training loss
    pub fn record_loss(&mut self, loss: f32) {
        if self.losses.len() >= self.history_size {
            self.losses.pop_front();
        }
        self.losses.push_back(loss);
        self.last_loss = Some(loss);
    }

    /// Record the reward of one agent step.
    pub fn record_step(&mut self, reward: f32) {
        self.current_return += reward;
        self.current_length += 1;
    }

    /// Close the current episode, returning its `(return, length)`.
    pub fn end_episode(&mut self) -> (f32, usize) {
        let finished = (self.current_return, self.current_length);
        if self.returns.len() >= self.history_size {
            self.returns.pop_front();
        }
        self.returns.push_back(finished.0);
        self.best_return = Some(self.best_return.map_or(finished.0, |b| b.max(finished.0)));
        self.episodes += 1;
        self.current_return = 0.0;
        self.current_length = 0;
        finished
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }

    pub fn mean_loss(&self) -> Option<f32> {
        mean(&self.losses)
    }

    pub fn mean_return(&self) -> Option<f32> {
        mean(&self.returns)
    }

    pub fn summary(&self, steps: usize, learning_steps: usize, target_syncs: usize) -> TrainingSummary {
        TrainingSummary {
            steps,
            learning_steps,
            target_syncs,
            episodes: self.episodes,
            recent_returns: self.returns.iter().copied().collect(),
            mean_recent_return: self.mean_return(),
            best_return: self.best_return,
            mean_recent_loss: self.mean_loss(),
            last_loss: self.last_loss,
        }
    }
}

fn mean(values: &VecDeque<f32>) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}
