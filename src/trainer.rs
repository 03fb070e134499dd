//! # Deep Q-Learning trainer
//!
//! [`Trainer`] owns every piece of mutable training state: both networks,
//! the optimizer, the replay memory, the environment and the random number
//! generator. A run alternates between two phases:
//!
//! - **collect**: evaluate the online network on the current observation,
//!   pick an action, step the environment and store the transition;
//! - **learn**: once the memory holds at least `batch_size` transitions,
//!   sample a batch and apply one Bellman update to the online network.
//!
//! The target network is evaluated with the pure [`QNetwork::forward`] only,
//! so no gradient ever reaches it. It changes solely through
//! [`Trainer::sync_target`], which runs every `target_sync_every` learning
//! steps.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::actions::ActionSpace;
use crate::config::TrainerConfig;
use crate::environment::{Environment, EnvironmentWrapper};
use crate::error::{RacerError, Result};
use crate::loss::{HuberLoss, Loss};
use crate::metrics::{MetricsTracker, TrainingSummary};
use crate::network::{max_per_row, QNetwork};
use crate::optimizer::{GradientClipper, OptimizerWrapper};
use crate::policy::EpsilonGreedy;
use crate::replay_memory::{ReplayMemory, Transition};
use crate::track::TrackEnv;

const METRICS_HISTORY: usize = 100;

/// One-step Bellman backup: `reward + gamma * next_q * (1 - done)`.
///
/// Terminal transitions (`done == 1`) get exactly their reward.
pub fn bellman_targets(
    rewards: ArrayView1<f32>,
    next_q_values: ArrayView1<f32>,
    dones: ArrayView1<f32>,
    discount_factor: f32,
) -> Result<Array1<f32>> {
    if rewards.len() != next_q_values.len() || rewards.len() != dones.len() {
        return Err(RacerError::invalid_shape(
            format!("three vectors of length {}", rewards.len()),
            format!("next_q {} / dones {}", next_q_values.len(), dones.len()),
        ));
    }
    Ok(ndarray::Zip::from(rewards)
        .and(next_q_values)
        .and(dones)
        .map_collect(|&r, &q, &d| {
            if d >= 1.0 {
                r
            } else {
                r + discount_factor * q * (1.0 - d)
            }
        }))
}

/// `q_values[i, actions[i]]` for every row.
pub fn gather_actions(q_values: ArrayView2<f32>, actions: &[usize]) -> Result<Array1<f32>> {
    if q_values.nrows() != actions.len() {
        return Err(RacerError::invalid_shape(
            format!("{} rows", actions.len()),
            format!("{:?}", q_values.shape()),
        ));
    }
    let num_actions = q_values.ncols();
    actions
        .iter()
        .enumerate()
        .map(|(row, &action)| {
            if action >= num_actions {
                Err(RacerError::InvalidAction { action, num_actions })
            } else {
                Ok(q_values[[row, action]])
            }
        })
        .collect::<Result<Vec<f32>>>()
        .map(Array1::from)
}

pub struct Trainer<E> {
    config: TrainerConfig,
    actions: ActionSpace,
    current: QNetwork,
    target: QNetwork,
    optimizer: OptimizerWrapper,
    clipper: GradientClipper,
    loss: HuberLoss,
    memory: ReplayMemory,
    environment: EnvironmentWrapper<E>,
    policy: EpsilonGreedy,
    rng: StdRng,
    model_path: Option<PathBuf>,

    state: Option<Array1<f32>>,
    steps: usize,
    learning_steps: usize,
    target_syncs: usize,
    metrics: MetricsTracker,
}

impl Trainer<TrackEnv> {
    /// Trainer on the built-in track simulation described by `config.track`.
    ///
    /// When the track has no seed of its own it inherits `config.seed`.
    pub fn on_track(config: TrainerConfig, model_path: Option<PathBuf>) -> Result<Self> {
        let mut track = config.track.clone();
        if track.seed.is_none() {
            track.seed = config.seed;
        }
        let env = TrackEnv::new(track)?;
        Self::new(config, env, model_path)
    }
}

impl<E: Environment> Trainer<E> {
    pub fn new(config: TrainerConfig, env: E, model_path: Option<PathBuf>) -> Result<Self> {
        config.validate()?;

        let actions = ActionSpace::new(&config.actions)?;
        let environment = EnvironmentWrapper::new(env, config.skip_steps)?;
        let observation_dim = environment.observation_dim();

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut layer_sizes = Vec::with_capacity(config.hidden_layers.len() + 2);
        layer_sizes.push(observation_dim);
        layer_sizes.extend_from_slice(&config.hidden_layers);
        layer_sizes.push(actions.num_actions());

        let current = QNetwork::new(&layer_sizes, config.hidden_activation, None, &mut rng)?;
        let target = QNetwork::new(&layer_sizes, config.hidden_activation, None, &mut rng)?;
        let optimizer = OptimizerWrapper::for_network(config.optimizer, &current);
        let memory = ReplayMemory::new(config.memory_capacity, observation_dim)?;
        let policy = EpsilonGreedy::new(config.epsilon_start, config.epsilon_end, config.epsilon_decay_steps)?;

        info!(
            ?layer_sizes,
            num_actions = actions.num_actions(),
            memory_capacity = config.memory_capacity,
            batch_size = config.batch_size,
            "trainer initialized"
        );

        Ok(Trainer {
            clipper: config.clipper(),
            config,
            actions,
            current,
            target,
            optimizer,
            loss: HuberLoss::smooth_l1(),
            memory,
            environment,
            policy,
            rng,
            model_path,
            state: None,
            steps: 0,
            learning_steps: 0,
            target_syncs: 0,
            metrics: MetricsTracker::new(METRICS_HISTORY),
        })
    }

    /// Replace both networks with a saved online network and reset the
    /// optimizer state.
    pub fn load_checkpoint<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let network = QNetwork::load(path.as_ref())?;
        if !network.same_architecture(&self.current) {
            return Err(RacerError::invalid_shape(
                format!("{:?}", self.current.layer_shapes()),
                format!("{:?}", network.layer_shapes()),
            ));
        }
        self.current = network;
        self.target.sync_from(&self.current, 1.0)?;
        self.optimizer = OptimizerWrapper::for_network(self.config.optimizer, &self.current);
        info!(path = %path.as_ref().display(), "checkpoint loaded");
        Ok(())
    }

    /// Run interaction steps until `num_of_steps` have been taken.
    pub fn run(&mut self) -> Result<TrainingSummary> {
        while self.steps < self.config.num_of_steps {
            self.step()?;
        }
        Ok(self.summary())
    }

    /// One interaction step, followed by a learning step when the memory
    /// holds enough transitions. Returns the loss if learning happened.
    pub fn step(&mut self) -> Result<Option<f32>> {
        let state = match self.state.take() {
            Some(state) => state,
            None => self.environment.reset()?,
        };

        let q_values = self.current.forward_one(state.view())?;
        let (action_index, control) = self
            .policy
            .select(q_values.view(), &self.actions, self.steps, &mut self.rng)?;

        let outcome = self.environment.step(&control)?;
        self.metrics.record_step(outcome.reward);
        self.memory.add(Transition::new(
            state,
            action_index,
            outcome.reward,
            outcome.observation.clone(),
            outcome.done,
        ))?;

        self.state = Some(if outcome.done {
            let (episode_return, length) = self.metrics.end_episode();
            info!(
                episode = self.metrics.episodes(),
                episode_return,
                length,
                step = self.steps,
                "episode finished"
            );
            self.environment.reset()?
        } else {
            outcome.observation
        });

        let step = self.steps;
        self.steps += 1;

        if self.memory.len() < self.config.batch_size {
            return Ok(None);
        }
        let loss = self.learn()?;
        if self.learning_steps % self.config.log_every == 0 {
            info!(step, loss, "Update: {}. Loss: {}", step, loss);
        }
        Ok(Some(loss))
    }

    /// One Bellman update of the online network on a sampled batch.
    pub fn learn(&mut self) -> Result<f32> {
        let batch = self.memory.sample(self.config.batch_size, &mut self.rng)?;

        let pass = self.current.forward_train(batch.states.view())?;
        let q_values = gather_actions(pass.output.view(), &batch.actions)?;

        let next_q_values = max_per_row(self.target.forward(batch.next_states.view())?.view());
        let targets = bellman_targets(
            batch.rewards.view(),
            next_q_values.view(),
            batch.dones.view(),
            self.config.discount_factor,
        )?;

        let loss = self.loss.compute(q_values.view(), targets.view())?;
        let loss_grad = self.loss.gradient(q_values.view(), targets.view())?;

        // only the taken action's output receives gradient
        let mut output_grad = Array2::zeros(pass.output.dim());
        for (row, (&action, &grad)) in batch.actions.iter().zip(loss_grad.iter()).enumerate() {
            output_grad[[row, action]] = grad;
        }
        let gradients = self.current.backward(&pass, output_grad.view())?;
        self.current
            .apply_gradients(&mut self.optimizer, gradients, &self.clipper, self.config.learning_rate);

        self.learning_steps += 1;
        self.metrics.record_loss(loss);
        if self.config.target_sync_every > 0 && self.learning_steps % self.config.target_sync_every == 0 {
            self.sync_target()?;
        }
        Ok(loss)
    }

    /// Move the target network towards the online network by `target_tau`.
    pub fn sync_target(&mut self) -> Result<()> {
        self.target.sync_from(&self.current, self.config.target_tau)?;
        self.target_syncs += 1;
        debug!(
            learning_steps = self.learning_steps,
            tau = self.config.target_tau,
            "target network synced"
        );
        Ok(())
    }

    /// Save the online network.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.current.save(path.as_ref())?;
        info!(path = %path.as_ref().display(), "checkpoint saved");
        Ok(())
    }

    /// Shut down: save the online network to the model path (if any), close
    /// the environment and return the final summary.
    /// The environment is closed even when saving fails.
    pub fn finish(mut self) -> Result<TrainingSummary> {
        let saved = match self.model_path.clone() {
            Some(path) => self.save(&path),
            None => Ok(()),
        };
        self.environment.close()?;
        saved?;
        let summary = self.summary();
        info!(
            steps = summary.steps,
            episodes = summary.episodes,
            learning_steps = summary.learning_steps,
            "training finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> TrainingSummary {
        self.metrics.summary(self.steps, self.learning_steps, self.target_syncs)
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.actions
    }

    pub fn current(&self) -> &QNetwork {
        &self.current
    }

    pub fn target(&self) -> &QNetwork {
        &self.target
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn environment(&self) -> &EnvironmentWrapper<E> {
        &self.environment
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn learning_steps(&self) -> usize {
        self.learning_steps
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }
}
