//! # Racer - Deep Q-Learning for a Driving Simulation
//!
//! Racer trains a discrete-action driving agent with Deep Q-Learning. The
//! agent picks one of a fixed set of `(steer, gas, brake)` controls, each
//! decision is repeated for several simulator frames, and the collected
//! transitions feed a replay memory from which the online Q-network learns
//! against a slowly updated target network.
//!
//! ## Key Features
//!
//! - **Action Space**: Cartesian product of configurable steering, gas and brake levels
//! - **Frame Skipping**: One decision drives several frames with summed reward
//! - **Replay Memory**: Fixed-capacity ring buffer with uniform sampling without replacement
//! - **Target Network**: Hard or soft synchronization on a fixed cadence
//! - **Optimizers**: SGD, Adam and RMSProp with per-layer state
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use racer::config::TrainerConfig;
//! use racer::trainer::Trainer;
//!
//! let config = TrainerConfig {
//!     num_of_steps: 5_000,
//!     seed: Some(7),
//!     ..TrainerConfig::default()
//! };
//!
//! let mut trainer = Trainer::on_track(config, Some("model.bin".into()))?;
//! trainer.run()?;
//! let summary = trainer.finish()?;
//! println!("best return: {:?}", summary.best_return);
//! # Ok::<(), racer::error::RacerError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`actions`] - Discrete action index to control mapping
//! - [`activations`] - Hidden layer activation functions
//! - [`config`] - Training hyperparameters loaded from TOML
//! - [`environment`] - Environment contract and the frame-skip wrapper
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense layers and weight initialization
//! - [`loss`] - Huber and MSE losses
//! - [`metrics`] - Episode returns, losses and the final summary
//! - [`network`] - The Q-network
//! - [`optimizer`] - Optimization algorithms and gradient clipping
//! - [`policy`] - Epsilon-greedy action selection
//! - [`replay_memory`] - Experience replay
//! - [`track`] - Built-in circular track simulation
//! - [`trainer`] - The training loop

pub mod actions;
pub mod activations;
pub mod config;
pub mod environment;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod policy;
pub mod replay_memory;
pub mod track;
pub mod trainer;
