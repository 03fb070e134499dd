use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::actions::ActionLevels;
use crate::activations::Activation;
use crate::error::{RacerError, Result};
use crate::optimizer::{GradientClipper, OptimizerKind};
use crate::track::TrackConfig;

/// Training hyperparameters, loadable from TOML.
///
/// Every field has a default, so a config file only needs to name the values
/// it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Replay memory size
    pub memory_capacity: usize,
    /// Agent decisions to run
    pub num_of_steps: usize,
    /// Transitions per learning step; learning starts once this many are stored
    pub batch_size: usize,
    /// Weight on the bootstrapped future value, in (0, 1)
    pub discount_factor: f32,
    /// Simulator frames per agent decision
    pub skip_steps: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Maximum global gradient norm; unset disables clipping
    pub gradient_clip: Option<f32>,
    pub hidden_layers: Vec<usize>,
    pub hidden_activation: Activation,
    /// Learning steps between target syncs; 0 never syncs
    pub target_sync_every: usize,
    /// 1.0 copies the online network, smaller values blend towards it
    pub target_tau: f32,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay_steps: usize,
    /// Emit the per-update loss line every `log_every` learning steps
    pub log_every: usize,
    pub seed: Option<u64>,
    pub actions: ActionLevels,
    pub track: TrackConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            memory_capacity: 10_000,
            num_of_steps: 50_000,
            batch_size: 32,
            discount_factor: 0.99,
            skip_steps: 4,
            learning_rate: 0.01,
            optimizer: OptimizerKind::RmsProp,
            gradient_clip: None,
            hidden_layers: vec![64, 64],
            hidden_activation: Activation::Relu,
            target_sync_every: 1_000,
            target_tau: 1.0,
            epsilon_start: 1.0,
            epsilon_end: 0.05,
            epsilon_decay_steps: 10_000,
            log_every: 1,
            seed: None,
            actions: ActionLevels::default(),
            track: TrackConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TrainerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 {
            return Err(RacerError::config("memory_capacity must be > 0"));
        }
        if self.num_of_steps == 0 {
            return Err(RacerError::config("num_of_steps must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(RacerError::config("batch_size must be > 0"));
        }
        if self.batch_size > self.memory_capacity {
            return Err(RacerError::config("batch_size must be <= memory_capacity"));
        }
        if !(self.discount_factor > 0.0 && self.discount_factor < 1.0) {
            return Err(RacerError::config(format!(
                "discount_factor must be in (0, 1), got {}",
                self.discount_factor
            )));
        }
        if self.skip_steps == 0 {
            return Err(RacerError::config("skip_steps must be >= 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(RacerError::config("learning_rate must be > 0"));
        }
        if let Some(max_norm) = self.gradient_clip {
            if !(max_norm > 0.0) {
                return Err(RacerError::config("gradient_clip must be > 0"));
            }
        }
        if self.hidden_layers.iter().any(|&w| w == 0) {
            return Err(RacerError::config("hidden layer widths must be > 0"));
        }
        if !(self.target_tau > 0.0 && self.target_tau <= 1.0) {
            return Err(RacerError::config(format!(
                "target_tau must be in (0, 1], got {}",
                self.target_tau
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon_start) || !(0.0..=1.0).contains(&self.epsilon_end) {
            return Err(RacerError::config("epsilon_start and epsilon_end must be in [0, 1]"));
        }
        if self.epsilon_end > self.epsilon_start {
            return Err(RacerError::config("epsilon_end must be <= epsilon_start"));
        }
        if self.log_every == 0 {
            return Err(RacerError::config("log_every must be >= 1"));
        }
        self.track.validate()
    }

    pub fn clipper(&self) -> GradientClipper {
        match self.gradient_clip {
            Some(max_norm) => GradientClipper::ClipByGlobalNorm { max_norm },
            None => GradientClipper::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(TrainerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TrainerConfig = toml::from_str(
            r#"
            batch_size = 64
            optimizer = "adam"

            [track]
            max_frames = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.optimizer, OptimizerKind::Adam);
        assert_eq!(config.track.max_frames, 500);
        assert_eq!(config.memory_capacity, 10_000);
        assert_eq!(config.track.radius, 30.0);
    }

    #[test]
    fn test_rejects_discount_outside_open_interval() {
        for gamma in [0.0, 1.0, -0.5, 1.5] {
            let config = TrainerConfig {
                discount_factor: gamma,
                ..TrainerConfig::default()
            };
            assert!(matches!(config.validate(), Err(RacerError::Configuration(_))), "gamma {}", gamma);
        }
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let zero_capacity = TrainerConfig {
            memory_capacity: 0,
            ..TrainerConfig::default()
        };
        assert!(zero_capacity.validate().is_err());

        let zero_batch = TrainerConfig {
            batch_size: 0,
            ..TrainerConfig::default()
        };
        assert!(zero_batch.validate().is_err());

        let zero_skip = TrainerConfig {
            skip_steps: 0,
            ..TrainerConfig::default()
        };
        assert!(zero_skip.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_tau() {
        let config = TrainerConfig {
            target_tau: 0.0,
            ..TrainerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "num_of_steps = 10\nskip_steps = 2").unwrap();
        let config = TrainerConfig::load(file.path()).unwrap();
        assert_eq!(config.num_of_steps, 10);
        assert_eq!(config.skip_steps, 2);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = 0").unwrap();
        assert!(matches!(
            TrainerConfig::load(file.path()),
            Err(RacerError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainerConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, TrainerConfig::default());
    }
}
