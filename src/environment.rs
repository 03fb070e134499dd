//! Environment contract and the frame-skipping wrapper the trainer drives.

use ndarray::Array1;

use crate::actions::Control;
use crate::error::{RacerError, Result};

/// Result of advancing an environment.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub observation: Array1<f32>,
    pub reward: f32,
    pub done: bool,
}

/// A step-based driving simulation.
///
/// Implementations report simulator failures as [`RacerError::Environment`].
pub trait Environment {
    /// Length of every observation vector this environment produces.
    fn observation_dim(&self) -> usize;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Array1<f32>>;

    /// Advance a single simulation frame.
    fn step(&mut self, control: &Control) -> Result<Step>;

    /// Release simulator resources.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn observation_dim(&self) -> usize {
        (**self).observation_dim()
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        (**self).reset()
    }

    fn step(&mut self, control: &Control) -> Result<Step> {
        (**self).step(control)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Repeats each agent decision for `skip_steps` simulator frames.
///
/// Rewards are summed over the executed frames. If the episode terminates
/// mid-skip the remaining frames are not run. The wrapper never resets on
/// its own; callers reset after a `done` step. Every observation is checked
/// against [`Environment::observation_dim`], and non-finite observations or
/// rewards are reported as [`RacerError::Environment`].
pub struct EnvironmentWrapper<E> {
    env: E,
    skip_steps: usize,
    frames: u64,
}

impl<E: Environment> EnvironmentWrapper<E> {
    pub fn new(env: E, skip_steps: usize) -> Result<Self> {
        if skip_steps == 0 {
            return Err(RacerError::config("skip_steps must be >= 1"));
        }
        if env.observation_dim() == 0 {
            return Err(RacerError::config("environment reports an empty observation"));
        }
        Ok(EnvironmentWrapper {
            env,
            skip_steps,
            frames: 0,
        })
    }

    pub fn reset(&mut self) -> Result<Array1<f32>> {
        let observation = self.env.reset()?;
        self.check_observation(&observation)?;
        Ok(observation)
    }

    pub fn step(&mut self, control: &Control) -> Result<Step> {
        let mut reward: f32 = 0.0;
        let mut observation = Array1::zeros(0);
        let mut done = false;

        for _ in 0..self.skip_steps {
            let step = self.env.step(control)?;
            self.frames += 1;
            if !step.reward.is_finite() {
                return Err(RacerError::environment(format!(
                    "non-finite reward {} on frame {}",
                    step.reward, self.frames
                )));
            }
            reward += step.reward;
            observation = step.observation;
            if step.done {
                done = true;
                break;
            }
        }

        if !reward.is_finite() {
            return Err(RacerError::environment(format!("summed reward overflowed to {}", reward)));
        }
        self.check_observation(&observation)?;
        Ok(Step {
            observation,
            reward,
            done,
        })
    }

    pub fn close(&mut self) -> Result<()> {
        self.env.close()
    }

    pub fn observation_dim(&self) -> usize {
        self.env.observation_dim()
    }

    pub fn skip_steps(&self) -> usize {
        self.skip_steps
    }

    /// Simulator frames executed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }

    fn check_observation(&self, observation: &Array1<f32>) -> Result<()> {
        let expected = self.env.observation_dim();
        if observation.len() != expected {
            return Err(RacerError::invalid_shape(
                format!("observation of length {}", expected),
                format!("{}", observation.len()),
            ));
        }
        if observation.iter().any(|v| !v.is_finite()) {
            return Err(RacerError::environment("observation contains non-finite values"));
        }
        Ok(())
    }
}
