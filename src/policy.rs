use ndarray::ArrayView2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::actions::{ActionSpace, Control};
use crate::error::{RacerError, Result};

/// Epsilon-greedy exploration with a linear decay schedule.
///
/// `epsilon(step)` falls linearly from `start` to `end` over `decay_steps`
/// interaction steps and stays at `end` afterwards. `start == end == 0`
/// gives pure greedy selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    pub start: f32,
    pub end: f32,
    pub decay_steps: usize,
}

impl EpsilonGreedy {
    pub fn new(start: f32, end: f32, decay_steps: usize) -> Result<Self> {
        for (name, value) in [("epsilon_start", start), ("epsilon_end", end)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RacerError::config(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        if end > start {
            return Err(RacerError::config("epsilon_end must be <= epsilon_start"));
        }
        Ok(EpsilonGreedy { start, end, decay_steps })
    }

    pub fn greedy() -> Self {
        EpsilonGreedy {
            start: 0.0,
            end: 0.0,
            decay_steps: 0,
        }
    }

    pub fn epsilon(&self, step: usize) -> f32 {
        if step >= self.decay_steps {
            return self.end;
        }
        let fraction = step as f32 / self.decay_steps as f32;
        self.start + (self.end - self.start) * fraction
    }

    /// Pick an action for one row of Q-values.
    pub fn select<R: Rng + ?Sized>(
        &self,
        q_values: ArrayView2<f32>,
        actions: &ActionSpace,
        step: usize,
        rng: &mut R,
    ) -> Result<(usize, Control)> {
        let epsilon = self.epsilon(step);
        if epsilon > 0.0 && rng.gen::<f32>() < epsilon {
            actions.check_q_values(q_values)?;
            let index = rng.gen_range(0..actions.num_actions());
            return Ok((index, actions.control(index)?));
        }
        actions.get_action(q_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_decay() {
        let policy = EpsilonGreedy::new(1.0, 0.1, 10).unwrap();
        assert_eq!(policy.epsilon(0), 1.0);
        assert!((policy.epsilon(5) - 0.55).abs() < 1e-6);
        assert_eq!(policy.epsilon(10), 0.1);
        assert_eq!(policy.epsilon(1_000), 0.1);
    }

    #[test]
    fn test_zero_decay_steps_uses_end() {
        let policy = EpsilonGreedy::new(1.0, 0.2, 0).unwrap();
        assert_eq!(policy.epsilon(0), 0.2);
    }

    #[test]
    fn test_greedy_policy_is_deterministic() {
        let actions = ActionSpace::default();
        let mut q = Array2::zeros((1, actions.num_actions()));
        q[[0, 4]] = 2.0;
        let mut rng = StdRng::seed_from_u64(11);
        for step in 0..20 {
            let (index, _) = EpsilonGreedy::greedy().select(q.view(), &actions, step, &mut rng).unwrap();
            assert_eq!(index, 4);
        }
    }

    #[test]
    fn test_full_exploration_stays_in_range() {
        let actions = ActionSpace::default();
        let q = Array2::zeros((1, actions.num_actions()));
        let policy = EpsilonGreedy::new(1.0, 1.0, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for step in 0..100 {
            let (index, control) = policy.select(q.view(), &actions, step, &mut rng).unwrap();
            assert!(index < actions.num_actions());
            assert_eq!(actions.control(index).unwrap(), control);
        }
    }

    #[test]
    fn test_exploration_still_validates_shape() {
        let actions = ActionSpace::default();
        let q = Array2::zeros((2, actions.num_actions()));
        let policy = EpsilonGreedy::new(1.0, 1.0, 0).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        assert!(policy.select(q.view(), &actions, 0, &mut rng).is_err());
    }

    #[test]
    fn test_rejects_inverted_schedule() {
        assert!(EpsilonGreedy::new(0.1, 0.5, 10).is_err());
        assert!(EpsilonGreedy::new(1.5, 0.5, 10).is_err());
    }
}
