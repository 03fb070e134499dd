//! Experience replay.
//!
//! [`ReplayMemory`] is a fixed-capacity ring buffer: insertion is O(1) and,
//! once the buffer is full, overwrites the oldest transition. Sampling draws
//! uniformly **without replacement**, so a batch never contains the same
//! stored transition twice, and it never touches the stored transitions or
//! their order. The caller supplies the random number generator.

use ndarray::{Array1, Array2};
use rand::seq::index;
use rand::Rng;

use crate::error::{RacerError, Result};

/// One observed `(state, action, reward, next_state, done)` tuple.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Array1<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Array1<f32>,
    pub done: bool,
}

impl Transition {
    pub fn new(state: Array1<f32>, action: usize, reward: f32, next_state: Array1<f32>, done: bool) -> Self {
        Transition {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// A sampled batch regrouped by field. Row `i` of every field belongs to the
/// same transition.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionBatch {
    pub states: Array2<f32>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    pub next_states: Array2<f32>,
    /// 1.0 for terminal transitions, 0.0 otherwise
    pub dones: Array1<f32>,
}

impl TransitionBatch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Bounded FIFO store of transitions.
#[derive(Clone, Debug)]
pub struct ReplayMemory {
    buffer: Vec<Transition>,
    capacity: usize,
    observation_dim: usize,
    /// Slot the next insertion writes to; also the oldest entry once full.
    position: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize, observation_dim: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RacerError::config("replay memory capacity must be > 0"));
        }
        if observation_dim == 0 {
            return Err(RacerError::config("observation dimension must be > 0"));
        }
        Ok(ReplayMemory {
            buffer: Vec::with_capacity(capacity),
            capacity,
            observation_dim,
            position: 0,
        })
    }

    /// Store a transition, evicting the oldest one when full.
    pub fn add(&mut self, transition: Transition) -> Result<()> {
        for (name, obs) in [("state", &transition.state), ("next_state", &transition.next_state)] {
            if obs.len() != self.observation_dim {
                return Err(RacerError::invalid_shape(
                    format!("{} of length {}", name, self.observation_dim),
                    format!("{}", obs.len()),
                ));
            }
        }

        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.position] = transition;
        }
        self.position = (self.position + 1) % self.capacity;
        Ok(())
    }

    /// Draw `batch_size` distinct transitions uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<TransitionBatch> {
        if batch_size == 0 {
            return Err(RacerError::config("batch size must be > 0"));
        }
        if batch_size > self.buffer.len() {
            return Err(RacerError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        let indices = index::sample(rng, self.buffer.len(), batch_size);

        let mut states = Array2::zeros((batch_size, self.observation_dim));
        let mut next_states = Array2::zeros((batch_size, self.observation_dim));
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Array1::zeros(batch_size);
        let mut dones = Array1::zeros(batch_size);

        for (row, i) in indices.iter().enumerate() {
            let t = &self.buffer[i];
            states.row_mut(row).assign(&t.state);
            next_states.row_mut(row).assign(&t.next_state);
            actions.push(t.action);
            rewards[row] = t.reward;
            dones[row] = if t.done { 1.0 } else { 0.0 };
        }

        Ok(TransitionBatch {
            states,
            actions,
            rewards,
            next_states,
            dones,
        })
    }

    /// Stored transitions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.buffer.len() < self.capacity { 0 } else { self.position };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    pub fn oldest(&self) -> Option<&Transition> {
        self.iter().next()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn observation_dim(&self) -> usize {
        self.observation_dim
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.position = 0;
    }
}
