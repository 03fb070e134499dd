//! Discretization of the driving controls.
//!
//! The simulator takes a continuous `(steer, gas, brake)` vector; the
//! Q-network scores a fixed set of discrete actions. [`ActionSpace`] is the
//! cartesian product of configured steering, gas and brake levels, indexed
//! steering-major.

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{RacerError, Result};

/// Continuous control vector understood by driving environments.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Control {
    /// -1 (full left) ..= 1 (full right)
    pub steer: f32,
    /// 0 ..= 1
    pub gas: f32,
    /// 0 ..= 1
    pub brake: f32,
}

impl Control {
    pub fn new(steer: f32, gas: f32, brake: f32) -> Self {
        Control { steer, gas, brake }
    }

    pub fn to_array(&self) -> Array1<f32> {
        Array1::from(vec![self.steer, self.gas, self.brake])
    }
}

/// Levels combined into the discrete action set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionLevels {
    pub steer: Vec<f32>,
    pub gas: Vec<f32>,
    pub brake: Vec<f32>,
}

impl Default for ActionLevels {
    fn default() -> Self {
        ActionLevels {
            steer: vec![-1.0, 0.0, 1.0],
            gas: vec![0.0, 1.0],
            brake: vec![0.0, 0.8],
        }
    }
}

/// Fixed mapping between action indices and control vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionSpace {
    controls: Vec<Control>,
}

impl ActionSpace {
    pub fn new(levels: &ActionLevels) -> Result<Self> {
        for (name, values, lo, hi) in [
            ("steer", &levels.steer, -1.0, 1.0),
            ("gas", &levels.gas, 0.0, 1.0),
            ("brake", &levels.brake, 0.0, 1.0),
        ] {
            if values.is_empty() {
                return Err(RacerError::config(format!("action levels for {} are empty", name)));
            }
            if let Some(v) = values.iter().find(|v| !(**v >= lo && **v <= hi)) {
                return Err(RacerError::config(format!(
                    "{} level {} outside [{}, {}]",
                    name, v, lo, hi
                )));
            }
        }

        Ok(ActionSpace {
            controls: product(levels),
        })
    }

    /// Number of discrete actions.
    pub fn num_actions(&self) -> usize {
        self.controls.len()
    }

    /// Control vector for an action index.
    pub fn control(&self, index: usize) -> Result<Control> {
        self.controls.get(index).copied().ok_or(RacerError::InvalidAction {
            action: index,
            num_actions: self.controls.len(),
        })
    }

    /// Index of an exact control vector, if it belongs to this space.
    pub fn index_of(&self, control: &Control) -> Option<usize> {
        self.controls.iter().position(|c| c == control)
    }

    /// Greedy selection: argmax of a `1 x num_actions` row of Q-values,
    /// ties broken towards the lowest index. NaN never wins.
    pub fn get_action(&self, q_values: ArrayView2<f32>) -> Result<(usize, Control)> {
        self.check_q_values(q_values)?;

        let mut best = 0;
        let mut best_value = f32::NEG_INFINITY;
        for (i, &v) in q_values.row(0).iter().enumerate() {
            if v > best_value {
                best = i;
                best_value = v;
            }
        }
        Ok((best, self.controls[best]))
    }

    pub(crate) fn check_q_values(&self, q_values: ArrayView2<f32>) -> Result<()> {
        if q_values.dim() != (1, self.controls.len()) {
            return Err(RacerError::invalid_shape(
                format!("[1, {}]", self.controls.len()),
                format!("{:?}", q_values.shape()),
            ));
        }
        Ok(())
    }
}

impl Default for ActionSpace {
    fn default() -> Self {
        ActionSpace {
            controls: product(&ActionLevels::default()),
        }
    }
}

fn product(levels: &ActionLevels) -> Vec<Control> {
    let mut controls = Vec::with_capacity(levels.steer.len() * levels.gas.len() * levels.brake.len());
    for &steer in &levels.steer {
        for &gas in &levels.gas {
            for &brake in &levels.brake {
                controls.push(Control::new(steer, gas, brake));
            }
        }
    }
    controls
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_actions() -> ActionSpace {
        ActionSpace::new(&ActionLevels {
            steer: vec![-1.0, 0.0, 1.0],
            gas: vec![0.0],
            brake: vec![0.0],
        })
        .unwrap()
    }

    #[test]
    fn test_default_space_has_twelve_actions() {
        let space = ActionSpace::default();
        assert_eq!(space.num_actions(), 12);
        assert_eq!(space.control(0).unwrap(), Control::new(-1.0, 0.0, 0.0));
        assert_eq!(space.control(11).unwrap(), Control::new(1.0, 1.0, 0.8));
        assert_eq!(ActionSpace::new(&ActionLevels::default()).unwrap(), space);
    }

    #[test]
    fn test_greedy_selection() {
        let space = three_actions();
        let (index, control) = space.get_action(array![[0.1, 0.9, 0.3]].view()).unwrap();
        assert_eq!(index, 1);
        assert_eq!(control, Control::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_ties_break_to_lowest_index() {
        let space = three_actions();
        let (index, _) = space.get_action(array![[0.5, 0.9, 0.9]].view()).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_nan_is_never_selected() {
        let space = three_actions();
        let (index, _) = space.get_action(array![[f32::NAN, -2.0, -3.0]].view()).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let space = three_actions();
        assert!(matches!(
            space.get_action(array![[0.1, 0.2]].view()),
            Err(RacerError::InvalidShape { .. })
        ));
        assert!(matches!(
            space.get_action(array![[0.1, 0.2, 0.3], [0.1, 0.2, 0.3]].view()),
            Err(RacerError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_control_out_of_range() {
        let space = three_actions();
        assert!(matches!(
            space.control(3),
            Err(RacerError::InvalidAction { action: 3, num_actions: 3 })
        ));
    }

    #[test]
    fn test_index_of_round_trip() {
        let space = ActionSpace::default();
        let control = space.control(7).unwrap();
        assert_eq!(space.index_of(&control), Some(7));
    }

    #[test]
    fn test_invalid_levels() {
        let levels = ActionLevels {
            gas: vec![1.5],
            ..ActionLevels::default()
        };
        assert!(ActionSpace::new(&levels).is_err());
    }
}
