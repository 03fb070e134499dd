use serde::{Deserialize, Serialize};

use crate::network::Gradients;

/// Gradient clipping applied before each optimizer step
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum GradientClipper {
    /// Clip every component into `[min, max]`
    ClipByValue { min: f32, max: f32 },

    /// Rescale all gradients so their combined L2 norm is at most `max_norm`
    ClipByGlobalNorm { max_norm: f32 },

    #[default]
    None,
}

impl GradientClipper {
    pub fn clip(&self, gradients: &mut Gradients) {
        match *self {
            GradientClipper::ClipByValue { min, max } => {
                for layer in gradients.layers.iter_mut() {
                    layer.weights.mapv_inplace(|g| g.max(min).min(max));
                    layer.biases.mapv_inplace(|g| g.max(min).min(max));
                }
            }
            GradientClipper::ClipByGlobalNorm { max_norm } => {
                let norm = gradients.global_norm();
                if norm > max_norm {
                    let scale = max_norm / norm;
                    for layer in gradients.layers.iter_mut() {
                        layer.weights.mapv_inplace(|g| g * scale);
                        layer.biases.mapv_inplace(|g| g * scale);
                    }
                }
            }
            GradientClipper::None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerGradients;
    use ndarray::array;

    fn grads() -> Gradients {
        Gradients {
            layers: vec![LayerGradients {
                weights: array![[3.0, 0.0]],
                biases: array![4.0],
            }],
        }
    }

    #[test]
    fn test_global_norm_clipping() {
        let mut g = grads();
        assert!((g.global_norm() - 5.0).abs() < 1e-6);
        GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut g);
        assert!((g.global_norm() - 1.0).abs() < 1e-5);
        assert!((g.layers[0].weights[[0, 0]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_value_clipping() {
        let mut g = grads();
        GradientClipper::ClipByValue { min: -1.0, max: 1.0 }.clip(&mut g);
        assert_eq!(g.layers[0].weights, array![[1.0, 0.0]]);
        assert_eq!(g.layers[0].biases, array![1.0]);
    }

    #[test]
    fn test_none_leaves_gradients() {
        let mut g = grads();
        GradientClipper::None.clip(&mut g);
        assert_eq!(g, grads());
    }
}
