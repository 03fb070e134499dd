use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::initialization::WeightInit;
use crate::activations::Activation;

/// A fully connected (dense) layer: `activation(inputs . weights + biases)`.
///
/// The layer itself holds no per-call state. Evaluation through [`forward`]
/// is pure; [`forward_cached`] additionally hands back the [`LayerCache`]
/// that [`backward`] needs, so only callers that intend to train ever keep
/// the intermediate values around.
///
/// [`forward`]: DenseLayer::forward
/// [`forward_cached`]: DenseLayer::forward_cached
/// [`backward`]: DenseLayer::backward
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
}

/// Values recorded during a training forward pass.
#[derive(Clone, Debug)]
pub struct LayerCache {
    inputs: Array2<f32>,
    pre_activation: Array2<f32>,
}

/// Gradients of a loss with respect to one layer's parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
}

impl DenseLayer {
    /// Create a layer initialized with the strategy recommended for `activation`.
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, activation: Activation, rng: &mut R) -> Self {
        Self::with_init(input_size, output_size, activation, &WeightInit::for_activation(&activation), rng)
    }

    pub fn with_init<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: &WeightInit,
        rng: &mut R,
    ) -> Self {
        DenseLayer {
            weights: init.initialize_weights((input_size, output_size), rng),
            biases: init.initialize_biases(output_size),
            activation,
        }
    }

    /// Forward pass for a batch of row vectors.
    pub fn forward(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut outputs = self.affine(inputs);
        self.activation.apply(&mut outputs);
        outputs
    }

    /// Forward pass that also returns what backpropagation needs.
    pub fn forward_cached(&self, inputs: ArrayView2<f32>) -> (Array2<f32>, LayerCache) {
        let pre_activation = self.affine(inputs);
        let mut outputs = pre_activation.clone();
        self.activation.apply(&mut outputs);
        let cache = LayerCache {
            inputs: inputs.to_owned(),
            pre_activation,
        };
        (outputs, cache)
    }

    /// Backpropagate `output_grad` (dLoss/dOutput, one row per sample).
    ///
    /// Returns the gradient with respect to the layer inputs together with the
    /// parameter gradients.
    pub fn backward(&self, cache: &LayerCache, output_grad: ArrayView2<f32>) -> (Array2<f32>, LayerGradients) {
        let delta = &output_grad * &self.activation.derivative(cache.pre_activation.view());
        let weights = cache.inputs.t().dot(&delta);
        let biases = delta.sum_axis(Axis(0));
        let input_grad = delta.dot(&self.weights.t());
        (input_grad, LayerGradients { weights, biases })
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    fn affine(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_layer(activation: Activation) -> DenseLayer {
        DenseLayer {
            weights: array![[1.0, -1.0], [2.0, 0.5]],
            biases: array![0.5, -0.5],
            activation,
        }
    }

    #[test]
    fn test_forward_values() {
        let layer = fixed_layer(Activation::Relu);
        let out = layer.forward(array![[1.0, 1.0]].view());
        // [1 + 2 + 0.5, -1 + 0.5 - 0.5] -> relu
        assert_eq!(out, array![[3.5, 0.0]]);
    }

    #[test]
    fn test_forward_cached_matches_forward() {
        let layer = DenseLayer::new(3, 2, Activation::Tanh, &mut StdRng::seed_from_u64(3));
        let x = array![[0.1, -0.2, 0.3], [1.0, 0.0, -1.0]];
        let (cached, _) = layer.forward_cached(x.view());
        assert_eq!(cached, layer.forward(x.view()));
    }

    #[test]
    fn test_backward_linear() {
        let layer = fixed_layer(Activation::Linear);
        let x = array![[1.0, 2.0]];
        let (_, cache) = layer.forward_cached(x.view());
        let (input_grad, grads) = layer.backward(&cache, array![[1.0, 0.0]].view());
        assert_eq!(grads.weights, array![[1.0, 0.0], [2.0, 0.0]]);
        assert_eq!(grads.biases, array![1.0, 0.0]);
        assert_eq!(input_grad, array![[1.0, 2.0]]);
    }

    #[test]
    fn test_sizes() {
        let layer = DenseLayer::new(5, 7, Activation::Relu, &mut StdRng::seed_from_u64(0));
        assert_eq!(layer.input_size(), 5);
        assert_eq!(layer.output_size(), 7);
        assert_eq!(layer.biases.len(), 7);
    }
}
