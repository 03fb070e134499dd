//! # Q-Network
//!
//! A multi-layer perceptron mapping a batch of observations to one value
//! estimate per discrete action. The trainer holds two independently
//! initialized instances with identical architecture: the online network,
//! updated by gradient descent, and the target network, which only changes
//! through [`QNetwork::sync_from`].
//!
//! Evaluation has two modes:
//!
//! - [`QNetwork::forward`] is a pure function of the parameters and the input.
//!   It records nothing and therefore cannot be backpropagated; the target
//!   network is only ever evaluated this way.
//! - [`QNetwork::forward_train`] returns a [`ForwardPass`] holding the layer
//!   caches that [`QNetwork::backward`] consumes.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use bincode::{deserialize, serialize};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{RacerError, Result};
use crate::layers::{DenseLayer, LayerCache, LayerGradients, WeightInit};
use crate::optimizer::{GradientClipper, Optimizer};

/// A dense Q-network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QNetwork {
    layers: Vec<DenseLayer>,
}

/// Output of a training forward pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub output: Array2<f32>,
    caches: Vec<LayerCache>,
}

/// Parameter gradients for every layer, input layer first.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub layers: Vec<LayerGradients>,
}

impl Gradients {
    /// L2 norm over every parameter gradient.
    pub fn global_norm(&self) -> f32 {
        self.layers
            .iter()
            .map(|g| g.weights.iter().chain(g.biases.iter()).map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }
}

impl QNetwork {
    /// Build a network with `hidden_activation` on every hidden layer and a
    /// linear output layer.
    ///
    /// `layer_sizes` lists the observation dimension, the hidden widths and
    /// the number of actions, so it needs at least two non-zero entries.
    pub fn new<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        hidden_activation: Activation,
        init: Option<WeightInit>,
        rng: &mut R,
    ) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(RacerError::config("a network needs at least input and output sizes"));
        }
        if layer_sizes.iter().any(|&s| s == 0) {
            return Err(RacerError::config(format!("layer sizes must be positive, got {:?}", layer_sizes)));
        }
        if let Some(init) = &init {
            if !init.is_valid() {
                return Err(RacerError::config(format!("invalid weight initialization {:?}", init)));
            }
        }

        let last = layer_sizes.len() - 2;
        let layers = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, window)| {
                let activation = if i == last { Activation::Linear } else { hidden_activation };
                let init = init.unwrap_or_else(|| WeightInit::for_activation(&activation));
                DenseLayer::with_init(window[0], window[1], activation, &init, rng)
            })
            .collect();

        Ok(QNetwork { layers })
    }

    /// Assemble a network from existing layers, checking that consecutive
    /// layers fit together.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(RacerError::config("a network needs at least one layer"));
        }
        for (index, layer) in layers.iter().enumerate() {
            if layer.biases.len() != layer.output_size() {
                return Err(RacerError::invalid_shape(
                    format!("layer {} bias of length {}", index, layer.output_size()),
                    format!("{}", layer.biases.len()),
                ));
            }
        }
        for pair in layers.windows(2) {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(RacerError::invalid_shape(
                    format!("layer input of {}", pair[0].output_size()),
                    format!("{}", pair[1].input_size()),
                ));
            }
        }
        Ok(QNetwork { layers })
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    /// Number of actions, i.e. the width of the output layer.
    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    /// `(weights, biases)` views of every layer, input layer first.
    pub fn parameters(&self) -> Vec<(ArrayView2<'_, f32>, ArrayView1<'_, f32>)> {
        self.layers.iter().map(|l| (l.weights.view(), l.biases.view())).collect()
    }

    /// Pure evaluation of a batch of observations (one per row).
    pub fn forward(&self, states: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_input(states)?;
        let mut current = states.to_owned();
        for layer in &self.layers {
            current = layer.forward(current.view());
        }
        Ok(current)
    }

    /// Evaluate a single observation and return a `1 x num_actions` row.
    pub fn forward_one(&self, state: ArrayView1<f32>) -> Result<Array2<f32>> {
        self.forward(state.insert_axis(ndarray::Axis(0)))
    }

    /// Evaluation that keeps what [`backward`](Self::backward) needs.
    pub fn forward_train(&self, states: ArrayView2<f32>) -> Result<ForwardPass> {
        self.check_input(states)?;
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut current = states.to_owned();
        for layer in &self.layers {
            let (output, cache) = layer.forward_cached(current.view());
            caches.push(cache);
            current = output;
        }
        Ok(ForwardPass { output: current, caches })
    }

    /// Backpropagate dLoss/dOutput through the pass recorded by `forward_train`.
    pub fn backward(&self, pass: &ForwardPass, output_grad: ArrayView2<f32>) -> Result<Gradients> {
        if output_grad.dim() != pass.output.dim() {
            return Err(RacerError::invalid_shape(
                format!("{:?}", pass.output.shape()),
                format!("{:?}", output_grad.shape()),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut grad = output_grad.to_owned();
        for (layer, cache) in self.layers.iter().zip(&pass.caches).rev() {
            let (input_grad, layer_grads) = layer.backward(cache, grad.view());
            layers.push(layer_grads);
            grad = input_grad;
        }
        layers.reverse();
        Ok(Gradients { layers })
    }

    /// Apply one optimizer step, optionally clipping the gradients first.
    pub fn apply_gradients<O: Optimizer + ?Sized>(
        &mut self,
        optimizer: &mut O,
        mut gradients: Gradients,
        clipper: &GradientClipper,
        learning_rate: f32,
    ) {
        clipper.clip(&mut gradients);
        for (index, (layer, grads)) in self.layers.iter_mut().zip(&gradients.layers).enumerate() {
            optimizer.update_weights(index, &mut layer.weights, &grads.weights, learning_rate);
            optimizer.update_biases(index, &mut layer.biases, &grads.biases, learning_rate);
        }
        optimizer.finish_step();
    }

    /// Move this network's parameters towards `source`.
    ///
    /// `tau == 1` copies `source` exactly; `0 < tau < 1` performs the soft
    /// update `self = tau * source + (1 - tau) * self`.
    pub fn sync_from(&mut self, source: &QNetwork, tau: f32) -> Result<()> {
        if !(tau > 0.0 && tau <= 1.0) {
            return Err(RacerError::config(format!("sync tau must lie in (0, 1], got {}", tau)));
        }
        if !self.same_architecture(source) {
            return Err(RacerError::invalid_shape(
                format!("{:?}", self.layer_shapes()),
                format!("{:?}", source.layer_shapes()),
            ));
        }

        if tau == 1.0 {
            self.layers.clone_from(&source.layers);
            return Ok(());
        }

        for (target, online) in self.layers.iter_mut().zip(&source.layers) {
            Zip::from(&mut target.weights)
                .and(&online.weights)
                .for_each(|t, &o| *t = tau * o + (1.0 - tau) * *t);
            Zip::from(&mut target.biases)
                .and(&online.biases)
                .for_each(|t, &o| *t = tau * o + (1.0 - tau) * *t);
        }
        Ok(())
    }

    /// Serialize the network to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        Ok(())
    }

    /// Load a network previously written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        let network: QNetwork = deserialize(&buffer)?;
        Self::from_layers(network.layers)
    }

    fn check_input(&self, states: ArrayView2<f32>) -> Result<()> {
        if states.ncols() != self.input_size() {
            return Err(RacerError::invalid_shape(
                format!("[_, {}]", self.input_size()),
                format!("{:?}", states.shape()),
            ));
        }
        Ok(())
    }

    /// `(weights dim, bias length, activation)` per layer.
    pub(crate) fn layer_shapes(&self) -> Vec<((usize, usize), usize, Activation)> {
        self.layers
            .iter()
            .map(|l| (l.weights.dim(), l.biases.len(), l.activation))
            .collect()
    }

    pub(crate) fn same_architecture(&self, other: &QNetwork) -> bool {
        self.layer_shapes() == other.layer_shapes()
    }
}

/// Row-wise maximum, used for the bootstrapped `max_a Q(s', a)`.
pub fn max_per_row(values: ArrayView2<f32>) -> Array1<f32> {
    values.map_axis(ndarray::Axis(1), |row| row.fold(f32::NEG_INFINITY, |m, &v| m.max(v)))
}
