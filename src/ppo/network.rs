//! Actor and critic networks using Burn framework

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Chain of linear layers `input → widths… → output`
fn build_layers<B: Backend>(
    device: &B::Device,
    input: usize,
    widths: &[usize],
    output: usize,
) -> Vec<Linear<B>> {
    let mut sizes = Vec::with_capacity(widths.len() + 2);
    sizes.push(input);
    sizes.extend_from_slice(widths);
    sizes.push(output);

    sizes
        .windows(2)
        .map(|pair| LinearConfig::new(pair[0], pair[1]).init(device))
        .collect()
}

/// Actor network - maps a state to action probabilities
#[derive(Module, Debug)]
pub struct Actor<B: Backend> {
    /// Linear layers, the last one produces logits
    layers: Vec<Linear<B>>,
    /// Activation between layers
    activation: Relu,
}

impl<B: Backend> Actor<B> {
    pub fn new(device: &B::Device, num_state: usize, num_action: usize, widths: &[usize]) -> Self {
        Self {
            layers: build_layers(device, num_state, widths, num_action),
            activation: Relu::new(),
        }
    }

    /// Forward pass returning action probabilities [batch_size, num_action]
    pub fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut x = state;

        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.activation.forward(x);
            }
        }

        softmax(x, 1)
    }

    /// Probability assigned to each taken action
    /// actions: [batch_size] action indices
    pub fn action_probs(&self, state: Tensor<B, 2>, actions: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [batch_size] = actions.dims();
        self.forward(state)
            .gather(1, actions.reshape([batch_size, 1]))
            .squeeze(1)
    }
}

/// Critic network - maps a state to a scalar value estimate
#[derive(Module, Debug)]
pub struct Critic<B: Backend> {
    layers: Vec<Linear<B>>,
    activation: Relu,
}

impl<B: Backend> Critic<B> {
    pub fn new(device: &B::Device, num_state: usize, widths: &[usize]) -> Self {
        Self {
            layers: build_layers(device, num_state, widths, 1),
            activation: Relu::new(),
        }
    }

    /// Forward pass returning state values [batch_size]
    pub fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 1> {
        let last = self.layers.len() - 1;
        let mut x = state;

        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = self.activation.forward(x);
            }
        }

        x.squeeze(1)
    }
}
