//! Adam optimiser over [`Weights`].

use ndarray::{Array, Dimension, Zip};

use super::network::Weights;

const BETA_1: f32 = 0.9;
const BETA_2: f32 = 0.999;
const EPSILON: f32 = 1e-7;

/// Adam state: step count and first/second moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    step: i32,
    first: Weights,
    second: Weights,
}

impl Adam {
    /// Creates an optimiser with zeroed moments shaped like `weights`.
    pub fn new(learning_rate: f32, weights: &Weights) -> Self {
        Self {
            learning_rate,
            step: 0,
            first: weights.zeros_like(),
            second: weights.zeros_like(),
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.step
    }

    /// Applies one update of `grads` to `weights`.
    pub fn step(&mut self, weights: &mut Weights, grads: &Weights) {
        self.step = self.step.saturating_add(1);
        let correction = (1.0 - BETA_2.powi(self.step)).sqrt() / (1.0 - BETA_1.powi(self.step));
        let lr = self.learning_rate * correction;

        update(&mut weights.embedding, &grads.embedding, &mut self.first.embedding, &mut self.second.embedding, lr);
        let layers = weights
            .layers
            .iter_mut()
            .zip(&grads.layers)
            .zip(self.first.layers.iter_mut().zip(self.second.layers.iter_mut()));
        for ((layer, grad), (first, second)) in layers {
            update(&mut layer.kernel, &grad.kernel, &mut first.kernel, &mut second.kernel, lr);
            update(&mut layer.recurrent, &grad.recurrent, &mut first.recurrent, &mut second.recurrent, lr);
            update(&mut layer.bias, &grad.bias, &mut first.bias, &mut second.bias, lr);
        }
        update(&mut weights.dense, &grads.dense, &mut self.first.dense, &mut self.second.dense, lr);
        update(&mut weights.dense_bias, &grads.dense_bias, &mut self.first.dense_bias, &mut self.second.dense_bias, lr);
    }
}

fn update<D: Dimension>(
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    first: &mut Array<f32, D>,
    second: &mut Array<f32, D>,
    lr: f32,
) {
    Zip::from(param)
        .and(grad)
        .and(first)
        .and(second)
        .for_each(|p, &g, m, v| {
            *m = BETA_1 * *m + (1.0 - BETA_1) * g;
            *v = BETA_2 * *v + (1.0 - BETA_2) * g * g;
            *p -= lr * *m / (v.sqrt() + EPSILON);
        });
}
