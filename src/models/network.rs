//! Embedding -> stacked LSTM -> dense network with backpropagation through
//! time.
//!
//! Every LSTM layer but the last passes its whole output sequence up; the
//! dense layer reads the last hidden state of the top layer. Gate layout of
//! the fused kernels is `[input, forget, cell, output]`, each
//! `hidden_units` wide.

use ndarray::{s, Array1, Array2, ArrayView2, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::types::ModelConfig;

/// Embedding initialisation range.
const EMBEDDING_INIT: f32 = 0.05;

/// Tensors of one LSTM layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmWeights {
    /// `(input, 4H)`, where input is E for the first layer and H above it.
    pub kernel: Array2<f32>,
    /// `(H, 4H)`
    pub recurrent: Array2<f32>,
    /// `(4H,)`
    pub bias: Array1<f32>,
}

/// Trainable tensors of the network. Also used for gradients and for the
/// optimiser moments, which share the same shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// `(V, E)`
    pub embedding: Array2<f32>,
    /// Bottom to top.
    pub layers: Vec<LstmWeights>,
    /// `(H, V)`
    pub dense: Array2<f32>,
    /// `(V,)`
    pub dense_bias: Array1<f32>,
}

/// Activations kept from the forward pass for the backward pass.
pub struct ForwardTrace {
    tokens: Vec<Vec<usize>>,
    layers: Vec<LayerTrace>,
}

struct LayerTrace {
    inputs: Vec<Array2<f32>>,
    hidden: Vec<Array2<f32>>,
    cells: Vec<Array2<f32>>,
    gates: Vec<Gates>,
}

impl LayerTrace {
    /// Hidden states of every step, i.e. the layer's output sequence.
    fn outputs(&self) -> Vec<Array2<f32>> {
        self.hidden[1..].to_vec()
    }
}

struct Gates {
    input: Array2<f32>,
    forget: Array2<f32>,
    cell: Array2<f32>,
    output: Array2<f32>,
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn glorot_uniform<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    let limit = (6.0 / (rows + cols) as f32).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array2::from_shape_fn((rows, cols), |_| dist.sample(rng))
}

impl LstmWeights {
    fn init<R: Rng + ?Sized>(input: usize, h: usize, rng: &mut R) -> Self {
        let kernel = glorot_uniform(input, 4 * h, rng);

        let std = 1.0 / (h as f32).sqrt();
        let recurrent = match Normal::new(0.0, std) {
            Ok(normal) => Array2::from_shape_fn((h, 4 * h), |_| normal.sample(rng)),
            Err(_) => Array2::zeros((h, 4 * h)),
        };

        let mut bias = Array1::<f32>::zeros(4 * h);
        bias.slice_mut(s![h..2 * h]).fill(1.0);

        Self {
            kernel,
            recurrent,
            bias,
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent: Array2::zeros(self.recurrent.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    fn hidden_units(&self) -> usize {
        self.recurrent.nrows()
    }

    /// Runs the layer over one input matrix per time step.
    fn forward(&self, inputs: Vec<Array2<f32>>) -> LayerTrace {
        let window = inputs.len();
        let rows = inputs.first().map_or(0, |x| x.nrows());
        let h = self.hidden_units();

        let mut trace = LayerTrace {
            inputs,
            hidden: Vec::with_capacity(window + 1),
            cells: Vec::with_capacity(window + 1),
            gates: Vec::with_capacity(window),
        };
        trace.hidden.push(Array2::zeros((rows, h)));
        trace.cells.push(Array2::zeros((rows, h)));

        for t in 0..window {
            let x = &trace.inputs[t];
            let h_prev = &trace.hidden[t];
            let c_prev = &trace.cells[t];

            let z = x.dot(&self.kernel) + h_prev.dot(&self.recurrent) + &self.bias;
            let gates = Gates {
                input: z.slice(s![.., 0..h]).mapv(sigmoid),
                forget: z.slice(s![.., h..2 * h]).mapv(sigmoid),
                cell: z.slice(s![.., 2 * h..3 * h]).mapv(f32::tanh),
                output: z.slice(s![.., 3 * h..4 * h]).mapv(sigmoid),
            };

            let c = &gates.forget * c_prev + &gates.input * &gates.cell;
            let h_next = &gates.output * &c.mapv(f32::tanh);

            trace.hidden.push(h_next);
            trace.cells.push(c);
            trace.gates.push(gates);
        }
        trace
    }

    /// Gradients of the layer and of its inputs, given the gradient flowing
    /// into each output step from above.
    fn backward(&self, trace: &LayerTrace, d_outputs: &[Array2<f32>]) -> (Self, Vec<Array2<f32>>) {
        let window = trace.gates.len();
        let h = self.hidden_units();
        let rows = trace.hidden[0].nrows();

        let mut grads = self.zeros_like();
        let mut d_inputs = vec![Array2::<f32>::zeros((rows, self.kernel.nrows())); window];
        let mut dh_next = Array2::<f32>::zeros((rows, h));
        let mut dc = Array2::<f32>::zeros((rows, h));

        for t in (0..window).rev() {
            let g = &trace.gates[t];
            let c = &trace.cells[t + 1];
            let c_prev = &trace.cells[t];
            let h_prev = &trace.hidden[t];
            let dh = &d_outputs[t] + &dh_next;

            let tanh_c = c.mapv(f32::tanh);
            let d_output = &dh * &tanh_c;
            dc = dc + &dh * &g.output * &tanh_c.mapv(|v| 1.0 - v * v);

            let d_input = &dc * &g.cell;
            let d_cell = &dc * &g.input;
            let d_forget = &dc * c_prev;
            let dc_prev = &dc * &g.forget;

            let dz_input = d_input * &g.input.mapv(|v| v * (1.0 - v));
            let dz_forget = d_forget * &g.forget.mapv(|v| v * (1.0 - v));
            let dz_cell = d_cell * &g.cell.mapv(|v| 1.0 - v * v);
            let dz_output = d_output * &g.output.mapv(|v| v * (1.0 - v));

            let mut dz = Array2::<f32>::zeros((rows, 4 * h));
            dz.slice_mut(s![.., 0..h]).assign(&dz_input);
            dz.slice_mut(s![.., h..2 * h]).assign(&dz_forget);
            dz.slice_mut(s![.., 2 * h..3 * h]).assign(&dz_cell);
            dz.slice_mut(s![.., 3 * h..4 * h]).assign(&dz_output);

            grads.kernel += &trace.inputs[t].t().dot(&dz);
            grads.recurrent += &h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));

            d_inputs[t] = dz.dot(&self.kernel.t());
            dh_next = dz.dot(&self.recurrent.t());
            dc = dc_prev;
        }

        (grads, d_inputs)
    }
}

impl Weights {
    /// Initialises weights for `config` from `rng`.
    pub fn init<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Self {
        let (v, e, h) = (config.vocab_size, config.embed_dims, config.hidden_units);

        let uniform = Uniform::new_inclusive(-EMBEDDING_INIT, EMBEDDING_INIT);
        let embedding = Array2::from_shape_fn((v, e), |_| uniform.sample(rng));

        let layers = (0..config.lstm_layers)
            .map(|i| LstmWeights::init(if i == 0 { e } else { h }, h, rng))
            .collect();

        let dense = glorot_uniform(h, v, rng);
        let dense_bias = Array1::zeros(v);

        Self {
            embedding,
            layers,
            dense,
            dense_bias,
        }
    }

    /// All-zero tensors with the same shapes.
    pub fn zeros_like(&self) -> Self {
        Self {
            embedding: Array2::zeros(self.embedding.raw_dim()),
            layers: self.layers.iter().map(LstmWeights::zeros_like).collect(),
            dense: Array2::zeros(self.dense.raw_dim()),
            dense_bias: Array1::zeros(self.dense_bias.raw_dim()),
        }
    }

    /// Checks the layer count and every tensor shape against `config`.
    pub fn check_shapes(&self, config: &ModelConfig) -> Result<(), String> {
        let (v, e, h) = (config.vocab_size, config.embed_dims, config.hidden_units);
        if self.layers.len() != config.lstm_layers {
            return Err(format!(
                "weights have {} LSTM layers, expected {}",
                self.layers.len(),
                config.lstm_layers
            ));
        }

        let mut expected: Vec<(String, &[usize], Vec<usize>)> =
            vec![("embedding".to_string(), self.embedding.shape(), vec![v, e])];
        for (i, layer) in self.layers.iter().enumerate() {
            let input = if i == 0 { e } else { h };
            expected.push((format!("layers[{}].kernel", i), layer.kernel.shape(), vec![input, 4 * h]));
            expected.push((format!("layers[{}].recurrent", i), layer.recurrent.shape(), vec![h, 4 * h]));
            expected.push((format!("layers[{}].bias", i), layer.bias.shape(), vec![4 * h]));
        }
        expected.push(("dense".to_string(), self.dense.shape(), vec![h, v]));
        expected.push(("dense_bias".to_string(), self.dense_bias.shape(), vec![v]));

        for (name, actual, want) in expected {
            if actual != want.as_slice() {
                return Err(format!("{} has shape {:?}, expected {:?}", name, actual, want));
            }
        }
        Ok(())
    }

    /// Runs the network over a `(batch, window)` block of token indices and
    /// returns the logits of the next token, plus the trace for
    /// [`Weights::backward`].
    pub fn forward(&self, batch: ArrayView2<'_, u32>) -> (Array2<f32>, ForwardTrace) {
        let window = batch.ncols();

        let tokens: Vec<Vec<usize>> = (0..window)
            .map(|t| batch.column(t).iter().map(|&i| i as usize).collect())
            .collect();
        let mut sequence: Vec<Array2<f32>> = tokens
            .iter()
            .map(|step| self.embedding.select(Axis(0), step))
            .collect();

        let mut layers = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let trace = layer.forward(sequence);
            sequence = trace.outputs();
            layers.push(trace);
        }

        let logits = sequence[window - 1].dot(&self.dense) + &self.dense_bias;
        (logits, ForwardTrace { tokens, layers })
    }

    /// Gradients of all weights given the gradient of the loss with respect
    /// to the logits returned by [`Weights::forward`].
    pub fn backward(&self, trace: &ForwardTrace, d_logits: &Array2<f32>) -> Weights {
        let mut grads = self.zeros_like();
        let window = trace.tokens.len();
        let rows = d_logits.nrows();

        if let Some(top) = trace.layers.last() {
            grads.dense = top.hidden[window].t().dot(d_logits);
        }
        grads.dense_bias = d_logits.sum_axis(Axis(0));

        // Only the last step of the top layer feeds the dense layer.
        let top_width = self.dense.nrows();
        let mut d_sequence: Vec<Array2<f32>> = (0..window)
            .map(|_| Array2::zeros((rows, top_width)))
            .collect();
        d_sequence[window - 1] = d_logits.dot(&self.dense.t());

        let mut layer_grads = Vec::with_capacity(self.layers.len());
        for (layer, layer_trace) in self.layers.iter().zip(&trace.layers).rev() {
            let (layer_grad, d_inputs) = layer.backward(layer_trace, &d_sequence);
            layer_grads.push(layer_grad);
            d_sequence = d_inputs;
        }
        layer_grads.reverse();
        grads.layers = layer_grads;

        for (step, d_x) in trace.tokens.iter().zip(&d_sequence) {
            for (row, &token) in step.iter().enumerate() {
                let mut target = grads.embedding.row_mut(token);
                Zip::from(&mut target)
                    .and(d_x.row(row))
                    .for_each(|g, &d| *g += d);
            }
        }

        grads
    }
}
