//! ModelConfig type for sequence model hyperparameters.
//!
//! A trained model is bound to exactly one configuration; it is stored in
//! the bundle manifest and checked against the weights on load.

use serde::{Deserialize, Serialize};

/// Hidden units of each LSTM layer when not configured.
pub const DEFAULT_HIDDEN_UNITS: usize = 128;

/// Stacked LSTM layers when not configured.
pub const DEFAULT_LSTM_LAYERS: usize = 2;

/// Adam step size when not configured.
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// Architecture and optimiser parameters of the sequence model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of distinct tokens (output classes).
    pub vocab_size: usize,

    /// Embedding width per token.
    pub embed_dims: usize,

    /// Length of the input window.
    pub window_len: usize,

    /// LSTM hidden state size, shared by every layer.
    pub hidden_units: usize,

    /// Number of stacked LSTM layers. Every layer but the last feeds its
    /// full output sequence to the next.
    pub lstm_layers: usize,

    /// Adam learning rate.
    pub learning_rate: f32,

    /// Seed for weight initialisation and batch shuffling.
    pub seed: u64,
}

impl ModelConfig {
    /// Creates a configuration with default layers, hidden units, learning
    /// rate and seed.
    pub fn new(vocab_size: usize, embed_dims: usize, window_len: usize) -> Self {
        Self {
            vocab_size,
            embed_dims,
            window_len,
            hidden_units: DEFAULT_HIDDEN_UNITS,
            lstm_layers: DEFAULT_LSTM_LAYERS,
            learning_rate: DEFAULT_LEARNING_RATE,
            seed: 0,
        }
    }

    /// Overrides the hidden units.
    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Overrides the number of LSTM layers.
    pub fn with_lstm_layers(mut self, lstm_layers: usize) -> Self {
        self.lstm_layers = lstm_layers;
        self
    }

    /// Overrides the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Overrides the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.vocab_size < 1 {
            return Some("vocab_size must be >= 1".to_string());
        }

        if self.embed_dims < 1 {
            return Some("embed_dims must be >= 1".to_string());
        }

        if self.window_len < 1 {
            return Some("window_len must be >= 1".to_string());
        }

        if self.hidden_units < 1 {
            return Some("hidden_units must be >= 1".to_string());
        }

        if self.lstm_layers < 1 {
            return Some("lstm_layers must be >= 1".to_string());
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Some(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }

        None
    }

    /// Number of trainable parameters.
    pub fn parameter_count(&self) -> usize {
        let gates = 4 * self.hidden_units;
        let recurrent = self.hidden_units * gates + gates;
        let first = self.embed_dims * gates + recurrent;
        let stacked = self.lstm_layers.saturating_sub(1) * (self.hidden_units * gates + recurrent);
        self.vocab_size * self.embed_dims
            + first
            + stacked
            + self.hidden_units * self.vocab_size
            + self.vocab_size
    }
}
