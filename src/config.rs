//! Pipeline configuration module.
//!
//! Contains the runtime configuration for notegen: where corpora, cached
//! datasets, models, rendered files and tracking records live, and the
//! hyperparameters used for windowing and training.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::midi::InstrumentTag;
use crate::tracking::{ExperimentTracker, FileSink};
use crate::types::ModelConfig;

/// Default window length (tokens of context per prediction).
pub const DEFAULT_WINDOW_LEN: usize = 100;

/// Default embedding width.
pub const DEFAULT_EMBED_DIMS: usize = 64;

/// Default mini-batch size.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Default number of training epochs.
pub const DEFAULT_EPOCHS: usize = 10;

/// Default number of tokens to generate.
pub const DEFAULT_HORIZON: usize = 100;

/// Runtime configuration for the pipeline.
///
/// Loaded from environment variables at startup; command-line flags
/// override individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the per-genre MIDI directories (`<midi_path>/<genre>/`).
    /// If None, uses the platform-specific default data location.
    pub midi_path: Option<PathBuf>,

    /// Root of the dataset cache.
    /// If None, uses the platform-specific default cache location.
    pub cache_path: Option<PathBuf>,

    /// Directory holding model bundles.
    pub models_path: Option<PathBuf>,

    /// Directory for rendered MIDI files.
    pub output_path: Option<PathBuf>,

    /// Root of the file tracking store.
    pub tracking_path: Option<PathBuf>,

    /// Window length L.
    pub window_len: usize,

    /// Embedding width E.
    pub embed_dims: usize,

    /// LSTM hidden units H.
    pub hidden_units: usize,

    /// Stacked LSTM layers.
    pub lstm_layers: usize,

    /// Mini-batch size.
    pub batch_size: usize,

    /// Training epochs.
    pub epochs: usize,

    /// Adam learning rate.
    pub learning_rate: f32,

    /// Restrict extraction to the first part of this instrument.
    /// If None, each file contributes its first part.
    pub instrument: Option<InstrumentTag>,

    /// Seed for weight initialisation and shuffling.
    pub seed: u64,

    /// Write tracking records. When false, run state is still enforced
    /// but nothing is recorded.
    pub tracking: bool,
}

impl PipelineConfig {
    /// Creates a PipelineConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a PipelineConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `NOTEGEN_MIDI_PATH` - Root of the per-genre MIDI directories
    /// - `NOTEGEN_CACHE_PATH` - Dataset cache directory
    /// - `NOTEGEN_MODELS_PATH` - Model bundle directory
    /// - `NOTEGEN_OUTPUT_PATH` - Rendered MIDI directory
    /// - `NOTEGEN_TRACKING_PATH` - Tracking store directory
    /// - `NOTEGEN_WINDOW_LEN`, `NOTEGEN_EMBED_DIMS`, `NOTEGEN_HIDDEN_UNITS`,
    ///   `NOTEGEN_LSTM_LAYERS`, `NOTEGEN_BATCH_SIZE`, `NOTEGEN_EPOCHS` -
    ///   Positive integers
    /// - `NOTEGEN_LEARNING_RATE` - Positive float
    /// - `NOTEGEN_INSTRUMENT` - Instrument tag (e.g. `piano`, `guitar`)
    /// - `NOTEGEN_SEED` - Model seed
    /// - `NOTEGEN_TRACKING` - `0`/`false`/`off` disables tracking
    ///
    /// Falls back to defaults for unset or unparsable variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let path = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        config.midi_path = path("NOTEGEN_MIDI_PATH");
        config.cache_path = path("NOTEGEN_CACHE_PATH");
        config.models_path = path("NOTEGEN_MODELS_PATH");
        config.output_path = path("NOTEGEN_OUTPUT_PATH");
        config.tracking_path = path("NOTEGEN_TRACKING_PATH");

        let positive = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|&n| n > 0)
        };
        if let Some(n) = positive("NOTEGEN_WINDOW_LEN") {
            config.window_len = n;
        }
        if let Some(n) = positive("NOTEGEN_EMBED_DIMS") {
            config.embed_dims = n;
        }
        if let Some(n) = positive("NOTEGEN_HIDDEN_UNITS") {
            config.hidden_units = n;
        }
        if let Some(n) = positive("NOTEGEN_LSTM_LAYERS") {
            config.lstm_layers = n;
        }
        if let Some(n) = positive("NOTEGEN_BATCH_SIZE") {
            config.batch_size = n;
        }
        if let Some(n) = positive("NOTEGEN_EPOCHS") {
            config.epochs = n;
        }

        if let Some(rate) = lookup("NOTEGEN_LEARNING_RATE")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|r| r.is_finite() && *r > 0.0)
        {
            config.learning_rate = rate;
        }

        if let Some(tag) = lookup("NOTEGEN_INSTRUMENT").and_then(|v| InstrumentTag::parse(&v)) {
            config.instrument = Some(tag);
        }

        if let Some(seed) = lookup("NOTEGEN_SEED").and_then(|v| v.trim().parse::<u64>().ok()) {
            config.seed = seed;
        }

        if let Some(flag) = lookup("NOTEGEN_TRACKING") {
            config.tracking = !matches!(
                flag.trim().to_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }

        config
    }

    /// Returns the effective MIDI root, using platform defaults if not specified.
    pub fn effective_midi_path(&self) -> PathBuf {
        self.midi_path
            .clone()
            .unwrap_or_else(|| default_data_path("midi_in"))
    }

    /// Returns the MIDI directory of one genre.
    pub fn genre_midi_path(&self, genre: &str) -> PathBuf {
        self.effective_midi_path().join(genre)
    }

    /// Returns the effective dataset cache path, using platform defaults if not specified.
    pub fn effective_cache_path(&self) -> PathBuf {
        if let Some(ref path) = self.cache_path {
            path.clone()
        } else {
            default_cache_path()
        }
    }

    /// Returns the effective model bundle path, using platform defaults if not specified.
    pub fn effective_models_path(&self) -> PathBuf {
        self.models_path
            .clone()
            .unwrap_or_else(|| default_data_path("models"))
    }

    /// Returns the effective output path, using platform defaults if not specified.
    pub fn effective_output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| default_data_path("midi_out"))
    }

    /// Returns the effective tracking store path, using platform defaults if not specified.
    pub fn effective_tracking_path(&self) -> PathBuf {
        self.tracking_path
            .clone()
            .unwrap_or_else(|| default_data_path("tracking"))
    }

    /// Builds the model configuration for a vocabulary of `vocab_size` tokens.
    pub fn model_config(&self, vocab_size: usize) -> ModelConfig {
        ModelConfig::new(vocab_size, self.embed_dims, self.window_len)
            .with_hidden_units(self.hidden_units)
            .with_lstm_layers(self.lstm_layers)
            .with_learning_rate(self.learning_rate)
            .with_seed(self.seed)
    }

    /// Creates the experiment tracker for `experiment`.
    pub fn tracker(&self, experiment: &str) -> ExperimentTracker {
        if self.tracking {
            ExperimentTracker::new(
                experiment,
                Box::new(FileSink::new(self.effective_tracking_path())),
            )
        } else {
            ExperimentTracker::disabled(experiment)
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        let counts = [
            ("window_len", self.window_len),
            ("embed_dims", self.embed_dims),
            ("hidden_units", self.hidden_units),
            ("lstm_layers", self.lstm_layers),
            ("batch_size", self.batch_size),
            ("epochs", self.epochs),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Some(format!("{} must be >= 1", name));
            }
        }

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Some(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }

        None
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            midi_path: None,
            cache_path: None,
            models_path: None,
            output_path: None,
            tracking_path: None,
            window_len: DEFAULT_WINDOW_LEN,
            embed_dims: DEFAULT_EMBED_DIMS,
            hidden_units: crate::types::DEFAULT_HIDDEN_UNITS,
            lstm_layers: crate::types::DEFAULT_LSTM_LAYERS,
            batch_size: DEFAULT_BATCH_SIZE,
            epochs: DEFAULT_EPOCHS,
            learning_rate: crate::types::DEFAULT_LEARNING_RATE,
            instrument: None,
            seed: 0,
            tracking: true,
        }
    }
}

/// Returns a platform-specific data path.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Application Support/notegen/<name>
/// - Linux: ~/.local/share/notegen/<name>
/// - Windows: C:\Users\<user>\AppData\Roaming\notegen\data\<name>
fn default_data_path(name: &str) -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "notegen") {
        proj_dirs.data_dir().join(name)
    } else {
        // Fallback to current directory
        PathBuf::from(".").join(name)
    }
}

/// Returns the platform-specific default dataset cache path.
///
/// - macOS: ~/Library/Caches/notegen/datasets
/// - Linux: ~/.cache/notegen/datasets
/// - Windows: C:\Users\<user>\AppData\Local\notegen\cache\datasets
fn default_cache_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "notegen") {
        proj_dirs.cache_dir().join("datasets")
    } else {
        PathBuf::from("./cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> PipelineConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = PipelineConfig::new();
        assert_eq!(config.window_len, 100);
        assert_eq!(config.embed_dims, 64);
        assert_eq!(config.hidden_units, 128);
        assert_eq!(config.lstm_layers, 2);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.epochs, 10);
        assert_eq!(config.learning_rate, 0.001);
        assert!(config.tracking);
        assert!(config.validate().is_none());
    }

    #[test]
    fn env_overrides() {
        let config = from_vars(&[
            ("NOTEGEN_MIDI_PATH", "/data/midi"),
            ("NOTEGEN_WINDOW_LEN", "32"),
            ("NOTEGEN_EPOCHS", "3"),
            ("NOTEGEN_LSTM_LAYERS", "3"),
            ("NOTEGEN_LEARNING_RATE", "0.01"),
            ("NOTEGEN_INSTRUMENT", "guitar"),
            ("NOTEGEN_SEED", "42"),
            ("NOTEGEN_TRACKING", "off"),
        ]);
        assert_eq!(config.genre_midi_path("Jazz"), PathBuf::from("/data/midi/Jazz"));
        assert_eq!(config.window_len, 32);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.lstm_layers, 3);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.instrument, Some(InstrumentTag::Guitar));
        assert_eq!(config.seed, 42);
        assert!(!config.tracking);
    }

    #[test]
    fn env_ignores_invalid_values() {
        let config = from_vars(&[
            ("NOTEGEN_WINDOW_LEN", "0"),
            ("NOTEGEN_BATCH_SIZE", "lots"),
            ("NOTEGEN_LEARNING_RATE", "-1"),
            ("NOTEGEN_INSTRUMENT", "kazoo"),
        ]);
        assert_eq!(config.window_len, DEFAULT_WINDOW_LEN);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.learning_rate, crate::types::DEFAULT_LEARNING_RATE);
        assert_eq!(config.instrument, None);
    }

    #[test]
    fn config_validation() {
        let mut config = PipelineConfig::new();
        config.batch_size = 0;
        assert!(config.validate().unwrap().contains("batch_size"));

        config.batch_size = 8;
        config.learning_rate = 0.0;
        assert!(config.validate().is_some());
    }

    #[test]
    fn effective_paths() {
        let config = PipelineConfig::new();
        assert!(!config.effective_midi_path().as_os_str().is_empty());
        assert!(!config.effective_cache_path().as_os_str().is_empty());
        assert!(!config.effective_models_path().as_os_str().is_empty());
        assert!(!config.effective_output_path().as_os_str().is_empty());
        assert!(!config.effective_tracking_path().as_os_str().is_empty());
    }

    #[test]
    fn model_config_carries_hyperparameters() {
        let mut config = PipelineConfig::new();
        config.hidden_units = 16;
        config.lstm_layers = 1;
        config.seed = 9;
        let model = config.model_config(12);
        assert_eq!(model.vocab_size, 12);
        assert_eq!(model.window_len, 100);
        assert_eq!(model.hidden_units, 16);
        assert_eq!(model.lstm_layers, 1);
        assert_eq!(model.seed, 9);
    }
}
