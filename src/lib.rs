//! notegen: next-note sequence models trained on MIDI genre corpora.
//!
//! The pipeline turns a directory of MIDI files into a stream of musical
//! events, slices it into fixed-length windows, trains an LSTM to predict
//! the event that follows each window, and renders new pieces by greedy
//! continuation of a seed window.
//!
//! # Modules
//!
//! - [`types`]: Core data types (MusicalEvent, Vocabulary, TokenIndex, ModelConfig)
//! - [`midi`]: MIDI parsing into scores and rendering of event sequences
//! - [`corpus`]: Corpus extraction over a directory of MIDI files
//! - [`sequences`]: Sliding-window dataset construction
//! - [`cache`]: On-disk store for intermediate dataset artifacts
//! - [`models`]: LSTM sequence model, training, prediction and bundles
//! - [`tracking`]: Experiment run tracking (params and per-epoch metrics)
//! - [`pipeline`]: The prepare, train and generate stages
//! - [`config`]: Runtime configuration (PipelineConfig)
//! - [`error`]: Error types and codes (PipelineError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use notegen::{
//!     cache::DatasetCache,
//!     midi::MidiParser,
//!     pipeline::{prepare_genre, train_on_genre},
//!     PipelineConfig,
//! };
//!
//! let config = PipelineConfig::from_env();
//! let cache = DatasetCache::new(config.effective_cache_path());
//! prepare_genre(&config, &MidiParser::new(), &cache, "Jazz")?;
//!
//! let mut tracker = config.tracker("Jazz");
//! let trained = train_on_genre(&config, &cache, &mut tracker, "Jazz")?;
//! println!("saved model {}", trained.identifier);
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod midi;
pub mod models;
pub mod pipeline;
pub mod sequences;
pub mod tracking;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use config::PipelineConfig;
pub use error::{ErrorCode, PipelineError, Result};
pub use models::{ModelState, SequenceModel};
pub use types::{ModelConfig, MusicalEvent, QuarterLength, TokenIndex, Vocabulary, WindowedDataset};
