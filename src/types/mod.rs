//! Core types for notegen.
//!
//! This module re-exports all the core data types used throughout the pipeline:
//! - [`MusicalEvent`]: A note or simultaneous cluster token
//! - [`Vocabulary`] / [`TokenIndex`]: Distinct tokens and their dense indices
//! - [`WindowedDataset`]: Input windows paired with next-token targets
//! - [`ModelConfig`]: Hyperparameters of the sequence model

mod config;
mod dataset;
mod event;
mod vocabulary;

// Re-export all types at the module level
pub use config::{ModelConfig, DEFAULT_HIDDEN_UNITS, DEFAULT_LEARNING_RATE, DEFAULT_LSTM_LAYERS};
pub use dataset::WindowedDataset;
pub use event::{MusicalEvent, QuarterLength, MAX_VELOCITY, PITCH_SEPARATOR};
pub use vocabulary::{TokenIndex, Vocabulary};
