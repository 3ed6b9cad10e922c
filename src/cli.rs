//! CLI argument parser.
//!
//! Global options override the environment-derived [`PipelineConfig`];
//! each subcommand runs one pipeline stage.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{PipelineConfig, DEFAULT_HORIZON};
use crate::midi::InstrumentTag;
use crate::pipeline::{SeedSource, ALL_GENRES, LATEST_MODEL};

/// notegen: learn note sequences from MIDI corpora and generate new ones
#[derive(Parser, Debug)]
#[command(name = "notegen")]
#[command(about = "Train next-note models on MIDI genres and generate new pieces")]
#[command(version)]
pub struct Cli {
    /// Root of the per-genre MIDI directories
    #[arg(long, global = true)]
    pub midi_dir: Option<PathBuf>,

    /// Dataset cache directory
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Model bundle directory
    #[arg(long, global = true)]
    pub models_dir: Option<PathBuf>,

    /// Tracking store directory
    #[arg(long, global = true)]
    pub tracking_dir: Option<PathBuf>,

    /// Window length (tokens of context)
    #[arg(short = 'l', long, global = true)]
    pub window_len: Option<usize>,

    /// Only extract parts of this instrument (e.g. piano, guitar, strings)
    #[arg(long, global = true)]
    pub instrument: Option<InstrumentTag>,

    /// Do not write tracking records
    #[arg(long, global = true)]
    pub no_tracking: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline stages.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Extract and window one or more genres into the dataset cache
    Prepare {
        /// Genre directory names
        genres: Vec<String>,

        /// Prepare every genre of the reference layout
        #[arg(long, conflicts_with = "genres")]
        all_genres: bool,
    },

    /// Train a model on a prepared genre
    Train {
        /// Genre to train on
        genre: String,

        /// Embedding width
        #[arg(long)]
        embed_dims: Option<usize>,

        /// LSTM hidden units
        #[arg(long)]
        hidden_units: Option<usize>,

        /// Stacked LSTM layers
        #[arg(long)]
        lstm_layers: Option<usize>,

        /// Mini-batch size
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Adam learning rate
        #[arg(long)]
        learning_rate: Option<f32>,

        /// Seed for weight initialisation and shuffling
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Generate a piece from a trained model
    Generate {
        /// Model identifier, or "latest"
        #[arg(short, long, default_value = LATEST_MODEL)]
        model: String,

        /// Seed from a random window of this genre's cached dataset
        #[arg(short, long, required_unless_present = "seed_midi")]
        genre: Option<String>,

        /// Seed from the last window of this MIDI file
        #[arg(long, conflicts_with = "genre")]
        seed_midi: Option<PathBuf>,

        /// RNG seed for picking the dataset window
        #[arg(long)]
        rng_seed: Option<u64>,

        /// Number of tokens to generate
        #[arg(short = 'n', long, default_value_t = DEFAULT_HORIZON)]
        horizon: usize,

        /// Output MIDI file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Applies command-line overrides on top of `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(ref path) = self.midi_dir {
            config.midi_path = Some(path.clone());
        }
        if let Some(ref path) = self.cache_dir {
            config.cache_path = Some(path.clone());
        }
        if let Some(ref path) = self.models_dir {
            config.models_path = Some(path.clone());
        }
        if let Some(ref path) = self.tracking_dir {
            config.tracking_path = Some(path.clone());
        }
        if let Some(window_len) = self.window_len {
            config.window_len = window_len;
        }
        if self.instrument.is_some() {
            config.instrument = self.instrument;
        }
        if self.no_tracking {
            config.tracking = false;
        }

        if let Command::Train {
            embed_dims,
            hidden_units,
            lstm_layers,
            batch_size,
            epochs,
            learning_rate,
            seed,
            ..
        } = &self.command
        {
            if let Some(v) = embed_dims {
                config.embed_dims = *v;
            }
            if let Some(v) = hidden_units {
                config.hidden_units = *v;
            }
            if let Some(v) = lstm_layers {
                config.lstm_layers = *v;
            }
            if let Some(v) = batch_size {
                config.batch_size = *v;
            }
            if let Some(v) = epochs {
                config.epochs = *v;
            }
            if let Some(v) = learning_rate {
                config.learning_rate = *v;
            }
            if let Some(v) = seed {
                config.seed = *v;
            }
        }
    }
}

impl Command {
    /// Genres named by `prepare`, expanding `--all-genres`.
    pub fn genres(&self) -> Vec<String> {
        match self {
            Command::Prepare {
                all_genres: true, ..
            } => ALL_GENRES.iter().map(|g| g.to_string()).collect(),
            Command::Prepare { genres, .. } => genres.clone(),
            Command::Train { genre, .. } => vec![genre.clone()],
            Command::Generate { .. } => Vec::new(),
        }
    }

    /// Seed source of `generate`. A MIDI file takes precedence over a genre.
    pub fn seed_source(&self) -> Option<SeedSource> {
        match self {
            Command::Generate {
                seed_midi: Some(path),
                ..
            } => Some(SeedSource::Midi(path.clone())),
            Command::Generate {
                genre: Some(genre),
                rng_seed,
                ..
            } => Some(SeedSource::Dataset {
                genre: genre.clone(),
                rng_seed: *rng_seed,
            }),
            _ => None,
        }
    }

    /// Output file of `generate`.
    ///
    /// Defaults to "output.mid" in the configured output directory.
    pub fn output_path(&self, config: &PipelineConfig) -> PathBuf {
        match self {
            Command::Generate {
                output: Some(path),
                ..
            } => path.clone(),
            _ => config.effective_output_path().join("output.mid"),
        }
    }
}
