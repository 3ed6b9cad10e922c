//! notegen: next-note sequence models over MIDI genre corpora.
//!
//! Subcommands:
//! - `prepare`: extract and window genres into the dataset cache
//! - `train`: fit a model on a prepared genre and save the bundle
//! - `generate`: continue a seed window with a trained model and render it

use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notegen::cache::DatasetCache;
use notegen::cli::{Cli, Command};
use notegen::config::PipelineConfig;
use notegen::midi::MidiParser;
use notegen::pipeline::{generate, prepare_genres, train_on_genre};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    setup_tracing()?;
    let cli = Cli::parse_args();

    let mut config = PipelineConfig::from_env();
    cli.apply(&mut config);
    if let Some(reason) = config.validate() {
        bail!("invalid configuration: {}", reason);
    }

    let cache = DatasetCache::new(config.effective_cache_path());
    let parser = MidiParser::new();

    match &cli.command {
        Command::Prepare { .. } => run_prepare(&cli, &config, &parser, &cache),
        Command::Train { genre, .. } => run_train(&config, &cache, genre),
        Command::Generate { .. } => run_generate(&cli, &config, &parser, &cache),
    }
}

fn setup_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err: Box<dyn std::error::Error + Send + Sync>| {
            anyhow!("failed to initialise tracing: {err}")
        })?;
    Ok(())
}

/// Prepares every requested genre; fails if any genre failed.
fn run_prepare(
    cli: &Cli,
    config: &PipelineConfig,
    parser: &MidiParser,
    cache: &DatasetCache,
) -> Result<()> {
    let genres = cli.command.genres();
    if genres.is_empty() {
        bail!("no genres given (pass genre names or --all-genres)");
    }

    info!(
        "Preparing {} genre(s) from {} into {} with window length {}",
        genres.len(),
        config.effective_midi_path().display(),
        cache.root().display(),
        config.window_len
    );
    let outcomes = prepare_genres(config, parser, cache, &genres);

    let mut failed = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(prepared) => info!(
                "{}: {} events, {} distinct, {} windows (extraction {}, windowing {})",
                prepared.genre,
                prepared.stream_len,
                prepared.vocab_size,
                prepared.windows,
                if prepared.extraction_cached { "cached" } else { "computed" },
                if prepared.windowing_cached { "cached" } else { "computed" },
            ),
            Err(_) => failed.push(outcome.genre.as_str()),
        }
    }

    if !failed.is_empty() {
        bail!("{} genre(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

fn run_train(config: &PipelineConfig, cache: &DatasetCache, genre: &str) -> Result<()> {
    let start_time = Instant::now();
    let mut tracker = config.tracker(genre);

    let trained = train_on_genre(config, cache, &mut tracker, genre)
        .with_context(|| format!("training on genre '{}' failed", genre))?;

    if let Some(last) = trained.history.last() {
        info!(
            "Final loss {:.4}, accuracy {:.4} after {:.1}s",
            last.loss,
            last.accuracy,
            start_time.elapsed().as_secs_f32()
        );
    }
    println!("{}", trained.identifier);
    Ok(())
}

fn run_generate(
    cli: &Cli,
    config: &PipelineConfig,
    parser: &MidiParser,
    cache: &DatasetCache,
) -> Result<()> {
    let Command::Generate { model, horizon, .. } = &cli.command else {
        bail!("not a generate command");
    };
    let seed = cli
        .command
        .seed_source()
        .context("generate needs --genre or --seed-midi")?;
    let output = cli.command.output_path(config);

    if output.exists() {
        warn!("Overwriting {}", output.display());
    }

    let piece = generate(config, parser, cache, model, &seed, *horizon, &output)
        .with_context(|| format!("generation with model '{}' failed", model))?;

    println!("{}", piece.path.display());
    Ok(())
}
