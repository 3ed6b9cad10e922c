//! Dataset preparation: extraction and windowing, both cache-checked.

use ndarray::Array1;
use tracing::{error, info};

use crate::cache::{extraction_keys, validate_corpus_name, windowing_keys, DatasetCache};
use crate::config::PipelineConfig;
use crate::corpus::extract_corpus;
use crate::error::Result;
use crate::midi::ScoreParser;
use crate::sequences::create_sequences;
use crate::types::{MusicalEvent, Vocabulary};

/// Genre directories of the reference corpus layout.
pub const ALL_GENRES: [&str; 18] = [
    "Ambient",
    "Country",
    "Latin",
    "Religious",
    "Unknown",
    "Blues",
    "Electronic",
    "Pop",
    "Rock",
    "World",
    "Children",
    "Folk",
    "Rap",
    "Soul",
    "Classical",
    "Jazz",
    "Reggae",
    "Soundtracks",
];

/// Summary of a prepared genre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDataset {
    pub genre: String,
    /// Events in the token stream.
    pub stream_len: usize,
    /// Distinct events.
    pub vocab_size: usize,
    /// Windows at the configured length.
    pub windows: usize,
    /// Extraction artifacts were loaded from the cache.
    pub extraction_cached: bool,
    /// Windowing artifacts were already cached.
    pub windowing_cached: bool,
}

/// Result of preparing one genre of a batch.
#[derive(Debug)]
pub struct GenreOutcome {
    pub genre: String,
    pub result: Result<PreparedDataset>,
}

/// Runs extraction and windowing for one genre.
///
/// Each stage is skipped when all of its artifacts are cached. The corpus
/// is read from `<midi_path>/<genre>/`.
pub fn prepare_genre(
    config: &PipelineConfig,
    parser: &dyn ScoreParser,
    cache: &DatasetCache,
    genre: &str,
) -> Result<PreparedDataset> {
    validate_corpus_name(genre)?;
    info!("Preparing genre '{}'...", genre);

    let extraction = extraction_keys(genre);
    let (stream, vocabulary, extraction_cached) = if cache.contains_all(&extraction) {
        let stream: Vec<MusicalEvent> = cache.load_required(&extraction[0])?;
        let vocabulary: Vocabulary = cache.load_required(&extraction[1])?;
        info!("Loaded processed MIDI files.");
        (stream, vocabulary, true)
    } else {
        info!("Processing MIDI files.");
        let corpus = extract_corpus(&config.genre_midi_path(genre), parser, config.instrument);
        cache.store(&extraction[0], &corpus.stream)?;
        cache.store(&extraction[1], &corpus.vocabulary)?;
        (corpus.stream, corpus.vocabulary, false)
    };

    let windowing = windowing_keys(genre, config.window_len);
    let (windows, windowing_cached) = if cache.contains_all(&windowing) {
        info!("Sequences are already saved.");
        let targets: Array1<u32> = cache.load_required(&windowing[1])?;
        (targets.len(), true)
    } else {
        info!("Creating new sequences.");
        let (dataset, index) =
            create_sequences(genre, &stream, &vocabulary, config.window_len)?;
        cache.store(&windowing[0], dataset.inputs())?;
        cache.store(&windowing[1], dataset.targets())?;
        cache.store(&windowing[2], &index)?;
        (dataset.len(), false)
    };

    Ok(PreparedDataset {
        genre: genre.to_string(),
        stream_len: stream.len(),
        vocab_size: vocabulary.len(),
        windows,
        extraction_cached,
        windowing_cached,
    })
}

/// Prepares several genres in order. A failing genre is logged and the
/// batch moves on.
pub fn prepare_genres<S: AsRef<str>>(
    config: &PipelineConfig,
    parser: &dyn ScoreParser,
    cache: &DatasetCache,
    genres: &[S],
) -> Vec<GenreOutcome> {
    genres
        .iter()
        .map(|genre| {
            let genre = genre.as_ref();
            let result = prepare_genre(config, parser, cache, genre);
            if let Err(e) = &result {
                error!("Failed to prepare genre '{}': {}", genre, e);
            }
            GenreOutcome {
                genre: genre.to_string(),
                result,
            }
        })
        .collect()
}
