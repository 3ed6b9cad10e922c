//! Generating a new piece from a trained model.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::cache::{validate_corpus_name, ArtifactKind, CacheKey, DatasetCache};
use crate::config::PipelineConfig;
use crate::corpus::part_to_events;
use crate::error::{ErrorCode, PipelineError, Result};
use crate::midi::{render_events, ScoreParser};
use crate::models::{list_bundles, load_bundle};
use crate::types::{MusicalEvent, TokenIndex};

/// Model identifier that resolves to the most recent bundle.
pub const LATEST_MODEL: &str = "latest";

/// Where the seed window comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// A random window of the cached dataset of `genre`. Without an
    /// `rng_seed` the row is drawn from OS entropy.
    Dataset { genre: String, rng_seed: Option<u64> },
    /// The last window of a MIDI file.
    Midi(PathBuf),
}

/// Result of a generation run.
#[derive(Debug, Clone)]
pub struct GeneratedPiece {
    /// Rendered file.
    pub path: PathBuf,
    /// Events of the seed window.
    pub seed: Vec<MusicalEvent>,
    /// Events produced by the model.
    pub generated: Vec<MusicalEvent>,
}

/// Resolves a model identifier (or [`LATEST_MODEL`]) to a bundle directory.
///
/// An identifier must name a directory directly under the models directory.
pub fn resolve_model_path(config: &PipelineConfig, model_id: &str) -> Result<PathBuf> {
    let models_dir = config.effective_models_path();
    if model_id == LATEST_MODEL {
        let latest = list_bundles(&models_dir)?.pop().ok_or_else(|| {
            PipelineError::model_not_found(format!("{} (no bundles)", models_dir.display()))
        })?;
        return Ok(models_dir.join(latest));
    }
    validate_corpus_name(model_id).map_err(|_| {
        PipelineError::model_not_found(format!("invalid model identifier '{}'", model_id))
    })?;
    Ok(models_dir.join(model_id))
}

fn encode_seed(index: &TokenIndex, events: &[MusicalEvent]) -> Result<Vec<u32>> {
    index.encode(events).map_err(|e| match e.code {
        ErrorCode::ShapeMismatch => {
            PipelineError::invalid_seed(format!("not in the model vocabulary: {}", e.message))
        }
        _ => e,
    })
}

fn seed_from_dataset(
    cache: &DatasetCache,
    index: &TokenIndex,
    genre: &str,
    rng_seed: Option<u64>,
    window_len: usize,
) -> Result<Vec<MusicalEvent>> {
    let inputs_key = CacheKey::windowed(genre, ArtifactKind::InputTensor, window_len);
    let index_key = CacheKey::windowed(genre, ArtifactKind::IndexMap, window_len);
    let missing = cache.missing(&[inputs_key.clone(), index_key.clone()]);
    if !missing.is_empty() {
        return Err(PipelineError::cache_miss(genre, &missing));
    }

    let inputs: Array2<u32> = cache.load_required(&inputs_key)?;
    let dataset_index: TokenIndex = cache.load_required(&index_key)?;
    if inputs.nrows() == 0 {
        return Err(PipelineError::invalid_seed(format!(
            "dataset of '{}' has no windows of length {}",
            genre, window_len
        )));
    }
    if let Some(bad) = inputs.iter().find(|&&i| i as usize >= dataset_index.len()) {
        return Err(PipelineError::shape_mismatch(format!(
            "cached window holds index {} outside the dataset index map",
            bad
        )));
    }

    let mut rng = match rng_seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let row = rng.gen_range(0..inputs.nrows());
    debug!("Using window {} of '{}' as seed", row, genre);

    let events = dataset_index.decode(&inputs.row(row).to_vec());
    // Re-encode against the model's own index to reject drifted datasets.
    encode_seed(index, &events)?;
    Ok(events)
}

fn seed_from_midi(
    config: &PipelineConfig,
    parser: &dyn ScoreParser,
    index: &TokenIndex,
    path: &Path,
    window_len: usize,
) -> Result<Vec<MusicalEvent>> {
    let score = parser.parse(path)?;
    let part = score.select_part(config.instrument).ok_or_else(|| {
        PipelineError::invalid_seed(format!("{} has no usable part", path.display()))
    })?;

    let events = part_to_events(part);
    if events.len() < window_len {
        return Err(PipelineError::invalid_seed(format!(
            "{} has {} tokens, need at least {}",
            path.display(),
            events.len(),
            window_len
        )));
    }

    let tail = events[events.len() - window_len..].to_vec();
    encode_seed(index, &tail)?;
    Ok(tail)
}

/// Generates `horizon` events from the model `model_id`, seeded from
/// `seed`, and renders `seed ++ generated` to `output`.
pub fn generate(
    config: &PipelineConfig,
    parser: &dyn ScoreParser,
    cache: &DatasetCache,
    model_id: &str,
    seed: &SeedSource,
    horizon: usize,
    output: &Path,
) -> Result<GeneratedPiece> {
    let model_path = resolve_model_path(config, model_id)?;
    info!("Loading model '{}'...", model_path.display());
    let (model, index) = load_bundle(&model_path)?;
    let window_len = model.config().window_len;

    let seed_events = match seed {
        SeedSource::Dataset { genre, rng_seed } => {
            seed_from_dataset(cache, &index, genre, *rng_seed, window_len)?
        }
        SeedSource::Midi(path) => seed_from_midi(config, parser, &index, path, window_len)?,
    };

    let seed_indices = encode_seed(&index, &seed_events)?;
    let predicted = model.predict(&seed_indices, horizon)?;
    let generated = index.decode(&predicted);
    info!("Finished predicting {} notes.", generated.len());

    let mut piece = seed_events.clone();
    piece.extend(generated.iter().cloned());
    render_events(&piece, output)?;
    info!("Saved {} events to {}", piece.len(), output.display());

    Ok(GeneratedPiece {
        path: output.to_path_buf(),
        seed: seed_events,
        generated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiParser;
    use crate::models::{save_bundle, SequenceModel};
    use crate::pipeline::train::train_on_genre;
    use crate::sequences::create_sequences;
    use crate::tracking::ExperimentTracker;
    use crate::types::{QuarterLength, Vocabulary};

    fn events(pitches: &[&str]) -> Vec<MusicalEvent> {
        pitches
            .iter()
            .map(|p| MusicalEvent::new(*p, 80, QuarterLength::quarters(1)))
            .collect()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: PipelineConfig,
        cache: DatasetCache,
        model_id: String,
        output: PathBuf,
    }

    fn trained_fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new();
        config.models_path = Some(dir.path().join("models"));
        config.window_len = 3;
        config.embed_dims = 4;
        config.hidden_units = 6;
        config.batch_size = 4;
        config.epochs = 1;
        let cache = DatasetCache::new(dir.path().join("cache"));

        let stream = events(&["C4", "E4", "G4", "C5", "G4", "E4", "C4", "D4", "E4"]);
        let vocab = Vocabulary::from_stream(&stream);
        let (dataset, index) = create_sequences("Pop", &stream, &vocab, 3).unwrap();
        cache
            .store(&CacheKey::windowed("Pop", ArtifactKind::InputTensor, 3), dataset.inputs())
            .unwrap();
        cache
            .store(&CacheKey::windowed("Pop", ArtifactKind::TargetTensor, 3), dataset.targets())
            .unwrap();
        cache
            .store(&CacheKey::windowed("Pop", ArtifactKind::IndexMap, 3), &index)
            .unwrap();

        let mut tracker = ExperimentTracker::disabled("Pop");
        let trained = train_on_genre(&config, &cache, &mut tracker, "Pop").unwrap();
        let output = dir.path().join("out").join("output.mid");
        Fixture {
            _dir: dir,
            config,
            cache,
            model_id: trained.identifier,
            output,
        }
    }

    #[test]
    fn dataset_seed_is_reproducible() {
        let f = trained_fixture();
        let seed = SeedSource::Dataset {
            genre: "Pop".to_string(),
            rng_seed: Some(5),
        };
        let parser = MidiParser::new();

        let a = generate(&f.config, &parser, &f.cache, &f.model_id, &seed, 7, &f.output).unwrap();
        let b = generate(&f.config, &parser, &f.cache, &f.model_id, &seed, 7, &f.output).unwrap();
        assert_eq!(a.seed.len(), 3);
        assert_eq!(a.generated.len(), 7);
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.generated, b.generated);

        let score = parser.parse(&f.output).unwrap();
        assert_eq!(part_to_events(&score.parts[0]).len(), 10);
    }

    #[test]
    fn latest_resolves_to_newest_bundle() {
        let f = trained_fixture();
        let path = resolve_model_path(&f.config, LATEST_MODEL).unwrap();
        assert!(path.ends_with(&f.model_id));
    }

    #[test]
    fn model_identifier_cannot_leave_models_dir() {
        let f = trained_fixture();
        for bad in ["../x", "..", "a/b", "", "a\\b"] {
            let err = resolve_model_path(&f.config, bad).unwrap_err();
            assert_eq!(err.code, ErrorCode::ModelNotFound, "identifier {:?}", bad);
        }

        let seed = SeedSource::Dataset {
            genre: "Pop".to_string(),
            rng_seed: Some(1),
        };
        let err = generate(
            &f.config,
            &MidiParser::new(),
            &f.cache,
            "../x",
            &seed,
            5,
            &f.output,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelNotFound);
        assert!(!f.output.exists());
    }

    #[test]
    fn unknown_model_is_not_found() {
        let f = trained_fixture();
        let seed = SeedSource::Dataset {
            genre: "Pop".to_string(),
            rng_seed: Some(1),
        };
        let err = generate(
            &f.config,
            &MidiParser::new(),
            &f.cache,
            "1999-01-01_00-00-00",
            &seed,
            5,
            &f.output,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ModelNotFound);
    }

    #[test]
    fn midi_seed_uses_last_window() {
        let f = trained_fixture();
        let seed_file = f.output.with_file_name("seed.mid");
        render_events(&events(&["D4", "C5", "G4", "E4"]), &seed_file).unwrap();

        let piece = generate(
            &f.config,
            &MidiParser::new(),
            &f.cache,
            &f.model_id,
            &SeedSource::Midi(seed_file),
            4,
            &f.output,
        )
        .unwrap();
        assert_eq!(piece.seed, events(&["C5", "G4", "E4"]));
        assert_eq!(piece.generated.len(), 4);
    }

    #[test]
    fn midi_seed_rejects_short_or_foreign_files() {
        let f = trained_fixture();
        let parser = MidiParser::new();

        let short = f.output.with_file_name("short.mid");
        render_events(&events(&["C4", "E4"]), &short).unwrap();
        let err = generate(&f.config, &parser, &f.cache, &f.model_id, &SeedSource::Midi(short), 4, &f.output)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSeed);

        let foreign = f.output.with_file_name("foreign.mid");
        render_events(&events(&["C4", "E4", "A0"]), &foreign).unwrap();
        let err = generate(&f.config, &parser, &f.cache, &f.model_id, &SeedSource::Midi(foreign), 4, &f.output)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSeed);
    }

    #[test]
    fn dataset_seed_needs_cached_windows() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new();
        config.models_path = Some(dir.path().join("models"));
        let stream = events(&["C4", "E4"]);
        let index = TokenIndex::from_vocabulary(&Vocabulary::from_stream(&stream));
        let model = SequenceModel::create(config.model_config(index.len())).unwrap();
        let id = save_bundle(&model, &index, &config.effective_models_path()).unwrap();

        let seed = SeedSource::Dataset {
            genre: "Pop".to_string(),
            rng_seed: None,
        };
        let err = generate(
            &config,
            &MidiParser::new(),
            &DatasetCache::new(dir.path().join("cache")),
            &id,
            &seed,
            5,
            &dir.path().join("out.mid"),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CacheMiss);
    }
}
