//! Pipeline orchestrators.
//!
//! - [`prepare`]: MIDI corpus -> cached token stream and windowed dataset
//! - [`train`]: cached dataset -> trained model bundle
//! - [`generate`](mod@generate): model bundle + seed window -> rendered MIDI file

pub mod generate;
pub mod prepare;
pub mod train;

// Re-export commonly used items
pub use generate::{generate, resolve_model_path, GeneratedPiece, SeedSource, LATEST_MODEL};
pub use prepare::{prepare_genre, prepare_genres, GenreOutcome, PreparedDataset, ALL_GENRES};
pub use train::{load_training_data, train_on_genre, TrainedModel};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DatasetCache;
    use crate::config::PipelineConfig;
    use crate::corpus::part_to_events;
    use crate::midi::{render_events, MidiParser, ScoreParser};
    use crate::types::{MusicalEvent, QuarterLength};
    use std::fs;

    fn melody(pitches: &[&str]) -> Vec<MusicalEvent> {
        pitches
            .iter()
            .map(|p| MusicalEvent::new(*p, 90, QuarterLength::quarters(1)))
            .collect()
    }

    #[test]
    fn prepare_train_generate_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let genre_dir = dir.path().join("midi").join("Jazz");
        render_events(&melody(&["C4", "E4", "G4", "C5", "G4", "E4"]), &genre_dir.join("a.mid")).unwrap();
        render_events(&melody(&["C4", "D4", "E4"]), &genre_dir.join("b.mid")).unwrap();
        fs::write(genre_dir.join("broken.mid"), b"not a midi file").unwrap();

        let mut config = PipelineConfig::new();
        config.midi_path = Some(dir.path().join("midi"));
        config.models_path = Some(dir.path().join("models"));
        config.tracking_path = Some(dir.path().join("tracking"));
        config.window_len = 3;
        config.embed_dims = 4;
        config.hidden_units = 8;
        config.batch_size = 4;
        config.epochs = 2;
        let cache = DatasetCache::new(dir.path().join("cache"));
        let parser = MidiParser::new();

        let prepared = prepare_genre(&config, &parser, &cache, "Jazz").unwrap();
        assert_eq!(prepared.stream_len, 9);
        assert_eq!(prepared.vocab_size, 5);
        assert_eq!(prepared.windows, 6);

        let mut tracker = config.tracker("Jazz");
        let trained = train_on_genre(&config, &cache, &mut tracker, "Jazz").unwrap();
        assert_eq!(trained.history.len(), 2);
        assert!(tracker.active_run().is_none());

        let output = dir.path().join("out").join("piece.mid");
        let seed = SeedSource::Dataset {
            genre: "Jazz".to_string(),
            rng_seed: Some(1),
        };
        let piece = generate(&config, &parser, &cache, LATEST_MODEL, &seed, 5, &output).unwrap();
        assert_eq!(piece.path, output);

        let score = parser.parse(&output).unwrap();
        let rendered = part_to_events(&score.parts[0]);
        assert_eq!(rendered.len(), 8);
        let known = ["C4", "D4", "E4", "G4", "C5"];
        assert!(rendered.iter().all(|e| known.contains(&e.pitch())));
    }
}
