//! Training a model on a prepared genre.

use std::path::PathBuf;

use ndarray::{Array1, Array2};
use tracing::info;

use crate::cache::{windowing_keys, DatasetCache};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::{save_bundle, EpochStats, SequenceModel};
use crate::tracking::ExperimentTracker;
use crate::types::{TokenIndex, WindowedDataset};

/// A freshly trained and saved model.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Bundle identifier (the model timestamp, possibly suffixed).
    pub identifier: String,
    /// Bundle directory.
    pub path: PathBuf,
    /// Per-epoch metrics.
    pub history: Vec<EpochStats>,
}

/// Loads the windowed dataset and token index cached for `(genre, window_len)`.
pub fn load_training_data(
    cache: &DatasetCache,
    genre: &str,
    window_len: usize,
) -> Result<(WindowedDataset, TokenIndex)> {
    let keys = windowing_keys(genre, window_len);
    let missing = cache.missing(&keys);
    if !missing.is_empty() {
        return Err(PipelineError::cache_miss(genre, &missing));
    }

    let inputs: Array2<u32> = cache.load_required(&keys[0])?;
    let targets: Array1<u32> = cache.load_required(&keys[1])?;
    let index: TokenIndex = cache.load_required(&keys[2])?;
    Ok((WindowedDataset::new(inputs, targets)?, index))
}

/// Trains a model on the cached dataset of `genre` and saves the bundle
/// under the configured models directory.
pub fn train_on_genre(
    config: &PipelineConfig,
    cache: &DatasetCache,
    tracker: &mut ExperimentTracker,
    genre: &str,
) -> Result<TrainedModel> {
    let (dataset, index) = load_training_data(cache, genre, config.window_len)?;
    info!(
        "Loaded {} windows and {} tokens for genre '{}'",
        dataset.len(),
        index.len(),
        genre
    );

    let mut model = SequenceModel::create(config.model_config(index.len()))?;
    let history = model.train(
        dataset.inputs().view(),
        dataset.targets().view(),
        config.batch_size,
        config.epochs,
        tracker,
    )?;

    let models_dir = config.effective_models_path();
    let identifier = save_bundle(&model, &index, &models_dir)?;
    info!("Finished training for model '{}'.", identifier);

    Ok(TrainedModel {
        path: models_dir.join(&identifier),
        identifier,
        history,
    })
}
