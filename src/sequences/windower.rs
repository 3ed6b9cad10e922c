//! Sliding-window dataset construction.

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::{MusicalEvent, TokenIndex, Vocabulary, WindowedDataset};

/// Builds the token index and the windowed dataset of a stream.
///
/// Row `i` holds the indices of `stream[i..i + window_len]` and its target
/// the index of `stream[i + window_len]`. A stream no longer than the
/// window yields an empty dataset, which is not an error. An empty stream
/// is rejected since it leaves nothing to index.
pub fn create_sequences(
    corpus: &str,
    stream: &[MusicalEvent],
    vocabulary: &Vocabulary,
    window_len: usize,
) -> Result<(WindowedDataset, TokenIndex)> {
    if window_len < 1 {
        return Err(PipelineError::invalid_hyperparameter(
            "window_len",
            "must be >= 1",
        ));
    }
    if stream.is_empty() || vocabulary.is_empty() {
        return Err(PipelineError::empty_corpus(corpus));
    }

    debug!("Creating sequences...");
    let index = TokenIndex::from_vocabulary(vocabulary);
    let indices = index.encode(stream)?;

    let rows = indices.len().saturating_sub(window_len);
    let mut inputs = Array2::<u32>::zeros((rows, window_len));
    let mut targets = Array1::<u32>::zeros(rows);
    for i in 0..rows {
        for (j, &value) in indices[i..i + window_len].iter().enumerate() {
            inputs[[i, j]] = value;
        }
        targets[i] = indices[i + window_len];
    }

    let dataset = WindowedDataset::new(inputs, targets)?;
    debug!(
        "Created input-sequences: {:?}, output-sequences: {} and token index ({}).",
        dataset.inputs().dim(),
        dataset.len(),
        index.len()
    );
    Ok((dataset, index))
}
