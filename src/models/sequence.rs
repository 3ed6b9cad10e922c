//! Next-token sequence model.
//!
//! Wraps the network weights with the lifecycle the pipeline needs:
//! creation from a [`ModelConfig`], fitting with experiment tracking,
//! greedy generation, and persistence.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use chrono::Local;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::tracking::{ExperimentTracker, RunHandle};
use crate::types::ModelConfig;

use super::bundle;
use super::logits::Logits;
use super::network::Weights;
use super::optimizer::Adam;

/// Format of model timestamps, which double as bundle identifiers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Lifecycle state of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Initialised, never fitted.
    Created,
    /// Fitted at least once.
    Trained,
}

/// Metrics of one training epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// Zero-based epoch number within the call to `train`.
    pub epoch: usize,
    /// Mean cross-entropy over the epoch.
    pub loss: f32,
    /// Fraction of windows whose arg-max prediction matched the target.
    pub accuracy: f32,
}

/// Embedding + stacked LSTM + softmax next-token predictor.
#[derive(Debug)]
pub struct SequenceModel {
    config: ModelConfig,
    weights: Weights,
    state: ModelState,
    timestamp: String,
    rng: ChaCha8Rng,
    optimizer: Option<Adam>,
}

impl SequenceModel {
    /// Creates an untrained model with freshly initialised weights.
    pub fn create(config: ModelConfig) -> Result<Self> {
        if let Some(reason) = config.validate() {
            return Err(PipelineError::invalid_hyperparameter("model config", reason));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let weights = Weights::init(&config, &mut rng);

        info!(
            "Created model: vocab {} x embed {} -> {} x LSTM({}) -> dense({}), window {}, {} parameters",
            config.vocab_size,
            config.embed_dims,
            config.lstm_layers,
            config.hidden_units,
            config.vocab_size,
            config.window_len,
            config.parameter_count()
        );

        Ok(Self {
            config,
            weights,
            state: ModelState::Created,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            rng,
            optimizer: None,
        })
    }

    /// Model configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Lifecycle state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Creation timestamp, formatted with [`TIMESTAMP_FORMAT`].
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub(crate) fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Fits the model on `(inputs, targets)`.
    ///
    /// A tracking run named after the model's timestamp is opened before
    /// fitting and closed afterwards, also when fitting fails. Calling this
    /// again continues from the current weights and optimiser state.
    pub fn train(
        &mut self,
        inputs: ArrayView2<'_, u32>,
        targets: ArrayView1<'_, u32>,
        batch_size: usize,
        epochs: usize,
        tracker: &mut ExperimentTracker,
    ) -> Result<Vec<EpochStats>> {
        if batch_size < 1 {
            return Err(PipelineError::invalid_hyperparameter("batch_size", "must be >= 1"));
        }
        if epochs < 1 {
            return Err(PipelineError::invalid_hyperparameter("epochs", "must be >= 1"));
        }
        self.check_dataset(inputs, targets)?;

        let run = tracker.start_run(&self.timestamp)?;
        let params = self.run_params(batch_size, epochs);
        let outcome = tracker
            .log_params(&run, &params)
            .and_then(|_| self.fit(inputs, targets, batch_size, epochs, tracker, &run));
        let ended = tracker.end_run(&run);

        let stats = outcome?;
        ended?;
        self.state = ModelState::Trained;
        Ok(stats)
    }

    fn check_dataset(&self, inputs: ArrayView2<'_, u32>, targets: ArrayView1<'_, u32>) -> Result<()> {
        let (rows, width) = inputs.dim();
        if rows == 0 {
            return Err(PipelineError::empty_dataset(
                "cannot train on a dataset without windows",
            ));
        }
        if rows != targets.len() {
            return Err(PipelineError::shape_mismatch(format!(
                "{} input windows but {} targets",
                rows,
                targets.len()
            )));
        }
        if width != self.config.window_len {
            return Err(PipelineError::shape_mismatch(format!(
                "windows have length {}, model expects {}",
                width, self.config.window_len
            )));
        }
        let vocab = self.config.vocab_size as u32;
        if let Some(bad) = inputs.iter().chain(targets.iter()).find(|&&i| i >= vocab) {
            return Err(PipelineError::shape_mismatch(format!(
                "token index {} is outside the vocabulary of {}",
                bad, vocab
            )));
        }
        Ok(())
    }

    fn run_params(&self, batch_size: usize, epochs: usize) -> BTreeMap<String, String> {
        [
            ("batch_size", batch_size.to_string()),
            ("epochs", epochs.to_string()),
            ("window_len", self.config.window_len.to_string()),
            ("embed_dims", self.config.embed_dims.to_string()),
            ("hidden_units", self.config.hidden_units.to_string()),
            ("lstm_layers", self.config.lstm_layers.to_string()),
            ("learning_rate", self.config.learning_rate.to_string()),
            ("vocab_size", self.config.vocab_size.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn fit(
        &mut self,
        inputs: ArrayView2<'_, u32>,
        targets: ArrayView1<'_, u32>,
        batch_size: usize,
        epochs: usize,
        tracker: &mut ExperimentTracker,
        run: &RunHandle,
    ) -> Result<Vec<EpochStats>> {
        let rows = inputs.nrows();
        let learning_rate = self.config.learning_rate;
        let optimizer = self
            .optimizer
            .get_or_insert_with(|| Adam::new(learning_rate, &self.weights));

        let mut order: Vec<usize> = (0..rows).collect();
        let mut history = Vec::with_capacity(epochs);

        for epoch in 0..epochs {
            order.shuffle(&mut self.rng);

            let mut total_loss = 0.0f64;
            let mut correct = 0usize;
            for chunk in order.chunks(batch_size) {
                let batch = inputs.select(Axis(0), chunk);
                let batch_targets = targets.select(Axis(0), chunk);

                let (logits, trace) = self.weights.forward(batch.view());
                let logits = Logits::from(logits);
                let (loss, d_logits) = logits.cross_entropy(batch_targets.view());
                correct += logits.correct(batch_targets.view());
                total_loss += f64::from(loss) * chunk.len() as f64;

                let grads = self.weights.backward(&trace, &d_logits);
                optimizer.step(&mut self.weights, &grads);
            }

            let stats = EpochStats {
                epoch,
                loss: (total_loss / rows as f64) as f32,
                accuracy: correct as f32 / rows as f32,
            };
            info!(
                "Epoch {}/{} - loss: {:.4} - accuracy: {:.4}",
                epoch + 1,
                epochs,
                stats.loss,
                stats.accuracy
            );
            tracker.log_metric(run, "loss", epoch, f64::from(stats.loss))?;
            tracker.log_metric(run, "accuracy", epoch, f64::from(stats.accuracy))?;
            history.push(stats);
        }

        Ok(history)
    }

    /// Generates `horizon` token indices greedily, starting from `seed`.
    ///
    /// The context is a rolling window: each prediction is appended and the
    /// oldest token dropped.
    pub fn predict(&self, seed: &[u32], horizon: usize) -> Result<Vec<u32>> {
        let window = self.config.window_len;
        if seed.len() != window {
            return Err(PipelineError::invalid_seed(format!(
                "expected {} tokens, got {}",
                window,
                seed.len()
            )));
        }
        let vocab = self.config.vocab_size as u32;
        if let Some(bad) = seed.iter().find(|&&i| i >= vocab) {
            return Err(PipelineError::invalid_seed(format!(
                "token index {} is outside the vocabulary of {}",
                bad, vocab
            )));
        }

        debug!("Generating {} tokens...", horizon);
        let mut context: VecDeque<u32> = seed.iter().copied().collect();
        let mut generated = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let batch = Array2::from_shape_fn((1, window), |(_, j)| context[j]);
            let (logits, _) = self.weights.forward(batch.view());
            let next = Logits::from(logits).argmax()[0];
            generated.push(next);
            context.pop_front();
            context.push_back(next);
        }
        Ok(generated)
    }

    /// Saves weights and manifest under `<dir>/<identifier>`, where the
    /// identifier is the model timestamp. Returns the identifier.
    pub fn save(&self, dir: &Path) -> Result<String> {
        let (id, path) = bundle::write_model(self, None, dir)?;
        info!("Saved model {} to {}", id, path.display());
        Ok(id)
    }

    /// Restores a model saved with [`SequenceModel::save`] or
    /// [`save_bundle`](super::bundle::save_bundle).
    pub fn load(path: &Path) -> Result<Self> {
        let (manifest, weights) = bundle::read_model(path)?;
        debug!("Loaded model {} from {}", manifest.created_at, path.display());
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(manifest.config.seed),
            config: manifest.config,
            weights,
            state: manifest.state,
            timestamp: manifest.created_at,
            optimizer: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use ndarray::{array, Array1};

    fn config() -> ModelConfig {
        ModelConfig::new(3, 4, 2)
            .with_hidden_units(8)
            .with_learning_rate(0.05)
            .with_seed(11)
    }

    /// Windows of the cycle 0 1 2 0 1 2 ...
    fn cyclic_dataset() -> (Array2<u32>, Array1<u32>) {
        let stream: Vec<u32> = (0..30).map(|i| i % 3).collect();
        let rows = stream.len() - 2;
        let inputs = Array2::from_shape_fn((rows, 2), |(i, j)| stream[i + j]);
        let targets = Array1::from_shape_fn(rows, |i| stream[i + 2]);
        (inputs, targets)
    }

    #[test]
    fn create_rejects_invalid_config() {
        let err = SequenceModel::create(ModelConfig::new(0, 4, 2)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidHyperparameter);
    }

    #[test]
    fn training_learns_a_cycle() {
        let mut model = SequenceModel::create(config()).unwrap();
        let mut tracker = ExperimentTracker::disabled("test");
        let (inputs, targets) = cyclic_dataset();

        let stats = model
            .train(inputs.view(), targets.view(), 4, 60, &mut tracker)
            .unwrap();

        assert_eq!(stats.len(), 60);
        assert_eq!(model.state(), ModelState::Trained);
        assert!(stats[59].loss < stats[0].loss);
        assert_eq!(model.predict(&[0, 1], 4).unwrap(), vec![2, 0, 1, 2]);
        assert_eq!(tracker.active_run(), None);
    }

    #[test]
    fn train_rejects_bad_inputs() {
        let mut model = SequenceModel::create(config()).unwrap();
        let mut tracker = ExperimentTracker::disabled("test");
        let (inputs, targets) = cyclic_dataset();

        let err = model
            .train(inputs.view(), targets.view(), 0, 1, &mut tracker)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidHyperparameter);

        let empty = Array2::<u32>::zeros((0, 2));
        let err = model
            .train(empty.view(), Array1::<u32>::zeros(0).view(), 4, 1, &mut tracker)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyDataset);

        let err = model
            .train(inputs.view(), targets.slice(ndarray::s![..3]), 4, 1, &mut tracker)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShapeMismatch);

        let err = model
            .train(array![[0u32, 7]].view(), array![1u32].view(), 4, 1, &mut tracker)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ShapeMismatch);

        assert_eq!(model.state(), ModelState::Created);
        assert_eq!(tracker.active_run(), None);
    }

    #[test]
    fn train_fails_while_another_run_is_open() {
        let mut model = SequenceModel::create(config()).unwrap();
        let mut tracker = ExperimentTracker::disabled("test");
        let _outer = tracker.start_run("outer").unwrap();
        let (inputs, targets) = cyclic_dataset();

        let err = model
            .train(inputs.view(), targets.view(), 4, 1, &mut tracker)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RunAlreadyActive);
        assert_eq!(tracker.active_run(), Some("outer"));
    }

    #[test]
    fn predict_validates_seed() {
        let model = SequenceModel::create(config()).unwrap();
        assert_eq!(model.predict(&[0], 3).unwrap_err().code, ErrorCode::InvalidSeed);
        assert_eq!(model.predict(&[0, 3], 3).unwrap_err().code, ErrorCode::InvalidSeed);
        assert!(model.predict(&[0, 1], 0).unwrap().is_empty());
    }

    #[test]
    fn predict_is_deterministic_and_in_range() {
        let model = SequenceModel::create(config()).unwrap();
        let a = model.predict(&[2, 1], 10).unwrap();
        let b = model.predict(&[2, 1], 10).unwrap();
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
        assert!(a.iter().all(|&i| i < 3));
    }

    #[test]
    fn same_seed_gives_same_training() {
        let (inputs, targets) = cyclic_dataset();
        let mut a = SequenceModel::create(config()).unwrap();
        let mut b = SequenceModel::create(config()).unwrap();
        let mut tracker = ExperimentTracker::disabled("test");
        let sa = a.train(inputs.view(), targets.view(), 5, 2, &mut tracker).unwrap();
        let sb = b.train(inputs.view(), targets.view(), 5, 2, &mut tracker).unwrap();
        assert_eq!(sa, sb);
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn saved_model_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = SequenceModel::create(config()).unwrap();
        let mut tracker = ExperimentTracker::disabled("test");
        let (inputs, targets) = cyclic_dataset();
        model
            .train(inputs.view(), targets.view(), 4, 3, &mut tracker)
            .unwrap();

        let id = model.save(dir.path()).unwrap();
        let loaded = SequenceModel::load(&dir.path().join(&id)).unwrap();

        assert_eq!(loaded.state(), ModelState::Trained);
        assert_eq!(loaded.timestamp(), model.timestamp());
        assert_eq!(
            loaded.predict(&[1, 2], 8).unwrap(),
            model.predict(&[1, 2], 8).unwrap()
        );
    }
}
