//! Error types for notegen.
//!
//! Defines all error codes and types used throughout the pipeline for
//! consistent error handling and reporting.

use std::fmt;

/// Error codes attached to every pipeline error.
///
/// These codes let callers (and the CLI) distinguish precondition
/// violations from I/O failures without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Model hyperparameters or pipeline configuration are out of range.
    /// Trigger: vocabulary size, embedding width, window length or hidden
    /// units below 1, batch size 0, non-positive learning rate.
    InvalidHyperparameter,

    /// The corpus produced no tokens.
    /// Trigger: windowing or training on an empty token stream.
    EmptyCorpus,

    /// The windowed dataset has no rows.
    /// Trigger: training on a stream not longer than the window length.
    EmptyDataset,

    /// Tensors do not agree with each other or with the model.
    /// Trigger: input/target length mismatch, wrong window width,
    /// index outside the vocabulary, token missing from the vocabulary.
    ShapeMismatch,

    /// A cached artifact required by a later stage is missing.
    /// Trigger: training before preparing the genre.
    CacheMiss,

    /// Reading or writing the dataset cache failed.
    /// Trigger: permission denied, disk full, corrupt JSON.
    CacheIo,

    /// A score file could not be parsed.
    /// Trigger: truncated or non-MIDI file, SMPTE timing.
    ParseFailed,

    /// Writing a rendered score failed.
    /// Trigger: unparsable pitch name, output directory not writable.
    RenderFailed,

    /// The requested model bundle does not exist.
    /// Trigger: wrong model identifier or models directory.
    ModelNotFound,

    /// A model bundle exists but could not be restored.
    /// Trigger: checksum mismatch, shape mismatch, corrupt JSON.
    ModelLoadFailed,

    /// Persisting a model bundle failed.
    /// Trigger: models directory not writable.
    ModelSaveFailed,

    /// The seed window cannot drive the model.
    /// Trigger: wrong length, index outside vocabulary, too few tokens.
    InvalidSeed,

    /// A tracking run was started while another one is active.
    RunAlreadyActive,

    /// A tracking call was made without a matching active run.
    NoActiveRun,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidHyperparameter => "INVALID_HYPERPARAMETER",
            ErrorCode::EmptyCorpus => "EMPTY_CORPUS",
            ErrorCode::EmptyDataset => "EMPTY_DATASET",
            ErrorCode::ShapeMismatch => "SHAPE_MISMATCH",
            ErrorCode::CacheMiss => "CACHE_MISS",
            ErrorCode::CacheIo => "CACHE_IO",
            ErrorCode::ParseFailed => "PARSE_FAILED",
            ErrorCode::RenderFailed => "RENDER_FAILED",
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::ModelLoadFailed => "MODEL_LOAD_FAILED",
            ErrorCode::ModelSaveFailed => "MODEL_SAVE_FAILED",
            ErrorCode::InvalidSeed => "INVALID_SEED",
            ErrorCode::RunAlreadyActive => "RUN_ALREADY_ACTIVE",
            ErrorCode::NoActiveRun => "NO_ACTIVE_RUN",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidHyperparameter => "Hyperparameter or configuration value out of range",
            ErrorCode::EmptyCorpus => "Corpus contains no tokens",
            ErrorCode::EmptyDataset => "Windowed dataset contains no training pairs",
            ErrorCode::ShapeMismatch => "Tensor shapes or indices do not match",
            ErrorCode::CacheMiss => "Required cached artifact is missing",
            ErrorCode::CacheIo => "Failed to read or write the dataset cache",
            ErrorCode::ParseFailed => "Failed to parse score file",
            ErrorCode::RenderFailed => "Failed to render score file",
            ErrorCode::ModelNotFound => "Model bundle not found",
            ErrorCode::ModelLoadFailed => "Failed to load model bundle",
            ErrorCode::ModelSaveFailed => "Failed to save model bundle",
            ErrorCode::InvalidSeed => "Seed window is not usable with this model",
            ErrorCode::RunAlreadyActive => "A tracking run is already active",
            ErrorCode::NoActiveRun => "No matching tracking run is active",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::InvalidHyperparameter => {
                "Use positive values for window length, embedding width, hidden units, \
                 batch size and learning rate"
            }
            ErrorCode::EmptyCorpus => {
                "Check that the genre directory exists and contains parsable .mid/.midi files, \
                 or relax the instrument filter"
            }
            ErrorCode::EmptyDataset => {
                "Add more files to the genre or use a window length shorter than the token stream"
            }
            ErrorCode::ShapeMismatch => {
                "Delete the cached artifacts for this genre and run 'notegen prepare' again"
            }
            ErrorCode::CacheMiss => "Run 'notegen prepare' for this genre and window length first",
            ErrorCode::CacheIo => {
                "Check permissions and free space in the cache directory, \
                 or remove the corrupt artifact and prepare again"
            }
            ErrorCode::ParseFailed => "Verify the file is a Standard MIDI File with metrical timing",
            ErrorCode::RenderFailed => "Check that the output directory exists and is writable",
            ErrorCode::ModelNotFound => {
                "Check the model identifier and the models directory (see 'notegen train' output)"
            }
            ErrorCode::ModelLoadFailed => "Retrain the model; the bundle is incomplete or was modified",
            ErrorCode::ModelSaveFailed => "Check permissions and free space in the models directory",
            ErrorCode::InvalidSeed => {
                "Seed from the genre the model was trained on, or use a MIDI file with \
                 at least window-length notes drawn from the model's vocabulary"
            }
            ErrorCode::RunAlreadyActive => "End the active run before starting a new one",
            ErrorCode::NoActiveRun => "Start a run first and pass its handle",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for pipeline operations.
#[derive(Debug)]
pub struct PipelineError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PipelineError {
    /// Creates a new PipelineError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new PipelineError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an INVALID_HYPERPARAMETER error.
    pub fn invalid_hyperparameter(name: &str, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidHyperparameter,
            format!("Invalid {}: {}", name, reason.into()),
        )
    }

    /// Creates an EMPTY_CORPUS error.
    pub fn empty_corpus(corpus: &str) -> Self {
        Self::new(
            ErrorCode::EmptyCorpus,
            format!("Corpus '{}' produced no tokens", corpus),
        )
    }

    /// Creates an EMPTY_DATASET error.
    pub fn empty_dataset(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::EmptyDataset, reason.into())
    }

    /// Creates a SHAPE_MISMATCH error.
    pub fn shape_mismatch(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::ShapeMismatch, reason.into())
    }

    /// Creates a CACHE_MISS error naming the missing artifacts.
    pub fn cache_miss(corpus: &str, missing: &[String]) -> Self {
        Self::new(
            ErrorCode::CacheMiss,
            format!(
                "Missing cached artifacts for '{}': {}",
                corpus,
                missing.join(", ")
            ),
        )
    }

    /// Creates a PARSE_FAILED error.
    pub fn parse_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ParseFailed,
            format!("Failed to parse '{}': {}", path.into(), reason.into()),
        )
    }

    /// Creates a RENDER_FAILED error.
    pub fn render_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RenderFailed,
            format!("Failed to render score: {}", reason.into()),
        )
    }

    /// Creates a MODEL_NOT_FOUND error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelNotFound,
            format!("Model bundle not found at: {}", path.into()),
        )
    }

    /// Creates a MODEL_LOAD_FAILED error.
    pub fn model_load_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelLoadFailed,
            format!("Failed to load model: {}", reason.into()),
        )
    }

    /// Creates a MODEL_SAVE_FAILED error.
    pub fn model_save_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ModelSaveFailed,
            format!("Failed to save model: {}", reason.into()),
        )
    }

    /// Creates an INVALID_SEED error.
    pub fn invalid_seed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidSeed,
            format!("Invalid seed: {}", reason.into()),
        )
    }

    /// Creates a RUN_ALREADY_ACTIVE error.
    pub fn run_already_active(active: &str) -> Self {
        Self::new(
            ErrorCode::RunAlreadyActive,
            format!("Run '{}' is already active", active),
        )
    }

    /// Creates a NO_ACTIVE_RUN error.
    pub fn no_active_run(action: &str) -> Self {
        Self::new(
            ErrorCode::NoActiveRun,
            format!("Cannot {} without an active run", action),
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using PipelineError.
pub type Result<T> = std::result::Result<T, PipelineError>;
