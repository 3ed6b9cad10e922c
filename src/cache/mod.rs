//! Cache module for intermediate dataset artifacts.
//!
//! Provides a keyed, on-disk store for token streams, vocabularies and
//! windowed tensors.

pub mod datasets;

// Re-export commonly used types
pub use datasets::{
    extraction_keys, validate_corpus_name, windowing_keys, ArtifactKind, CacheKey, DatasetCache,
};
