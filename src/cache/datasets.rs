//! On-disk dataset cache.
//!
//! Stores intermediate artifacts per corpus so reruns skip parsing and
//! windowing. Layout under the cache root:
//!
//! ```text
//! <corpus>/token_stream.json
//! <corpus>/vocabulary.json
//! <corpus>/window-<L>/inputs.json
//! <corpus>/window-<L>/targets.json
//! <corpus>/window-<L>/index_map.json
//! ```
//!
//! Entries are written to a temporary sibling and renamed into place, so a
//! half-written file never appears under its final name. There is no
//! eviction and no locking; one writer per corpus is assumed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{ErrorCode, PipelineError, Result};

/// Kind of cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Ordered events of the whole corpus.
    TokenStream,
    /// Distinct events in first-seen order.
    Vocabulary,
    /// Input windows, shape `(N, L)`.
    InputTensor,
    /// Next-token targets, length `N`.
    TargetTensor,
    /// Event <-> index bijection used for the tensors.
    IndexMap,
}

impl ArtifactKind {
    /// File name of the artifact inside its directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::TokenStream => "token_stream.json",
            ArtifactKind::Vocabulary => "vocabulary.json",
            ArtifactKind::InputTensor => "inputs.json",
            ArtifactKind::TargetTensor => "targets.json",
            ArtifactKind::IndexMap => "index_map.json",
        }
    }

    /// Returns true for artifacts that depend on the window length.
    pub fn is_windowed(&self) -> bool {
        matches!(
            self,
            ArtifactKind::InputTensor | ArtifactKind::TargetTensor | ArtifactKind::IndexMap
        )
    }
}

/// Address of one cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    corpus: String,
    kind: ArtifactKind,
    window_len: Option<usize>,
}

impl CacheKey {
    /// Key of a corpus-level artifact (token stream, vocabulary).
    pub fn corpus(corpus: &str, kind: ArtifactKind) -> Self {
        Self {
            corpus: corpus.to_string(),
            kind,
            window_len: None,
        }
    }

    /// Key of an artifact derived at a given window length.
    pub fn windowed(corpus: &str, kind: ArtifactKind, window_len: usize) -> Self {
        Self {
            corpus: corpus.to_string(),
            kind,
            window_len: Some(window_len),
        }
    }

    /// Corpus name.
    pub fn corpus_name(&self) -> &str {
        &self.corpus
    }

    /// Artifact kind.
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    fn relative_path(&self) -> Result<PathBuf> {
        validate_corpus_name(&self.corpus)?;
        let dir = PathBuf::from(&self.corpus);
        match (self.kind.is_windowed(), self.window_len) {
            (false, _) => Ok(dir.join(self.kind.file_name())),
            (true, Some(len)) => Ok(dir
                .join(format!("window-{}", len))
                .join(self.kind.file_name())),
            (true, None) => Err(PipelineError::new(
                ErrorCode::CacheIo,
                format!("{:?} artifacts need a window length", self.kind),
            )),
        }
    }
}

/// Keys written by the extraction stage.
pub fn extraction_keys(corpus: &str) -> Vec<CacheKey> {
    vec![
        CacheKey::corpus(corpus, ArtifactKind::TokenStream),
        CacheKey::corpus(corpus, ArtifactKind::Vocabulary),
    ]
}

/// Keys written by the windowing stage.
pub fn windowing_keys(corpus: &str, window_len: usize) -> Vec<CacheKey> {
    vec![
        CacheKey::windowed(corpus, ArtifactKind::InputTensor, window_len),
        CacheKey::windowed(corpus, ArtifactKind::TargetTensor, window_len),
        CacheKey::windowed(corpus, ArtifactKind::IndexMap, window_len),
    ]
}

/// Rejects corpus names that would escape the cache root.
pub fn validate_corpus_name(corpus: &str) -> Result<()> {
    let bad = corpus.trim().is_empty()
        || corpus == "."
        || corpus == ".."
        || corpus.contains(['/', '\\'])
        || corpus.contains('\0');
    if bad {
        return Err(PipelineError::new(
            ErrorCode::CacheIo,
            format!("Invalid corpus name '{}'", corpus),
        ));
    }
    Ok(())
}

/// Persistent artifact store keyed by [`CacheKey`].
#[derive(Debug, Clone)]
pub struct DatasetCache {
    root: PathBuf,
}

impl DatasetCache {
    /// Creates a cache rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an artifact.
    pub fn path_for(&self, key: &CacheKey) -> Result<PathBuf> {
        Ok(self.root.join(key.relative_path()?))
    }

    /// Returns true if the artifact exists.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Returns true only if every artifact exists.
    pub fn contains_all(&self, keys: &[CacheKey]) -> bool {
        keys.iter().all(|k| self.contains(k))
    }

    /// Paths of the artifacts that do not exist.
    pub fn missing(&self, keys: &[CacheKey]) -> Vec<String> {
        keys.iter()
            .filter(|k| !self.contains(k))
            .map(|k| match self.path_for(k) {
                Ok(path) => path.display().to_string(),
                Err(_) => k.kind().file_name().to_string(),
            })
            .collect()
    }

    /// Serializes and durably stores a value.
    pub fn store<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            PipelineError::with_source(
                ErrorCode::CacheIo,
                format!("Failed to serialize {}", path.display()),
                e,
            )
        })?;
        write_atomic(&path, &bytes)?;
        debug!("Cached {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Loads a value. Returns `Ok(None)` when the artifact is absent.
    pub fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            PipelineError::with_source(
                ErrorCode::CacheIo,
                format!("Failed to read {}", path.display()),
                e,
            )
        })?;
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::with_source(
                ErrorCode::CacheIo,
                format!("Corrupt cache entry {}", path.display()),
                e,
            )
        })?;
        Ok(Some(value))
    }

    /// Loads a value that a previous stage must have stored.
    pub fn load_required<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<T> {
        self.load(key)?.ok_or_else(|| {
            PipelineError::cache_miss(key.corpus_name(), &[key.kind().file_name().to_string()])
        })
    }

    /// Deletes every artifact of a corpus. Returns false if there was none.
    pub fn remove_corpus(&self, corpus: &str) -> Result<bool> {
        validate_corpus_name(corpus)?;
        let dir = self.root.join(corpus);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| {
            PipelineError::with_source(
                ErrorCode::CacheIo,
                format!("Failed to remove {}", dir.display()),
                e,
            )
        })?;
        Ok(true)
    }

    /// Names of the corpora with at least one cached artifact, sorted.
    pub fn corpora(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            PipelineError::with_source(
                ErrorCode::CacheIo,
                format!("Failed to list {}", self.root.display()),
                e,
            )
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Writes `bytes` to a temporary sibling of `path` and renames it into place.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |what: &str, p: &Path, e: std::io::Error| {
        PipelineError::with_source(
            ErrorCode::CacheIo,
            format!("Failed to {} {}", what, p.display()),
            e,
        )
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("create", parent, e))?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes).map_err(|e| io_err("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err("rename", &tmp, e))?;
    Ok(())
}
