//! Model bundles on disk.
//!
//! A bundle is a directory `<models_dir>/<identifier>/` holding:
//! - `weights.json` - learned parameters
//! - `manifest.json` - config, lifecycle state, timestamp and the SHA-256
//!   of `weights.json`
//! - `index_map.json` - the token index the model was trained against
//!   (bundles written by [`save_bundle`] only)
//!
//! The manifest is written last, so a directory without one is incomplete
//! and is never loaded.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::types::{ModelConfig, TokenIndex};

use super::network::Weights;
use super::sequence::{ModelState, SequenceModel};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Weights file name.
pub const WEIGHTS_FILE: &str = "weights.json";
/// Token index file name.
pub const INDEX_MAP_FILE: &str = "index_map.json";

/// Manifest format written by this version.
pub const MANIFEST_VERSION: u32 = 1;

/// Contents of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub created_at: String,
    pub state: ModelState,
    pub config: ModelConfig,
    pub weights_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Creates a fresh directory `<dir>/<base>`, or `<dir>/<base>_<n>` when the
/// name is taken.
fn claim_dir(dir: &Path, base: &str) -> Result<(String, PathBuf)> {
    fs::create_dir_all(dir).map_err(|e| {
        PipelineError::model_save_failed(format!("cannot create {}: {}", dir.display(), e))
    })?;

    let mut suffix = 0u32;
    loop {
        let id = if suffix == 0 {
            base.to_string()
        } else {
            format!("{}_{}", base, suffix)
        };
        let path = dir.join(&id);
        match fs::create_dir(&path) {
            Ok(()) => return Ok((id, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => {
                return Err(PipelineError::model_save_failed(format!(
                    "cannot create {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| {
        PipelineError::model_save_failed(format!("cannot write {}: {}", path.display(), e))
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| PipelineError::model_save_failed(format!("cannot serialize {}: {}", what, e)))
}

/// Writes a model (and optionally its token index) under a new directory
/// in `dir`. Returns the identifier and the directory.
pub(crate) fn write_model(
    model: &SequenceModel,
    index: Option<&TokenIndex>,
    dir: &Path,
) -> Result<(String, PathBuf)> {
    let weights = to_json(model.weights(), "weights")?;
    let manifest = Manifest {
        format_version: MANIFEST_VERSION,
        created_at: model.timestamp().to_string(),
        state: model.state(),
        config: model.config().clone(),
        weights_sha256: sha256_hex(&weights),
    };
    let manifest = serde_json::to_vec_pretty(&manifest).map_err(|e| {
        PipelineError::model_save_failed(format!("cannot serialize manifest: {}", e))
    })?;

    let (id, path) = claim_dir(dir, model.timestamp())?;
    write_file(&path.join(WEIGHTS_FILE), &weights)?;
    if let Some(index) = index {
        write_file(&path.join(INDEX_MAP_FILE), &to_json(index, "index map")?)?;
    }
    write_file(&path.join(MANIFEST_FILE), &manifest)?;

    debug!("Wrote model files to {}", path.display());
    Ok((id, path))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        PipelineError::model_load_failed(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Reads and verifies the manifest and weights of the bundle at `path`.
pub(crate) fn read_model(path: &Path) -> Result<(Manifest, Weights)> {
    let manifest_path = path.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(PipelineError::model_not_found(path.display().to_string()));
    }

    let manifest: Manifest = serde_json::from_slice(&read_file(&manifest_path)?)
        .map_err(|e| PipelineError::model_load_failed(format!("corrupt manifest: {}", e)))?;
    if manifest.format_version != MANIFEST_VERSION {
        return Err(PipelineError::model_load_failed(format!(
            "unsupported manifest version {}",
            manifest.format_version
        )));
    }
    if let Some(reason) = manifest.config.validate() {
        return Err(PipelineError::model_load_failed(format!(
            "invalid config in manifest: {}",
            reason
        )));
    }

    let bytes = read_file(&path.join(WEIGHTS_FILE))?;
    let digest = sha256_hex(&bytes);
    if digest != manifest.weights_sha256 {
        return Err(PipelineError::model_load_failed(format!(
            "checksum mismatch for {}: expected {}, got {}",
            WEIGHTS_FILE, manifest.weights_sha256, digest
        )));
    }

    let weights: Weights = serde_json::from_slice(&bytes)
        .map_err(|e| PipelineError::model_load_failed(format!("corrupt weights: {}", e)))?;
    weights
        .check_shapes(&manifest.config)
        .map_err(PipelineError::model_load_failed)?;

    Ok((manifest, weights))
}

/// Saves a model together with its token index. Returns the identifier.
pub fn save_bundle(model: &SequenceModel, index: &TokenIndex, dir: &Path) -> Result<String> {
    if index.len() != model.config().vocab_size {
        return Err(PipelineError::shape_mismatch(format!(
            "token index has {} entries but the model has {} classes",
            index.len(),
            model.config().vocab_size
        )));
    }

    let (id, path) = write_model(model, Some(index), dir)?;
    info!("Saved model bundle {} to {}", id, path.display());
    Ok(id)
}

/// Loads a model and its token index from the bundle at `path`.
pub fn load_bundle(path: &Path) -> Result<(SequenceModel, TokenIndex)> {
    let model = SequenceModel::load(path)?;

    let index_path = path.join(INDEX_MAP_FILE);
    if !index_path.is_file() {
        return Err(PipelineError::model_load_failed(format!(
            "bundle {} has no {}",
            path.display(),
            INDEX_MAP_FILE
        )));
    }
    let index: TokenIndex = serde_json::from_slice(&read_file(&index_path)?)
        .map_err(|e| PipelineError::model_load_failed(format!("corrupt index map: {}", e)))?;

    if index.len() != model.config().vocab_size {
        return Err(PipelineError::model_load_failed(format!(
            "index map has {} entries but the model has {} classes",
            index.len(),
            model.config().vocab_size
        )));
    }

    Ok((model, index))
}

/// Identifiers of the complete bundles under `dir`, sorted. Timestamp
/// identifiers sort chronologically.
pub fn list_bundles(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| {
        PipelineError::model_load_failed(format!("cannot list {}: {}", dir.display(), e))
    })?;
    let mut ids: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join(MANIFEST_FILE).is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect();
    ids.sort();
    Ok(ids)
}
