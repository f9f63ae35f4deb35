//! Versioned checkpoint file format shared with the offline training job.
//!
//! A checkpoint is a JSON document holding a named parameter bundle:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "model_state_dict": {
//!     "user_embedding.weight": { "shape": [6041, 32], "data": [ ... ] },
//!     "mlp_layers.0.weight":   { "shape": [64, 64],   "data": [ ... ] },
//!     ...
//!   },
//!   "metadata": { "epoch": 20 }
//! }
//! ```
//!
//! `data` is row-major. Linear weights are stored `out × in`. Hidden layers sit
//! at even positions of `mlp_layers` (odd positions are the parameter-free
//! rectifiers), so the k-th hidden layer is `mlp_layers.{2k}`.

use cinerank_core::error::{ArtifactKind, CinerankResult, LoadError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

pub const USER_EMBEDDING: &str = "user_embedding.weight";
pub const ITEM_EMBEDDING: &str = "item_embedding.weight";
pub const OUTPUT_WEIGHT: &str = "output_layer.weight";
pub const OUTPUT_BIAS: &str = "output_layer.bias";

pub fn hidden_weight_name(layer: usize) -> String {
    format!("mlp_layers.{}.weight", layer * 2)
}

pub fn hidden_bias_name(layer: usize) -> String {
    format!("mlp_layers.{}.bias", layer * 2)
}

/// Parameters keyed by name, ordered so written files are stable.
pub type StateDict = BTreeMap<String, TensorRecord>;

/// One named parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorRecord {
    pub fn from_array2(array: &Array2<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    pub fn from_array1(array: &Array1<f32>) -> Self {
        Self {
            shape: vec![array.len()],
            data: array.to_vec(),
        }
    }

    /// Checks the declared shape against `expected` and that `data` actually
    /// holds that many values.
    pub fn check_shape(&self, name: &str, expected: &[usize]) -> Result<(), LoadError> {
        if self.shape != expected {
            return Err(LoadError::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                found: self.shape.clone(),
            });
        }
        // `shape == expected`, so the product is bounded by the configured extents.
        let declared: usize = expected.iter().product();
        if declared != self.data.len() {
            return Err(LoadError::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                found: vec![self.data.len()],
            });
        }
        Ok(())
    }

    pub fn into_array2(self, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>, LoadError> {
        self.check_shape(name, &[rows, cols])?;
        let len = self.data.len();
        Array2::from_shape_vec((rows, cols), self.data).map_err(|_| LoadError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![rows, cols],
            found: vec![len],
        })
    }

    pub fn into_array1(self, name: &str, len: usize) -> Result<Array1<f32>, LoadError> {
        self.check_shape(name, &[len])?;
        Ok(Array1::from_vec(self.data))
    }
}

/// On-disk checkpoint envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    #[serde(default)]
    pub model_state_dict: Option<StateDict>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Checkpoint {
    pub fn new(state_dict: StateDict) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            model_state_dict: Some(state_dict),
            metadata: BTreeMap::new(),
        }
    }
}

/// A checkpoint that passed the envelope checks.
#[derive(Debug)]
pub struct LoadedCheckpoint {
    pub state_dict: StateDict,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub sha256: String,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Read and verify a checkpoint file.
///
/// When `expected_sha256` is given the raw bytes must hash to it before
/// anything is parsed.
pub fn read_checkpoint(
    path: &Path,
    expected_sha256: Option<&str>,
) -> Result<LoadedCheckpoint, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        artifact: ArtifactKind::Checkpoint,
        source,
    })?;
    let sha256 = sha256_hex(&bytes);
    debug!(path = %path.display(), bytes = bytes.len(), sha256 = %sha256, "Read checkpoint");

    if let Some(expected) = expected_sha256 {
        let expected = expected.trim().to_ascii_lowercase();
        if expected != sha256 {
            return Err(LoadError::DigestMismatch {
                expected,
                found: sha256,
            });
        }
    }

    let checkpoint: Checkpoint =
        serde_json::from_slice(&bytes).map_err(|source| LoadError::Parse {
            artifact: ArtifactKind::Checkpoint,
            source,
        })?;

    if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(LoadError::UnsupportedFormat {
            artifact: ArtifactKind::Checkpoint,
            found: checkpoint.format_version,
            expected: CHECKPOINT_FORMAT_VERSION,
        });
    }

    let state_dict = checkpoint
        .model_state_dict
        .ok_or(LoadError::MissingParameterBundle)?;

    Ok(LoadedCheckpoint {
        state_dict,
        metadata: checkpoint.metadata,
        sha256,
    })
}

/// Write a checkpoint and return the SHA-256 of the bytes written.
pub fn write_checkpoint(path: &Path, checkpoint: &Checkpoint) -> CinerankResult<String> {
    let bytes = serde_json::to_vec(checkpoint)?;
    std::fs::write(path, &bytes)?;
    Ok(sha256_hex(&bytes))
}
