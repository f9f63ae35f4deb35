use thiserror::Error;

pub type CinerankResult<T> = Result<T, CinerankError>;

#[derive(Error, Debug)]
pub enum CinerankError {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which of the three startup artifacts a load failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Checkpoint,
    UserMap,
    ItemMap,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::Checkpoint => "model checkpoint",
            ArtifactKind::UserMap => "user map",
            ArtifactKind::ItemMap => "item map",
        };
        f.write_str(name)
    }
}

/// Reasons the recommender came up disabled (or partly disabled) at startup.
///
/// These never escape the loader; they are recorded on the context and
/// surfaced through its status summary.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("missing artifact(s): {}", join_kinds(.kinds))]
    ArtifactMissing { kinds: Vec<ArtifactKind> },

    #[error("failed to read {artifact}: {source}")]
    Io {
        artifact: ArtifactKind,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {artifact}: {source}")]
    Parse {
        artifact: ArtifactKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{artifact} has format_version {found}, expected {expected}")]
    UnsupportedFormat {
        artifact: ArtifactKind,
        found: u32,
        expected: u32,
    },

    #[error("inconsistent mapping tables: {0}")]
    MalformedMappings(String),

    #[error("checkpoint has no 'model_state_dict' bundle")]
    MissingParameterBundle,

    #[error("checkpoint is missing parameter '{0}'")]
    MissingParameter(String),

    #[error("checkpoint has unexpected parameter '{0}'")]
    UnexpectedParameter(String),

    #[error("parameter '{name}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("checkpoint digest {found} does not match expected {expected}")]
    DigestMismatch { expected: String, found: String },

    #[error("invalid model dimensions: {0}")]
    InvalidDimensions(String),
}

fn join_kinds(kinds: &[ArtifactKind]) -> String {
    kinds
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by a [`crate::ScoringModel`] during a forward pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("{kind} index {index} out of range (table has {bound} rows)")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        bound: usize,
    },

    #[error("inference failure: {0}")]
    Failure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_missing_lists_every_kind() {
        let err = LoadError::ArtifactMissing {
            kinds: vec![ArtifactKind::UserMap, ArtifactKind::ItemMap],
        };
        assert_eq!(err.to_string(), "missing artifact(s): user map, item map");
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = LoadError::ShapeMismatch {
            name: "output_layer.weight".to_string(),
            expected: vec![1, 16],
            found: vec![1, 8],
        };
        assert!(err.to_string().contains("[1, 16]"));
    }
}
