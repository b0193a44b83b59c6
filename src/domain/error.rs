//! Domain error types.

use crate::domain::track_record::chain::ChainError;

/// Top-level error type for eaforge.
#[derive(Debug, thiserror::Error)]
pub enum EaforgeError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid graph document: {reason}")]
    InvalidDocument { reason: String },

    #[error("node {node_id}: unknown node type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("node {node_id}: {reason}")]
    Structural { node_id: String, reason: String },

    #[error("invalid generation settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("{pass} pass already applied to this program")]
    TransformReapplied { pass: &'static str },

    #[error("multi-pair transform left single-symbol references: {reason}")]
    TransformIncomplete { reason: String },

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EaforgeError {
    pub fn structural(node_id: &str, reason: impl Into<String>) -> Self {
        EaforgeError::Structural {
            node_id: node_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EaforgeError> for std::process::ExitCode {
    fn from(err: &EaforgeError) -> Self {
        let code: u8 = match err {
            EaforgeError::Io(_) => 1,
            EaforgeError::ConfigParse { .. }
            | EaforgeError::ConfigMissing { .. }
            | EaforgeError::ConfigInvalid { .. }
            | EaforgeError::InvalidSettings { .. } => 2,
            EaforgeError::InvalidDocument { .. }
            | EaforgeError::UnknownNodeType { .. }
            | EaforgeError::DuplicateNodeId(_)
            | EaforgeError::Json(_) => 3,
            EaforgeError::Structural { .. }
            | EaforgeError::TransformReapplied { .. }
            | EaforgeError::TransformIncomplete { .. } => 4,
            EaforgeError::Chain(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
