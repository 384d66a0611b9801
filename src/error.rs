//! Error taxonomy surfaced by the pipeline to its callers.
//!
//! Every [`RagError`] has a stable machine-readable [`code`](RagError::code)
//! that the HTTP layer puts in its error body. Messages carry ids, counts,
//! file extensions and provider detail; never document or chunk text.

use std::fmt;
use std::time::Duration;

use docqa_core::error::ModelError;
use thiserror::Error;

/// Which model-backed step of a query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reformulate,
    Embed,
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Reformulate => "reformulation",
            Stage::Embed => "query embedding",
            Stage::Generate => "answer generation",
        })
    }
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("unsupported document format '{0}': expected .txt, .pdf or .docx")]
    UnsupportedFormat(String),

    #[error("document contains no usable text")]
    EmptyDocument,

    #[error("document could not be read: {0}")]
    DocumentUnreadable(String),

    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("{stage} timed out after {elapsed:?}")]
    ModelTimeout { stage: Stage, elapsed: Duration },

    #[error("{stage} failed: {reason}")]
    ModelUnavailable { stage: Stage, reason: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RagError {
    /// Classify a model failure that happened during `stage` of a query.
    pub fn from_model(stage: Stage, err: ModelError) -> Self {
        match err {
            ModelError::Timeout(elapsed) => RagError::ModelTimeout { stage, elapsed },
            other => RagError::ModelUnavailable {
                stage,
                reason: other.to_string(),
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RagError::UnsupportedFormat(_) => "unsupported_format",
            RagError::EmptyDocument => "empty_document",
            RagError::DocumentUnreadable(_) => "unreadable_document",
            RagError::IndexBuild(_) => "index_build",
            RagError::Retrieval(_) => "retrieval",
            RagError::ModelTimeout { .. } => "model_timeout",
            RagError::ModelUnavailable { .. } => "model_unavailable",
            RagError::SessionNotFound(_) => "session_not_found",
            RagError::InvalidRequest(_) => "bad_request",
        }
    }
}
