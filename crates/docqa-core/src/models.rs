//! Core data types shared by the ingestion and query paths.

use serde::{Deserialize, Serialize};

/// A bounded fragment of a normalized document, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Identifier of the document the chunk was cut from (the upload name).
    pub document_id: String,
    /// Position in the document; contiguous from 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}
