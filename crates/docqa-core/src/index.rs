//! In-memory vector index over one document's chunks.
//!
//! [`build_index`] embeds every chunk with an [`EmbeddingProvider`] and
//! records the provider's [`EmbeddingSignature`]. [`search`] embeds a query
//! with a provider that must carry the same signature and returns the
//! nearest chunks by cosine similarity.
//!
//! Search is brute force. One index holds a single document, so a linear
//! scan over a few hundred vectors is cheaper than maintaining a graph.
//!
//! # Ordering
//!
//! Results are sorted by descending similarity; equal scores keep source
//! order (lower `chunk_index` first). For a fixed index and provider the
//! same query always yields the same ordered results.

use std::collections::HashMap;

use thiserror::Error;

use crate::embedding::{cosine_similarity, EmbeddingProvider, EmbeddingSignature};
use crate::error::ModelError;
use crate::models::{Chunk, ScoredChunk};

/// Default number of chunks returned by [`search`].
pub const DEFAULT_TOP_K: usize = 3;

/// Errors from building or querying a [`VectorIndex`].
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cannot build an index from zero chunks")]
    NoChunks,

    #[error("embedding failed: {0}")]
    Embedding(#[from] ModelError),

    #[error("embedding provider returned {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("vector has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index was built with embedding function {index}, query uses {query}")]
    SignatureMismatch {
        index: EmbeddingSignature,
        query: EmbeddingSignature,
    },
}

/// A chunk and its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Mapping from chunk id to (vector, chunk), in source order.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    signature: EmbeddingSignature,
    entries: Vec<IndexEntry>,
    by_id: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new(signature: EmbeddingSignature) -> Self {
        Self {
            signature,
            entries: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Insert a chunk with its vector. A chunk id that is already present
    /// keeps its first vector.
    pub fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.signature.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.signature.dims,
                got: vector.len(),
            });
        }
        if self.by_id.contains_key(&chunk.id) {
            return Ok(());
        }
        self.by_id.insert(chunk.id.clone(), self.entries.len());
        self.entries.push(IndexEntry { chunk, vector });
        Ok(())
    }

    pub fn signature(&self) -> &EmbeddingSignature {
        &self.signature
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, chunk_id: &str) -> Option<&IndexEntry> {
        self.by_id.get(chunk_id).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries nearest to `query_vec`.
    pub fn nearest(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        scored.truncate(k);
        scored
    }
}

/// Embed `chunks` in batches of `batch_size` and build a fresh index.
pub async fn build_index(
    chunks: Vec<Chunk>,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<VectorIndex, IndexError> {
    if chunks.is_empty() {
        return Err(IndexError::NoChunks);
    }

    let mut index = VectorIndex::new(provider.signature());
    let mut chunks = chunks.into_iter().peekable();
    while chunks.peek().is_some() {
        let batch: Vec<Chunk> = chunks.by_ref().take(batch_size.max(1)).collect();
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = provider.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(IndexError::CountMismatch {
                expected: batch.len(),
                got: vectors.len(),
            });
        }
        for (chunk, vector) in batch.into_iter().zip(vectors) {
            index.insert(chunk, vector)?;
        }
    }
    Ok(index)
}

/// Embed `query` and return up to `k` nearest chunks, best first.
///
/// Fails with [`IndexError::SignatureMismatch`] if `provider` is not the
/// embedding function the index was built with.
pub async fn search(
    index: &VectorIndex,
    provider: &dyn EmbeddingProvider,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredChunk>, IndexError> {
    let query_sig = provider.signature();
    if &query_sig != index.signature() {
        return Err(IndexError::SignatureMismatch {
            index: index.signature().clone(),
            query: query_sig,
        });
    }

    let mut vectors = provider.embed(&[query.to_string()]).await?;
    if vectors.len() != 1 {
        return Err(IndexError::CountMismatch {
            expected: 1,
            got: vectors.len(),
        });
    }
    let query_vec = vectors.remove(0);
    if query_vec.len() != index.signature().dims {
        return Err(IndexError::DimensionMismatch {
            expected: index.signature().dims,
            got: query_vec.len(),
        });
    }
    Ok(index.nearest(&query_vec, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::chunk::chunk_text;

    /// Embeds text as letter-frequency counts over `a..=z`.
    struct LetterProvider {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl LetterProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterProvider {
        fn model_name(&self) -> &str {
            self.name
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes() {
                        if c.is_ascii_lowercase() {
                            v[(c - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    struct DownProvider;

    #[async_trait]
    impl EmbeddingProvider for DownProvider {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
            Err(ModelError::Unavailable("connection refused".into()))
        }
    }

    fn chunks_of(texts: &[&str]) -> Vec<Chunk> {
        let joined = texts.join("\n\n");
        chunk_text("doc", &joined, 6, 0)
    }

    #[tokio::test]
    async fn test_build_rejects_empty_chunk_list() {
        let provider = LetterProvider::new("letters");
        let err = build_index(Vec::new(), &provider, 8).await.unwrap_err();
        assert!(matches!(err, IndexError::NoChunks));
    }

    #[tokio::test]
    async fn test_build_propagates_embedding_failure() {
        let chunks = chunks_of(&["aaaa"]);
        let err = build_index(chunks, &DownProvider, 8).await.unwrap_err();
        assert!(matches!(err, IndexError::Embedding(ModelError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_build_batches_calls() {
        let chunks = chunks_of(&["aaaa", "bbbb", "cccc", "dddd", "eeee"]);
        assert_eq!(chunks.len(), 5);
        let provider = LetterProvider::new("letters");
        let index = build_index(chunks, &provider, 2).await.unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let chunks = chunks_of(&["aaaa", "bbbb", "abab"]);
        let provider = LetterProvider::new("letters");
        let index = build_index(chunks, &provider, 16).await.unwrap();

        let results = search(&index, &provider, "bbbbbb", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].chunk.text.starts_with("bbbb"));
        assert!(results[1].chunk.text.starts_with("abab"));
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[tokio::test]
    async fn test_search_limits_to_k() {
        let chunks = chunks_of(&["aaaa", "bbbb", "cccc", "dddd"]);
        let provider = LetterProvider::new("letters");
        let index = build_index(chunks, &provider, 16).await.unwrap();
        assert_eq!(search(&index, &provider, "abcd", 2).await.unwrap().len(), 2);
        assert_eq!(search(&index, &provider, "abcd", 10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_ties_keep_source_order() {
        let chunks = chunks_of(&["zzzz", "aaaa", "aaaa", "aaaa"]);
        let provider = LetterProvider::new("letters");
        let index = build_index(chunks, &provider, 16).await.unwrap();
        let results = search(&index, &provider, "a", 3).await.unwrap();
        let order: Vec<i64> = results.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let chunks = chunks_of(&["abc", "cab", "bca", "xyz"]);
        let provider = LetterProvider::new("letters");
        let index = build_index(chunks, &provider, 16).await.unwrap();
        let a = search(&index, &provider, "abc", 3).await.unwrap();
        let b = search(&index, &provider, "abc", 3).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_search_rejects_other_embedding_function() {
        let chunks = chunks_of(&["aaaa"]);
        let builder = LetterProvider::new("letters");
        let index = build_index(chunks, &builder, 16).await.unwrap();

        let other = LetterProvider::new("letters-v2");
        let err = search(&index, &other, "a", 3).await.unwrap_err();
        assert!(matches!(err, IndexError::SignatureMismatch { .. }));
        assert_eq!(other.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_insert_checks_dimensions() {
        let mut index = VectorIndex::new(EmbeddingSignature {
            model: "m".into(),
            dims: 3,
        });
        let chunk = chunk_text("doc", "text", 10, 0).remove(0);
        let err = index.insert(chunk, vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn test_get_by_chunk_id() {
        let mut index = VectorIndex::new(EmbeddingSignature {
            model: "m".into(),
            dims: 2,
        });
        let chunk = chunk_text("doc", "text", 10, 0).remove(0);
        let id = chunk.id.clone();
        index.insert(chunk, vec![1.0, 0.0]).unwrap();
        assert_eq!(index.get(&id).map(|e| e.vector.clone()), Some(vec![1.0, 0.0]));
        assert!(index.get("missing").is_none());
    }
}
