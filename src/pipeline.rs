//! Request orchestration.
//!
//! [`Pipeline`] owns the model backends, the [`SessionRegistry`] and the
//! [`ConversationStore`], and runs the two operations the boundary needs:
//!
//! - **ingest**: extract → normalize → chunk → embed → persist, producing a
//!   new `Ready` session. Any failure aborts creation; the session id is
//!   never published and its working directory is removed.
//! - **query**: reformulate → search → generate → append turns, under the
//!   session's lock so queries on one session never interleave.
//!
//! Every model call is bounded by `pipeline.call_timeout_ms` and retried
//! once after `pipeline.retry_backoff_ms` when the failure is transient.
//! Turns are appended only after a successful answer, so a failed or timed
//! out query leaves the conversation untouched.

use std::sync::Arc;

use anyhow::Result;
use docqa_core::chat::ChatModel;
use docqa_core::chunk::chunk_text;
use docqa_core::conversation::ConversationTurn;
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::index::{build_index, search, IndexError, VectorIndex};
use docqa_core::models::Chunk;
use docqa_core::normalize::normalize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::embedding::create_provider;
use crate::error::{RagError, Stage};
use crate::extract::{DocumentFormat, ExtractError};
use crate::generate::generate;
use crate::guard::{CallPolicy, GuardedChat, GuardedEmbedder};
use crate::index_store::IndexStore;
use crate::llm::create_chat_model;
use crate::reformulate::reformulate;
use crate::session::{Session, SessionPhase, SessionRegistry};

/// Returns a querying session to `Ready` when dropped.
struct ReadyOnDrop<'a>(&'a Session);

impl Drop for ReadyOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_phase(SessionPhase::Ready);
        self.0.touch();
    }
}

/// A retrieved chunk's position and similarity, without its text.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    pub chunk_index: i64,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub answer: String,
    pub session_id: String,
    /// The question after reformulation; what was actually searched.
    pub standalone_query: String,
    pub refused: bool,
    pub sources: Vec<SourceRef>,
}

pub struct Pipeline {
    config: Arc<Config>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    sessions: SessionRegistry,
    conversations: ConversationStore,
}

impl Pipeline {
    /// Build a pipeline around explicit backends. Both are wrapped in the
    /// configured timeout and retry policy.
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        let policy = CallPolicy {
            timeout: config.pipeline.call_timeout(),
            backoff: config.pipeline.retry_backoff(),
        };
        let sessions = SessionRegistry::new(config.sessions.ttl());
        Self {
            embedder: Arc::new(GuardedEmbedder::new(embedder, policy)),
            chat: Arc::new(GuardedChat::new(chat, policy)),
            sessions,
            conversations: ConversationStore::new(),
            config: Arc::new(config),
        }
    }

    /// Build a pipeline with the providers named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let chat = create_chat_model(&config.llm)?;
        info!(
            embedding = %embedder.signature(),
            llm = chat.model_name(),
            "pipeline initialised"
        );
        Ok(Self::new(config, embedder, chat))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Phase of a registered session. Closed sessions are unregistered.
    pub fn session_phase(&self, session_id: &str) -> Option<SessionPhase> {
        self.sessions.get(session_id).map(|s| s.phase())
    }

    /// Create a session from an uploaded document and return its id.
    pub async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<String, RagError> {
        let format = DocumentFormat::from_filename(filename).map_err(|e| match e {
            ExtractError::UnsupportedExtension(ext) => RagError::UnsupportedFormat(ext),
            other => RagError::DocumentUnreadable(other.to_string()),
        })?;

        let size = bytes.len();
        let raw = tokio::task::spawn_blocking(move || format.extract(&bytes))
            .await
            .map_err(|e| RagError::DocumentUnreadable(format!("extraction task failed: {}", e)))?
            .map_err(|e| RagError::DocumentUnreadable(e.to_string()))?;

        let text = normalize(&raw);
        if text.is_empty() {
            return Err(RagError::EmptyDocument);
        }

        let session_id = Uuid::new_v4().to_string();
        let store = IndexStore::for_session(&self.config.sessions.workdir, &session_id);
        let session = Arc::new(Session::new(
            session_id.clone(),
            filename.to_string(),
            store,
        ));
        info!(
            session_id = %session_id,
            format = ?format,
            bytes = size,
            chars = text.len(),
            "session created"
        );

        let mut guard = session.lock().await;
        let index = match self.build(&session, &text).await {
            Ok(index) => index,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "ingest aborted");
                if let Err(cleanup) = session.store().destroy().await {
                    warn!(session_id = %session_id, error = %cleanup, "failed to clean up session directory");
                }
                return Err(e);
            }
        };
        session.set_phase(SessionPhase::Indexed);
        info!(session_id = %session_id, chunks = index.len(), "document indexed");
        *guard = Some(index);
        session.set_phase(SessionPhase::Ready);
        drop(guard);

        self.sessions.insert(session);
        Ok(session_id)
    }

    async fn build(&self, session: &Session, text: &str) -> Result<VectorIndex, RagError> {
        let chunks = chunk_text(
            session.filename(),
            text,
            self.config.chunking.max_chars,
            self.config.chunking.overlap_chars,
        );
        debug!(session_id = session.id(), chunks = chunks.len(), "chunked document");

        let index = build_index(chunks, self.embedder.as_ref(), self.config.embedding.batch_size)
            .await
            .map_err(|e| RagError::IndexBuild(e.to_string()))?;
        session
            .store()
            .save(&index)
            .await
            .map_err(|e| RagError::IndexBuild(format!("{:#}", e)))?;
        Ok(index)
    }

    /// Answer `question` within a session.
    pub async fn query(&self, session_id: &str, question: &str) -> Result<QueryOutcome, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidRequest("question must not be empty".to_string()));
        }
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;

        let mut guard = session.lock().await;
        if session.phase() == SessionPhase::Closed {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }
        session.set_phase(SessionPhase::Querying);
        session.touch();
        // Declared after the index lock so it runs first on drop, including
        // when the caller abandons the query mid-flight.
        let _ready = ReadyOnDrop(&session);

        self.answer(&session, &mut guard, question).await
    }

    async fn answer(
        &self,
        session: &Session,
        index: &mut Option<VectorIndex>,
        question: &str,
    ) -> Result<QueryOutcome, RagError> {
        let session_id = session.id();
        if !session.store().exists() {
            return Err(RagError::Retrieval(format!(
                "index store for session {} is missing",
                session_id
            )));
        }
        if index.is_none() {
            let loaded = session
                .store()
                .load()
                .await
                .map_err(|e| RagError::Retrieval(format!("{:#}", e)))?;
            *index = Some(loaded);
        }
        let Some(index) = index.as_ref() else {
            return Err(RagError::Retrieval("index not loaded".to_string()));
        };

        let history = self.conversations.snapshot(session_id);
        let standalone = reformulate(self.chat.as_ref(), question, &history)
            .await
            .map_err(|e| RagError::from_model(Stage::Reformulate, e))?;
        debug!(
            session_id,
            turns = history.len(),
            question_chars = question.len(),
            standalone_chars = standalone.len(),
            "reformulated question"
        );

        let hits = search(
            index,
            self.embedder.as_ref(),
            &standalone,
            self.config.retrieval.top_k,
        )
        .await
        .map_err(|e| match e {
            IndexError::Embedding(m) => RagError::from_model(Stage::Embed, m),
            other => RagError::Retrieval(other.to_string()),
        })?;
        let sources: Vec<SourceRef> = hits
            .iter()
            .map(|h| SourceRef {
                chunk_index: h.chunk.chunk_index,
                score: h.score,
            })
            .collect();
        let chunks: Vec<Chunk> = hits.into_iter().map(|h| h.chunk).collect();

        let answer = generate(self.chat.as_ref(), &standalone, &chunks)
            .await
            .map_err(|e| RagError::from_model(Stage::Generate, e))?;

        self.conversations.append_all(
            session_id,
            [
                ConversationTurn::user(question),
                ConversationTurn::assistant(answer.text.clone()),
            ],
        );
        info!(
            session_id,
            retrieved = chunks.len(),
            refused = answer.refused,
            "query answered"
        );

        Ok(QueryOutcome {
            answer: answer.text,
            session_id: session_id.to_string(),
            standalone_query: standalone,
            refused: answer.refused,
            sources,
        })
    }

    /// Conversation turns of a live session, oldest first.
    pub fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, RagError> {
        if self.sessions.get(session_id).is_none() {
            return Err(RagError::SessionNotFound(session_id.to_string()));
        }
        Ok(self.conversations.snapshot(session_id).turns().to_vec())
    }

    /// Close a session: unregister it, drop its conversation and index and
    /// delete its working directory. Waits for an in-flight query to finish.
    pub async fn close(&self, session_id: &str) -> Result<(), RagError> {
        let session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| RagError::SessionNotFound(session_id.to_string()))?;
        let mut guard = session.lock().await;
        session.set_phase(SessionPhase::Closed);
        *guard = None;
        drop(guard);

        self.conversations.remove(session_id);
        if let Err(e) = session.store().destroy().await {
            warn!(session_id, error = %e, "failed to remove session directory");
        }
        info!(session_id, "session closed");
        Ok(())
    }

    /// Close every session idle for longer than the configured TTL.
    /// Returns how many were closed.
    pub async fn evict_expired(&self) -> usize {
        let mut closed = 0;
        for id in self.sessions.expired() {
            if self.close(&id).await.is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "evicted idle sessions");
        }
        closed
    }
}
