//! # docqa
//!
//! Ask natural-language questions about a single uploaded document.
//!
//! Each upload becomes a **session**: the document is normalized, chunked,
//! embedded and indexed once, and every question in the session is
//! answered from that index alone. Follow-up questions are rewritten into
//! standalone queries from the session's conversation before retrieval.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ extract ─▶ normalize ─▶ chunk ─▶ embed ─▶ index.sqlite
//!                                                        │
//!  question ─▶ reformulate ─▶ search ◀──────────────────┘
//!     ▲                         │
//!     │                         ▼
//!  history ◀── append ◀──── generate ─▶ answer
//! ```
//!
//! Pure logic (normalization, chunking, the vector index, model traits)
//! lives in `docqa-core`; this crate adds I/O, providers and orchestration.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy returned to callers |
//! | [`extract`] | PDF, DOCX and plain-text extraction |
//! | [`embedding`] | Embedding providers (fastembed, OpenAI, Ollama, hashing) |
//! | [`llm`] | Chat-model providers (Gemini, OpenAI, Ollama) |
//! | [`guard`] | Timeout and single-retry policy for model calls |
//! | [`index_store`] | Per-session SQLite index files |
//! | [`conversation`] | Concurrent per-session conversation store |
//! | [`session`] | Session phases and registry |
//! | [`reformulate`] | History-aware question rewriting |
//! | [`generate`] | Closed-context answer generation |
//! | [`pipeline`] | Ingest and query orchestration |
//! | [`server`] | HTTP server |

pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod guard;
mod http;
pub mod index_store;
pub mod llm;
pub mod pipeline;
pub mod reformulate;
pub mod server;
pub mod session;
