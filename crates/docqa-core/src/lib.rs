//! # docqa Core
//!
//! Shared, I/O-free logic for docqa: text normalization, chunking, the
//! vector index, conversation state, and the traits that model backends
//! implement.
//!
//! This crate contains no tokio, sqlx, filesystem, or network code. The
//! `docqa` application crate supplies concrete embedding and chat
//! providers, persistence, and the request orchestration.

pub mod chat;
pub mod chunk;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod normalize;
