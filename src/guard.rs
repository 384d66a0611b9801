//! Deadline and retry policy for model calls.
//!
//! Every embedding and chat call made by the pipeline goes through
//! [`CallPolicy::run`]: the call is bounded by `timeout`, and a transient
//! failure ([`ModelError::is_transient`]) is retried exactly once after
//! `backoff`. [`GuardedEmbedder`] and [`GuardedChat`] apply the policy
//! behind the core traits so index build, search, reformulation and
//! generation need no knowledge of it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::chat::{ChatMessage, ChatModel};
use docqa_core::embedding::{EmbeddingProvider, EmbeddingSignature};
use docqa_core::error::ModelError;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub backoff: Duration,
}

impl CallPolicy {
    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        match self.attempt(&mut call).await {
            Err(e) if e.is_transient() => {
                warn!(call = what, error = %e, "transient model failure, retrying once");
                tokio::time::sleep(self.backoff).await;
                self.attempt(&mut call).await
            }
            other => other,
        }
    }

    async fn attempt<T, F, Fut>(&self, call: &mut F) -> Result<T, ModelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ModelError>>,
    {
        match tokio::time::timeout(self.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.timeout)),
        }
    }
}

/// An [`EmbeddingProvider`] whose calls run under a [`CallPolicy`].
pub struct GuardedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    policy: CallPolicy,
}

impl GuardedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, policy: CallPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl EmbeddingProvider for GuardedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    fn signature(&self) -> EmbeddingSignature {
        self.inner.signature()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        self.policy.run("embed", || self.inner.embed(texts)).await
    }
}

/// A [`ChatModel`] whose calls run under a [`CallPolicy`].
pub struct GuardedChat {
    inner: Arc<dyn ChatModel>,
    policy: CallPolicy,
}

impl GuardedChat {
    pub fn new(inner: Arc<dyn ChatModel>, policy: CallPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ChatModel for GuardedChat {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        self.policy.run("chat", || self.inner.complete(messages)).await
    }
}
