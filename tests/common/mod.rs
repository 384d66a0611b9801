//! Shared fixtures for the integration tests.
//!
//! [`ScriptedModel`] is a deterministic stand-in for a chat model. It
//! recognises the two prompts the pipeline sends:
//!
//! - **reformulation** (first message is the rewrite instruction): returns
//!   the latest question with the word "its" replaced by the model's topic.
//! - **answering** (a `Context:` system message is present): returns the
//!   context sentence sharing the most keywords with the question, or the
//!   refusal sentence when no sentence shares any. Asked for the main
//!   point, it returns the first context sentence.
//!
//! Embeddings come from the network-free hash provider, so retrieval is by
//! shared vocabulary.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa::config::Config;
use docqa::embedding::HashProvider;
use docqa::generate::REFUSAL;
use docqa::pipeline::Pipeline;
use docqa::reformulate::REFORMULATE_INSTRUCTION;
use docqa_core::chat::{ChatMessage, ChatModel, ChatRole};
use docqa_core::error::ModelError;
use tempfile::TempDir;

pub const PHOTOSYNTHESIS: &str = "Photosynthesis is the process by which green plants \
convert light energy into chemical energy.\n\n\
The products of photosynthesis are glucose and oxygen. Oxygen is released into the air.\n\n\
Chlorophyll absorbs mostly blue and red light, which is why leaves look green.";

pub const VOLCANOES: &str = "A volcano is an opening in the crust through which magma \
escapes.\n\n\
Basaltic lava flows are runny, while andesitic eruptions tend to be explosive.";

const STOPWORDS: &[&str] = &[
    "what", "which", "when", "where", "does", "about", "with", "this", "that", "from", "there",
    "their", "they", "have", "were", "into", "main", "point", "document", "tell",
];

pub struct ScriptedModel {
    topic: String,
    delay: Option<Duration>,
    failures: Mutex<VecDeque<ModelError>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            delay: None,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next calls with these errors, in order.
    pub fn failing_with(self, errors: Vec<ModelError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn rewrite(&self, messages: &[ChatMessage]) -> String {
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        question
            .split(' ')
            .map(|w| if w == "its" { self.topic.as_str() } else { w })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn answer(&self, context: &str, question: &str) -> String {
        if question.to_lowercase().contains("main point") {
            return sentences(context)
                .first()
                .map_or_else(|| REFUSAL.to_string(), |s| s.to_string());
        }
        let keywords: Vec<String> = words(question)
            .into_iter()
            .filter(|w| w.len() > 3 && !STOPWORDS.contains(&w.as_str()))
            .collect();

        let mut best: Option<(usize, &str)> = None;
        for sentence in sentences(context) {
            let sentence_words = words(sentence);
            let hits = keywords
                .iter()
                .filter(|k| sentence_words.contains(k))
                .count();
            if hits > 0 && best.map_or(true, |(n, _)| hits > n) {
                best = Some((hits, sentence));
            }
        }
        match best {
            Some((_, sentence)) => sentence.to_string(),
            None => REFUSAL.to_string(),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        if messages.first().map(|m| m.content.as_str()) == Some(REFORMULATE_INSTRUCTION) {
            return Ok(self.rewrite(messages));
        }
        let context = messages
            .iter()
            .find_map(|m| m.content.strip_prefix("Context:\n"))
            .unwrap_or_default();
        let question = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(self.answer(context, question))
    }
}

pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

fn sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '?', '!'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Config with a per-test working directory and short model deadlines.
pub fn test_config(workdir: &TempDir) -> Config {
    let mut config = Config::default();
    config.embedding.provider = "hash".to_string();
    config.llm.provider = "disabled".to_string();
    config.chunking.max_chars = 120;
    config.pipeline.call_timeout_ms = 2_000;
    config.pipeline.retry_backoff_ms = 10;
    config.sessions.workdir = workdir.path().join("sessions");
    config
}

pub fn pipeline_with(config: Config, model: Arc<ScriptedModel>) -> Pipeline {
    Pipeline::new(config, Arc::new(HashProvider::new(256)), model)
}
