//! Grounded answer generation.
//!
//! The retrieved chunks are joined, best first, into one context block.
//! The instruction confines the model to that context and asks for the
//! literal [`REFUSAL`] when the context does not contain the answer. That
//! is a request to the model, not something checked here: a model can
//! still ignore it.

use docqa_core::chat::{ChatMessage, ChatModel};
use docqa_core::error::ModelError;
use docqa_core::models::Chunk;

/// Reply expected when the context does not hold the answer.
pub const REFUSAL: &str = "I don't know.";

pub const QA_INSTRUCTION: &str = "You are a helpful assistant. Use ONLY the provided context \
to answer the question. If the answer is not in the context, reply exactly: 'I don't know.' \
Keep your answer brief and to the point.";

/// Separator placed between chunks in the context block.
const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Whether the model returned the refusal sentinel.
    pub refused: bool,
}

pub fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn answer_messages(query: &str, chunks: &[Chunk]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(QA_INSTRUCTION),
        ChatMessage::system(format!("Context:\n{}", build_context(chunks))),
        ChatMessage::user(query),
    ]
}

/// Answer `query` from `chunks` only.
pub async fn generate(
    model: &dyn ChatModel,
    query: &str,
    chunks: &[Chunk],
) -> Result<Answer, ModelError> {
    let reply = model.complete(&answer_messages(query, chunks)).await?;
    let text = match reply.trim() {
        "" => REFUSAL.to_string(),
        t => t.to_string(),
    };
    let refused = is_refusal(&text);
    Ok(Answer { text, refused })
}

/// Tolerates surrounding quotes and a missing final period.
pub fn is_refusal(text: &str) -> bool {
    let t = text.trim().trim_matches(|c: char| c == '\'' || c == '"').trim_end_matches('.');
    t.eq_ignore_ascii_case(REFUSAL.trim_end_matches('.'))
}
