//! History-aware query reformulation.
//!
//! A follow-up like "What about its limitations?" is meaningless to the
//! vector index on its own. [`reformulate`] asks the chat model to restate
//! it as a standalone question using the prior turns. With no history
//! there is nothing to resolve and the question is returned as is.

use docqa_core::chat::{ChatMessage, ChatModel};
use docqa_core::conversation::ConversationState;
use docqa_core::error::ModelError;

pub const REFORMULATE_INSTRUCTION: &str = "You are an assistant that rewrites the user's \
latest question so that it is fully self-contained and unambiguous, using the previous \
conversation to resolve pronouns and references. Do not answer the question. Reply with \
the rewritten question only.";

/// Messages sent to the model: the instruction, the prior turns in order,
/// then the question.
pub fn reformulation_messages(question: &str, history: &ConversationState) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(REFORMULATE_INSTRUCTION));
    messages.extend(history.turns().iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(question));
    messages
}

/// Rewrite `question` into a standalone query given `history`.
pub async fn reformulate(
    model: &dyn ChatModel,
    question: &str,
    history: &ConversationState,
) -> Result<String, ModelError> {
    if history.is_empty() {
        return Ok(question.to_string());
    }
    let rewritten = model
        .complete(&reformulation_messages(question, history))
        .await?;
    let rewritten = rewritten.trim();
    if rewritten.is_empty() {
        return Ok(question.to_string());
    }
    Ok(rewritten.to_string())
}
