//! Concurrent, session-keyed conversation store.
//!
//! Each session id maps to one live [`ConversationState`] behind its own
//! lock. [`ConversationStore::get_or_create`] is atomic per id: concurrent
//! first access from several requests yields the same shared state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use docqa_core::conversation::{ConversationState, ConversationTurn};

pub type SharedConversation = Arc<Mutex<ConversationState>>;

#[derive(Default)]
pub struct ConversationStore {
    states: Mutex<HashMap<String, SharedConversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live state for `session_id`, creating it on first access.
    pub fn get_or_create(&self, session_id: &str) -> SharedConversation {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            states
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new()))),
        )
    }

    pub fn append(&self, session_id: &str, turn: ConversationTurn) {
        let state = self.get_or_create(session_id);
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.push(turn);
    }

    /// Append several turns without letting another writer interleave.
    pub fn append_all(&self, session_id: &str, turns: impl IntoIterator<Item = ConversationTurn>) {
        let state = self.get_or_create(session_id);
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        for turn in turns {
            state.push(turn);
        }
    }

    /// Copy of the current turns, or an empty state for an unknown id.
    pub fn snapshot(&self, session_id: &str) -> ConversationState {
        let state = {
            let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            states.get(session_id).cloned()
        };
        let Some(state) = state else {
            return ConversationState::new();
        };
        let snapshot = state.lock().unwrap_or_else(PoisonError::into_inner).clone();
        snapshot
    }

    pub fn remove(&self, session_id: &str) -> bool {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
