//! Bounded per-session conversation memory.
//!
//! Each session sits behind its own async mutex. A request that holds the
//! session guard from history read through the final append cannot
//! interleave with another request for the same session, while distinct
//! sessions never contend.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::ChatTurn;

/// Conversation history of one session, at most `2 * window` turns.
#[derive(Debug, Clone)]
pub struct ChatSession {
    session_id: String,
    turns: VecDeque<ChatTurn>,
    window: usize,
}

impl ChatSession {
    pub fn new(session_id: impl Into<String>, window: usize) -> Self {
        Self {
            session_id: session_id.into(),
            turns: VecDeque::new(),
            window,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn, evicting the oldest turns beyond the window.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.window * 2 {
            self.turns.pop_front();
        }
    }

    /// Append one user/assistant round trip.
    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.push(ChatTurn::user(question));
        self.push(ChatTurn::assistant(answer));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

pub type SessionHandle = Arc<Mutex<ChatSession>>;

/// Keyed store of chat sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    window: usize,
}

impl SessionStore {
    pub fn new(window: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Get the session, creating an empty one on first use.
    pub fn get_or_create(&self, session_id: &str) -> SessionHandle {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "Creating session");
                Arc::new(Mutex::new(ChatSession::new(session_id, self.window)))
            })
            .clone()
    }

    /// Lock a session for the duration of a request.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<ChatSession> {
        self.get_or_create(session_id).lock_owned().await
    }

    pub async fn append(&self, session_id: &str, turn: ChatTurn) {
        self.lock(session_id).await.push(turn);
    }

    /// Snapshot of the session's turns, oldest first.
    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        match self.existing(session_id) {
            Some(handle) => handle.lock().await.turns().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Empty a session's history.
    ///
    /// Idempotent: clearing a session that was never seen is a no-op and
    /// still succeeds.
    pub async fn clear(&self, session_id: &str) -> bool {
        match self.existing(session_id) {
            Some(handle) => {
                handle.lock().await.clear();
                tracing::info!(session_id, "Session cleared");
            }
            None => tracing::debug!(session_id, "No session to clear"),
        }
        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn existing(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }
}
