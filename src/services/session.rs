//! Per-session ownership of conversation state. Steps within one session
//! are strictly sequential (a per-key async mutex), while distinct sessions
//! proceed in parallel. The facade never propagates an internal failure to
//! the front-end: any error becomes a fixed apology pointing at the phone
//! fallback.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::models::ConversationState;
use crate::services::dialogue;
use crate::state::AppState;

type SessionHandle = Arc<AsyncMutex<ConversationState>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle for a session, creating a fresh greeting-stage state on
    /// first contact.
    pub fn entry(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(ConversationState::new(session_id))))
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }
}

pub async fn process_message(state: &Arc<AppState>, session_id: &str, message: &str) -> String {
    let handle = state.sessions.entry(session_id);
    let mut conv = handle.lock().await;

    match dialogue::step(state, &mut conv, message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(session = session_id, error = %e, "conversation step failed");
            format!(
                "I'm sorry, I ran into a technical problem. Please try again, or call our \
                 office at {} for assistance.",
                state.config.clinic_phone
            )
        }
    }
}

/// Reinstall a fresh state for the session. Resetting an untouched or
/// unknown session is a no-op that still reports success, so the call is
/// idempotent.
pub async fn reset_conversation(state: &Arc<AppState>, session_id: &str) -> bool {
    let handle = state.sessions.entry(session_id);
    let mut conv = handle.lock().await;
    *conv = ConversationState::new(session_id);
    true
}

/// Diagnostic snapshot of a session's current state.
pub async fn get_state(state: &Arc<AppState>, session_id: &str) -> Option<ConversationState> {
    match state.sessions.get(session_id) {
        Some(handle) => Some(handle.lock().await.clone()),
        None => None,
    }
}
