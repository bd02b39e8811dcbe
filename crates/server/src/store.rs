//! In-memory session store
//!
//! Default implementation of the external store collaborator. Production
//! deployments point the registry at a real persistence service; this one
//! keeps transcripts in memory for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use voice_assistant_core::{Result, SessionStore};

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    user_id: String,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    messages: Vec<StoredMessage>,
}

/// HashMap-backed session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages stored for a session (test/introspection helper)
    pub fn messages(&self, session_id: &str) -> Vec<StoredMessage> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Owner and lifetime of a session, if recorded
    pub fn session_info(
        &self,
        session_id: &str,
    ) -> Option<(String, DateTime<Utc>, Option<DateTime<Utc>>)> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| (s.user_id.clone(), s.created_at, s.ended_at))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.sessions.write().insert(
            session_id.to_string(),
            StoredSession {
                user_id: user_id.to_string(),
                created_at: Utc::now(),
                ended_at: None,
                messages: Vec::new(),
            },
        );
        tracing::debug!(session_id, user_id, "session record created");
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(session_id) {
            session.messages.push(StoredMessage {
                role: role.to_string(),
                content: content.to_string(),
                metadata,
                at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> Result<()> {
        if let Some(session) = self.sessions.write().get_mut(session_id) {
            session.ended_at = Some(Utc::now());
        }
        Ok(())
    }
}
