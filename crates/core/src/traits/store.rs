//! External session store trait
//!
//! The persistent store is a collaborator: calls are fire-and-forget from
//! the pipeline's perspective. Failures are logged and never fatal.

use crate::Result;
use async_trait::async_trait;

/// Persistent session/message store
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Record a new session. Best-effort; the caller logs failures and
    /// continues.
    async fn create_session(&self, session_id: &str, user_id: &str) -> Result<()>;

    /// Append one conversation message to a session's transcript.
    async fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;

    /// Mark a session ended.
    async fn end_session(&self, session_id: &str) -> Result<()>;
}
