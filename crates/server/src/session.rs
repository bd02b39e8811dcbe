//! Session registry
//!
//! Tracks every live conversation and exclusively owns id -> Session; the
//! turn pipeline only borrows a session for the duration of a turn.
//! `open` persists a record externally best-effort and performs the
//! `connected` handshake with bounded retries; `close` is idempotent.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};

use voice_assistant_command::CommandQueue;
use voice_assistant_core::SessionStore;
use voice_assistant_pipeline::{AudioIntakeBuffer, DialogState, InterruptFlag};

use crate::wire::ServerMessage;
use crate::ServerError;

/// Handshake retry policy: 3 attempts, 50ms apart
const HANDSHAKE_RETRIES: u32 = 3;
const HANDSHAKE_BACKOFF: Duration = Duration::from_millis(50);

/// Minimum gap between repeated post-close send warnings per cause
const SEND_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Write half of a client connection
///
/// Sends never surface as failures: once the transport is closed, frames
/// are dropped with a warning throttled to one per second per cause.
pub struct OutboundHandle {
    tx: mpsc::Sender<ServerMessage>,
    last_warned: Mutex<HashMap<&'static str, Instant>>,
}

impl OutboundHandle {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            tx,
            last_warned: Mutex::new(HashMap::new()),
        }
    }

    /// Send a frame, dropping it (with a throttled warning) if the
    /// transport has closed.
    pub async fn send(&self, message: ServerMessage, cause: &'static str) {
        if self.tx.send(message).await.is_err() {
            self.warn_dropped(cause);
        }
    }

    /// Send a frame and report failure - handshake only
    pub async fn send_checked(&self, message: ServerMessage) -> Result<(), ServerError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ServerError::WebSocket("transport closed".into()))
    }

    fn warn_dropped(&self, cause: &'static str) {
        let mut last = self.last_warned.lock();
        let now = Instant::now();
        let warn = match last.get(cause) {
            Some(prev) => now.duration_since(*prev) >= SEND_WARN_INTERVAL,
            None => true,
        };
        if warn {
            last.insert(cause, now);
            tracing::warn!(cause, "dropping outbound frame, transport closed");
        }
    }
}

/// One live conversation
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: RwLock<Option<chrono::DateTime<chrono::Utc>>>,
    active: AtomicBool,
    /// Completed turns (errored turns do not count)
    pub total_turns: AtomicUsize,
    pub total_interruptions: AtomicUsize,
    /// The session's cancellation signal; single external setter
    pub interrupt: InterruptFlag,
    /// Single-owner audio accumulator
    pub intake: Mutex<AudioIntakeBuffer>,
    /// Conversation state borrowed by the pipeline per turn
    pub dialog: Mutex<DialogState>,
    /// Per-session command queue
    pub queue: Arc<CommandQueue>,
    /// Transport handle for outbound frames
    pub outbound: Arc<OutboundHandle>,
    listening: AtomicBool,
    last_activity: RwLock<Instant>,
}

impl Session {
    fn new(
        id: String,
        user_id: String,
        outbound: Arc<OutboundHandle>,
        intake_threshold: usize,
    ) -> Self {
        Self {
            id,
            user_id,
            created_at: chrono::Utc::now(),
            ended_at: RwLock::new(None),
            active: AtomicBool::new(true),
            total_turns: AtomicUsize::new(0),
            total_interruptions: AtomicUsize::new(0),
            interrupt: InterruptFlag::new(),
            intake: Mutex::new(AudioIntakeBuffer::new(intake_threshold)),
            dialog: Mutex::new(DialogState::new()),
            queue: Arc::new(CommandQueue::new()),
            outbound,
            listening: AtomicBool::new(true),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::SeqCst);
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    /// Record an interrupt: raise the flag and count it
    pub fn register_interrupt(&self) {
        self.interrupt.set();
        self.total_interruptions.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark inactive and drop buffered work. Idempotent: the second call
    /// observes `active == false` and does nothing.
    fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            *self.ended_at.write() = Some(chrono::Utc::now());
            self.intake.lock().clear();
            self.queue.clear();
        }
    }
}

/// Owns all live sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
    store: Arc<dyn SessionStore>,
    intake_threshold: usize,
}

impl SessionRegistry {
    pub fn new(
        max_sessions: usize,
        session_timeout: Duration,
        cleanup_interval: Duration,
        store: Arc<dyn SessionStore>,
        intake_threshold: usize,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
            store,
            intake_threshold,
        }
    }

    /// Open a session for a new connection.
    ///
    /// Allocates an id, records it externally best-effort (failure logged,
    /// non-fatal), then sends the `connected` handshake with up to 3
    /// retries at 50ms backoff. Exhausting the retries is fatal to this
    /// connect attempt only.
    pub async fn open(
        &self,
        user_id: &str,
        outbound: Arc<OutboundHandle>,
    ) -> Result<Arc<Session>, ServerError> {
        let session = {
            let mut sessions = self.sessions.write();

            if sessions.len() >= self.max_sessions {
                self.cleanup_expired_locked(&mut sessions);
                if sessions.len() >= self.max_sessions {
                    return Err(ServerError::Session("max sessions reached".into()));
                }
            }

            let id = uuid::Uuid::new_v4().to_string();
            let session = Arc::new(Session::new(
                id.clone(),
                user_id.to_string(),
                outbound,
                self.intake_threshold,
            ));
            sessions.insert(id, session.clone());
            session
        };

        // Best-effort external persistence
        {
            let store = self.store.clone();
            let id = session.id.clone();
            let user = session.user_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.create_session(&id, &user).await {
                    tracing::warn!(session_id = %id, error = %e, "failed to persist session record");
                }
            });
        }

        // Connected handshake: one attempt plus up to 3 retries
        let mut retries = 0;
        loop {
            match session
                .outbound
                .send_checked(ServerMessage::Connected {
                    session_id: session.id.clone(),
                })
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    if retries >= HANDSHAKE_RETRIES {
                        tracing::warn!(
                            session_id = %session.id,
                            retries,
                            "connected handshake exhausted retries"
                        );
                        self.close(&session.id).await;
                        return Err(e);
                    }
                    retries += 1;
                    tokio::time::sleep(HANDSHAKE_BACKOFF).await;
                }
            }
        }

        tracing::info!(session_id = %session.id, user_id, "session opened");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Close a session. Idempotent: double-close is a no-op.
    pub async fn close(&self, id: &str) {
        let session = self.sessions.write().remove(id);
        let Some(session) = session else {
            return;
        };
        session.deactivate();

        let store = self.store.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.end_session(&id).await {
                tracing::warn!(session_id = %id, error = %e, "failed to persist session end");
            }
        });

        tracing::info!(session_id = %session.id, turns = session.total_turns.load(Ordering::SeqCst), "session closed");
    }

    /// Send a frame to every active session except `exclude`
    pub async fn broadcast(&self, message: ServerMessage, exclude: Option<&str>) {
        let targets: Vec<Arc<Session>> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_active() && Some(s.id.as_str()) != exclude)
            .cloned()
            .collect();

        for session in targets {
            session.outbound.send(message.clone(), "broadcast").await;
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    fn cleanup_expired_locked(&self, sessions: &mut HashMap<String, Arc<Session>>) {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                session.deactivate();
                tracing::info!(session_id = %id, "expired session removed");
            }
        }
    }

    /// Sweep expired sessions
    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_locked(&mut sessions);
    }

    /// Start a background task that periodically sweeps expired sessions.
    /// Returns a shutdown sender for the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = registry.count();
                        registry.cleanup_expired();
                        let after = registry.count();
                        if before != after {
                            tracing::info!(
                                removed = before - after,
                                remaining = after,
                                "session cleanup sweep"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySessionStore;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            10,
            Duration::from_secs(3600),
            Duration::from_secs(300),
            Arc::new(InMemorySessionStore::new()),
            32_000,
        ))
    }

    fn outbound(capacity: usize) -> (Arc<OutboundHandle>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(OutboundHandle::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_open_sends_connected_handshake() {
        let registry = registry();
        let (handle, mut rx) = outbound(8);

        let session = registry.open("u1", handle).await.unwrap();
        assert!(session.is_active());

        match rx.recv().await.unwrap() {
            ServerMessage::Connected { session_id } => assert_eq!(session_id, session.id),
            other => panic!("expected connected, got {other:?}"),
        }
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn test_open_fails_when_transport_already_closed() {
        let registry = registry();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = Arc::new(OutboundHandle::new(tx));

        let result = registry.open("u1", handle).await;
        assert!(result.is_err());
        // Failed connect attempt leaves no session behind
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let registry = registry();
        let (handle, _rx) = outbound(8);

        let session = registry.open("u1", handle).await.unwrap();
        let id = session.id.clone();

        registry.close(&id).await;
        let after_first = (registry.count(), session.is_active());

        registry.close(&id).await;
        let after_second = (registry.count(), session.is_active());

        assert_eq!(after_first, (0, false));
        assert_eq!(after_first, after_second);
        assert!(session.ended_at.read().is_some());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let registry = Arc::new(SessionRegistry::new(
            1,
            Duration::from_secs(3600),
            Duration::from_secs(300),
            store,
            32_000,
        ));

        let (h1, _rx1) = outbound(8);
        registry.open("u1", h1).await.unwrap();

        let (h2, _rx2) = outbound(8);
        assert!(registry.open("u2", h2).await.is_err());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let registry = registry();
        let (h1, mut rx1) = outbound(8);
        let (h2, mut rx2) = outbound(8);

        let s1 = registry.open("u1", h1).await.unwrap();
        let s2 = registry.open("u2", h2).await.unwrap();
        let _ = rx1.recv().await; // drain handshakes
        let _ = rx2.recv().await;

        registry
            .broadcast(
                ServerMessage::VoiceInterrupted { reason: "test".into() },
                Some(s1.id.as_str()),
            )
            .await;

        assert!(rx2.try_recv().is_ok());
        assert!(rx1.try_recv().is_err());
        let _ = s2;
    }

    #[tokio::test]
    async fn test_dropped_outbound_never_errors() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = OutboundHandle::new(tx);

        // Repeated sends on a dead transport: no panic, no error
        for _ in 0..5 {
            handle
                .send(ServerMessage::AgentResponseChunk { text: "x".into() }, "test")
                .await;
        }
    }

    #[tokio::test]
    async fn test_register_interrupt_counts() {
        let registry = registry();
        let (handle, _rx) = outbound(8);
        let session = registry.open("u1", handle).await.unwrap();

        session.register_interrupt();
        session.register_interrupt();

        assert!(session.interrupt.is_set());
        assert_eq!(session.total_interruptions.load(Ordering::SeqCst), 2);
    }
}
