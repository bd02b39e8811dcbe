//! Voice Assistant Server
//!
//! Networked transport adapter: WebSocket endpoint, session registry,
//! wire message types, and Prometheus metrics.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod store;
pub mod websocket;
pub mod wire;

pub use http::create_router;
pub use metrics::{
    init_metrics, record_interrupt, record_session_closed, record_session_opened, record_turn,
};
pub use session::{OutboundHandle, Session, SessionRegistry};
pub use state::AppState;
pub use store::InMemorySessionStore;
pub use wire::{ClientMessage, ServerMessage};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session error: {0}")]
    Session(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
