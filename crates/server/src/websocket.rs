//! WebSocket handler
//!
//! One connection = one session. Three tasks per connection:
//! - the receive loop (this function) routes inbound frames,
//! - a responder task drains the session's command queue with a bounded
//!   (~10ms) wait and drives the turn pipeline, so turns stay strictly
//!   sequential per session,
//! - a writer task forwards outbound frames to the socket.
//!
//! Inbound `interrupt` frames and Stop/DeepDive commands raise the
//! session's interrupt flag on the receive path, so an in-flight turn
//! aborts even while the new command is still queued.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

use voice_assistant_core::AudioFormat;
use voice_assistant_pipeline::TurnEvent;

use crate::metrics;
use crate::session::{OutboundHandle, Session};
use crate::state::AppState;
use crate::wire::{to_wire, ClientMessage, ServerMessage};

/// Handle WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut receiver) = socket.split();

    // Writer task: outbound frames -> socket
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(256);
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let outbound = Arc::new(OutboundHandle::new(out_tx));
    let session = match state.registry.open("anonymous", outbound).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "connect attempt failed");
            writer.abort();
            return;
        }
    };
    metrics::record_session_opened();

    // Event forwarder: pipeline events -> wire frames
    let (event_tx, mut event_rx) = mpsc::channel::<TurnEvent>(64);
    let session_for_events = session.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let cause = match &event {
                TurnEvent::TtsChunk { .. } => "tts_chunk",
                _ => "turn_event",
            };
            if let Some(frame) = to_wire(event) {
                session_for_events.outbound.send(frame, cause).await;
            }
        }
    });

    // Responder task: strictly sequential turns per session
    let responder = tokio::spawn(respond_loop(
        state.clone(),
        session.clone(),
        event_tx.clone(),
    ));

    // Receive loop
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                session.touch();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(frame) => {
                        handle_client_frame(&state, &session, &event_tx, frame).await;
                    }
                    Err(e) => {
                        // Malformed frames are logged and ignored; the
                        // session lives on.
                        tracing::warn!(
                            session_id = %session.id,
                            error = %e,
                            "ignoring invalid message"
                        );
                    }
                }
            }
            Ok(Message::Binary(data)) => {
                // Raw PCM16 audio without the JSON envelope
                session.touch();
                ingest_audio(&state, &session, &event_tx, data, AudioFormat::Pcm16, false);
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled at the protocol layer
                session.touch();
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(session_id = %session.id, error = %e, "websocket receive error");
                break;
            }
            _ => {}
        }
    }

    // Teardown: close is idempotent; the responder observes !is_active
    state.registry.close(&session.id).await;
    metrics::record_session_closed();
    responder.abort();
    event_task.abort();
    writer.abort();
    tracing::info!(session_id = %session.id, "websocket closed");
}

/// Route one parsed inbound frame
async fn handle_client_frame(
    state: &AppState,
    session: &Arc<Session>,
    events: &mpsc::Sender<TurnEvent>,
    frame: ClientMessage,
) {
    match frame {
        ClientMessage::AudioChunk {
            audio_chunk,
            format,
            is_final,
        } => {
            if !session.is_listening() {
                return;
            }
            let bytes = match BASE64.decode(&audio_chunk) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "undecodable audio chunk");
                    return;
                }
            };
            let format = format
                .as_deref()
                .and_then(|f| f.parse::<AudioFormat>().ok())
                .unwrap_or_default();
            ingest_audio(state, session, events, bytes, format, is_final);
        }

        ClientMessage::Interrupt { reason } => {
            let reason = reason.unwrap_or_else(|| "user_interrupt".to_string());
            session.register_interrupt();
            metrics::record_interrupt();
            tracing::debug!(session_id = %session.id, %reason, "interrupt received");
            session
                .outbound
                .send(ServerMessage::VoiceInterrupted { reason }, "interrupt")
                .await;
        }

        ClientMessage::StartListening {} => {
            session.set_listening(true);
        }

        ClientMessage::StopListening {} => {
            session.set_listening(false);
            // Treat the pause as an utterance end
            let flushed = session.intake.lock().flush();
            if let Some(utterance) = flushed {
                spawn_ingest(state, session, events, utterance, AudioFormat::Pcm16);
            }
        }
    }
}

/// Push a fragment into the intake buffer, handing any flushed utterance
/// to the pipeline without blocking the receive loop.
fn ingest_audio(
    state: &AppState,
    session: &Arc<Session>,
    events: &mpsc::Sender<TurnEvent>,
    bytes: Vec<u8>,
    format: AudioFormat,
    is_final: bool,
) {
    let flushed = session.intake.lock().push(&bytes, is_final);
    if let Some(utterance) = flushed {
        spawn_ingest(state, session, events, utterance, format);
    }
}

/// Transcribe + classify off the receive path, then enqueue.
///
/// Stop/DeepDive raise the interrupt flag *before* the enqueue, so a
/// previous turn's generation aborts while the new command waits.
fn spawn_ingest(
    state: &AppState,
    session: &Arc<Session>,
    events: &mpsc::Sender<TurnEvent>,
    utterance: Vec<u8>,
    format: AudioFormat,
) {
    let pipeline = state.pipeline.clone();
    let session = session.clone();
    let events = events.clone();

    tokio::spawn(async move {
        match pipeline
            .ingest(&session.id, &utterance, format, &events)
            .await
        {
            Ok(Some(command)) => {
                if command.kind.interrupts_playback() {
                    session.register_interrupt();
                    metrics::record_interrupt();
                    session
                        .outbound
                        .send(
                            ServerMessage::VoiceInterrupted {
                                reason: "voice_command".to_string(),
                            },
                            "interrupt",
                        )
                        .await;
                }
                tracing::debug!(
                    session_id = %session.id,
                    kind = ?command.kind,
                    priority = ?command.priority,
                    "command enqueued"
                );
                session.queue.enqueue(command);
            }
            Ok(None) => {}
            Err(e) => {
                // Typed error event already emitted; the session continues.
                tracing::debug!(session_id = %session.id, error = %e, "utterance discarded");
            }
        }
    });
}

/// Drain the session's queue and run turns, one at a time.
async fn respond_loop(state: AppState, session: Arc<Session>, events: mpsc::Sender<TurnEvent>) {
    let timeout = state.dequeue_timeout();

    while session.is_active() {
        let Some(command) = session.queue.dequeue(timeout).await else {
            continue;
        };

        let result = state
            .pipeline
            .run_turn(&session.id, command, &session.dialog, &session.interrupt, &events)
            .await;

        if result.error.is_none() {
            session.total_turns.fetch_add(1, Ordering::SeqCst);
        }
        metrics::record_turn(&result);
    }
}
