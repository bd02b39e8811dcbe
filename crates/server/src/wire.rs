//! Wire message types
//!
//! JSON frames exchanged with clients over the WebSocket, tagged by a
//! snake_case `type` field. Audio payloads are base64.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use voice_assistant_pipeline::TurnEvent;

/// Outbound frames (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session handshake
    Connected { session_id: String },
    /// Final transcript of the user's utterance
    Transcription { text: String, confidence: f32 },
    /// Streamed response text
    AgentResponseChunk { text: String },
    /// Synthesized audio (base64)
    TtsChunk {
        audio_chunk: String,
        chunk_index: usize,
        format: String,
    },
    /// Response finished cleanly
    StreamingComplete { total_chunks: usize },
    /// Response cut short by an interrupt
    StreamingInterrupted { total_chunks: usize },
    /// Acknowledges an inbound interrupt
    VoiceInterrupted { reason: String },
    /// Typed stage error; the session stays open
    Error {
        error_type: String,
        message: String,
    },
}

/// Inbound frames (client -> server)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Audio fragment (base64) for the intake buffer
    AudioChunk {
        audio_chunk: String,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        is_final: bool,
    },
    /// User barge-in
    Interrupt {
        #[serde(default)]
        reason: Option<String>,
    },
    /// Resume feeding the intake buffer
    StartListening {},
    /// Pause intake; flushes the buffer as an utterance end
    StopListening {},
}

/// Translate a pipeline event into a wire frame.
///
/// `NoSpeech` is benign and intentionally has no wire counterpart; it is
/// logged server-side only.
pub fn to_wire(event: TurnEvent) -> Option<ServerMessage> {
    match event {
        TurnEvent::Transcription { text, confidence } => {
            Some(ServerMessage::Transcription { text, confidence })
        }
        TurnEvent::ResponseChunk { text } => Some(ServerMessage::AgentResponseChunk { text }),
        TurnEvent::TtsChunk {
            audio,
            chunk_index,
            format,
            ..
        } => Some(ServerMessage::TtsChunk {
            audio_chunk: BASE64.encode(audio),
            chunk_index,
            format: format.as_str().to_string(),
        }),
        TurnEvent::StreamingComplete { total_chunks } => {
            Some(ServerMessage::StreamingComplete { total_chunks })
        }
        TurnEvent::StreamingInterrupted { total_chunks } => {
            Some(ServerMessage::StreamingInterrupted { total_chunks })
        }
        TurnEvent::NoSpeech { reason } => {
            tracing::debug!(%reason, "no speech in utterance");
            None
        }
        TurnEvent::TurnError {
            error_type,
            message,
        } => Some(ServerMessage::Error {
            error_type: error_type.to_string(),
            message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_tag_names() {
        let json = serde_json::to_string(&ServerMessage::Connected {
            session_id: "abc".into(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"connected""#));

        let json = serde_json::to_string(&ServerMessage::StreamingInterrupted {
            total_chunks: 2,
        })
        .unwrap();
        assert!(json.contains(r#""type":"streaming_interrupted""#));
        assert!(json.contains(r#""total_chunks":2"#));
    }

    #[test]
    fn test_inbound_parsing() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"audio_chunk","audio_chunk":"AAAA","format":"pcm16","is_final":true}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::AudioChunk { is_final, format, .. } => {
                assert!(is_final);
                assert_eq!(format.as_deref(), Some("pcm16"));
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"interrupt","reason":"user_speaking"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Interrupt { .. }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"start_listening"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StartListening {}));
    }

    #[test]
    fn test_tts_chunk_is_base64() {
        let event = TurnEvent::TtsChunk {
            audio: vec![1, 2, 3, 4],
            chunk_index: 0,
            format: voice_assistant_core::AudioFormat::Pcm16,
            sample_rate: voice_assistant_core::SampleRate::Hz22050,
        };
        match to_wire(event).unwrap() {
            ServerMessage::TtsChunk { audio_chunk, format, .. } => {
                assert_eq!(BASE64.decode(audio_chunk).unwrap(), vec![1, 2, 3, 4]);
                assert_eq!(format, "pcm16");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_no_speech_has_no_wire_frame() {
        assert!(to_wire(TurnEvent::NoSpeech { reason: "low_energy".into() }).is_none());
    }
}
