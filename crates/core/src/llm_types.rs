//! Language model request/response types

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Generation request for the LLM collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Conversation history, system prompt first
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 1.0)
    pub temperature: f32,
}

impl GenerateRequest {
    /// Create a request from a system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_tokens: 256,
            temperature: 0.7,
        }
    }

    /// Append a user message
    pub fn with_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::user(content));
        self
    }

    /// Append prior conversation turns
    pub fn with_history(mut self, history: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(history);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    Error,
    Cancelled,
}

/// Complete generation response
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    pub text: String,
    pub finish_reason: FinishReason,
    /// Tokens generated, when the backend reports it
    pub tokens: Option<usize>,
}

impl GenerateResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
            tokens: None,
        }
    }
}

/// Incremental chunk from a streaming generation
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// Text fragment (may be a partial word)
    pub text: String,
    /// True on the last chunk of the stream
    pub is_final: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = GenerateRequest::new("You are a voice assistant.")
            .with_history(vec![Message::user("hi"), Message::assistant("hello")])
            .with_user_message("what's the weather")
            .with_max_tokens(128);

        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[3].role, Role::User);
        assert_eq!(req.max_tokens, 128);
    }
}
