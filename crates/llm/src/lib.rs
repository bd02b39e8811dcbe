//! LLM integration
//!
//! HTTP backend for an Ollama-style chat API implementing the core
//! `LanguageModel` trait, with NDJSON streaming and bounded retry.

mod backend;

pub use backend::{LlmBackendConfig, OllamaBackend};
