//! Text-to-speech adapters

mod http;

pub use http::{HttpTts, HttpTtsConfig};
