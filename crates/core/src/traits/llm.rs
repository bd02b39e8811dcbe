//! Language model trait

use crate::{GenerateRequest, GenerateResponse, Result, StreamChunk};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Language Model interface
///
/// Implementations:
/// - `OllamaBackend` - local/remote Ollama-style chat API
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = Arc::new(OllamaBackend::new(config)?);
/// let request = GenerateRequest::new("You are a voice assistant")
///     .with_user_message("any news about rust?");
/// let response = llm.generate(request).await?;
/// println!("{}", response.text);
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate a complete response
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;

    /// Stream text fragments as they are generated
    ///
    /// Lower latency than `generate()`. The stream is lazy, finite, and
    /// forward-only; callers poll their interrupt flag between items.
    fn generate_stream(
        &self,
        request: GenerateRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

    /// Check if the backend is reachable and the model is loaded
    async fn is_available(&self) -> bool;

    /// Model name for logging
    fn model_name(&self) -> &str;

    /// Estimate token count for text
    ///
    /// Rough heuristic; implementations may use real tokenizers.
    fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLlm;

    #[async_trait]
    impl LanguageModel for MockLlm {
        async fn generate(&self, _request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse::text("Mock response"))
        }

        fn generate_stream(
            &self,
            _request: GenerateRequest,
        ) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>> {
            Box::pin(futures::stream::empty())
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "mock-llm"
        }
    }

    #[tokio::test]
    async fn test_mock_llm() {
        let llm = MockLlm;
        assert!(llm.is_available().await);

        let request = GenerateRequest::new("Test").with_user_message("Hello");
        let response = llm.generate(request).await.unwrap();
        assert_eq!(response.text, "Mock response");
    }

    #[test]
    fn test_token_estimation() {
        let llm = MockLlm;
        let estimate = llm.estimate_tokens("Hello world, how are you?");
        assert!(estimate > 0 && estimate < 15);
    }
}
