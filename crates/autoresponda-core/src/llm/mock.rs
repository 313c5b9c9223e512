use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LLMClient, LLMError, LlmCallContext};

/// Scripted client. Responses are returned in the order they were enqueued; an empty
/// queue yields a provider error.
#[derive(Debug, Default, Clone)]
pub struct MockLLMClient {
    responses: Arc<Mutex<VecDeque<Result<CompletionResponse, LLMError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    contexts: Arc<Mutex<Vec<LlmCallContext>>>,
    call_count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `complete` call before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn enqueue_response(&self, response: Result<CompletionResponse, LLMError>) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.push_back(response);
        }
    }

    /// Convenience for a successful completion with `content`.
    pub fn enqueue_text(&self, content: impl Into<String>) {
        self.enqueue_response(Ok(CompletionResponse {
            content: content.into(),
            model: "mock".into(),
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 0,
        }));
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Call contexts seen so far, in the same order as `requests`.
    pub fn contexts(&self) -> Vec<LlmCallContext> {
        self.contexts
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn complete(
        &self,
        request: CompletionRequest,
        context: LlmCallContext,
    ) -> Result<CompletionResponse, LLMError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request);
        }
        if let Ok(mut guard) = self.contexts.lock() {
            guard.push(context);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut guard| guard.pop_front());
        next.unwrap_or_else(|| {
            Err(LLMError::ProviderError(
                "mock response not provided".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            temperature: 0.0,
            max_tokens: 0,
        }
    }

    #[tokio::test]
    async fn returns_enqueued_responses_in_order() {
        let mock = MockLLMClient::new();
        mock.enqueue_text("first");
        mock.enqueue_response(Err(LLMError::Timeout));
        mock.enqueue_text("second");
        let context = LlmCallContext::new("test");

        let first = mock.complete(request("a"), context.clone()).await.unwrap();
        assert_eq!(first.content, "first");
        assert!(matches!(
            mock.complete(request("b"), context.clone()).await,
            Err(LLMError::Timeout)
        ));
        let second = mock.complete(request("c"), context).await.unwrap();
        assert_eq!(second.content, "second");
    }

    #[tokio::test]
    async fn returns_error_when_queue_empty() {
        let mock = MockLLMClient::new();
        let result = mock.complete(request("a"), LlmCallContext::new("test")).await;
        assert!(
            matches!(result, Err(LLMError::ProviderError(msg)) if msg.contains("mock response not provided"))
        );
    }

    #[tokio::test]
    async fn records_requests_and_counts_calls() {
        let mock = MockLLMClient::new();
        mock.enqueue_text("ok");

        assert_eq!(mock.call_count(), 0);
        let _ = mock.complete(request("hello"), LlmCallContext::new("test")).await;
        let _ = mock.complete(request("again"), LlmCallContext::new("test")).await;

        assert_eq!(mock.call_count(), 2);
        let seen = mock.requests();
        assert_eq!(seen[0].messages[0].content, "hello");
        assert_eq!(seen[1].messages[0].content, "again");
    }
}
