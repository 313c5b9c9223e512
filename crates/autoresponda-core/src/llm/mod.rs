pub mod error;
pub mod mock;
pub mod types;

pub use error::LLMError;
pub use mock::MockLLMClient;
pub use types::{ChatMessage, ChatRole, CompletionRequest, CompletionResponse, LlmCallContext};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use genai::{
    Client as GenaiClient, Error as GenaiError,
    chat::{ChatMessage as GenaiChatMessage, ChatOptions, ChatRequest, ChatResponse},
    webc,
};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::ModelConfig;

/// Minimal async interface for LLM clients used throughout the crate.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
        context: LlmCallContext,
    ) -> Result<CompletionResponse, LLMError>;
}

#[async_trait]
pub trait ChatExecutor: Send + Sync {
    async fn exec_chat(
        &self,
        model: &str,
        request: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> Result<ChatResponse, GenaiError>;
}

#[async_trait]
impl ChatExecutor for GenaiClient {
    async fn exec_chat(
        &self,
        model: &str,
        request: ChatRequest,
        options: Option<&ChatOptions>,
    ) -> Result<ChatResponse, GenaiError> {
        GenaiClient::exec_chat(self, model, request, options).await
    }
}

/// Default LLM client backed by the genai crate. Provider API keys are read from the
/// environment by genai (e.g. `GEMINI_API_KEY`).
pub struct GenaiLLMClient {
    chat: Arc<dyn ChatExecutor>,
    model: String,
}

impl GenaiLLMClient {
    pub fn new(model_config: &ModelConfig) -> Self {
        let chat: Arc<dyn ChatExecutor> = Arc::new(GenaiClient::default());
        Self::with_executor(model_config, chat)
    }

    pub fn with_executor(model_config: &ModelConfig, chat: Arc<dyn ChatExecutor>) -> Self {
        Self {
            chat,
            model: namespaced_model(model_config),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_chat_request(&self, request: &CompletionRequest) -> ChatRequest {
        let messages = request
            .messages
            .iter()
            .map(to_genai_message)
            .collect::<Vec<_>>();
        ChatRequest::from_messages(messages)
    }

    fn build_chat_options(&self, request: &CompletionRequest) -> ChatOptions {
        ChatOptions::default()
            .with_temperature(request.temperature as f64)
            .with_max_tokens(request.max_tokens)
    }
}

#[async_trait]
impl LLMClient for GenaiLLMClient {
    async fn complete(
        &self,
        request: CompletionRequest,
        context: LlmCallContext,
    ) -> Result<CompletionResponse, LLMError> {
        let chat_request = self.build_chat_request(&request);
        let options = self.build_chat_options(&request);

        let start = Instant::now();
        let result = self
            .chat
            .exec_chat(&self.model, chat_request, Some(&options))
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let content = response.first_text().unwrap_or("").to_string();
                let provider_model = response.provider_model_iden.to_string();
                let (input_tokens, output_tokens) = usage_tokens(&response.usage);

                debug!(
                    feature = %context.feature,
                    account_id = context.account_id.as_deref(),
                    model = %provider_model,
                    input_tokens,
                    output_tokens,
                    latency_ms,
                    "llm call completed"
                );

                Ok(CompletionResponse {
                    content,
                    model: provider_model,
                    input_tokens,
                    output_tokens,
                    latency_ms,
                })
            }
            Err(err) => {
                let mapped = map_genai_error(err);
                warn!(
                    feature = %context.feature,
                    account_id = context.account_id.as_deref(),
                    model = %self.model,
                    latency_ms,
                    error = %mapped,
                    "llm call failed"
                );
                Err(mapped)
            }
        }
    }
}

fn to_genai_message(message: &ChatMessage) -> GenaiChatMessage {
    let content = message.content.clone();
    match message.role {
        ChatRole::System => GenaiChatMessage::system(content),
        ChatRole::User => GenaiChatMessage::user(content),
        ChatRole::Assistant => GenaiChatMessage::assistant(content),
    }
}

fn namespaced_model(cfg: &ModelConfig) -> String {
    if cfg.provider.is_empty() {
        cfg.model.clone()
    } else {
        format!("{}::{}", cfg.provider.to_lowercase(), cfg.model)
    }
}

fn usage_tokens(usage: &genai::chat::Usage) -> (u32, u32) {
    let input = usage.prompt_tokens.unwrap_or_default().max(0) as u32;
    let output = usage.completion_tokens.unwrap_or_default().max(0) as u32;
    (input, output)
}

fn map_genai_error(err: GenaiError) -> LLMError {
    match err {
        GenaiError::RequiresApiKey { .. }
        | GenaiError::NoAuthResolver { .. }
        | GenaiError::NoAuthData { .. } => LLMError::MissingApiKey,
        GenaiError::ChatReqHasNoMessages { .. }
        | GenaiError::LastChatMessageIsNotUser { .. }
        | GenaiError::MessageRoleNotSupported { .. }
        | GenaiError::MessageContentTypeNotSupported { .. }
        | GenaiError::ModelMapperFailed { .. }
        | GenaiError::AdapterNotSupported { .. }
        | GenaiError::Resolver { .. } => LLMError::InvalidRequest(err.to_string()),
        GenaiError::InvalidJsonResponseElement { .. } | GenaiError::StreamParse { .. } => {
            LLMError::ParseError(err.to_string())
        }
        GenaiError::NoChatResponse { .. } => LLMError::ServerError(err.to_string()),
        GenaiError::WebAdapterCall { webc_error, .. }
        | GenaiError::WebModelCall { webc_error, .. } => map_webc_error(webc_error),
        GenaiError::SerdeJson(err) => LLMError::ParseError(err.to_string()),
        other => LLMError::ProviderError(other.to_string()),
    }
}

fn map_webc_error(err: webc::Error) -> LLMError {
    match &err {
        webc::Error::ResponseFailedStatus { status, .. } => match *status {
            StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimited,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::AuthenticationFailed,
            status if status.is_client_error() => LLMError::InvalidRequest(status.to_string()),
            status if status.is_server_error() => LLMError::ServerError(status.to_string()),
            status => LLMError::ProviderError(status.to_string()),
        },
        webc::Error::Reqwest(req_err) if req_err.is_timeout() => LLMError::Timeout,
        webc::Error::ResponseFailedNotJson { .. } | webc::Error::JsonValueExt(_) => {
            LLMError::ParseError(err.to_string())
        }
        _ => LLMError::ProviderError(err.to_string()),
    }
}
