//! Replies for messages that no keyword rule answers.
//!
//! A responder always produces displayable text. Provider failures, missing
//! credentials and timeouts are turned into fixed apology strings here so callers
//! never see an error from this seam.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::accounts::StoreSettings;
use crate::config::ResponderConfig;
use crate::llm::{ChatMessage, CompletionRequest, LLMClient, LLMError, LlmCallContext};
use crate::rules::Rule;

pub const EMPTY_REPLY_TEXT: &str = "I'm having trouble thinking of a response right now.";
pub const MISSING_KEY_TEXT: &str = "Error: API Key is missing. I cannot generate an AI response.";
pub const OFFLINE_TEXT: &str = "Sorry, I am currently offline (AI Error).";

const FALLBACK_FEATURE: &str = "reply_fallback";

/// Everything a responder may use to write a reply.
#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest<'a> {
    pub account_id: &'a str,
    pub message: &'a str,
    pub active_rules: &'a [Rule],
    pub settings: &'a StoreSettings,
}

#[async_trait]
pub trait FallbackResponder: Send + Sync {
    async fn respond(&self, request: FallbackRequest<'_>) -> String;
}

/// Returns the same text for every message.
#[derive(Debug, Default)]
pub struct StaticFallbackResponder {
    text: String,
    calls: AtomicUsize,
}

impl StaticFallbackResponder {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FallbackResponder for StaticFallbackResponder {
    async fn respond(&self, _request: FallbackRequest<'_>) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text.clone()
    }
}

/// Asks a language model for a short reply in the store's voice.
pub struct LlmFallbackResponder {
    client: Arc<dyn LLMClient>,
    timeout: Duration,
    max_output_tokens: u32,
    temperature: f32,
}

impl LlmFallbackResponder {
    pub fn new(client: Arc<dyn LLMClient>, config: &ResponderConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }

    fn build_request(&self, request: &FallbackRequest<'_>) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::system(system_prompt(request.settings, request.active_rules)),
                ChatMessage::user(request.message),
            ],
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        }
    }
}

#[async_trait]
impl FallbackResponder for LlmFallbackResponder {
    async fn respond(&self, request: FallbackRequest<'_>) -> String {
        let completion = self.build_request(&request);
        let context = LlmCallContext::new(FALLBACK_FEATURE).with_account(request.account_id);

        match tokio::time::timeout(self.timeout, self.client.complete(completion, context)).await {
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                debug!(model = %response.model, "model returned an empty reply");
                EMPTY_REPLY_TEXT.to_string()
            }
            Ok(Ok(response)) => response.content,
            Ok(Err(LLMError::MissingApiKey)) => {
                warn!("fallback reply skipped, no api key configured");
                MISSING_KEY_TEXT.to_string()
            }
            Ok(Err(err)) => {
                warn!(error = %err, "fallback reply failed");
                OFFLINE_TEXT.to_string()
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "fallback reply timed out");
                OFFLINE_TEXT.to_string()
            }
        }
    }
}

/// System instruction naming the store, its persona and the known policies.
pub fn system_prompt(settings: &StoreSettings, active_rules: &[Rule]) -> String {
    let policies = active_rules
        .iter()
        .map(|rule| {
            format!(
                "If user asks about [{}], the policy is: \"{}\"",
                rule.keywords.join(", "),
                rule.response
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an AI assistant for a store named \"{store}\".\n\
         {persona}\n\
         \n\
         Here is some information about the store policies based on existing rules:\n\
         {policies}\n\
         \n\
         Instructions:\n\
         1. Answer the user's question politely and concisely.\n\
         2. If the user asks something covered by the policies above, use that information.\n\
         3. Keep the reply short, like a WhatsApp message.\n\
         4. Reply in the same language the user writes in (Darija, French, Arabic or English).",
        store = settings.store_name,
        persona = settings.ai_persona,
    )
}
