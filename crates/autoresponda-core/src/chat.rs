use std::sync::Arc;

use thiserror::Error;
use tracing::{Instrument, info, info_span};

use crate::accounts::{AccountError, AccountRepository};
use crate::fallback::FallbackResponder;
use crate::rules::{ReplyResolver, Resolution, RuleSetRepository, RuleStoreError};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Rules(#[from] RuleStoreError),
    #[error("account {0} is blocked")]
    Blocked(String),
    #[error("account {0} has no connected phone")]
    NotConnected(String),
}

/// Answers incoming messages on behalf of a connected account.
pub struct ChatService {
    accounts: AccountRepository,
    rules: Arc<dyn RuleSetRepository>,
    resolver: ReplyResolver,
    fallback: Option<Arc<dyn FallbackResponder>>,
}

impl ChatService {
    pub fn new(
        accounts: AccountRepository,
        rules: Arc<dyn RuleSetRepository>,
        fallback: Option<Arc<dyn FallbackResponder>>,
    ) -> Self {
        Self {
            accounts,
            rules,
            resolver: ReplyResolver::new(),
            fallback,
        }
    }

    pub fn with_resolver(mut self, resolver: ReplyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Resolve a reply for `message` and count it against the account's stats.
    pub async fn handle_message(
        &self,
        account_id: &str,
        message: &str,
    ) -> Result<Resolution, ChatError> {
        let span = info_span!("chat.handle_message", account_id);
        async {
            let account = self.accounts.get_by_id(account_id).await?;
            if account.is_blocked {
                return Err(ChatError::Blocked(account.id));
            }
            if !account.is_connected {
                return Err(ChatError::NotConnected(account.id));
            }

            let rules = self.rules.load(&account.id).await?;
            let resolution = self
                .resolver
                .resolve(
                    &account.id,
                    message,
                    &rules,
                    &account.settings,
                    self.fallback.as_deref(),
                )
                .await;

            self.accounts.record_message_answered(&account.id).await?;
            info!(
                matched_rule_id = resolution.matched_rule_id.as_deref(),
                is_fallback = resolution.is_fallback,
                "answered message"
            );
            Ok(resolution)
        }
        .instrument(span)
        .await
    }
}
