use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::accounts::StoreSettings;
use crate::fallback::{FallbackRequest, FallbackResponder};

use super::types::{Rule, RuleSet};

pub const DEFAULT_UNRECOGNIZED_REPLY: &str =
    "Sorry, I didn't understand that. Please contact support.";

/// The bot's answer to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub text: String,
    /// True when the text came from the fallback responder rather than a rule.
    pub is_fallback: bool,
    pub matched_rule_id: Option<String>,
}

/// First active rule, in insertion order, with a keyword contained in `message`
/// (case-insensitive).
pub fn find_match<'a>(message: &str, rules: &'a RuleSet) -> Option<&'a Rule> {
    let normalized = message.to_lowercase();
    rules
        .active_rules()
        .find(|rule| rule.matches_normalized(&normalized))
}

#[derive(Debug, Clone)]
pub struct ReplyResolver {
    default_reply: String,
}

impl Default for ReplyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyResolver {
    pub fn new() -> Self {
        Self {
            default_reply: DEFAULT_UNRECOGNIZED_REPLY.to_string(),
        }
    }

    pub fn with_default_reply(default_reply: impl Into<String>) -> Self {
        Self {
            default_reply: default_reply.into(),
        }
    }

    /// Resolve a reply. Never fails: fallback problems come back as displayable text.
    ///
    /// The fallback is consulted only when no rule matched, `settings.use_ai_fallback`
    /// is on and a responder was supplied.
    #[instrument(skip_all, fields(account_id = %account_id, rules = rules.len()))]
    pub async fn resolve(
        &self,
        account_id: &str,
        message: &str,
        rules: &RuleSet,
        settings: &StoreSettings,
        fallback: Option<&dyn FallbackResponder>,
    ) -> Resolution {
        if let Some(rule) = find_match(message, rules) {
            debug!(rule_id = %rule.id, "keyword rule matched");
            return Resolution {
                text: rule.response.clone(),
                is_fallback: false,
                matched_rule_id: Some(rule.id.clone()),
            };
        }

        match fallback {
            Some(responder) if settings.use_ai_fallback => {
                let active: Vec<Rule> = rules.active_rules().cloned().collect();
                let text = responder
                    .respond(FallbackRequest {
                        account_id,
                        message,
                        active_rules: &active,
                        settings,
                    })
                    .await;
                debug!("no rule matched, used fallback responder");
                Resolution {
                    text,
                    is_fallback: true,
                    matched_rule_id: None,
                }
            }
            _ => Resolution {
                text: self.default_reply.clone(),
                is_fallback: false,
                matched_rule_id: None,
            },
        }
    }
}
