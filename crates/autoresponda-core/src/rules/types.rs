use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A keyword-triggered canned response belonging to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub keywords: Vec<String>,
    pub response: String,
    pub is_active: bool,
}

impl Rule {
    /// True when any keyword occurs in `normalized_message`, which must already be lowercase.
    pub fn matches_normalized(&self, normalized_message: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| normalized_message.contains(keyword.to_lowercase().as_str()))
    }
}

/// Rule payload that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub keywords: Vec<String>,
    pub response: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleValidationError {
    #[error("a rule needs at least one keyword")]
    EmptyKeywords,
    #[error("a rule needs a non-empty response")]
    EmptyResponse,
}

impl RuleDraft {
    pub fn new(keywords: Vec<String>, response: impl Into<String>) -> Self {
        Self {
            keywords,
            response: response.into(),
            is_active: true,
        }
    }

    /// Build a draft from the comma-separated keyword field of the rule editor.
    pub fn from_keyword_text(keywords: &str, response: impl Into<String>) -> Self {
        let keywords = keywords
            .split(',')
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(keywords, response)
    }

    /// Trim every keyword, drop empty ones, and reject drafts that end up with no
    /// keywords or a blank response.
    pub fn validate(self) -> Result<Self, RuleValidationError> {
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|keyword| keyword.trim())
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_string)
            .collect();

        if keywords.is_empty() {
            return Err(RuleValidationError::EmptyKeywords);
        }
        if self.response.trim().is_empty() {
            return Err(RuleValidationError::EmptyResponse);
        }

        Ok(Self {
            keywords,
            response: self.response,
            is_active: self.is_active,
        })
    }
}

/// Partial edit of a rule. Absent fields keep the rule's current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePatch {
    pub keywords: Option<Vec<String>>,
    pub response: Option<String>,
    pub is_active: Option<bool>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none() && self.response.is_none() && self.is_active.is_none()
    }

    /// The draft that results from applying this patch on top of `current`.
    pub fn merge(self, current: &Rule) -> RuleDraft {
        RuleDraft {
            keywords: self.keywords.unwrap_or_else(|| current.keywords.clone()),
            response: self.response.unwrap_or_else(|| current.response.clone()),
            is_active: self.is_active.unwrap_or(current.is_active),
        }
    }
}

/// All rules of one account in insertion order. The first matching active rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap rules that are already persisted, in their stored order.
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|rule| rule.is_active)
    }

    pub(crate) fn rules_mut(&mut self) -> &mut Vec<Rule> {
        &mut self.rules
    }
}
