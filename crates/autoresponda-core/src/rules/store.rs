use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use super::types::{Rule, RuleDraft, RuleSet, RuleValidationError};

/// Source of rule ids. Every call must return an id never handed out before.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Monotonic counter producing `rule-1`, `rule-2`, ... Useful where ids must be predictable.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("rule-{n}")
    }
}

impl RuleSet {
    pub fn create(
        &mut self,
        draft: RuleDraft,
        ids: &dyn IdGenerator,
    ) -> Result<Rule, RuleValidationError> {
        let draft = draft.validate()?;
        let rule = into_rule(draft, ids);
        self.rules_mut().push(rule.clone());
        Ok(rule)
    }

    /// Replace keywords, response and active flag of an existing rule. The id and the
    /// rule's position are kept. Returns `Ok(None)` when no rule has that id.
    pub fn update(&mut self, id: &str, draft: RuleDraft) -> Result<Option<Rule>, RuleValidationError> {
        let draft = draft.validate()?;
        let Some(rule) = self.rules_mut().iter_mut().find(|rule| rule.id == id) else {
            return Ok(None);
        };

        rule.keywords = draft.keywords;
        rule.response = draft.response;
        rule.is_active = draft.is_active;
        Ok(Some(rule.clone()))
    }

    pub fn set_active(&mut self, id: &str, is_active: bool) -> Option<Rule> {
        let rule = self.rules_mut().iter_mut().find(|rule| rule.id == id)?;
        rule.is_active = is_active;
        Some(rule.clone())
    }

    /// Remove a rule. Returns false (and changes nothing) for an unknown id.
    pub fn delete(&mut self, id: &str) -> bool {
        let rules = self.rules_mut();
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        rules.len() != before
    }

    /// Append a batch of drafts. Either every draft is valid and all are appended, or
    /// the set is left untouched.
    pub fn bulk_create(
        &mut self,
        drafts: Vec<RuleDraft>,
        ids: &dyn IdGenerator,
    ) -> Result<Vec<Rule>, RuleValidationError> {
        let validated = drafts
            .into_iter()
            .map(RuleDraft::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let created: Vec<Rule> = validated
            .into_iter()
            .map(|draft| into_rule(draft, ids))
            .collect();
        self.rules_mut().extend(created.iter().cloned());
        Ok(created)
    }
}

fn into_rule(draft: RuleDraft, ids: &dyn IdGenerator) -> Rule {
    Rule {
        id: ids.next_id(),
        keywords: draft.keywords,
        response: draft.response,
        is_active: draft.is_active,
    }
}
