use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::tabular::{TabularError, TabularFormat, parse_rows};

use super::import::{ImportOutcome, import_rows};
use super::repository::{RuleSetRepository, RuleStoreError};
use super::store::{IdGenerator, UuidGenerator};
use super::types::{Rule, RuleDraft, RulePatch, RuleSet, RuleValidationError};

#[derive(Debug, Error)]
pub enum RuleServiceError {
    #[error(transparent)]
    Store(#[from] RuleStoreError),
    #[error(transparent)]
    Validation(#[from] RuleValidationError),
    #[error(transparent)]
    Import(#[from] TabularError),
    #[error("rule not found: {0}")]
    NotFound(String),
}

/// Rule editing for accounts. Every mutation loads the account's set, applies the
/// change, and saves the whole set back.
pub struct RuleService {
    repository: Arc<dyn RuleSetRepository>,
    ids: Arc<dyn IdGenerator>,
    write_lock: Mutex<()>,
}

impl RuleService {
    pub fn new(repository: Arc<dyn RuleSetRepository>) -> Self {
        Self::with_id_generator(repository, Arc::new(UuidGenerator))
    }

    pub fn with_id_generator(
        repository: Arc<dyn RuleSetRepository>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            repository,
            ids,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn list(&self, account_id: &str) -> Result<RuleSet, RuleServiceError> {
        Ok(self.repository.load(account_id).await?)
    }

    pub async fn create(&self, account_id: &str, draft: RuleDraft) -> Result<Rule, RuleServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.repository.load(account_id).await?;
        let rule = rules.create(draft, self.ids.as_ref())?;
        self.repository.save(account_id, &rules).await?;
        Ok(rule)
    }

    pub async fn update(
        &self,
        account_id: &str,
        rule_id: &str,
        draft: RuleDraft,
    ) -> Result<Rule, RuleServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.repository.load(account_id).await?;
        let rule = rules
            .update(rule_id, draft)?
            .ok_or_else(|| RuleServiceError::NotFound(rule_id.to_string()))?;
        self.repository.save(account_id, &rules).await?;
        Ok(rule)
    }

    /// Apply a partial edit. The current rule is read under the same lock that guards
    /// the write, so concurrent patches to different fields do not undo each other.
    pub async fn patch(
        &self,
        account_id: &str,
        rule_id: &str,
        patch: RulePatch,
    ) -> Result<Rule, RuleServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.repository.load(account_id).await?;
        let current = rules
            .get(rule_id)
            .ok_or_else(|| RuleServiceError::NotFound(rule_id.to_string()))?;
        let draft = patch.merge(current);
        let rule = rules
            .update(rule_id, draft)?
            .ok_or_else(|| RuleServiceError::NotFound(rule_id.to_string()))?;
        self.repository.save(account_id, &rules).await?;
        Ok(rule)
    }

    pub async fn set_active(
        &self,
        account_id: &str,
        rule_id: &str,
        is_active: bool,
    ) -> Result<Rule, RuleServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.repository.load(account_id).await?;
        let rule = rules
            .set_active(rule_id, is_active)
            .ok_or_else(|| RuleServiceError::NotFound(rule_id.to_string()))?;
        self.repository.save(account_id, &rules).await?;
        Ok(rule)
    }

    pub async fn delete(&self, account_id: &str, rule_id: &str) -> Result<(), RuleServiceError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.repository.load(account_id).await?;
        if !rules.delete(rule_id) {
            return Err(RuleServiceError::NotFound(rule_id.to_string()));
        }
        self.repository.save(account_id, &rules).await?;
        Ok(())
    }

    pub async fn bulk_create(
        &self,
        account_id: &str,
        drafts: Vec<RuleDraft>,
    ) -> Result<Vec<Rule>, RuleServiceError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let mut rules = self.repository.load(account_id).await?;
        let created = rules.bulk_create(drafts, self.ids.as_ref())?;
        self.repository.save(account_id, &rules).await?;
        Ok(created)
    }

    /// Parse an uploaded spreadsheet and append every usable row as an active rule.
    pub async fn import_file(
        &self,
        account_id: &str,
        bytes: &[u8],
        format: TabularFormat,
    ) -> Result<ImportOutcome, RuleServiceError> {
        let rows = parse_rows(bytes, format)?;
        let drafts = import_rows(&rows);
        let created = self.bulk_create(account_id, drafts).await?;

        info!(
            account_id,
            format = format.as_str(),
            rows = rows.len(),
            imported = created.len(),
            "imported rules from file"
        );
        Ok(ImportOutcome {
            imported: created.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::repository::InMemoryRuleSetRepository;
    use crate::rules::store::SequentialIds;

    fn service() -> RuleService {
        RuleService::with_id_generator(
            Arc::new(InMemoryRuleSetRepository::new()),
            Arc::new(SequentialIds::new()),
        )
    }

    #[tokio::test]
    async fn create_update_toggle_delete_flow() {
        let service = service();

        let rule = service
            .create("acct", RuleDraft::from_keyword_text("prix, price", "299 DH"))
            .await
            .expect("create");
        assert_eq!(rule.id, "rule-1");

        let updated = service
            .update("acct", &rule.id, RuleDraft::from_keyword_text("prix", "349 DH"))
            .await
            .expect("update");
        assert_eq!(updated.response, "349 DH");

        let toggled = service
            .set_active("acct", &rule.id, false)
            .await
            .expect("toggle");
        assert!(!toggled.is_active);

        service.delete("acct", &rule.id).await.expect("delete");
        assert!(service.list("acct").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn patch_keeps_fields_it_does_not_name() {
        let service = Arc::new(service());
        let rule = service
            .create("acct", RuleDraft::from_keyword_text("prix", "299 DH"))
            .await
            .expect("create");

        let keywords = {
            let service = service.clone();
            let id = rule.id.clone();
            tokio::spawn(async move {
                service
                    .patch(
                        "acct",
                        &id,
                        RulePatch {
                            keywords: Some(vec!["prix".into(), "taman".into()]),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        let response = {
            let service = service.clone();
            let id = rule.id.clone();
            tokio::spawn(async move {
                service
                    .patch(
                        "acct",
                        &id,
                        RulePatch {
                            response: Some("349 DH".into()),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };
        keywords.await.expect("join").expect("patch keywords");
        response.await.expect("join").expect("patch response");

        let rules = service.list("acct").await.expect("list");
        let stored = rules.get(&rule.id).expect("still there");
        assert_eq!(stored.keywords, vec!["prix", "taman"]);
        assert_eq!(stored.response, "349 DH");
        assert!(stored.is_active);

        let err = service
            .patch(
                "acct",
                &rule.id,
                RulePatch {
                    response: Some("  ".into()),
                    ..Default::default()
                },
            )
            .await
            .expect_err("blank response");
        assert!(matches!(
            err,
            RuleServiceError::Validation(RuleValidationError::EmptyResponse)
        ));
        assert!(matches!(
            service.patch("acct", "missing", RulePatch::default()).await,
            Err(RuleServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_rule_ids_are_not_found() {
        let service = service();

        let err = service
            .update("acct", "missing", RuleDraft::from_keyword_text("a", "A"))
            .await
            .expect_err("missing");
        assert!(matches!(err, RuleServiceError::NotFound(id) if id == "missing"));

        assert!(matches!(
            service.delete("acct", "missing").await,
            Err(RuleServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.set_active("acct", "missing", true).await,
            Err(RuleServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_and_not_saved() {
        let service = service();
        let err = service
            .create("acct", RuleDraft::from_keyword_text(" , ", "Hello"))
            .await
            .expect_err("no keywords");
        assert!(matches!(
            err,
            RuleServiceError::Validation(RuleValidationError::EmptyKeywords)
        ));
        assert!(service.list("acct").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn csv_import_appends_after_existing_rules() {
        let service = service();
        service
            .create("acct", RuleDraft::from_keyword_text("hi", "Hello"))
            .await
            .expect("create");

        let csv = "Question,Answer\nprix;price,299 DH\nonly-one-cell\ntawsil,24-48h\n";
        let outcome = service
            .import_file("acct", csv.as_bytes(), TabularFormat::Csv)
            .await
            .expect("import");
        assert_eq!(outcome.imported, 2);

        let rules = service.list("acct").await.expect("list");
        let responses: Vec<_> = rules.rules().iter().map(|r| r.response.as_str()).collect();
        assert_eq!(responses, vec!["Hello", "299 DH", "24-48h"]);
        assert_eq!(rules.rules()[1].keywords, vec!["prix", "price"]);
        assert!(rules.rules().iter().all(|r| r.is_active));
    }

    #[tokio::test]
    async fn import_without_usable_rows_reports_zero() {
        let service = service();
        let outcome = service
            .import_file("acct", b"Keyword,Response\n", TabularFormat::Csv)
            .await
            .expect("import");
        assert_eq!(outcome.imported, 0);
        assert_eq!(outcome.to_string(), "no valid rules found");
    }

    #[tokio::test]
    async fn malformed_workbook_is_an_import_error() {
        let service = service();
        let err = service
            .import_file("acct", b"garbage", TabularFormat::Xlsx)
            .await
            .expect_err("malformed");
        assert!(matches!(err, RuleServiceError::Import(TabularError::Malformed(_))));
    }
}
