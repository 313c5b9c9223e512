use std::collections::HashMap;

use async_trait::async_trait;
use libsql::{Connection, Row, params};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::db::{Database, DbError};

use super::types::{Rule, RuleSet};

const RULE_COLUMNS: &str = "id, keywords_json, response, is_active";

#[derive(Debug, Error)]
pub enum RuleStoreError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence for one account's whole rule set. `save` replaces what was stored
/// before, keeping the order of `rules`.
#[async_trait]
pub trait RuleSetRepository: Send + Sync {
    async fn load(&self, account_id: &str) -> Result<RuleSet, RuleStoreError>;

    async fn save(&self, account_id: &str, rules: &RuleSet) -> Result<(), RuleStoreError>;
}

#[derive(Clone)]
pub struct SqlRuleSetRepository {
    db: Database,
}

impl SqlRuleSetRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RuleSetRepository for SqlRuleSetRepository {
    async fn load(&self, account_id: &str) -> Result<RuleSet, RuleStoreError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RULE_COLUMNS}
                     FROM rules
                     WHERE account_id = ?1
                     ORDER BY position ASC"
                ),
                params![account_id],
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(row_to_rule(row)?);
        }
        Ok(RuleSet::from_rules(rules))
    }

    async fn save(&self, account_id: &str, rules: &RuleSet) -> Result<(), RuleStoreError> {
        let conn = self.db.connection().await?;
        let tx = conn.transaction().await?;

        tx.execute("DELETE FROM rules WHERE account_id = ?1", params![account_id])
            .await?;

        insert_rules(&tx, account_id, rules).await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Process-local store used by tests and by callers that do not need durability.
#[derive(Default)]
pub struct InMemoryRuleSetRepository {
    sets: RwLock<HashMap<String, RuleSet>>,
}

impl InMemoryRuleSetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleSetRepository for InMemoryRuleSetRepository {
    async fn load(&self, account_id: &str) -> Result<RuleSet, RuleStoreError> {
        Ok(self
            .sets
            .read()
            .await
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, account_id: &str, rules: &RuleSet) -> Result<(), RuleStoreError> {
        self.sets
            .write()
            .await
            .insert(account_id.to_string(), rules.clone());
        Ok(())
    }
}

/// Append `rules` for `account_id` at positions 0.. on an open connection or
/// transaction. Callers are responsible for clearing earlier rows.
pub(crate) async fn insert_rules(
    conn: &Connection,
    account_id: &str,
    rules: &RuleSet,
) -> Result<(), RuleStoreError> {
    for (position, rule) in rules.rules().iter().enumerate() {
        let keywords_json = serde_json::to_string(&rule.keywords)?;
        conn.execute(
            "INSERT INTO rules (id, account_id, position, keywords_json, response, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rule.id.as_str(),
                account_id,
                position as i64,
                keywords_json,
                rule.response.as_str(),
                rule.is_active as i64
            ],
        )
        .await?;
    }
    Ok(())
}

fn row_to_rule(row: Row) -> Result<Rule, RuleStoreError> {
    let keywords_json: String = row.get(1)?;
    Ok(Rule {
        id: row.get(0)?,
        keywords: serde_json::from_str(&keywords_json)?,
        response: row.get(2)?,
        is_active: row.get::<i64>(3)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::rules::store::SequentialIds;
    use crate::rules::types::RuleDraft;
    use tempfile::TempDir;

    async fn setup_db() -> (Database, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db_name = format!("db_{}.sqlite", uuid::Uuid::new_v4());
        let db_path = dir.path().join(db_name);
        let db = Database::new(&db_path).await.expect("create db");
        run_migrations(&db).await.expect("migrations");
        (db, dir)
    }

    async fn insert_account(db: &Database, id: &str) {
        let conn = db.connection().await.expect("conn");
        conn.execute(
            "INSERT INTO accounts (id, email, password_hash, settings_json, last_active, country, ip_address, device_id, created_at, updated_at)
             VALUES (?1, ?2, 'hash', '{}', 'now', 'Morocco', '127.0.0.1', 'DEV', 'now', 'now')",
            params![id, format!("{id}@example.com")],
        )
        .await
        .expect("insert account");
    }

    fn sample_set() -> RuleSet {
        let ids = SequentialIds::new();
        let mut set = RuleSet::new();
        set.bulk_create(
            vec![
                RuleDraft::new(vec!["prix".into(), "price".into()], "299 DH"),
                RuleDraft::new(vec!["salam".into()], "Salam!"),
                RuleDraft::new(vec!["tawsil".into()], "24-48h"),
            ],
            &ids,
        )
        .expect("valid drafts");
        set.set_active("rule-2", false);
        set
    }

    #[tokio::test]
    async fn sql_save_then_load_preserves_order_and_flags() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, "acct-1").await;
        let repo = SqlRuleSetRepository::new(db);

        let set = sample_set();
        repo.save("acct-1", &set).await.expect("save");

        let loaded = repo.load("acct-1").await.expect("load");
        assert_eq!(loaded, set);
        assert!(!loaded.get("rule-2").expect("rule-2").is_active);
    }

    #[tokio::test]
    async fn sql_save_replaces_previous_contents() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, "acct-1").await;
        let repo = SqlRuleSetRepository::new(db);

        let mut set = sample_set();
        repo.save("acct-1", &set).await.expect("first save");

        set.delete("rule-1");
        repo.save("acct-1", &set).await.expect("second save");

        let loaded = repo.load("acct-1").await.expect("load");
        let ids: Vec<_> = loaded.rules().iter().map(|rule| rule.id.as_str()).collect();
        assert_eq!(ids, vec!["rule-2", "rule-3"]);
    }

    #[tokio::test]
    async fn sql_rule_sets_are_isolated_per_account() {
        let (db, _dir) = setup_db().await;
        insert_account(&db, "acct-1").await;
        insert_account(&db, "acct-2").await;
        let repo = SqlRuleSetRepository::new(db);

        repo.save("acct-1", &sample_set()).await.expect("save 1");
        repo.save("acct-2", &RuleSet::new()).await.expect("save 2");

        assert_eq!(repo.load("acct-1").await.expect("load 1").len(), 3);
        assert!(repo.load("acct-2").await.expect("load 2").is_empty());
        assert!(repo.load("unknown").await.expect("load unknown").is_empty());
    }

    #[tokio::test]
    async fn sql_save_for_missing_account_fails_and_keeps_nothing() {
        let (db, _dir) = setup_db().await;
        let repo = SqlRuleSetRepository::new(db);

        let err = repo
            .save("ghost", &sample_set())
            .await
            .expect_err("foreign key violation");
        assert!(matches!(err, RuleStoreError::Sql(_)));
        assert!(repo.load("ghost").await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn in_memory_repository_round_trips() {
        let repo = InMemoryRuleSetRepository::new();
        assert!(repo.load("a").await.expect("load").is_empty());

        let set = sample_set();
        repo.save("a", &set).await.expect("save");
        assert_eq!(repo.load("a").await.expect("load"), set);
        assert!(repo.load("b").await.expect("load").is_empty());
    }
}
