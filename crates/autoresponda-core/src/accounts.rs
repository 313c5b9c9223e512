use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, params};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::info;
use uuid::Uuid;

use crate::db::{Database, DbError};
use crate::rules::repository::{RuleStoreError, insert_rules};
use crate::rules::{Rule, RuleSet};

const ACCOUNT_COLUMNS: &str = "id, role, email, password_hash, phone_number, is_connected, settings_json, messages_answered, last_active, country, ip_address, device_id, is_blocked, created_at, updated_at";

pub const MIN_PHONE_NUMBER_LEN: usize = 10;

const SIMULATED_COUNTRIES: &[&str] = &[
    "Morocco",
    "Morocco",
    "Morocco",
    "France",
    "UAE",
    "Saudi Arabia",
];
const HEX_DIGITS: &[u8] = b"0123456789ABCDEF";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    fn parse(value: &str) -> Result<Self, AccountError> {
        match value {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(AccountError::InvalidRole(other.to_string())),
        }
    }
}

/// Per-account bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSettings {
    pub store_name: String,
    pub ai_persona: String,
    pub use_ai_fallback: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            store_name: "My Awesome Store".into(),
            ai_persona: "You are a helpful and polite sales assistant speaking Darija, French or English depending on the user.".into(),
            use_ai_fallback: true,
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSettingsPatch {
    pub store_name: Option<String>,
    pub ai_persona: Option<String>,
    pub use_ai_fallback: Option<bool>,
}

impl StoreSettings {
    pub fn apply(&mut self, patch: StoreSettingsPatch) {
        if let Some(store_name) = patch.store_name {
            self.store_name = store_name;
        }
        if let Some(ai_persona) = patch.ai_persona {
            self.ai_persona = ai_persona;
        }
        if let Some(use_ai_fallback) = patch.use_ai_fallback {
            self.use_ai_fallback = use_ai_fallback;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageStats {
    pub messages_answered: u64,
    pub last_active: DateTime<Utc>,
}

/// Where an account registered from. Blocking works on `device_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceMetadata {
    pub country: String,
    pub ip_address: String,
    pub device_id: String,
}

impl DeviceMetadata {
    /// Plausible registration metadata: a private IPv4, a MAC-style device id and a
    /// country drawn from a list weighted towards Morocco.
    pub fn simulated() -> Self {
        let mut rng = rand::thread_rng();
        let country = SIMULATED_COUNTRIES
            .choose(&mut rng)
            .copied()
            .unwrap_or("Morocco");
        let ip_address = format!(
            "192.168.{}.{}",
            rng.gen_range(0..255u8),
            rng.gen_range(0..255u8)
        );
        let device_id = (0..6)
            .map(|_| {
                let hi = HEX_DIGITS[rng.gen_range(0..16)] as char;
                let lo = HEX_DIGITS[rng.gen_range(0..16)] as char;
                format!("{hi}{lo}")
            })
            .collect::<Vec<_>>()
            .join(":");

        Self {
            country: country.to_string(),
            ip_address,
            device_id,
        }
    }

    pub fn admin_console() -> Self {
        Self {
            country: "System".into(),
            ip_address: "127.0.0.1".into(),
            device_id: "ADMIN-CONSOLE".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub role: Role,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub is_connected: bool,
    pub settings: StoreSettings,
    pub stats: UsageStats,
    pub metadata: DeviceMetadata,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("rule store error: {0}")]
    Rules(#[from] RuleStoreError),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("account not found: {0}")]
    NotFound(String),
    #[error("User already exists with this email.")]
    EmailTaken,
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Access Denied: This device ID ({device_id}) has been banned by the administrator.")]
    Blocked { device_id: String },
    #[error("phone number must be at least 10 characters")]
    InvalidPhoneNumber,
    #[error("invalid registration: {0}")]
    InvalidRegistration(&'static str),
    #[error("admin accounts cannot be blocked")]
    AdminProtected,
    #[error("invalid role value {0}")]
    InvalidRole(String),
}

/// The rules every new store starts with.
pub fn starter_rules() -> RuleSet {
    let rule = |id: &str, keywords: &[&str], response: &str| Rule {
        id: id.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        response: response.to_string(),
        is_active: true,
    };

    RuleSet::from_rules(vec![
        rule(
            "1",
            &["prix", "price", "taman", "bach"],
            "The price for this item is 299 DH. Free shipping on orders over 500 DH!",
        ),
        rule(
            "2",
            &["hello", "salam", "hi", "holla"],
            "Salam! Welcome to our store. How can I help you today?",
        ),
        rule(
            "3",
            &["livraison", "shipping", "tawsil"],
            "We deliver to all cities in Morocco within 24-48 hours.",
        ),
    ])
}

#[derive(Clone)]
pub struct AccountRepository {
    db: Database,
    hash_cost: u32,
}

impl AccountRepository {
    pub fn new(db: Database) -> Self {
        Self::with_hash_cost(db, bcrypt::DEFAULT_COST)
    }

    /// Lower costs make tests fast; production should use the default.
    pub fn with_hash_cost(db: Database, hash_cost: u32) -> Self {
        Self { db, hash_cost }
    }

    /// Create a user account with simulated device metadata, default settings and the
    /// starter rules. Account and rules are written in one transaction.
    pub async fn register(&self, email: &str, password: &str) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AccountError::InvalidRegistration("a valid email is required"));
        }
        if password.is_empty() {
            return Err(AccountError::InvalidRegistration("a password is required"));
        }

        let password_hash = hash_password(password.to_string(), self.hash_cost).await?;
        let metadata = DeviceMetadata::simulated();

        let conn = self.db.connection().await?;
        let tx = conn.transaction().await?;

        let mut existing = tx
            .query("SELECT 1 FROM accounts WHERE email = ?1", params![email.as_str()])
            .await?;
        if existing.next().await?.is_some() {
            return Err(AccountError::EmailTaken);
        }
        drop(existing);

        let account = {
            let mut rows = tx
                .query(
                    &insert_account_sql(),
                    params![
                        Uuid::new_v4().to_string(),
                        Role::User.as_str(),
                        email.as_str(),
                        password_hash,
                        serde_json::to_string(&StoreSettings::default())?,
                        metadata.country,
                        metadata.ip_address,
                        metadata.device_id,
                        now_rfc3339()
                    ],
                )
                .await?;
            match rows.next().await? {
                Some(row) => row_to_account(row)?,
                None => return Err(AccountError::NotFound("insert failed".into())),
            }
        };

        insert_rules(&tx, &account.id, &starter_rules()).await?;
        tx.commit().await?;

        info!(account_id = %account.id, device_id = %account.metadata.device_id, "registered account");
        Ok(account)
    }

    /// Check credentials. A blocked account is refused even with the right password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Account, AccountError> {
        let account = match self.get_by_email(email).await {
            Ok(account) => account,
            Err(AccountError::NotFound(_)) => return Err(AccountError::InvalidCredentials),
            Err(err) => return Err(err),
        };

        if !verify_password(password.to_string(), account.password_hash.clone()).await? {
            return Err(AccountError::InvalidCredentials);
        }
        if account.is_blocked {
            return Err(AccountError::Blocked {
                device_id: account.metadata.device_id,
            });
        }
        Ok(account)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Account, AccountError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_account(row),
            None => Err(AccountError::NotFound(id.to_string())),
        }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Account, AccountError> {
        let email = normalize_email(email);
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
                params![email.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_account(row),
            None => Err(AccountError::NotFound(email)),
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Account>, AccountError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, rowid"),
                (),
            )
            .await?;

        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await? {
            accounts.push(row_to_account(row)?);
        }
        Ok(accounts)
    }

    /// Number of stored rules per account id. Accounts without rules are absent.
    pub async fn rule_counts(&self) -> Result<HashMap<String, usize>, AccountError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT account_id, COUNT(*) FROM rules GROUP BY account_id",
                (),
            )
            .await?;

        let mut counts = HashMap::new();
        while let Some(row) = rows.next().await? {
            let account_id: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.insert(account_id, usize::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    pub async fn update_settings(
        &self,
        id: &str,
        settings: &StoreSettings,
    ) -> Result<Account, AccountError> {
        let settings_json = serde_json::to_string(settings)?;
        self.update_returning(
            id,
            "settings_json = ?2, updated_at = ?3",
            params![id, settings_json, now_rfc3339()],
        )
        .await
    }

    /// Record a WhatsApp number and mark the account connected.
    pub async fn connect_phone(&self, id: &str, phone_number: &str) -> Result<Account, AccountError> {
        let phone_number = phone_number.trim();
        if phone_number.chars().count() < MIN_PHONE_NUMBER_LEN {
            return Err(AccountError::InvalidPhoneNumber);
        }

        self.update_returning(
            id,
            "phone_number = ?2, is_connected = 1, updated_at = ?3",
            params![id, phone_number, now_rfc3339()],
        )
        .await
    }

    /// Mark the account offline. The stored phone number is kept.
    pub async fn disconnect(&self, id: &str) -> Result<Account, AccountError> {
        self.update_returning(
            id,
            "is_connected = 0, updated_at = ?2",
            params![id, now_rfc3339()],
        )
        .await
    }

    pub async fn record_message_answered(&self, id: &str) -> Result<Account, AccountError> {
        let now = now_rfc3339();
        self.update_returning(
            id,
            "messages_answered = messages_answered + 1, last_active = ?2, updated_at = ?2",
            params![id, now],
        )
        .await
    }

    pub async fn set_blocked(&self, id: &str, blocked: bool) -> Result<Account, AccountError> {
        let account = self.get_by_id(id).await?;
        if account.is_admin() {
            return Err(AccountError::AdminProtected);
        }

        self.update_returning(
            id,
            "is_blocked = ?2, updated_at = ?3",
            params![id, blocked as i64, now_rfc3339()],
        )
        .await
    }

    pub async fn toggle_blocked(&self, id: &str) -> Result<Account, AccountError> {
        let account = self.get_by_id(id).await?;
        if account.is_admin() {
            return Err(AccountError::AdminProtected);
        }

        self.update_returning(
            id,
            "is_blocked = 1 - is_blocked, updated_at = ?2",
            params![id, now_rfc3339()],
        )
        .await
    }

    /// Block or unblock every non-admin account registered from `device_id`.
    /// Returns how many accounts changed.
    pub async fn set_blocked_by_device(
        &self,
        device_id: &str,
        blocked: bool,
    ) -> Result<u64, AccountError> {
        let conn = self.db.connection().await?;
        let changed = conn
            .execute(
                "UPDATE accounts
                 SET is_blocked = ?1, updated_at = ?2
                 WHERE device_id = ?3 AND role != 'admin' AND is_blocked != ?1",
                params![blocked as i64, now_rfc3339(), device_id],
            )
            .await?;
        Ok(changed)
    }

    /// Create the admin account unless one with `email` already exists.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Account, AccountError> {
        match self.get_by_email(email).await {
            Ok(account) => return Ok(account),
            Err(AccountError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let password_hash = hash_password(password.to_string(), self.hash_cost).await?;
        let metadata = DeviceMetadata::admin_console();
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &insert_account_sql(),
                params![
                    Uuid::new_v4().to_string(),
                    Role::Admin.as_str(),
                    normalize_email(email),
                    password_hash,
                    serde_json::to_string(&StoreSettings::default())?,
                    metadata.country,
                    metadata.ip_address,
                    metadata.device_id,
                    now_rfc3339()
                ],
            )
            .await?;

        let account = match rows.next().await? {
            Some(row) => row_to_account(row)?,
            None => return Err(AccountError::NotFound("insert failed".into())),
        };
        info!(account_id = %account.id, "seeded admin account");
        Ok(account)
    }

    /// Run `UPDATE accounts SET {assignments} WHERE id = ?1`. `params` must start with
    /// the account id.
    async fn update_returning(
        &self,
        id: &str,
        assignments: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Account, AccountError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE accounts
                     SET {assignments}
                     WHERE id = ?1
                     RETURNING {ACCOUNT_COLUMNS}"
                ),
                params,
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_account(row),
            None => Err(AccountError::NotFound(id.to_string())),
        }
    }
}

fn insert_account_sql() -> String {
    format!(
        "INSERT INTO accounts (id, role, email, password_hash, phone_number, is_connected, settings_json, messages_answered, last_active, country, ip_address, device_id, is_blocked, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, 0, ?5, 0, ?9, ?6, ?7, ?8, 0, ?9, ?9)
         RETURNING {ACCOUNT_COLUMNS}"
    )
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn hash_password(password: String, cost: u32) -> Result<String, AccountError> {
    task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|err| AccountError::PasswordHash(err.to_string()))?
        .map_err(|err| AccountError::PasswordHash(err.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AccountError> {
    task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| AccountError::PasswordHash(err.to_string()))?
        .map_err(|err| AccountError::PasswordHash(err.to_string()))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, AccountError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn row_to_account(row: Row) -> Result<Account, AccountError> {
    let role: String = row.get(1)?;
    let settings_json: String = row.get(6)?;
    let messages_answered: i64 = row.get(7)?;
    let last_active: String = row.get(8)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;

    Ok(Account {
        id: row.get(0)?,
        role: Role::parse(&role)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        phone_number: row.get(4)?,
        is_connected: row.get::<i64>(5)? != 0,
        settings: serde_json::from_str(&settings_json)?,
        stats: UsageStats {
            messages_answered: messages_answered.max(0) as u64,
            last_active: parse_timestamp(&last_active)?,
        },
        metadata: DeviceMetadata {
            country: row.get(9)?,
            ip_address: row.get(10)?,
            device_id: row.get(11)?,
        },
        is_blocked: row.get::<i64>(12)? != 0,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
