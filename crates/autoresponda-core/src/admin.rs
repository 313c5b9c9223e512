use serde::{Deserialize, Serialize};
use tracing::info;

use crate::accounts::{Account, AccountError, AccountRepository};

/// Platform-wide counters. Only non-admin accounts are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdminOverview {
    pub total_users: u64,
    pub active_users: u64,
    pub blocked_users: u64,
    pub connected_users: u64,
    pub total_messages_answered: u64,
}

impl AdminOverview {
    pub fn from_accounts<'a>(accounts: impl IntoIterator<Item = &'a Account>) -> Self {
        accounts
            .into_iter()
            .filter(|account| !account.is_admin())
            .fold(Self::default(), |mut overview, account| {
                overview.total_users += 1;
                if account.is_blocked {
                    overview.blocked_users += 1;
                } else {
                    overview.active_users += 1;
                }
                if account.is_connected {
                    overview.connected_users += 1;
                }
                overview.total_messages_answered += account.stats.messages_answered;
                overview
            })
    }
}

/// One row of the admin user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(flatten)]
    pub account: Account,
    pub rule_count: usize,
}

#[derive(Clone)]
pub struct AdminService {
    accounts: AccountRepository,
}

impl AdminService {
    pub fn new(accounts: AccountRepository) -> Self {
        Self { accounts }
    }

    pub async fn overview(&self) -> Result<AdminOverview, AccountError> {
        let accounts = self.accounts.list_all().await?;
        Ok(AdminOverview::from_accounts(&accounts))
    }

    /// Every non-admin account with its rule count, oldest first.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AccountError> {
        let accounts = self.accounts.list_all().await?;
        let counts = self.accounts.rule_counts().await?;

        Ok(accounts
            .into_iter()
            .filter(|account| !account.is_admin())
            .map(|account| UserSummary {
                rule_count: counts.get(&account.id).copied().unwrap_or_default(),
                account,
            })
            .collect())
    }

    pub async fn toggle_block(&self, account_id: &str) -> Result<Account, AccountError> {
        let account = self.accounts.toggle_blocked(account_id).await?;
        info!(
            account_id,
            device_id = %account.metadata.device_id,
            blocked = account.is_blocked,
            "toggled account block"
        );
        Ok(account)
    }

    /// Block or unblock every account registered from `device_id`.
    pub async fn block_device(&self, device_id: &str, blocked: bool) -> Result<u64, AccountError> {
        let changed = self.accounts.set_blocked_by_device(device_id, blocked).await?;
        info!(device_id, blocked, changed, "updated device block");
        Ok(changed)
    }
}
