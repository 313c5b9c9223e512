pub mod accounts;
pub mod admin;
pub mod chat;
pub mod config;
pub mod db;
pub mod fallback;
pub mod llm;
pub mod migrations;
pub mod rules;
pub mod tabular;
pub mod telemetry;

pub use accounts::{
    Account, AccountError, AccountRepository, DeviceMetadata, Role, StoreSettings,
    StoreSettingsPatch, UsageStats,
};
pub use admin::{AdminOverview, AdminService, UserSummary};
pub use chat::{ChatError, ChatService};
pub use config::Config;
pub use db::Database;
pub use fallback::{FallbackRequest, FallbackResponder, LlmFallbackResponder, StaticFallbackResponder};
pub use rules::{
    ImportOutcome, Resolution, Rule, RuleDraft, RulePatch, RuleService, RuleServiceError, RuleSet,
};
pub use tabular::{TabularError, TabularFormat};
pub use telemetry::{TelemetryError, TelemetryGuard, init_telemetry};
