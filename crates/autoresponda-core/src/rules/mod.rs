pub mod import;
pub mod repository;
pub mod resolver;
pub mod service;
pub mod store;
pub mod types;

pub use import::{ImportCell, ImportOutcome, ImportRow, import_rows};
pub use repository::{
    InMemoryRuleSetRepository, RuleSetRepository, RuleStoreError, SqlRuleSetRepository,
};
pub use resolver::{DEFAULT_UNRECOGNIZED_REPLY, ReplyResolver, Resolution, find_match};
pub use service::{RuleService, RuleServiceError};
pub use store::{IdGenerator, SequentialIds, UuidGenerator};
pub use types::{Rule, RuleDraft, RulePatch, RuleSet, RuleValidationError};
