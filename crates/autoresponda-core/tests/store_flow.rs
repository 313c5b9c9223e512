use std::sync::Arc;

use autoresponda_core::config::ResponderConfig;
use autoresponda_core::fallback::OFFLINE_TEXT;
use autoresponda_core::llm::{LLMError, MockLLMClient};
use autoresponda_core::migrations::run_migrations;
use autoresponda_core::rules::{DEFAULT_UNRECOGNIZED_REPLY, SqlRuleSetRepository};
use autoresponda_core::{
    AccountError, AccountRepository, AdminService, ChatError, ChatService, Database,
    FallbackResponder, LlmFallbackResponder, RuleDraft, RuleService, StoreSettingsPatch,
    TabularFormat,
};
use tempfile::TempDir;

struct Store {
    accounts: AccountRepository,
    rules: RuleService,
    chat: ChatService,
    admin: AdminService,
    llm: MockLLMClient,
    _dir: TempDir,
}

async fn open_store() -> Result<Store, Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let db = Database::new(&dir.path().join("store.sqlite")).await?;
    run_migrations(&db).await?;

    let accounts = AccountRepository::with_hash_cost(db.clone(), 4);
    let rule_sets = Arc::new(SqlRuleSetRepository::new(db));
    let llm = MockLLMClient::new();
    let fallback: Arc<dyn FallbackResponder> = Arc::new(LlmFallbackResponder::new(
        Arc::new(llm.clone()),
        &ResponderConfig::default(),
    ));

    Ok(Store {
        rules: RuleService::new(rule_sets.clone()),
        chat: ChatService::new(accounts.clone(), rule_sets, Some(fallback)),
        admin: AdminService::new(accounts.clone()),
        accounts,
        llm,
        _dir: dir,
    })
}

#[tokio::test]
async fn imported_rules_answer_before_the_model() -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;
    let account = store.accounts.register("zina@example.com", "secret").await?;
    store
        .accounts
        .connect_phone(&account.id, "+212 612345678")
        .await?;

    let csv = "Mot-cle,Reponse\n\"size;taille;9yas\",Sizes 38 to 44\n\"retour\",Returns within 7 days\n";
    let outcome = store
        .rules
        .import_file(&account.id, csv.as_bytes(), TabularFormat::Csv)
        .await?;
    assert_eq!(outcome.imported, 2);
    assert_eq!(store.rules.list(&account.id).await?.len(), 5);

    let sized = store.chat.handle_message(&account.id, "Chno 9yas li kayn?").await?;
    assert_eq!(sized.text, "Sizes 38 to 44");
    assert!(!sized.is_fallback);

    store.llm.enqueue_text("Kayn l-lon l-hmer, ah.");
    let ai = store.chat.handle_message(&account.id, "wach kayn l-hmer?").await?;
    assert!(ai.is_fallback);
    assert_eq!(ai.text, "Kayn l-lon l-hmer, ah.");

    let prompt = &store.llm.requests()[0].messages[0].content;
    assert!(prompt.contains("[size, taille, 9yas]"));
    assert!(prompt.contains("\"My Awesome Store\""));
    assert_eq!(
        store.llm.contexts()[0].account_id.as_deref(),
        Some(account.id.as_str())
    );

    let refreshed = store.accounts.get_by_id(&account.id).await?;
    assert_eq!(refreshed.stats.messages_answered, 2);
    Ok(())
}

#[tokio::test]
async fn edited_rule_answers_with_new_keywords_immediately()
-> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;
    let account = store.accounts.register("zina@example.com", "secret").await?;
    store
        .accounts
        .connect_phone(&account.id, "+212 612345678")
        .await?;
    let mut settings = account.settings.clone();
    settings.apply(StoreSettingsPatch {
        use_ai_fallback: Some(false),
        ..Default::default()
    });
    store.accounts.update_settings(&account.id, &settings).await?;

    let rule = store
        .rules
        .create(
            &account.id,
            RuleDraft::from_keyword_text("babouche", "Babouches at 150 DH"),
        )
        .await?;
    let before = store.chat.handle_message(&account.id, "Wach kayn babouche?").await?;
    assert_eq!(before.text, "Babouches at 150 DH");
    assert_eq!(before.matched_rule_id.as_deref(), Some(rule.id.as_str()));

    let updated = store
        .rules
        .update(
            &account.id,
            &rule.id,
            RuleDraft::from_keyword_text("jellaba, djellaba", "Jellabas from 300 DH"),
        )
        .await?;
    assert_eq!(updated.id, rule.id);

    let after = store.chat.handle_message(&account.id, "Kayna jellaba?").await?;
    assert_eq!(after.text, "Jellabas from 300 DH");
    assert_eq!(after.matched_rule_id.as_deref(), Some(rule.id.as_str()));
    assert!(!after.is_fallback);

    let stale = store.chat.handle_message(&account.id, "Wach kayn babouche?").await?;
    assert_eq!(stale.text, DEFAULT_UNRECOGNIZED_REPLY);
    assert_eq!(stale.matched_rule_id, None);

    let stored = store.rules.list(&account.id).await?;
    assert_eq!(stored.len(), 4);
    assert_eq!(stored.rules()[3].id, rule.id);
    assert_eq!(store.llm.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn disabled_fallback_and_model_failures() -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;
    let account = store.accounts.register("zina@example.com", "secret").await?;
    store
        .accounts
        .connect_phone(&account.id, "+212 612345678")
        .await?;

    store.llm.enqueue_response(Err(LLMError::ServerError("503".into())));
    let offline = store.chat.handle_message(&account.id, "random question").await?;
    assert_eq!(offline.text, OFFLINE_TEXT);

    let mut settings = account.settings.clone();
    settings.apply(StoreSettingsPatch {
        use_ai_fallback: Some(false),
        ..Default::default()
    });
    store.accounts.update_settings(&account.id, &settings).await?;

    let canned = store.chat.handle_message(&account.id, "random question").await?;
    assert_eq!(canned.text, DEFAULT_UNRECOGNIZED_REPLY);
    assert_eq!(store.llm.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn device_ban_locks_out_login_and_chat() -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store().await?;
    store
        .accounts
        .ensure_admin("admin@autoresponda.com", "admin123")
        .await?;
    let account = store.accounts.register("zina@example.com", "secret").await?;
    store
        .accounts
        .connect_phone(&account.id, "+212 612345678")
        .await?;

    let changed = store
        .admin
        .block_device(&account.metadata.device_id, true)
        .await?;
    assert_eq!(changed, 1);

    match store.accounts.authenticate("zina@example.com", "secret").await {
        Err(AccountError::Blocked { device_id }) => {
            assert_eq!(device_id, account.metadata.device_id)
        }
        other => panic!("expected blocked login, got {other:?}"),
    }
    assert!(matches!(
        store.chat.handle_message(&account.id, "salam").await,
        Err(ChatError::Blocked(_))
    ));

    let overview = store.admin.overview().await?;
    assert_eq!(overview.total_users, 1);
    assert_eq!(overview.blocked_users, 1);
    assert_eq!(overview.connected_users, 1);
    Ok(())
}
