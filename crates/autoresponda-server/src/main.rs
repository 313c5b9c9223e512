use std::{env, future::Future, net::SocketAddr, sync::Arc};

use autoresponda_core::llm::GenaiLLMClient;
use autoresponda_core::rules::{RuleSetRepository, SqlRuleSetRepository};
use autoresponda_core::{
    AccountRepository, AdminService, ChatService, Config, Database, FallbackResponder,
    LlmFallbackResponder, RuleService, init_telemetry, migrations,
};
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use tracing::{info, warn};

mod api;

#[derive(Clone)]
struct AppState {
    db: Database,
    accounts: AccountRepository,
    rules: Arc<RuleService>,
    chat: Arc<ChatService>,
    admin: AdminService,
}

impl AppState {
    fn new(
        db: Database,
        accounts: AccountRepository,
        fallback: Option<Arc<dyn FallbackResponder>>,
    ) -> Self {
        let rule_sets: Arc<dyn RuleSetRepository> = Arc::new(SqlRuleSetRepository::new(db.clone()));
        Self {
            rules: Arc::new(RuleService::new(rule_sets.clone())),
            chat: Arc::new(ChatService::new(accounts.clone(), rule_sets, fallback)),
            admin: AdminService::new(accounts.clone()),
            accounts,
            db,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let db = Database::new(&config.paths.database).await?;
    migrations::run_migrations(&db).await?;

    let accounts = AccountRepository::new(db.clone());
    let admin = accounts
        .ensure_admin(&config.admin.email, &config.admin.password)
        .await?;
    info!(admin_id = %admin.id, "admin account ready");

    let llm = Arc::new(GenaiLLMClient::new(&config.model));
    info!(model = llm.model(), "fallback replies use language model");
    let fallback: Arc<dyn FallbackResponder> =
        Arc::new(LlmFallbackResponder::new(llm, &config.responder));

    let state = AppState::new(db, accounts, Some(fallback));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.app.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("AutoResponda listening on {}", listener.local_addr()?);

    serve(listener, app, shutdown_signal()).await?;
    Ok(())
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
async fn serve(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api::router())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: String,
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_status = match state.db.health_check().await {
        Ok(_) => "ok",
        Err(_) => "unhealthy",
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if db_status == "ok" {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_status.to_string(),
        }),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
    }
}
