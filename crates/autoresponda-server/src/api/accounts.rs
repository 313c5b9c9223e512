//! Accounts API endpoints.
//!
//! Provides:
//! - GET /api/accounts/{id} - Fetch an account
//! - PATCH /api/accounts/{id}/settings - Update store settings
//! - POST /api/accounts/{id}/connect - Link a WhatsApp number
//! - POST /api/accounts/{id}/disconnect - Go offline, keeping the number

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use autoresponda_core::StoreSettingsPatch;

use super::account_error_response;
use crate::AppState;

/// Create the accounts API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_account))
        .route("/{id}/settings", patch(update_settings))
        .route("/{id}/connect", post(connect))
        .route("/{id}/disconnect", post(disconnect))
}

/// GET /api/accounts/{id}
async fn get_account(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.accounts.get_by_id(&id).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => account_error_response(e, "get account"),
    }
}

/// PATCH /api/accounts/{id}/settings
///
/// Only the fields present in the body change.
async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<StoreSettingsPatch>,
) -> impl IntoResponse {
    let mut settings = match state.accounts.get_by_id(&id).await {
        Ok(account) => account.settings,
        Err(e) => return account_error_response(e, "get account"),
    };
    settings.apply(patch);

    match state.accounts.update_settings(&id, &settings).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => account_error_response(e, "update settings"),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub phone_number: String,
}

/// POST /api/accounts/{id}/connect
async fn connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConnectRequest>,
) -> impl IntoResponse {
    match state.accounts.connect_phone(&id, &body.phone_number).await {
        Ok(account) => {
            tracing::info!(account_id = %account.id, "whatsapp connected");
            (StatusCode::OK, Json(account)).into_response()
        }
        Err(e) => account_error_response(e, "connect phone"),
    }
}

/// POST /api/accounts/{id}/disconnect
async fn disconnect(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.accounts.disconnect(&id).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => account_error_response(e, "disconnect phone"),
    }
}
