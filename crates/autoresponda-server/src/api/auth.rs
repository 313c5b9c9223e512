//! Auth API endpoints.
//!
//! Provides:
//! - POST /api/auth/register - Create a store account with the starter rules
//! - POST /api/auth/login - Check credentials, refusing blocked devices

use axum::{
    Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post,
};
use serde::{Deserialize, Serialize};

use super::account_error_response;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> impl IntoResponse {
    match state.accounts.register(&body.email, &body.password).await {
        Ok(account) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(e) => account_error_response(e, "register account"),
    }
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> impl IntoResponse {
    match state.accounts.authenticate(&body.email, &body.password).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => account_error_response(e, "log in"),
    }
}
