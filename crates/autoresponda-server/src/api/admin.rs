//! Admin API endpoints.
//!
//! Every route requires an `x-account-id` header naming an admin account.
//!
//! Provides:
//! - GET /api/admin/overview - Platform counters
//! - GET /api/admin/users - Registered store accounts with their rule counts
//! - POST /api/admin/users/{id}/toggle-block - Block or unblock one account
//! - POST /api/admin/devices/{device_id}/block - Block every account on a device
//! - POST /api/admin/devices/{device_id}/unblock - Lift a device block

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use autoresponda_core::AccountError;

use super::{ApiError, account_error_response};
use crate::AppState;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/overview", get(overview))
        .route("/users", get(list_users))
        .route("/users/{id}/toggle-block", post(toggle_block))
        .route("/devices/{device_id}/block", post(block_device))
        .route("/devices/{device_id}/unblock", post(unblock_device))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(caller) = headers
        .get(ACCOUNT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return Err(ApiError::unauthorized("Missing x-account-id header")
            .respond(StatusCode::UNAUTHORIZED));
    };

    match state.accounts.get_by_id(caller).await {
        Ok(account) if account.is_admin() => Ok(()),
        Ok(_) | Err(AccountError::NotFound(_)) => {
            Err(ApiError::forbidden("Admin access required").respond(StatusCode::FORBIDDEN))
        }
        Err(e) => Err(account_error_response(e, "check admin access")),
    }
}

/// GET /api/admin/overview
async fn overview(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(response) = require_admin(&state, &headers).await {
        return response;
    }

    match state.admin.overview().await {
        Ok(overview) => (StatusCode::OK, Json(overview)).into_response(),
        Err(e) => account_error_response(e, "compute overview"),
    }
}

/// GET /api/admin/users
async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(response) = require_admin(&state, &headers).await {
        return response;
    }

    match state.admin.list_users().await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(e) => account_error_response(e, "list users"),
    }
}

/// POST /api/admin/users/{id}/toggle-block
async fn toggle_block(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(response) = require_admin(&state, &headers).await {
        return response;
    }

    match state.admin.toggle_block(&id).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => account_error_response(e, "toggle block"),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceBlockResponse {
    pub device_id: String,
    pub blocked: bool,
    pub changed: u64,
}

async fn set_device_block(
    state: AppState,
    headers: HeaderMap,
    device_id: String,
    blocked: bool,
) -> Response {
    if let Err(response) = require_admin(&state, &headers).await {
        return response;
    }

    match state.admin.block_device(&device_id, blocked).await {
        Ok(changed) => (
            StatusCode::OK,
            Json(DeviceBlockResponse {
                device_id,
                blocked,
                changed,
            }),
        )
            .into_response(),
        Err(e) => account_error_response(e, "update device block"),
    }
}

/// POST /api/admin/devices/{device_id}/block
async fn block_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    set_device_block(state, headers, device_id, true).await
}

/// POST /api/admin/devices/{device_id}/unblock
async fn unblock_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(device_id): Path<String>,
) -> impl IntoResponse {
    set_device_block(state, headers, device_id, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{read_json, setup_state};
    use autoresponda_core::{Account, AdminOverview, UserSummary};
    use axum::http::HeaderValue;

    fn headers_for(account_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCOUNT_ID_HEADER,
            HeaderValue::from_str(account_id).expect("header value"),
        );
        headers
    }

    async fn admin_headers(state: &AppState) -> HeaderMap {
        let admin = state
            .accounts
            .ensure_admin("admin@autoresponda.com", "admin123")
            .await
            .expect("admin");
        headers_for(&admin.id)
    }

    #[tokio::test]
    async fn non_admin_callers_are_refused() {
        let (state, _dir) = setup_state().await;
        let user = state
            .accounts
            .register("shop@example.com", "secret")
            .await
            .expect("register");

        let missing = overview(State(state.clone()), HeaderMap::new())
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let regular = overview(State(state), headers_for(&user.id))
            .await
            .into_response();
        assert_eq!(regular.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn overview_and_toggle_block() {
        let (state, _dir) = setup_state().await;
        let headers = admin_headers(&state).await;
        let user = state
            .accounts
            .register("shop@example.com", "secret")
            .await
            .expect("register");

        let toggled = toggle_block(State(state.clone()), headers.clone(), Path(user.id.clone()))
            .await
            .into_response();
        assert_eq!(toggled.status(), StatusCode::OK);
        let toggled: Account = read_json(toggled).await;
        assert!(toggled.is_blocked);

        let response = overview(State(state.clone()), headers.clone())
            .await
            .into_response();
        let counters: AdminOverview = read_json(response).await;
        assert_eq!(counters.total_users, 1);
        assert_eq!(counters.blocked_users, 1);

        let users = list_users(State(state), headers).await.into_response();
        let users: Vec<UserSummary> = read_json(users).await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].account.email, "shop@example.com");
        assert!(users[0].account.is_blocked);
        assert_eq!(users[0].rule_count, 3);
    }

    #[tokio::test]
    async fn admins_cannot_block_themselves() {
        let (state, _dir) = setup_state().await;
        let headers = admin_headers(&state).await;
        let admin_id = headers
            .get(ACCOUNT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .expect("header")
            .to_string();

        let response = toggle_block(State(state), headers, Path(admin_id))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn device_block_and_unblock() {
        let (state, _dir) = setup_state().await;
        let headers = admin_headers(&state).await;
        let user = state
            .accounts
            .register("shop@example.com", "secret")
            .await
            .expect("register");
        let device_id = user.metadata.device_id.clone();

        let blocked = block_device(State(state.clone()), headers.clone(), Path(device_id.clone()))
            .await
            .into_response();
        let blocked: DeviceBlockResponse = read_json(blocked).await;
        assert_eq!(blocked.changed, 1);
        assert!(
            state
                .accounts
                .authenticate("shop@example.com", "secret")
                .await
                .is_err()
        );

        let unblocked = unblock_device(State(state.clone()), headers, Path(device_id))
            .await
            .into_response();
        let unblocked: DeviceBlockResponse = read_json(unblocked).await;
        assert_eq!(unblocked.changed, 1);
        assert!(!unblocked.blocked);
        assert!(
            state
                .accounts
                .authenticate("shop@example.com", "secret")
                .await
                .is_ok()
        );
    }
}
