//! Rules API endpoints.
//!
//! Provides:
//! - GET /api/accounts/{id}/rules - List rules in match order
//! - POST /api/accounts/{id}/rules - Append a rule
//! - PATCH /api/accounts/{id}/rules/{rule_id} - Edit or toggle a rule
//! - DELETE /api/accounts/{id}/rules/{rule_id} - Remove a rule
//! - POST /api/accounts/{id}/rules/import?format=csv|xlsx|xls|ods - Import a spreadsheet
//!   sent as the raw request body

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use autoresponda_core::{RuleDraft, RulePatch, RuleServiceError, TabularError, TabularFormat};

use super::{ApiError, account_error_response};
use crate::AppState;

/// Create the rules API router, mounted under `/api/accounts`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/rules", get(list_rules).post(create_rule))
        .route(
            "/{id}/rules/{rule_id}",
            patch(update_rule).delete(delete_rule),
        )
        .route("/{id}/rules/import", post(import_rules))
}

fn rule_error_response(err: RuleServiceError, action: &str) -> Response {
    match err {
        RuleServiceError::NotFound(id) => {
            ApiError::not_found(format!("Rule not found: {id}")).respond(StatusCode::NOT_FOUND)
        }
        RuleServiceError::Validation(e) => {
            ApiError::bad_request(e.to_string()).respond(StatusCode::BAD_REQUEST)
        }
        RuleServiceError::Import(TabularError::Unsupported(format)) => ApiError::bad_request(
            format!("Unsupported file format: {format}. Please use CSV or Excel (.xlsx, .xls)"),
        )
        .respond(StatusCode::BAD_REQUEST),
        RuleServiceError::Import(TabularError::Malformed(detail)) => {
            tracing::warn!("Rejected rule import: {}", detail);
            ApiError::new(
                "invalid_file",
                "Error parsing file. Please ensure it is a valid Excel or CSV file.",
            )
            .respond(StatusCode::UNPROCESSABLE_ENTITY)
        }
        RuleServiceError::Store(e) => {
            tracing::error!("Failed to {}: {}", action, e);
            ApiError::internal(format!("Failed to {action}"))
                .respond(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Rule sets are keyed by account id only, so unknown accounts are rejected here
/// before any rule operation runs.
async fn ensure_account(state: &AppState, id: &str) -> Result<(), Response> {
    state
        .accounts
        .get_by_id(id)
        .await
        .map(|_| ())
        .map_err(|e| account_error_response(e, "get account"))
}

/// GET /api/accounts/{id}/rules
async fn list_rules(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if let Err(response) = ensure_account(&state, &id).await {
        return response;
    }

    match state.rules.list(&id).await {
        Ok(rules) => (StatusCode::OK, Json(rules)).into_response(),
        Err(e) => rule_error_response(e, "list rules"),
    }
}

/// POST /api/accounts/{id}/rules
async fn create_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RuleDraft>,
) -> impl IntoResponse {
    if let Err(response) = ensure_account(&state, &id).await {
        return response;
    }

    match state.rules.create(&id, body).await {
        Ok(rule) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(e) => rule_error_response(e, "create rule"),
    }
}

/// PATCH /api/accounts/{id}/rules/{rule_id}
///
/// Absent fields keep their current value.
async fn update_rule(
    State(state): State<AppState>,
    Path((id, rule_id)): Path<(String, String)>,
    Json(body): Json<RulePatch>,
) -> impl IntoResponse {
    if let Err(response) = ensure_account(&state, &id).await {
        return response;
    }
    if body.is_empty() {
        return ApiError::bad_request("No fields to update").respond(StatusCode::BAD_REQUEST);
    }

    match state.rules.patch(&id, &rule_id, body).await {
        Ok(rule) => (StatusCode::OK, Json(rule)).into_response(),
        Err(e) => rule_error_response(e, "update rule"),
    }
}

/// DELETE /api/accounts/{id}/rules/{rule_id}
async fn delete_rule(
    State(state): State<AppState>,
    Path((id, rule_id)): Path<(String, String)>,
) -> impl IntoResponse {
    if let Err(response) = ensure_account(&state, &id).await {
        return response;
    }

    match state.rules.delete(&id, &rule_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => rule_error_response(e, "delete rule"),
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    /// `csv`, `xlsx`, `xls` or `ods`. Falls back to the extension of `file_name`.
    pub format: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub message: String,
}

/// POST /api/accounts/{id}/rules/import
async fn import_rules(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ImportParams>,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(response) = ensure_account(&state, &id).await {
        return response;
    }

    let format = match (params.format.as_deref(), params.file_name.as_deref()) {
        (Some(format), _) => format.parse::<TabularFormat>(),
        (None, Some(file_name)) => TabularFormat::from_file_name(file_name),
        (None, None) => {
            return ApiError::bad_request("A format or file_name query parameter is required")
                .respond(StatusCode::BAD_REQUEST);
        }
    };
    let format = match format {
        Ok(format) => format,
        Err(e) => return rule_error_response(e.into(), "import rules"),
    };

    match state.rules.import_file(&id, &body, format).await {
        Ok(outcome) => {
            let message = match outcome.imported {
                0 => "No valid rules found in the file.".to_string(),
                n => format!("Successfully imported {n} rules!"),
            };
            (
                StatusCode::OK,
                Json(ImportResponse {
                    imported: outcome.imported,
                    message,
                }),
            )
                .into_response()
        }
        Err(e) => rule_error_response(e, "import rules"),
    }
}
