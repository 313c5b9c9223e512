//! HTTP API handlers for the AutoResponda dashboard.
//!
//! This module provides REST API endpoints for:
//! - Registration and login
//! - Account settings and WhatsApp connection
//! - Keyword rules, including spreadsheet import
//! - Message replies
//! - Platform administration

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod chat;
pub mod rules;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use autoresponda_core::AccountError;

use crate::AppState;

/// Create the main API router with all endpoints mounted.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/accounts", accounts::router().merge(rules::router()).merge(chat::router()))
        .nest("/admin", admin::router())
}

/// Error response for API errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    fn respond(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Map an account failure to a response. `action` names what was attempted and is
/// used for logging and the generic 500 message.
fn account_error_response(err: AccountError, action: &str) -> Response {
    match err {
        AccountError::NotFound(id) => {
            ApiError::not_found(format!("Account not found: {id}")).respond(StatusCode::NOT_FOUND)
        }
        AccountError::EmailTaken => {
            ApiError::conflict(err.to_string()).respond(StatusCode::CONFLICT)
        }
        AccountError::InvalidCredentials => {
            ApiError::unauthorized(err.to_string()).respond(StatusCode::UNAUTHORIZED)
        }
        AccountError::Blocked { .. } | AccountError::AdminProtected => {
            ApiError::forbidden(err.to_string()).respond(StatusCode::FORBIDDEN)
        }
        AccountError::InvalidPhoneNumber | AccountError::InvalidRegistration(_) => {
            ApiError::bad_request(err.to_string()).respond(StatusCode::BAD_REQUEST)
        }
        other => {
            tracing::error!("Failed to {}: {}", action, other);
            ApiError::internal(format!("Failed to {action}"))
                .respond(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
