//! Chat API endpoint.
//!
//! Provides:
//! - POST /api/accounts/{id}/chat - Answer an incoming customer message

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};

use autoresponda_core::ChatError;

use super::{ApiError, account_error_response};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/chat", post(reply))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// POST /api/accounts/{id}/chat
async fn reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    if body.message.trim().is_empty() {
        return ApiError::bad_request("Message is required").respond(StatusCode::BAD_REQUEST);
    }

    match state.chat.handle_message(&id, &body.message).await {
        Ok(resolution) => (StatusCode::OK, Json(resolution)).into_response(),
        Err(ChatError::Account(e)) => account_error_response(e, "answer message"),
        Err(ChatError::Blocked(_)) => {
            ApiError::forbidden("This account has been blocked by the administrator.")
                .respond(StatusCode::FORBIDDEN)
        }
        Err(ChatError::NotConnected(_)) => ApiError::new(
            "not_connected",
            "Connect a WhatsApp number before answering messages.",
        )
        .respond(StatusCode::CONFLICT),
        Err(ChatError::Rules(e)) => {
            tracing::error!("Failed to load rules for {}: {}", id, e);
            ApiError::internal("Failed to answer message").respond(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
