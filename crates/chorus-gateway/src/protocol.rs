//! Gateway HTTP protocol: JSON bodies exchanged with clients

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chorus_core::{ChatError, Message};
use serde::{Deserialize, Serialize};

/// `POST /chat` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Explicit model; absent or empty means auto-routing
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `POST /chatAll` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChatRequest {
    #[serde(default)]
    pub models: Vec<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Entry in `GET /models`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    /// Short label shown by model pickers
    pub description: String,
    pub model: String,
}

/// `GET /sessions/{id}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistory {
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// Error body, shaped `{"detail": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// HTTP wrapper for orchestrator errors
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
