use axum::{
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Response },
    Json,
};
use log::error;
use serde_json::{ json, Value };

use super::AppState;
use crate::history::HistoryError;
use crate::models::api::ErrorResponse;

/// JSON error reply: `{"error": ..., "details"?: ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self { status, body: ErrorResponse::new(error) }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.body.error);
        }
        (self.status, Json(self.body)).into_response()
    }
}

impl From<HistoryError> for ApiError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::NotFound(_) => ApiError::not_found("Conversation not found"),
        }
    }
}

pub async fn chat_info() -> Json<Value> {
    Json(
        json!({
            "message": "Deck Agent API is running",
            "endpoints": {
                "chat": "POST /chat",
                "conversations": "POST /conversations"
            }
        })
    )
}

pub async fn generate_info() -> Json<Value> {
    Json(
        json!({
            "message": "Presentation Generation API",
            "endpoints": {
                "generate": "POST /presentation/generate"
            }
        })
    )
}

pub async fn upload_info(State(state): State<AppState>) -> Json<Value> {
    Json(
        json!({
            "message": "File Upload API",
            "supportedTypes": ["pdf"],
            "maxSize": format!("{}MB", state.files.max_bytes() / (1024 * 1024)),
            "note": "For spreadsheets or data files, please convert them to PDF first."
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_not_found_maps_to_404() {
        let err: ApiError = HistoryError::NotFound("abc".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn details_are_attached() {
        let err = ApiError::internal("Internal server error").with_details("disk full");
        assert_eq!(err.body.details.as_deref(), Some("disk full"));
        assert!(err.status().is_server_error());
    }
}
