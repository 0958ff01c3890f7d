use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gec::GecError;
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Correction(#[from] GecError),

    #[error("Metrics are disabled")]
    MetricsDisabled,

    #[error("Not found")]
    NotFound,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound | ServerError::MetricsDisabled => StatusCode::NOT_FOUND,
            ServerError::Correction(err) => match err {
                GecError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                GecError::ResultValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                GecError::GenerationFailed(_) | GecError::EmbeddingProvider(_) => {
                    StatusCode::BAD_GATEWAY
                }
                GecError::Storage(_) | GecError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::Correction(err) => err.code(),
            ServerError::MetricsDisabled => "METRICS_DISABLED",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for ServerError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        ServerError::BadRequest(err.body_text())
    }
}
