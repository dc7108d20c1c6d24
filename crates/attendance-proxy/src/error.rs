//! Proxy errors and their JSON responses.
//!
//! Failures reach the browser as `500` with the same envelope the backend
//! uses, so the front end's error path handles them unchanged:
//!
//! ```json
//! { "success": false, "error": "Proxy Error", "message": "..." }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No upstream URL was configured
    #[error("GAS_API_URL is not configured")]
    NotConfigured,

    /// The upstream could not be reached or its body could not be read
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Invalid startup settings
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProxyError {
    /// Value of the `error` field
    pub fn label(&self) -> String {
        match self {
            Self::NotConfigured => self.to_string(),
            Self::Upstream(_) | Self::Config(_) => "Proxy Error".to_string(),
        }
    }

    /// Value of the `message` field
    pub fn message(&self) -> String {
        match self {
            Self::NotConfigured => "Server configuration error".to_string(),
            Self::Upstream(e) => e.to_string(),
            Self::Config(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Proxy request failed");
        let body = ErrorResponse {
            success: false,
            error: self.label(),
            message: self.message(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
