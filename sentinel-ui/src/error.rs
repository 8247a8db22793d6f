use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentinel_retriever::retrieval::RetrieveError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("Invalid search type: {0}")]
    InvalidSearchType(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Retrieval(#[from] RetrieveError),
}

impl UiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSearchType(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Retrieval(e) if e.is_invalid_query() => StatusCode::BAD_REQUEST,
            Self::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Search failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            UiError::InvalidSearchType("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UiError::from(RetrieveError::invalid_query("empty")).status(),
            StatusCode::BAD_REQUEST
        );
        let store = RetrieveError::from(anyhow::anyhow!("connection refused"));
        assert_eq!(
            UiError::from(store).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_search_type_message() {
        assert_eq!(
            UiError::InvalidSearchType("video-to-image".into()).to_string(),
            "Invalid search type: video-to-image"
        );
    }
}
