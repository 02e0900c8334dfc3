//! Error types for the HTTP layer.
//!
//! [`HttpError`] covers everything that can go wrong while answering a
//! non-WebSocket request: reading a static file or relaying a request to
//! REAPER. It converts into an Axum response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur while serving a static file or proxying.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The upstream could not be reached or the exchange broke off.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The upstream did not answer within the proxy deadline.
    #[error("upstream request timed out")]
    UpstreamTimeout,

    /// The client's request body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    /// The upstream response could not be turned into a response.
    #[error("invalid upstream response: {0}")]
    UpstreamResponse(String),

    /// A static file matched but could not be read.
    #[error("file open error: {0}")]
    FileRead(#[from] std::io::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Upstream(_) | Self::UpstreamTimeout | Self::UpstreamResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::RequestBody(_) => StatusCode::BAD_REQUEST,
            Self::FileRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_failures_are_bad_gateway() {
        assert_eq!(
            HttpError::Upstream(String::from("refused")).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            HttpError::UpstreamTimeout.into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn file_errors_are_internal() {
        let err = HttpError::from(std::io::Error::other("denied"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
