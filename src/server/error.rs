//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, AppError>`; engine errors carry their own
//! status via [`session::Error::http_status`].

use crate::session;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// An error ready to be rendered as a JSON response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<session::Error> for AppError {
    fn from(e: session::Error) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let code = match &e {
            session::Error::Probe { .. } => "probe_error",
            session::Error::EncoderSpawn(_) | session::Error::EncoderRuntime(_) => "encoder_error",
            session::Error::RestartThrottled { .. } => "restart_throttled",
            session::Error::SegmentTimeout { .. } => "segment_timeout",
            session::Error::SegmentUnavailable { .. } => "segment_unavailable",
            session::Error::SegmentOutOfRange { .. } => "segment_out_of_range",
            session::Error::Superseded { .. } => "superseded",
            session::Error::RenditionNotFound(_) => "rendition_not_found",
            session::Error::SessionExists(_) => "session_exists",
            session::Error::SessionNotFound(_) => "session_not_found",
            session::Error::SessionClosed(_) => "session_closed",
            session::Error::InvalidName(_) => "invalid_name",
            session::Error::Playlist(_) => "playlist_error",
            session::Error::Io(_) => "io_error",
        };

        Self::new(status, code, e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(e.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "io_error", e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                error = %self.message,
                "Server error in handler"
            );
        }

        let mut response = (
            self.status,
            axum::Json(json!({
                "error": self.message,
                "code": self.code,
            })),
        )
            .into_response();

        if self.status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from_static("1"),
            );
        }
        response
    }
}
