//! Lead intake server
//!
//! Axum surface over the pipeline: the telephony media-stream socket,
//! owner dashboard feeds, and the REST API for leads, decisions and
//! business profiles.

pub mod call;
pub mod http;
pub mod registry;
pub mod state;

pub use http::create_router;
pub use registry::BroadcastRegistry;
pub use state::AppState;

use axum::http::StatusCode;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<leadline_core::Error> for ServerError {
    fn from(err: leadline_core::Error) -> Self {
        use leadline_core::Error as E;
        match err {
            E::NotFound(msg) => Self::NotFound(msg),
            E::Validation(msg) => Self::InvalidRequest(msg),
            E::Conflict(msg) => Self::Conflict(msg),
            E::Provider { .. } | E::NotConfigured(_) => Self::Upstream(err.to_string()),
            E::Store(msg) => Self::Internal(msg),
            E::Audio(msg) => Self::InvalidRequest(msg),
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let message = self.to_string();
        let status = StatusCode::from(self);
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_status_codes() {
        let status: StatusCode =
            ServerError::from(leadline_core::Error::NotFound("lead x".into())).into();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let status: StatusCode =
            ServerError::from(leadline_core::Error::Conflict("bad move".into())).into();
        assert_eq!(status, StatusCode::CONFLICT);

        let status: StatusCode =
            ServerError::from(leadline_core::Error::transient("stt", "down")).into();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
