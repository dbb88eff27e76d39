use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::{ErrorBody, MessageBody};
use service::StoreError;
use thiserror::Error;

use crate::startup::Phase;

/// Errors a handler turns directly into an HTTP response.
#[derive(Debug, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(msg))).into_response()
            }
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(MessageBody::new("Not found"))).into_response()
            }
            ApiError::Upstream(msg) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorBody::new(msg))).into_response()
            }
        }
    }
}

/// How store failures map onto status codes.
///
/// `Legacy` keeps the historical contract: every read failure is a 404 and
/// every write failure a 400 carrying the store's error text. `Strict` keeps
/// 404 for genuine absence and reports everything else as 502.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    #[default]
    Legacy,
    Strict,
}

impl StatusPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict { StatusPolicy::Strict } else { StatusPolicy::Legacy }
    }

    pub fn read_error(self, err: &StoreError) -> ApiError {
        match self {
            StatusPolicy::Strict if !err.is_not_found() => ApiError::Upstream(err.to_string()),
            _ => ApiError::NotFound,
        }
    }

    pub fn write_error(self, err: &StoreError) -> ApiError {
        match self {
            StatusPolicy::Legacy => ApiError::BadRequest(err.to_string()),
            StatusPolicy::Strict => ApiError::Upstream(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("timed out after {0:?} waiting for in-flight requests")]
    Timeout(Duration),
    #[error("server task failed: {0}")]
    Serve(String),
    #[error("server task join error: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("state store client missing in phase {0:?}")]
    MissingStore(Phase),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("state store client: {0}")]
    Store(#[from] StoreError),
    #[error("bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("server shutdown: {0}")]
    Shutdown(#[from] ShutdownError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> StoreError {
        StoreError::Transport("connection refused".into())
    }

    #[test]
    fn legacy_policy_conflates_read_failures() {
        let p = StatusPolicy::Legacy;
        assert_eq!(p.read_error(&StoreError::not_found("s", "k")), ApiError::NotFound);
        assert_eq!(p.read_error(&transport()), ApiError::NotFound);
        assert_eq!(
            p.write_error(&transport()),
            ApiError::BadRequest("state store unreachable: connection refused".into())
        );
    }

    #[test]
    fn strict_policy_separates_dependency_failures() {
        let p = StatusPolicy::from_strict(true);
        assert_eq!(p.read_error(&StoreError::not_found("s", "k")), ApiError::NotFound);
        assert!(matches!(p.read_error(&transport()), ApiError::Upstream(_)));
        assert!(matches!(p.write_error(&StoreError::Closed), ApiError::Upstream(_)));
    }

    #[test]
    fn api_error_status_codes() {
        let status = |e: ApiError| e.into_response().status();
        assert_eq!(status(ApiError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ApiError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(ApiError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
    }
}
