//! Error taxonomy shared by the gate, the pipeline and the connection pumps

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::types::GroupId;

pub type HubResult<T> = Result<T, HubError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HubError {
    #[error("missing or invalid token")]
    Unauthenticated,

    #[error("not a member of group {0}")]
    Forbidden(GroupId),

    #[error("group {0} not found")]
    NotFound(GroupId),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("failed to persist message: {0}")]
    PersistenceFailure(String),

    #[error("outbound queue full, consumer evicted")]
    SlowConsumer,

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("hub is not running")]
    HubClosed,
}

impl HubError {
    /// Stable code sent to clients in `error` frames and HTTP bodies
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Unauthenticated => "UNAUTHENTICATED",
            HubError::Forbidden(_) => "FORBIDDEN",
            HubError::NotFound(_) => "NOT_FOUND",
            HubError::BadRequest(_) => "BAD_REQUEST",
            HubError::InvalidPayload(_) => "INVALID_PAYLOAD",
            HubError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            HubError::SlowConsumer => "SLOW_CONSUMER",
            HubError::TransportFailure(_) => "TRANSPORT_FAILURE",
            HubError::RateLimited => "RATE_LIMITED",
            HubError::HubClosed => "HUB_CLOSED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HubError::Unauthenticated => StatusCode::UNAUTHORIZED,
            HubError::Forbidden(_) => StatusCode::FORBIDDEN,
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::BadRequest(_) | HubError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            HubError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            HubError::PersistenceFailure(_) | HubError::HubClosed => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            HubError::SlowConsumer | HubError::TransportFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
