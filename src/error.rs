use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Process-level and HTTP-surface errors.
#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("redis error: {0}")]
    Redis(String),
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Redis(_) => 503,
            _ => 500,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(ResponseError::status_code(self)).json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Redis(e.to_string())
    }
}

/// Connection-level authentication failure. Fatal to the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("session cookie missing")]
    Missing,

    #[error("session cookie signature invalid")]
    Invalid,

    #[error("session expired")]
    Expired,

    #[error("session not found")]
    NotFound,

    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AuthError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Missing => "missing",
            AuthError::Invalid => "invalid",
            AuthError::Expired => "expired",
            AuthError::NotFound => "not_found",
            AuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

/// Session store backend failure. Authentication treats it as unavailable,
/// never as a missing session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store unreachable: {0}")]
    Unreachable(String),

    #[error("session lookup failed: {0}")]
    Lookup(String),
}

impl From<redis::RedisError> for SessionStoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            SessionStoreError::Unreachable(e.to_string())
        } else {
            SessionStoreError::Lookup(e.to_string())
        }
    }
}

impl From<SessionStoreError> for AuthError {
    fn from(e: SessionStoreError) -> Self {
        AuthError::StoreUnavailable(e.to_string())
    }
}

/// Message-level input error. Echoed to the sender, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message must carry a body or an attachment")]
    EmptyMessage,

    #[error("message body exceeds {max} bytes")]
    BodyTooLong { max: usize },

    #[error("recipient {0} does not exist")]
    UnknownRecipient(i64),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

impl ValidationError {
    /// Wire code carried by `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyMessage => "empty_message",
            ValidationError::BodyTooLong { .. } => "body_too_long",
            ValidationError::UnknownRecipient(_) => "unknown_recipient",
            ValidationError::MalformedFrame(_) => "malformed_frame",
        }
    }
}

/// Persistence collaborator failure. Surfaced to the sender as retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    #[error("persistence query failed: {0}")]
    Query(String),
}

impl From<tokio_postgres::Error> for PersistenceError {
    fn from(e: tokio_postgres::Error) -> Self {
        PersistenceError::Query(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for PersistenceError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        PersistenceError::Unavailable(e.to_string())
    }
}

/// Failure to push one frame to one handle. Isolated and logged only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("send timed out")]
    Timeout,

    #[error("failed to serialize frame: {0}")]
    Serialization(String),
}

impl DeliveryError {
    pub fn reason(&self) -> &'static str {
        match self {
            DeliveryError::Closed => "closed",
            DeliveryError::Timeout => "timeout",
            DeliveryError::Serialization(_) => "serialization",
        }
    }
}

/// Outcome of a failed relay call, scoped to that single call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl RelayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Persistence(_))
    }
}

/// Reasons a real-time service refuses an upgrade.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("websocket handshake failed: {0}")]
    Handshake(actix_web::Error),

    #[error("bad upgrade request: {0}")]
    BadRequest(String),
}

impl UpgradeError {
    pub fn reason(&self) -> &'static str {
        match self {
            UpgradeError::Auth(e) => e.reason(),
            UpgradeError::Handshake(_) => "handshake",
            UpgradeError::BadRequest(_) => "bad_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UpgradeError::Auth(AuthError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            UpgradeError::Auth(_) => StatusCode::UNAUTHORIZED,
            UpgradeError::Handshake(e) => e.as_response_error().status_code(),
            UpgradeError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}
