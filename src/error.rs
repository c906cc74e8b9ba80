//! Unified application error model and mapping helpers.
//! Every failure surfaced to an HTTP caller goes through `AppError`, which knows
//! its status code, a short machine code and the human message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const MSG_METHOD_NOT_ALLOWED: &str = "Invalid HTTP Method. it accepts only POST";
pub const MSG_UNSUPPORTED_CONTENT_TYPE: &str = "Invalid content type. It accepts JSON only.";
pub const MSG_MALFORMED_CREDENTIALS: &str = "Invalid attributes in the payload. Required username and password";
pub const MSG_INVALID_CREDENTIALS: &str = "Bad credentials";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    MethodNotAllowed { code: String, message: String },
    UnsupportedContentType { code: String, message: String },
    MalformedCredentials { code: String, message: String },
    InvalidCredentials { code: String, message: String },
    Unauthenticated { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    StoreUnavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::MethodNotAllowed { code, .. }
            | AppError::UnsupportedContentType { code, .. }
            | AppError::MalformedCredentials { code, .. }
            | AppError::InvalidCredentials { code, .. }
            | AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::StoreUnavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::MethodNotAllowed { message, .. }
            | AppError::UnsupportedContentType { message, .. }
            | AppError::MalformedCredentials { message, .. }
            | AppError::InvalidCredentials { message, .. }
            | AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::StoreUnavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn method_not_allowed() -> Self {
        AppError::MethodNotAllowed { code: "method_not_allowed".into(), message: MSG_METHOD_NOT_ALLOWED.into() }
    }
    pub fn unsupported_content_type() -> Self {
        AppError::UnsupportedContentType { code: "unsupported_content_type".into(), message: MSG_UNSUPPORTED_CONTENT_TYPE.into() }
    }
    pub fn malformed_credentials() -> Self {
        AppError::MalformedCredentials { code: "malformed_credentials".into(), message: MSG_MALFORMED_CREDENTIALS.into() }
    }
    /// Same code and message whether the user is unknown or the password is wrong.
    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials { code: "invalid_credentials".into(), message: MSG_INVALID_CREDENTIALS.into() }
    }
    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated { code: "unauthenticated".into(), message: "Full authentication is required to access this resource".into() }
    }
    pub fn forbidden<S: Into<String>>(msg: S) -> Self { AppError::Forbidden { code: "forbidden".into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::NotFound { code: "not_found".into(), message: msg.into() } }
    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self { AppError::StoreUnavailable { code: "store_unavailable".into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AppError::Internal { code: "internal".into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::MethodNotAllowed { .. } => 405,
            AppError::UnsupportedContentType { .. } => 415,
            AppError::MalformedCredentials { .. } => 400,
            AppError::InvalidCredentials { .. } => 401,
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::StoreUnavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Client errors are never worth retrying; server-side ones might be.
    pub fn is_client_error(&self) -> bool { (400..500).contains(&self.http_status()) }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Prefer an AppError carried inside the chain; otherwise it is ours to blame
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::internal(other.to_string()),
        }
    }
}

impl From<crate::storage::StoreError> for AppError {
    fn from(err: crate::storage::StoreError) -> Self {
        AppError::store_unavailable(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.is_client_error() {
            tracing::error!(target: "http", code = %self.code_str(), "{}", self.message());
        }
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        }))).into_response()
    }
}
