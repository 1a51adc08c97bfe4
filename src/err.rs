#![allow(non_snake_case)]

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::{Deserialize, Serialize};

/// Message shared by every rejected login so callers cannot tell an unknown
/// token from a rotated or malformed one.
pub const LOGIN_FAILED: &str = "Login failed, try again";

/// Kind reported for requests to a path the router does not know.
pub const ROUTE_NOT_FOUND: &str = "RouteNotFound";

/// Not a `NotFound`: a client talking to the wrong path must not read it as
/// its session being gone.
pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::internal(
            ROUTE_NOT_FOUND,
            format!("Invalid path: {}", path),
        )),
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Maybe<T> {
    Nothing(Error),
    Fine(Success<T>),
}

pub fn Fine<V>(v: V) -> Maybe<V>
where
    V: Serialize,
{
    Maybe::Fine(Success::of(v))
}

pub fn Nothing<V>(err: Error) -> Maybe<V> {
    Maybe::Nothing(err)
}

impl<T> Maybe<T> {
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Maybe::Nothing(err) => Err(err),
            Maybe::Fine(success) => Ok(success.value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<T> IntoResponse for Maybe<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match self {
            Maybe::Nothing(err) => Json::into_response(Json(err)),
            Maybe::Fine(success) => Json::into_response(Json(success)),
        }
    }
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "error")]
pub enum Error {
    #[error("invalid input: {}", describe_fields(.fields))]
    ValidationError { fields: Vec<FieldError> },
    #[error("{message}")]
    LimitExceeded { limit: usize, message: String },
    #[error("{message}")]
    InvalidToken { message: String },
    #[error("{message}")]
    InactiveGuardian { message: String },
    #[error("{message}")]
    AuthError { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("{message}")]
    Timeout { message: String },
    #[error("{kind}: {message}")]
    InternalError { kind: String, message: String },
    #[error("{message}")]
    Unknown { message: String },
}

fn describe_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        Json::into_response(Json(self))
    }
}

impl Error {
    pub fn unknown<S: Into<String>>(msg: S) -> Error {
        Error::Unknown {
            message: msg.into(),
        }
    }

    pub fn internal<S: Into<String>>(kind: &str, msg: S) -> Error {
        Error::InternalError {
            kind: kind.to_string(),
            message: msg.into(),
        }
    }

    pub fn invalid_token() -> Error {
        Error::InvalidToken {
            message: LOGIN_FAILED.to_string(),
        }
    }

    pub fn inactive_guardian() -> Error {
        Error::InactiveGuardian {
            message: LOGIN_FAILED.to_string(),
        }
    }

    pub fn auth<S: Into<String>>(msg: S) -> Error {
        Error::AuthError {
            message: msg.into(),
        }
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound {
            message: msg.into(),
        }
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Error {
        Error::Timeout {
            message: msg.into(),
        }
    }

    pub fn invalid(fields: Vec<FieldError>) -> Error {
        Error::ValidationError { fields }
    }

    /// Both authentication rejections look the same to an end user.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, Error::InvalidToken { .. } | Error::InactiveGuardian { .. })
    }

    /// The server no longer honours the credential the caller presented.
    pub fn revokes_session(&self) -> bool {
        matches!(
            self,
            Error::AuthError { .. } | Error::InactiveGuardian { .. } | Error::NotFound { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::internal("IOError", io.to_string())
    }
}

impl From<postcard::Error> for Error {
    fn from(err: postcard::Error) -> Self {
        Self::internal("SerializationError", err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("SerializationError", err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::internal("DatabaseError", err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(format!("Request timed out: {}", err))
        } else {
            Self::internal("TransportError", err.to_string())
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown {
            message: err.to_string(),
        }
    }
}
