//! Unified application error model and mapping helpers.
//! Component errors (directory, session store) convert into `AppError` at the
//! request boundary, where they are rendered as HTTP responses.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::{DirectoryError, SessionStoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Directory { code: String, message: String },
    Session { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Directory { code, .. }
            | AppError::Session { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Directory { message, .. }
            | AppError::Session { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn directory<S: Into<String>>(code: S, msg: S) -> Self { AppError::Directory { code: code.into(), message: msg.into() } }
    pub fn session<S: Into<String>>(code: S, msg: S) -> Self { AppError::Session { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Directory { .. } => 502,
            AppError::Session { .. } => 500,
            AppError::Internal { .. } => 500,
        }
    }

    /// True for failures of the service itself or its dependencies, as opposed to bad client input.
    pub fn is_server_fault(&self) -> bool {
        self.http_status() >= 500
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        let code = match &err {
            DirectoryError::Timeout(_) => "directory_timeout",
            DirectoryError::Transport(_) => "directory_unreachable",
            DirectoryError::Status(_) => "directory_status",
            DirectoryError::Decode(_) => "directory_decode",
        };
        AppError::Directory { code: code.into(), message: err.to_string() }
    }
}

impl From<SessionStoreError> for AppError {
    fn from(err: SessionStoreError) -> Self {
        let code = match &err {
            SessionStoreError::Io(_) => "session_io",
            SessionStoreError::Corrupt { .. } => "session_corrupt",
            SessionStoreError::Encode(_) => "session_encode",
            SessionStoreError::InvalidId => "session_invalid_id",
        };
        AppError::Session { code: code.into(), message: err.to_string() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}
