//! Error model for recordkeep.
//! The core (storage, identity) returns typed `thiserror` enums; the HTTP surface folds
//! them into `AppError`, which carries a stable code, a message and an HTTP status.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Failures of the table store and its persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested table snapshot or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    /// The candidate record has no usable `id`.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Durable read or write failed. The previously committed snapshot is untouched.
    #[error("persistence error on table '{table}': {source}")]
    Persistence {
        table: String,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot exists but does not decode as an array of records.
    #[error("corrupt snapshot for table '{table}': {reason}")]
    Corrupt { table: String, reason: String },
}

impl StoreError {
    pub fn persistence(table: &str, source: std::io::Error) -> Self {
        StoreError::Persistence { table: table.to_string(), source }
    }

    pub fn corrupt(table: &str, reason: impl Into<String>) -> Self {
        StoreError::Corrupt { table: table.to_string(), reason: reason.into() }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, StoreError::NotFound(_)) }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures of credential verification and identity lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Generic rejection; never says whether the username or the password was wrong.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    /// Refused by the login gate before verification.
    #[error("too many login attempts")]
    Throttled,
}

pub type AuthResult<T> = Result<T, AuthError>;

/// The user directory could not be built; the process must not start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load user table: {0}")]
    UserTable(#[from] StoreError),

    #[error("user record #{index} is malformed: {reason}")]
    MalformedUser { index: usize, reason: String },

    #[error("duplicate user id {0}")]
    DuplicateId(String),

    #[error("duplicate username '{0}'")]
    DuplicateUsername(String),

    #[error("user '{0}' has a plaintext secret but plaintext secrets are disabled")]
    PlaintextSecret(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    MethodNotAllowed { code: String, message: String },
    Auth { code: String, message: String },
    Throttled { code: String, message: String },
    Upstream { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::MethodNotAllowed { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Throttled { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::MethodNotAllowed { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Throttled { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn method_not_allowed<S: Into<String>>(code: S, msg: S) -> Self { AppError::MethodNotAllowed { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn throttled<S: Into<String>>(code: S, msg: S) -> Self { AppError::Throttled { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::MethodNotAllowed { .. } => 405,
            AppError::Auth { .. } => 401,
            AppError::Throttled { .. } => 429,
            AppError::Upstream { .. } => 502,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let msg = err.to_string();
        match err {
            StoreError::NotFound(_) => AppError::not_found("not_found".to_string(), msg),
            StoreError::InvalidTableName(_) => AppError::user("invalid_table".to_string(), msg),
            StoreError::InvalidRecord(_) => AppError::user("invalid_record".to_string(), msg),
            StoreError::Persistence { .. } => AppError::io("persistence_error".to_string(), msg),
            StoreError::Corrupt { .. } => AppError::internal("corrupt_snapshot".to_string(), msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::auth("invalid_credentials", "invalid username or password"),
            AuthError::NotFound => AppError::auth("unauthorized", "no active session"),
            AuthError::Throttled => AppError::throttled("throttled", "too many login attempts"),
        }
    }
}
