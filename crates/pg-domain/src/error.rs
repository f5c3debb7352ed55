//! Shared error type used across all PayGate core crates.
//!
//! Reserved for config/programmer mistakes surfaced to an admin caller.
//! Ordinary policy denials on the tool-call path never produce this type —
//! they are [`crate::deny::DenyReason`] values carried inside an `allowed:
//! false` decision instead, since a denied call is expected control flow,
//! not an exceptional condition.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid param: {0}")]
    InvalidParam(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
