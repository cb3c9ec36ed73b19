//! Error types for remote operations

use thiserror::Error;

/// Errors from the remote executor and the operations built on it
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Command '{command}' exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Transfer of {remote_path} failed: {reason}")]
    Transfer { remote_path: String, reason: String },

    #[error("Timeout after {seconds}s waiting for: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
