//! Error types for page capture and comparison

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the page renderer and the capture protocol
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Renderer failed to start: {0}")]
    DriverStartup(String),

    #[error("Renderer request '{request}' failed: {reason}")]
    Request { request: String, reason: String },

    #[error("Renderer session closed unexpectedly")]
    Disconnected,

    #[error("Timeout after {seconds}s waiting for: {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Invalid renderer response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Screenshot decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors that keep a comparator from producing a score.
///
/// These are recovered per (page, comparator) pair and never abort a site.
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Screenshot dimensions differ: before {before:?} vs after {after:?}")]
    DimensionMismatch {
        before: (u32, u32),
        after: (u32, u32),
    },

    #[error("Before console log is empty; similarity is undefined")]
    EmptyBaseline,

    #[error("Both documents are empty; similarity is undefined")]
    EmptyDocument,

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cannot read artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Comparator task failed: {0}")]
    Task(String),
}
