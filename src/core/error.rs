//! Error types for the binding engine

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for data construction and asset loading
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel {channel} has a table of {len} frames, bundle expects 0, 1 or {expected}")]
    FrameCount {
        channel: String,
        len: usize,
        expected: usize,
    },

    #[error("no anim bundle found in {0}")]
    NoAnimBundle(PathBuf),

    #[error("file not found on search path: {0}")]
    NotFound(PathBuf),

    #[error("duplicate child name: {0}")]
    DuplicateName(String),

    #[error("invalid parent index: {0}")]
    InvalidParent(usize),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Convenience result alias
pub type Result<T> = std::result::Result<T, Error>;
