//! Error types shared by every component.

use thiserror::Error;

use crate::asset_patch::CodecError;

/// Errors surfaced by store, selection, mutation and asset operations.
///
/// Per-chunk commit failures are deliberately absent: the style engine counts
/// them in its report instead of returning them.
#[derive(Debug, Error)]
pub enum SwapperError {
    #[error("No card database location is configured")]
    ConfigurationMissing,

    #[error("Card database unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Artwork container holds no texture: {0}")]
    NoTexture(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Texture codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Audit log error: {0}")]
    Audit(String),
}

pub type Result<T> = std::result::Result<T, SwapperError>;

impl SwapperError {
    pub(crate) fn poisoned() -> Self {
        SwapperError::StoreUnavailable("connection lock poisoned".to_string())
    }
}
