use std::path::PathBuf;

use thiserror::Error;

/// Failures the overlay pipeline distinguishes.
///
/// Startup failures (`FontMissing`, `FontInvalid`, `RegionConfig`) abort before
/// any document is touched. The rest abort the current run only. Regions that
/// cannot be fit are not errors at all; they end up in the `RenderReport`.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("overlay font not found: {0}")]
    FontMissing(PathBuf),

    #[error("failed to parse overlay font {path}: {message}")]
    FontInvalid { path: PathBuf, message: String },

    #[error("invalid region template: {0}")]
    RegionConfig(String),

    #[error("failed to open document {path}: {message}")]
    DocumentOpen { path: PathBuf, message: String },

    #[error("document is encrypted: {0}")]
    Encrypted(PathBuf),

    #[error("failed to read page {page}: {message}")]
    CorruptPage { page: usize, message: String },

    #[error("translation failed: {0}")]
    Translation(String),
}

impl OverlayError {
    pub fn region_config(message: impl Into<String>) -> Self {
        Self::RegionConfig(message.into())
    }

    pub fn corrupt_page(page: usize, message: impl ToString) -> Self {
        Self::CorruptPage {
            page,
            message: message.to_string(),
        }
    }
}
