use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use axum::Json;
use axum::http::StatusCode;

use super::models::ErrorResponse;
use crate::error::OverlayError;
use crate::settings;

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);
pub(crate) type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Documents the service cannot process are the caller's problem; anything
/// else is ours.
pub(crate) fn status_for(err: &anyhow::Error) -> StatusCode {
    match err.downcast_ref::<OverlayError>() {
        Some(OverlayError::DocumentOpen { .. } | OverlayError::Encrypted(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Some(OverlayError::Translation(_)) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Runs document work on the blocking pool; lopdf parsing and writing are
/// synchronous and can take a while on large files.
pub(crate) async fn run_blocking<T, F, Fut>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>>,
    T: Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    let result = tokio::task::spawn_blocking(move || handle.block_on(work()))
        .await
        .map_err(|err| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("server task failed: {}", err),
            )
        })?;
    result.map_err(|err| api_error(status_for(&err), format!("{err:#}")))
}

pub fn resolve_work_dir(settings: &settings::Settings) -> PathBuf {
    match settings.server_work_dir.as_deref() {
        Some(dir) => PathBuf::from(dir),
        None => std::env::temp_dir().join("pdf-region-translator"),
    }
}

/// Empties the work directory, creating it if needed.
pub(crate) fn reset_work_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("failed to clear work dir: {}", dir.display()))?;
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create work dir: {}", dir.display()))
}
