use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) status: &'static str,
    pub(crate) bytes: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
