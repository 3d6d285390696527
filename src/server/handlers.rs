use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use super::models::UploadResponse;
use super::state::{OUTPUT_FILE, ServerState};
use super::util::{ApiResult, api_error, reset_work_dir, run_blocking};
use crate::compositor::RenderReport;
use crate::extract::ExtractedRegion;
use crate::pdf::DocumentInfo;
use crate::pipeline::RegionTranslator;
use crate::translate::TranslatedRegion;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub async fn run_server(pipeline: RegionTranslator, work_dir: PathBuf, addr: String) -> Result<()> {
    let app = router(Arc::new(ServerState::new(pipeline, work_dir)));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/verify-pdf", get(verify_pdf))
        .route("/extract-regions", get(extract_regions))
        .route("/translate-regions", get(translate_regions))
        .route("/translate-pdf", post(translate_pdf))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("content-disposition,x-unfit-regions"),
    );
}

async fn upload(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> ApiResult<Json<UploadResponse>> {
    if body.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "request body is empty"));
    }
    let _guard = state.work_lock.lock().await;
    let size = body.len();
    let work_state = state.clone();
    run_blocking(move || async move {
        reset_work_dir(&work_state.work_dir)?;
        let path = work_state.input_path();
        std::fs::write(&path, &body)
            .with_context(|| format!("failed to store upload: {}", path.display()))
    })
    .await?;
    info!(bytes = size, "stored upload");
    Ok(Json(UploadResponse {
        status: "uploaded",
        bytes: size,
    }))
}

fn require_upload(state: &ServerState) -> ApiResult<PathBuf> {
    let path = state.input_path();
    if !path.is_file() {
        return Err(api_error(StatusCode::NOT_FOUND, "no PDF uploaded"));
    }
    Ok(path)
}

async fn verify_pdf(State(state): State<Arc<ServerState>>) -> ApiResult<Json<DocumentInfo>> {
    let _guard = state.work_lock.lock().await;
    let input = require_upload(&state)?;
    let work_state = state.clone();
    let info = run_blocking(move || async move { work_state.pipeline.info(&input) }).await?;
    Ok(Json(info))
}

async fn extract_regions(
    State(state): State<Arc<ServerState>>,
) -> ApiResult<Json<Vec<ExtractedRegion>>> {
    let _guard = state.work_lock.lock().await;
    let input = require_upload(&state)?;
    let work_state = state.clone();
    let regions = run_blocking(move || async move { work_state.pipeline.extract(&input) }).await?;
    Ok(Json(regions))
}

async fn translate_regions(
    State(state): State<Arc<ServerState>>,
) -> ApiResult<Json<Vec<TranslatedRegion>>> {
    let _guard = state.work_lock.lock().await;
    let input = require_upload(&state)?;
    let work_state = state.clone();
    let regions =
        run_blocking(move || async move { work_state.pipeline.translate(&input).await }).await?;
    Ok(Json(regions))
}

async fn translate_pdf(State(state): State<Arc<ServerState>>) -> ApiResult<Response<Body>> {
    let _guard = state.work_lock.lock().await;
    let input = require_upload(&state)?;
    let work_state = state.clone();
    let (report, bytes): (RenderReport, Vec<u8>) = run_blocking(move || async move {
        let output = work_state.output_path();
        let report = work_state.pipeline.render(&input, &output).await?;
        let bytes = std::fs::read(&output)
            .with_context(|| format!("failed to read {}", output.display()))?;
        Ok((report, bytes))
    })
    .await?;

    let unfit = report.warnings.len().to_string();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{OUTPUT_FILE}\""),
        )
        .header("x-unfit-regions", unfit)
        .body(Body::from(bytes))
        .map_err(|err| api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::system_font;
    use crate::geometry::Rect;
    use crate::pdf::tests::{build_pdf, show_text};
    use crate::regions::{RegionSpec, RegionTemplate};
    use crate::translate::tests::Shouting;
    use serde_json::Value;

    async fn spawn(work_dir: PathBuf) -> Option<String> {
        let font = system_font()?;
        let template = RegionTemplate::new(vec![RegionSpec {
            name: "total".to_string(),
            rect: Rect::new(90.0, 750.0, 300.0, 770.0),
        }])
        .unwrap();
        let pipeline = RegionTranslator::new(template, font, Arc::new(Shouting::default()));
        let app = router(Arc::new(ServerState::new(pipeline, work_dir)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Some(format!("http://{addr}"))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn serves_the_upload_extract_render_flow() {
        let dir = tempfile::tempdir().unwrap();
        let Some(base) = spawn(dir.path().join("work")).await else {
            return;
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();

        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status(), reqwest::StatusCode::OK);
        assert_eq!(
            health.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );

        let missing = client.get(format!("{base}/verify-pdf")).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let empty = client
            .post(format!("{base}/upload"))
            .body(Vec::new())
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), reqwest::StatusCode::BAD_REQUEST);

        let pdf = build_pdf(vec![show_text(100, 80, "245.00")]);
        let uploaded = client
            .post(format!("{base}/upload"))
            .body(pdf)
            .send()
            .await
            .unwrap();
        assert_eq!(uploaded.status(), reqwest::StatusCode::OK);

        let info: Value = client
            .get(format!("{base}/verify-pdf"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["page_count"], 1);
        assert_eq!(info["is_encrypted"], false);

        let extracted: Value = client
            .get(format!("{base}/extract-regions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(extracted[0]["region_name"], "total");
        assert_eq!(extracted[0]["text"], "245.00");

        let translated: Value = client
            .get(format!("{base}/translate-regions"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(translated[0]["target_text"], "245.00");

        let rendered = client
            .post(format!("{base}/translate-pdf"))
            .send()
            .await
            .unwrap();
        assert_eq!(rendered.status(), reqwest::StatusCode::OK);
        assert_eq!(
            rendered.headers().get("content-type").unwrap(),
            "application/pdf"
        );
        assert_eq!(rendered.headers().get("x-unfit-regions").unwrap(), "0");
        let bytes = rendered.bytes().await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn garbage_upload_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let Some(base) = spawn(dir.path().join("work")).await else {
            return;
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        client
            .post(format!("{base}/upload"))
            .body(b"not a pdf".to_vec())
            .send()
            .await
            .unwrap();
        let response = client.get(format!("{base}/verify-pdf")).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("failed to open document"));
    }
}
