use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use update_agent::UpdateManifest;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/version", get(get_version))
        .route("/api/download", get(download))
        .route("/health", get(health))
}

async fn get_version(State(state): State<Arc<AppState>>) -> Result<Json<UpdateManifest>, AppError> {
    let manifest = state
        .releases
        .latest_manifest()
        .await?
        .ok_or_else(|| AppError::NotFound("Version information not available".into()))?;

    tracing::info!("Served version info: {}", manifest.version);
    Ok(Json(manifest))
}

async fn download(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let path = state
        .releases
        .latest_package()
        .await
        .ok_or_else(|| AppError::NotFound("Update file not found".into()))?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to open package: {}", e)))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to stat package: {}", e)))?
        .len();

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "update.zip".into());
    tracing::info!("Serving update file: {}", filename);

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
