//! HTTP API for the frontend
//!
//! Endpoints:
//! - `GET /health`
//! - `POST /blob` streaming body, `x-blob-size` header -> `{blob_hash}`
//! - `GET /blob/:hash` streaming body
//! - `DELETE /blob/:hash` -> `{delete_result, copies, purged}`

use crate::common::stream::upload_stream;
use crate::common::Error;
use crate::frontend::orchestrator::FrontendOrchestrator;
use crate::worker::http::{body_chunks, chunk_response};
use axum::{
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Declared blob size in bytes, sent ahead of the body.
pub const BLOB_SIZE_HEADER: &str = "x-blob-size";

#[derive(Clone)]
pub struct FrontendState {
    pub orchestrator: Arc<FrontendOrchestrator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub blob_hash: String,
}

pub fn create_router(orchestrator: Arc<FrontendOrchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/blob", post(upload_blob))
        .route("/blob/:hash", get(get_blob).delete(delete_blob))
        .layer(TraceLayer::new_for_http())
        .with_state(FrontendState { orchestrator })
}

fn declared_size(headers: &HeaderMap) -> Result<u64, Error> {
    let value = headers.get(BLOB_SIZE_HEADER).ok_or_else(|| {
        Error::InvalidArgument(format!("missing {} header", BLOB_SIZE_HEADER))
    })?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::InvalidArgument(format!("malformed {} header", BLOB_SIZE_HEADER)))
}

async fn health(State(state): State<FrontendState>) -> Result<Json<Value>, Error> {
    state.orchestrator.health_check().await?;
    Ok(Json(json!({ "status": "ok", "role": "frontend" })))
}

async fn upload_blob(
    State(state): State<FrontendState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, Error> {
    let size = declared_size(&headers)?;
    let blob_hash = state
        .orchestrator
        .upload_blob(upload_stream(size, body_chunks(body)))
        .await?;
    Ok(Json(UploadResponse { blob_hash }))
}

async fn get_blob(
    State(state): State<FrontendState>,
    Path(hash): Path<String>,
) -> Result<Response, Error> {
    let chunks = state.orchestrator.get_blob(&hash).await?;
    Ok(chunk_response(chunks))
}

async fn delete_blob(
    State(state): State<FrontendState>,
    Path(hash): Path<String>,
) -> Result<Json<Value>, Error> {
    let report = state.orchestrator.delete_blob(&hash).await?;
    Ok(Json(json!({
        "delete_result": "ok",
        "copies": report.copies,
        "purged": report.purged,
    })))
}
