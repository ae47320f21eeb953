//! HTTP API for a worker
//!
//! Endpoints:
//! - `GET /health`
//! - `GET /free-storage` -> `{bytes}`
//! - `PUT /blob/:hash` streaming body, the path hash is the claimed hash
//! - `GET /blob/:hash` streaming body
//! - `DELETE /blob/:hash`

use crate::common::stream::save_blob_stream;
use crate::common::{ChunkStream, Error};
use crate::worker::api::{FreeStorageResponse, WorkerApi};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct WorkerState {
    pub service: Arc<dyn WorkerApi>,
}

pub fn create_router(service: Arc<dyn WorkerApi>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/free-storage", get(free_storage))
        .route("/blob/:hash", get(get_blob).put(save_blob).delete(delete_blob))
        .layer(TraceLayer::new_for_http())
        .with_state(WorkerState { service })
}

/// Request body as a chunk stream; transport failures mean the sender is gone.
pub(crate) fn body_chunks(body: Body) -> ChunkStream {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(|e| Error::Cancelled(format!("request body: {}", e))))
        .boxed()
}

/// Streaming octet response over a chunk stream.
pub(crate) fn chunk_response(chunks: ChunkStream) -> Response {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(chunks),
    )
        .into_response()
}

async fn health(State(state): State<WorkerState>) -> Result<Json<Value>, Error> {
    state.service.healthcheck().await?;
    Ok(Json(json!({ "status": "ok", "role": "worker" })))
}

async fn free_storage(
    State(state): State<WorkerState>,
) -> Result<Json<FreeStorageResponse>, Error> {
    let bytes = state.service.get_free_storage().await?;
    Ok(Json(FreeStorageResponse { bytes }))
}

async fn save_blob(
    State(state): State<WorkerState>,
    Path(hash): Path<String>,
    body: Body,
) -> Result<StatusCode, Error> {
    state
        .service
        .save_blob(save_blob_stream(hash, body_chunks(body)))
        .await?;
    Ok(StatusCode::CREATED)
}

async fn get_blob(
    State(state): State<WorkerState>,
    Path(hash): Path<String>,
) -> Result<Response, Error> {
    let chunks = state.service.get_blob(&hash).await?;
    Ok(chunk_response(chunks))
}

async fn delete_blob(
    State(state): State<WorkerState>,
    Path(hash): Path<String>,
) -> Result<StatusCode, Error> {
    state.service.delete_blob(&hash).await?;
    Ok(StatusCode::NO_CONTENT)
}
