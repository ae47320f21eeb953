//! HTTP API for a master shard
//!
//! Endpoints:
//! - `GET /health`
//! - `POST /workers-to-save` `{blob_hash, size_mb}` -> `{addresses}`
//! - `GET /blob/:hash/worker` -> `{address}`
//! - `POST /notify-saved` `{blob_hash, worker_address}`
//! - `POST /register` `{address, space_available_mb}`
//! - `DELETE /blob/:hash` -> `{addresses}`

use crate::common::Error;
use crate::master::api::{
    MasterApi, NotifySavedRequest, RegisterRequest, WorkerResponse, WorkersResponse,
    WorkersToSaveRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Master requests are small JSON documents.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct MasterState {
    pub service: Arc<dyn MasterApi>,
}

pub fn create_router(service: Arc<dyn MasterApi>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workers-to-save", post(workers_to_save))
        .route("/blob/:hash/worker", get(worker_with_blob))
        .route("/blob/:hash", delete(delete_blob))
        .route("/notify-saved", post(notify_saved))
        .route("/register", post(register))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(MasterState { service })
}

async fn health(State(state): State<MasterState>) -> Result<Json<Value>, Error> {
    state.service.healthcheck().await?;
    Ok(Json(json!({ "status": "ok", "role": "master" })))
}

async fn workers_to_save(
    State(state): State<MasterState>,
    Json(req): Json<WorkersToSaveRequest>,
) -> Result<Json<WorkersResponse>, Error> {
    let addresses = state
        .service
        .get_workers_to_save_blob(&req.blob_hash, req.size_mb)
        .await?;
    Ok(Json(WorkersResponse { addresses }))
}

async fn worker_with_blob(
    State(state): State<MasterState>,
    Path(hash): Path<String>,
) -> Result<Json<WorkerResponse>, Error> {
    let address = state.service.get_worker_with_blob(&hash).await?;
    Ok(Json(WorkerResponse { address }))
}

async fn notify_saved(
    State(state): State<MasterState>,
    Json(req): Json<NotifySavedRequest>,
) -> Result<StatusCode, Error> {
    state
        .service
        .notify_blob_saved(&req.blob_hash, &req.worker_address)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register(
    State(state): State<MasterState>,
    Json(req): Json<RegisterRequest>,
) -> Result<StatusCode, Error> {
    state
        .service
        .register_worker(&req.address, req.space_available_mb)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_blob(
    State(state): State<MasterState>,
    Path(hash): Path<String>,
) -> Result<Json<WorkersResponse>, Error> {
    let addresses = state.service.delete_blob(&hash).await?;
    Ok(Json(WorkersResponse { addresses }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SequentialIdGenerator;
    use crate::master::memory::MemoryRepository;
    use crate::master::placement::MasterPlacementService;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        let service = MasterPlacementService::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(SequentialIdGenerator::new("c")),
        );
        create_router(Arc::new(service))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exhausted_placement_status() {
        let app = router();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/register",
                json!({ "address": "w1", "space_available_mb": 10 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(json_request(
                "POST",
                "/workers-to-save",
                json!({ "blob_hash": "h", "size_mb": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INSUFFICIENT_STORAGE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error: crate::common::ErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.code, crate::common::ErrorCode::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let padding = "x".repeat(MAX_REQUEST_BYTES);
        let response = router()
            .oneshot(json_request(
                "POST",
                "/register",
                json!({ "address": padding, "space_available_mb": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_missing_blob_is_404() {
        let response = router()
            .oneshot(Request::get("/blob/abc/worker").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
