//! Master service interface and its wire types

use crate::common::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Placement operations of one master shard.
///
/// Implemented in process by [`MasterPlacementService`](super::MasterPlacementService)
/// and over HTTP by [`MasterClient`](super::MasterClient).
#[async_trait]
pub trait MasterApi: Send + Sync {
    async fn healthcheck(&self) -> Result<()>;

    /// Reserve space on the replica set for a new blob
    async fn get_workers_to_save_blob(&self, blob_hash: &str, size_mb: u64)
        -> Result<Vec<String>>;

    /// Address of a worker holding a saved copy
    async fn get_worker_with_blob(&self, blob_hash: &str) -> Result<String>;

    async fn notify_blob_saved(&self, blob_hash: &str, worker_address: &str) -> Result<()>;

    async fn register_worker(&self, address: &str, space_available_mb: u64) -> Result<()>;

    /// Drop every copy row of the blob. Returns the workers that held one.
    async fn delete_blob(&self, blob_hash: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersToSaveRequest {
    pub blob_hash: String,
    pub size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersResponse {
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySavedRequest {
    pub blob_hash: String,
    pub worker_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub address: String,
    pub space_available_mb: u64,
}
