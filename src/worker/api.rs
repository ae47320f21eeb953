//! Worker service interface and address resolution

use crate::common::{ChunkStream, Error, Result, SaveBlobStream};
use crate::worker::client::WorkerClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Chunk storage operations of one worker.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    async fn healthcheck(&self) -> Result<()>;

    /// Free bytes on the volume holding the blob root
    async fn get_free_storage(&self) -> Result<u64>;

    /// Store a blob sent as its hash followed by chunks.
    async fn save_blob(&self, stream: SaveBlobStream) -> Result<()>;

    async fn get_blob(&self, blob_hash: &str) -> Result<ChunkStream>;

    async fn delete_blob(&self, blob_hash: &str) -> Result<()>;
}

/// Turns the worker addresses handed out by the master into handles.
pub trait WorkerConnector: Send + Sync {
    fn connect(&self, address: &str) -> Result<Arc<dyn WorkerApi>>;
}

/// Reaches workers over HTTP, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpWorkerConnector {
    http: reqwest::Client,
}

impl HttpWorkerConnector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: WorkerClient::http_client()?,
        })
    }
}

impl WorkerConnector for HttpWorkerConnector {
    fn connect(&self, address: &str) -> Result<Arc<dyn WorkerApi>> {
        Ok(Arc::new(WorkerClient::with_client(address, self.http.clone())))
    }
}

/// Fixed address table, for in-process clusters.
#[derive(Default, Clone)]
pub struct StaticWorkerConnector {
    workers: HashMap<String, Arc<dyn WorkerApi>>,
}

impl StaticWorkerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: impl Into<String>, worker: Arc<dyn WorkerApi>) {
        self.workers.insert(address.into(), worker);
    }
}

impl WorkerConnector for StaticWorkerConnector {
    fn connect(&self, address: &str) -> Result<Arc<dyn WorkerApi>> {
        self.workers
            .get(address)
            .cloned()
            .ok_or_else(|| Error::Cancelled(format!("no route to worker {}", address)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeStorageResponse {
    pub bytes: u64,
}
