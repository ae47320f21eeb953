//! Chunk storage worker
//!
//! Workers hold one file per blob hash, verify incoming blobs against their
//! claimed hash, and confirm saved copies with the owning master shard.

pub mod api;
pub mod client;
pub mod disk;
pub mod http;
pub mod server;
pub mod storage;

pub use api::{HttpWorkerConnector, StaticWorkerConnector, WorkerApi, WorkerConnector};
pub use client::WorkerClient;
pub use server::WorkerServer;
pub use storage::WorkerStorageService;
