//! Placement master
//!
//! A master shard owns the worker-state repository for the hashes routed to
//! it. It is responsible for:
//! - Worker registration and capacity accounting
//! - Replica placement with space reservation
//! - Confirming saved copies and resolving readable ones
//! - Dropping copy metadata on delete

pub mod api;
pub mod client;
pub mod http;
pub mod memory;
pub mod placement;
pub mod repository;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod server;

pub use api::MasterApi;
pub use client::MasterClient;
pub use memory::MemoryRepository;
pub use placement::{MasterPlacementService, REPLICATION_FACTOR};
pub use repository::{BlobCopy, BlobState, WorkerState, WorkerStateRepository};
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksRepository;
pub use server::Master;
