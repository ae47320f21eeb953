//! # triblob
//!
//! A content-addressed distributed blob store with:
//! - Three-way replicated placement with space reservation
//! - Sharded placement masters, routed by blob hash
//! - Chunked streaming uploads and downloads
//! - End-to-end hash verification on every worker
//! - RocksDB-backed placement metadata
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!                 ┌──────────────┐
//!   client ──────▶│   Frontend   │  buffer + hash, fan out
//!                 └──┬────────┬──┘
//!          placement │        │ chunks
//!             ┌──────▼─────┐  │
//!             │ Master     │  │   one shard per hash range,
//!             │ shards     │◀─┼─┐ notify on save
//!             └────────────┘  │ │
//!        ┌────────────┬───────▼─┴──┬────────────┐
//!   ┌────▼─────┐ ┌────▼─────┐ ┌────▼─────┐ ┌────▼─────┐
//!   │ Worker 1 │ │ Worker 2 │ │ Worker 3 │ │ Worker N │
//!   └──────────┘ └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a master
//! ```bash
//! triblob-master serve --bind 0.0.0.0:50051 --db ./master-data
//! ```
//!
//! ### Start a worker
//! ```bash
//! triblob-worker serve \
//!   --bind 0.0.0.0:50042 \
//!   --advertise http://10.0.0.5:50042 \
//!   --blobs ./blobs \
//!   --masters http://localhost:50051
//! ```
//!
//! ### Start the frontend
//! ```bash
//! triblob-frontend serve --bind 0.0.0.0:50041 --masters http://localhost:50051
//! ```
//!
//! ### Use the CLI
//! ```bash
//! triblob upload ./data.bin
//! triblob get <hash> --output ./out.bin
//! triblob delete <hash>
//! triblob demo
//! ```

pub mod common;
pub mod frontend;
pub mod master;
pub mod worker;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use frontend::{Frontend, FrontendOrchestrator};
pub use master::{Master, MasterPlacementService};
pub use worker::{WorkerServer, WorkerStorageService};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
