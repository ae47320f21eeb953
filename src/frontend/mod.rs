//! Client-facing frontend
//!
//! The frontend buffers and hashes uploads, asks the owning master shard
//! where to put them, fans the bytes out to the chosen workers, and relays
//! reads back from one saved copy.

pub mod http;
pub mod orchestrator;
pub mod server;

pub use orchestrator::{DeleteReport, FrontendOrchestrator};
pub use server::Frontend;
