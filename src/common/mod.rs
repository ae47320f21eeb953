//! Common utilities and types shared across triblob

pub mod chunk_file;
pub mod config;
pub mod error;
pub mod hash;
pub mod stream;
pub mod utils;

pub use chunk_file::{ChunkFile, ChunkStore, Chunks, DEFAULT_CHUNK_SIZE};
pub use config::{Config, FrontendConfig, MasterConfig, MetadataBackend, WorkerConfig};
pub use error::{check_response, Error, ErrorBody, ErrorCode, Result};
pub use hash::{master_index, shard_key, HashAlgorithm, IncrementalHasher};
pub use stream::{ChunkStream, SaveBlobMessage, SaveBlobStream, UploadMessage, UploadStream};
pub use utils::{
    bytes_to_mb, format_bytes, http_base_url, retry_with_backoff, shutdown_signal, timestamp_now,
    validate_blob_id, IdGenerator, SequentialIdGenerator, UuidGenerator, MIB,
};
