//! Configuration for triblob components
//!
//! Values come from an optional TOML file, then `TRIBLOB__*` environment
//! variables (e.g. `TRIBLOB__WORKER__BLOB_ROOT`), and finally CLI flags
//! applied by each binary.

use crate::common::chunk_file::DEFAULT_CHUNK_SIZE;
use crate::common::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub master: MasterConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub frontend: FrontendConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load the configuration file (if any) and environment overrides.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("triblob").required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("TRIBLOB").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Rocksdb,
    Memory,
}

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Bind address for the master HTTP API
    #[serde(default = "default_master_bind")]
    pub bind_addr: SocketAddr,

    /// Metadata store path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_backend")]
    pub backend: MetadataBackend,
}

fn default_master_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 50051))
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./master-data")
}
fn default_backend() -> MetadataBackend {
    MetadataBackend::Rocksdb
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_master_bind(),
            db_path: default_db_path(),
            backend: default_backend(),
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Bind address for the worker HTTP API
    #[serde(default = "default_worker_bind")]
    pub bind_addr: SocketAddr,

    /// Address other nodes use to reach this worker
    #[serde(default = "default_worker_advertise")]
    pub advertise_addr: String,

    /// Master shards, in shard order
    #[serde(default = "default_masters")]
    pub masters: Vec<String>,

    /// Directory holding one file per blob hash
    #[serde(default = "default_blob_root")]
    pub blob_root: PathBuf,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Registration attempts before giving up
    #[serde(default = "default_register_retries")]
    pub register_retries: usize,

    #[serde(default = "default_register_delay")]
    pub register_delay_ms: u64,
}

fn default_worker_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 50042))
}
fn default_worker_advertise() -> String {
    "http://127.0.0.1:50042".to_string()
}
fn default_masters() -> Vec<String> {
    vec!["http://127.0.0.1:50051".to_string()]
}
fn default_blob_root() -> PathBuf {
    PathBuf::from("./blobs")
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_register_retries() -> usize {
    10
}
fn default_register_delay() -> u64 {
    500
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_worker_bind(),
            advertise_addr: default_worker_advertise(),
            masters: default_masters(),
            blob_root: default_blob_root(),
            chunk_size: default_chunk_size(),
            hash_algorithm: HashAlgorithm::default(),
            register_retries: default_register_retries(),
            register_delay_ms: default_register_delay(),
        }
    }
}

/// Frontend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_bind")]
    pub bind_addr: SocketAddr,

    /// Master shards, in shard order
    #[serde(default = "default_masters")]
    pub masters: Vec<String>,

    /// Scratch directory for buffering uploads
    #[serde(default = "default_scratch_root")]
    pub scratch_root: PathBuf,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    /// Also delete worker-side files when a blob is deleted
    #[serde(default)]
    pub purge_worker_copies: bool,
}

fn default_frontend_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 50041))
}
fn default_scratch_root() -> PathBuf {
    PathBuf::from("./scratch")
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_frontend_bind(),
            masters: default_masters(),
            scratch_root: default_scratch_root(),
            chunk_size: default_chunk_size(),
            hash_algorithm: HashAlgorithm::default(),
            purge_worker_copies: false,
        }
    }
}

/// Reject settings the services cannot run with.
pub fn validate_masters(masters: &[String]) -> crate::Result<()> {
    if masters.is_empty() {
        return Err(crate::Error::InvalidConfig(
            "at least one master address is required".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.worker.chunk_size, 1024 * 1024);
        assert_eq!(config.master.backend, MetadataBackend::Rocksdb);
        assert!(!config.frontend.purge_worker_copies);
        assert_eq!(config.frontend.masters.len(), 1);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[worker]
advertise_addr = "http://10.0.0.7:50042"
masters = ["http://m0:50051", "http://m1:50051"]
hash_algorithm = "blake3"

[frontend]
purge_worker_copies = true
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.worker.masters.len(), 2);
        assert_eq!(config.worker.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(config.worker.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.frontend.purge_worker_copies);
    }

    #[test]
    fn test_validate_masters() {
        assert!(validate_masters(&[]).is_err());
        assert!(validate_masters(&["http://m0".to_string()]).is_ok());
    }
}
