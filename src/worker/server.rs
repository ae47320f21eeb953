//! Worker server

use crate::common::config::validate_masters;
use crate::common::{
    format_bytes, retry_with_backoff, shutdown_signal, ChunkStore, Error, Result, WorkerConfig,
    MIB,
};
use crate::master::{MasterApi, MasterClient};
use crate::worker::disk;
use crate::worker::http::create_router;
use crate::worker::storage::WorkerStorageService;
use std::sync::Arc;
use std::time::Duration;

pub struct WorkerServer {
    config: WorkerConfig,
}

impl WorkerServer {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting worker: {}", self.config.advertise_addr);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Blob root: {}", self.config.blob_root.display());
        tracing::info!("  Masters: {:?}", self.config.masters);

        validate_masters(&self.config.masters)?;
        let store = ChunkStore::open(&self.config.blob_root, self.config.chunk_size)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let masters: Vec<Arc<dyn MasterApi>> = self
            .config
            .masters
            .iter()
            .map(|address| {
                Arc::new(MasterClient::with_client(address, http.clone())) as Arc<dyn MasterApi>
            })
            .collect();

        let service = Arc::new(WorkerStorageService::new(
            store,
            self.config.hash_algorithm,
            self.config.advertise_addr.clone(),
            masters.clone(),
        )?);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        self.register(&service, &masters).await?;

        tracing::info!("✓ Worker ready");
        axum::serve(listener, create_router(service))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))
    }

    /// Register with every shard. Each shard gets an equal slice of the disk
    /// so they cannot over-commit it between them.
    async fn register(
        &self,
        service: &WorkerStorageService,
        masters: &[Arc<dyn MasterApi>],
    ) -> Result<()> {
        let free_bytes = disk::free_space(service.store().root()).await?;
        let share_mb = registration_share_mb(free_bytes, masters.len());
        tracing::info!(
            "Free space {}, advertising {} MB to each of {} masters",
            format_bytes(free_bytes),
            share_mb,
            masters.len()
        );

        for (index, master) in masters.iter().enumerate() {
            retry_with_backoff(
                move || master.register_worker(service.address(), share_mb),
                self.config.register_retries,
                Duration::from_millis(self.config.register_delay_ms),
            )
            .await?;
            tracing::info!("Registered with master shard {}", index);
        }
        Ok(())
    }
}

/// Whole megabytes each shard may place on this worker.
pub fn registration_share_mb(free_bytes: u64, masters_count: usize) -> u64 {
    match masters_count {
        0 => 0,
        n => free_bytes / MIB / n as u64,
    }
}
