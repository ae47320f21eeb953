//! Frontend server

use crate::common::config::validate_masters;
use crate::common::{shutdown_signal, ChunkStore, Error, FrontendConfig, Result};
use crate::frontend::http::create_router;
use crate::frontend::orchestrator::FrontendOrchestrator;
use crate::master::{MasterApi, MasterClient};
use crate::worker::HttpWorkerConnector;
use std::sync::Arc;
use std::time::Duration;

pub struct Frontend {
    config: FrontendConfig,
}

impl Frontend {
    pub fn new(config: FrontendConfig) -> Self {
        Self { config }
    }

    pub fn build_orchestrator(&self) -> Result<FrontendOrchestrator> {
        validate_masters(&self.config.masters)?;

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

        let scratch = ChunkStore::open(&self.config.scratch_root, self.config.chunk_size)?;

        Ok(FrontendOrchestrator::new(
            masters,
            Arc::new(HttpWorkerConnector::new()?),
            scratch,
            self.config.hash_algorithm,
        )?
        .with_purge_worker_copies(self.config.purge_worker_copies))
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting frontend");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Scratch root: {}", self.config.scratch_root.display());
        tracing::info!("  Masters: {:?}", self.config.masters);
        tracing::info!("  Purge worker copies: {}", self.config.purge_worker_copies);

        let orchestrator = Arc::new(self.build_orchestrator()?);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Frontend ready");

        axum::serve(listener, create_router(orchestrator))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))
    }
}
