//! Master server

use crate::common::{
    shutdown_signal, Error, MasterConfig, MetadataBackend, Result, UuidGenerator,
};
use crate::master::http::create_router;
use crate::master::memory::MemoryRepository;
use crate::master::placement::MasterPlacementService;
use crate::master::repository::WorkerStateRepository;
use std::sync::Arc;

pub struct Master {
    config: MasterConfig,
}

impl Master {
    pub fn new(config: MasterConfig) -> Self {
        Self { config }
    }

    /// Build the placement service on top of the configured backend.
    pub fn build_service(&self) -> Result<MasterPlacementService> {
        let repo = open_repository(&self.config)?;
        Ok(MasterPlacementService::new(repo, Arc::new(UuidGenerator)))
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting master");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Backend: {:?}", self.config.backend);
        tracing::info!("  DB path: {}", self.config.db_path.display());

        let service = Arc::new(self.build_service()?);
        let repo = service.repository().clone();
        let router = create_router(service);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("✓ Master ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        repo.flush().await?;
        tracing::info!("Master metadata flushed");
        Ok(())
    }
}

fn open_repository(config: &MasterConfig) -> Result<Arc<dyn WorkerStateRepository>> {
    match config.backend {
        MetadataBackend::Memory => Ok(Arc::new(MemoryRepository::new())),
        #[cfg(feature = "rocksdb-backend")]
        MetadataBackend::Rocksdb => Ok(Arc::new(crate::master::rocks::RocksRepository::open(
            &config.db_path,
        )?)),
        #[cfg(not(feature = "rocksdb-backend"))]
        MetadataBackend::Rocksdb => Err(Error::InvalidConfig(
            "built without the rocksdb-backend feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_service() {
        let master = Master::new(MasterConfig {
            backend: MetadataBackend::Memory,
            ..MasterConfig::default()
        });
        let service = master.build_service().unwrap();
        service.register_worker("w1", 10).await.unwrap();
        assert_eq!(
            service.repository().get_worker_state("w1").await.unwrap().available_space_mb,
            10
        );
    }
}
