//! Client-facing orchestration
//!
//! Uploads are buffered to a scratch file while hashing, placed through the
//! owning master shard, then streamed to every chosen worker in turn. Reads
//! resolve one saved copy and relay its chunks unchanged.

use crate::common::stream::save_blob_stream;
use crate::common::{
    bytes_to_mb, master_index, validate_blob_id, ChunkStore, ChunkStream, Error, HashAlgorithm,
    Result, UploadMessage, UploadStream,
};
use crate::master::MasterApi;
use crate::worker::WorkerConnector;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Copy rows the master dropped
    pub copies: usize,
    /// Worker files removed, when purging is enabled
    pub purged: usize,
}

pub struct FrontendOrchestrator {
    masters: Vec<Arc<dyn MasterApi>>,
    workers: Arc<dyn WorkerConnector>,
    scratch: ChunkStore,
    hash_algorithm: HashAlgorithm,
    purge_worker_copies: bool,
}

impl FrontendOrchestrator {
    pub fn new(
        masters: Vec<Arc<dyn MasterApi>>,
        workers: Arc<dyn WorkerConnector>,
        scratch: ChunkStore,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self> {
        if masters.is_empty() {
            return Err(Error::InvalidConfig(
                "frontend needs at least one master".into(),
            ));
        }
        Ok(Self {
            masters,
            workers,
            scratch,
            hash_algorithm,
            purge_worker_copies: false,
        })
    }

    /// Also remove worker files on delete (best effort).
    pub fn with_purge_worker_copies(mut self, purge: bool) -> Self {
        self.purge_worker_copies = purge;
        self
    }

    pub fn scratch(&self) -> &ChunkStore {
        &self.scratch
    }

    fn master_for(&self, blob_hash: &str) -> &Arc<dyn MasterApi> {
        &self.masters[master_index(blob_hash, self.masters.len())]
    }

    pub async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Store a blob and return its content hash.
    ///
    /// The scratch copy is removed only once every worker has the blob; on
    /// failure it stays behind.
    pub async fn upload_blob(&self, mut stream: UploadStream) -> Result<String> {
        let declared = match stream.next().await {
            Some(Ok(UploadMessage::Info { size_bytes })) => size_bytes,
            Some(Ok(UploadMessage::Chunk(_))) => {
                return Err(Error::InvalidArgument(
                    "upload must start with the blob info".into(),
                ))
            }
            Some(Err(e)) => return Err(Error::Cancelled(format!("upload stream failed: {}", e))),
            None => return Err(Error::InvalidArgument("empty upload stream".into())),
        };

        let mut file = self.scratch.create_temp()?;
        let mut hasher = self.hash_algorithm.hasher();

        while let Some(message) = stream.next().await {
            match message {
                Ok(UploadMessage::Chunk(bytes)) => {
                    file.append(&bytes)?;
                    hasher.add_chunk(&bytes);
                }
                Ok(UploadMessage::Info { .. }) => {
                    return Err(Error::InvalidArgument(
                        "blob info sent more than once".into(),
                    ))
                }
                Err(e) => {
                    return Err(Error::Cancelled(format!(
                        "upload interrupted after {} bytes: {}",
                        file.size(),
                        e
                    )))
                }
            }
        }

        if file.size() != declared {
            return Err(Error::InvalidArgument(format!(
                "declared {} bytes, received {}",
                declared,
                file.size()
            )));
        }

        let hash = hasher.finalize();
        let size_mb = bytes_to_mb(declared);
        debug!(
            "Buffered {} ({} bytes) in {}",
            hash,
            declared,
            file.path().display()
        );

        let addresses = self
            .master_for(&hash)
            .get_workers_to_save_blob(&hash, size_mb)
            .await
            .map_err(|e| Error::Cancelled(format!("placement of {}: {}", hash, e)))?;

        for address in &addresses {
            let worker = self
                .workers
                .connect(address)
                .map_err(|e| Error::Cancelled(format!("worker {}: {}", address, e)))?;
            worker
                .save_blob(save_blob_stream(hash.clone(), file.chunk_stream()))
                .await
                .map_err(|e| Error::Cancelled(format!("save on {}: {}", address, e)))?;
            debug!("Stored {} on {}", hash, address);
        }

        file.remove()?;
        info!("Uploaded {} ({} bytes) to {:?}", hash, declared, addresses);
        Ok(hash)
    }

    /// Relay the chunks of one saved copy.
    pub async fn get_blob(&self, blob_hash: &str) -> Result<ChunkStream> {
        validate_blob_id(blob_hash)?;

        let address = match self.master_for(blob_hash).get_worker_with_blob(blob_hash).await {
            Ok(address) => address,
            Err(Error::NotFound(m)) => return Err(Error::NotFound(m)),
            Err(e) => return Err(Error::Cancelled(format!("lookup of {}: {}", blob_hash, e))),
        };

        let worker = self
            .workers
            .connect(&address)
            .map_err(|e| Error::Cancelled(format!("worker {}: {}", address, e)))?;
        let chunks = worker
            .get_blob(blob_hash)
            .await
            .map_err(|e| Error::Cancelled(format!("read from {}: {}", address, e)))?;

        debug!("Relaying {} from {}", blob_hash, address);
        Ok(chunks
            .map(move |chunk| {
                chunk.map_err(|e| Error::Cancelled(format!("relay from {}: {}", address, e)))
            })
            .boxed())
    }

    /// Drop the blob's metadata, and its worker files if purging is on.
    pub async fn delete_blob(&self, blob_hash: &str) -> Result<DeleteReport> {
        validate_blob_id(blob_hash)?;

        let holders = self
            .master_for(blob_hash)
            .delete_blob(blob_hash)
            .await
            .map_err(|e| Error::Cancelled(format!("delete of {}: {}", blob_hash, e)))?;

        let mut report = DeleteReport {
            copies: holders.len(),
            purged: 0,
        };

        if self.purge_worker_copies {
            for address in &holders {
                let result = match self.workers.connect(address) {
                    Ok(worker) => worker.delete_blob(blob_hash).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => report.purged += 1,
                    Err(e) => warn!("Could not purge {} from {}: {}", blob_hash, address, e),
                }
            }
        }

        info!(
            "Deleted {} ({} copies, {} purged)",
            blob_hash, report.copies, report.purged
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::stream::{chunks_from_vec, upload_stream};
    use crate::common::SequentialIdGenerator;
    use crate::master::{MasterPlacementService, MemoryRepository};
    use crate::worker::{StaticWorkerConnector, WorkerApi, WorkerStorageService};
    use bytes::Bytes;
    use tempfile::TempDir;

    struct Cluster {
        _dir: TempDir,
        master: Arc<MasterPlacementService>,
        frontend: FrontendOrchestrator,
    }

    async fn cluster(workers: usize) -> Cluster {
        let dir = TempDir::new().unwrap();
        let master = Arc::new(MasterPlacementService::new(
            Arc::new(MemoryRepository::new()),
            Arc::new(SequentialIdGenerator::new("copy")),
        ));

        let mut connector = StaticWorkerConnector::new();
        for i in 0..workers {
            let address = format!("w{}", i);
            let store = ChunkStore::open(dir.path().join(&address), 4).unwrap();
            let worker = WorkerStorageService::new(
                store,
                HashAlgorithm::Xxh64,
                address.clone(),
                vec![master.clone() as Arc<dyn MasterApi>],
            )
            .unwrap();
            master.register_worker(&address, 100).await.unwrap();
            connector.insert(address, Arc::new(worker) as Arc<dyn WorkerApi>);
        }

        let scratch = ChunkStore::open(dir.path().join("scratch"), 4).unwrap();
        let frontend = FrontendOrchestrator::new(
            vec![master.clone() as Arc<dyn MasterApi>],
            Arc::new(connector),
            scratch,
            HashAlgorithm::Xxh64,
        )
        .unwrap();

        Cluster {
            _dir: dir,
            master,
            frontend,
        }
    }

    fn abrakadabra() -> UploadStream {
        upload_stream(
            11,
            chunks_from_vec(vec![Bytes::from_static(b"ABRA"), Bytes::from_static(b"KADABRA")]),
        )
    }

    fn scratch_files(frontend: &FrontendOrchestrator) -> usize {
        std::fs::read_dir(frontend.scratch().root()).unwrap().count()
    }

    #[tokio::test]
    async fn test_upload_then_get() {
        let c = cluster(3).await;
        let hash = c.frontend.upload_blob(abrakadabra()).await.unwrap();
        assert_eq!(hash, HashAlgorithm::Xxh64.digest(b"ABRAKADABRA"));
        assert_eq!(scratch_files(&c.frontend), 0);

        let chunks: Vec<Bytes> = c
            .frontend
            .get_blob(&hash)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), b"ABRAKADABRA");
    }

    #[tokio::test]
    async fn test_upload_requires_info_first() {
        let c = cluster(3).await;
        let stream = chunks_from_vec(vec![Bytes::from_static(b"ABRA")])
            .map(|chunk| chunk.map(UploadMessage::Chunk))
            .boxed();
        assert!(matches!(
            c.frontend.upload_blob(stream).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_size_mismatch() {
        let c = cluster(3).await;
        let stream = upload_stream(12, chunks_from_vec(vec![Bytes::from_static(b"ABRAKADABRA")]));
        assert!(matches!(
            c.frontend.upload_blob(stream).await,
            Err(Error::InvalidArgument(_))
        ));
        // Nothing was placed.
        for i in 0..3 {
            let state = c
                .master
                .repository()
                .get_worker_state(&format!("w{}", i))
                .await
                .unwrap();
            assert_eq!(state.locked_space_mb, 0);
        }
    }

    #[tokio::test]
    async fn test_placement_failure_keeps_scratch() {
        let c = cluster(2).await;
        let result = c.frontend.upload_blob(abrakadabra()).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert_eq!(scratch_files(&c.frontend), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_blob() {
        let c = cluster(3).await;
        assert!(matches!(
            c.frontend.get_blob("feedface").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_metadata_only_by_default() {
        let c = cluster(3).await;
        let hash = c.frontend.upload_blob(abrakadabra()).await.unwrap();

        let report = c.frontend.delete_blob(&hash).await.unwrap();
        assert_eq!(report, DeleteReport { copies: 3, purged: 0 });
        assert!(matches!(
            c.frontend.get_blob(&hash).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_with_purge() {
        let mut c = cluster(3).await;
        c.frontend = c.frontend.with_purge_worker_copies(true);
        let hash = c.frontend.upload_blob(abrakadabra()).await.unwrap();

        let report = c.frontend.delete_blob(&hash).await.unwrap();
        assert_eq!(report, DeleteReport { copies: 3, purged: 3 });
    }
}
