//! Worker-side blob storage
//!
//! One file per content hash under the blob root. Saves are verified against
//! the claimed hash before they replace anything stored under it, and before
//! the owning master shard is told about them.

use crate::common::{
    master_index, validate_blob_id, ChunkFile, ChunkStore, ChunkStream, Error, HashAlgorithm, Result,
    SaveBlobMessage, SaveBlobStream,
};
use crate::master::MasterApi;
use crate::worker::api::WorkerApi;
use crate::worker::disk;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct WorkerStorageService {
    store: ChunkStore,
    hash_algorithm: HashAlgorithm,
    /// Address registered with the masters
    address: String,
    /// Master shards in shard order
    masters: Vec<Arc<dyn MasterApi>>,
}

impl WorkerStorageService {
    pub fn new(
        store: ChunkStore,
        hash_algorithm: HashAlgorithm,
        address: impl Into<String>,
        masters: Vec<Arc<dyn MasterApi>>,
    ) -> Result<Self> {
        if masters.is_empty() {
            return Err(Error::InvalidConfig(
                "worker needs at least one master".into(),
            ));
        }
        Ok(Self {
            store,
            hash_algorithm,
            address: address.into(),
            masters,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    fn master_for(&self, blob_hash: &str) -> &Arc<dyn MasterApi> {
        &self.masters[master_index(blob_hash, self.masters.len())]
    }

    pub async fn save_blob(&self, mut stream: SaveBlobStream) -> Result<()> {
        let hash = match stream.next().await {
            Some(Ok(SaveBlobMessage::Hash(hash))) => hash,
            Some(Ok(SaveBlobMessage::Chunk(_))) => {
                return Err(Error::InvalidArgument(
                    "save stream must start with the blob hash".into(),
                ))
            }
            Some(Err(e)) => return Err(Error::Cancelled(format!("save stream failed: {}", e))),
            None => return Err(Error::InvalidArgument("empty save stream".into())),
        };
        validate_blob_id(&hash)?;

        // Written under a temporary name; only verified bytes take the hash's name.
        let mut file = self.store.create_temp()?;
        let mut hasher = self.hash_algorithm.hasher();
        let mut chunks = 0usize;

        while let Some(message) = stream.next().await {
            let failure = match message {
                Ok(SaveBlobMessage::Chunk(bytes)) => match file.append(&bytes) {
                    Ok(()) => {
                        hasher.add_chunk(&bytes);
                        chunks += 1;
                        continue;
                    }
                    Err(e) => e,
                },
                Ok(SaveBlobMessage::Hash(_)) => Error::InvalidArgument(format!(
                    "second hash message in save stream of {}",
                    hash
                )),
                Err(e) => Error::Cancelled(format!(
                    "save stream of {} interrupted after {} bytes: {}",
                    hash,
                    file.size(),
                    e
                )),
            };
            discard(&mut file);
            return Err(failure);
        }
        debug!("Received {} chunks ({} bytes) for {}", chunks, file.size(), hash);

        let computed = hasher.finalize();
        if computed != hash {
            discard(&mut file);
            warn!("Hash mismatch for {}: computed {}", hash, computed);
            return Err(Error::InvalidArgument("hash mismatch".into()));
        }

        if self.store.contains(&hash) {
            debug!("Replacing existing copy of {}", hash);
        }
        if let Err(e) = self.store.persist(&mut file, &hash) {
            discard(&mut file);
            return Err(e);
        }

        self.master_for(&hash)
            .notify_blob_saved(&hash, &self.address)
            .await
            .map_err(|e| Error::Cancelled(format!("notify master about {}: {}", hash, e)))?;

        info!("Saved {} ({} bytes)", hash, file.size());
        Ok(())
    }

    pub async fn get_blob(&self, blob_hash: &str) -> Result<ChunkStream> {
        validate_blob_id(blob_hash)?;
        let file = self.store.load(blob_hash)?;
        debug!("Streaming {} ({} bytes)", blob_hash, file.size());
        Ok(file.chunk_stream())
    }

    pub async fn delete_blob(&self, blob_hash: &str) -> Result<()> {
        validate_blob_id(blob_hash)?;
        let mut file = self.store.load(blob_hash)?;
        if !file.remove()? {
            return Err(Error::NotFound(format!("blob {}", blob_hash)));
        }
        info!("Deleted {}", blob_hash);
        Ok(())
    }

    pub async fn get_free_storage(&self) -> Result<u64> {
        disk::free_space(self.store.root()).await
    }
}

fn discard(file: &mut ChunkFile) {
    if let Err(e) = file.remove() {
        warn!("Failed to remove {}: {}", file.path().display(), e);
    }
}

#[async_trait]
impl WorkerApi for WorkerStorageService {
    async fn healthcheck(&self) -> Result<()> {
        Ok(())
    }

    async fn get_free_storage(&self) -> Result<u64> {
        WorkerStorageService::get_free_storage(self).await
    }

    async fn save_blob(&self, stream: SaveBlobStream) -> Result<()> {
        WorkerStorageService::save_blob(self, stream).await
    }

    async fn get_blob(&self, blob_hash: &str) -> Result<ChunkStream> {
        WorkerStorageService::get_blob(self, blob_hash).await
    }

    async fn delete_blob(&self, blob_hash: &str) -> Result<()> {
        WorkerStorageService::delete_blob(self, blob_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::stream::{chunks_from_vec, save_blob_stream};
    use bytes::Bytes;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records notifications, optionally failing them.
    #[derive(Default)]
    struct RecordingMaster {
        saved: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MasterApi for RecordingMaster {
        async fn healthcheck(&self) -> Result<()> {
            Ok(())
        }
        async fn get_workers_to_save_blob(&self, _: &str, _: u64) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn get_worker_with_blob(&self, _: &str) -> Result<String> {
            Err(Error::NotFound("unused".into()))
        }
        async fn notify_blob_saved(&self, hash: &str, worker: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Http("connection refused".into()));
            }
            self.saved
                .lock()
                .unwrap()
                .push((hash.to_string(), worker.to_string()));
            Ok(())
        }
        async fn register_worker(&self, _: &str, _: u64) -> Result<()> {
            Ok(())
        }
        async fn delete_blob(&self, _: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn service(dir: &TempDir, master: Arc<RecordingMaster>) -> WorkerStorageService {
        let store = ChunkStore::open(dir.path(), 4).unwrap();
        WorkerStorageService::new(store, HashAlgorithm::Xxh64, "w1", vec![master]).unwrap()
    }

    fn abrakadabra() -> (String, Vec<Bytes>) {
        let hash = HashAlgorithm::Xxh64.digest(b"ABRAKADABRA");
        (
            hash,
            vec![Bytes::from_static(b"ABRA"), Bytes::from_static(b"KADABRA")],
        )
    }

    fn temp_files(worker: &WorkerStorageService) -> usize {
        std::fs::read_dir(worker.store().root())
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("temp-")
            })
            .count()
    }

    async fn collect(stream: ChunkStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        chunks.concat()
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let dir = TempDir::new().unwrap();
        let master = Arc::new(RecordingMaster::default());
        let worker = service(&dir, master.clone());
        let (hash, chunks) = abrakadabra();

        worker
            .save_blob(save_blob_stream(hash.clone(), chunks_from_vec(chunks)))
            .await
            .unwrap();
        assert_eq!(
            master.saved.lock().unwrap().clone(),
            vec![(hash.clone(), "w1".to_string())]
        );

        // Re-chunked at 4 bytes on the way out, same content.
        let stream = worker.get_blob(&hash).await.unwrap();
        assert_eq!(collect(stream).await, b"ABRAKADABRA");

        worker.delete_blob(&hash).await.unwrap();
        assert!(matches!(worker.get_blob(&hash).await, Err(Error::NotFound(_))));
        assert!(matches!(worker.delete_blob(&hash).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_hash_mismatch_removes_file() {
        let dir = TempDir::new().unwrap();
        let master = Arc::new(RecordingMaster::default());
        let worker = service(&dir, master.clone());
        let (hash, _) = abrakadabra();

        let result = worker
            .save_blob(save_blob_stream(
                hash.clone(),
                chunks_from_vec(vec![Bytes::from_static(b"ABRACADABRA")]),
            ))
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(ref m)) if m == "hash mismatch"));
        assert!(!worker.store().contains(&hash));
        assert!(master.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_file() {
        let dir = TempDir::new().unwrap();
        let master = Arc::new(RecordingMaster {
            fail: true,
            ..Default::default()
        });
        let worker = service(&dir, master);
        let (hash, chunks) = abrakadabra();

        let result = worker
            .save_blob(save_blob_stream(hash.clone(), chunks_from_vec(chunks)))
            .await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert!(worker.store().contains(&hash));
    }

    #[tokio::test]
    async fn test_malformed_streams() {
        let dir = TempDir::new().unwrap();
        let worker = service(&dir, Arc::new(RecordingMaster::default()));

        let empty = futures_util::stream::empty().boxed();
        assert!(matches!(
            worker.save_blob(empty).await,
            Err(Error::InvalidArgument(_))
        ));

        let headless = futures_util::stream::iter(vec![Ok(SaveBlobMessage::Chunk(
            Bytes::from_static(b"x"),
        ))])
        .boxed();
        assert!(matches!(
            worker.save_blob(headless).await,
            Err(Error::InvalidArgument(_))
        ));

        let twice = futures_util::stream::iter(vec![
            Ok(SaveBlobMessage::Hash("h".into())),
            Ok(SaveBlobMessage::Hash("h".into())),
        ])
        .boxed();
        assert!(matches!(
            worker.save_blob(twice).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(!worker.store().contains("h"));

        let broken = futures_util::stream::iter(vec![
            Ok(SaveBlobMessage::Hash("h".into())),
            Ok(SaveBlobMessage::Chunk(Bytes::from_static(b"AB"))),
            Err(Error::Http("client went away".into())),
        ])
        .boxed();
        assert!(matches!(
            worker.save_blob(broken).await,
            Err(Error::Cancelled(_))
        ));
        assert!(!worker.store().contains("h"));
        assert_eq!(temp_files(&worker), 0);
    }

    #[tokio::test]
    async fn test_failed_resave_keeps_verified_copy() {
        let dir = TempDir::new().unwrap();
        let master = Arc::new(RecordingMaster::default());
        let worker = service(&dir, master.clone());
        let (hash, chunks) = abrakadabra();

        worker
            .save_blob(save_blob_stream(hash.clone(), chunks_from_vec(chunks)))
            .await
            .unwrap();

        let broken = futures_util::stream::iter(vec![
            Ok(SaveBlobMessage::Hash(hash.clone())),
            Ok(SaveBlobMessage::Chunk(Bytes::from_static(b"AB"))),
            Err(Error::Http("client went away".into())),
        ])
        .boxed();
        assert!(matches!(
            worker.save_blob(broken).await,
            Err(Error::Cancelled(_))
        ));
        assert_eq!(collect(worker.get_blob(&hash).await.unwrap()).await, b"ABRAKADABRA");

        let wrong = save_blob_stream(
            hash.clone(),
            chunks_from_vec(vec![Bytes::from_static(b"ABRACADABRA")]),
        );
        assert!(matches!(
            worker.save_blob(wrong).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(collect(worker.get_blob(&hash).await.unwrap()).await, b"ABRAKADABRA");
        assert_eq!(temp_files(&worker), 0);

        // A complete re-save of the same content goes through.
        let (_, chunks) = abrakadabra();
        worker
            .save_blob(save_blob_stream(hash.clone(), chunks_from_vec(chunks)))
            .await
            .unwrap();
        assert_eq!(collect(worker.get_blob(&hash).await.unwrap()).await, b"ABRAKADABRA");
        assert_eq!(master.saved.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_notify_goes_to_owning_shard() {
        let dir = TempDir::new().unwrap();
        let shards: Vec<Arc<RecordingMaster>> =
            (0..3).map(|_| Arc::new(RecordingMaster::default())).collect();
        let masters: Vec<Arc<dyn MasterApi>> = shards
            .iter()
            .map(|m| m.clone() as Arc<dyn MasterApi>)
            .collect();
        let store = ChunkStore::open(dir.path(), 1024).unwrap();
        let worker =
            WorkerStorageService::new(store, HashAlgorithm::Xxh64, "w1", masters).unwrap();

        let (hash, chunks) = abrakadabra();
        worker
            .save_blob(save_blob_stream(hash.clone(), chunks_from_vec(chunks)))
            .await
            .unwrap();

        let owner = master_index(&hash, 3);
        for (i, shard) in shards.iter().enumerate() {
            assert_eq!(shard.saved.lock().unwrap().len(), usize::from(i == owner));
        }
    }

    #[test]
    fn test_requires_master() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::open(dir.path(), 4).unwrap();
        assert!(WorkerStorageService::new(store, HashAlgorithm::Xxh64, "w1", vec![]).is_err());
    }
}
