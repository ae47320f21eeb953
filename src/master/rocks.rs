//! Repository backend using RocksDB
//!
//! Column families:
//! - `worker_state`: worker address -> bincode(WorkerState)
//! - `blob_copy`: `hash \0 worker_address` -> bincode(BlobCopy)
//!
//! The composite key keeps all copies of a hash adjacent, so hash lookups
//! are prefix scans.

use crate::common::{Error, Result};
use crate::master::repository::{
    select_workers_with_free_space, BlobCopy, BlobState, WorkerState, WorkerStateRepository,
};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

const CF_WORKER_STATE: &str = "worker_state";
const CF_BLOB_COPY: &str = "blob_copy";
const KEY_SEPARATOR: u8 = 0;

pub struct RocksRepository {
    db: DB,
}

impl RocksRepository {
    /// Open or create the metadata store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, vec![CF_WORKER_STATE, CF_BLOB_COPY])?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Repository(format!("missing column family {}", name)))
    }

    fn hash_prefix(hash: &str) -> Vec<u8> {
        let mut key = hash.as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn copy_key(hash: &str, worker_address: &str) -> Vec<u8> {
        let mut key = Self::hash_prefix(hash);
        key.extend_from_slice(worker_address.as_bytes());
        key
    }

    fn put_copy(&self, copy: &BlobCopy) -> Result<()> {
        let cf = self.cf(CF_BLOB_COPY)?;
        let value = bincode::serialize(copy)?;
        self.db
            .put_cf(cf, Self::copy_key(&copy.hash, &copy.worker_address), value)?;
        Ok(())
    }

    fn put_worker(&self, state: &WorkerState) -> Result<()> {
        let cf = self.cf(CF_WORKER_STATE)?;
        let value = bincode::serialize(state)?;
        self.db.put_cf(cf, state.worker_address.as_bytes(), value)?;
        Ok(())
    }

    fn find_worker(&self, worker_address: &str) -> Result<Option<WorkerState>> {
        let cf = self.cf(CF_WORKER_STATE)?;
        match self.db.get_cf(cf, worker_address.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// (key, copy) pairs for every copy of `hash`
    fn scan_hash(&self, hash: &str) -> Result<Vec<(Vec<u8>, BlobCopy)>> {
        let cf = self.cf(CF_BLOB_COPY)?;
        let prefix = Self::hash_prefix(hash);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            rows.push((key.to_vec(), bincode::deserialize(&value)?));
        }
        Ok(rows)
    }

    fn delete_keys(&self, keys: Vec<Vec<u8>>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let cf = self.cf(CF_BLOB_COPY)?;
        let mut batch = WriteBatch::default();
        for key in keys {
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl WorkerStateRepository for RocksRepository {
    async fn add_blob_entry(&self, copy: &BlobCopy) -> Result<()> {
        self.put_copy(copy)
    }

    async fn update_blob_entry(&self, copy: &BlobCopy) -> Result<()> {
        self.put_copy(copy)
    }

    async fn query_saved_blobs_by_hash(&self, hash: &str) -> Result<Vec<BlobCopy>> {
        Ok(self
            .scan_hash(hash)?
            .into_iter()
            .map(|(_, copy)| copy)
            .filter(|copy| copy.state == BlobState::Saved)
            .collect())
    }

    async fn query_blobs_by_hash(&self, hash: &str) -> Result<Vec<BlobCopy>> {
        Ok(self
            .scan_hash(hash)?
            .into_iter()
            .map(|(_, copy)| copy)
            .collect())
    }

    async fn query_blob_by_hash_and_worker(
        &self,
        hash: &str,
        worker_address: &str,
    ) -> Result<Vec<BlobCopy>> {
        let cf = self.cf(CF_BLOB_COPY)?;
        match self.db.get_cf(cf, Self::copy_key(hash, worker_address))? {
            Some(bytes) => Ok(vec![bincode::deserialize(&bytes)?]),
            None => Ok(Vec::new()),
        }
    }

    async fn delete_blob_entries_by_hash(&self, hash: &str) -> Result<()> {
        let keys = self
            .scan_hash(hash)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        self.delete_keys(keys)
    }

    async fn delete_blob_entries_by_worker(&self, worker_address: &str) -> Result<()> {
        let cf = self.cf(CF_BLOB_COPY)?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let copy: BlobCopy = bincode::deserialize(&value)?;
            if copy.worker_address == worker_address {
                keys.push(key.to_vec());
            }
        }
        self.delete_keys(keys)
    }

    async fn add_worker_state(&self, state: &WorkerState) -> Result<()> {
        if self.find_worker(&state.worker_address)?.is_some() {
            return Err(Error::Repository(format!(
                "worker {} already exists",
                state.worker_address
            )));
        }
        self.put_worker(state)
    }

    async fn update_worker_state(&self, state: &WorkerState) -> Result<()> {
        if self.find_worker(&state.worker_address)?.is_none() {
            return Err(Error::NotFound(format!("worker {}", state.worker_address)));
        }
        self.put_worker(state)
    }

    async fn delete_worker_state(&self, worker_address: &str) -> Result<()> {
        let cf = self.cf(CF_WORKER_STATE)?;
        self.db.delete_cf(cf, worker_address.as_bytes())?;
        Ok(())
    }

    async fn get_worker_state(&self, worker_address: &str) -> Result<WorkerState> {
        self.find_worker(worker_address)?
            .ok_or_else(|| Error::NotFound(format!("worker {}", worker_address)))
    }

    async fn get_workers_with_free_space(
        &self,
        space_needed: u64,
        count: usize,
    ) -> Result<Vec<WorkerState>> {
        let cf = self.cf(CF_WORKER_STATE)?;
        let mut states = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            states.push(bincode::deserialize::<WorkerState>(&value)?);
        }
        select_workers_with_free_space(states, space_needed, count)
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn copy(hash: &str, worker: &str, state: BlobState) -> BlobCopy {
        BlobCopy {
            copy_id: format!("{}@{}", hash, worker),
            hash: hash.to_string(),
            worker_address: worker.to_string(),
            state,
            size_mb: 2,
        }
    }

    #[tokio::test]
    async fn test_blob_copies() {
        let dir = tempdir().unwrap();
        let repo = RocksRepository::open(dir.path().join("meta.db")).unwrap();

        repo.add_blob_entry(&copy("ab", "w1", BlobState::DuringCreation))
            .await
            .unwrap();
        repo.add_blob_entry(&copy("ab", "w2", BlobState::Saved))
            .await
            .unwrap();
        // Shares a textual prefix with "ab" but is a different hash.
        repo.add_blob_entry(&copy("abc", "w1", BlobState::Saved))
            .await
            .unwrap();

        assert_eq!(repo.query_blobs_by_hash("ab").await.unwrap().len(), 2);
        let saved = repo.query_saved_blobs_by_hash("ab").await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].worker_address, "w2");

        repo.update_blob_entry(&copy("ab", "w1", BlobState::Saved))
            .await
            .unwrap();
        let exact = repo.query_blob_by_hash_and_worker("ab", "w1").await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].state, BlobState::Saved);

        repo.delete_blob_entries_by_hash("ab").await.unwrap();
        assert!(repo.query_blobs_by_hash("ab").await.unwrap().is_empty());
        assert_eq!(repo.query_blobs_by_hash("abc").await.unwrap().len(), 1);

        repo.delete_blob_entries_by_worker("w1").await.unwrap();
        assert!(repo.query_blobs_by_hash("abc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_registry() {
        let dir = tempdir().unwrap();
        let repo = RocksRepository::open(dir.path().join("meta.db")).unwrap();

        repo.add_worker_state(&WorkerState::new("w1", 100, 7)).await.unwrap();
        repo.add_worker_state(&WorkerState::new("w2", 20, 7)).await.unwrap();
        assert!(repo
            .add_worker_state(&WorkerState::new("w1", 1, 7))
            .await
            .is_err());

        let mut w1 = repo.get_worker_state("w1").await.unwrap();
        assert_eq!(w1.available_space_mb, 100);
        w1.locked_space_mb = 95;
        repo.update_worker_state(&w1).await.unwrap();

        let free = repo.get_workers_with_free_space(10, 1).await.unwrap();
        assert_eq!(free[0].worker_address, "w2");
        assert!(matches!(
            repo.get_workers_with_free_space(10, 2).await,
            Err(Error::ResourceExhausted(_))
        ));

        repo.delete_worker_state("w1").await.unwrap();
        assert!(matches!(
            repo.get_worker_state("w1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.db");
        {
            let repo = RocksRepository::open(&path).unwrap();
            repo.add_worker_state(&WorkerState::new("w1", 64, 0)).await.unwrap();
            repo.add_blob_entry(&copy("h", "w1", BlobState::Saved))
                .await
                .unwrap();
            repo.flush().await.unwrap();
        }

        let repo = RocksRepository::open(&path).unwrap();
        assert_eq!(repo.get_worker_state("w1").await.unwrap().available_space_mb, 64);
        assert_eq!(repo.query_saved_blobs_by_hash("h").await.unwrap().len(), 1);
    }
}
