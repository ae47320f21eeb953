//! In-memory repository backend
//!
//! Used by tests and by masters started with `backend = "memory"`. Rows live
//! in ordered maps so query results come back in a stable order.

use crate::common::{Error, Result};
use crate::master::repository::{
    select_workers_with_free_space, BlobCopy, BlobState, WorkerState, WorkerStateRepository,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Tables {
    // (hash, worker_address) -> copy
    blob_copies: BTreeMap<(String, String), BlobCopy>,
    workers: BTreeMap<String, WorkerState>,
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| Error::Repository("memory repository lock poisoned".into()))?;
        f(&mut tables)
    }

    fn upsert_copy(&self, copy: &BlobCopy) -> Result<()> {
        self.with_tables(|t| {
            t.blob_copies.insert(
                (copy.hash.clone(), copy.worker_address.clone()),
                copy.clone(),
            );
            Ok(())
        })
    }

    fn copies_of(&self, hash: &str, saved_only: bool) -> Result<Vec<BlobCopy>> {
        self.with_tables(|t| {
            Ok(t.blob_copies
                .values()
                .filter(|c| c.hash == hash)
                .filter(|c| !saved_only || c.state == BlobState::Saved)
                .cloned()
                .collect())
        })
    }
}

#[async_trait]
impl WorkerStateRepository for MemoryRepository {
    async fn add_blob_entry(&self, copy: &BlobCopy) -> Result<()> {
        self.upsert_copy(copy)
    }

    async fn update_blob_entry(&self, copy: &BlobCopy) -> Result<()> {
        self.upsert_copy(copy)
    }

    async fn query_saved_blobs_by_hash(&self, hash: &str) -> Result<Vec<BlobCopy>> {
        self.copies_of(hash, true)
    }

    async fn query_blobs_by_hash(&self, hash: &str) -> Result<Vec<BlobCopy>> {
        self.copies_of(hash, false)
    }

    async fn query_blob_by_hash_and_worker(
        &self,
        hash: &str,
        worker_address: &str,
    ) -> Result<Vec<BlobCopy>> {
        self.with_tables(|t| {
            Ok(t.blob_copies
                .get(&(hash.to_string(), worker_address.to_string()))
                .cloned()
                .into_iter()
                .collect())
        })
    }

    async fn delete_blob_entries_by_hash(&self, hash: &str) -> Result<()> {
        self.with_tables(|t| {
            t.blob_copies.retain(|(h, _), _| h != hash);
            Ok(())
        })
    }

    async fn delete_blob_entries_by_worker(&self, worker_address: &str) -> Result<()> {
        self.with_tables(|t| {
            t.blob_copies.retain(|(_, w), _| w != worker_address);
            Ok(())
        })
    }

    async fn add_worker_state(&self, state: &WorkerState) -> Result<()> {
        self.with_tables(|t| {
            if t.workers.contains_key(&state.worker_address) {
                return Err(Error::Repository(format!(
                    "worker {} already exists",
                    state.worker_address
                )));
            }
            t.workers
                .insert(state.worker_address.clone(), state.clone());
            Ok(())
        })
    }

    async fn update_worker_state(&self, state: &WorkerState) -> Result<()> {
        self.with_tables(|t| match t.workers.get_mut(&state.worker_address) {
            Some(row) => {
                *row = state.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("worker {}", state.worker_address))),
        })
    }

    async fn delete_worker_state(&self, worker_address: &str) -> Result<()> {
        self.with_tables(|t| {
            t.workers.remove(worker_address);
            Ok(())
        })
    }

    async fn get_worker_state(&self, worker_address: &str) -> Result<WorkerState> {
        self.with_tables(|t| {
            t.workers
                .get(worker_address)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("worker {}", worker_address)))
        })
    }

    async fn get_workers_with_free_space(
        &self,
        space_needed: u64,
        count: usize,
    ) -> Result<Vec<WorkerState>> {
        let states = self.with_tables(|t| Ok(t.workers.values().cloned().collect::<Vec<_>>()))?;
        select_workers_with_free_space(states, space_needed, count)
    }
}
