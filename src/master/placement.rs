//! Placement decisions over the worker-state repository
//!
//! Per blob copy the lifecycle is `NONE -> DURING_CREATION -> SAVED`, and back
//! to `NONE` on delete. The service keeps no state of its own between calls;
//! every decision reads and writes the repository.

use crate::common::{timestamp_now, validate_blob_id, Error, IdGenerator, Result};
use crate::master::api::MasterApi;
use crate::master::repository::{BlobCopy, BlobState, WorkerState, WorkerStateRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Copies placed for every blob
pub const REPLICATION_FACTOR: usize = 3;

pub struct MasterPlacementService {
    repo: Arc<dyn WorkerStateRepository>,
    ids: Arc<dyn IdGenerator>,
}

impl MasterPlacementService {
    pub fn new(repo: Arc<dyn WorkerStateRepository>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { repo, ids }
    }

    pub fn repository(&self) -> &Arc<dyn WorkerStateRepository> {
        &self.repo
    }

    /// Pick the replica set and reserve `size_mb` on each member.
    ///
    /// A hash that already has saved copies is answered with their holders
    /// and reserves nothing. A worker that already holds a provisional row
    /// for the hash keeps it without a second reservation. A failure
    /// part-way leaves the earlier reservations in place.
    pub async fn get_workers_to_save_blob(
        &self,
        blob_hash: &str,
        size_mb: u64,
    ) -> Result<Vec<String>> {
        validate_blob_id(blob_hash)?;

        let saved = self.repo.query_saved_blobs_by_hash(blob_hash).await?;
        if !saved.is_empty() {
            let holders: Vec<String> = saved.into_iter().map(|c| c.worker_address).collect();
            info!("{} already saved on {:?}", blob_hash, holders);
            return Ok(holders);
        }

        let workers = self
            .repo
            .get_workers_with_free_space(size_mb, REPLICATION_FACTOR)
            .await?;

        let mut addresses = Vec::with_capacity(workers.len());
        for mut worker in workers {
            let pending = self
                .repo
                .query_blob_by_hash_and_worker(blob_hash, &worker.worker_address)
                .await?;
            if !pending.is_empty() {
                debug!(
                    "{} already reserved on {}",
                    blob_hash, worker.worker_address
                );
                addresses.push(worker.worker_address);
                continue;
            }

            let copy = BlobCopy {
                copy_id: self.ids.next_id(),
                hash: blob_hash.to_string(),
                worker_address: worker.worker_address.clone(),
                state: BlobState::DuringCreation,
                size_mb,
            };
            self.repo.add_blob_entry(&copy).await?;

            worker.locked_space_mb += size_mb;
            self.repo.update_worker_state(&worker).await?;

            debug!(
                "Reserved {} MB on {} for {} (locked now {} MB)",
                size_mb, worker.worker_address, blob_hash, worker.locked_space_mb
            );
            addresses.push(worker.worker_address);
        }

        info!("Placed {} ({} MB) on {:?}", blob_hash, size_mb, addresses);
        Ok(addresses)
    }

    /// First saved copy in repository order.
    pub async fn get_worker_with_blob(&self, blob_hash: &str) -> Result<String> {
        let copies = self.repo.query_saved_blobs_by_hash(blob_hash).await?;
        let copy = copies
            .first()
            .ok_or_else(|| Error::NotFound(format!("no saved copy of {}", blob_hash)))?;

        let worker = self.repo.get_worker_state(&copy.worker_address).await?;
        Ok(worker.worker_address)
    }

    /// Confirm one copy. The reserved space stays consumed: both locked and
    /// available shrink by the copy size. Confirming a saved copy again is a
    /// no-op.
    pub async fn notify_blob_saved(&self, blob_hash: &str, worker_address: &str) -> Result<()> {
        let mut rows = self
            .repo
            .query_blob_by_hash_and_worker(blob_hash, worker_address)
            .await?;

        if rows.len() != 1 {
            return Err(Error::NotFound(format!(
                "expected one copy of {} on {}, found {}",
                blob_hash,
                worker_address,
                rows.len()
            )));
        }
        let mut copy = rows.remove(0);

        // A re-upload of saved content lands here again; the space was
        // already spent once.
        if copy.state == BlobState::Saved {
            debug!("Copy of {} on {} was already saved", blob_hash, worker_address);
            return Ok(());
        }

        let mut worker = self.repo.get_worker_state(worker_address).await?;
        worker.locked_space_mb = worker
            .locked_space_mb
            .checked_sub(copy.size_mb)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "locked space of {} below copy size {}",
                    worker_address, copy.size_mb
                ))
            })?;
        worker.available_space_mb = worker
            .available_space_mb
            .checked_sub(copy.size_mb)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "available space of {} below copy size {}",
                    worker_address, copy.size_mb
                ))
            })?;

        copy.state = BlobState::Saved;
        self.repo.update_blob_entry(&copy).await?;
        self.repo.update_worker_state(&worker).await?;

        info!("Copy of {} saved on {}", blob_hash, worker_address);
        Ok(())
    }

    /// (Re)register a worker. A known address is treated as a restart that
    /// lost its local data, so its copy rows go away with the old state.
    pub async fn register_worker(&self, address: &str, space_available_mb: u64) -> Result<()> {
        if address.is_empty() {
            return Err(Error::InvalidArgument("worker address cannot be empty".into()));
        }

        self.repo.delete_blob_entries_by_worker(address).await?;
        self.repo.delete_worker_state(address).await?;
        self.repo
            .add_worker_state(&WorkerState::new(
                address,
                space_available_mb,
                timestamp_now(),
            ))
            .await?;

        info!(
            "Registered worker {} with {} MB available",
            address, space_available_mb
        );
        Ok(())
    }

    /// Remove every copy row for the hash and report who held them.
    pub async fn delete_blob(&self, blob_hash: &str) -> Result<Vec<String>> {
        let holders: Vec<String> = self
            .repo
            .query_blobs_by_hash(blob_hash)
            .await?
            .into_iter()
            .map(|copy| copy.worker_address)
            .collect();

        self.repo.delete_blob_entries_by_hash(blob_hash).await?;

        if holders.is_empty() {
            warn!("Delete of unknown blob {}", blob_hash);
        } else {
            info!("Deleted {} copy rows of {}", holders.len(), blob_hash);
        }
        Ok(holders)
    }
}

#[async_trait]
impl MasterApi for MasterPlacementService {
    async fn healthcheck(&self) -> Result<()> {
        Ok(())
    }

    async fn get_workers_to_save_blob(
        &self,
        blob_hash: &str,
        size_mb: u64,
    ) -> Result<Vec<String>> {
        MasterPlacementService::get_workers_to_save_blob(self, blob_hash, size_mb).await
    }

    async fn get_worker_with_blob(&self, blob_hash: &str) -> Result<String> {
        MasterPlacementService::get_worker_with_blob(self, blob_hash).await
    }

    async fn notify_blob_saved(&self, blob_hash: &str, worker_address: &str) -> Result<()> {
        MasterPlacementService::notify_blob_saved(self, blob_hash, worker_address).await
    }

    async fn register_worker(&self, address: &str, space_available_mb: u64) -> Result<()> {
        MasterPlacementService::register_worker(self, address, space_available_mb).await
    }

    async fn delete_blob(&self, blob_hash: &str) -> Result<Vec<String>> {
        MasterPlacementService::delete_blob(self, blob_hash).await
    }
}
