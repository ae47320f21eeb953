//! Metadata repository for the placement master
//!
//! Two logical tables:
//! - `worker_state`: capacity bookkeeping, one row per worker address
//! - `blob_copy`: placement records, at most one row per (hash, worker)

use crate::common::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlobState {
    DuringCreation,
    Saved,
}

impl std::fmt::Display for BlobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobState::DuringCreation => write!(f, "DURING_CREATION"),
            BlobState::Saved => write!(f, "SAVED"),
        }
    }
}

/// One placement of a blob on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobCopy {
    pub copy_id: String,
    pub hash: String,
    pub worker_address: String,
    pub state: BlobState,
    pub size_mb: u64,
}

/// Capacity accounting for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_address: String,
    pub available_space_mb: u64,
    /// Reserved for copies that are not confirmed yet
    pub locked_space_mb: u64,
    /// Advisory only, stamped at registration
    pub last_heartbeat_epoch_ts: i64,
}

impl WorkerState {
    pub fn new(worker_address: impl Into<String>, available_space_mb: u64, now: i64) -> Self {
        Self {
            worker_address: worker_address.into(),
            available_space_mb,
            locked_space_mb: 0,
            last_heartbeat_epoch_ts: now,
        }
    }

    /// Space still open for new placements
    pub fn free_space_mb(&self) -> u64 {
        self.available_space_mb.saturating_sub(self.locked_space_mb)
    }
}

/// Durable CRUD over `worker_state` and `blob_copy`.
///
/// Deleting rows that do not exist is not an error.
#[async_trait]
pub trait WorkerStateRepository: Send + Sync {
    /// Upsert by (hash, worker_address)
    async fn add_blob_entry(&self, copy: &BlobCopy) -> Result<()>;

    /// Upsert by (hash, worker_address)
    async fn update_blob_entry(&self, copy: &BlobCopy) -> Result<()>;

    async fn query_saved_blobs_by_hash(&self, hash: &str) -> Result<Vec<BlobCopy>>;

    /// Every copy of `hash`, whatever its state
    async fn query_blobs_by_hash(&self, hash: &str) -> Result<Vec<BlobCopy>>;

    async fn query_blob_by_hash_and_worker(
        &self,
        hash: &str,
        worker_address: &str,
    ) -> Result<Vec<BlobCopy>>;

    async fn delete_blob_entries_by_hash(&self, hash: &str) -> Result<()>;

    async fn delete_blob_entries_by_worker(&self, worker_address: &str) -> Result<()>;

    /// Insert; fails if a row for the address already exists
    async fn add_worker_state(&self, state: &WorkerState) -> Result<()>;

    /// Overwrite; fails with `NotFound` if the row is missing
    async fn update_worker_state(&self, state: &WorkerState) -> Result<()>;

    async fn delete_worker_state(&self, worker_address: &str) -> Result<()>;

    async fn get_worker_state(&self, worker_address: &str) -> Result<WorkerState>;

    /// Exactly `count` workers with `available - locked >= space_needed`,
    /// or `ResourceExhausted`.
    async fn get_workers_with_free_space(
        &self,
        space_needed: u64,
        count: usize,
    ) -> Result<Vec<WorkerState>>;

    /// Persist buffered writes; called on shutdown.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared selection rule of both backends: most free space first, address
/// as tie-break.
pub(crate) fn select_workers_with_free_space(
    states: impl IntoIterator<Item = WorkerState>,
    space_needed: u64,
    count: usize,
) -> Result<Vec<WorkerState>> {
    let mut candidates: Vec<WorkerState> = states
        .into_iter()
        .filter(|s| s.free_space_mb() >= space_needed)
        .collect();

    if candidates.len() < count {
        return Err(Error::ResourceExhausted(format!(
            "need {} workers with {} MB free, have {}",
            count,
            space_needed,
            candidates.len()
        )));
    }

    candidates.sort_by(|a, b| {
        b.free_space_mb()
            .cmp(&a.free_space_mb())
            .then_with(|| a.worker_address.cmp(&b.worker_address))
    });
    candidates.truncate(count);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(address: &str, available: u64, locked: u64) -> WorkerState {
        WorkerState {
            worker_address: address.to_string(),
            available_space_mb: available,
            locked_space_mb: locked,
            last_heartbeat_epoch_ts: 0,
        }
    }

    #[test]
    fn test_free_space() {
        assert_eq!(worker("w", 100, 30).free_space_mb(), 70);
        assert_eq!(worker("w", 10, 30).free_space_mb(), 0);
    }

    #[test]
    fn test_select_prefers_most_free() {
        let selected = select_workers_with_free_space(
            vec![
                worker("w1", 100, 90),
                worker("w2", 100, 0),
                worker("w3", 50, 0),
                worker("w4", 100, 0),
            ],
            10,
            2,
        )
        .unwrap();
        let addresses: Vec<_> = selected.iter().map(|w| w.worker_address.as_str()).collect();
        assert_eq!(addresses, vec!["w2", "w4"]);
    }

    #[test]
    fn test_select_counts_locked_space() {
        let result = select_workers_with_free_space(
            vec![worker("w1", 100, 95), worker("w2", 100, 0), worker("w3", 100, 0)],
            10,
            3,
        );
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
    }

    #[test]
    fn test_blob_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&BlobState::DuringCreation).unwrap(),
            "\"DURING_CREATION\""
        );
        assert_eq!(BlobState::Saved.to_string(), "SAVED");
    }
}
