//! Free space of the volume holding a directory

use crate::common::{Error, Result};
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Available bytes on the disk whose mount point is the longest prefix of
/// `path`.
pub async fn free_space(path: &Path) -> Result<u64> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || free_space_blocking(&path))
        .await
        .map_err(|e| Error::Internal(format!("disk probe task failed: {}", e)))?
}

fn free_space_blocking(path: &Path) -> Result<u64> {
    let path = std::fs::canonicalize(path)
        .map_err(|e| Error::Storage(format!("cannot resolve {}: {}", path.display(), e)))?;

    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<(PathBuf, u64)> = disks
        .list()
        .iter()
        .map(|d| (d.mount_point().to_path_buf(), d.available_space()))
        .collect();

    pick_mount(&path, &mounts)
        .ok_or_else(|| Error::Storage(format!("no disk found for {}", path.display())))
}

fn pick_mount(path: &Path, mounts: &[(PathBuf, u64)]) -> Option<u64> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, available)| *available)
}
