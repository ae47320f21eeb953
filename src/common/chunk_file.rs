//! File-backed chunked blob storage
//!
//! A blob is one append-only file named after its id under a root directory.
//! Reading goes through [`Chunks`], a forward-only iterator that yields at
//! most `chunk_size` bytes per item and owns its file handle, so dropping it
//! early closes the file. Every call to [`ChunkFile::chunks`] starts again
//! from byte 0.

use crate::common::stream::ChunkStream;
use crate::common::utils::validate_blob_id;
use crate::common::{Error, Result};
use bytes::Bytes;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024; // 1 MiB

/// Chunks buffered between the blocking reader and an async consumer.
const STREAM_BUFFER: usize = 4;

/// Directory of blob files sharing one chunk size.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
    chunk_size: usize,
}

impl ChunkStore {
    /// Open (and create if missing) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            Error::Storage(format!("failed to create blob root {}: {}", root.display(), e))
        })?;
        Ok(Self { root, chunk_size })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        validate_blob_id(id)?;
        Ok(self.root.join(id))
    }

    /// Create a new, empty file for `id`, truncating any previous content.
    pub fn create(&self, id: &str) -> Result<ChunkFile> {
        let path = self.path_for(id)?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("failed to create {}: {}", path.display(), e)))?;

        Ok(ChunkFile {
            path,
            size: 0,
            chunk_size: self.chunk_size,
        })
    }

    /// Open the existing file for `id`.
    pub fn load(&self, id: &str) -> Result<ChunkFile> {
        let path = self.path_for(id)?;
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("blob file {}", path.display())))
            }
            Err(e) => {
                return Err(Error::Storage(format!(
                    "failed to stat {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        if !metadata.is_file() {
            return Err(Error::Storage(format!("{} is not a file", path.display())));
        }

        Ok(ChunkFile {
            path,
            size: metadata.len(),
            chunk_size: self.chunk_size,
        })
    }

    /// Create an empty file under a fresh `temp-*` name. Move it into place
    /// with [`ChunkStore::persist`].
    pub fn create_temp(&self) -> Result<ChunkFile> {
        self.create(&format!("temp-{}.blob", uuid::Uuid::new_v4()))
    }

    /// Rename `file` to `id`, atomically replacing any file already there.
    pub fn persist(&self, file: &mut ChunkFile, id: &str) -> Result<()> {
        let target = self.path_for(id)?;
        fs::rename(&file.path, &target).map_err(|e| file.io_error("rename", e))?;
        file.path = target;
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }
}

/// Handle to one blob file.
#[derive(Debug)]
pub struct ChunkFile {
    path: PathBuf,
    // Tracked here instead of stat-ing: file metadata may lag behind writes.
    size: u64,
    chunk_size: usize,
}

impl ChunkFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append `bytes` at the end of the file.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error("open for appending", e))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| self.io_error("append to", e))?;

        self.size += bytes.len() as u64;
        Ok(())
    }

    /// Fresh iterator over the stored bytes.
    pub fn chunks(&self) -> Chunks {
        Chunks {
            path: self.path.clone(),
            file: None,
            offset: 0,
            size: self.size,
            chunk_size: self.chunk_size,
            done: false,
        }
    }

    /// Async stream over the stored bytes, read on the blocking pool.
    ///
    /// The reader stops as soon as the receiving side is dropped.
    pub fn chunk_stream(&self) -> ChunkStream {
        let chunks = self.chunks();
        let path = self.path.clone();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::task::spawn_blocking(move || {
            for chunk in chunks {
                let failed = chunk.is_err();
                if tx.blocking_send(chunk).is_err() {
                    tracing::warn!("chunk stream for {} closed by receiver", path.display());
                    break;
                }
                if failed {
                    break;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    /// Delete the backing file. Returns whether a file was actually removed.
    pub fn remove(&mut self) -> Result<bool> {
        self.size = 0;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error("remove", e)),
        }
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> Error {
        if e.kind() == ErrorKind::NotFound {
            Error::NotFound(format!("blob file {}", self.path.display()))
        } else {
            Error::Storage(format!("failed to {} {}: {}", action, self.path.display(), e))
        }
    }
}

/// Forward-only chunk reader over a [`ChunkFile`].
#[derive(Debug)]
pub struct Chunks {
    path: PathBuf,
    file: Option<File>,
    offset: u64,
    size: u64,
    chunk_size: usize,
    done: bool,
}

impl Chunks {
    /// Byte offset of the next chunk
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_next(&mut self) -> Result<Bytes> {
        if self.file.is_none() {
            let file = File::open(&self.path).map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Error::NotFound(format!("blob file {}", self.path.display()))
                } else {
                    Error::Storage(format!("failed to open {}: {}", self.path.display(), e))
                }
            })?;
            self.file = Some(file);
        }
        let Some(file) = self.file.as_mut() else {
            return Err(Error::Internal("chunk reader lost its file".into()));
        };

        let to_read = (self.size - self.offset).min(self.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; to_read];
        let mut filled = 0;
        while filled < to_read {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::Storage(format!(
                        "failed to read {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
        }

        if filled < to_read {
            return Err(Error::Storage(format!(
                "short read of {} at offset {}: got {} of {} bytes",
                self.path.display(),
                self.offset,
                filled,
                to_read
            )));
        }

        self.offset += to_read as u64;
        Ok(Bytes::from(buffer))
    }
}

impl Iterator for Chunks {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.size {
            self.file = None;
            return None;
        }

        let chunk = self.read_next();
        if chunk.is_err() {
            self.done = true;
            self.file = None;
        }
        Some(chunk)
    }
}
