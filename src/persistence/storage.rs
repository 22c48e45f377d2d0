//! EEPROM-like storage backends for the device record.
//!
//! Writes are staged in a RAM image and only become durable on [`NvStorage::commit`],
//! mirroring how flash-emulated EEPROM behaves on the target hardware.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Value of a byte that has never been written.
pub const ERASED_BYTE: u8 = 0xFF;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write of {len} bytes at offset {offset} exceeds the {size} byte image")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("commit failed: {0}")]
    CommitFailed(String),
}

/// Byte-addressable non-volatile image with explicit commit.
#[async_trait]
pub trait NvStorage: Send {
    /// Size of the image in bytes.
    fn size(&self) -> usize;

    /// Current contents, including staged but uncommitted writes.
    fn image(&self) -> &[u8];

    /// Stages `bytes` at `offset`.
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError>;

    /// Makes all staged writes durable.
    async fn commit(&mut self) -> Result<(), StoreError>;
}

fn stage(image: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
    let end = offset
        .checked_add(bytes.len())
        .filter(|end| *end <= image.len())
        .ok_or(StoreError::OutOfBounds {
            offset,
            len: bytes.len(),
            size: image.len(),
        })?;
    image[offset..end].copy_from_slice(bytes);
    Ok(())
}

/// Record image kept in a file on the host filesystem.
///
/// A missing file reads as an erased image. Commits go through a sibling temporary file
/// that is renamed over the image, so a crash never leaves a half-written record.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    image: Vec<u8>,
}

impl FileStorage {
    pub async fn open(path: impl Into<PathBuf>, size: usize) -> Result<Self, StoreError> {
        let path = path.into();
        let mut image = vec![ERASED_BYTE; size];

        match fs::read(&path).await {
            Ok(content) => {
                if content.len() != size {
                    warn!(
                        "Record image {} has {} bytes, expected {}",
                        path.display(),
                        content.len(),
                        size
                    );
                }
                let n = content.len().min(size);
                image[..n].copy_from_slice(&content[..n]);
                debug!("Loaded record image from {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No record image at {}, starting from erased storage",
                    path.display()
                );
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        }

        Ok(Self { path, image })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl NvStorage for FileStorage {
    fn size(&self) -> usize {
        self.image.len()
    }

    fn image(&self) -> &[u8] {
        &self.image
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        stage(&mut self.image, offset, bytes)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(&self.image)
            .await
            .map_err(|e| self.io_err(e))?;
        file.sync_all().await.map_err(|e| self.io_err(e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::CommitFailed(format!("rename failed: {}", e)))?;
        debug!("Committed {} bytes to {}", self.image.len(), self.path.display());
        Ok(())
    }
}

/// In-memory image, used by tests and as a last-resort backend.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    image: Vec<u8>,
    committed: Vec<u8>,
    fail_commits: bool,
}

impl MemoryStorage {
    pub fn erased(size: usize) -> Self {
        Self::from_image(vec![ERASED_BYTE; size])
    }

    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            committed: image.clone(),
            image,
            fail_commits: false,
        }
    }

    /// Makes every following commit fail.
    pub fn fail_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    pub fn committed(&self) -> &[u8] {
        &self.committed
    }
}

#[async_trait]
impl NvStorage for MemoryStorage {
    fn size(&self) -> usize {
        self.image.len()
    }

    fn image(&self) -> &[u8] {
        &self.image
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StoreError> {
        stage(&mut self.image, offset, bytes)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if self.fail_commits {
            return Err(StoreError::CommitFailed("storage is read-only".to_string()));
        }
        self.committed = self.image.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_erased() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("eeprom.bin"), 16)
            .await
            .unwrap();
        assert!(storage.image().iter().all(|b| *b == ERASED_BYTE));
    }

    #[tokio::test]
    async fn file_commit_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("eeprom.bin");

        let mut storage = FileStorage::open(&path, 8).await.unwrap();
        storage.write(2, b"abc").unwrap();
        storage.commit().await.unwrap();

        let reopened = FileStorage::open(&path, 8).await.unwrap();
        assert_eq!(&reopened.image()[2..5], b"abc");
        assert_eq!(reopened.image()[0], ERASED_BYTE);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn commit_over_existing_image_replaces_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eeprom.bin");
        tokio::fs::write(&path, [0u8; 4]).await.unwrap();

        let mut storage = FileStorage::open(&path, 4).await.unwrap();
        assert_eq!(storage.image(), &[0u8; 4]);
        storage.write(1, b"q").unwrap();
        storage.commit().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), vec![0, b'q', 0, 0]);
    }

    #[tokio::test]
    async fn uncommitted_writes_are_not_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eeprom.bin");

        let mut storage = FileStorage::open(&path, 4).await.unwrap();
        storage.write(0, b"zz").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path, 4).await.unwrap();
        assert_eq!(reopened.image(), &[ERASED_BYTE; 4]);
    }

    #[test]
    fn write_past_end_is_rejected() {
        let mut storage = MemoryStorage::erased(4);
        assert!(matches!(
            storage.write(3, b"xy"),
            Err(StoreError::OutOfBounds { offset: 3, len: 2, size: 4 })
        ));
    }

    #[tokio::test]
    async fn memory_commit_snapshots_image() {
        let mut storage = MemoryStorage::erased(4);
        storage.write(0, b"ok").unwrap();
        assert_eq!(storage.committed(), &[ERASED_BYTE; 4]);
        storage.commit().await.unwrap();
        assert_eq!(&storage.committed()[..2], b"ok");
    }
}
