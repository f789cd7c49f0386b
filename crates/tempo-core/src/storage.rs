//! Key-blob storage interface
//!
//! The host platform provides durable storage; the store only ever reads and
//! writes whole blobs under one key.

use std::collections::HashMap;

/// Error type for storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key-blob store.
pub trait Storage {
    /// Reads the blob under `key`, `None` if nothing was stored yet.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replaces the blob under `key`.
    fn store(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).load(key)
    }

    fn store(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        (**self).store(key, blob)
    }
}

/// In-memory storage. Writes can be made to fail for a number of attempts,
/// which is how persistence failures are exercised.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blobs: HashMap<String, Vec<u8>>,
    failures_left: usize,
    writes: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(key: &str, blob: Vec<u8>) -> Self {
        let mut storage = Self::default();
        storage.blobs.insert(key.to_string(), blob);
        storage
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&mut self, count: usize) {
        self.failures_left = count;
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn blob(&self, key: &str) -> Option<&[u8]> {
        self.blobs.get(key).map(Vec::as_slice)
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn store(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        self.blobs.insert(key.to_string(), blob.to_vec());
        self.writes += 1;
        Ok(())
    }
}
