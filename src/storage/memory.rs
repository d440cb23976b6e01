use crate::error::{Error, Result};
use crate::hash::{DigestAlgorithm, digest_string};
use crate::storage::traits::ContentStore;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// In-process blob store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".to_string()))
    }
}

impl ContentStore for MemoryStore {
    fn write_blob(&self, data: &[u8]) -> Result<String> {
        let digest = digest_string(data, DigestAlgorithm::Sha256);
        self.blobs()?
            .entry(digest.clone())
            .or_insert_with(|| data.to_vec());
        Ok(digest)
    }

    fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        self.blobs()?
            .get(digest)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("Blob not found: {digest}")))
    }

    fn exists(&self, digest: &str) -> bool {
        self.blobs().is_ok_and(|b| b.contains_key(digest))
    }
}
