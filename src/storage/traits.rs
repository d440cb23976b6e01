use crate::error::Result;

/// Content-addressed blob store.
///
/// Blobs are addressed by their `sha256:<hex>` digest. Writing the same
/// content twice is a no-op that returns the same digest.
pub trait ContentStore: Send + Sync {
    fn write_blob(&self, data: &[u8]) -> Result<String>;
    /// Reads a blob back, failing when its content no longer matches the
    /// digest.
    fn read_blob(&self, digest: &str) -> Result<Vec<u8>>;
    fn exists(&self, digest: &str) -> bool;
}
