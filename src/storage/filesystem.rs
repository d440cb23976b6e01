use crate::error::{Error, Result};
use crate::hash::{DigestAlgorithm, calculate_hash_with_algorithm, digest_string, parse_digest};
use crate::oci::ImageIndex;
use crate::storage::traits::ContentStore;
use crate::utils::{safe_create_file, safe_open_file};
use std::fs::create_dir_all;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const BLOBS_DIR: &str = "blobs";
const INDEX_FILE: &str = "index.json";
const LAYOUT_FILE: &str = "oci-layout";
const LAYOUT_VERSION: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

/// Blob store laid out as an OCI image layout directory.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    base_path: PathBuf,
}

impl FilesystemStore {
    pub fn new<P: AsRef<Path>>(url: P) -> Result<Self> {
        let path_str = url.as_ref().to_string_lossy();
        let path = match path_str.strip_prefix("file://") {
            Some(stripped) => PathBuf::from(stripped),
            None => PathBuf::from(path_str.to_string()),
        };

        if !path.exists() {
            create_dir_all(&path)?;
        }

        let layout = path.join(LAYOUT_FILE);
        if !layout.exists() {
            safe_create_file(&layout, false)?.write_all(LAYOUT_VERSION.as_bytes())?;
        }

        Ok(Self { base_path: path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, digest: &str) -> Result<PathBuf> {
        let (algorithm, hex) = parse_digest(digest)?;
        Ok(self
            .base_path
            .join(BLOBS_DIR)
            .join(algorithm.as_str())
            .join(hex))
    }

    /// Reads `index.json`, or an empty index if the layout has none yet.
    pub fn read_index(&self) -> Result<ImageIndex> {
        let path = self.base_path.join(INDEX_FILE);
        if !path.exists() {
            return Ok(ImageIndex::default());
        }
        let mut content = String::new();
        safe_open_file(&path, false)?.read_to_string(&mut content)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("Failed to parse image index: {e}")))
    }

    pub fn write_index(&self, index: &ImageIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let mut file = safe_create_file(&self.base_path.join(INDEX_FILE), false)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

impl ContentStore for FilesystemStore {
    fn write_blob(&self, data: &[u8]) -> Result<String> {
        let digest = digest_string(data, DigestAlgorithm::Sha256);
        let path = self.blob_path(&digest)?;
        if path.exists() {
            log::debug!("blob {digest} already present");
            return Ok(digest);
        }

        let mut file = safe_create_file(&path, false)?;
        file.write_all(data)?;
        Ok(digest)
    }

    fn read_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(digest)?;
        if !path.exists() {
            return Err(Error::Storage(format!("Blob not found: {digest}")));
        }

        let mut data = Vec::new();
        safe_open_file(&path, false)?.read_to_end(&mut data)?;

        let (algorithm, expected) = parse_digest(digest)?;
        if calculate_hash_with_algorithm(&data, algorithm) != expected {
            return Err(Error::Storage(format!("Blob {digest} is corrupted")));
        }
        Ok(data)
    }

    fn exists(&self, digest: &str) -> bool {
        self.blob_path(digest).is_ok_and(|p| p.exists())
    }
}
