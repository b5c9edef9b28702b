//! Filesystem side of storage
//!
//! Bodies are written once per content hash under `content/`, and every
//! stored URL gets a JSON metadata sidecar under `metadata/`.

use crate::storage::traits::StorageResult;
use crate::storage::StoredRecord;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CONTENT_DIR: &str = "content";
const METADATA_DIR: &str = "metadata";

/// Content-addressed blob directory plus metadata sidecars
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Opens the store rooted at `root`, creating its directories
    pub fn open(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root.join(CONTENT_DIR))?;
        fs::create_dir_all(root.join(METADATA_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reference (relative to the root) of the blob for `content_hash`
    pub fn content_ref(content_hash: &str) -> String {
        format!("{}/{}.html", CONTENT_DIR, content_hash)
    }

    /// Reference (relative to the root) of the metadata for `url_hash`
    pub fn metadata_ref(url_hash: &str) -> String {
        format!("{}/{}.json", METADATA_DIR, url_hash)
    }

    /// Writes a body and returns its reference
    ///
    /// The write goes to a temporary file first and is renamed into place,
    /// so a reader never sees a half-written blob.
    pub fn write_content(&self, content_hash: &str, body: &[u8]) -> io::Result<String> {
        let content_ref = Self::content_ref(content_hash);
        let path = self.root.join(&content_ref);
        let tmp = path.with_extension("html.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(content_ref)
    }

    pub fn read_content(&self, content_ref: &str) -> io::Result<String> {
        fs::read_to_string(self.root.join(content_ref))
    }

    /// Number of blob files on disk
    pub fn count_content_files(&self) -> io::Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(self.root.join(CONTENT_DIR))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "html") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Writes the JSON sidecar for a record and returns its reference
    pub fn write_metadata(&self, record: &StoredRecord) -> StorageResult<String> {
        let metadata_ref = Self::metadata_ref(&record.url_hash);
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(self.root.join(&metadata_ref), json)?;
        Ok(metadata_ref)
    }

    pub fn read_metadata(&self, metadata_ref: &str) -> StorageResult<StoredRecord> {
        let bytes = fs::read(self.root.join(metadata_ref))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
