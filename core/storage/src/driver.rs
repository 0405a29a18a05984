//! Storage driver trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::HashMap;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::local::LocalDriver;
use depot_common::{Error, Result, StoragePath};

/// Free-form metadata attached to an object at write time.
///
/// Opaque to the drivers; remote backends store it as user metadata.
pub type Metadata = HashMap<String, String>;

/// Lazily produced byte chunks for download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Readable handle over a stored object. Dropping it closes the handle.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// Content type used by [`StorageDriver::write`] when the caller has none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Lifetime of a presigned URL when no explicit expiry is given, in seconds.
pub const DEFAULT_PRESIGN_TTL_SECS: i64 = 3600;

/// Chunk size for streaming reads.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Uniform capability set every storage backend implements.
///
/// Paths are always relative to the driver's root. Each call performs its
/// I/O to completion before returning; drivers hold no per-call state and
/// may be shared across tasks.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get the driver name (e.g., "local", "cloudflare", "backblaze").
    fn name(&self) -> &str;

    /// Copy an existing local file into storage.
    ///
    /// # Postconditions
    /// - Intermediate directories or prefixes are created as needed
    ///
    /// # Errors
    /// - `NotFound` if `source` does not exist; nothing is written
    /// - `Io`/`Storage` if the destination cannot be created or written
    async fn upload(&self, source: &Path, path: &StoragePath, metadata: &Metadata) -> Result<()>;

    /// Write in-memory content to storage.
    ///
    /// Same directory creation and failure semantics as [`upload`](Self::upload).
    async fn write(
        &self,
        content: &[u8],
        path: &StoragePath,
        content_type: &str,
        metadata: &Metadata,
    ) -> Result<()>;

    /// Check if a path exists. Inaccessible paths report `false`.
    async fn exists(&self, path: &StoragePath) -> bool;

    /// Read the full content of a file.
    ///
    /// # Errors
    /// - `NotFound` if the file is absent
    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>>;

    /// Open a file for incremental reading without loading it into memory.
    async fn download_resource(&self, path: &StoragePath) -> Result<ByteReader>;

    /// Read a file as a finite stream of chunks.
    ///
    /// Every call produces a fresh stream. Drivers without chunked reads may
    /// return an empty stream.
    async fn download_chunk(&self, path: &StoragePath) -> Result<ByteStream>;

    /// Public URL (or local path) of the resource. No access control implied.
    fn url(&self, path: &StoragePath) -> String;

    /// Time-limited access URL. Expires in one hour when `expires_at` is `None`.
    async fn presigned_url(
        &self,
        path: &StoragePath,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String>;

    /// Delete a file. Returns `false` if there was nothing to delete.
    async fn delete(&self, path: &StoragePath) -> Result<bool>;

    /// Size of a file in bytes.
    async fn size(&self, path: &StoragePath) -> Result<u64>;

    /// MIME type of a file.
    async fn mime_type(&self, path: &StoragePath) -> Result<String>;

    /// Hex MD5 digest of a file.
    async fn file_hash(&self, path: &StoragePath) -> Result<String>;

    /// Move a file, creating the target's parents as needed.
    ///
    /// # Errors
    /// - `NotFound` if `source` does not exist
    async fn move_to(&self, source: &StoragePath, target: &StoragePath) -> Result<()>;

    /// Copy a file, creating the target's parents as needed.
    async fn copy(&self, source: &StoragePath, target: &StoragePath) -> Result<()>;

    /// Recursively delete a directory and everything in it.
    ///
    /// Returns `false` if `path` is not a directory.
    async fn delete_path(&self, path: &StoragePath) -> Result<bool>;

    /// The local filesystem driver behind this handle, if any.
    ///
    /// Gives access to local-only operations such as signed URL validation
    /// and directory sizes.
    fn as_local(&self) -> Option<&LocalDriver> {
        None
    }
}

/// Expiry timestamp for a presigned URL, applying the default lifetime.
///
/// # Errors
/// - `InvalidInput` if the expiry is not in the future
pub fn presign_expiry(expires_at: Option<DateTime<Utc>>) -> Result<i64> {
    let now = Utc::now().timestamp();
    let expires_at = expires_at.map_or(now + DEFAULT_PRESIGN_TTL_SECS, |t| t.timestamp());
    if expires_at <= now {
        return Err(Error::InvalidInput(
            "Presigned URL expiry must be in the future".to_string(),
        ));
    }
    Ok(expires_at)
}

/// MIME type guessed from a path's extension.
pub fn guess_mime_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presign_expiry_defaults_to_one_hour() {
        let before = Utc::now().timestamp();
        let expiry = presign_expiry(None).unwrap();
        let after = Utc::now().timestamp();

        assert!(expiry >= before + DEFAULT_PRESIGN_TTL_SECS);
        assert!(expiry <= after + DEFAULT_PRESIGN_TTL_SECS);
    }

    #[test]
    fn test_presign_expiry_explicit() {
        let at = DateTime::from_timestamp(4_000_000_000, 0).unwrap();
        assert_eq!(presign_expiry(Some(at)).unwrap(), 4_000_000_000);
    }

    #[test]
    fn test_presign_expiry_rejects_past() {
        let past = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(matches!(
            presign_expiry(Some(past)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            presign_expiry(Some(Utc::now())),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("docs/report.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("notes.txt"), "text/plain");
        assert_eq!(guess_mime_type("blob"), "application/octet-stream");
    }
}
