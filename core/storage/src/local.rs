//! Local filesystem storage driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::driver::{
    guess_mime_type, presign_expiry, ByteReader, ByteStream, Metadata, StorageDriver, CHUNK_SIZE,
};
use crate::signing::UrlSigner;
use depot_common::{DirectoryNotCreated, Error, Result, StoragePath};

/// Mode for directories created on demand.
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Local filesystem storage driver.
///
/// Resolves every storage path under a fixed root directory and signs
/// temporary URLs with an HMAC key, giving local files the same presigned
/// URL semantics object stores provide natively.
pub struct LocalDriver {
    root: PathBuf,
    signer: UrlSigner,
}

impl LocalDriver {
    /// Create a new local driver with the given root directory.
    ///
    /// # Postconditions
    /// - Trailing separators are trimmed from the root
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Root cannot be created
    pub fn new(root: impl AsRef<Path>, signer: UrlSigner) -> Result<Self> {
        let raw = root.as_ref().to_string_lossy();
        let trimmed = raw.trim_end_matches(['/', '\\']);
        let root = if trimmed.is_empty() && !raw.is_empty() {
            PathBuf::from(std::path::MAIN_SEPARATOR_STR)
        } else {
            PathBuf::from(trimmed)
        };

        if root.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "Local driver requires a root directory".to_string(),
            ));
        }

        // Create root if it doesn't exist (sync for constructor)
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        info!("Local storage driver rooted at {}", root.display());
        Ok(Self { root, signer })
    }

    /// Root directory of this driver.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert a StoragePath to a filesystem path under the root.
    pub fn resolve(&self, path: &StoragePath) -> PathBuf {
        let mut fs_path = self.root.clone();
        for component in path.components() {
            fs_path.push(component);
        }
        fs_path
    }

    fn resolve_str(&self, path: &StoragePath) -> String {
        self.resolve(path).to_string_lossy().into_owned()
    }

    /// Check a URL produced by [`presigned_url`](StorageDriver::presigned_url)
    /// against the path of the current request.
    ///
    /// Never fails: malformed, expired or tampered URLs yield `false`.
    pub fn validate_signed_url(&self, url: &str, path: &StoragePath) -> bool {
        self.validate_signed_url_at(url, path, Utc::now().timestamp())
    }

    /// Same as [`validate_signed_url`](Self::validate_signed_url) with an
    /// explicit current time.
    pub fn validate_signed_url_at(&self, url: &str, path: &StoragePath, now: i64) -> bool {
        self.signer.verify(url, &self.resolve_str(path), now)
    }

    /// Total size in bytes of all files below a directory, hidden files included.
    ///
    /// # Errors
    /// - `NotFound` if the directory does not exist
    /// - `InvalidInput` if the path is not a directory
    pub async fn directory_size(&self, path: &StoragePath) -> Result<u64> {
        let fs_path = self.resolve(path);
        let fs_meta = fs::metadata(&fs_path)
            .await
            .map_err(|e| not_found_or_io(e, path))?;

        if !fs_meta.is_dir() {
            return Err(Error::InvalidInput(format!("Not a directory: {}", path)));
        }

        tree_size(fs_path).await
    }

    /// Bytes available to unprivileged users on the root's partition.
    pub fn partition_free_space(&self) -> Result<u64> {
        Ok(fs2::available_space(&self.root)?)
    }

    /// Total bytes on the root's partition.
    pub fn partition_total_space(&self) -> Result<u64> {
        Ok(fs2::total_space(&self.root)?)
    }

    /// Create the parent directory of `target` if needed.
    ///
    /// Concurrent creation of the same directory is not an error.
    async fn ensure_parent(&self, target: &Path) -> Result<()> {
        let Some(parent) = target.parent() else {
            return Ok(());
        };

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIR_MODE);

        builder.create(parent).await.map_err(|source| {
            Error::Io(std::io::Error::new(
                source.kind(),
                DirectoryNotCreated {
                    path: parent.to_path_buf(),
                    source,
                },
            ))
        })
    }

    /// Resolve a path that must name an existing regular file.
    async fn existing_file(&self, path: &StoragePath) -> Result<(PathBuf, std::fs::Metadata)> {
        let fs_path = self.resolve(path);
        let fs_meta = fs::metadata(&fs_path)
            .await
            .map_err(|e| not_found_or_io(e, path))?;

        if fs_meta.is_dir() {
            return Err(Error::InvalidInput(format!("Not a file: {}", path)));
        }

        Ok((fs_path, fs_meta))
    }

    fn writable_target(&self, path: &StoragePath) -> Result<PathBuf> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "Cannot write to the storage root".to_string(),
            ));
        }
        Ok(self.resolve(path))
    }
}

fn not_found_or_io(err: std::io::Error, path: &StoragePath) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("File not found: {}", path))
    } else {
        Error::Io(err)
    }
}

/// Depth-first removal of a directory tree.
fn remove_tree(dir: PathBuf) -> BoxFuture<'static, Result<()>> {
    async move {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                remove_tree(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        fs::remove_dir(&dir).await?;
        Ok(())
    }
    .boxed()
}

/// Recursive sum of file sizes below `dir`.
///
/// `read_dir` never yields the `.`/`..` self entries, so every other name,
/// dot-prefixed or not, is counted.
fn tree_size(dir: PathBuf) -> BoxFuture<'static, Result<u64>> {
    async move {
        let mut size = 0u64;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                size += tree_size(entry.path()).await?;
            } else {
                size += entry.metadata().await?.len();
            }
        }
        Ok(size)
    }
    .boxed()
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, source: &Path, path: &StoragePath, _metadata: &Metadata) -> Result<()> {
        let source_meta = fs::metadata(source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("Source file not found: {}", source.display()))
            } else {
                Error::Io(e)
            }
        })?;

        if source_meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Source is a directory: {}",
                source.display()
            )));
        }

        let target = self.writable_target(path)?;
        self.ensure_parent(&target).await?;
        fs::copy(source, &target).await?;

        debug!("Uploaded {} to {}", source.display(), target.display());
        Ok(())
    }

    async fn write(
        &self,
        content: &[u8],
        path: &StoragePath,
        _content_type: &str,
        _metadata: &Metadata,
    ) -> Result<()> {
        let target = self.writable_target(path)?;
        self.ensure_parent(&target).await?;
        fs::write(&target, content).await?;

        debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> bool {
        fs::try_exists(self.resolve(path)).await.unwrap_or(false)
    }

    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        let (fs_path, _) = self.existing_file(path).await?;
        Ok(fs::read(&fs_path).await?)
    }

    async fn download_resource(&self, path: &StoragePath) -> Result<ByteReader> {
        let (fs_path, _) = self.existing_file(path).await?;
        let file = fs::File::open(&fs_path).await?;
        Ok(Box::pin(file))
    }

    async fn download_chunk(&self, path: &StoragePath) -> Result<ByteStream> {
        let (fs_path, _) = self.existing_file(path).await?;
        let file = fs::File::open(&fs_path).await?;
        let stream = ReaderStream::with_capacity(file, CHUNK_SIZE).map(|chunk| chunk.map_err(Error::from));
        Ok(Box::pin(stream))
    }

    fn url(&self, path: &StoragePath) -> String {
        self.resolve_str(path)
    }

    async fn presigned_url(
        &self,
        path: &StoragePath,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let expires_at = presign_expiry(expires_at)?;
        Ok(self.signer.sign_url(&self.resolve_str(path), expires_at))
    }

    async fn delete(&self, path: &StoragePath) -> Result<bool> {
        let fs_path = self.resolve(path);

        let fs_meta = match fs::symlink_metadata(&fs_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if fs_meta.is_dir() {
            debug!("Refusing to delete directory {} as a file", path);
            return Ok(false);
        }

        match fs::remove_file(&fs_path).await {
            Ok(()) => {
                debug!("Deleted {}", fs_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, path: &StoragePath) -> Result<u64> {
        let (_, fs_meta) = self.existing_file(path).await?;
        Ok(fs_meta.len())
    }

    async fn mime_type(&self, path: &StoragePath) -> Result<String> {
        let (fs_path, _) = self.existing_file(path).await?;
        Ok(guess_mime_type(&fs_path.to_string_lossy()))
    }

    async fn file_hash(&self, path: &StoragePath) -> Result<String> {
        let (fs_path, _) = self.existing_file(path).await?;
        let mut file = fs::File::open(&fs_path).await?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    async fn move_to(&self, source: &StoragePath, target: &StoragePath) -> Result<()> {
        let from_path = self.resolve(source);
        let to_path = self.writable_target(target)?;

        if !fs::try_exists(&from_path).await? {
            return Err(Error::NotFound(format!("Source not found: {}", source)));
        }

        self.ensure_parent(&to_path).await?;
        fs::rename(&from_path, &to_path).await?;

        debug!("Moved {} to {}", from_path.display(), to_path.display());
        Ok(())
    }

    async fn copy(&self, source: &StoragePath, target: &StoragePath) -> Result<()> {
        let (from_path, _) = self.existing_file(source).await?;
        let to_path = self.writable_target(target)?;

        self.ensure_parent(&to_path).await?;
        fs::copy(&from_path, &to_path).await?;

        debug!("Copied {} to {}", from_path.display(), to_path.display());
        Ok(())
    }

    async fn delete_path(&self, path: &StoragePath) -> Result<bool> {
        if path.is_root() {
            return Err(Error::InvalidInput(
                "Refusing to delete the storage root".to_string(),
            ));
        }

        let fs_path = self.resolve(path);
        match fs::symlink_metadata(&fs_path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        remove_tree(fs_path.clone()).await?;
        debug!("Deleted directory tree {}", fs_path.display());
        Ok(true)
    }

    fn as_local(&self) -> Option<&LocalDriver> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::SigningKey;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn signer() -> UrlSigner {
        UrlSigner::new(SigningKey::new("local-test-secret-0123456789abcdef").unwrap())
    }

    fn driver(temp: &TempDir) -> LocalDriver {
        LocalDriver::new(temp.path(), signer()).unwrap()
    }

    fn p(path: &str) -> StoragePath {
        StoragePath::parse(path).unwrap()
    }

    async fn write_str(driver: &LocalDriver, path: &str, content: &str) {
        driver
            .write(content.as_bytes(), &p(path), "text/plain", &Metadata::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_local_write_download() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        write_str(&driver, "text.txt", "Hello World").await;

        assert!(driver.exists(&p("text.txt")).await);
        assert_eq!(driver.download(&p("text.txt")).await.unwrap(), b"Hello World");
        assert!(std::path::Path::new(&driver.url(&p("text.txt"))).is_file());
    }

    #[tokio::test]
    async fn test_local_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        write_str(&driver, "/a/b/c/deep.txt", "deep").await;

        assert!(temp.path().join("a/b/c/deep.txt").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_created_dirs_are_0755() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "perm/file.txt", "x").await;

        let mode = std::fs::metadata(temp.path().join("perm"))
            .unwrap()
            .permissions()
            .mode();
        // umask may clear bits but never adds any
        assert_eq!(mode & 0o777 & !0o755, 0);
    }

    #[tokio::test]
    async fn test_local_write_fails_when_parent_is_file() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "blocker", "file").await;

        let err = driver
            .write(b"x", &p("blocker/child.txt"), "text/plain", &Metadata::new())
            .await
            .unwrap_err();

        let Error::Io(io) = &err else {
            panic!("unexpected error: {}", err);
        };
        let not_created = io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<DirectoryNotCreated>())
            .expect("directory error attached");
        assert_eq!(not_created.path, temp.path().join("blocker"));
        assert!(err.to_string().contains("was not created"));
        // The OS error stays reachable through the source chain.
        let cause = std::error::Error::source(io).expect("cause attached");
        assert_eq!(cause.to_string(), not_created.source.to_string());
    }

    #[tokio::test]
    async fn test_local_root_with_trailing_separator() {
        let temp = TempDir::new().unwrap();
        let root = format!("{}/", temp.path().display());
        let driver = LocalDriver::new(&root, signer()).unwrap();

        assert_eq!(
            driver.url(&p("/x.txt")),
            temp.path().join("x.txt").to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_local_download_missing() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        let err = driver.download(&p("missing.txt")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(matches!(
            driver.size(&p("missing.txt")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            driver.mime_type(&p("missing.txt")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            driver.file_hash(&p("missing.txt")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_exists() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "present.txt", "x").await;

        assert!(driver.exists(&p("present.txt")).await);
        assert!(!driver.exists(&p("absent.txt")).await);
    }

    #[tokio::test]
    async fn test_local_upload() {
        let temp = TempDir::new().unwrap();
        let source_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("src.bin");
        std::fs::write(&source, [1u8, 2, 3]).unwrap();
        let driver = driver(&temp);

        driver
            .upload(&source, &p("uploads/2024/src.bin"), &Metadata::new())
            .await
            .unwrap();

        assert_eq!(
            driver.download(&p("uploads/2024/src.bin")).await.unwrap(),
            vec![1, 2, 3]
        );
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_local_upload_missing_source() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        let err = driver
            .upload(
                Path::new("/nonexistent/source.bin"),
                &p("target/file.bin"),
                &Metadata::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(!driver.exists(&p("target/file.bin")).await);
        assert!(!driver.exists(&p("target")).await);
    }

    #[tokio::test]
    async fn test_local_download_resource() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "resource.txt", "Hello World").await;

        let mut reader = driver.download_resource(&p("resource.txt")).await.unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).await.unwrap();

        assert_eq!(content, "Hello World");
    }

    #[tokio::test]
    async fn test_local_download_chunk() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 10)).map(|i| (i % 251) as u8).collect();
        driver
            .write(&data, &p("big.bin"), "application/octet-stream", &Metadata::new())
            .await
            .unwrap();

        let mut stream = driver.download_chunk(&p("big.bin")).await.unwrap();
        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
            chunks += 1;
        }

        assert_eq!(collected, data);
        assert!(chunks >= 3);
    }

    #[tokio::test]
    async fn test_local_delete_idempotent() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "text-for-delete.txt", "Hello World").await;

        assert!(driver.delete(&p("text-for-delete.txt")).await.unwrap());
        assert!(!driver.exists(&p("text-for-delete.txt")).await);
        assert!(!driver.delete(&p("text-for-delete.txt")).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_delete_leaves_directories() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "dir/file.txt", "x").await;

        assert!(!driver.delete(&p("dir")).await.unwrap());
        assert!(driver.exists(&p("dir/file.txt")).await);
    }

    #[tokio::test]
    async fn test_local_metadata_queries() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "docs/readme.txt", "Hello World").await;

        assert_eq!(driver.size(&p("docs/readme.txt")).await.unwrap(), 11);
        assert_eq!(
            driver.mime_type(&p("docs/readme.txt")).await.unwrap(),
            "text/plain"
        );
        assert_eq!(
            driver.file_hash(&p("docs/readme.txt")).await.unwrap(),
            "b10a8db164e0754105b7a99be72e3fe5"
        );
    }

    #[tokio::test]
    async fn test_local_move() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "text-for-move.txt", "Hello World").await;

        driver
            .move_to(&p("text-for-move.txt"), &p("moved/text-for-move-new.txt"))
            .await
            .unwrap();

        assert!(!driver.exists(&p("text-for-move.txt")).await);
        assert!(driver.exists(&p("moved/text-for-move-new.txt")).await);
        assert_eq!(
            driver.download(&p("moved/text-for-move-new.txt")).await.unwrap(),
            b"Hello World"
        );
    }

    #[tokio::test]
    async fn test_local_move_missing_source() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        let err = driver.move_to(&p("nope.txt"), &p("dest/nope.txt")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!driver.exists(&p("dest")).await);
    }

    #[tokio::test]
    async fn test_local_copy() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "orig.txt", "copy me").await;

        driver.copy(&p("orig.txt"), &p("copies/dup.txt")).await.unwrap();

        assert_eq!(driver.download(&p("orig.txt")).await.unwrap(), b"copy me");
        assert_eq!(driver.download(&p("copies/dup.txt")).await.unwrap(), b"copy me");
    }

    #[tokio::test]
    async fn test_local_delete_path() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "tree/a.txt", "a").await;
        write_str(&driver, "tree/sub/b.txt", "bb").await;
        write_str(&driver, "tree/sub/deeper/.hidden", "ccc").await;
        write_str(&driver, "keep.txt", "keep").await;

        assert!(driver.delete_path(&p("tree")).await.unwrap());

        assert!(!driver.exists(&p("tree")).await);
        assert!(!temp.path().join("tree").exists());
        assert!(driver.exists(&p("keep.txt")).await);
    }

    #[tokio::test]
    async fn test_local_delete_path_not_directory() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "file.txt", "x").await;

        assert!(!driver.delete_path(&p("file.txt")).await.unwrap());
        assert!(!driver.delete_path(&p("missing")).await.unwrap());
        assert!(driver.exists(&p("file.txt")).await);
        assert!(matches!(
            driver.delete_path(&StoragePath::root()).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_local_directory_size_counts_hidden_files() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "sized/a.txt", "12345").await;
        write_str(&driver, "sized/.env", "123").await;
        write_str(&driver, "sized/nested/b.txt", "12").await;

        assert_eq!(driver.directory_size(&p("sized")).await.unwrap(), 10);
        assert!(matches!(
            driver.directory_size(&p("sized/a.txt")).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            driver.directory_size(&p("nothing")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_partition_space() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        let total = driver.partition_total_space().unwrap();
        let free = driver.partition_free_space().unwrap();
        assert!(total > 0);
        assert!(free <= total);
    }

    #[tokio::test]
    async fn test_local_presigned_url_round_trip() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "secret.pdf", "pdf").await;

        let url = driver.presigned_url(&p("secret.pdf"), None).await.unwrap();
        let resolved = driver.url(&p("secret.pdf"));

        assert!(url.starts_with(&format!("{}?t=", resolved)));
        assert!(url.contains("&s="));
        assert!(driver.validate_signed_url(&url, &p("secret.pdf")));
        assert!(!driver.validate_signed_url(&url, &p("other.pdf")));
    }

    #[tokio::test]
    async fn test_local_presigned_url_window() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        let expires = DateTime::from_timestamp(2_000_000_000, 0).unwrap();

        let url = driver
            .presigned_url(&p("a.txt"), Some(expires))
            .await
            .unwrap();

        assert!(url.contains("t=2000000000"));
        assert!(driver.validate_signed_url_at(&url, &p("a.txt"), 1_999_999_999));
        assert!(!driver.validate_signed_url_at(&url, &p("a.txt"), 2_000_000_000));
        assert!(!driver.validate_signed_url_at(&url, &p("a.txt"), 2_000_000_001));
    }

    #[tokio::test]
    async fn test_local_presigned_url_reserved_characters() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        write_str(&driver, "reports/q#1.pdf", "pdf").await;

        let url = driver
            .presigned_url(&p("reports/q#1.pdf"), None)
            .await
            .unwrap();

        assert!(driver.validate_signed_url(&url, &p("reports/q#1.pdf")));
        assert!(!driver.validate_signed_url(&url, &p("reports/q")));
    }

    #[tokio::test]
    async fn test_local_presigned_url_rejects_past_expiry() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);

        for expires in [
            Utc::now() - chrono::Duration::seconds(10),
            DateTime::from_timestamp(0, 0).unwrap(),
            DateTime::from_timestamp(-5, 0).unwrap(),
        ] {
            let result = driver.presigned_url(&p("a.txt"), Some(expires)).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))));
        }
    }

    #[tokio::test]
    async fn test_local_presigned_url_tampering() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp);
        let expires = DateTime::from_timestamp(2_000_000_000, 0).unwrap();
        let url = driver
            .presigned_url(&p("a.txt"), Some(expires))
            .await
            .unwrap();
        let now = 1_900_000_000;

        let (base, sig) = url.rsplit_once("&s=").unwrap();
        let flipped = if sig.starts_with('0') { "1" } else { "0" };
        let bad_sig = format!("{}&s={}{}", base, flipped, &sig[1..]);
        assert!(!driver.validate_signed_url_at(&bad_sig, &p("a.txt"), now));

        let bad_t = url.replace("t=2000000000", "t=2000000001");
        assert!(!driver.validate_signed_url_at(&bad_t, &p("a.txt"), now));

        assert!(!driver.validate_signed_url_at("garbage", &p("a.txt"), now));
    }
}
