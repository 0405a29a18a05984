//! S3-compatible storage drivers.
//!
//! Cloudflare R2 and BackBlaze B2 speak the S3 protocol; the wire work is
//! delegated to OpenDAL. The flavors differ only in how the endpoint is
//! derived, and both can publish URLs under a custom domain:
//!
//! ```text
//! url            {domain}/{key}           or {endpoint}/{bucket}/{key}
//! presigned_url  {domain}/{key}?{query}   or the backend URL untouched
//! ```
//!
//! where `{query}` is the authentication query string of the URL the backend
//! presigned.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use md5::{Digest, Md5};
use opendal::{services, ErrorKind, Operator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::driver::{
    guess_mime_type, presign_expiry, ByteReader, ByteStream, Metadata, StorageDriver, CHUNK_SIZE,
};
use depot_common::{Error, Result, StoragePath};

/// Regions BackBlaze B2 serves S3 traffic from.
pub const BACKBLAZE_REGIONS: &[&str] = &[
    "us-west-001",
    "us-west-002",
    "us-west-003",
    "us-west-004",
    "eu-central-001",
    "eu-central-002",
    "eu-central-003",
    "eu-central-004",
];

/// Object bytes as produced by the backend reader.
type IoByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Region used by Cloudflare R2 when none is configured.
pub const CLOUDFLARE_DEFAULT_REGION: &str = "auto";

/// S3-compatible provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum S3Flavor {
    /// Cloudflare R2; the account endpoint must be configured.
    Cloudflare,
    /// BackBlaze B2; the endpoint is derived from the region.
    BackBlaze,
}

impl S3Flavor {
    /// Driver name reported by [`StorageDriver::name`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::BackBlaze => "backblaze",
        }
    }
}

/// Connection settings for an S3-compatible driver.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// Access key ID.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Bucket name.
    pub bucket: String,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub root: String,
    /// Endpoint URL. Required for Cloudflare, derived for BackBlaze.
    #[serde(default, alias = "endPoint")]
    pub endpoint: String,
    /// Signing region.
    #[serde(default)]
    pub region: String,
    /// Public domain substituted for the endpoint in generated URLs.
    #[serde(default)]
    pub domain: Option<String>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .field("root", &self.root)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("domain", &self.domain)
            .finish()
    }
}

/// Storage driver for S3-compatible object stores.
pub struct S3Driver {
    flavor: S3Flavor,
    operator: Operator,
    bucket: String,
    root: String,
    endpoint: String,
    domain: Option<String>,
}

impl S3Driver {
    /// Create a driver for the given provider.
    ///
    /// # Errors
    /// - `Configuration` if credentials or the bucket are missing, the
    ///   Cloudflare endpoint is missing, or the BackBlaze region is unusable
    pub fn new(flavor: S3Flavor, config: S3Config) -> Result<Self> {
        for (field, value) in [
            ("accessKey", &config.access_key),
            ("secretKey", &config.secret_key),
            ("bucket", &config.bucket),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "{} driver requires '{}'",
                    flavor.name(),
                    field
                )));
            }
        }

        let (endpoint, region) = match flavor {
            S3Flavor::Cloudflare => {
                if config.endpoint.trim().is_empty() {
                    return Err(Error::Configuration(
                        "cloudflare driver requires 'endpoint'".to_string(),
                    ));
                }
                let region = if config.region.is_empty() {
                    CLOUDFLARE_DEFAULT_REGION.to_string()
                } else {
                    config.region.clone()
                };
                (config.endpoint.clone(), region)
            }
            S3Flavor::BackBlaze => {
                let region = config.region.trim();
                if region.is_empty() || region == "auto" {
                    return Err(Error::Configuration(
                        "backblaze driver requires an explicit 'region'".to_string(),
                    ));
                }
                if !BACKBLAZE_REGIONS.contains(&region) {
                    warn!("Unknown BackBlaze region '{}'", region);
                }
                let endpoint = if config.endpoint.trim().is_empty() {
                    format!("https://s3.{}.backblazeb2.com", region)
                } else {
                    config.endpoint.clone()
                };
                (endpoint, region.to_string())
            }
        };
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();

        // OpenDAL addresses buckets path-style unless virtual hosts are enabled.
        let builder = services::S3::default()
            .endpoint(&endpoint)
            .bucket(&config.bucket)
            .region(&region)
            .access_key_id(&config.access_key)
            .secret_access_key(&config.secret_key)
            .disable_config_load();

        let operator = Operator::new(builder)
            .map_err(|e| Error::Configuration(e.to_string()))?
            .finish();

        info!(
            "{} storage driver for bucket '{}' at {}",
            flavor.name(),
            config.bucket,
            endpoint
        );

        Ok(Self::with_operator(
            flavor,
            operator,
            config.bucket,
            &config.root,
            endpoint,
            config.domain,
        ))
    }

    /// Wrap an already built operator.
    pub(crate) fn with_operator(
        flavor: S3Flavor,
        operator: Operator,
        bucket: String,
        root: &str,
        endpoint: String,
        domain: Option<String>,
    ) -> Self {
        Self {
            flavor,
            operator,
            bucket,
            root: root.trim_matches(['/', '\\']).to_string(),
            endpoint,
            domain: domain
                .map(|d| d.trim().trim_end_matches('/').to_string())
                .filter(|d| !d.is_empty()),
        }
    }

    /// Cloudflare R2 driver.
    pub fn cloudflare(config: S3Config) -> Result<Self> {
        Self::new(S3Flavor::Cloudflare, config)
    }

    /// BackBlaze B2 driver.
    pub fn backblaze(config: S3Config) -> Result<Self> {
        Self::new(S3Flavor::BackBlaze, config)
    }

    /// Underlying S3 client.
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Endpoint the client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Provider of this driver.
    pub fn flavor(&self) -> S3Flavor {
        self.flavor
    }

    /// Object key for a storage path, prefixed with the configured root.
    pub fn key(&self, path: &StoragePath) -> String {
        match (self.root.is_empty(), path.is_root()) {
            (true, _) => path.as_key(),
            (false, true) => self.root.clone(),
            (false, false) => format!("{}/{}", self.root, path.as_key()),
        }
    }

    async fn stat(&self, path: &StoragePath) -> Result<opendal::Metadata> {
        self.operator
            .stat(&self.key(path))
            .await
            .map_err(|e| backend_error(e, path))
    }

    async fn byte_stream(&self, path: &StoragePath) -> Result<IoByteStream> {
        self.stat(path).await?;
        let key = self.key(path);
        let reader = self
            .operator
            .reader_with(&key)
            .chunk(CHUNK_SIZE)
            .await
            .map_err(|e| backend_error(e, path))?;
        let stream = reader
            .into_bytes_stream(..)
            .await
            .map_err(|e| backend_error(e, path))?;
        Ok(Box::pin(stream))
    }
}

fn backend_error(err: opendal::Error, path: &StoragePath) -> Error {
    match err.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("Object not found: {}", path)),
        ErrorKind::ConfigInvalid => Error::Configuration(err.to_string()),
        _ => Error::Storage(err.to_string()),
    }
}

#[async_trait]
impl StorageDriver for S3Driver {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    async fn upload(&self, source: &Path, path: &StoragePath, metadata: &Metadata) -> Result<()> {
        let source_meta = tokio::fs::metadata(source).await.map_err(|e| {
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

        let key = self.key(path);
        let mut file = tokio::fs::File::open(source).await?;
        let mut writer = self
            .operator
            .writer_with(&key)
            .content_type(&guess_mime_type(&source.to_string_lossy()))
            .user_metadata(metadata.clone())
            .await
            .map_err(|e| backend_error(e, path))?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                let _ = writer.abort().await;
                return Err(backend_error(e, path));
            }
        }
        writer.close().await.map_err(|e| backend_error(e, path))?;

        debug!("Uploaded {} to {}/{}", source.display(), self.bucket, key);
        Ok(())
    }

    async fn write(
        &self,
        content: &[u8],
        path: &StoragePath,
        content_type: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        let key = self.key(path);
        self.operator
            .write_with(&key, content.to_vec())
            .content_type(content_type)
            .user_metadata(metadata.clone())
            .await
            .map_err(|e| backend_error(e, path))?;

        debug!("Wrote {} bytes to {}/{}", content.len(), self.bucket, key);
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> bool {
        self.operator
            .exists(&self.key(path))
            .await
            .unwrap_or(false)
    }

    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        let buffer = self
            .operator
            .read(&self.key(path))
            .await
            .map_err(|e| backend_error(e, path))?;
        Ok(buffer.to_vec())
    }

    async fn download_resource(&self, path: &StoragePath) -> Result<ByteReader> {
        let stream = self.byte_stream(path).await?;
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn download_chunk(&self, path: &StoragePath) -> Result<ByteStream> {
        let stream = self.byte_stream(path).await?;
        Ok(Box::pin(stream.map(|chunk| chunk.map_err(Error::from))))
    }

    fn url(&self, path: &StoragePath) -> String {
        let key = self.key(path);
        match &self.domain {
            Some(domain) => format!("{}/{}", domain, key),
            None => format!("{}/{}/{}", self.endpoint, self.bucket, key),
        }
    }

    async fn presigned_url(
        &self,
        path: &StoragePath,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let ttl = (presign_expiry(expires_at)? - Utc::now().timestamp()).max(1);

        let key = self.key(path);
        let presigned = self
            .operator
            .presign_read(&key, Duration::from_secs(ttl as u64))
            .await
            .map_err(|e| backend_error(e, path))?;

        let uri = presigned.uri();
        Ok(match &self.domain {
            Some(domain) => format!("{}/{}?{}", domain, key, uri.query().unwrap_or_default()),
            None => uri.to_string(),
        })
    }

    async fn delete(&self, path: &StoragePath) -> Result<bool> {
        if !self.exists(path).await {
            return Ok(false);
        }

        let key = self.key(path);
        self.operator
            .delete(&key)
            .await
            .map_err(|e| backend_error(e, path))?;

        debug!("Deleted {}/{}", self.bucket, key);
        Ok(true)
    }

    async fn size(&self, path: &StoragePath) -> Result<u64> {
        Ok(self.stat(path).await?.content_length())
    }

    async fn mime_type(&self, path: &StoragePath) -> Result<String> {
        let meta = self.stat(path).await?;
        Ok(meta
            .content_type()
            .map(String::from)
            .unwrap_or_else(|| guess_mime_type(&self.key(path))))
    }

    async fn file_hash(&self, path: &StoragePath) -> Result<String> {
        let meta = self.stat(path).await?;

        // Multipart ETags carry a "-N" suffix and are not content digests.
        if let Some(etag) = meta.etag().map(|e| e.trim_matches('"')) {
            if etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit()) {
                return Ok(etag.to_ascii_lowercase());
            }
        }

        let mut stream = self.byte_stream(path).await?;
        let mut hasher = Md5::new();
        while let Some(chunk) = stream.next().await {
            hasher.update(&chunk?);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    async fn move_to(&self, source: &StoragePath, target: &StoragePath) -> Result<()> {
        self.copy(source, target).await?;

        let from = self.key(source);
        if let Err(e) = self.operator.delete(&from).await {
            warn!(
                "Copied {} to {} but could not remove the source: {}",
                source, target, e
            );
            return Err(backend_error(e, source));
        }

        debug!("Moved {} to {}", source, target);
        Ok(())
    }

    async fn copy(&self, source: &StoragePath, target: &StoragePath) -> Result<()> {
        let meta = self.stat(source).await?;
        let (from, to) = (self.key(source), self.key(target));

        if self.operator.info().full_capability().copy {
            self.operator
                .copy(&from, &to)
                .await
                .map_err(|e| backend_error(e, source))?;
        } else {
            let content = self
                .operator
                .read(&from)
                .await
                .map_err(|e| backend_error(e, source))?;
            let mut write = self.operator.write_with(&to, content);
            if let Some(content_type) = meta.content_type() {
                write = write.content_type(content_type);
            }
            if let Some(user_metadata) = meta.user_metadata() {
                write = write.user_metadata(user_metadata.clone());
            }
            write.await.map_err(|e| backend_error(e, target))?;
        }

        debug!("Copied {} to {}", source, target);
        Ok(())
    }

    async fn delete_path(&self, path: &StoragePath) -> Result<bool> {
        if path.is_root() && self.root.is_empty() {
            return Err(Error::InvalidInput(
                "Refusing to delete the whole bucket".to_string(),
            ));
        }

        let prefix = format!("{}/", self.key(path));
        let entries = match self.operator.list_with(&prefix).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(backend_error(e, path)),
        };

        if entries.is_empty() {
            return Ok(false);
        }

        for entry in &entries {
            self.operator
                .delete(entry.path())
                .await
                .map_err(|e| backend_error(e, path))?;
        }

        debug!("Deleted {} objects under {}", entries.len(), prefix);
        Ok(true)
    }
}
