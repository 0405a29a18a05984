//! Device registry: a default device plus named drivers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::driver::{ByteReader, ByteStream, Metadata, StorageDriver};
use crate::local::LocalDriver;
use depot_common::{Error, Result, StoragePath};

/// Registry of configured storage devices.
///
/// Holds one driver per device key and a designated default. The registry
/// itself implements [`StorageDriver`], forwarding every call to the default
/// device, so application code can depend on `Storage` and switch backends
/// through configuration alone.
pub struct Storage {
    default: String,
    devices: HashMap<String, Arc<dyn StorageDriver>>,
}

impl Storage {
    /// Create a registry.
    ///
    /// # Preconditions
    /// - `default` must be one of the device keys
    ///
    /// # Errors
    /// - `Configuration` if the default device is not registered
    pub fn new(
        default: impl Into<String>,
        devices: HashMap<String, Arc<dyn StorageDriver>>,
    ) -> Result<Self> {
        let default = default.into();
        if !devices.contains_key(&default) {
            return Err(Error::Configuration(format!(
                "Default device '{}' is not configured",
                default
            )));
        }
        Ok(Self { default, devices })
    }

    /// Get a named device.
    ///
    /// # Errors
    /// - `NotFound` if no device is registered under `key`
    pub fn device(&self, key: &str) -> Result<&Arc<dyn StorageDriver>> {
        self.devices
            .get(key)
            .ok_or_else(|| Error::NotFound(format!("Device '{}' is not configured", key)))
    }

    /// Key of the default device.
    pub fn storage_key(&self) -> &str {
        &self.default
    }

    /// Keys of all registered devices.
    pub fn devices(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Check if a device is registered.
    pub fn has_device(&self, key: &str) -> bool {
        self.devices.contains_key(key)
    }

    /// The default device's driver.
    pub fn default_device(&self) -> &Arc<dyn StorageDriver> {
        &self.devices[&self.default]
    }

    /// Check a signed URL issued by the default device.
    ///
    /// `false` when the default device does not sign its own URLs.
    pub fn validate_signed_url(&self, url: &str, path: &StoragePath) -> bool {
        self.as_local()
            .is_some_and(|local| local.validate_signed_url(url, path))
    }

    /// Total size of a directory on the default device.
    ///
    /// # Errors
    /// - `InvalidInput` if the default device is not a local filesystem
    pub async fn directory_size(&self, path: &StoragePath) -> Result<u64> {
        match self.as_local() {
            Some(local) => local.directory_size(path).await,
            None => Err(Error::InvalidInput(format!(
                "Directory sizes are not supported by the {} driver",
                self.name()
            ))),
        }
    }
}

#[async_trait]
impl StorageDriver for Storage {
    fn name(&self) -> &str {
        self.default_device().name()
    }

    async fn upload(&self, source: &Path, path: &StoragePath, metadata: &Metadata) -> Result<()> {
        self.default_device().upload(source, path, metadata).await
    }

    async fn write(
        &self,
        content: &[u8],
        path: &StoragePath,
        content_type: &str,
        metadata: &Metadata,
    ) -> Result<()> {
        self.default_device()
            .write(content, path, content_type, metadata)
            .await
    }

    async fn exists(&self, path: &StoragePath) -> bool {
        self.default_device().exists(path).await
    }

    async fn download(&self, path: &StoragePath) -> Result<Vec<u8>> {
        self.default_device().download(path).await
    }

    async fn download_resource(&self, path: &StoragePath) -> Result<ByteReader> {
        self.default_device().download_resource(path).await
    }

    async fn download_chunk(&self, path: &StoragePath) -> Result<ByteStream> {
        self.default_device().download_chunk(path).await
    }

    fn url(&self, path: &StoragePath) -> String {
        self.default_device().url(path)
    }

    async fn presigned_url(
        &self,
        path: &StoragePath,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        self.default_device().presigned_url(path, expires_at).await
    }

    async fn delete(&self, path: &StoragePath) -> Result<bool> {
        self.default_device().delete(path).await
    }

    async fn size(&self, path: &StoragePath) -> Result<u64> {
        self.default_device().size(path).await
    }

    async fn mime_type(&self, path: &StoragePath) -> Result<String> {
        self.default_device().mime_type(path).await
    }

    async fn file_hash(&self, path: &StoragePath) -> Result<String> {
        self.default_device().file_hash(path).await
    }

    async fn move_to(&self, source: &StoragePath, target: &StoragePath) -> Result<()> {
        self.default_device().move_to(source, target).await
    }

    async fn copy(&self, source: &StoragePath, target: &StoragePath) -> Result<()> {
        self.default_device().copy(source, target).await
    }

    async fn delete_path(&self, path: &StoragePath) -> Result<bool> {
        self.default_device().delete_path(path).await
    }

    fn as_local(&self) -> Option<&LocalDriver> {
        self.default_device().as_local()
    }
}
