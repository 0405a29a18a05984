//! Device configuration and registry construction.
//!
//! Each driver kind has its own explicit settings; [`StorageConfig::build`]
//! matches on the kind and constructs the driver directly.
//!
//! ```json
//! {
//!   "default": "main",
//!   "devices": {
//!     "main":    { "driver": "local", "root": "/var/lib/app/files" },
//!     "archive": { "driver": "cloudflare", "accessKey": "..", "secretKey": "..",
//!                  "bucket": "archive", "endpoint": "https://<account>.r2.cloudflarestorage.com" }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::driver::StorageDriver;
use crate::local::LocalDriver;
use crate::registry::Storage;
use crate::s3::{S3Config, S3Driver, S3Flavor};
use crate::signing::{SigningKey, UrlSigner};
use depot_common::{Error, Result};

/// Settings for one device, tagged by driver kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "lowercase")]
pub enum DeviceConfig {
    /// Local filesystem directory.
    Local {
        /// Root directory.
        root: PathBuf,
    },
    /// Cloudflare R2 bucket.
    Cloudflare(S3Config),
    /// BackBlaze B2 bucket.
    BackBlaze(S3Config),
}

impl DeviceConfig {
    /// Driver kind name.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Cloudflare(_) => S3Flavor::Cloudflare.name(),
            Self::BackBlaze(_) => S3Flavor::BackBlaze.name(),
        }
    }

    /// Construct the driver for this device.
    ///
    /// # Errors
    /// - `Configuration` for missing credentials or settings
    /// - `Io` if a local root cannot be created
    pub fn build(&self, signing_key: &SigningKey) -> Result<Arc<dyn StorageDriver>> {
        Ok(match self {
            Self::Local { root } => Arc::new(LocalDriver::new(
                root,
                UrlSigner::new(signing_key.clone()),
            )?),
            Self::Cloudflare(config) => Arc::new(S3Driver::cloudflare(config.clone())?),
            Self::BackBlaze(config) => Arc::new(S3Driver::backblaze(config.clone())?),
        })
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key of the default device.
    pub default: String,
    /// Configured devices by key.
    pub devices: HashMap<String, DeviceConfig>,
}

impl StorageConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid storage configuration: {}", e)))
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Instantiate every device and assemble the registry.
    ///
    /// # Errors
    /// - `Configuration` if the default device is missing or any device is
    ///   misconfigured (the error names the device)
    pub fn build(&self, signing_key: &SigningKey) -> Result<Storage> {
        let mut devices = HashMap::with_capacity(self.devices.len());

        for (key, device) in &self.devices {
            let driver = device.build(signing_key).map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::Configuration(format!("Device '{}': {}", key, msg))
                }
                other => other,
            })?;
            info!("Registered {} device '{}'", device.driver_name(), key);
            devices.insert(key.clone(), driver);
        }

        Storage::new(self.default.clone(), devices)
    }
}
