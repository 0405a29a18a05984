//! Storage driver abstraction for Depot.
//!
//! This module provides a trait-based interface over interchangeable storage
//! backends (local filesystem, Cloudflare R2, BackBlaze B2) and a device
//! registry that forwards unqualified calls to a default device.
//!
//! # Design Principles
//! - Backend isolation: call sites depend on [`StorageDriver`] only
//! - Async operations: every I/O call is awaited to completion
//! - Streaming support: large files can be read as streams
//! - Unified error semantics: consistent error kinds across drivers
//! - Signed URLs: local files get HMAC-signed temporary URLs

pub mod config;
pub mod driver;
pub mod local;
pub mod registry;
pub mod s3;
pub mod signing;

pub use config::{DeviceConfig, StorageConfig};
pub use driver::{ByteReader, ByteStream, Metadata, StorageDriver};
pub use local::LocalDriver;
pub use registry::Storage;
pub use s3::{S3Config, S3Driver, S3Flavor};
pub use signing::{SignedToken, SigningKey, UrlSigner};
