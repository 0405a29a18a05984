//! Common utilities and types shared across Depot crates.
//!
//! This module provides the error type and the logical storage path used by
//! every driver, so that call sites stay identical whichever backend serves
//! them.

pub mod error;
pub mod types;

pub use error::{DirectoryNotCreated, Error, Result};
pub use types::StoragePath;
