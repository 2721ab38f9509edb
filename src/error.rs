//! Error types for the radio link core.
//!
//! Only connection failures and discovery collisions are surfaced to
//! callers as explicit failures. Transport and capture-sink errors are
//! normally contained (and logged) at the component that hit them, but
//! they still get a variant here so that lower layers can use `?`.
//! Attribute decode errors never leave the record being populated.

use smol_str::SmolStr;
use thiserror::Error;
use tokio::{runtime::TryCurrentError, task::JoinError};

use crate::radio::RadioError;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum LinkError {
   #[error("Connection to {url} failed: {source}")]
   Connect { url: SmolStr, source: RadioError },

   #[error("Transport error: {0}")]
   Transport(#[from] RadioError),

   #[error("{0} already in progress")]
   AlreadyInProgress(&'static str),

   #[error("Capture sink error: {0}")]
   Sink(std::io::Error),

   #[error("Unsupported connection scheme: {0}")]
   UnsupportedScheme(SmolStr),

   #[error("Invalid connection URL: {0}")]
   InvalidUrl(String),

   #[error("Invalid radio address: {0}")]
   InvalidAddress(SmolStr),

   #[error("No async runtime available: {0}")]
   NoRuntime(#[from] TryCurrentError),

   #[error("Worker panicked: {0}")]
   WorkerPanicked(JoinError),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `LinkError`.
pub type Result<T> = std::result::Result<T, LinkError>;
