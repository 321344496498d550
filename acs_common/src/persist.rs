//! `AppConfig` persistence blob.
//!
//! The blob is the bincode encoding of [`AppConfig`] (fixed-width integers,
//! little endian), so its size is independent of the stored values. A blob
//! is accepted only when `{magic, version, size}` match this build exactly;
//! anything else is rejected and the caller falls back to defaults.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::endpoint::{AppConfig, ConfigHeader};

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Storage read/write failed.
    #[error("config storage I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Blob could not be encoded or decoded.
    #[error("config blob codec: {0}")]
    Codec(String),

    /// Blob header does not match this build.
    #[error("config header mismatch: found {found:?}, expected {expected:?}")]
    HeaderMismatch {
        /// Header read from storage.
        found: ConfigHeader,
        /// Header this build accepts.
        expected: ConfigHeader,
    },
}

/// Encoded size of an `AppConfig` blob [bytes].
pub fn blob_size() -> u16 {
    bincode::serialized_size(&AppConfig::blank())
        .ok()
        .and_then(|n| u16::try_from(n).ok())
        .unwrap_or(u16::MAX)
}

/// Encode a configuration, stamping the current header.
pub fn encode(config: &AppConfig) -> Result<Vec<u8>, PersistError> {
    let mut stamped = config.clone();
    stamped.header = ConfigHeader::current();
    bincode::serialize(&stamped).map_err(|e| PersistError::Codec(e.to_string()))
}

/// Decode a blob, accepting it only when the header matches exactly.
pub fn decode(bytes: &[u8]) -> Result<AppConfig, PersistError> {
    let expected = ConfigHeader::current();
    let config: AppConfig =
        bincode::deserialize(bytes).map_err(|e| PersistError::Codec(e.to_string()))?;
    if config.header != expected || bytes.len() != expected.size as usize {
        return Err(PersistError::HeaderMismatch {
            found: config.header,
            expected,
        });
    }
    Ok(config)
}

/// File-backed configuration store (EEPROM image).
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store over the given blob path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Blob location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and verify the stored configuration.
    pub fn load(&self) -> Result<AppConfig, PersistError> {
        let bytes = std::fs::read(&self.path)?;
        decode(&bytes)
    }

    /// Persist a configuration.
    pub fn save(&self, config: &AppConfig) -> Result<(), PersistError> {
        let bytes = encode(config)?;
        std::fs::write(&self.path, &bytes)?;
        info!("CFG: saved {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    /// Load the stored configuration, substituting factory defaults when the
    /// blob is missing or rejected.
    pub fn load_or_default(&self) -> AppConfig {
        match self.load() {
            Ok(config) => {
                info!("CFG: loaded {}", self.path.display());
                config
            }
            Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("CFG: no stored config at {}, using defaults", self.path.display());
                AppConfig::default()
            }
            Err(e) => {
                warn!("CFG: {e}; using defaults");
                AppConfig::default()
            }
        }
    }
}
