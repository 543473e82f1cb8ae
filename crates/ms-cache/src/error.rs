//! Cache error taxonomy
//!
//! Provider failures collapse into these categories at the manager boundary;
//! callers never see raw store or source errors.

use thiserror::Error;

use ms_core::FilterError;

use crate::source::{SettingsError, SourceError};
use crate::store::StoreError;

/// Error type exposed by the cache manager.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storage or tree read failed; recovery is rebuild-from-source on the
    /// next access, never a silently empty cache.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),
    /// The persistence area refused the write. Surfaced distinctly so the
    /// caller can warn the user; the prior persisted record is untouched.
    #[error("storage quota exceeded")]
    QuotaExceeded,
    /// Schema mismatch, missing fields or stale timestamp. Treated the same
    /// as "no cache": a full rebuild, not a caller-visible failure, except
    /// where an operator asked for the operation explicitly.
    #[error("corrupt cache record: {0}")]
    CorruptRecord(String),
    /// The normalization policy could not be read; nothing may normalize
    /// without it.
    #[error("settings unavailable: {0}")]
    Settings(String),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded => Self::QuotaExceeded,
            StoreError::Backend(msg) => Self::TransientIo(msg),
        }
    }
}

impl From<SourceError> for CacheError {
    fn from(err: SourceError) -> Self {
        Self::TransientIo(err.to_string())
    }
}

impl From<SettingsError> for CacheError {
    fn from(err: SettingsError) -> Self {
        Self::Settings(err.to_string())
    }
}

impl From<FilterError> for CacheError {
    fn from(err: FilterError) -> Self {
        Self::CorruptRecord(err.to_string())
    }
}
