//! Shared type definitions for MarkSeen
//!
//! These types cross the crate boundary between the core and the cache
//! layer, and (for the serde-enabled ones) map directly onto the persisted
//! camelCase record shape.

use serde::{Deserialize, Serialize};

/// Persisted-record schema version. A record carrying any other version is
/// treated as absent.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Metadata persisted alongside the filter and URL set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Schema compatibility marker.
    pub version: u32,
    /// Number of bookmarked URLs in the exact set.
    pub bookmark_count: u32,
    /// Milliseconds since the Unix epoch.
    pub last_updated: u64,
}

/// Per-URL answer for detailed membership queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlQueryDetail {
    /// The URL exactly as the caller passed it.
    pub original: String,
    /// Its canonical comparison key under the session policy.
    pub normalized: String,
    pub is_bookmarked: bool,
    /// First-seen stored form, when one is known for the normalized key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark_url: Option<String>,
}

/// Point-in-time view of the cache for status reporting.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub version: u32,
    pub bookmark_count: u32,
    pub last_updated: u64,
    /// True while a full rebuild or initialization is in flight.
    pub is_building: bool,
    pub approx_memory_bytes: u64,
}
