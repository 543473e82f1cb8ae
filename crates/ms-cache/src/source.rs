//! Bookmark tree and settings collaborators
//!
//! The host platform supplies a hierarchical bookmark snapshot, change
//! notifications, and the normalization settings. Both sides are injected as
//! async traits so the cache composes against a browser bridge, a file
//! export, or fixtures alike.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;

use ms_core::NormalizationPolicy;

/// Error type for bookmark tree reads.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("bookmark tree unavailable: {0}")]
    Unavailable(String),
}

/// Error type for settings reads.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings unavailable: {0}")]
    Unavailable(String),
}

/// One node of the external bookmark tree. Folders carry children and no
/// URL; leaves carry a URL and no children.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkNode {
    pub title: Option<String>,
    pub url: Option<String>,
    pub children: Vec<BookmarkNode>,
}

impl BookmarkNode {
    /// A URL-bearing leaf.
    pub fn leaf(url: impl Into<String>) -> Self {
        Self {
            title: None,
            url: Some(url.into()),
            children: Vec::new(),
        }
    }

    /// A folder node.
    pub fn folder(title: impl Into<String>, children: Vec<BookmarkNode>) -> Self {
        Self {
            title: Some(title.into()),
            url: None,
            children,
        }
    }
}

/// Change notification from the bookmark store.
#[derive(Debug, Clone)]
pub enum BookmarkEvent {
    /// A bookmark with this URL was created.
    Created { url: String },
    /// A bookmark was removed.
    Removed,
    /// A bookmark's URL was edited.
    UrlChanged,
    /// A bookmark moved between folders; metadata-only, no URL-set impact.
    Moved,
}

/// Supplier of full bookmark-tree snapshots.
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<BookmarkNode>, SourceError>;
}

/// Supplier of the session normalization policy.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load_policy(&self) -> Result<NormalizationPolicy, SettingsError>;
}

/// Collect every URL in the tree, depth-first, preserving tree order.
pub fn collect_urls(nodes: &[BookmarkNode], out: &mut Vec<String>) {
    for node in nodes {
        if let Some(url) = &node.url {
            out.push(url.clone());
        }
        collect_urls(&node.children, out);
    }
}

// =============================================================================
// In-memory providers
// =============================================================================

/// In-memory bookmark tree; serves CLI one-shot runs and tests.
pub struct StaticBookmarks {
    nodes: Mutex<Vec<BookmarkNode>>,
}

impl StaticBookmarks {
    pub fn new(nodes: Vec<BookmarkNode>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    /// A flat tree of URL leaves.
    pub fn from_urls(urls: &[&str]) -> Self {
        Self::new(urls.iter().map(|url| BookmarkNode::leaf(*url)).collect())
    }

    /// Replace the tree, emulating external mutation of the store.
    pub fn replace(&self, nodes: Vec<BookmarkNode>) {
        *self.nodes.lock() = nodes;
    }
}

#[async_trait]
impl BookmarkSource for StaticBookmarks {
    async fn snapshot(&self) -> Result<Vec<BookmarkNode>, SourceError> {
        Ok(self.nodes.lock().clone())
    }
}

/// Fixed normalization settings.
pub struct StaticSettings {
    policy: Mutex<NormalizationPolicy>,
}

impl StaticSettings {
    pub fn new(policy: NormalizationPolicy) -> Self {
        Self {
            policy: Mutex::new(policy),
        }
    }

    /// Change the stored policy, emulating the user editing settings.
    pub fn set(&self, policy: NormalizationPolicy) {
        *self.policy.lock() = policy;
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn load_policy(&self) -> Result<NormalizationPolicy, SettingsError> {
        Ok(*self.policy.lock())
    }
}
