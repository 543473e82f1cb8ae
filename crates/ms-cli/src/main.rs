//! MarkSeen CLI
//!
//! Operator tooling: build a persisted cache from a bookmark-tree JSON
//! export, inspect it, run membership queries against it, and debug the
//! normalizer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use clap::{Parser, Subcommand};

use ms_cache::{
    BookmarkNode, CacheConfig, CacheManager, CacheStoreAdapter, KeyValueStore, StaticBookmarks,
    StaticSettings, StoreError,
};
use ms_core::{normalize, MembershipFilter, NormalizationPolicy, PolicyConfig};

#[derive(Parser)]
#[command(name = "ms-cli")]
#[command(about = "MarkSeen bookmark membership cache tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a persisted cache from a bookmark-tree JSON export
    Build {
        /// Bookmark-tree JSON export (a node or an array of nodes)
        #[arg(short, long)]
        bookmarks: String,

        /// Cache directory
        #[arg(short, long, default_value = "cache")]
        cache: String,

        /// Normalization policy JSON file
        #[arg(short, long)]
        policy: Option<String>,
    },

    /// Query URLs against a persisted cache
    Check {
        /// Cache directory
        #[arg(short, long, default_value = "cache")]
        cache: String,

        /// Bookmark-tree JSON export (fallback when the record is stale)
        #[arg(short, long)]
        bookmarks: String,

        /// Normalization policy JSON file (must match the build policy)
        #[arg(short, long)]
        policy: Option<String>,

        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Dump cache record info
    Info {
        /// Cache directory
        #[arg(short, long, default_value = "cache")]
        cache: String,
    },

    /// Print normalized forms of URLs
    Normalize {
        /// Normalization policy JSON file
        #[arg(short, long)]
        policy: Option<String>,

        /// URLs to normalize
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build {
            bookmarks,
            cache,
            policy,
        } => cmd_build(&bookmarks, &cache, policy.as_deref()).await,
        Commands::Check {
            cache,
            bookmarks,
            policy,
            urls,
        } => cmd_check(&cache, &bookmarks, policy.as_deref(), &urls).await,
        Commands::Info { cache } => cmd_info(&cache).await,
        Commands::Normalize { policy, urls } => cmd_normalize(policy.as_deref(), &urls),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// =============================================================================
// Directory-backed store
// =============================================================================

/// Key-value store over a directory: one file per key.
struct DirStore {
    root: PathBuf,
}

impl DirStore {
    fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl KeyValueStore for DirStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.root.join(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        tokio::fs::write(self.root.join(key), value)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))
    }

    async fn bytes_in_use(&self) -> Result<u64, StoreError> {
        let mut total = 0u64;
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(StoreError::Backend(err.to_string())),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?
        {
            if let Ok(meta) = entry.metadata().await {
                total += meta.len();
            }
        }
        Ok(total)
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn cmd_build(bookmarks: &str, cache: &str, policy: Option<&str>) -> Result<(), String> {
    let policy = load_policy(policy)?;
    let nodes = load_tree(bookmarks)?;

    let start = Instant::now();
    let manager = CacheManager::new(
        Arc::new(StaticBookmarks::new(nodes)),
        Arc::new(DirStore::new(cache)),
        Arc::new(StaticSettings::new(policy)),
        CacheConfig::default(),
    );
    manager
        .full_rebuild()
        .await
        .map_err(|e| format!("build failed: {e}"))?;

    let status = manager.cache_status();
    let bytes = CacheStoreAdapter::new(Arc::new(DirStore::new(cache)))
        .bytes_in_use()
        .await
        .map_err(|e| e.to_string())?;

    println!("Built cache in '{cache}' from '{bookmarks}'");
    println!("  Bookmarks:  {}", status.bookmark_count);
    println!("  Memory:     ~{} bytes", status.approx_memory_bytes);
    println!("  On disk:    {} bytes ({:.1} KB)", bytes, bytes as f64 / 1024.0);
    println!("  Time:       {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}

async fn cmd_check(
    cache: &str,
    bookmarks: &str,
    policy: Option<&str>,
    urls: &[String],
) -> Result<(), String> {
    let policy = load_policy(policy)?;
    let nodes = load_tree(bookmarks)?;

    let manager = CacheManager::new(
        Arc::new(StaticBookmarks::new(nodes)),
        Arc::new(DirStore::new(cache)),
        Arc::new(StaticSettings::new(policy)),
        CacheConfig::default(),
    );

    let details = manager
        .query_urls_with_details(urls)
        .await
        .map_err(|e| format!("query failed: {e}"))?;

    for detail in &details {
        if detail.is_bookmarked {
            match &detail.bookmark_url {
                Some(stored) if *stored != detail.original => {
                    println!("{}  bookmarked (saved as {})", detail.original, stored);
                }
                _ => println!("{}  bookmarked", detail.original),
            }
        } else {
            println!("{}  not bookmarked", detail.original);
        }
    }

    let found = details.iter().filter(|d| d.is_bookmarked).count();
    println!();
    println!("{} of {} bookmarked", found, details.len());
    Ok(())
}

async fn cmd_info(cache: &str) -> Result<(), String> {
    let adapter = CacheStoreAdapter::new(Arc::new(DirStore::new(cache)));
    let record = adapter
        .load()
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no valid cache record in '{cache}'"))?;

    let filter = MembershipFilter::deserialize(&record.filter_bytes)
        .map_err(|e| format!("invalid filter in record: {e}"))?;
    let stats = filter.stats();

    println!("Cache: {cache}");
    println!("  Version:      {}", record.metadata.version);
    println!("  Bookmarks:    {}", record.metadata.bookmark_count);
    println!("  Updated:      {} (epoch ms)", record.metadata.last_updated);
    println!("  URLs stored:  {}", record.urls.len());
    println!();
    println!("Filter:");
    println!("  Bits:         {}", stats.bits);
    println!("  Hashes:       {}", stats.hashes);
    println!("  Items:        {}", stats.items);
    println!("  Size:         {} bytes ({:.1} KB)", stats.byte_size, stats.byte_size as f64 / 1024.0);
    println!("  Est. FP rate: {:.6}", stats.estimated_false_positive_rate);
    Ok(())
}

fn cmd_normalize(policy: Option<&str>, urls: &[String]) -> Result<(), String> {
    let policy = load_policy(policy)?;
    for url in urls {
        println!("{} -> {}", url, normalize(url, policy));
    }
    Ok(())
}

// =============================================================================
// Input loading
// =============================================================================

fn load_policy(path: Option<&str>) -> Result<NormalizationPolicy, String> {
    let path = match path {
        Some(path) => path,
        None => return Ok(NormalizationPolicy::empty()),
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read policy '{path}': {e}"))?;
    let config: PolicyConfig =
        serde_json::from_str(&content).map_err(|e| format!("invalid policy '{path}': {e}"))?;
    Ok(config.to_policy())
}

fn load_tree(path: &str) -> Result<Vec<BookmarkNode>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read bookmarks '{path}': {e}"))?;

    // Accept either an array of nodes or a single root node.
    if let Ok(nodes) = serde_json::from_str::<Vec<BookmarkNode>>(&content) {
        return Ok(nodes);
    }
    serde_json::from_str::<BookmarkNode>(&content)
        .map(|node| vec![node])
        .map_err(|e| {
            format!(
                "invalid bookmarks JSON in '{}': {e}",
                Path::new(path).display()
            )
        })
}
