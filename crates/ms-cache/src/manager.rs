//! Bookmark Cache Manager
//!
//! The orchestrator: owns the in-memory filter, exact-match set and
//! reverse-lookup map, rebuilds them from bookmark-tree snapshots, answers
//! membership queries, and applies incremental change events with debounced
//! persistence and debounced full rebuilds.
//!
//! Concurrency is cooperative interleaving on the async runtime. State locks
//! are held only for synchronous sections; tree reads and storage I/O happen
//! outside them. The `Initializing` phase plus the pending-additions queue
//! guard the one genuinely racy window: an "added" event arriving while the
//! in-memory state is about to be replaced wholesale.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use ms_core::{
    normalize, CacheMetadata, CacheStatus, MembershipFilter, NormalizationPolicy, UrlQueryDetail,
    CACHE_SCHEMA_VERSION,
};

use crate::error::CacheError;
use crate::source::{collect_urls, BookmarkEvent, BookmarkSource, SettingsSource};
use crate::store::{CacheStoreAdapter, KeyValueStore, LoadedCache};

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for the cache lifecycle.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Target false-positive rate for freshly built filters.
    pub false_positive_rate: f64,
    /// Fixed over-provision added to the bookmark count when sizing a filter,
    /// so incremental adds do not degrade it between rebuilds.
    pub filter_headroom: u32,
    /// Persisted records older than this are rebuilt instead of loaded.
    pub staleness_window: Duration,
    /// Quiet period before a burst of adds is persisted.
    pub save_debounce: Duration,
    /// Quiet period before removals/edits trigger a rebuild. Longer than the
    /// save debounce so a burst of changes never escalates into per-event
    /// rebuilds.
    pub rebuild_debounce: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            false_positive_rate: 0.001,
            filter_headroom: 10_000,
            staleness_window: Duration::from_secs(7 * 24 * 60 * 60),
            save_debounce: Duration::from_millis(500),
            rebuild_debounce: Duration::from_millis(2500),
        }
    }
}

// =============================================================================
// Internal state
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initializing,
    Ready,
}

/// The derived structures plus metadata. Always rebuilt together; the filter
/// is a superset-approximation of the exact set, and the reverse map covers
/// every key in it.
struct CacheState {
    phase: Phase,
    policy: NormalizationPolicy,
    filter: MembershipFilter,
    /// Authoritative membership truth; the filter is only a fast pre-check.
    exact: HashSet<String>,
    /// Normalized key to first-seen original URL.
    reverse: HashMap<String, String>,
    metadata: CacheMetadata,
    /// Raw URLs observed as "added" before the manager reached Ready,
    /// drained exactly once when initialization completes.
    pending_additions: VecDeque<String>,
}

struct Timers {
    save: Option<JoinHandle<()>>,
    rebuild: Option<JoinHandle<()>>,
    /// A pending rebuild supersedes saves: it persists as part of its own
    /// completion, so separate saves are skipped while this is set.
    rebuild_pending: bool,
}

struct ManagerInner {
    source: Arc<dyn BookmarkSource>,
    settings: Arc<dyn SettingsSource>,
    store: CacheStoreAdapter,
    config: CacheConfig,
    state: Mutex<CacheState>,
    timers: Mutex<Timers>,
    /// Serializes initialization; queries park here until Ready.
    init_lock: tokio::sync::Mutex<()>,
    /// Re-entrancy guard: a rebuild requested while one runs is dropped.
    rebuilding: AtomicBool,
}

// =============================================================================
// Manager
// =============================================================================

/// Handle to the bookmark membership cache.
///
/// Cheap to clone. Construct one at the composition root with its
/// collaborators injected and pass it by handle to consumers; there is no
/// hidden global instance.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<ManagerInner>,
}

impl CacheManager {
    pub fn new(
        source: Arc<dyn BookmarkSource>,
        store: Arc<dyn KeyValueStore>,
        settings: Arc<dyn SettingsSource>,
        config: CacheConfig,
    ) -> Self {
        let filter = MembershipFilter::new(0, config.false_positive_rate);
        Self {
            inner: Arc::new(ManagerInner {
                source,
                settings,
                store: CacheStoreAdapter::new(store),
                state: Mutex::new(CacheState {
                    phase: Phase::Uninitialized,
                    policy: NormalizationPolicy::empty(),
                    filter,
                    exact: HashSet::new(),
                    reverse: HashMap::new(),
                    metadata: CacheMetadata {
                        version: CACHE_SCHEMA_VERSION,
                        bookmark_count: 0,
                        last_updated: 0,
                    },
                    pending_additions: VecDeque::new(),
                }),
                timers: Mutex::new(Timers {
                    save: None,
                    rebuild: None,
                    rebuild_pending: false,
                }),
                init_lock: tokio::sync::Mutex::new(()),
                rebuilding: AtomicBool::new(false),
                config,
            }),
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Bring the cache to Ready: load the persisted record when it is valid
    /// and fresh, rebuild from the bookmark tree otherwise.
    ///
    /// Callers racing each other serialize on the init lock; losers find the
    /// cache Ready and return immediately. On failure the phase resets to
    /// Uninitialized and the next access re-attempts.
    pub async fn initialize(&self) -> Result<(), CacheError> {
        if self.inner.state.lock().phase == Phase::Ready {
            return Ok(());
        }
        let _guard = self.inner.init_lock.lock().await;
        if self.inner.state.lock().phase == Phase::Ready {
            return Ok(());
        }

        self.inner.state.lock().phase = Phase::Initializing;
        match self.initialize_inner().await {
            Ok(()) => {
                self.drain_pending_additions();
                Ok(())
            }
            Err(err) => {
                log::error!("cache initialization failed: {err}");
                self.inner.state.lock().phase = Phase::Uninitialized;
                Err(err)
            }
        }
    }

    async fn initialize_inner(&self) -> Result<(), CacheError> {
        // Policy first: nothing may normalize before it is known.
        let policy = self.inner.settings.load_policy().await?;
        self.inner.state.lock().policy = policy;

        let loaded = match self.inner.store.load().await {
            Ok(loaded) => loaded,
            Err(err) => {
                // Storage trouble is not an empty cache; rebuild from source.
                log::warn!("cache load failed, rebuilding from source: {err}");
                None
            }
        };

        if let Some(record) = loaded {
            match self.install_loaded(record, policy).await {
                Ok(()) => {
                    log::debug!("cache loaded from storage");
                    return Ok(());
                }
                Err(err) => {
                    log::warn!("persisted cache rejected, rebuilding: {err}");
                }
            }
        }

        self.rebuild_now(policy, true).await
    }

    /// Adopt a persisted record: version and age gates, filter
    /// deserialization, exact set from the record's URL list. The reverse
    /// map is derived and never persisted, so it is rebuilt from a fresh
    /// tree snapshot on every load.
    async fn install_loaded(
        &self,
        record: LoadedCache,
        policy: NormalizationPolicy,
    ) -> Result<(), CacheError> {
        if record.metadata.version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::CorruptRecord(format!(
                "schema version {} (expected {})",
                record.metadata.version, CACHE_SCHEMA_VERSION
            )));
        }
        let age_ms = now_ms().saturating_sub(record.metadata.last_updated);
        if age_ms > self.inner.config.staleness_window.as_millis() as u64 {
            return Err(CacheError::CorruptRecord(format!(
                "record is {age_ms} ms old"
            )));
        }

        let filter = MembershipFilter::deserialize(&record.filter_bytes)?;

        let nodes = self.inner.source.snapshot().await?;
        let mut raw_urls = Vec::new();
        collect_urls(&nodes, &mut raw_urls);
        let mut reverse = HashMap::with_capacity(raw_urls.len());
        for url in raw_urls {
            reverse.entry(normalize(&url, policy)).or_insert(url);
        }

        let mut state = self.inner.state.lock();
        state.filter = filter;
        state.exact = record.urls.into_iter().collect();
        state.reverse = reverse;
        state.metadata = record.metadata;
        state.phase = Phase::Ready;
        Ok(())
    }

    /// Replay the adds buffered while initialization was in flight.
    fn drain_pending_additions(&self) {
        loop {
            let url = match self.inner.state.lock().pending_additions.pop_front() {
                Some(url) => url,
                None => break,
            };
            self.incremental_add(&url);
        }
    }

    // =========================================================================
    // Rebuild
    // =========================================================================

    /// Operator-triggered full rebuild. Errors propagate to the caller.
    pub async fn full_rebuild(&self) -> Result<(), CacheError> {
        self.ensure_ready().await?;
        let policy = self.inner.state.lock().policy;
        self.rebuild_now(policy, false).await
    }

    /// Re-read the normalization policy and rebuild everything derived from
    /// it. Previously computed keys are not valid under a different policy,
    /// so there is no incremental migration path.
    pub async fn reload_settings(&self) -> Result<(), CacheError> {
        self.ensure_ready().await?;
        let policy = self.inner.settings.load_policy().await?;
        self.rebuild_now(policy, false).await
    }

    /// Walk the entire tree and replace all derived structures. The guard
    /// drops concurrent requests rather than queueing them.
    async fn rebuild_now(
        &self,
        policy: NormalizationPolicy,
        mark_ready: bool,
    ) -> Result<(), CacheError> {
        if self.inner.rebuilding.swap(true, Ordering::SeqCst) {
            log::debug!("rebuild already in flight, dropping request");
            return Ok(());
        }
        let result = self.rebuild_guarded(policy, mark_ready).await;
        self.inner.rebuilding.store(false, Ordering::SeqCst);
        result
    }

    async fn rebuild_guarded(
        &self,
        policy: NormalizationPolicy,
        mark_ready: bool,
    ) -> Result<(), CacheError> {
        let nodes = self.inner.source.snapshot().await?;
        let mut raw_urls = Vec::new();
        collect_urls(&nodes, &mut raw_urls);

        let mut exact = HashSet::with_capacity(raw_urls.len());
        let mut reverse = HashMap::with_capacity(raw_urls.len());
        for url in &raw_urls {
            let key = normalize(url, policy);
            if exact.insert(key.clone()) {
                // First-seen original wins on duplicate normalized keys.
                reverse.insert(key, url.clone());
            }
        }

        let count = exact.len() as u32;
        let mut filter = MembershipFilter::new(
            count + self.inner.config.filter_headroom,
            self.inner.config.false_positive_rate,
        );
        for key in &exact {
            filter.add(key);
        }

        let metadata = CacheMetadata {
            version: CACHE_SCHEMA_VERSION,
            bookmark_count: count,
            last_updated: now_ms(),
        };
        let filter_bytes = filter.serialize();
        let urls: Vec<String> = exact.iter().cloned().collect();

        // Queries observe either all-old or all-new, never a torn mix.
        {
            let mut state = self.inner.state.lock();
            state.policy = policy;
            state.filter = filter;
            state.exact = exact;
            state.reverse = reverse;
            state.metadata = metadata;
            if mark_ready {
                state.phase = Phase::Ready;
            }
        }

        // The rebuild persists on its own; a separately pending save is
        // redundant.
        self.cancel_pending_save();

        self.inner.store.save(&filter_bytes, urls, metadata).await?;
        log::debug!("full rebuild complete: {count} bookmarks");
        Ok(())
    }

    // =========================================================================
    // Change events
    // =========================================================================

    /// Apply a change notification from the bookmark store.
    pub async fn handle_event(&self, event: BookmarkEvent) {
        match event {
            BookmarkEvent::Created { url } => self.notify_created(url),
            // Filters do not support removal; removals and URL edits fall
            // back to a debounced rebuild from the authoritative tree.
            BookmarkEvent::Removed | BookmarkEvent::UrlChanged => self.schedule_rebuild(),
            BookmarkEvent::Moved => {}
        }
    }

    fn notify_created(&self, url: String) {
        {
            let mut state = self.inner.state.lock();
            if state.phase != Phase::Ready {
                // The in-memory state is about to be replaced wholesale; an
                // interleaved write here would be silently discarded.
                state.pending_additions.push_back(url);
                return;
            }
        }
        self.incremental_add(&url);
    }

    /// Cheap path for a single new bookmark: membership structures updated
    /// in place, persistence deferred to the save debounce.
    fn incremental_add(&self, url: &str) {
        {
            let mut state = self.inner.state.lock();
            let key = normalize(url, state.policy);
            if state.exact.contains(&key) {
                return;
            }
            state.exact.insert(key.clone());
            state
                .reverse
                .entry(key.clone())
                .or_insert_with(|| url.to_string());
            state.filter.add(&key);
            state.metadata.bookmark_count = state.exact.len() as u32;
            state.metadata.last_updated = now_ms();
        }
        self.schedule_save();
    }

    // =========================================================================
    // Debounce coordination
    // =========================================================================

    /// (Re)arm the save timer. Skipped outright while a rebuild is pending.
    fn schedule_save(&self) {
        let mut timers = self.inner.timers.lock();
        if timers.rebuild_pending {
            log::trace!("save skipped: rebuild pending");
            return;
        }
        if let Some(handle) = timers.save.take() {
            handle.abort();
        }
        let manager = self.clone();
        let delay = self.inner.config.save_debounce;
        timers.save = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = manager.persist_now().await {
                // Background failure: log it, the next save or rebuild
                // re-attempts persistence.
                log::warn!("debounced save failed: {err}");
            }
        }));
    }

    /// (Re)arm the rebuild timer and cancel any pending save.
    fn schedule_rebuild(&self) {
        let mut timers = self.inner.timers.lock();
        timers.rebuild_pending = true;
        if let Some(handle) = timers.save.take() {
            handle.abort();
        }
        if let Some(handle) = timers.rebuild.take() {
            handle.abort();
        }
        let manager = self.clone();
        let delay = self.inner.config.rebuild_debounce;
        timers.rebuild = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.inner.timers.lock().rebuild_pending = false;
            // Caller-transparent rebuild: failures go to the log only.
            if let Err(err) = manager.debounced_rebuild().await {
                log::warn!("debounced rebuild failed: {err}");
            }
        }));
    }

    fn cancel_pending_save(&self) {
        if let Some(handle) = self.inner.timers.lock().save.take() {
            handle.abort();
        }
    }

    async fn debounced_rebuild(&self) -> Result<(), CacheError> {
        self.ensure_ready().await?;
        let policy = self.inner.state.lock().policy;
        self.rebuild_now(policy, false).await
    }

    /// Persist the current in-memory structures.
    async fn persist_now(&self) -> Result<(), CacheError> {
        let (filter_bytes, urls, metadata) = {
            let state = self.inner.state.lock();
            (
                state.filter.serialize(),
                state.exact.iter().cloned().collect::<Vec<_>>(),
                state.metadata,
            )
        };
        self.inner.store.save(&filter_bytes, urls, metadata).await?;
        log::trace!("debounced save complete: {} bookmarks", metadata.bookmark_count);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    async fn ensure_ready(&self) -> Result<(), CacheError> {
        self.initialize().await
    }

    /// The subset of `urls` that is bookmarked, in the caller's original
    /// form. A filter miss is definitive absence; a filter hit is confirmed
    /// against the exact set to rule out false positives.
    pub async fn query_urls(&self, urls: &[String]) -> Result<Vec<String>, CacheError> {
        self.ensure_ready().await?;
        let state = self.inner.state.lock();
        Ok(urls
            .iter()
            .filter(|url| {
                let key = normalize(url, state.policy);
                state.filter.contains(&key) && state.exact.contains(&key)
            })
            .cloned()
            .collect())
    }

    /// Per-URL membership details, including the first-seen stored form.
    pub async fn query_urls_with_details(
        &self,
        urls: &[String],
    ) -> Result<Vec<UrlQueryDetail>, CacheError> {
        self.ensure_ready().await?;
        let state = self.inner.state.lock();
        Ok(urls
            .iter()
            .map(|url| {
                let key = normalize(url, state.policy);
                let is_bookmarked = state.filter.contains(&key) && state.exact.contains(&key);
                UrlQueryDetail {
                    original: url.clone(),
                    bookmark_url: if is_bookmarked {
                        state.reverse.get(&key).cloned()
                    } else {
                        None
                    },
                    normalized: key,
                    is_bookmarked,
                }
            })
            .collect())
    }

    /// Current metadata plus build and memory introspection.
    pub fn cache_status(&self) -> CacheStatus {
        let state = self.inner.state.lock();
        let string_bytes: u64 = state.exact.iter().map(|s| s.len() as u64).sum::<u64>()
            + state
                .reverse
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum::<u64>();
        CacheStatus {
            version: state.metadata.version,
            bookmark_count: state.metadata.bookmark_count,
            last_updated: state.metadata.last_updated,
            is_building: state.phase == Phase::Initializing
                || self.inner.rebuilding.load(Ordering::SeqCst),
            approx_memory_bytes: state.filter.byte_size() as u64 + string_bytes,
        }
    }
}

/// Milliseconds since the Unix epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
