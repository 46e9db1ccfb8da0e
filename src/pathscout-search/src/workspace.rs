//! Per-root cache of workspace indexes with debounced incremental updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pathscout_utils_cache::LruCache;

use crate::index::{PendingChanges, WorkspaceIndex};
use crate::walker::ScanOptions;

/// File events for one root, with the time of the most recent one.
#[derive(Debug)]
struct PendingEntry {
    changes: PendingChanges,
    last_event: Instant,
}

/// Builds in flight per root, shared with every outstanding ticket.
type Building = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// Proof that a build started at a given invalidation epoch.
///
/// A build whose root was invalidated while it ran is not cached. Dropping
/// the ticket releases the root, so a build future dropped mid-scan never
/// leaves the root marked as building.
#[derive(Debug)]
#[must_use = "a started build must be finished or abandoned"]
pub struct BuildTicket {
    root: PathBuf,
    root_epoch: u64,
    global_epoch: u64,
    building: Building,
}

impl BuildTicket {
    /// Root the build was started for.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for BuildTicket {
    fn drop(&mut self) {
        let mut building = self.building.lock();
        if let Some(count) = building.get_mut(&self.root) {
            *count -= 1;
            if *count == 0 {
                building.remove(&self.root);
            }
        }
    }
}

/// Result of installing a freshly built index.
#[derive(Debug)]
pub struct Installed {
    /// The built snapshot, usable by the caller whether or not it was cached.
    pub index: Arc<WorkspaceIndex>,

    /// Whether the snapshot was stored.
    pub cached: bool,

    /// Root pushed out of the cache to make room, if any.
    pub evicted: Option<PathBuf>,
}

/// What a flush did with a root's pending events.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Idle,

    /// A build is in flight; the events stay pending.
    Deferred,

    /// No index is cached for the root; the events were dropped.
    Discarded,

    /// Every event was a no-op against the cached index.
    Unchanged,

    /// A new snapshot replaced the cached one.
    Merged(Arc<WorkspaceIndex>),
}

/// LRU cache of workspace indexes keyed by root.
#[derive(Debug)]
pub struct WorkspaceCache {
    /// Cached snapshots.
    indexes: LruCache<PathBuf, Arc<WorkspaceIndex>>,

    /// Leaf events waiting for their debounce window.
    pending: HashMap<PathBuf, PendingEntry>,

    /// Number of builds in flight per root.
    building: Building,

    /// Per-root invalidation counters.
    epochs: HashMap<PathBuf, u64>,

    /// Bumped by `clear`.
    global_epoch: u64,

    hits: u64,
    misses: u64,
    merges: u64,
}

impl WorkspaceCache {
    /// Creates a cache holding at most `capacity` roots.
    pub fn new(capacity: usize) -> Self {
        Self {
            indexes: LruCache::new(capacity),
            pending: HashMap::new(),
            building: Arc::default(),
            epochs: HashMap::new(),
            global_epoch: 0,
            hits: 0,
            misses: 0,
            merges: 0,
        }
    }

    /// Looks up the index for `root`, marking it most recently used.
    pub fn get(&mut self, root: &Path) -> Option<Arc<WorkspaceIndex>> {
        match self.indexes.get(root) {
            Some(index) => {
                self.hits += 1;
                Some(Arc::clone(index))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Looks up the index for `root` without touching recency or stats.
    pub fn peek(&self, root: &Path) -> Option<Arc<WorkspaceIndex>> {
        self.indexes.peek(root).cloned()
    }

    /// Stores an index, returning the root evicted to make room.
    pub fn insert(&mut self, index: Arc<WorkspaceIndex>) -> Option<PathBuf> {
        let root = index.root().to_path_buf();
        let (evicted, _) = self.indexes.insert(root, index)?;
        self.pending.remove(&evicted);
        tracing::debug!(root = %evicted.display(), "evicted workspace index");
        Some(evicted)
    }

    /// Registers a build for `root`. Events arriving meanwhile are held.
    pub fn begin_build(&mut self, root: &Path) -> BuildTicket {
        *self.building.lock().entry(root.to_path_buf()).or_default() += 1;
        BuildTicket {
            root: root.to_path_buf(),
            root_epoch: self.epoch(root),
            global_epoch: self.global_epoch,
            building: Arc::clone(&self.building),
        }
    }

    /// Completes a build, caching the index unless the root was invalidated
    /// after the build started.
    pub fn finish_build(&mut self, ticket: BuildTicket, index: WorkspaceIndex) -> Installed {
        let index = Arc::new(index);
        let current = ticket.global_epoch == self.global_epoch
            && ticket.root_epoch == self.epoch(&ticket.root);
        drop(ticket);
        if !current {
            tracing::debug!(
                root = %index.root().display(),
                "workspace invalidated during build; not caching"
            );
            return Installed {
                index,
                cached: false,
                evicted: None,
            };
        }

        let evicted = self.insert(Arc::clone(&index));
        Installed {
            index,
            cached: true,
            evicted,
        }
    }

    /// Releases a build that failed or was cancelled.
    pub fn abandon_build(&mut self, ticket: BuildTicket) {
        tracing::debug!(root = %ticket.root.display(), "build abandoned");
    }

    /// Whether a build is in flight for `root`.
    pub fn is_building(&self, root: &Path) -> bool {
        self.building.lock().contains_key(root)
    }

    fn epoch(&self, root: &Path) -> u64 {
        self.epochs.get(root).copied().unwrap_or(0)
    }

    /// Queues a created file for `root`.
    ///
    /// Returns `true` when this event opened a new pending batch for the
    /// root, i.e. when the caller should arrange a flush.
    pub fn apply_create(&mut self, root: &Path, path: String, now: Instant) -> bool {
        let (entry, opened) = self.pending_entry(root, now);
        entry.changes.create(path);
        opened
    }

    /// Queues a deleted file or directory for `root`.
    ///
    /// Returns `true` when this event opened a new pending batch.
    pub fn apply_delete(&mut self, root: &Path, path: String, now: Instant) -> bool {
        let (entry, opened) = self.pending_entry(root, now);
        entry.changes.delete(path);
        opened
    }

    fn pending_entry(&mut self, root: &Path, now: Instant) -> (&mut PendingEntry, bool) {
        let mut opened = false;
        let entry = self
            .pending
            .entry(root.to_path_buf())
            .or_insert_with(|| {
                opened = true;
                PendingEntry {
                    changes: PendingChanges::default(),
                    last_event: now,
                }
            });
        entry.last_event = now;
        (entry, opened)
    }

    /// When the pending batch for `root` becomes quiet, if one exists.
    pub fn pending_deadline(&self, root: &Path, window: Duration) -> Option<Instant> {
        self.pending.get(root).map(|entry| entry.last_event + window)
    }

    /// Number of events queued for `root`.
    pub fn pending_len(&self, root: &Path) -> usize {
        self.pending.get(root).map_or(0, |entry| entry.changes.len())
    }

    /// Whether `root` has pending events and none arrived within `window`
    /// before `now`.
    pub fn is_quiet(&self, root: &Path, now: Instant, window: Duration) -> bool {
        self.pending
            .get(root)
            .is_some_and(|entry| now.saturating_duration_since(entry.last_event) >= window)
    }

    /// Roots with pending events.
    pub fn pending_roots(&self) -> Vec<PathBuf> {
        self.pending.keys().cloned().collect()
    }

    /// Merges the pending events for `root` into its cached index.
    pub fn flush(&mut self, root: &Path, options: &ScanOptions) -> FlushOutcome {
        if !self.pending.contains_key(root) {
            return FlushOutcome::Idle;
        }
        if self.is_building(root) {
            return FlushOutcome::Deferred;
        }
        let Some(entry) = self.pending.remove(root) else {
            return FlushOutcome::Idle;
        };
        let Some(index) = self.indexes.peek(root).cloned() else {
            tracing::debug!(
                root = %root.display(),
                events = entry.changes.len(),
                "no cached index; dropping file events"
            );
            return FlushOutcome::Discarded;
        };

        match index.with_changes(&entry.changes, options) {
            Some(merged) => {
                let merged = Arc::new(merged);
                if let Some(slot) = self.indexes.get_mut(root) {
                    *slot = Arc::clone(&merged);
                }
                self.merges += 1;
                tracing::debug!(
                    root = %root.display(),
                    events = entry.changes.len(),
                    files = merged.len(),
                    "merged file events into workspace index"
                );
                FlushOutcome::Merged(merged)
            }
            None => FlushOutcome::Unchanged,
        }
    }

    /// Flushes `root` only if it has been quiet for `window`.
    pub fn flush_if_quiet(
        &mut self,
        root: &Path,
        now: Instant,
        window: Duration,
        options: &ScanOptions,
    ) -> FlushOutcome {
        if self.is_quiet(root, now, window) {
            self.flush(root, options)
        } else {
            FlushOutcome::Idle
        }
    }

    /// Drops the index and pending events for `root`.
    ///
    /// Returns whether an index was cached.
    pub fn invalidate(&mut self, root: &Path) -> bool {
        *self.epochs.entry(root.to_path_buf()).or_default() += 1;
        self.pending.remove(root);
        self.indexes.remove(root).is_some()
    }

    /// Drops every index and pending event.
    pub fn clear(&mut self) {
        self.global_epoch += 1;
        self.pending.clear();
        self.indexes.clear();
    }

    /// Clears the cache and changes its capacity.
    pub fn reset(&mut self, capacity: usize) {
        self.clear();
        if capacity != self.indexes.capacity() {
            self.indexes = LruCache::new(capacity);
        }
    }

    /// Cached roots, least recently used first.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.indexes.keys().cloned().collect()
    }

    /// Cached snapshots, least recently used first.
    pub fn snapshots(&self) -> Vec<Arc<WorkspaceIndex>> {
        self.indexes
            .keys()
            .filter_map(|root| self.indexes.peek(root).cloned())
            .collect()
    }

    /// Returns the number of cached indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Returns whether no index is cached.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.indexes.len(),
            pending_roots: self.pending.len(),
            hits: self.hits,
            misses: self.misses,
            merges: self.merges,
            hit_rate: if self.hits + self.misses > 0 {
                self.hits as f64 / (self.hits + self.misses) as f64
            } else {
                0.0
            },
        }
    }
}

/// Workspace cache statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of cached indexes.
    pub entries: usize,

    /// Roots with queued file events.
    pub pending_roots: usize,

    /// Lookups that found an index.
    pub hits: u64,

    /// Lookups that did not.
    pub misses: u64,

    /// Incremental merges applied.
    pub merges: u64,

    /// Hit rate (0.0 - 1.0).
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WINDOW: Duration = Duration::from_millis(500);

    fn index(root: &str, entries: &[&str]) -> WorkspaceIndex {
        WorkspaceIndex::from_entries(root, entries.iter().map(ToString::to_string).collect())
    }

    fn cached(root: &str, entries: &[&str]) -> WorkspaceCache {
        let mut cache = WorkspaceCache::new(4);
        cache.insert(Arc::new(index(root, entries)));
        cache
    }

    #[test]
    fn test_get_tracks_hits_and_misses() {
        let mut cache = cached("/a", &["x.rs"]);
        assert!(cache.get(Path::new("/a")).is_some());
        assert!(cache.get(Path::new("/b")).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_lru_eviction_drops_pending() {
        let mut cache = WorkspaceCache::new(2);
        cache.insert(Arc::new(index("/a", &[])));
        cache.insert(Arc::new(index("/b", &[])));
        cache.apply_create(Path::new("/a"), "new.rs".into(), Instant::now());

        let evicted = cache.insert(Arc::new(index("/c", &[])));
        assert_eq!(evicted, Some(PathBuf::from("/a")));
        assert_eq!(cache.pending_len(Path::new("/a")), 0);
        assert_eq!(cache.roots(), [PathBuf::from("/b"), PathBuf::from("/c")]);
    }

    #[test]
    fn test_burst_merges_once_after_quiet_window() {
        let root = Path::new("/a");
        let mut cache = cached("/a", &["x.rs"]);
        let options = ScanOptions::default();
        let start = Instant::now();

        cache.apply_create(root, "a.rs".into(), start);
        cache.apply_create(root, "b.rs".into(), start + Duration::from_millis(300));

        // The second event restarted the window.
        let early = start + Duration::from_millis(600);
        assert!(matches!(
            cache.flush_if_quiet(root, early, WINDOW, &options),
            FlushOutcome::Idle
        ));
        assert_eq!(cache.pending_len(root), 2);

        let late = start + Duration::from_millis(800);
        let FlushOutcome::Merged(merged) = cache.flush_if_quiet(root, late, WINDOW, &options)
        else {
            panic!("expected a merge");
        };
        assert_eq!(merged.entries(), ["x.rs", "a.rs", "b.rs"]);
        assert_eq!(cache.stats().merges, 1);
        assert_eq!(cache.pending_len(root), 0);
    }

    #[test]
    fn test_create_twice_equals_create_once() {
        let root = Path::new("/a");
        let options = ScanOptions::default();
        let now = Instant::now();

        let mut once = cached("/a", &["x.rs"]);
        once.apply_create(root, "a.txt".into(), now);
        once.flush(root, &options);

        let mut twice = cached("/a", &["x.rs"]);
        twice.apply_create(root, "a.txt".into(), now);
        twice.apply_create(root, "a.txt".into(), now);
        twice.flush(root, &options);

        assert_eq!(
            once.peek(root).unwrap().entries(),
            twice.peek(root).unwrap().entries()
        );
    }

    #[test]
    fn test_noop_events_keep_snapshot() {
        let root = Path::new("/a");
        let mut cache = cached("/a", &["x.rs"]);
        let before = cache.peek(root).unwrap().generation();

        cache.apply_delete(root, "missing.rs".into(), Instant::now());
        assert!(matches!(
            cache.flush(root, &ScanOptions::default()),
            FlushOutcome::Unchanged
        ));
        assert_eq!(cache.peek(root).unwrap().generation(), before);
    }

    #[test]
    fn test_events_without_index_are_discarded() {
        let root = Path::new("/a");
        let mut cache = WorkspaceCache::new(4);
        cache.apply_create(root, "a.rs".into(), Instant::now());
        assert!(matches!(
            cache.flush(root, &ScanOptions::default()),
            FlushOutcome::Discarded
        ));
        assert_eq!(cache.pending_len(root), 0);
    }

    #[test]
    fn test_events_during_build_are_held() {
        let root = Path::new("/a");
        let options = ScanOptions::default();
        let mut cache = WorkspaceCache::new(4);

        let ticket = cache.begin_build(root);
        cache.apply_create(root, "late.rs".into(), Instant::now());
        assert!(matches!(cache.flush(root, &options), FlushOutcome::Deferred));

        let installed = cache.finish_build(ticket, index("/a", &["x.rs"]));
        assert!(installed.cached);

        let FlushOutcome::Merged(merged) = cache.flush(root, &options) else {
            panic!("expected a merge");
        };
        assert_eq!(merged.entries(), ["x.rs", "late.rs"]);
    }

    #[test]
    fn test_build_invalidated_midway_is_not_cached() {
        let root = Path::new("/a");
        let mut cache = WorkspaceCache::new(4);

        let ticket = cache.begin_build(root);
        cache.invalidate(root);
        let installed = cache.finish_build(ticket, index("/a", &["x.rs"]));
        assert!(!installed.cached);
        assert_eq!(installed.index.len(), 1);
        assert!(cache.peek(root).is_none());
        assert!(!cache.is_building(root));

        let ticket = cache.begin_build(root);
        cache.clear();
        assert!(!cache.finish_build(ticket, index("/a", &[])).cached);
    }

    #[test]
    fn test_abandoned_build_releases_root() {
        let root = Path::new("/a");
        let mut cache = WorkspaceCache::new(4);
        let ticket = cache.begin_build(root);
        assert!(cache.is_building(root));
        cache.abandon_build(ticket);
        assert!(!cache.is_building(root));
    }

    #[test]
    fn test_dropped_ticket_releases_root() {
        let root = Path::new("/a");
        let options = ScanOptions::default();
        let mut cache = cached("/a", &["x.rs"]);

        let first = cache.begin_build(root);
        let second = cache.begin_build(root);
        assert_eq!(first.root(), root);
        cache.apply_create(root, "late.rs".into(), Instant::now());
        drop(first);
        assert!(cache.is_building(root));
        assert!(matches!(cache.flush(root, &options), FlushOutcome::Deferred));

        drop(second);
        assert!(!cache.is_building(root));
        assert!(matches!(cache.flush(root, &options), FlushOutcome::Merged(_)));
    }

    #[test]
    fn test_only_first_event_opens_a_batch() {
        let root = Path::new("/a");
        let mut cache = cached("/a", &["x.rs"]);
        let start = Instant::now();

        assert!(cache.apply_create(root, "a.rs".into(), start));
        assert!(!cache.apply_delete(root, "x.rs".into(), start));
        let later = start + Duration::from_millis(100);
        assert!(!cache.apply_create(root, "b.rs".into(), later));
        assert_eq!(cache.pending_deadline(root, WINDOW), Some(later + WINDOW));

        cache.flush(root, &ScanOptions::default());
        assert_eq!(cache.pending_deadline(root, WINDOW), None);
        assert!(cache.apply_create(root, "c.rs".into(), later));
    }

    #[test]
    fn test_snapshots_follow_recency() {
        let mut cache = WorkspaceCache::new(4);
        cache.insert(Arc::new(index("/a", &["x.rs"])));
        cache.insert(Arc::new(index("/b", &[])));
        cache.get(Path::new("/a"));

        let roots: Vec<PathBuf> = cache
            .snapshots()
            .iter()
            .map(|index| index.root().to_path_buf())
            .collect();
        assert_eq!(roots, [PathBuf::from("/b"), PathBuf::from("/a")]);
    }

    #[test]
    fn test_invalidate() {
        let root = Path::new("/a");
        let mut cache = cached("/a", &["x.rs"]);
        cache.apply_create(root, "y.rs".into(), Instant::now());

        assert!(cache.invalidate(root));
        assert!(!cache.invalidate(root));
        assert!(cache.is_empty());
        assert_eq!(cache.pending_len(root), 0);
    }
}
