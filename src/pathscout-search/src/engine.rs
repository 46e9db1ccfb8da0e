//! The search engine: cached indexes, cached queries, and the notification
//! hooks that keep them current.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::index::{IndexStats, PathEntry, WorkspaceIndex};
use crate::pattern::{GlobRule, PathRule};
use crate::query_cache::{QueryCache, QueryCacheStats};
use crate::result::Match;
use crate::scorer::FuzzyScorer;
use crate::walker::{self, ScanOptions};
use crate::workspace::{CacheStats, FlushOutcome, WorkspaceCache};

/// Fuzzy path search over any number of workspace roots.
///
/// Cloning is cheap; clones share caches and configuration.
///
/// # Example
///
/// ```no_run
/// use pathscout_search::SearchEngine;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let engine = SearchEngine::default();
///     let matches = engine
///         .search("/path/to/project", "main.rs", &CancellationToken::new())
///         .await;
///     for m in matches {
///         println!("{:.2}: {}", m.score, m.path);
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SearchEngine {
    /// Current configuration; receivers observe updates.
    config: Arc<watch::Sender<SearchConfig>>,

    /// Index snapshots per root.
    workspaces: Arc<RwLock<WorkspaceCache>>,

    /// Query results per root. Lock after `workspaces` when holding both.
    queries: Arc<RwLock<HashMap<PathBuf, QueryCache>>>,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

impl SearchEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: SearchConfig) -> Self {
        let capacity = config.workspace_cache_capacity;
        let (sender, _) = watch::channel(config);
        Self {
            config: Arc::new(sender),
            workspaces: Arc::new(RwLock::new(WorkspaceCache::new(capacity))),
            queries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> SearchConfig {
        self.config.borrow().clone()
    }

    /// Observes configuration updates.
    pub fn subscribe_config(&self) -> watch::Receiver<SearchConfig> {
        self.config.subscribe()
    }

    /// Replaces the configuration. Any change drops every cached index and
    /// query result, since filtering and scoring may differ.
    pub async fn update_config(&self, config: SearchConfig) {
        if *self.config.borrow() == config {
            return;
        }
        let capacity = config.workspace_cache_capacity;
        self.config.send_replace(config);

        let mut workspaces = self.workspaces.write().await;
        workspaces.reset(capacity);
        self.queries.write().await.clear();
        tracing::info!("search configuration changed; caches cleared");
    }

    fn scan_options(&self, root: &Path) -> ScanOptions {
        ScanOptions::from_config(&self.config.borrow(), root)
    }

    /// Returns the indexed paths under `root`, building the index if needed.
    ///
    /// Failures are logged and yield an empty list.
    pub async fn build_index(&self, root: impl AsRef<Path>) -> Vec<PathEntry> {
        let root = root.as_ref();
        match self.try_build_index(root).await {
            Ok(index) => index.entries().to_vec(),
            Err(err) => {
                tracing::warn!(root = %root.display(), "failed to index workspace: {}", err);
                Vec::new()
            }
        }
    }

    /// Returns the index for `root`, building it if needed.
    pub async fn try_build_index(
        &self,
        root: impl AsRef<Path>,
    ) -> SearchResult<Arc<WorkspaceIndex>> {
        self.index_for(root.as_ref(), &CancellationToken::new()).await
    }

    async fn index_for(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> SearchResult<Arc<WorkspaceIndex>> {
        let ticket = {
            let mut workspaces = self.workspaces.write().await;
            if let Some(index) = workspaces.get(root) {
                return Ok(index);
            }
            workspaces.begin_build(root)
        };

        let options = self.scan_options(root);
        let started = Instant::now();
        let outcome = walker::scan(root, &options, cancel).await;

        let mut workspaces = self.workspaces.write().await;
        let outcome = match outcome {
            Ok(outcome) if !outcome.cancelled => outcome,
            Ok(_) => {
                workspaces.abandon_build(ticket);
                tracing::debug!(root = %root.display(), "index build cancelled");
                return Err(SearchError::Cancelled);
            }
            Err(err) => {
                workspaces.abandon_build(ticket);
                return Err(err);
            }
        };

        let truncated = outcome.truncated;
        let skipped_dirs = outcome.skipped_dirs;
        let installed = workspaces.finish_build(ticket, WorkspaceIndex::from_scan(root, outcome));
        tracing::info!(
            root = %root.display(),
            files = installed.index.len(),
            truncated,
            skipped_dirs,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built workspace index"
        );

        if let Some(evicted) = &installed.evicted {
            self.queries.write().await.remove(evicted);
        }
        if !installed.cached {
            return Ok(installed.index);
        }

        // Apply events that arrived during the walk and have settled since.
        let window = self.config.borrow().debounce();
        match workspaces.flush_if_quiet(root, Instant::now(), window, &options) {
            FlushOutcome::Merged(merged) => Ok(merged),
            _ => Ok(installed.index),
        }
    }

    /// Returns the best matches for `query` under `root`, ranked and capped
    /// at `max_results`.
    ///
    /// An empty query lists indexed paths in index order. A missing root, an
    /// I/O failure or a cancellation yields an empty or shorter list.
    pub async fn search(
        &self,
        root: impl AsRef<Path>,
        query: &str,
        cancel: &CancellationToken,
    ) -> Vec<Match> {
        let root = root.as_ref();
        match self.ranked(root, query, cancel).await {
            Ok(matches) => matches,
            Err(SearchError::Cancelled) => Vec::new(),
            Err(err) if err.is_root_missing() => {
                tracing::debug!(root = %root.display(), "search root is missing: {}", err);
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(root = %root.display(), "search failed: {}", err);
                Vec::new()
            }
        }
    }

    async fn ranked(
        &self,
        root: &Path,
        query: &str,
        cancel: &CancellationToken,
    ) -> SearchResult<Vec<Match>> {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        self.flush_if_quiet(root).await;

        let index = self.index_for(root, cancel).await?;
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let config = self.config();
        if query.is_empty() {
            return Ok(index
                .entries()
                .iter()
                .take(config.max_results)
                .map(Match::unscored)
                .collect());
        }

        let matches = self.matches_for(&index, query, &config).await;
        Ok(matches.iter().take(config.max_results).cloned().collect())
    }

    /// Every match for a non-empty query, from the query cache when possible.
    async fn matches_for(
        &self,
        index: &WorkspaceIndex,
        query: &str,
        config: &SearchConfig,
    ) -> Arc<Vec<Match>> {
        let seed = {
            let mut queries = self.queries.write().await;
            let cache = queries
                .entry(index.root().to_path_buf())
                .or_insert_with(|| QueryCache::new(config.query_cache_capacity));
            cache.sync(index.generation());
            if let Some(hit) = cache.get(query) {
                return hit;
            }
            cache.longest_prefix(query)
        };

        let prepared = FuzzyScorer::new(config.case_insensitive).prepare(query);
        let matches = match seed {
            Some(seed) => QueryCache::narrow(&seed, &prepared),
            None => prepared.rank_all(index.entries().iter().map(String::as_str)),
        };

        let mut queries = self.queries.write().await;
        match queries.get_mut(index.root()) {
            Some(cache) if cache.generation() == index.generation() => cache.put(query, matches),
            _ => Arc::new(matches),
        }
    }

    /// Streams the results of [`SearchEngine::search`] in ranked batches of
    /// `stream_batch_size`.
    ///
    /// Cancelling the token stops the stream before its next batch.
    pub fn search_streaming(
        &self,
        root: impl Into<PathBuf>,
        query: impl Into<String>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Vec<Match>> + Send + 'static {
        let engine = self.clone();
        let root = root.into();
        let query = query.into();

        async_stream::stream! {
            let matches = engine.search(&root, &query, &cancel).await;
            let batch_size = engine.config.borrow().stream_batch_size.max(1);
            for batch in matches.chunks(batch_size) {
                if cancel.is_cancelled() {
                    break;
                }
                yield batch.to_vec();
                tokio::task::yield_now().await;
            }
        }
    }

    /// Returns indexed paths matching a glob, in index order.
    ///
    /// An invalid pattern degrades to substring matching.
    pub async fn glob(&self, root: impl AsRef<Path>, pattern: &str, limit: usize) -> Vec<Match> {
        let root = root.as_ref();
        let index = match self.try_build_index(root).await {
            Ok(index) => index,
            Err(err) => {
                tracing::warn!(root = %root.display(), "glob failed: {}", err);
                return Vec::new();
            }
        };

        let rule = GlobRule::new(pattern);
        index
            .entries()
            .iter()
            .filter(|entry| rule.matches(entry, false))
            .take(limit)
            .map(Match::unscored)
            .collect()
    }

    /// Records a created file. `path` may be absolute under `root` or
    /// relative to it.
    ///
    /// Creating a `.gitignore` or manifest invalidates the root; other files
    /// are merged once the root has been quiet for the debounce window.
    pub async fn notify_file_created(&self, root: impl AsRef<Path>, path: impl AsRef<Path>) {
        let root = root.as_ref();
        let Some(entry) = relative_entry(root, path.as_ref()) else {
            return;
        };
        if is_structural(&entry) {
            self.invalidate(root).await;
            return;
        }

        let opened = self
            .workspaces
            .write()
            .await
            .apply_create(root, entry, Instant::now());
        if opened {
            self.schedule_flush(root);
        }
    }

    /// Records a deleted file or directory. See
    /// [`SearchEngine::notify_file_created`].
    pub async fn notify_file_deleted(&self, root: impl AsRef<Path>, path: impl AsRef<Path>) {
        let root = root.as_ref();
        let Some(entry) = relative_entry(root, path.as_ref()) else {
            return;
        };
        if is_structural(&entry) {
            self.invalidate(root).await;
            return;
        }

        let opened = self
            .workspaces
            .write()
            .await
            .apply_delete(root, entry, Instant::now());
        if opened {
            self.schedule_flush(root);
        }
    }

    /// Records a modified file. Only `.gitignore` and manifest changes
    /// matter; they invalidate the root.
    pub async fn notify_file_changed(&self, root: impl AsRef<Path>, path: impl AsRef<Path>) {
        let root = root.as_ref();
        if relative_entry(root, path.as_ref()).is_some_and(|entry| is_structural(&entry)) {
            self.invalidate(root).await;
        }
    }

    /// Spawns the task that merges a newly opened batch of events once the
    /// root goes quiet. One task serves the whole batch; later events only
    /// move its deadline.
    fn schedule_flush(&self, root: &Path) {
        let engine = self.clone();
        let root = root.to_path_buf();

        tokio::spawn(async move {
            loop {
                let window = engine.config.borrow().debounce();
                let Some(deadline) = engine
                    .workspaces
                    .read()
                    .await
                    .pending_deadline(&root, window)
                else {
                    break;
                };
                tokio::time::sleep_until(deadline.into()).await;

                match engine.flush_if_quiet(&root).await {
                    // Not quiet yet: the next pass sleeps until the new deadline.
                    FlushOutcome::Idle => {}
                    // A build holds the events back; wait for it to land.
                    FlushOutcome::Deferred => tokio::time::sleep(window).await,
                    _ => break,
                }
            }
        });
    }

    async fn flush_if_quiet(&self, root: &Path) -> FlushOutcome {
        let window = self.config.borrow().debounce();
        let options = self.scan_options(root);
        let outcome = self
            .workspaces
            .write()
            .await
            .flush_if_quiet(root, Instant::now(), window, &options);
        self.sync_queries(root, &outcome).await;
        outcome
    }

    /// Merges every pending event for `root` now, ignoring the debounce
    /// window.
    pub async fn flush_pending(&self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        let options = self.scan_options(root);
        let outcome = self.workspaces.write().await.flush(root, &options);
        self.sync_queries(root, &outcome).await;
    }

    /// Merges every pending event for every root now.
    pub async fn flush_all_pending(&self) {
        let roots = self.workspaces.read().await.pending_roots();
        for root in roots {
            self.flush_pending(&root).await;
        }
    }

    async fn sync_queries(&self, root: &Path, outcome: &FlushOutcome) {
        if let FlushOutcome::Merged(index) = outcome
            && let Some(cache) = self.queries.write().await.get_mut(root)
        {
            cache.sync(index.generation());
        }
    }

    /// Drops the cached index, pending events and query results for `root`.
    pub async fn invalidate(&self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        let mut workspaces = self.workspaces.write().await;
        let had_index = workspaces.invalidate(root);
        self.queries.write().await.remove(root);
        tracing::debug!(root = %root.display(), had_index, "workspace invalidated");
    }

    /// Drops every cached index and query result.
    pub async fn invalidate_all(&self) {
        let mut workspaces = self.workspaces.write().await;
        workspaces.clear();
        self.queries.write().await.clear();
        tracing::debug!("all workspaces invalidated");
    }

    /// Returns cache statistics.
    pub async fn stats(&self) -> EngineStats {
        let (workspaces, indexes) = {
            let workspaces = self.workspaces.read().await;
            let indexes = workspaces
                .snapshots()
                .iter()
                .map(|index| (index.root().to_path_buf(), index.stats()))
                .collect();
            (workspaces.stats(), indexes)
        };
        let mut queries = QueryCacheStats::default();
        for cache in self.queries.read().await.values() {
            queries += cache.stats();
        }
        EngineStats {
            workspaces,
            indexes,
            queries,
        }
    }
}

/// Cache statistics for a [`SearchEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    /// Workspace index cache counters.
    pub workspaces: CacheStats,
    /// Contents of each cached index, least recently used root first.
    pub indexes: Vec<(PathBuf, IndexStats)>,
    /// Summed over all roots.
    pub queries: QueryCacheStats,
}

/// Normalizes a notified path to an index entry. Returns `None` for paths
/// outside `root` or naming the root itself.
fn relative_entry(root: &Path, path: &Path) -> Option<PathEntry> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root).ok()?
    } else {
        path
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

fn is_structural(entry: &str) -> bool {
    let name = entry.rsplit('/').next().unwrap_or(entry);
    SearchConfig::is_structural_file(name)
}
