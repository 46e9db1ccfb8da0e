//! Per-root cache of ranked match sets, keyed by query.
//!
//! A cached set for `q` is the complete, uncapped result of `q` against one
//! index snapshot. Any path matching a longer query `q + s` also matches `q`,
//! so refining a query only needs to re-score the cached set for `q`.

use std::sync::Arc;

use pathscout_utils_cache::LruCache;

use crate::result::Match;
use crate::scorer::PreparedQuery;

/// LRU cache of query results for one workspace index.
#[derive(Debug)]
pub struct QueryCache {
    entries: LruCache<String, Arc<Vec<Match>>>,
    generation: u64,
    hits: u64,
    misses: u64,
    narrows: u64,
}

impl QueryCache {
    /// Creates a cache holding at most `capacity` queries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            generation: 0,
            hits: 0,
            misses: 0,
            narrows: 0,
        }
    }

    /// Binds the cache to an index generation, clearing it if it held results
    /// for a different snapshot. Returns whether it was cleared.
    pub fn sync(&mut self, generation: u64) -> bool {
        if self.generation == generation {
            return false;
        }
        self.generation = generation;
        let stale = !self.entries.is_empty();
        self.entries.clear();
        stale
    }

    /// The index generation the cached results belong to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Exact lookup.
    pub fn get(&mut self, query: &str) -> Option<Arc<Vec<Match>>> {
        match self.entries.get(query) {
            Some(matches) => {
                self.hits += 1;
                Some(Arc::clone(matches))
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores the full result set for `query`.
    pub fn put(&mut self, query: impl Into<String>, matches: Vec<Match>) -> Arc<Vec<Match>> {
        let matches = Arc::new(matches);
        self.entries.insert(query.into(), Arc::clone(&matches));
        matches
    }

    /// Finds the cached result of the longest strict prefix of `query` that
    /// can seed narrowing.
    ///
    /// Prefixes without an alphanumeric character are skipped: such a query
    /// only matches literally, while a refinement may match through the
    /// symbol-stripped pass.
    pub fn longest_prefix(&mut self, query: &str) -> Option<Arc<Vec<Match>>> {
        let prefix = query
            .char_indices()
            .map(|(i, _)| &query[..i])
            .rev()
            .filter(|prefix| prefix.chars().any(char::is_alphanumeric))
            .find(|prefix| self.entries.contains_key(*prefix))?;

        self.narrows += 1;
        self.entries.get(prefix).cloned()
    }

    /// Re-scores a cached result set against a refined query.
    pub fn narrow(cached: &[Match], refined: &PreparedQuery) -> Vec<Match> {
        refined.rank_all(cached.iter().map(|m| m.path.as_str()))
    }

    /// Drops every cached result. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached queries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no query is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            narrows: self.narrows,
        }
    }
}

/// Query cache statistics, summed over roots by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCacheStats {
    /// Cached queries.
    pub entries: usize,
    /// Exact lookups answered from the cache.
    pub hits: u64,
    /// Exact lookups that found nothing.
    pub misses: u64,
    /// Lookups answered by narrowing a cached prefix.
    pub narrows: u64,
}

impl std::ops::AddAssign for QueryCacheStats {
    fn add_assign(&mut self, other: Self) {
        self.entries += other.entries;
        self.hits += other.hits;
        self.misses += other.misses;
        self.narrows += other.narrows;
    }
}
