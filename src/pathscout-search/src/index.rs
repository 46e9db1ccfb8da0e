//! Immutable per-root file index snapshots.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use indexmap::IndexSet;

use crate::pattern::GitignoreFile;
use crate::walker::{ScanOptions, ScanOutcome};

/// A forward-slash separated file path relative to a workspace root.
pub type PathEntry = String;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Leaf file events waiting to be merged into an index.
///
/// The last event for a path wins: creating then deleting a path leaves only
/// the deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    created: IndexSet<PathEntry>,
    deleted: HashSet<PathEntry>,
}

impl PendingChanges {
    /// Records a created file.
    pub fn create(&mut self, path: String) {
        self.deleted.remove(&path);
        self.created.insert(path);
    }

    /// Records a deleted file or directory.
    pub fn delete(&mut self, path: String) {
        self.created.shift_remove(&path);
        self.deleted.insert(path);
    }

    /// Created paths in arrival order.
    pub fn created(&self) -> &IndexSet<PathEntry> {
        &self.created
    }

    /// Deleted paths.
    pub fn deleted(&self) -> &HashSet<String> {
        &self.deleted
    }

    /// Number of distinct paths with a pending event.
    pub fn len(&self) -> usize {
        self.created.len() + self.deleted.len()
    }

    /// Whether no event is pending.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// A snapshot of the files under one workspace root.
///
/// Snapshots are never mutated once shared. Incremental updates produce a new
/// snapshot with a new generation number, which is how query caches detect
/// that their contents are stale.
#[derive(Debug, Clone)]
pub struct WorkspaceIndex {
    root: PathBuf,
    entries: Vec<PathEntry>,
    members: HashSet<PathEntry>,
    gitignores: Vec<GitignoreFile>,
    built_at: SystemTime,
    generation: u64,
    truncated: bool,
}

impl WorkspaceIndex {
    /// Creates an index from a completed scan.
    pub fn from_scan(root: impl Into<PathBuf>, outcome: ScanOutcome) -> Self {
        let mut index = Self::from_entries(root, outcome.entries);
        index.gitignores = outcome.gitignores;
        index.truncated = outcome.truncated;
        index
    }

    /// Creates an index from a list of relative paths, dropping duplicates.
    pub fn from_entries(root: impl Into<PathBuf>, entries: Vec<String>) -> Self {
        let mut members = HashSet::with_capacity(entries.len());
        let entries: Vec<String> = entries
            .into_iter()
            .filter(|entry| members.insert(entry.clone()))
            .collect();

        Self {
            root: root.into(),
            entries,
            members,
            gitignores: Vec::new(),
            built_at: SystemTime::now(),
            generation: next_generation(),
            truncated: false,
        }
    }

    /// Returns the root directory of this index.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths in index order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Returns the number of indexed files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `path` is an indexed file.
    pub fn contains(&self, path: &str) -> bool {
        self.members.contains(path)
    }

    /// When the underlying scan finished.
    pub fn built_at(&self) -> SystemTime {
        self.built_at
    }

    /// Identity of this snapshot. Changes on every rebuild or merge.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the scan stopped at the entry budget.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// `.gitignore` files read during the scan, used to filter created files.
    pub fn gitignores(&self) -> &[GitignoreFile] {
        &self.gitignores
    }

    /// Produces a new snapshot with `changes` applied, or `None` when nothing
    /// would change.
    ///
    /// Deleting an absent path is a no-op; deleting a directory removes every
    /// entry below it. Creating a present path is a no-op. Created paths that
    /// the walk would have filtered out, or that exceed the entry budget, are
    /// skipped.
    pub fn with_changes(&self, changes: &PendingChanges, options: &ScanOptions) -> Option<Self> {
        let deleted = changes.deleted();
        let is_deleted = |entry: &str| {
            deleted.contains(entry)
                || entry
                    .match_indices('/')
                    .any(|(end, _)| deleted.contains(&entry[..end]))
        };

        let mut entries: Vec<String> = if deleted.is_empty() {
            self.entries.clone()
        } else {
            self.entries
                .iter()
                .filter(|entry| !is_deleted(entry))
                .cloned()
                .collect()
        };
        let mut members: HashSet<String> = if entries.len() == self.entries.len() {
            self.members.clone()
        } else {
            entries.iter().cloned().collect()
        };
        let removed = self.entries.len() - entries.len();

        let mut added = 0;
        for path in changes.created() {
            if entries.len() >= options.max_entries {
                tracing::debug!(path = %path, "entry budget reached; not indexing created file");
                break;
            }
            if members.contains(path) || !options.admits_path(path, &self.gitignores) {
                continue;
            }
            members.insert(path.clone());
            entries.push(path.clone());
            added += 1;
        }

        if removed == 0 && added == 0 {
            return None;
        }

        Some(Self {
            root: self.root.clone(),
            entries,
            members,
            gitignores: self.gitignores.clone(),
            built_at: self.built_at,
            generation: next_generation(),
            truncated: self.truncated,
        })
    }

    /// Returns statistics about the index.
    pub fn stats(&self) -> IndexStats {
        let mut extensions: HashMap<&str, usize> = HashMap::new();
        let mut directories: HashSet<&str> = HashSet::new();
        for entry in &self.entries {
            let (dir, name) = entry.rsplit_once('/').unwrap_or(("", entry));
            directories.insert(dir);
            if let Some((stem, ext)) = name.rsplit_once('.')
                && !stem.is_empty()
            {
                *extensions.entry(ext).or_default() += 1;
            }
        }

        IndexStats {
            file_count: self.entries.len(),
            extension_count: extensions.len(),
            directory_count: directories.len(),
        }
    }
}

/// Statistics about a workspace index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    /// Total number of files indexed.
    pub file_count: usize,

    /// Number of unique file extensions.
    pub extension_count: usize,

    /// Number of unique directories holding indexed files.
    pub directory_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::GitignoreFile;
    use pretty_assertions::assert_eq;

    fn index(entries: &[&str]) -> WorkspaceIndex {
        WorkspaceIndex::from_entries("/ws", entries.iter().map(ToString::to_string).collect())
    }

    #[test]
    fn test_index_basic_operations() {
        let index = index(&["src/main.rs", "src/lib.rs", "src/main.rs"]);
        assert_eq!(index.len(), 2);
        assert!(index.contains("src/lib.rs"));
        assert!(!index.contains("src"));
        assert_eq!(index.root(), Path::new("/ws"));
    }

    #[test]
    fn test_generations_are_unique() {
        let a = index(&["a.rs"]);
        let b = index(&["a.rs"]);
        assert_ne!(a.generation(), b.generation());
    }

    #[test]
    fn test_create_is_idempotent() {
        let base = index(&["a.rs"]);
        let options = ScanOptions::default();

        let mut once = PendingChanges::default();
        once.create("b.txt".to_string());
        let mut twice = PendingChanges::default();
        twice.create("b.txt".to_string());
        twice.create("b.txt".to_string());

        let merged_once = base.with_changes(&once, &options).unwrap();
        let merged_twice = base.with_changes(&twice, &options).unwrap();
        assert_eq!(merged_once.entries(), merged_twice.entries());
        assert_eq!(merged_once.entries(), ["a.rs", "b.txt"]);

        // Creating an existing file changes nothing.
        assert!(merged_once.with_changes(&once, &options).is_none());
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let base = index(&["a.rs"]);
        let mut changes = PendingChanges::default();
        changes.delete("missing.rs".to_string());
        assert!(base.with_changes(&changes, &ScanOptions::default()).is_none());
    }

    #[test]
    fn test_delete_directory_removes_descendants() {
        let base = index(&["src/a.rs", "src/b/c.rs", "srcx/d.rs", "e.rs"]);
        let mut changes = PendingChanges::default();
        changes.delete("src".to_string());

        let merged = base.with_changes(&changes, &ScanOptions::default()).unwrap();
        assert_eq!(merged.entries(), ["srcx/d.rs", "e.rs"]);
        assert!(merged.generation() > base.generation());
    }

    #[test]
    fn test_last_event_wins() {
        let mut changes = PendingChanges::default();
        assert!(changes.is_empty());
        changes.create("x.rs".to_string());
        changes.delete("x.rs".to_string());
        assert!(changes.created().is_empty());
        assert!(changes.deleted().contains("x.rs"));

        changes.create("x.rs".to_string());
        assert_eq!(changes.created().len(), 1);
        assert!(changes.created().contains("x.rs"));
        assert!(changes.deleted().is_empty());
    }

    #[test]
    fn test_created_files_are_filtered() {
        let mut base = index(&["a.rs"]);
        base.gitignores = vec![GitignoreFile::parse(Path::new("/ws"), "", "*.tmp\n")];

        let mut changes = PendingChanges::default();
        changes.create("node_modules/x/index.js".to_string());
        changes.create("scratch.tmp".to_string());
        changes.create(".secret".to_string());
        changes.create("src/ok.rs".to_string());

        let merged = base.with_changes(&changes, &ScanOptions::default()).unwrap();
        assert_eq!(merged.entries(), ["a.rs", "src/ok.rs"]);
    }

    #[test]
    fn test_created_files_respect_budget() {
        let base = index(&["a.rs"]);
        let options = ScanOptions {
            max_entries: 1,
            ..ScanOptions::default()
        };
        let mut changes = PendingChanges::default();
        changes.create("b.rs".to_string());
        assert!(base.with_changes(&changes, &options).is_none());
    }

    #[test]
    fn test_large_burst_keeps_arrival_order() {
        let mut changes = PendingChanges::default();
        for i in 0..20_000 {
            changes.create(format!("gen/file_{i}.rs"));
        }
        for i in (0..20_000).step_by(2) {
            changes.delete(format!("gen/file_{i}.rs"));
        }
        changes.create("gen/file_0.rs".to_string());

        assert_eq!(changes.len(), 20_000);
        assert_eq!(changes.created().len(), 10_001);
        assert_eq!(changes.created()[0], "gen/file_1.rs");
        assert_eq!(changes.created()[10_000], "gen/file_0.rs");
        assert!(!changes.deleted().contains("gen/file_0.rs"));

        let base = index(&["gen/file_2.rs", "keep.rs"]);
        let options = ScanOptions {
            max_entries: 50_000,
            ..ScanOptions::default()
        };
        let merged = base.with_changes(&changes, &options).unwrap();
        assert_eq!(merged.len(), 10_002);
        assert!(!merged.contains("gen/file_2.rs"));
        assert_eq!(merged.entries()[1], "gen/file_1.rs");
    }

    #[test]
    fn test_stats() {
        let stats = index(&["src/main.rs", "src/lib.rs", "Cargo.toml", ".gitignore"]).stats();
        assert_eq!(
            stats,
            IndexStats {
                file_count: 4,
                extension_count: 2,
                directory_count: 2,
            }
        );
    }
}
