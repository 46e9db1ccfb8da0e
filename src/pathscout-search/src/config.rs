//! Configuration types for indexing and search.
//!
//! The editor layer resolves user settings into a [`SearchConfig`] and hands
//! it to the engine. Field names deserialize from camelCase so the settings
//! JSON can be passed through unchanged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Directory names pruned before any user rule is consulted.
///
/// These are version-control metadata, dependency caches and build output
/// directories that are never useful completion targets.
pub const KNOWN_LARGE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "bower_components",
    "target",
    "build",
    "dist",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".cache",
    ".dart_tool",
    ".gradle",
    ".next",
];

/// File names whose creation, change or deletion invalidates a workspace
/// index wholesale instead of being merged incrementally.
pub const STRUCTURAL_FILES: &[&str] = &[
    ".gitignore",
    "package.json",
    "Cargo.toml",
    "pubspec.yaml",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "composer.json",
    "Gemfile",
];

/// A user exclude glob plus whether it is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeRule {
    pub pattern: String,
    pub enabled: bool,
}

impl ExcludeRule {
    /// Creates an enabled rule.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: true,
        }
    }

    /// Creates a rule that overrides a global rule to be inactive.
    pub fn disabled(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: false,
        }
    }
}

/// Configuration for the search system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Global exclude globs.
    pub exclude_patterns: Vec<ExcludeRule>,

    /// Per-workspace overrides of `exclude_patterns`, keyed by root.
    pub workspace_excludes: HashMap<PathBuf, Vec<ExcludeRule>>,

    /// Whether dotfiles and dot-directories are indexed.
    pub show_hidden_files: bool,

    /// Whether `.gitignore` files are honored.
    pub use_gitignore: bool,

    /// Whether matching ignores case.
    pub case_insensitive: bool,

    /// Maximum number of matches returned by a search.
    pub max_results: usize,

    /// Maximum number of entries indexed per workspace.
    pub max_entries: usize,

    /// Whether to follow symbolic links while walking.
    pub follow_symlinks: bool,

    /// Maximum depth to descend below the root. `None` means unlimited.
    pub max_depth: Option<usize>,

    /// Number of workspace indexes kept in memory.
    pub workspace_cache_capacity: usize,

    /// Number of distinct queries cached per workspace.
    pub query_cache_capacity: usize,

    /// Quiet period before pending file events are merged, in milliseconds.
    pub debounce_ms: u64,

    /// Number of matches per batch in streaming searches.
    pub stream_batch_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Vec::new(),
            workspace_excludes: HashMap::new(),
            show_hidden_files: false,
            use_gitignore: true,
            case_insensitive: true,
            max_results: 100,
            max_entries: 10_000,
            follow_symlinks: false,
            max_depth: None,
            workspace_cache_capacity: 10,
            query_cache_capacity: 100,
            debounce_ms: 500,
            stream_batch_size: 64,
        }
    }
}

impl SearchConfig {
    /// Creates a builder for constructing a configuration.
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::new()
    }

    /// The debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the enabled exclude patterns for a workspace root, with that
    /// root's overrides applied on top of the global rules.
    pub fn exclude_patterns_for(&self, root: &Path) -> Vec<String> {
        let mut rules: Vec<ExcludeRule> = self.exclude_patterns.clone();

        if let Some(overrides) = self.workspace_excludes.get(root) {
            for over in overrides {
                match rules.iter_mut().find(|r| r.pattern == over.pattern) {
                    Some(rule) => rule.enabled = over.enabled,
                    None => rules.push(over.clone()),
                }
            }
        }

        rules
            .into_iter()
            .filter(|r| r.enabled && !r.pattern.trim().is_empty())
            .map(|r| r.pattern)
            .collect()
    }

    /// Checks if a directory name is pruned unconditionally.
    pub fn is_known_large_dir(name: &str) -> bool {
        KNOWN_LARGE_DIRS.contains(&name)
    }

    /// Checks if a file name triggers wholesale invalidation.
    pub fn is_structural_file(name: &str) -> bool {
        STRUCTURAL_FILES.contains(&name)
    }
}

/// Builder for creating `SearchConfig` instances.
#[derive(Debug, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global exclude patterns, all enabled.
    pub fn exclude_patterns(
        mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.config.exclude_patterns = patterns.into_iter().map(ExcludeRule::new).collect();
        self
    }

    /// Adds a single global exclude rule.
    pub fn add_exclude_rule(mut self, rule: ExcludeRule) -> Self {
        self.config.exclude_patterns.push(rule);
        self
    }

    /// Sets the overrides for one workspace root.
    pub fn workspace_excludes(
        mut self,
        root: impl Into<PathBuf>,
        rules: impl IntoIterator<Item = ExcludeRule>,
    ) -> Self {
        self.config
            .workspace_excludes
            .insert(root.into(), rules.into_iter().collect());
        self
    }

    /// Sets whether to include hidden files.
    pub fn show_hidden_files(mut self, show: bool) -> Self {
        self.config.show_hidden_files = show;
        self
    }

    /// Sets whether to respect .gitignore files.
    pub fn use_gitignore(mut self, use_gitignore: bool) -> Self {
        self.config.use_gitignore = use_gitignore;
        self
    }

    /// Sets whether matching ignores case.
    pub fn case_insensitive(mut self, insensitive: bool) -> Self {
        self.config.case_insensitive = insensitive;
        self
    }

    /// Sets the result cap.
    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    /// Sets the per-workspace entry budget.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.config.max_entries = max;
        self
    }

    /// Sets whether to follow symbolic links.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Sets the maximum traversal depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    /// Sets how many workspace indexes are cached.
    pub fn workspace_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.workspace_cache_capacity = capacity;
        self
    }

    /// Sets how many queries are cached per workspace.
    pub fn query_cache_capacity(mut self, capacity: usize) -> Self {
        self.config.query_cache_capacity = capacity;
        self
    }

    /// Sets the debounce window.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.config.debounce_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the streaming batch size.
    pub fn stream_batch_size(mut self, size: usize) -> Self {
        self.config.stream_batch_size = size.max(1);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> SearchConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert!(config.use_gitignore);
        assert!(!config.show_hidden_files);
        assert!(config.case_insensitive);
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.workspace_cache_capacity, 10);
        assert_eq!(config.query_cache_capacity, 100);
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_config_builder() {
        let config = SearchConfig::builder()
            .max_depth(5)
            .show_hidden_files(true)
            .use_gitignore(false)
            .exclude_patterns(["**/*.log"])
            .debounce(Duration::from_millis(20))
            .build();

        assert_eq!(config.max_depth, Some(5));
        assert!(config.show_hidden_files);
        assert!(!config.use_gitignore);
        assert_eq!(config.exclude_patterns, vec![ExcludeRule::new("**/*.log")]);
        assert_eq!(config.debounce_ms, 20);
    }

    #[test]
    fn test_known_large_dirs() {
        assert!(SearchConfig::is_known_large_dir("node_modules"));
        assert!(SearchConfig::is_known_large_dir(".git"));
        assert!(!SearchConfig::is_known_large_dir("src"));
    }

    #[test]
    fn test_structural_files() {
        assert!(SearchConfig::is_structural_file(".gitignore"));
        assert!(SearchConfig::is_structural_file("package.json"));
        assert!(!SearchConfig::is_structural_file("main.rs"));
    }

    #[test]
    fn test_workspace_overrides() {
        let config = SearchConfig::builder()
            .exclude_patterns(["**/*.log", "**/tmp"])
            .workspace_excludes(
                "/work/a",
                [ExcludeRule::disabled("**/tmp"), ExcludeRule::new("**/*.bak")],
            )
            .build();

        assert_eq!(
            config.exclude_patterns_for(Path::new("/work/a")),
            vec!["**/*.log".to_string(), "**/*.bak".to_string()]
        );
        assert_eq!(
            config.exclude_patterns_for(Path::new("/work/b")),
            vec!["**/*.log".to_string(), "**/tmp".to_string()]
        );
    }

    #[test]
    fn test_deserialize_editor_settings() {
        let json = r#"{
            "excludePatterns": [{"pattern": "**/*.tmp", "enabled": true}],
            "showHiddenFiles": true,
            "caseInsensitive": false,
            "maxResults": 25
        }"#;
        let config: SearchConfig = serde_json::from_str(json).expect("valid settings");

        assert!(config.show_hidden_files);
        assert!(!config.case_insensitive);
        assert_eq!(config.max_results, 25);
        // Unspecified fields keep their defaults.
        assert!(config.use_gitignore);
        assert_eq!(config.max_entries, 10_000);
    }
}
