//! Directory traversal producing the flat entry list of a workspace.
//!
//! The walk is depth-first over an explicit stack with directory entries
//! sorted by name, so a fixed snapshot always yields the same order. The only
//! suspension points are directory listings and `.gitignore` reads, and the
//! cancellation token is checked before each directory is read.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::pattern::{GitignoreFile, GlobRule, any_match};

const GITIGNORE: &str = ".gitignore";

/// Filtering and budget options for a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Compiled user exclude globs.
    pub exclude: Vec<GlobRule>,
    /// Whether `.gitignore` files are loaded and honored.
    pub use_gitignore: bool,
    /// Whether dot-prefixed names are kept.
    pub show_hidden: bool,
    /// Global entry budget.
    pub max_entries: usize,
    /// Whether symbolic links are resolved and followed.
    pub follow_symlinks: bool,
    /// Maximum depth below the root. `None` means unlimited.
    pub max_depth: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), Path::new(""))
    }
}

impl ScanOptions {
    /// Resolves the options for one workspace root.
    pub fn from_config(config: &SearchConfig, root: &Path) -> Self {
        Self {
            exclude: config
                .exclude_patterns_for(root)
                .iter()
                .map(|pattern| GlobRule::new(pattern))
                .collect(),
            use_gitignore: config.use_gitignore,
            show_hidden: config.show_hidden_files,
            max_entries: config.max_entries,
            follow_symlinks: config.follow_symlinks,
            max_depth: config.max_depth,
        }
    }

    /// Decides whether a single directory entry is kept. Ancestors are the
    /// caller's concern.
    ///
    /// Checks run cheapest first: known large directories, hidden names,
    /// exclude globs, then gitignore rules.
    pub fn admits(
        &self,
        relative_path: &str,
        name: &str,
        is_dir: bool,
        gitignore: &[GitignoreFile],
    ) -> bool {
        if is_dir && SearchConfig::is_known_large_dir(name) {
            return false;
        }
        if !self.show_hidden && name.starts_with('.') {
            return false;
        }
        if any_match(&self.exclude, relative_path, is_dir) {
            return false;
        }
        !(self.use_gitignore && any_match(gitignore, relative_path, is_dir))
    }

    /// Decides whether a file path would have been indexed, checking every
    /// ancestor directory as the walk would have.
    pub fn admits_path(&self, relative_path: &str, gitignore: &[GitignoreFile]) -> bool {
        let mut prefix_end = 0;
        for segment in relative_path.split('/') {
            if segment.is_empty() {
                return false;
            }
            let end = prefix_end + segment.len();
            let is_dir = end < relative_path.len();
            if !self.admits(&relative_path[..end], segment, is_dir, gitignore) {
                return false;
            }
            prefix_end = end + 1;
        }
        true
    }
}

/// Result of a workspace scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Relative, forward-slash file paths in walk order.
    pub entries: Vec<String>,
    /// Every non-empty `.gitignore` loaded during the walk.
    pub gitignores: Vec<GitignoreFile>,
    /// The entry budget was reached.
    pub truncated: bool,
    /// The walk stopped because the token was cancelled.
    pub cancelled: bool,
    /// Directories that could not be listed.
    pub skipped_dirs: usize,
}

struct DirFrame {
    relative: String,
    depth: usize,
    gitignores: Arc<Vec<GitignoreFile>>,
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Walks `root` and returns every admitted file path.
///
/// Fails only when the root itself is missing or not a directory.
/// Unreadable subdirectories are skipped, and reaching the entry budget or a
/// cancellation ends the walk early with the entries collected so far.
pub async fn scan(
    root: &Path,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> SearchResult<ScanOutcome> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(SearchError::not_a_directory(root)),
        Err(_) => return Err(SearchError::root_not_found(root)),
    }

    let mut outcome = ScanOutcome::default();
    let mut stack = vec![DirFrame {
        relative: String::new(),
        depth: 0,
        gitignores: Arc::new(Vec::new()),
    }];

    'walk: while let Some(frame) = stack.pop() {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        if outcome.entries.len() >= options.max_entries {
            outcome.truncated = true;
            break;
        }

        let child_depth = frame.depth + 1;
        if options.max_depth.is_some_and(|max| child_depth > max) {
            continue;
        }

        let dir = if frame.relative.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&frame.relative)
        };

        let mut gitignores = frame.gitignores;
        if options.use_gitignore {
            match read_gitignore(&dir, &frame.relative).await {
                Ok(Some(local)) if !local.is_empty() => {
                    let mut inherited = (*gitignores).clone();
                    inherited.push(local.clone());
                    outcome.gitignores.push(local);
                    gitignores = Arc::new(inherited);
                }
                Ok(_) => {}
                Err(err) => tracing::debug!("{}", err),
            }
        }

        let children = match list_dir(&dir, options.follow_symlinks).await {
            Ok(children) => children,
            Err(err) => {
                tracing::debug!("Skipping unreadable directory: {}", err);
                outcome.skipped_dirs += 1;
                continue;
            }
        };

        let mut subdirs = Vec::new();
        for (name, is_dir) in children {
            let relative = join_relative(&frame.relative, &name);
            if !options.admits(&relative, &name, is_dir, &gitignores) {
                continue;
            }

            if is_dir {
                subdirs.push(relative);
                continue;
            }

            outcome.entries.push(relative);
            if outcome.entries.len() >= options.max_entries {
                outcome.truncated = true;
                break 'walk;
            }
        }

        for relative in subdirs.into_iter().rev() {
            stack.push(DirFrame {
                relative,
                depth: child_depth,
                gitignores: Arc::clone(&gitignores),
            });
        }
    }

    Ok(outcome)
}

/// Lists a directory as `(name, is_dir)` pairs sorted by name. Entries that
/// are neither files nor directories (after optional symlink resolution) are
/// left out.
async fn list_dir(dir: &Path, follow_symlinks: bool) -> SearchResult<Vec<(String, bool)>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|err| SearchError::read_directory(dir, err))?;

    let mut children = Vec::new();
    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => return Err(SearchError::read_directory(dir, err)),
        };

        let Ok(file_type) = entry.file_type().await else {
            continue;
        };

        let is_dir = if file_type.is_symlink() {
            if !follow_symlinks {
                continue;
            }
            match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_dir() => true,
                Ok(meta) if meta.is_file() => false,
                _ => continue,
            }
        } else if file_type.is_dir() {
            true
        } else if file_type.is_file() {
            false
        } else {
            continue;
        };

        children.push((entry.file_name().to_string_lossy().into_owned(), is_dir));
    }

    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}

/// Reads and compiles the `.gitignore` in `dir`, if any. `base_dir` is the
/// path of `dir` relative to the workspace root.
pub async fn read_gitignore(dir: &Path, base_dir: &str) -> SearchResult<Option<GitignoreFile>> {
    let path = dir.join(GITIGNORE);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(GitignoreFile::parse(dir, base_dir, &content))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SearchError::read_file(path, err)),
    }
}
