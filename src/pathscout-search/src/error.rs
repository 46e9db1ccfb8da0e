//! Error types for indexing and search operations.
//!
//! None of these reach the editor as failures: the engine logs them and
//! degrades to fewer (or no) results.

use std::path::PathBuf;

/// Result type alias for search operations.
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while indexing or searching a workspace.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The workspace root does not exist.
    #[error("Root directory does not exist: {0}")]
    RootNotFound(PathBuf),

    /// The workspace root exists but is not a directory.
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A directory could not be listed.
    #[error("Failed to read directory '{path}': {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file (usually a `.gitignore`) could not be read.
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A glob or gitignore pattern could not be compiled.
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },

    /// The operation was cancelled before it completed.
    #[error("Operation was cancelled")]
    Cancelled,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Creates a new `RootNotFound` error.
    pub fn root_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RootNotFound(path.into())
    }

    /// Creates a new `NotADirectory` error.
    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Creates a new `ReadDirectory` error.
    pub fn read_directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadDirectory {
            path: path.into(),
            source,
        }
    }

    /// Creates a new `ReadFile` error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a new `InvalidGlobPattern` error.
    pub fn invalid_glob(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGlobPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the workspace root is unusable.
    pub fn is_root_missing(&self) -> bool {
        matches!(self, Self::RootNotFound(_) | Self::NotADirectory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SearchError::root_not_found("/nonexistent");
        assert!(err.to_string().contains("/nonexistent"));
        assert!(err.is_root_missing());

        let err = SearchError::invalid_glob("[abc", "unclosed character class");
        assert!(err.to_string().contains("[abc"));
        assert!(!err.is_root_missing());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let search_err: SearchError = io_err.into();
        assert!(matches!(search_err, SearchError::Io(_)));
    }

    #[test]
    fn test_read_directory_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SearchError::read_directory("/locked", io_err);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("denied"));
    }
}
