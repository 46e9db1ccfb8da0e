#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::missing_errors_doc
)]
//! Pathscout Search - fuzzy file path search for editor integrations.
//!
//! Indexes workspace roots with an async directory walk that honors
//! `.gitignore` files and user exclude globs, keeps the indexes in an LRU
//! cache updated through file event notifications, and ranks paths with a
//! fuzzy scorer that also matches across `_`, `.` and `-` separators.
//!
//! # Features
//!
//! - Per-root index cache with debounced incremental create/delete updates
//! - Query result cache that narrows refined queries instead of rescanning
//! - Streaming results in ranked batches with cancellation
//! - Glob filtering over indexed paths
//!
//! # Example
//!
//! ```no_run
//! use pathscout_search::{SearchConfig, SearchEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SearchConfig::builder().max_results(20).build();
//!     let engine = SearchEngine::new(config);
//!
//!     let cancel = CancellationToken::new();
//!     for m in engine.search("/path/to/project", "recipemenu", &cancel).await {
//!         println!("{:.2}: {}", m.score, m.path);
//!     }
//! }
//! ```

mod config;
mod engine;
mod error;
mod index;
mod pattern;
mod query_cache;
mod result;
mod scorer;
mod walker;
mod workspace;

pub use config::{ExcludeRule, KNOWN_LARGE_DIRS, STRUCTURAL_FILES, SearchConfig, SearchConfigBuilder};
pub use engine::{EngineStats, SearchEngine};
pub use error::{SearchError, SearchResult};
pub use index::{IndexStats, PathEntry, PendingChanges, WorkspaceIndex};
pub use pattern::{GitignoreFile, GitignoreRule, GlobRule, PathRule, glob_match};
pub use query_cache::{QueryCache, QueryCacheStats};
pub use result::{Match, rank};
pub use scorer::{FuzzyScorer, PreparedQuery, Scratch, file_type_weight};
pub use walker::{ScanOptions, ScanOutcome, scan};
pub use workspace::{BuildTicket, CacheStats, FlushOutcome, Installed, WorkspaceCache};
