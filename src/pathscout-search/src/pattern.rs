//! Glob and gitignore predicates over relative, forward-slash paths.
//!
//! Both rule kinds compile once and are then matched many times during a
//! walk. Globs use the matcher in this module; `.gitignore` files are
//! compiled with `ignore::gitignore`. A pattern that fails to compile never
//! fails the walk: it degrades to a plain substring containment check for
//! that rule only.

use std::path::Path;
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{SearchError, SearchResult};

/// A predicate over workspace-relative paths.
pub trait PathRule {
    /// Returns whether `relative_path` matches. `is_dir` tells the rule
    /// whether the path names a directory.
    fn matches(&self, relative_path: &str, is_dir: bool) -> bool;
}

/// Compiled form of a pattern body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Compiled {
    /// Contains at least one of `* ? [`.
    Wildcard(Vec<char>),
    /// No wildcard characters.
    Literal(String),
    /// Fallback for patterns that failed to compile.
    Substring(String),
}

impl Compiled {
    fn compile(body: &str) -> SearchResult<Self> {
        if body.is_empty() {
            return Err(SearchError::invalid_glob(body, "empty pattern"));
        }

        if !body.contains(['*', '?', '[']) {
            return Ok(Self::Literal(body.to_string()));
        }

        let chars: Vec<char> = body.chars().collect();
        validate_classes(&chars).map_err(|reason| SearchError::invalid_glob(body, reason))?;
        Ok(Self::Wildcard(chars))
    }

    /// Whole-string match.
    fn matches_exact(&self, text: &str) -> bool {
        match self {
            Self::Wildcard(pattern) => {
                let text: Vec<char> = text.chars().collect();
                glob_chars(pattern, &text)
            }
            Self::Literal(literal) => literal == text,
            Self::Substring(needle) => text.contains(needle.as_str()),
        }
    }
}

fn validate_classes(pattern: &[char]) -> Result<(), &'static str> {
    let mut i = 0;
    while i < pattern.len() {
        if pattern[i] == '[' {
            match class_end(pattern, i + 1) {
                Some(end) => i = end + 1,
                None => return Err("unclosed character class"),
            }
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// Index of the `]` closing a class whose body starts at `start`.
fn class_end(pattern: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if matches!(pattern.get(j), Some('!' | '^')) {
        j += 1;
    }
    // A `]` right after the opening bracket is a literal member.
    if pattern.get(j) == Some(&']') {
        j += 1;
    }
    while j < pattern.len() {
        if pattern[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}

/// Matches a string against a glob pattern.
///
/// Supports the following patterns:
/// - `*` matches any sequence of characters except path separators
/// - `**` matches any sequence including path separators
/// - `**/` matches zero or more whole directories
/// - `?` matches a single character other than `/`
/// - `[abc]`, `[a-z]` and `[!abc]` character classes
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.replace('\\', "/").chars().collect();
    let text: Vec<char> = text.replace('\\', "/").chars().collect();
    glob_chars(&pattern, &text)
}

fn glob_chars(pattern: &[char], text: &[char]) -> bool {
    let mut pi = 0;
    let mut ti = 0;

    while pi < pattern.len() {
        match pattern[pi] {
            '*' if pattern.get(pi + 1) == Some(&'*') => {
                let mut rest = pi + 2;
                let dir_form = pattern.get(rest) == Some(&'/');
                if dir_form {
                    rest += 1;
                }
                let remaining = &pattern[rest..];

                // ** at end matches everything
                if remaining.is_empty() {
                    return true;
                }

                if dir_form {
                    // Zero directories, or resume after any separator.
                    if glob_chars(remaining, &text[ti..]) {
                        return true;
                    }
                    return (ti..text.len())
                        .filter(|&i| text[i] == '/')
                        .any(|i| glob_chars(remaining, &text[i + 1..]));
                }

                return (ti..=text.len()).any(|i| glob_chars(remaining, &text[i..]));
            }
            '*' => {
                let remaining = &pattern[pi + 1..];
                for i in ti..=text.len() {
                    if glob_chars(remaining, &text[i..]) {
                        return true;
                    }
                    // Single * cannot match /
                    if i < text.len() && text[i] == '/' {
                        break;
                    }
                }
                return false;
            }
            '?' => match text.get(ti) {
                Some(&c) if c != '/' => {
                    pi += 1;
                    ti += 1;
                }
                _ => return false,
            },
            '[' => {
                let Some(end) = class_end(pattern, pi + 1) else {
                    return false;
                };
                let Some(&c) = text.get(ti) else {
                    return false;
                };
                if c == '/' || !class_matches(&pattern[pi + 1..end], c) {
                    return false;
                }
                pi = end + 1;
                ti += 1;
            }
            literal => {
                if text.get(ti) != Some(&literal) {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }

    // Pattern exhausted - text should also be exhausted
    ti == text.len()
}

fn class_matches(body: &[char], c: char) -> bool {
    let (negated, body) = match body.first() {
        Some('!' | '^') => (true, &body[1..]),
        _ => (false, body),
    };

    let mut matched = false;
    let mut i = 0;
    while i < body.len() {
        if i + 2 < body.len() && body[i + 1] == '-' {
            if body[i] <= c && c <= body[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if body[i] == c {
                matched = true;
            }
            i += 1;
        }
    }

    matched != negated
}

fn normalize(pattern: &str) -> String {
    let pattern = pattern.trim().replace('\\', "/");
    let pattern = pattern.strip_prefix("./").unwrap_or(&pattern);
    pattern.to_string()
}

/// A user exclude glob.
///
/// Wildcard patterns match the whole relative path. Patterns without
/// wildcards match the path itself or anything below it, so `docs` excludes
/// both `docs` and `docs/guide.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobRule {
    pattern: String,
    compiled: Compiled,
}

impl GlobRule {
    /// Compiles a glob, reporting patterns that cannot be compiled.
    pub fn compile(pattern: &str) -> SearchResult<Self> {
        let normalized = normalize(pattern);
        let body = normalized.trim_start_matches('/');
        let body = if body.contains(['*', '?', '[']) {
            body
        } else {
            body.trim_end_matches('/')
        };

        Ok(Self {
            pattern: pattern.to_string(),
            compiled: Compiled::compile(body)?,
        })
    }

    /// Compiles a glob, degrading to substring containment on failure.
    pub fn new(pattern: &str) -> Self {
        Self::compile(pattern).unwrap_or_else(|err| {
            tracing::warn!("{}; falling back to substring matching", err);
            Self {
                pattern: pattern.to_string(),
                compiled: Compiled::Substring(normalize(pattern)),
            }
        })
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether this rule fell back to substring matching.
    pub fn is_degraded(&self) -> bool {
        matches!(self.compiled, Compiled::Substring(_))
    }
}

impl PathRule for GlobRule {
    fn matches(&self, relative_path: &str, _is_dir: bool) -> bool {
        match &self.compiled {
            Compiled::Literal(literal) => {
                relative_path == literal
                    || relative_path
                        .strip_prefix(literal.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            other => other.matches_exact(relative_path),
        }
    }
}

/// One line of a `.gitignore` file.
///
/// Rules are scoped to `base_dir`, the directory holding the file that
/// defined them (`""` for the workspace root). Matching is done by the
/// [`GitignoreFile`] the rule belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitignoreRule {
    pattern: String,
    base_dir: String,
    dir_only: bool,
}

impl GitignoreRule {
    /// Parses one line of a `.gitignore`.
    ///
    /// Returns `None` for blank lines, comments and negations. Negated
    /// (`!pattern`) re-include rules are recognized but not supported, so a
    /// path excluded by an earlier rule stays excluded.
    pub fn parse(line: &str, base_dir: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = if line.ends_with("\\ ") {
            line
        } else {
            line.trim_end()
        };

        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        if line.starts_with('!') {
            tracing::debug!(pattern = line, base_dir, "dropping gitignore negation");
            return None;
        }

        Some(Self {
            pattern: line.to_string(),
            base_dir: base_dir.trim_matches('/').to_string(),
            dir_only: line.ends_with('/'),
        })
    }

    /// The line as written in the `.gitignore`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Directory (relative to the root) whose `.gitignore` defined this rule.
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Whether the rule only applies to directories.
    pub fn is_dir_only(&self) -> bool {
        self.dir_only
    }

    /// The pattern body used when the line cannot be compiled.
    fn substring(&self) -> String {
        self.pattern
            .trim_start_matches('/')
            .trim_end_matches('/')
            .replace("\\ ", " ")
    }
}

/// The rules of one `.gitignore` file, compiled with the `ignore` crate.
///
/// Lines that fail to compile degrade to substring containment on their own;
/// the rest of the file keeps working.
#[derive(Debug, Clone)]
pub struct GitignoreFile {
    base_dir: String,
    rules: Arc<[GitignoreRule]>,
    matcher: Arc<Gitignore>,
    degraded: Arc<[String]>,
}

impl GitignoreFile {
    /// Compiles the `.gitignore` in `dir`, whose path relative to the
    /// workspace root is `base_dir`.
    pub fn parse(dir: &Path, base_dir: &str, content: &str) -> Self {
        let rules: Vec<GitignoreRule> = content
            .lines()
            .filter_map(|line| GitignoreRule::parse(line, base_dir))
            .collect();

        let mut builder = GitignoreBuilder::new(dir);
        let mut degraded = Vec::new();
        for rule in &rules {
            if let Err(err) = builder.add_line(None, rule.pattern()) {
                tracing::warn!(
                    base_dir,
                    pattern = rule.pattern(),
                    "invalid gitignore pattern: {}; falling back to substring matching",
                    err
                );
                degraded.push(rule.substring());
            }
        }

        let matcher = builder.build().unwrap_or_else(|err| {
            tracing::warn!(base_dir, "failed to compile .gitignore: {}", err);
            degraded = rules.iter().map(GitignoreRule::substring).collect();
            Gitignore::empty()
        });

        Self {
            base_dir: base_dir.trim_matches('/').to_string(),
            rules: rules.into(),
            matcher: Arc::new(matcher),
            degraded: degraded.into(),
        }
    }

    /// Directory (relative to the root) holding this file.
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// The parsed lines, negations excluded.
    pub fn rules(&self) -> &[GitignoreRule] {
        &self.rules
    }

    /// Whether the file has no effective rule.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The part of `relative_path` below `base_dir`, or `None` if the path
    /// lies outside it.
    fn scoped<'a>(&self, relative_path: &'a str) -> Option<&'a str> {
        if self.base_dir.is_empty() {
            return Some(relative_path);
        }
        relative_path
            .strip_prefix(self.base_dir.as_str())?
            .strip_prefix('/')
            .filter(|rest| !rest.is_empty())
    }
}

impl PathRule for GitignoreFile {
    fn matches(&self, relative_path: &str, is_dir: bool) -> bool {
        let Some(scoped) = self.scoped(relative_path) else {
            return false;
        };
        self.matcher.matched(scoped, is_dir).is_ignore()
            || self.degraded.iter().any(|body| scoped.contains(body.as_str()))
    }
}

/// Returns whether any rule matches.
pub fn any_match<R: PathRule>(rules: &[R], relative_path: &str, is_dir: bool) -> bool {
    rules.iter().any(|rule| rule.matches(relative_path, is_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gi(content: &str, base: &str) -> GitignoreFile {
        GitignoreFile::parse(&Path::new("/ws").join(base), base, content)
    }

    #[test]
    fn test_glob_match_simple() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(glob_match("*.rs", "lib.rs"));
        assert!(!glob_match("*.rs", "main.go"));
    }

    #[test]
    fn test_glob_match_double_star() {
        assert!(glob_match("**/*.rs", "src/main.rs"));
        assert!(glob_match("**/*.rs", "main.rs"));
        assert!(glob_match("**/*.rs", "src/lib/mod.rs"));
        assert!(glob_match("src/**/*.rs", "src/foo/bar/baz.rs"));
        assert!(glob_match("src/**", "src/a/b"));
    }

    #[test]
    fn test_double_star_slash_only_resumes_at_segments() {
        assert!(glob_match("**/node_modules", "node_modules"));
        assert!(glob_match("**/node_modules", "a/b/node_modules"));
        assert!(!glob_match("**/node_modules", "a/xnode_modules"));
    }

    #[test]
    fn test_glob_match_question() {
        assert!(glob_match("main.?s", "main.rs"));
        assert!(glob_match("main.?s", "main.ts"));
        assert!(!glob_match("main.?s", "main.rs2"));
        assert!(!glob_match("a?b", "a/b"));
    }

    #[test]
    fn test_glob_match_bracket() {
        assert!(glob_match("main.[rt]s", "main.rs"));
        assert!(glob_match("main.[rt]s", "main.ts"));
        assert!(!glob_match("main.[rt]s", "main.js"));

        assert!(glob_match("file[0-9].txt", "file5.txt"));
        assert!(!glob_match("file[0-9].txt", "filea.txt"));

        assert!(glob_match("file[!0-9].txt", "filea.txt"));
        assert!(!glob_match("file[!0-9].txt", "file5.txt"));
    }

    #[test]
    fn test_glob_match_path_separator() {
        assert!(!glob_match("src/*.rs", "src/foo/bar.rs"));
        assert!(glob_match("src/**/*.rs", "src/foo/bar.rs"));
    }

    #[test]
    fn test_literal_glob_matches_prefix_segment() {
        let rule = GlobRule::new("docs");
        assert!(rule.matches("docs", true));
        assert!(rule.matches("docs/guide.md", false));
        assert!(!rule.matches("docsite/index.md", false));
        assert!(!rule.matches("src/docs", true));

        let rule = GlobRule::new("./generated/");
        assert!(rule.matches("generated/api.rs", false));
    }

    #[test]
    fn test_invalid_glob_degrades_to_substring() {
        assert!(GlobRule::compile("cache[").is_err());

        let rule = GlobRule::new("cache[");
        assert!(rule.is_degraded());
        assert!(rule.matches("tmp/cache[1]/x", false));
        assert!(!rule.matches("tmp/cache/x", false));
    }

    #[test]
    fn test_gitignore_comments_blanks_and_negations() {
        let file = gi("# comment\n\n*.log\n!keep.log\n  \n/dist/\n", "");
        let patterns: Vec<&str> = file.rules().iter().map(GitignoreRule::pattern).collect();
        assert_eq!(patterns, vec!["*.log", "/dist/"]);
        assert!(file.rules()[1].is_dir_only());
        assert!(gi("# only a comment\n!neg\n", "").is_empty());
    }

    #[test]
    fn test_gitignore_negation_is_not_applied() {
        let file = gi("*.log\n!keep.log\n", "");
        assert!(file.matches("keep.log", false));
    }

    #[test]
    fn test_gitignore_escapes() {
        assert!(gi("\\#notes", "").matches("#notes", false));
        assert!(gi("\\!important", "").matches("!important", false));
        assert!(gi("trailing\\ ", "").matches("trailing ", false));
        assert!(gi("spaces   ", "").matches("spaces", false));
    }

    #[test]
    fn test_gitignore_basename_matches_at_any_depth() {
        let file = gi("*.log", "");
        assert!(file.matches("debug.log", false));
        assert!(file.matches("a/b/debug.log", false));
        assert!(!file.matches("a/b/debug.txt", false));
    }

    #[test]
    fn test_gitignore_base_dir_scoping() {
        let file = gi("x", "sub");
        assert_eq!(file.base_dir(), "sub");
        assert!(file.matches("sub/x", false));
        assert!(file.matches("sub/deep/x", false));
        assert!(!file.matches("other/x", false));
        assert!(!file.matches("x", false));
        assert!(!file.matches("subway/x", false));
        assert!(!file.matches("sub", true));
    }

    #[test]
    fn test_gitignore_dir_only() {
        let file = gi("logs/", "");
        assert!(file.matches("logs", true));
        assert!(file.matches("a/logs", true));
        assert!(!file.matches("logs", false));
        // Files below an excluded directory are pruned by the walker, not here.
        assert!(!file.matches("logs/today.txt", false));
    }

    #[test]
    fn test_gitignore_anchored() {
        let file = gi("/build.sh", "tools");
        assert!(file.matches("tools/build.sh", false));
        assert!(!file.matches("tools/nested/build.sh", false));

        let file = gi("docs/*.md", "");
        assert!(file.matches("docs/a.md", false));
        assert!(!file.matches("x/docs/a.md", false));
        assert!(!file.matches("docs/a/b.md", false));
    }

    #[test]
    fn test_gitignore_double_star_directory() {
        let file = gi("**/generated/", "");
        assert!(file.matches("generated", true));
        assert!(file.matches("lib/src/generated", true));
        assert!(!file.matches("lib/src/generated", false));
        assert!(!file.matches("lib/pregenerated", true));
    }

    #[test]
    fn test_gitignore_invalid_line_degrades_alone() {
        let file = gi("tmp[\n*.bak\n", "");
        assert!(file.matches("a/tmp[", false));
        assert!(!file.matches("a/tmp", false));
        // The valid line in the same file still matches as a glob.
        assert!(file.matches("deep/old.bak", false));
        assert!(!file.matches("bak", false));
    }
}
