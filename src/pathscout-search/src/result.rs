//! Search result types.

use std::cmp::Ordering;

/// A scored candidate path.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// The matched path, relative to the workspace root.
    pub path: String,

    /// Match score (higher is better). Zero means the query carried no
    /// signal, as for the empty browse query.
    pub score: f64,

    /// Char indices into `path` of the characters that matched the query,
    /// strictly increasing. For highlighting in UI.
    pub matched_positions: Vec<usize>,
}

impl Match {
    /// Creates a match.
    pub fn new(path: impl Into<String>, score: f64, matched_positions: Vec<usize>) -> Self {
        Self {
            path: path.into(),
            score,
            matched_positions,
        }
    }

    /// A zero-score match with no highlighted characters.
    pub fn unscored(path: impl Into<String>) -> Self {
        Self::new(path, 0.0, Vec::new())
    }

    /// The file name (last path segment).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Ranking order: higher score first, then shorter path in characters,
    /// then alphabetically.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.path.chars().count().cmp(&other.path.chars().count()))
            .then_with(|| self.path.cmp(&other.path))
    }
}

/// Sorts matches into ranking order.
pub fn rank(matches: &mut [Match]) {
    matches.sort_by(Match::rank_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_ordering() {
        let mut matches = vec![
            Match::new("another.rs", 50.0, vec![]),
            Match::new("very/long/path.rs", 100.0, vec![]),
            Match::new("short.rs", 100.0, vec![]),
        ];
        rank(&mut matches);

        // Higher score first
        assert_eq!(matches[0].score, 100.0);
        assert_eq!(matches[1].score, 100.0);
        assert_eq!(matches[2].score, 50.0);

        // Same score: shorter path first
        assert_eq!(matches[0].path, "short.rs");
    }

    #[test]
    fn test_equal_length_ties_are_alphabetical() {
        let mut matches = vec![Match::unscored("b.rs"), Match::unscored("a.rs")];
        rank(&mut matches);
        assert_eq!(matches[0].path, "a.rs");
    }

    #[test]
    fn test_length_tiebreak_counts_characters() {
        // Same byte length, but the accented path is one character shorter.
        let mut matches = vec![
            Match::new("abc/d.rs", 3.0, vec![]),
            Match::new("é/ab.rs", 3.0, vec![]),
        ];
        rank(&mut matches);
        assert_eq!(matches[0].path, "é/ab.rs");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(Match::unscored("lib/src/main.rs").file_name(), "main.rs");
        assert_eq!(Match::unscored("README.md").file_name(), "README.md");
    }
}
