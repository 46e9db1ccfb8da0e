//! Fuzzy subsequence scoring of candidate paths.
//!
//! A path is scored several ways and the best wins:
//!
//! | variant                         | weight |
//! |---------------------------------|--------|
//! | file name, raw characters       | 2.0    |
//! | full path, raw characters       | 1.0    |
//! | per segment (query split on `/ - _ .`) | 1.0, last segment 1.5 |
//! | file name, symbols stripped     | 3.0    |
//! | full path, symbols stripped     | 1.0    |
//!
//! The symbol-stripped variants drop every non-alphanumeric character from
//! both sides, so `recipemenu` finds `recipe_menu.codegen.dart`. The result is
//! then weighted by file type.

use crate::result::{Match, rank};

const BASE_POINT: f64 = 1.0;
const CONSECUTIVE_BONUS: f64 = 0.5;
const BOUNDARY_BONUS: f64 = 0.8;
const CASE_BONUS: f64 = 0.2;
const EXACT_MULTIPLIER: f64 = 2.0;

const FILENAME_WEIGHT: f64 = 2.0;
const STRIPPED_FILENAME_WEIGHT: f64 = 3.0;
const PATH_WEIGHT: f64 = 1.0;
const LAST_SEGMENT_WEIGHT: f64 = 1.5;

const SOURCE_WEIGHT: f64 = 1.2;
const DOC_WEIGHT: f64 = 1.1;
const CONFIG_WEIGHT: f64 = 1.05;

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "go", "java", "kt", "kts", "swift", "c",
    "h", "cc", "cpp", "hpp", "cs", "rb", "php", "dart", "scala", "lua", "vue", "svelte", "sh",
    "zig", "ex", "exs", "hs", "ml", "m", "mm",
];
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "mdx", "rst", "txt", "adoc", "org"];
const CONFIG_EXTENSIONS: &[&str] = &[
    "json",
    "jsonc",
    "yaml",
    "yml",
    "toml",
    "ini",
    "cfg",
    "conf",
    "xml",
    "properties",
];

const QUERY_SEPARATORS: [char; 4] = ['/', '-', '_', '.'];

/// Multiplier applied to a path's score based on its extension.
pub fn file_type_weight(path: &str) -> f64 {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return 1.0;
    };
    if stem.is_empty() {
        return 1.0;
    }

    let ext = ext.to_ascii_lowercase();
    if SOURCE_EXTENSIONS.contains(&ext.as_str()) {
        SOURCE_WEIGHT
    } else if DOC_EXTENSIONS.contains(&ext.as_str()) {
        DOC_WEIGHT
    } else if CONFIG_EXTENSIONS.contains(&ext.as_str()) {
        CONFIG_WEIGHT
    } else {
        1.0
    }
}

/// Scores candidate paths against queries.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyScorer {
    case_insensitive: bool,
}

impl Default for FuzzyScorer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FuzzyScorer {
    /// Creates a scorer.
    pub fn new(case_insensitive: bool) -> Self {
        Self { case_insensitive }
    }

    /// Whether matching ignores case.
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Scores a single candidate. Prefer [`FuzzyScorer::prepare`] when
    /// scoring many candidates against one query.
    pub fn score(&self, query: &str, candidate: &str) -> Option<Match> {
        self.prepare(query).score(candidate)
    }

    /// Preprocesses a query for repeated scoring.
    pub fn prepare(&self, query: &str) -> PreparedQuery {
        let raw: Vec<char> = query.chars().map(|c| self.fold(c)).collect();
        let stripped: Vec<char> = raw.iter().copied().filter(|c| c.is_alphanumeric()).collect();
        let parts: Vec<Vec<char>> = raw
            .split(|c| QUERY_SEPARATORS.contains(c))
            .filter(|part| !part.is_empty())
            .map(<[char]>::to_vec)
            .collect();

        PreparedQuery {
            scorer: *self,
            raw,
            stripped,
            parts,
        }
    }

    /// Scores every candidate and returns the matches in ranking order.
    ///
    /// An empty query returns every candidate with score 0 in input order.
    pub fn score_all<'a, I>(&self, query: &str, candidates: I) -> Vec<Match>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.prepare(query).rank_all(candidates)
    }

    fn fold(&self, c: char) -> char {
        if self.case_insensitive {
            c.to_lowercase().next().unwrap_or(c)
        } else {
            c
        }
    }
}

/// A query ready to be scored against many candidates.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    scorer: FuzzyScorer,
    raw: Vec<char>,
    stripped: Vec<char>,
    parts: Vec<Vec<char>>,
}

/// Reusable buffers for [`PreparedQuery::score_with`].
///
/// Holding one `Scratch` across a batch of candidates keeps scoring free of
/// per-path allocations, except for the positions of an actual match.
#[derive(Debug, Default)]
pub struct Scratch {
    orig: Vec<char>,
    norm: Vec<char>,
    boundary: Vec<bool>,
    stripped: Projection,
    segments: Vec<(usize, usize)>,
    /// Positions found by the pass being tried.
    trial: Vec<usize>,
    /// Positions accumulated over the segment pass.
    joined: Vec<usize>,
    /// Positions of the best pass so far.
    best: Vec<usize>,
}

/// A candidate string (or a slice of one) prepared for walking.
struct View<'a> {
    orig: &'a [char],
    norm: &'a [char],
    boundary: &'a [bool],
}

impl View<'_> {
    fn slice(&self, start: usize, end: usize) -> View<'_> {
        View {
            orig: &self.orig[start..end],
            norm: &self.norm[start..end],
            boundary: &self.boundary[start..end],
        }
    }
}

/// Alphanumeric-only projection of a candidate.
#[derive(Debug, Default)]
struct Projection {
    orig: Vec<char>,
    norm: Vec<char>,
    boundary: Vec<bool>,
    /// Index in the unstripped candidate for each retained character.
    source: Vec<usize>,
}

impl Projection {
    fn fill(&mut self, path: &View<'_>) {
        self.orig.clear();
        self.norm.clear();
        self.boundary.clear();
        self.source.clear();
        for (i, &c) in path.orig.iter().enumerate() {
            if c.is_alphanumeric() {
                self.orig.push(c);
                self.norm.push(path.norm[i]);
                self.boundary.push(path.boundary[i]);
                self.source.push(i);
            }
        }
    }

    /// The projection from retained character `start` on.
    fn view(&self, start: usize) -> View<'_> {
        View {
            orig: &self.orig[start..],
            norm: &self.norm[start..],
            boundary: &self.boundary[start..],
        }
    }
}

/// Walks `query` through `view` from `from`, greedily taking the first
/// occurrence of each query character.
///
/// Returns the score and leaves the matched indices (relative to `view`) in
/// `positions`, or returns `None` when the candidate runs out before the
/// query does.
fn walk(query: &[char], view: &View<'_>, from: usize, positions: &mut Vec<usize>) -> Option<f64> {
    positions.clear();
    if query.is_empty() || view.norm.is_empty() {
        return None;
    }

    let mut score = 0.0;
    let mut run = 0usize;
    let mut qi = 0;

    for ci in from..view.norm.len() {
        if qi == query.len() {
            break;
        }
        if view.norm[ci] != query[qi] {
            continue;
        }

        let consecutive = ci > 0 && positions.last() == Some(&(ci - 1));
        run = if consecutive { run + 1 } else { 1 };

        score += BASE_POINT;
        score += CONSECUTIVE_BONUS * (run - 1) as f64;
        if view.boundary[ci] {
            score += BOUNDARY_BONUS;
        }
        if view.orig[ci] != view.norm[ci] {
            score += CASE_BONUS;
        }

        positions.push(ci);
        qi += 1;
    }

    if qi < query.len() {
        return None;
    }

    let first = positions[0];
    let last = positions[positions.len() - 1];
    // Unmatched characters inside the matched window.
    let spread = (last - first + 1) - positions.len();
    score *= 1.0 - spread as f64 / view.norm.len() as f64;

    if from == 0 && view.norm == query {
        score *= EXACT_MULTIPLIER;
    }

    Some(score)
}

/// The best pass so far. Positions are copied only when a pass wins.
struct Best<'a> {
    score: Option<f64>,
    positions: &'a mut Vec<usize>,
}

impl Best<'_> {
    fn consider(
        &mut self,
        found: Option<f64>,
        weight: f64,
        positions: &[usize],
        to_path: impl Fn(usize) -> usize,
    ) {
        let Some(score) = found else {
            return;
        };
        let score = score * weight;
        if self.score.is_none_or(|current| score > current) {
            self.score = Some(score);
            self.positions.clear();
            self.positions
                .extend(positions.iter().map(|&position| to_path(position)));
        }
    }
}

impl PreparedQuery {
    /// Whether the query is empty (browse mode).
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Number of characters in the query.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Scores one candidate path.
    pub fn score(&self, candidate: &str) -> Option<Match> {
        self.score_with(candidate, &mut Scratch::default())
    }

    /// Scores every candidate with one set of buffers and returns the
    /// matches in ranking order.
    ///
    /// An empty query returns every candidate with score 0 in input order.
    pub fn rank_all<'a, I>(&self, candidates: I) -> Vec<Match>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.is_empty() {
            return candidates.into_iter().map(Match::unscored).collect();
        }

        let mut scratch = Scratch::default();
        let mut matches: Vec<Match> = candidates
            .into_iter()
            .filter_map(|candidate| self.score_with(candidate, &mut scratch))
            .collect();
        rank(&mut matches);
        matches
    }

    /// Scores one candidate path, reusing `scratch` for intermediate state.
    pub fn score_with(&self, candidate: &str, scratch: &mut Scratch) -> Option<Match> {
        if self.raw.is_empty() {
            return Some(Match::unscored(candidate));
        }
        if !self.may_match(candidate) {
            return None;
        }

        let Scratch {
            orig,
            norm,
            boundary,
            stripped,
            segments,
            trial,
            joined,
            best,
        } = scratch;

        orig.clear();
        orig.extend(candidate.chars());
        norm.clear();
        norm.extend(orig.iter().map(|&c| self.scorer.fold(c)));
        boundary.clear();
        boundary.extend((0..orig.len()).map(|i| i == 0 || !orig[i - 1].is_alphanumeric()));

        let path = View {
            orig: orig.as_slice(),
            norm: norm.as_slice(),
            boundary: boundary.as_slice(),
        };
        let name_start = path
            .orig
            .iter()
            .rposition(|&c| c == '/')
            .map_or(0, |slash| slash + 1);
        let name = path.slice(name_start, path.orig.len());
        let mut best = Best {
            score: None,
            positions: best,
        };

        let found = walk(&self.raw, &name, 0, trial);
        best.consider(found, FILENAME_WEIGHT, trial, |p| p + name_start);
        let found = walk(&self.raw, &path, 0, trial);
        best.consider(found, PATH_WEIGHT, trial, |p| p);
        let found = self.score_segments(&path, segments, trial, joined);
        best.consider(found, 1.0, joined, |p| p);

        if !self.stripped.is_empty() {
            stripped.fill(&path);
            // The file name is a suffix of the path, so its projection is a
            // suffix of the path's projection.
            let split = stripped.source.partition_point(|&i| i < name_start);

            let found = walk(&self.stripped, &stripped.view(split), 0, trial);
            best.consider(found, STRIPPED_FILENAME_WEIGHT, trial, |p| {
                stripped.source[split + p]
            });
            let found = walk(&self.stripped, &stripped.view(0), 0, trial);
            best.consider(found, PATH_WEIGHT, trial, |p| stripped.source[p]);
        }

        let score = best.score?;
        Some(Match::new(
            candidate,
            score * file_type_weight(candidate),
            best.positions.clone(),
        ))
    }

    /// Whether the query's alphanumeric characters occur in order in
    /// `candidate`. Every pass needs that, so a candidate failing it cannot
    /// match at all.
    fn may_match(&self, candidate: &str) -> bool {
        let mut needed = self.stripped.iter();
        let mut next = needed.next();
        for c in candidate.chars() {
            let Some(&wanted) = next else {
                break;
            };
            if self.scorer.fold(c) == wanted {
                next = needed.next();
            }
        }
        next.is_none()
    }

    /// Matches query parts against path segments in order. Parts may share a
    /// segment as long as their positions keep increasing. The matched
    /// positions are left in `joined`.
    fn score_segments(
        &self,
        path: &View<'_>,
        segments: &mut Vec<(usize, usize)>,
        trial: &mut Vec<usize>,
        joined: &mut Vec<usize>,
    ) -> Option<f64> {
        joined.clear();
        if self.parts.is_empty() {
            return None;
        }

        segments.clear();
        let mut start = 0;
        for (i, &c) in path.orig.iter().enumerate() {
            if c == '/' {
                if i > start {
                    segments.push((start, i));
                }
                start = i + 1;
            }
        }
        if start < path.orig.len() {
            segments.push((start, path.orig.len()));
        }
        let last_segment = segments.len().checked_sub(1)?;

        let mut total = 0.0;
        let mut seg_idx = 0;
        let mut from = 0;

        for part in &self.parts {
            loop {
                let &(seg_start, seg_end) = segments.get(seg_idx)?;
                let segment = path.slice(seg_start, seg_end);
                if let Some(score) = walk(part, &segment, from, trial) {
                    let weight = if seg_idx == last_segment {
                        LAST_SEGMENT_WEIGHT
                    } else {
                        1.0
                    };
                    total += score * weight;
                    from = trial[trial.len() - 1] + 1;
                    joined.extend(trial.iter().map(|&p| p + seg_start));
                    break;
                }
                seg_idx += 1;
                from = 0;
            }
        }

        Some(total)
    }
}
