//! Textual search engine that locates an anchor inside source content.
//!
//! Strategies are tried strictest-first and the first one that produces any
//! candidate wins. Matching is purely line-based; the engine never inspects
//! language syntax.

use log::debug;
use serde::Serialize;

/// How a candidate was found, in decreasing strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Anchor lines equal a contiguous source run, whitespace included.
    Exact,
    /// Per-line comparison with leading/trailing whitespace stripped.
    WhitespaceNormalized,
    /// Start run plus the next subsequent end run bound the region.
    ContextBounded,
}

/// A search anchor: one literal block, or a start/end context pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchSpec {
    Block(Vec<String>),
    Context { start: Vec<String>, end: Vec<String> },
}

impl SearchSpec {
    /// The anchor rendered for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            SearchSpec::Block(lines) => lines.join("\n"),
            SearchSpec::Context { start, end } => {
                format!("{}\n...\n{}", start.join("\n"), end.join("\n"))
            }
        }
    }
}

/// One candidate location. Line fields are 0-based; `end_line` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub start_line: usize,
    pub end_line: usize,
    /// Sub-span rewritten when `preserve_context` is requested: the interior
    /// of a block anchor, or everything after the start run of a context
    /// pair (through the end run inclusive).
    pub interior_start: usize,
    pub interior_end: usize,
    pub strategy: MatchStrategy,
    pub is_ambiguous: bool,
    pub candidate_count: usize,
}

/// Why an anchor failed to resolve to exactly one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFailure {
    NotFound,
    /// 1-based start lines of every candidate.
    Ambiguous { candidates: Vec<usize> },
}

/// Find all candidate locations for `spec` inside `source`.
///
/// Returns the candidates of the first (strictest) strategy that produced
/// any; each result carries the total candidate count and the ambiguity flag.
pub fn find(source: &[String], spec: &SearchSpec) -> Vec<MatchResult> {
    let raw = match spec {
        SearchSpec::Block(lines) => {
            let exact = find_runs(source, lines, 0, compare_exact);
            if !exact.is_empty() {
                debug!("anchor matched exactly at {} location(s)", exact.len());
                tag_block(exact, lines.len(), MatchStrategy::Exact)
            } else {
                let normalized = find_runs(source, lines, 0, compare_normalized);
                debug!(
                    "anchor matched whitespace-normalized at {} location(s)",
                    normalized.len()
                );
                tag_block(normalized, lines.len(), MatchStrategy::WhitespaceNormalized)
            }
        }
        SearchSpec::Context { start, end } => find_context(source, start, end),
    };

    let count = raw.len();
    raw.into_iter()
        .map(|mut m| {
            m.candidate_count = count;
            m.is_ambiguous = count > 1;
            m
        })
        .collect()
}

/// Resolve `spec` to exactly one location, or report why that is impossible.
pub fn resolve(source: &[String], spec: &SearchSpec) -> Result<MatchResult, MatchFailure> {
    let matches = find(source, spec);
    match matches.len() {
        0 => Err(MatchFailure::NotFound),
        1 => Ok(matches[0]),
        _ => Err(MatchFailure::Ambiguous {
            candidates: matches.iter().map(|m| m.start_line + 1).collect(),
        }),
    }
}

/// The source line most similar to `anchor_line`, for no-match diagnostics.
/// Returns the 1-based line number and its text.
pub fn nearest_line(source: &[String], anchor_line: &str) -> Option<(usize, String)> {
    let needle = anchor_line.trim();
    if needle.is_empty() {
        return None;
    }
    source
        .iter()
        .enumerate()
        .map(|(i, line)| (strsim::jaro_winkler(needle, line.trim()), i, line))
        .filter(|(score, _, _)| *score > 0.75)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, i, line)| (i + 1, line.clone()))
}

fn compare_exact(source_line: &str, anchor_line: &str) -> bool {
    source_line == anchor_line
}

fn compare_normalized(source_line: &str, anchor_line: &str) -> bool {
    source_line.trim() == anchor_line.trim()
}

/// Start indices of every run in `source` (from `from`) matching `anchor`
/// line-for-line under `cmp`.
fn find_runs(
    source: &[String],
    anchor: &[String],
    from: usize,
    cmp: fn(&str, &str) -> bool,
) -> Vec<usize> {
    if anchor.is_empty() || source.len() < anchor.len() {
        return Vec::new();
    }
    let mut hits = Vec::new();
    for i in from..=source.len() - anchor.len() {
        if anchor.iter().enumerate().all(|(j, a)| cmp(&source[i + j], a)) {
            hits.push(i);
        }
    }
    hits
}

/// First run at or after `from`, trying exact comparison before normalized.
fn find_first_run(source: &[String], anchor: &[String], from: usize) -> Option<usize> {
    find_runs(source, anchor, from, compare_exact)
        .into_iter()
        .next()
        .or_else(|| {
            find_runs(source, anchor, from, compare_normalized)
                .into_iter()
                .next()
        })
}

fn tag_block(starts: Vec<usize>, len: usize, strategy: MatchStrategy) -> Vec<MatchResult> {
    starts
        .into_iter()
        .map(|start| MatchResult {
            start_line: start,
            end_line: start + len,
            // Interior of a block anchor: first and last matched lines kept.
            interior_start: (start + 1).min(start + len),
            interior_end: (start + len).saturating_sub(1).max(start + 1),
            strategy,
            is_ambiguous: false,
            candidate_count: 0,
        })
        .collect()
}

fn find_context(source: &[String], start: &[String], end: &[String]) -> Vec<MatchResult> {
    let mut starts = find_runs(source, start, 0, compare_exact);
    if starts.is_empty() {
        starts = find_runs(source, start, 0, compare_normalized);
    }

    let mut results = Vec::new();
    for s in starts {
        let after_start = s + start.len();
        if let Some(e) = find_first_run(source, end, after_start) {
            debug!(
                "context anchor: start at line {}, end at line {}",
                s + 1,
                e + 1
            );
            results.push(MatchResult {
                start_line: s,
                end_line: e + end.len(),
                // Keep the start run; rewrite through the end run.
                interior_start: after_start,
                interior_end: e + end.len(),
                strategy: MatchStrategy::ContextBounded,
                is_ambiguous: false,
                candidate_count: 0,
            });
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    #[test]
    fn test_exact_match_single() {
        let source = lines("def f():\n    pass\ndef g():\n    return 1\n");
        let spec = SearchSpec::Block(lines("def g():\n    return 1"));
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start_line, 2);
        assert_eq!(matches[0].end_line, 4);
        assert_eq!(matches[0].strategy, MatchStrategy::Exact);
        assert!(!matches[0].is_ambiguous);
    }

    #[test]
    fn test_whitespace_normalized_fallback() {
        let source = lines("def f():\n        pass\n");
        let spec = SearchSpec::Block(lines("def f():\n    pass"));
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].strategy, MatchStrategy::WhitespaceNormalized);
    }

    #[test]
    fn test_exact_preferred_over_normalized() {
        // Both an exact and a looser occurrence exist; only the exact one is
        // reported because the stricter strategy already succeeded.
        let source = lines("    pass\n        pass\n");
        let spec = SearchSpec::Block(vec!["    pass".to_string()]);
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start_line, 0);
        assert_eq!(matches[0].strategy, MatchStrategy::Exact);
    }

    #[test]
    fn test_ambiguous_duplicate_anchor() {
        let source = lines("def f():\n    pass\ndef g():\n    pass\n");
        let spec = SearchSpec::Block(vec!["    pass".to_string()]);
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.is_ambiguous));
        assert!(matches.iter().all(|m| m.candidate_count == 2));

        let failure = resolve(&source, &spec).unwrap_err();
        assert_eq!(
            failure,
            MatchFailure::Ambiguous {
                candidates: vec![2, 4]
            }
        );
    }

    #[test]
    fn test_context_bounded_match() {
        let source = lines("def f():\n    a()\n    b()\n    c()\ndef g():\n    pass\n");
        let spec = SearchSpec::Context {
            start: vec!["def f():".to_string()],
            end: vec!["    c()".to_string()],
        };
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 1);
        let m = matches[0];
        assert_eq!(m.start_line, 0);
        assert_eq!(m.end_line, 4);
        assert_eq!(m.interior_start, 1);
        assert_eq!(m.interior_end, 4);
        assert_eq!(m.strategy, MatchStrategy::ContextBounded);
    }

    #[test]
    fn test_context_end_must_follow_start() {
        let source = lines("    c()\ndef f():\n    a()\n");
        let spec = SearchSpec::Context {
            start: vec!["def f():".to_string()],
            end: vec!["    c()".to_string()],
        };
        // The only end run precedes the start run, so nothing matches.
        assert!(find(&source, &spec).is_empty());
    }

    #[test]
    fn test_context_narrows_duplicate_starts() {
        let source = lines("def f():\n    pass\ndef f():\n    done()\n");
        let spec = SearchSpec::Context {
            start: vec!["def f():".to_string()],
            end: vec!["    done()".to_string()],
        };
        // Both starts find an end (the second one), so two overlapping
        // candidates remain and the result is still ambiguous.
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 2);
        assert!(matches[0].is_ambiguous);
    }

    #[test]
    fn test_not_found() {
        let source = lines("line one\nline two\n");
        let spec = SearchSpec::Block(vec!["missing".to_string()]);
        assert!(find(&source, &spec).is_empty());
        assert_eq!(resolve(&source, &spec).unwrap_err(), MatchFailure::NotFound);
    }

    #[test]
    fn test_nearest_line_hint() {
        let source = lines("def handle_request(self):\n    return None\n");
        let hit = nearest_line(&source, "def handle_requests(self):");
        assert_eq!(hit, Some((1, "def handle_request(self):".to_string())));
        assert_eq!(nearest_line(&source, "совершенно другое"), None);
    }

    #[test]
    fn test_multi_line_anchor_no_overlap_confusion() {
        let source = lines("a\nb\na\nb\n");
        let spec = SearchSpec::Block(lines("a\nb"));
        let matches = find(&source, &spec);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].start_line, 0);
        assert_eq!(matches[1].start_line, 2);
    }
}
