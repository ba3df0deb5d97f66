use similar::{ChangeTag, TextDiff};
use std::path::Path;

/// Statistics about one or more diffs
#[derive(Debug, Default)]
pub struct DiffStats {
    pub files_changed: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl DiffStats {
    pub fn add(&mut self, other: &DiffStats) {
        self.files_changed += other.files_changed;
        self.lines_added += other.lines_added;
        self.lines_removed += other.lines_removed;
    }

    pub fn print_summary(&self) {
        println!("\nSummary:");
        println!("Files changed: {}", self.files_changed);
        println!("Lines added: {}", self.lines_added);
        println!("Lines removed: {}", self.lines_removed);
    }
}

/// Generate a unified diff between original and modified content.
///
/// Returns the diff text (with `---`/`+++` headers naming `path`) and the
/// change statistics.
pub fn generate_unified_diff(
    path: &Path,
    original: &str,
    modified: &str,
    context_lines: usize,
) -> (String, DiffStats) {
    let diff = TextDiff::from_lines(original, modified);

    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.lines_added += 1,
            ChangeTag::Delete => stats.lines_removed += 1,
            ChangeTag::Equal => {}
        }
    }
    if stats.lines_added > 0 || stats.lines_removed > 0 {
        stats.files_changed = 1;
    }

    let path_str = path.display().to_string();
    let mut output = format!("--- {path_str}\n+++ {path_str}\n");
    output.push_str(
        &diff
            .unified_diff()
            .context_radius(context_lines)
            .to_string(),
    );

    (output, stats)
}

/// Print a unified diff to stdout when there are changes; returns the stats
/// either way.
pub fn print_diff(path: &Path, original: &str, modified: &str) -> DiffStats {
    let (output, stats) = generate_unified_diff(path, original, modified, 3);
    if stats.files_changed > 0 {
        print!("{output}");
    }
    stats
}
