//! Text-editor-style convenience surface.
//!
//! A thin per-file API over the same primitives the instruction executor
//! uses: view a range, create a file, replace a uniquely-occurring block,
//! insert at a line, undo the last edit. Each call returns the resulting
//! content or a structured error; nothing falls back silently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{EditError, Result};
use crate::matcher::{self, MatchFailure, SearchSpec};
use crate::undo::UndoStack;

pub struct TextEditor {
    root: Option<PathBuf>,
    undo: UndoStack,
}

impl TextEditor {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            undo: UndoStack::new(),
        }
    }

    /// File content, optionally restricted to a 1-based inclusive line range.
    pub fn view(&self, path: &Path, range: Option<(usize, usize)>) -> Result<String> {
        let full = self.full_path(path);
        let content = fs::read_to_string(&full).map_err(|e| EditError::io(&full, e))?;
        match range {
            None => Ok(content),
            Some((from, to)) => {
                let lines: Vec<&str> = content.lines().collect();
                if from == 0 || from > to || to > lines.len() {
                    return Err(invalid_range(&full, from, to, lines.len()));
                }
                let mut slice = lines[from - 1..to].join("\n");
                slice.push('\n');
                Ok(slice)
            }
        }
    }

    /// Create a new file. Fails if the path already exists.
    pub fn create(&mut self, path: &Path, content: &str) -> Result<()> {
        let full = self.full_path(path);
        if full.exists() {
            return Err(EditError::io(
                &full,
                io::Error::new(io::ErrorKind::AlreadyExists, "file already exists"),
            ));
        }
        self.undo.snapshot(&full, None);
        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| EditError::io(&full, e))?;
            }
        }
        fs::write(&full, content.as_bytes()).map_err(|e| EditError::io(&full, e))?;
        Ok(())
    }

    /// Replace the unique occurrence of `old` with `new`. Zero occurrences
    /// is a no-match error; several without further context are ambiguous.
    pub fn replace(&mut self, path: &Path, old: &str, new: &str) -> Result<String> {
        let full = self.full_path(path);
        let content = fs::read_to_string(&full).map_err(|e| EditError::io(&full, e))?;
        let lines: Vec<String> = content.lines().map(String::from).collect();

        let anchor: Vec<String> = old.lines().map(String::from).collect();
        let spec = SearchSpec::Block(anchor);
        let location = matcher::resolve(&lines, &spec).map_err(|failure| match failure {
            MatchFailure::NotFound => EditError::NoMatch {
                path: full.clone(),
                anchor: spec.describe(),
                hint: old
                    .lines()
                    .next()
                    .and_then(|line| matcher::nearest_line(&lines, line))
                    .map(|(n, text)| format!("closest is line {n}: {:?}", text.trim())),
            },
            MatchFailure::Ambiguous { candidates } => EditError::AmbiguousMatch {
                path: full.clone(),
                candidates,
            },
        })?;

        let mut result: Vec<String> = Vec::with_capacity(lines.len());
        result.extend_from_slice(&lines[..location.start_line]);
        result.extend(new.lines().map(String::from));
        result.extend_from_slice(&lines[location.end_line..]);

        let mut new_content = result.join("\n");
        new_content.push('\n');
        self.write_with_snapshot(&full, Some(content), &new_content)?;
        Ok(new_content)
    }

    /// Insert `content` after the 1-based `line` (0 inserts at the top).
    pub fn insert(&mut self, path: &Path, line: usize, content: &str) -> Result<String> {
        let full = self.full_path(path);
        let previous = fs::read_to_string(&full).map_err(|e| EditError::io(&full, e))?;
        let mut lines: Vec<String> = previous.lines().map(String::from).collect();
        if line > lines.len() {
            return Err(invalid_range(&full, line, line, lines.len()));
        }

        let inserted: Vec<String> = content.lines().map(String::from).collect();
        lines.splice(line..line, inserted);

        let mut new_content = lines.join("\n");
        new_content.push('\n');
        self.write_with_snapshot(&full, Some(previous), &new_content)?;
        Ok(new_content)
    }

    /// Revert the last edit made through this editor. Returns the restored
    /// content, or `None` if the undo removed a created file.
    pub fn undo(&mut self, path: &Path) -> Result<Option<String>> {
        let full = self.full_path(path);
        let entry = self.undo.undo(&full)?;
        match entry.previous_content {
            Some(content) => {
                fs::write(&full, content.as_bytes()).map_err(|e| EditError::io(&full, e))?;
                Ok(Some(content))
            }
            None => {
                fs::remove_file(&full).map_err(|e| EditError::io(&full, e))?;
                Ok(None)
            }
        }
    }

    fn write_with_snapshot(
        &mut self,
        full: &Path,
        previous: Option<String>,
        content: &str,
    ) -> Result<()> {
        self.undo.snapshot(full, previous);
        fs::write(full, content.as_bytes()).map_err(|e| EditError::io(full, e))
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        }
    }
}

fn invalid_range(path: &Path, from: usize, to: usize, len: usize) -> EditError {
    EditError::io(
        path,
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("line range {from}..{to} out of bounds for {len} line(s)"),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn editor(root: &TempDir) -> TextEditor {
        TextEditor::new(Some(root.path().to_path_buf()))
    }

    #[test]
    fn test_create_then_view() {
        let root = TempDir::new().unwrap();
        let mut ed = editor(&root);
        ed.create(Path::new("a.py"), "def hello():\n    print('hi')\n")
            .unwrap();
        assert_eq!(
            ed.view(Path::new("a.py"), None).unwrap(),
            "def hello():\n    print('hi')\n"
        );
        assert_eq!(
            ed.view(Path::new("a.py"), Some((1, 1))).unwrap(),
            "def hello():\n"
        );
    }

    #[test]
    fn test_view_range_out_of_bounds() {
        let root = TempDir::new().unwrap();
        let mut ed = editor(&root);
        ed.create(Path::new("a.py"), "one\n").unwrap();
        let err = ed.view(Path::new("a.py"), Some((1, 5))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_replace_unique_occurrence() {
        let root = TempDir::new().unwrap();
        let mut ed = editor(&root);
        ed.create(Path::new("a.py"), "print('Hello, World!')\n")
            .unwrap();
        let content = ed
            .replace(
                Path::new("a.py"),
                "print('Hello, World!')",
                "print('Hello, editor!')",
            )
            .unwrap();
        assert_eq!(content, "print('Hello, editor!')\n");
    }

    #[test]
    fn test_replace_ambiguous_refused() {
        let root = TempDir::new().unwrap();
        let mut ed = editor(&root);
        ed.create(Path::new("a.py"), "x = 1\ny = 2\nx = 1\n").unwrap();
        let err = ed.replace(Path::new("a.py"), "x = 1", "x = 3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        // Untouched on failure.
        assert_eq!(
            ed.view(Path::new("a.py"), None).unwrap(),
            "x = 1\ny = 2\nx = 1\n"
        );
    }

    #[test]
    fn test_insert_at_top_and_middle() {
        let root = TempDir::new().unwrap();
        let mut ed = editor(&root);
        ed.create(Path::new("a.py"), "first\nsecond\n").unwrap();
        ed.insert(Path::new("a.py"), 0, "# header").unwrap();
        let content = ed.insert(Path::new("a.py"), 2, "between").unwrap();
        assert_eq!(content, "# header\nfirst\nbetween\nsecond\n");
    }

    #[test]
    fn test_undo_walks_back_edits() {
        let root = TempDir::new().unwrap();
        let mut ed = editor(&root);
        ed.create(Path::new("a.py"), "v1\n").unwrap();
        ed.replace(Path::new("a.py"), "v1", "v2").unwrap();
        ed.replace(Path::new("a.py"), "v2", "v3").unwrap();

        assert_eq!(ed.undo(Path::new("a.py")).unwrap().as_deref(), Some("v2\n"));
        assert_eq!(ed.undo(Path::new("a.py")).unwrap().as_deref(), Some("v1\n"));
        // Undoing the create removes the file entirely.
        assert_eq!(ed.undo(Path::new("a.py")).unwrap(), None);
        assert!(!root.path().join("a.py").exists());

        let err = ed.undo(Path::new("a.py")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NothingToUndo);
    }
}
