use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed instruction text. Fatal to the whole parse: no partial tree is
/// ever returned alongside one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line number in the instruction text.
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Every failure mode of the edit pipeline.
///
/// Errors are returned as values, never printed-and-swallowed: misapplied
/// textual edits corrupt source files, so the executor refuses to guess past
/// any of these.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Well-formed tree with unsupported or incomplete semantics.
    #[error("cannot interpret `{statement}`: {message}")]
    Interpret { statement: String, message: String },

    /// The search anchor does not occur in the target content.
    #[error("no match in {}: anchor starting with {:?} not found{}", .path.display(), first_line(.anchor), hint_suffix(.hint))]
    NoMatch {
        path: PathBuf,
        /// The full anchor text, newline-joined, for diagnosis.
        anchor: String,
        /// Closest line in the file, when one resembles the anchor.
        hint: Option<String>,
    },

    /// The search anchor occurs more than once and nothing narrows it down.
    #[error("ambiguous match in {}: anchor found at lines {}", .path.display(), join_lines(.candidates))]
    AmbiguousMatch {
        path: PathBuf,
        /// 1-based line numbers of every candidate location.
        candidates: Vec<usize>,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("nothing to undo for {}", .path.display())]
    NothingToUndo { path: PathBuf },
}

impl EditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::Interpret { .. } => ErrorKind::Interpret,
            Self::NoMatch { .. } => ErrorKind::NoMatch,
            Self::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Self::Io { .. } => ErrorKind::Io,
            Self::NothingToUndo { .. } => ErrorKind::NothingToUndo,
        }
    }
}

/// Stable classification of an [`EditError`], exposed in reports and mapped
/// to process exit codes by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Interpret,
    NoMatch,
    AmbiguousMatch,
    Io,
    NothingToUndo,
}

impl ErrorKind {
    /// Exit codes: 0 is success, 1 is reserved for unclassified failures.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Parse => 2,
            Self::Interpret => 3,
            Self::NoMatch => 4,
            Self::AmbiguousMatch => 5,
            Self::Io => 6,
            Self::NothingToUndo => 7,
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;

fn first_line(anchor: &str) -> &str {
    anchor.lines().next().unwrap_or("")
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" ({h})"),
        None => String::new(),
    }
}

fn join_lines(candidates: &[usize]) -> String {
    candidates
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
