//! Post-edit syntax validation.
//!
//! A language-aware black-box checker: given a path, it reports whether the
//! file parses, with line/column detail when it does not. The edit pipeline
//! itself stays purely textual; this runs after the fact, on request.
//!
//! Supported: Rust (`syn`), JSON (`serde_json`), YAML (`serde_yaml`). Other
//! extensions are skipped, not failed.

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::error::{EditError, Result};

/// One syntax problem, with enough position detail to show a caret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxError {
    pub path: String,
    /// 1-based; 0 when the checker gave no position.
    pub line: usize,
    /// 1-based column within the line; 0 when unknown.
    pub column: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_line: Option<String>,
    /// Caret line aligned under `code_line`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub syntax_errors: Vec<SyntaxError>,
}

impl ValidationResult {
    fn valid() -> Self {
        Self {
            is_valid: true,
            error_message: None,
            syntax_errors: Vec::new(),
        }
    }

    fn invalid(errors: Vec<SyntaxError>) -> Self {
        let message = errors.first().map(|e| {
            if e.line > 0 {
                format!("{}:{}:{}: {}", e.path, e.line, e.column, e.message)
            } else {
                format!("{}: {}", e.path, e.message)
            }
        });
        Self {
            is_valid: false,
            error_message: message,
            syntax_errors: errors,
        }
    }
}

/// Counters for a validation sweep. Owned and returned to the caller; the
/// validator keeps no state between calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    pub files_checked: usize,
    pub files_valid: usize,
    pub files_invalid: usize,
    pub files_skipped: usize,
}

impl ValidationStats {
    pub fn record(&mut self, result: Option<&ValidationResult>) {
        match result {
            None => self.files_skipped += 1,
            Some(r) => {
                self.files_checked += 1;
                if r.is_valid {
                    self.files_valid += 1;
                } else {
                    self.files_invalid += 1;
                }
            }
        }
    }
}

/// Does the validator know this file type?
pub fn is_supported(path: &Path) -> bool {
    matches!(
        extension(path).as_deref(),
        Some("rs" | "json" | "yml" | "yaml")
    )
}

/// Validate one file. Returns `None` for unsupported extensions.
pub fn validate_path(path: &Path) -> Result<Option<ValidationResult>> {
    if !is_supported(path) {
        return Ok(None);
    }
    let source = fs::read_to_string(path).map_err(|e| EditError::io(path, e))?;
    Ok(validate_content(path, &source))
}

/// Validate in-memory content as if it lived at `path` (the extension picks
/// the checker). Returns `None` for unsupported extensions.
pub fn validate_content(path: &Path, source: &str) -> Option<ValidationResult> {
    let ext = extension(path)?;
    match ext.as_str() {
        "rs" => Some(validate_rust(path, source)),
        "json" => Some(validate_json(path, source)),
        "yml" | "yaml" => Some(validate_yaml(path, source)),
        _ => None,
    }
}

fn validate_rust(path: &Path, source: &str) -> ValidationResult {
    match syn::parse_file(source) {
        Ok(_) => ValidationResult::valid(),
        Err(err) => {
            let start = err.span().start();
            ValidationResult::invalid(vec![syntax_error(
                path,
                source,
                start.line,
                start.column + 1,
                err.to_string(),
            )])
        }
    }
}

fn validate_json(path: &Path, source: &str) -> ValidationResult {
    match serde_json::from_str::<serde_json::Value>(source) {
        Ok(_) => ValidationResult::valid(),
        Err(err) => ValidationResult::invalid(vec![syntax_error(
            path,
            source,
            err.line(),
            err.column(),
            err.to_string(),
        )]),
    }
}

fn validate_yaml(path: &Path, source: &str) -> ValidationResult {
    match serde_yaml::from_str::<serde_yaml::Value>(source) {
        Ok(_) => ValidationResult::valid(),
        Err(err) => {
            let (line, column) = err
                .location()
                .map(|loc| (loc.line(), loc.column()))
                .unwrap_or((0, 0));
            ValidationResult::invalid(vec![syntax_error(
                path,
                source,
                line,
                column,
                err.to_string(),
            )])
        }
    }
}

fn syntax_error(
    path: &Path,
    source: &str,
    line: usize,
    column: usize,
    message: String,
) -> SyntaxError {
    let code_line = line
        .checked_sub(1)
        .and_then(|idx| source.lines().nth(idx))
        .map(str::to_string);
    let pointer = code_line.as_ref().and_then(|_| {
        column
            .checked_sub(1)
            .map(|pad| format!("{}^", " ".repeat(pad)))
    });
    SyntaxError {
        path: path.display().to_string(),
        line,
        column,
        message,
        code_line,
        pointer,
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}
