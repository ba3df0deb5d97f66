//! Orchestrates an instruction list against the filesystem.
//!
//! The executor parses and interprets instruction text, then applies the
//! operations strictly in declaration order. Text operations against one
//! file share a single in-memory buffer and the file is written once.
//! Execution halts on the first unrecoverable error; nothing is retried and
//! no weaker match is ever substituted silently.

use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{EditError, ErrorKind, Result};
use crate::instruction::{self, FileOperation, Instruction, TextOperation};
use crate::matcher::{self, MatchFailure, SearchSpec};
use crate::modifier;
use crate::parser;
use crate::undo::UndoStack;
use crate::validate::{self, ValidationResult};

/// Markers delimiting the executable portion of agent output. Text outside
/// the pair is narrative and ignored.
pub const BEGIN_MARKER: &str = "BEGIN_INSTRUCTIONS";
pub const END_MARKER: &str = "END_INSTRUCTIONS";

/// Extract the instruction text from `text`. Without markers the whole input
/// is taken to be instructions. Parse error line numbers are relative to the
/// extracted region.
pub fn extract_instructions(text: &str) -> &str {
    let Some(begin) = text.find(BEGIN_MARKER) else {
        return text;
    };
    let after = &text[begin + BEGIN_MARKER.len()..];
    match after.find(END_MARKER) {
        Some(end) => &after[..end],
        None => after,
    }
}

/// Execution phases, in order. Terminal states are `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecState {
    Parsing,
    Interpreting,
    Resolving,
    Applying,
    Validating,
    Done,
    Failed,
}

/// One successfully applied operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome {
    pub index: usize,
    pub operation: String,
    pub path: PathBuf,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

/// Structured result handed back to the calling agent layer.
#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    pub state: ExecState,
    pub applied: Vec<OperationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<ExecState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.state == ExecState::Done
    }

    fn done(applied: Vec<OperationOutcome>) -> Self {
        Self {
            state: ExecState::Done,
            applied,
            failed_at: None,
            failed_in: None,
            error: None,
            error_kind: None,
        }
    }

    fn failed(
        phase: ExecState,
        applied: Vec<OperationOutcome>,
        failed_at: Option<usize>,
        err: &EditError,
    ) -> Self {
        Self {
            state: ExecState::Failed,
            applied,
            failed_at,
            failed_in: Some(phase),
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
        }
    }
}

/// A file the executor changed (or would change, in dry-run mode).
#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    pub path: PathBuf,
    /// `None` when the file did not exist before.
    pub before: Option<String>,
    /// `None` when the operation removed the file.
    pub after: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Root that instruction paths are resolved against.
    pub target_root: Option<PathBuf>,
    /// Write changes to disk. Off by default: dry-run computes every
    /// mutation against an in-memory overlay and touches nothing.
    pub apply: bool,
    /// Run the syntax validator over modified content after applying.
    pub validate: bool,
}

pub struct InstructionExecutor {
    options: ExecutorOptions,
    undo: UndoStack,
    /// Logical file content overriding disk, so later instructions observe
    /// earlier effects even in dry-run mode.
    overlay: HashMap<PathBuf, Option<String>>,
    mutations: Vec<Mutation>,
}

impl InstructionExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            undo: UndoStack::new(),
            overlay: HashMap::new(),
            mutations: Vec::new(),
        }
    }

    /// Every file change this executor performed, in order.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Parse, interpret, and apply instruction text (envelope-aware).
    pub fn execute(&mut self, text: &str) -> ExecutionReport {
        let body = extract_instructions(text);

        let doc = match parser::parse(body) {
            Ok(doc) => doc,
            Err(err) => {
                return ExecutionReport::failed(ExecState::Parsing, Vec::new(), None, &err.into());
            }
        };

        let instructions = match instruction::interpret(&doc) {
            Ok(ops) => ops,
            Err(err) => {
                return ExecutionReport::failed(ExecState::Interpreting, Vec::new(), None, &err);
            }
        };

        self.run(&instructions)
    }

    /// Apply already-interpreted instructions in declaration order.
    pub fn run(&mut self, instructions: &[Instruction]) -> ExecutionReport {
        let mut applied = Vec::new();
        for (index, instr) in instructions.iter().enumerate() {
            debug!("applying instruction {index}: {}", instr.label());
            match self.apply_instruction(index, instr) {
                Ok(outcome) => applied.push(outcome),
                Err(err) => {
                    return ExecutionReport::failed(
                        ExecState::Applying,
                        applied,
                        Some(index),
                        &err,
                    );
                }
            }
        }

        if self.options.validate {
            for outcome in &mut applied {
                let Some(Some(content)) = self.overlay.get(&outcome.path) else {
                    continue;
                };
                outcome.validation = validate::validate_content(&outcome.path, content);
            }
        }

        ExecutionReport::done(applied)
    }

    /// Revert the most recent applied mutation of `path` on disk.
    pub fn undo(&mut self, path: &Path) -> Result<()> {
        let full = self.resolve_path(path);
        let entry = self.undo.undo(&full)?;
        match entry.previous_content {
            Some(content) => {
                fs::write(&full, content.as_bytes()).map_err(|e| EditError::io(&full, e))?;
                self.overlay.insert(full, Some(content));
            }
            None => {
                fs::remove_file(&full).map_err(|e| EditError::io(&full, e))?;
                self.overlay.insert(full, None);
            }
        }
        Ok(())
    }

    fn apply_instruction(&mut self, index: usize, instr: &Instruction) -> Result<OperationOutcome> {
        match instr {
            Instruction::File(op) => self.apply_file_operation(index, op),
            Instruction::Modify {
                path,
                reason,
                changes,
            } => self.apply_modify(index, path, reason.clone(), changes),
        }
    }

    fn apply_file_operation(&mut self, index: usize, op: &FileOperation) -> Result<OperationOutcome> {
        match op {
            FileOperation::Create {
                path,
                content,
                reason,
            } => {
                let full = self.resolve_path(path);
                if self.exists(&full) {
                    return Err(already_exists(&full));
                }
                self.write(&full, content.clone())?;
                Ok(self.outcome(
                    index,
                    "create",
                    full,
                    format!("created ({} line(s))", content.lines().count()),
                    reason.clone(),
                ))
            }
            FileOperation::Replace {
                path,
                content,
                reason,
            } => {
                let full = self.resolve_path(path);
                if !self.exists(&full) {
                    return Err(not_found(&full));
                }
                self.write(&full, content.clone())?;
                Ok(self.outcome(
                    index,
                    "replace",
                    full,
                    format!("replaced ({} line(s))", content.lines().count()),
                    reason.clone(),
                ))
            }
            FileOperation::Rename {
                source,
                target,
                reason,
            }
            | FileOperation::Move {
                source,
                target,
                reason,
            } => {
                let label = if matches!(op, FileOperation::Rename { .. }) {
                    "rename"
                } else {
                    "move"
                };
                let from = self.resolve_path(source);
                let to = self.resolve_path(target);
                if !self.exists(&from) {
                    return Err(not_found(&from));
                }
                if self.exists(&to) {
                    return Err(already_exists(&to));
                }
                let content = self.read(&from)?;
                self.write(&to, content)?;
                self.remove(&from)?;
                Ok(self.outcome(
                    index,
                    label,
                    to,
                    format!("{label}d from {}", from.display()),
                    reason.clone(),
                ))
            }
            FileOperation::Remove { path, reason } => {
                let full = self.resolve_path(path);
                if !self.exists(&full) {
                    return Err(not_found(&full));
                }
                self.remove(&full)?;
                Ok(self.outcome(index, "remove", full, "removed".to_string(), reason.clone()))
            }
        }
    }

    fn apply_modify(
        &mut self,
        index: usize,
        path: &Path,
        reason: Option<String>,
        changes: &[TextOperation],
    ) -> Result<OperationOutcome> {
        let full = self.resolve_path(path);
        if !self.exists(&full) {
            return Err(not_found(&full));
        }

        // One buffer for the whole statement: each change sees the effect of
        // the previous one, and the file is written exactly once.
        let content = self.read(&full)?;
        let mut lines: Vec<String> = content.lines().map(String::from).collect();

        for change in changes {
            let spec = search_spec(change);
            let location = matcher::resolve(&lines, &spec)
                .map_err(|failure| match_error(&full, &spec, &lines, failure))?;
            debug!(
                "matched lines {}..{} via {:?}",
                location.start_line + 1,
                location.end_line,
                location.strategy
            );
            lines = modifier::apply(&lines, &location, change);
        }

        let mut new_content = lines.join("\n");
        new_content.push('\n');
        self.write(&full, new_content)?;

        Ok(self.outcome(
            index,
            "modify",
            full,
            format!("{} change(s) applied", changes.len()),
            reason,
        ))
    }

    fn outcome(
        &self,
        index: usize,
        operation: &str,
        path: PathBuf,
        detail: String,
        reason: Option<String>,
    ) -> OperationOutcome {
        OperationOutcome {
            index,
            operation: operation.to_string(),
            path,
            detail,
            reason,
            validation: None,
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.options.target_root {
            Some(root) => root.join(path),
            None => path.to_path_buf(),
        }
    }

    fn exists(&self, full: &Path) -> bool {
        match self.overlay.get(full) {
            Some(entry) => entry.is_some(),
            None => full.exists(),
        }
    }

    fn read(&self, full: &Path) -> Result<String> {
        match self.overlay.get(full) {
            Some(Some(content)) => Ok(content.clone()),
            Some(None) => Err(not_found(full)),
            None => fs::read_to_string(full).map_err(|e| EditError::io(full, e)),
        }
    }

    /// Snapshot, then write. The snapshot is taken before the attempted
    /// mutation so a failed write never strands history.
    fn write(&mut self, full: &Path, content: String) -> Result<()> {
        let before = if self.exists(full) {
            Some(self.read(full)?)
        } else {
            None
        };

        if self.options.apply {
            self.undo.snapshot(full, before.clone());
            if let Some(parent) = full.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|e| EditError::io(full, e))?;
                }
            }
            fs::write(full, content.as_bytes()).map_err(|e| EditError::io(full, e))?;
        }

        self.overlay.insert(full.to_path_buf(), Some(content.clone()));
        self.mutations.push(Mutation {
            path: full.to_path_buf(),
            before,
            after: Some(content),
        });
        Ok(())
    }

    fn remove(&mut self, full: &Path) -> Result<()> {
        let before = self.read(full)?;

        if self.options.apply {
            self.undo.snapshot(full, Some(before.clone()));
            fs::remove_file(full).map_err(|e| EditError::io(full, e))?;
        }

        self.overlay.insert(full.to_path_buf(), None);
        self.mutations.push(Mutation {
            path: full.to_path_buf(),
            before: Some(before),
            after: None,
        });
        Ok(())
    }
}

fn search_spec(op: &TextOperation) -> SearchSpec {
    match op {
        TextOperation::ReplaceBlock {
            start_context,
            end_context: Some(end),
            ..
        } => SearchSpec::Context {
            start: start_context.clone(),
            end: end.clone(),
        },
        TextOperation::ReplaceBlock { start_context, .. } => {
            SearchSpec::Block(start_context.clone())
        }
        TextOperation::DeleteBlock { search } | TextOperation::AppendBlock { search, .. } => {
            SearchSpec::Block(search.clone())
        }
    }
}

fn match_error(
    path: &Path,
    spec: &SearchSpec,
    lines: &[String],
    failure: MatchFailure,
) -> EditError {
    match failure {
        MatchFailure::NotFound => {
            let first = match spec {
                SearchSpec::Block(anchor) => anchor.first(),
                SearchSpec::Context { start, .. } => start.first(),
            };
            let hint = first
                .and_then(|line| matcher::nearest_line(lines, line))
                .map(|(n, text)| format!("closest is line {n}: {:?}", text.trim()));
            EditError::NoMatch {
                path: path.to_path_buf(),
                anchor: spec.describe(),
                hint,
            }
        }
        MatchFailure::Ambiguous { candidates } => EditError::AmbiguousMatch {
            path: path.to_path_buf(),
            candidates,
        },
    }
}

fn not_found(path: &Path) -> EditError {
    EditError::io(
        path,
        io::Error::new(io::ErrorKind::NotFound, "file not found"),
    )
}

fn already_exists(path: &Path) -> EditError {
    EditError::io(
        path,
        io::Error::new(io::ErrorKind::AlreadyExists, "file already exists"),
    )
}
