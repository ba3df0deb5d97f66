//! Typed instruction model built from the parse tree.
//!
//! Statement names map to operations through an exact-match table; required
//! parameters are checked here, once, so execution never re-inspects strings.

use serde::Serialize;
use std::path::PathBuf;

use crate::error::{EditError, Result};
use crate::parser::{Document, Node, Value};

/// Statement names the interpreter accepts, used for exact dispatch and for
/// closest-candidate suggestions.
const KNOWN_STATEMENTS: &[&str] = &[
    "Create File",
    "Replace File",
    "Rename File",
    "Move File",
    "Remove File",
    "Modify File",
];

const KNOWN_CHANGES: &[&str] = &["Replace", "Delete", "Append"];

/// Whole-file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileOperation {
    Create {
        path: PathBuf,
        content: String,
        reason: Option<String>,
    },
    Replace {
        path: PathBuf,
        content: String,
        reason: Option<String>,
    },
    Rename {
        source: PathBuf,
        target: PathBuf,
        reason: Option<String>,
    },
    Move {
        source: PathBuf,
        target: PathBuf,
        reason: Option<String>,
    },
    Remove {
        path: PathBuf,
        reason: Option<String>,
    },
}

/// One block-scoped text operation inside a `Modify File` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextOperation {
    ReplaceBlock {
        start_context: Vec<String>,
        end_context: Option<Vec<String>>,
        new_content: Vec<String>,
        /// Absolute column to re-indent `new_content` to.
        indent: Option<usize>,
        preserve_context: bool,
    },
    DeleteBlock {
        search: Vec<String>,
    },
    AppendBlock {
        search: Vec<String>,
        new_content: Vec<String>,
    },
}

/// A resolved instruction, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    File(FileOperation),
    /// Text operations applied to one in-memory buffer, written once.
    Modify {
        path: PathBuf,
        reason: Option<String>,
        changes: Vec<TextOperation>,
    },
}

impl Instruction {
    /// Short operation label for reports and run metadata.
    pub fn label(&self) -> &'static str {
        match self {
            Instruction::File(FileOperation::Create { .. }) => "create",
            Instruction::File(FileOperation::Replace { .. }) => "replace",
            Instruction::File(FileOperation::Rename { .. }) => "rename",
            Instruction::File(FileOperation::Move { .. }) => "move",
            Instruction::File(FileOperation::Remove { .. }) => "remove",
            Instruction::Modify { .. } => "modify",
        }
    }

    /// The path the instruction primarily acts on (the target for renames).
    pub fn path(&self) -> &PathBuf {
        match self {
            Instruction::File(FileOperation::Create { path, .. })
            | Instruction::File(FileOperation::Replace { path, .. })
            | Instruction::File(FileOperation::Remove { path, .. }) => path,
            Instruction::File(FileOperation::Rename { target, .. })
            | Instruction::File(FileOperation::Move { target, .. }) => target,
            Instruction::Modify { path, .. } => path,
        }
    }
}

/// Interpret a parsed document into an ordered instruction list.
///
/// The first unsupported statement or missing parameter fails the whole
/// interpretation; prior statements are not partially returned.
pub fn interpret(doc: &Document) -> Result<Vec<Instruction>> {
    let mut instructions = Vec::with_capacity(doc.statements.len());
    for &sid in &doc.statements {
        let stmt = doc.node(sid);
        instructions.push(interpret_statement(doc, stmt)?);
    }
    Ok(instructions)
}

fn interpret_statement(doc: &Document, stmt: &Node) -> Result<Instruction> {
    let reason = stmt.scalar("reason").map(str::to_string);
    match stmt.name.as_str() {
        "Create File" => Ok(Instruction::File(FileOperation::Create {
            path: require_path(stmt, "name")?,
            content: require_content(stmt, "content")?,
            reason,
        })),
        "Replace File" => Ok(Instruction::File(FileOperation::Replace {
            path: require_path(stmt, "name")?,
            content: require_content(stmt, "content")?,
            reason,
        })),
        "Rename File" => Ok(Instruction::File(FileOperation::Rename {
            source: require_path(stmt, "name")?,
            target: require_path(stmt, "new_name")?,
            reason,
        })),
        "Move File" => Ok(Instruction::File(FileOperation::Move {
            source: require_path(stmt, "source")?,
            target: require_path(stmt, "target")?,
            reason,
        })),
        "Remove File" => Ok(Instruction::File(FileOperation::Remove {
            path: require_path(stmt, "name")?,
            reason,
        })),
        "Modify File" => interpret_modify(doc, stmt, reason),
        other => {
            let mut message = "unknown statement".to_string();
            if let Some(suggestion) = closest(other, KNOWN_STATEMENTS) {
                message.push_str(&format!(" (did you mean `{suggestion}`?)"));
            }
            Err(interpret_error(stmt, message))
        }
    }
}

fn interpret_modify(doc: &Document, stmt: &Node, reason: Option<String>) -> Result<Instruction> {
    let path = require_path(stmt, "name")?;

    let mut blocks = doc.children(stmt);
    let changes_block = match blocks.next() {
        Some(block) if block.name == "Changes" => block,
        Some(block) => {
            return Err(interpret_error(
                stmt,
                format!("expected a `Changes` block, found `{}`", block.name),
            ));
        }
        None => return Err(interpret_error(stmt, "missing `Changes` block")),
    };
    if let Some(extra) = blocks.next() {
        return Err(interpret_error(
            stmt,
            format!("unexpected extra block `{}` after `Changes`", extra.name),
        ));
    }

    let mut changes = Vec::new();
    for op in doc.children(changes_block) {
        changes.push(interpret_change(op)?);
    }
    if changes.is_empty() {
        return Err(interpret_error(stmt, "`Changes` block contains no operations"));
    }

    Ok(Instruction::Modify {
        path,
        reason,
        changes,
    })
}

fn interpret_change(op: &Node) -> Result<TextOperation> {
    match op.name.as_str() {
        "Replace" => Ok(TextOperation::ReplaceBlock {
            start_context: require_literal(op, "start_context")?,
            end_context: optional_literal(op, "end_context")?,
            new_content: require_literal(op, "new_content")?,
            indent: optional_usize(op, "indent")?,
            preserve_context: optional_bool(op, "preserve_context")?.unwrap_or(false),
        }),
        "Delete" => Ok(TextOperation::DeleteBlock {
            search: require_literal(op, "search")?,
        }),
        "Append" => Ok(TextOperation::AppendBlock {
            search: require_literal(op, "search")?,
            new_content: require_literal(op, "new_content")?,
        }),
        other => {
            let mut message = "unsupported change operation".to_string();
            if let Some(suggestion) = closest(other, KNOWN_CHANGES) {
                message.push_str(&format!(" (did you mean `{suggestion}`?)"));
            }
            Err(interpret_error(op, message))
        }
    }
}

fn interpret_error(node: &Node, message: impl Into<String>) -> EditError {
    EditError::Interpret {
        statement: format!("{} (line {})", node.name, node.line),
        message: message.into(),
    }
}

fn require_param<'a>(node: &'a Node, key: &str) -> Result<&'a Value> {
    node.param(key)
        .ok_or_else(|| interpret_error(node, format!("missing required parameter `{key}`")))
}

fn require_path(node: &Node, key: &str) -> Result<PathBuf> {
    let value = require_param(node, key)?;
    match value.as_scalar() {
        Some(s) if !s.is_empty() => Ok(PathBuf::from(s)),
        _ => Err(interpret_error(
            node,
            format!("parameter `{key}` must be a non-empty path"),
        )),
    }
}

fn require_content(node: &Node, key: &str) -> Result<String> {
    require_param(node, key)?
        .literal_text()
        .ok_or_else(|| interpret_error(node, format!("parameter `{key}` must be a literal block")))
}

fn require_literal(node: &Node, key: &str) -> Result<Vec<String>> {
    match require_param(node, key)?.as_literal() {
        Some(lines) => Ok(lines.to_vec()),
        None => Err(interpret_error(
            node,
            format!("parameter `{key}` must be a literal block"),
        )),
    }
}

fn optional_literal(node: &Node, key: &str) -> Result<Option<Vec<String>>> {
    match node.param(key) {
        None => Ok(None),
        Some(value) => match value.as_literal() {
            Some(lines) => Ok(Some(lines.to_vec())),
            None => Err(interpret_error(
                node,
                format!("parameter `{key}` must be a literal block"),
            )),
        },
    }
}

fn optional_usize(node: &Node, key: &str) -> Result<Option<usize>> {
    match node.scalar(key) {
        None if node.param(key).is_some() => Err(interpret_error(
            node,
            format!("parameter `{key}` must be an integer"),
        )),
        None => Ok(None),
        Some(s) => s.parse::<usize>().map(Some).map_err(|_| {
            interpret_error(node, format!("parameter `{key}` must be an integer, got `{s}`"))
        }),
    }
}

fn optional_bool(node: &Node, key: &str) -> Result<Option<bool>> {
    match node.scalar(key) {
        None if node.param(key).is_some() => Err(interpret_error(
            node,
            format!("parameter `{key}` must be `true` or `false`"),
        )),
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(interpret_error(
            node,
            format!("parameter `{key}` must be `true` or `false`, got `{other}`"),
        )),
    }
}

/// Closest known name by Jaro-Winkler similarity, for typo hints.
fn closest<'a>(name: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (strsim::jaro_winkler(name, c), *c))
        .filter(|(score, _)| *score > 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)
}
