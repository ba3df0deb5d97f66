//! Parser for the line-oriented instruction language.
//!
//! Instruction text is a sequence of statements. A statement is named by a
//! bare line (`Create File`), carries `key: value` parameters, and may own
//! nested blocks delimited by `/Name` ... `/`. Parameter values come in three
//! shapes: an inline scalar, an ordered list (`- item` lines), or a literal
//! block (`.`-prefixed lines holding verbatim content).
//!
//! The parser knows nothing about files or operations; it only builds the
//! tree. All nodes live in a flat arena and refer to their children by index,
//! so the recursive block structure needs no recursive ownership.

use serde::Serialize;
use std::fmt::Write as _;

use crate::error::ParseError;

/// Nesting deeper than this is rejected rather than parsed.
const MAX_BLOCK_DEPTH: usize = 10;

/// Index of a node in the [`Document`] arena.
pub type NodeId = usize;

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// Single-line value from `key: value`.
    Scalar(String),
    /// Ordered elements from `- item` lines.
    List(Vec<String>),
    /// Verbatim lines from `.`-prefixed lines. Never empty.
    Literal(Vec<String>),
}

impl Value {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&[String]> {
        match self {
            Value::Literal(lines) => Some(lines),
            _ => None,
        }
    }

    /// Literal lines joined with `\n` plus a trailing newline: the form file
    /// content takes on disk.
    pub fn literal_text(&self) -> Option<String> {
        self.as_literal().map(|lines| {
            let mut text = lines.join("\n");
            text.push('\n');
            text
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Top-level named unit (`Create File`).
    Statement,
    /// Nested container (`/Changes` ... `/`).
    Block,
}

/// One statement or block: a name, ordered unique-key parameters, and child
/// blocks by arena index.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub name: String,
    /// 1-based line number of the opening line, for diagnostics.
    pub line: usize,
    pub parameters: Vec<(String, Value)>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, name: String, line: usize) -> Self {
        Self {
            kind,
            name,
            line,
            parameters: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn scalar(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_scalar)
    }

    pub fn literal(&self, key: &str) -> Option<&[String]> {
        self.param(key).and_then(Value::as_literal)
    }
}

/// A parsed instruction document: the node arena plus the ordered top-level
/// statements.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Document {
    nodes: Vec<Node>,
    pub statements: Vec<NodeId>,
}

impl Document {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Child blocks of a node, in declaration order.
    pub fn children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> {
        node.children.iter().map(move |&id| &self.nodes[id])
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Structural equality: names, parameters, and nested blocks, ignoring
    /// source line numbers.
    pub fn same_structure(&self, other: &Document) -> bool {
        self.statements.len() == other.statements.len()
            && self
                .statements
                .iter()
                .zip(&other.statements)
                .all(|(&a, &b)| self.same_node(a, other, b))
    }

    fn same_node(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (na, nb) = (&self.nodes[a], &other.nodes[b]);
        na.kind == nb.kind
            && na.name == nb.name
            && na.parameters == nb.parameters
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(&nb.children)
                .all(|(&ca, &cb)| self.same_node(ca, other, cb))
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

/// Parse instruction text into a [`Document`].
///
/// Any malformed line fails the whole parse; no partial tree is returned.
pub fn parse(text: &str) -> Result<Document, ParseError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut doc = Document::default();
    // Innermost open block is last; empty means we are at statement level.
    let mut open_blocks: Vec<NodeId> = Vec::new();
    let mut current_statement: Option<NodeId> = None;

    let mut i = 0;
    while i < lines.len() {
        let line_no = i + 1;
        let trimmed = lines[i].trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }

        if trimmed == "/" {
            if open_blocks.pop().is_none() {
                return Err(ParseError::new(
                    line_no,
                    "block close marker without an open block",
                ));
            }
            i += 1;
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('/') {
            let name = rest.trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(ParseError::new(
                    line_no,
                    format!("invalid block name `{name}`"),
                ));
            }
            if open_blocks.len() >= MAX_BLOCK_DEPTH {
                return Err(ParseError::new(
                    line_no,
                    format!("maximum block nesting depth of {MAX_BLOCK_DEPTH} exceeded"),
                ));
            }
            let parent = match open_blocks.last().copied().or(current_statement) {
                Some(p) => p,
                None => {
                    return Err(ParseError::new(
                        line_no,
                        format!("block `{name}` found outside any statement"),
                    ));
                }
            };
            let id = doc.push(Node::new(NodeKind::Block, name.to_string(), line_no));
            doc.nodes[parent].children.push(id);
            open_blocks.push(id);
            i += 1;
            continue;
        }

        if trimmed.contains(':') {
            let owner = match open_blocks.last().copied().or(current_statement) {
                Some(o) => o,
                None => {
                    return Err(ParseError::new(
                        line_no,
                        "key/value pair found outside any statement",
                    ));
                }
            };
            let (key, inline) = trimmed.split_once(':').expect("line contains a colon");
            let key = key.trim();
            if key.is_empty() {
                return Err(ParseError::new(line_no, "empty parameter key"));
            }
            if doc.nodes[owner].param(key).is_some() {
                return Err(ParseError::new(line_no, format!("duplicate key: {key}")));
            }

            let inline = inline.trim();
            let (value, next) = if inline.is_empty() {
                parse_complex_value(&lines, i + 1)?
            } else {
                (Value::Scalar(inline.to_string()), i + 1)
            };
            doc.nodes[owner].parameters.push((key.to_string(), value));
            i = next;
            continue;
        }

        if trimmed.starts_with('.') {
            return Err(ParseError::new(
                line_no,
                "literal line outside a literal block",
            ));
        }
        if trimmed.starts_with('-') {
            return Err(ParseError::new(line_no, "list item outside a list value"));
        }

        // Anything else opens a new statement.
        if !open_blocks.is_empty() {
            return Err(ParseError::new(
                line_no,
                format!("statement `{trimmed}` not allowed inside a block"),
            ));
        }
        if !trimmed.chars().all(|c| c.is_alphanumeric() || c == ' ') {
            return Err(ParseError::new(
                line_no,
                "statement names may contain only alphanumeric characters and spaces",
            ));
        }
        let id = doc.push(Node::new(NodeKind::Statement, trimmed.to_string(), line_no));
        doc.statements.push(id);
        current_statement = Some(id);
        i += 1;
    }

    if let Some(&open) = open_blocks.last() {
        let node = &doc.nodes[open];
        return Err(ParseError::new(
            node.line,
            format!("unclosed block `{}`", node.name),
        ));
    }

    Ok(doc)
}

/// Consume the literal or list run that must follow a bare `key:` line.
/// Returns the value and the index of the first line after the run.
fn parse_complex_value(lines: &[&str], start: usize) -> Result<(Value, usize), ParseError> {
    let expected = "expected literal block or list after empty value";
    if start >= lines.len() {
        return Err(ParseError::new(start, expected));
    }

    let head = lines[start].trim();
    if head.starts_with('.') {
        let mut literal = Vec::new();
        let mut j = start;
        while j < lines.len() {
            let t = lines[j].trim();
            let Some(content) = t.strip_prefix('.') else {
                break;
            };
            // One marker character and at most one following space.
            literal.push(content.strip_prefix(' ').unwrap_or(content).to_string());
            j += 1;
        }
        Ok((Value::Literal(literal), j))
    } else if head.starts_with('-') {
        let mut items = Vec::new();
        let mut j = start;
        while j < lines.len() {
            let t = lines[j].trim();
            let Some(rest) = t.strip_prefix('-') else {
                break;
            };
            let item = rest.trim();
            if item.is_empty() {
                return Err(ParseError::new(j + 1, "empty list item"));
            }
            items.push(item.to_string());
            j += 1;
        }
        Ok((Value::List(items), j))
    } else {
        Err(ParseError::new(start + 1, expected))
    }
}

/// Render a document back to instruction text.
///
/// Re-parsing the output yields a structurally equal tree. Parameters are
/// emitted before child blocks; per-line trailing whitespace inside literal
/// blocks is not representable and is dropped by the parser in the first
/// place.
pub fn render(doc: &Document) -> String {
    let mut out = String::new();
    for (idx, &sid) in doc.statements.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        render_node(doc, sid, 0, &mut out);
    }
    out
}

fn render_node(doc: &Document, id: NodeId, depth: usize, out: &mut String) {
    let node = doc.node(id);
    let pad = "    ".repeat(depth);
    match node.kind {
        NodeKind::Statement => {
            let _ = writeln!(out, "{pad}{}", node.name);
        }
        NodeKind::Block => {
            let _ = writeln!(out, "{pad}/{}", node.name);
        }
    }

    let inner = "    ".repeat(depth + 1);
    for (key, value) in &node.parameters {
        match value {
            Value::Scalar(v) => {
                let _ = writeln!(out, "{inner}{key}: {v}");
            }
            Value::List(items) => {
                let _ = writeln!(out, "{inner}{key}:");
                for item in items {
                    let _ = writeln!(out, "{inner}- {item}");
                }
            }
            Value::Literal(lines) => {
                let _ = writeln!(out, "{inner}{key}:");
                for line in lines {
                    if line.is_empty() {
                        let _ = writeln!(out, "{inner}.");
                    } else {
                        let _ = writeln!(out, "{inner}. {line}");
                    }
                }
            }
        }
    }

    for &child in &node.children {
        render_node(doc, child, depth + 1, out);
    }
    if node.kind == NodeKind::Block {
        let _ = writeln!(out, "{pad}/");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_parameters() {
        let doc = parse("Create File\n    name: a.py\n    reason: demo\n").unwrap();
        assert_eq!(doc.statements.len(), 1);
        let stmt = doc.node(doc.statements[0]);
        assert_eq!(stmt.name, "Create File");
        assert_eq!(stmt.scalar("name"), Some("a.py"));
        assert_eq!(stmt.scalar("reason"), Some("demo"));
    }

    #[test]
    fn test_literal_block_value() {
        let doc = parse("Create File\n    name: a.py\n    content:\n    .print(1)\n").unwrap();
        let stmt = doc.node(doc.statements[0]);
        assert_eq!(stmt.literal("content"), Some(&["print(1)".to_string()][..]));
        assert_eq!(
            stmt.param("content").unwrap().literal_text().unwrap(),
            "print(1)\n"
        );
    }

    #[test]
    fn test_literal_marker_strips_one_space() {
        let doc = parse("Create File\n    name: a.py\n    content:\n    .  indented\n    .\n")
            .unwrap();
        let stmt = doc.node(doc.statements[0]);
        // One space after the dot is separator; the rest is content.
        assert_eq!(
            stmt.literal("content"),
            Some(&[" indented".to_string(), String::new()][..])
        );
    }

    #[test]
    fn test_list_value() {
        let doc = parse("Deploy App\n    regions:\n    - us-west-2\n    - eu-central-1\n").unwrap();
        let stmt = doc.node(doc.statements[0]);
        assert_eq!(
            stmt.param("regions").unwrap().as_list(),
            Some(&["us-west-2".to_string(), "eu-central-1".to_string()][..])
        );
    }

    #[test]
    fn test_nested_blocks() {
        let text = "Modify File\n    name: a.py\n    /Changes\n        /Replace\n            start_context:\n            .old\n            new_content:\n            .new\n        /\n    /\n";
        let doc = parse(text).unwrap();
        let stmt = doc.node(doc.statements[0]);
        let changes: Vec<_> = doc.children(stmt).collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "Changes");
        let ops: Vec<_> = doc.children(changes[0]).collect();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].name, "Replace");
        assert_eq!(ops[0].literal("start_context"), Some(&["old".to_string()][..]));
    }

    #[test]
    fn test_repeated_sibling_blocks_allowed() {
        let text = "Modify File\n    name: a.py\n    /Changes\n        /Delete\n            search:\n            .x\n        /\n        /Delete\n            search:\n            .y\n        /\n    /\n";
        let doc = parse(text).unwrap();
        let stmt = doc.node(doc.statements[0]);
        let changes = doc.children(stmt).next().unwrap();
        assert_eq!(doc.children(changes).count(), 2);
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let doc = parse("# header comment\n\nCreate File\n    # inline comment\n    name: a.py\n")
            .unwrap();
        assert_eq!(doc.statements.len(), 1);
        assert_eq!(doc.node(doc.statements[0]).scalar("name"), Some("a.py"));
    }

    #[test]
    fn test_comment_line_terminates_literal_run() {
        // A `#` line ends the run (comments are only recognized outside
        // literal blocks), so a later `.` line is stranded.
        let err = parse(
            "Create File\n    content:\n    .line one\n    # boundary\n    .line two\n",
        )
        .unwrap_err();
        assert_eq!(err.line, 5);
        assert!(err.message.contains("literal line outside"));

        // Without the stray continuation the same input parses, with the
        // run holding only the first line.
        let doc = parse("Create File\n    content:\n    .line one\n    # boundary\n").unwrap();
        let stmt = doc.node(doc.statements[0]);
        assert_eq!(stmt.literal("content"), Some(&["line one".to_string()][..]));
    }

    #[test]
    fn test_duplicate_key_is_error() {
        let err = parse("Create File\n    name: a.py\n    name: b.py\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("duplicate key"));
    }

    #[test]
    fn test_parameter_outside_statement() {
        let err = parse("name: a.py\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("outside any statement"));
    }

    #[test]
    fn test_empty_literal_declaration_is_error() {
        let err = parse("Create File\n    content:\n").unwrap_err();
        assert!(err.message.contains("expected literal block or list"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse("Modify File\n    /Changes\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unclosed block `Changes`"));
    }

    #[test]
    fn test_stray_close_marker() {
        let err = parse("Modify File\n    /\n").unwrap_err();
        assert!(err.message.contains("without an open block"));
    }

    #[test]
    fn test_block_marker_with_colon_fails() {
        let err = parse("Modify File\n    /Changes: oops\n").unwrap_err();
        assert!(err.message.contains("invalid block name"));
    }

    #[test]
    fn test_statement_inside_block_rejected() {
        let err = parse("Modify File\n    /Changes\n        Rogue Statement\n    /\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_render_round_trip() {
        let text = "Create File\n    name: a.py\n    content:\n    .def greet():\n    .    print(\"hi\")\n    .\n    .greet()\n\nModify File\n    name: b.py\n    reason: swap implementation\n    /Changes\n        /Replace\n            start_context:\n            .old()\n            new_content:\n            .new()\n            preserve_context: true\n        /\n        /Delete\n            search:\n            .stale()\n        /\n    /\n";
        let doc = parse(text).unwrap();
        let rendered = render(&doc);
        let reparsed = parse(&rendered).unwrap();
        assert!(doc.same_structure(&reparsed), "round-trip changed the tree");
    }
}
