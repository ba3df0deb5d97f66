//! Applies a single text operation at a resolved match location.
//!
//! The modifier never searches; it trusts the [`MatchResult`] handed to it
//! and produces the full new line sequence. Indentation of inserted content
//! is either forced to an absolute column or inherited from the line being
//! replaced.

use crate::instruction::TextOperation;
use crate::matcher::MatchResult;

/// Apply `op` to `source` at `m`, returning the new full content as lines.
pub fn apply(source: &[String], m: &MatchResult, op: &TextOperation) -> Vec<String> {
    match op {
        TextOperation::ReplaceBlock {
            new_content,
            indent,
            preserve_context,
            ..
        } => {
            let (from, to) = if *preserve_context {
                (m.interior_start.min(source.len()), m.interior_end.min(source.len()))
            } else {
                (m.start_line, m.end_line)
            };
            let inherit = source.get(from).map(|line| indent_of(line));
            let replacement = reindent(new_content, *indent, inherit);
            splice(source, from, to, replacement)
        }
        TextOperation::DeleteBlock { .. } => splice(source, m.start_line, m.end_line, Vec::new()),
        TextOperation::AppendBlock { new_content, .. } => {
            let inherit = m
                .end_line
                .checked_sub(1)
                .and_then(|last| source.get(last))
                .map(|line| indent_of(line));
            let inserted = reindent(new_content, None, inherit);
            splice(source, m.end_line, m.end_line, inserted)
        }
    }
}

fn splice(source: &[String], from: usize, to: usize, replacement: Vec<String>) -> Vec<String> {
    let mut result = Vec::with_capacity(source.len() + replacement.len());
    result.extend_from_slice(&source[..from]);
    result.extend(replacement);
    result.extend_from_slice(&source[to.max(from)..]);
    result
}

fn indent_of(line: &str) -> String {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

/// Re-indent content for insertion.
///
/// With `indent` set, every non-empty line lands at exactly that column and
/// its own leading whitespace is discarded. Without it, lines that carry no
/// indentation of their own inherit `inherit`; already-indented lines are
/// left untouched.
fn reindent(content: &[String], indent: Option<usize>, inherit: Option<String>) -> Vec<String> {
    match indent {
        Some(column) => {
            let pad = " ".repeat(column);
            content
                .iter()
                .map(|line| {
                    if line.trim().is_empty() {
                        String::new()
                    } else {
                        format!("{pad}{}", line.trim_start())
                    }
                })
                .collect()
        }
        None => {
            let pad = inherit.unwrap_or_default();
            content
                .iter()
                .map(|line| {
                    if line.is_empty() || line.starts_with(' ') || line.starts_with('\t') {
                        line.clone()
                    } else {
                        format!("{pad}{line}")
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{resolve, SearchSpec};

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }

    fn replace_op(new_content: &str, indent: Option<usize>, preserve: bool) -> TextOperation {
        TextOperation::ReplaceBlock {
            start_context: Vec::new(),
            end_context: None,
            new_content: lines(new_content),
            indent,
            preserve_context: preserve,
        }
    }

    #[test]
    fn test_replace_whole_span() {
        let source = lines("a\nold one\nold two\nb\n");
        let spec = SearchSpec::Block(lines("old one\nold two"));
        let m = resolve(&source, &spec).unwrap();
        let result = apply(&source, &m, &replace_op("new", None, false));
        assert_eq!(result, lines("a\nnew\nb\n"));
    }

    #[test]
    fn test_replace_preserves_context_pair() {
        // Scenario: keep the start-context line, rewrite through the end run.
        let source = lines("def f():\n    old()\n");
        let spec = SearchSpec::Context {
            start: vec!["def f():".to_string()],
            end: vec!["    old()".to_string()],
        };
        let m = resolve(&source, &spec).unwrap();
        let op = replace_op("new()", None, true);
        let result = apply(&source, &m, &op);
        assert_eq!(result, lines("def f():\n    new()\n"));
    }

    #[test]
    fn test_replace_preserves_block_edges() {
        let source = lines("start\nmid1\nmid2\nend\n");
        let spec = SearchSpec::Block(lines("start\nmid1\nmid2\nend"));
        let m = resolve(&source, &spec).unwrap();
        let result = apply(&source, &m, &replace_op("middle", None, true));
        assert_eq!(result, lines("start\nmiddle\nend\n"));
    }

    #[test]
    fn test_explicit_indent_overrides_content() {
        let source = lines("if x:\n        do_old()\n");
        let spec = SearchSpec::Block(vec!["        do_old()".to_string()]);
        let m = resolve(&source, &spec).unwrap();
        let result = apply(&source, &m, &replace_op("do_new()", Some(4), false));
        assert_eq!(result, lines("if x:\n    do_new()\n"));
    }

    #[test]
    fn test_inherited_indent_only_for_flush_lines() {
        let source = lines("    target()\n");
        let spec = SearchSpec::Block(vec!["    target()".to_string()]);
        let m = resolve(&source, &spec).unwrap();
        let op = replace_op("first()\n    second()", None, false);
        let result = apply(&source, &m, &op);
        // Flush-left lines inherit the matched line's indent; pre-indented
        // lines are trusted as written.
        assert_eq!(result, lines("    first()\n    second()\n"));
    }

    #[test]
    fn test_idempotent_exact_replace() {
        let source = lines("fn main() {\n    run();\n}\n");
        let spec = SearchSpec::Block(lines("fn main() {\n    run();\n}"));
        let m = resolve(&source, &spec).unwrap();
        let op = replace_op("fn main() {\n    run();\n}", None, false);
        let result = apply(&source, &m, &op);
        assert_eq!(result, source);
    }

    #[test]
    fn test_delete_block() {
        let source = lines("keep\ndrop1\ndrop2\ndrop3\ntail\n");
        let spec = SearchSpec::Block(lines("drop1\ndrop2\ndrop3"));
        let m = resolve(&source, &spec).unwrap();
        let op = TextOperation::DeleteBlock {
            search: lines("drop1\ndrop2\ndrop3"),
        };
        let result = apply(&source, &m, &op);
        assert_eq!(result, lines("keep\ntail\n"));
    }

    #[test]
    fn test_append_after_span() {
        let source = lines("    setup()\n    run()\n");
        let spec = SearchSpec::Block(vec!["    run()".to_string()]);
        let m = resolve(&source, &spec).unwrap();
        let op = TextOperation::AppendBlock {
            search: vec!["    run()".to_string()],
            new_content: vec!["teardown()".to_string()],
        };
        let result = apply(&source, &m, &op);
        // Appended content inherits the indent of the last matched line.
        assert_eq!(result, lines("    setup()\n    run()\n    teardown()\n"));
    }

    #[test]
    fn test_append_keeps_span_untouched() {
        let source = lines("a\nb\n");
        let spec = SearchSpec::Block(vec!["a".to_string()]);
        let m = resolve(&source, &spec).unwrap();
        let op = TextOperation::AppendBlock {
            search: vec!["a".to_string()],
            new_content: vec!["inserted".to_string()],
        };
        assert_eq!(apply(&source, &m, &op), lines("a\ninserted\nb\n"));
    }

    #[test]
    fn test_blank_lines_not_padded_by_indent() {
        let source = lines("body()\n");
        let spec = SearchSpec::Block(vec!["body()".to_string()]);
        let m = resolve(&source, &spec).unwrap();
        let op = replace_op("one()\n\ntwo()", Some(2), false);
        let result = apply(&source, &m, &op);
        assert_eq!(result, vec!["  one()", "", "  two()"]);
    }
}
