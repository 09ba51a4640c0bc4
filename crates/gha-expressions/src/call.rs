//! Function-call extraction from expression bodies.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::context::string_ranges;

static CALL_HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

/// A function call inside an expression body.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// Raw argument texts, split at top-level commas and trimmed. String
    /// literals keep their quotes.
    pub arguments: Vec<String>,
    /// Byte offsets of the call (name through closing paren) within the
    /// expression body.
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Extracts every function call from a body. Nested calls produce their
/// own records. Calls beginning inside string literals are skipped;
/// unterminated calls are dropped.
pub fn extract_function_calls(body: &str) -> Vec<FunctionCall> {
    let strings = string_ranges(body);
    let mut calls = Vec::new();

    for captures in CALL_HEAD_RE.captures_iter(body) {
        let Some(name) = captures.get(1) else {
            continue;
        };
        if strings.iter().any(|range| range.contains(&name.start())) {
            continue;
        }

        let Some(whole) = captures.get(0) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(close) = matching_paren(body, open) else {
            continue;
        };

        let arguments = split_arguments(&body[open + 1..close]);
        calls.push(FunctionCall {
            name: name.as_str().to_string(),
            arguments,
            start_offset: name.start(),
            end_offset: close + 1,
        });
    }

    calls
}

/// Finds the `)` matching the `(` at `open`, with string awareness.
fn matching_paren(body: &str, open: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut position = open;

    while position < bytes.len() {
        match bytes[position] {
            b'\'' => {
                position += 1;
                while position < bytes.len() && bytes[position] != b'\'' {
                    position += 1;
                }
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(position);
                }
            }
            _ => {}
        }
        position += 1;
    }
    None
}

/// Splits an argument list at top-level commas, aware of strings,
/// brackets, and nested parens.
fn split_arguments(arguments: &str) -> Vec<String> {
    let bytes = arguments.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'\'' => {
                position += 1;
                while position < bytes.len() && bytes[position] != b'\'' {
                    position += 1;
                }
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                pieces.push(arguments[start..position].trim().to_string());
                start = position + 1;
            }
            _ => {}
        }
        position += 1;
    }

    let last = arguments[start..].trim();
    if !last.is_empty() {
        pieces.push(last.to_string());
    }
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_single_call() {
        let calls = extract_function_calls("contains(github.event.labels.*.name, 'bug')");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "contains");
        assert_eq!(
            calls[0].arguments,
            vec!["github.event.labels.*.name".to_string(), "'bug'".into()]
        );
        assert_eq!(calls[0].start_offset, 0);
        assert_eq!(calls[0].end_offset, 43);
    }

    #[test]
    fn test_nested_calls() {
        let calls = extract_function_calls("format('{0}', toJSON(github.event))");
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["format", "toJSON"]);
        assert_eq!(
            calls[0].arguments,
            vec!["'{0}'".to_string(), "toJSON(github.event)".into()]
        );
    }

    #[test]
    fn test_comma_inside_string_does_not_split() {
        let calls = extract_function_calls("join(needs.build.outputs.list, ', ')");
        assert_eq!(calls[0].arguments.len(), 2);
        assert_eq!(calls[0].arguments[1], "', '");
    }

    #[test]
    fn test_no_arguments() {
        let calls = extract_function_calls("always()");
        assert_eq!(calls[0].name, "always");
        assert_eq!(calls[0].arguments, Vec::<String>::new());
    }

    #[test]
    fn test_call_inside_string_skipped() {
        assert_eq!(extract_function_calls("'not a call()'"), vec![]);
    }

    #[test]
    fn test_unterminated_call_dropped() {
        assert_eq!(extract_function_calls("contains(a, b"), vec![]);
    }
}
