//! GitHub Actions `${{ … }}` expression extraction and classification.
//!
//! The scanner walks raw workflow text for expression regions, computes
//! their source locations in a single pass, classifies each body by a fixed
//! precedence chain, and extracts context references and function calls
//! with byte-accurate offsets. It never fails: malformed bodies are
//! classified on a best-effort basis.

#![forbid(unsafe_code)]

use std::sync::LazyLock;

use iac_diagnostics::SourceSpan;
use regex::Regex;
use serde::Serialize;

pub mod call;
pub mod context;

pub use call::{FunctionCall, extract_function_calls};
pub use context::{ContextKind, ContextRef, extract_context_refs};

static EXPRESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\{\{(.*?)\}\}").unwrap());

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(true|false|null|-?[0-9]+(\.[0-9]+)?|'(?:[^']|'')*')$").unwrap()
});

static TERNARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&&\s*('(?:[^']|'')*'|true|false|null|-?[0-9]+(\.[0-9]+)?)\s*\|\|").unwrap()
});

static FUNCTION_FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*\(").unwrap());

static CONTEXT_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(?:\.[A-Za-z0-9_*'-]+|\[[^\]]*\])*$").unwrap()
});

/// How an expression body is shaped.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionKind {
    Literal,
    Context,
    Function,
    Comparison,
    Logical,
    Ternary,
    Mixed,
}

impl ExpressionKind {
    /// The stable string form of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Context => "context",
            Self::Function => "function",
            Self::Comparison => "comparison",
            Self::Logical => "logical",
            Self::Ternary => "ternary",
            Self::Mixed => "mixed",
        }
    }
}

/// One extracted `${{ … }}` expression.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Expression {
    /// The full region as written, including the delimiters.
    pub raw: String,
    /// The trimmed body between the delimiters. Context and function
    /// offsets are byte offsets into this string.
    pub body: String,
    pub kind: ExpressionKind,
    pub span: SourceSpan,
    pub context_refs: Vec<ContextRef>,
    pub functions: Vec<FunctionCall>,
}

/// Extracts every expression from raw workflow text.
pub fn extract_expressions(text: &str) -> Vec<Expression> {
    let mut counter = LineCounter::new(text);

    EXPRESSION_RE
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let inner = captures.get(1)?;

            let (line_start, column_start) = counter.locate(whole.start());
            let (line_end, column_end) = counter.locate(whole.end());

            let body = inner.as_str().trim().to_string();
            let kind = classify(&body);

            Some(Expression {
                raw: whole.as_str().to_string(),
                context_refs: extract_context_refs(&body),
                functions: extract_function_calls(&body),
                body,
                kind,
                span: SourceSpan::region(line_start, column_start, line_end, column_end),
            })
        })
        .collect()
}

/// Like [`extract_expressions`], stamping each span with the source file.
pub fn extract_expressions_from_file(text: &str, file: &str) -> Vec<Expression> {
    let mut expressions = extract_expressions(text);
    for expression in &mut expressions {
        expression.span.file = Some(file.to_string());
    }
    expressions
}

/// Classifies a body by the fixed precedence chain: literal, then logical
/// (with the `&& 'x' || 'y'` ternary idiom as a sub-case), then
/// comparison, then function, then plain context access, then mixed.
fn classify(body: &str) -> ExpressionKind {
    if LITERAL_RE.is_match(body) {
        return ExpressionKind::Literal;
    }

    let masked = mask_strings(body);

    if masked.contains("&&") || masked.contains("||") {
        if TERNARY_RE.is_match(body) {
            return ExpressionKind::Ternary;
        }
        return ExpressionKind::Logical;
    }

    if ["==", "!=", "<=", ">=", "<", ">"]
        .iter()
        .any(|op| masked.contains(op))
    {
        return ExpressionKind::Comparison;
    }

    if FUNCTION_FORM_RE.is_match(body) {
        return ExpressionKind::Function;
    }

    if CONTEXT_FORM_RE.is_match(body) {
        return ExpressionKind::Context;
    }

    ExpressionKind::Mixed
}

/// Replaces the contents of single-quoted strings with spaces, preserving
/// byte offsets, so operator scans ignore string contents.
fn mask_strings(body: &str) -> String {
    let mut masked: Vec<u8> = body.as_bytes().to_vec();
    for range in context::string_ranges(body) {
        for byte in &mut masked[range] {
            if !byte.is_ascii_whitespace() {
                *byte = b' ';
            }
        }
    }
    String::from_utf8_lossy(&masked).into_owned()
}

/// Computes 1-based line/column pairs for monotonically increasing byte
/// offsets, threading a cumulative newline count instead of rescanning.
struct LineCounter<'src> {
    bytes: &'src [u8],
    position: usize,
    line: u32,
    line_start: usize,
}

impl<'src> LineCounter<'src> {
    fn new(text: &'src str) -> Self {
        Self {
            bytes: text.as_bytes(),
            position: 0,
            line: 1,
            line_start: 0,
        }
    }

    /// Locates `offset`, which must not precede any earlier query.
    fn locate(&mut self, offset: usize) -> (u32, u32) {
        while self.position < offset && self.position < self.bytes.len() {
            if self.bytes[self.position] == b'\n' {
                self.line += 1;
                self.line_start = self.position + 1;
            }
            self.position += 1;
        }
        (self.line, (offset - self.line_start + 1) as u32)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_extraction_and_location() {
        let text = "name: ci\nrun: echo ${{ github.ref }}\n";
        let expressions = extract_expressions(text);
        assert_eq!(expressions.len(), 1);

        let expression = &expressions[0];
        assert_eq!(expression.raw, "${{ github.ref }}");
        assert_eq!(expression.body, "github.ref");
        assert_eq!(expression.span.line_start, 2);
        assert_eq!(expression.span.column_start, 11);
        assert_eq!(expression.kind, ExpressionKind::Context);
    }

    #[test]
    fn test_multiple_expressions_in_order() {
        let text = "a: ${{ env.A }}\nb: ${{ env.B }}\n";
        let expressions = extract_expressions(text);
        assert_eq!(expressions.len(), 2);
        assert_eq!(expressions[0].body, "env.A");
        assert_eq!(expressions[1].body, "env.B");
        assert_eq!(expressions[1].span.line_start, 2);
    }

    #[test]
    fn test_classify_literal() {
        for body in ["true", "false", "null", "42", "-3.5", "'text'"] {
            assert_eq!(classify(body), ExpressionKind::Literal, "failed for {body}");
        }
    }

    #[test]
    fn test_classify_ternary() {
        // The `cond && 'a' || 'b'` idiom is the ternary sub-case of logical.
        let body = "contains(github.event.labels.*.name, 'bug') && 'hot' || 'cold'";
        assert_eq!(classify(body), ExpressionKind::Ternary);
    }

    #[test]
    fn test_classify_logical() {
        assert_eq!(
            classify("github.event_name == 'push' && github.ref == 'refs/heads/main'"),
            ExpressionKind::Logical
        );
    }

    #[test]
    fn test_classify_comparison() {
        assert_eq!(classify("github.ref == 'refs/heads/main'"), ExpressionKind::Comparison);
        assert_eq!(classify("matrix.index < 3"), ExpressionKind::Comparison);
    }

    #[test]
    fn test_classify_function_and_context() {
        assert_eq!(classify("always()"), ExpressionKind::Function);
        assert_eq!(classify("fromJSON(needs.plan.outputs.data)"), ExpressionKind::Function);
        assert_eq!(classify("needs.build.outputs.tag"), ExpressionKind::Context);
        assert_eq!(classify("steps['build'].outputs.tag"), ExpressionKind::Context);
    }

    #[test]
    fn test_classify_mixed() {
        assert_eq!(classify("github.ref . something"), ExpressionKind::Mixed);
    }

    #[test]
    fn test_operators_inside_strings_ignored() {
        assert_eq!(classify("'a && b'"), ExpressionKind::Literal);
        assert_eq!(classify("format('{0} > {1}', env.A)"), ExpressionKind::Function);
    }

    #[test]
    fn test_ternary_scenario_full() {
        // The full scenario: classification, one function call, one
        // context reference with a wildcard segment.
        let text = "${{ contains(github.event.labels.*.name, 'bug') && 'hot' || 'cold' }}";
        let expressions = extract_expressions(text);
        assert_eq!(expressions.len(), 1);

        let expression = &expressions[0];
        assert_eq!(expression.kind, ExpressionKind::Ternary);
        assert_eq!(expression.functions.len(), 1);
        assert_eq!(expression.functions[0].name, "contains");
        assert_eq!(
            expression.functions[0].arguments,
            vec!["github.event.labels.*.name".to_string(), "'bug'".into()]
        );
        assert_eq!(expression.context_refs.len(), 1);
        assert_eq!(expression.context_refs[0].context, ContextKind::Github);
        assert_eq!(
            expression.context_refs[0].path,
            vec!["event".to_string(), "labels".into(), "*".into(), "name".into()]
        );
    }

    #[test]
    fn test_never_fails_on_malformed_input() {
        for text in ["${{", "${{ }}", "${{ '...unterminated }}", "${{ a } }}"] {
            let _ = extract_expressions(text);
        }
    }

    #[test]
    fn test_file_stamping() {
        let expressions =
            extract_expressions_from_file("${{ env.X }}", ".github/workflows/ci.yml");
        assert_eq!(
            expressions[0].span.file.as_deref(),
            Some(".github/workflows/ci.yml")
        );
    }
}
