//! The HCL expression AST and its classifying parser.
//!
//! The parser is total: classification tries a fixed sequence of expression
//! shapes and the cheapest fallback is a raw-text literal. Results are
//! cached in a bounded LRU keyed by the trimmed expression text.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use iac_diagnostics::ParseOptions;
use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Default capacity of the expression-parse cache.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?$").unwrap());

static FUNCTION_HEAD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z0-9_*"'\[\]-]+)*$"#).unwrap()
});

static HEREDOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^<<-?([A-Za-z_][A-Za-z0-9_]*)\r?\n(.*)\n\s*([A-Za-z_][A-Za-z0-9_]*)$")
        .unwrap()
});

/// A literal scalar value.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// One segment of a template expression.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum TemplatePart {
    Text(String),
    Interpolation(HclExpression),
}

/// A parsed HCL expression.
///
/// The `raw` field holds the trimmed source text when the parser was
/// configured with `include_raw`.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HclExpression {
    Literal {
        value: LiteralValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Reference {
        parts: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Function {
        name: String,
        args: Vec<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Template {
        parts: Vec<TemplatePart>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    For {
        #[serde(skip_serializing_if = "Option::is_none")]
        key_var: Option<String>,
        value_var: String,
        collection: Box<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        key_expr: Option<Box<HclExpression>>,
        value_expr: Box<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<Box<HclExpression>>,
        is_object: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Conditional {
        condition: Box<HclExpression>,
        true_result: Box<HclExpression>,
        false_result: Box<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Index {
        collection: Box<HclExpression>,
        key: Box<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Splat {
        source: Box<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        each: Option<Box<HclExpression>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Object {
        attributes: IndexMap<String, HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Array {
        elements: Vec<HclExpression>,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
}

impl HclExpression {
    /// The retained source text, when captured.
    pub fn raw(&self) -> Option<&str> {
        match self {
            HclExpression::Literal { raw, .. }
            | HclExpression::Reference { raw, .. }
            | HclExpression::Function { raw, .. }
            | HclExpression::Template { raw, .. }
            | HclExpression::For { raw, .. }
            | HclExpression::Conditional { raw, .. }
            | HclExpression::Index { raw, .. }
            | HclExpression::Splat { raw, .. }
            | HclExpression::Object { raw, .. }
            | HclExpression::Array { raw, .. } => raw.as_deref(),
        }
    }
}

/// A caching, classification-based HCL expression parser.
///
/// The parser is pure and re-entrant; the cache holds immutable
/// [`Arc`]'d values, so concurrent readers and writers are safe. Two
/// concurrent computes for the same key may both run, but only one
/// publication is observable. Disabling the cache never changes the
/// observed AST for any input.
pub struct ExpressionParser {
    include_raw: bool,
    cache: Option<Mutex<LruCache<String, Arc<HclExpression>>>>,
}

impl ExpressionParser {
    /// A parser with the default cache capacity.
    pub fn new(options: &ParseOptions) -> Self {
        Self::with_capacity(options, DEFAULT_CACHE_CAPACITY)
    }

    /// A parser with an explicit cache capacity; zero disables caching.
    pub fn with_capacity(options: &ParseOptions, capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            include_raw: options.include_raw,
            cache,
        }
    }

    /// Parses `input` into an expression, consulting the cache first.
    pub fn parse(&self, input: &str) -> Arc<HclExpression> {
        let trimmed = input.trim();

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
            && let Some(cached) = cache.get(trimmed)
        {
            return Arc::clone(cached);
        }

        let parsed = Arc::new(classify(trimmed, self.include_raw));

        if let Some(cache) = &self.cache
            && let Ok(mut cache) = cache.lock()
        {
            cache.put(trimmed.to_string(), Arc::clone(&parsed));
        }

        parsed
    }
}

/// Classifies a trimmed expression, trying shapes in fixed precedence
/// order. Never fails: the final fallback wraps the raw text in a literal.
fn classify(trimmed: &str, include_raw: bool) -> HclExpression {
    let raw = || include_raw.then(|| trimmed.to_string());

    // 1. Scalar literals.
    if trimmed == "null" {
        return HclExpression::Literal {
            value: LiteralValue::Null,
            raw: raw(),
        };
    }
    if trimmed == "true" || trimmed == "false" {
        return HclExpression::Literal {
            value: LiteralValue::Bool(trimmed == "true"),
            raw: raw(),
        };
    }
    if NUMBER_RE.is_match(trimmed)
        && let Ok(number) = trimmed.parse::<f64>()
        && number.is_finite()
    {
        return HclExpression::Literal {
            value: LiteralValue::Number(number),
            raw: raw(),
        };
    }

    // 2. A single quoted string: template if interpolated, else literal.
    if trimmed.starts_with('"')
        && let Some(end) = string_end(trimmed, 0)
        && end == trimmed.len()
    {
        let body = &trimmed[1..trimmed.len() - 1];
        if body.contains("${") {
            return template(body, raw(), include_raw, true);
        }
        return HclExpression::Literal {
            value: LiteralValue::String(unescape(body)),
            raw: raw(),
        };
    }

    // 3. Heredoc.
    if let Some(captures) = HEREDOC_RE.captures(trimmed)
        && captures
            .get(1)
            .map(|m| m.as_str())
            .is_some_and(|delim| Some(delim) == captures.get(3).map(|m| m.as_str()))
    {
        let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        if body.contains("${") {
            return template(body, raw(), include_raw, false);
        }
        return HclExpression::Literal {
            value: LiteralValue::String(body.to_string()),
            raw: raw(),
        };
    }

    // 4–6. Arrays, objects, and `for` expressions.
    if trimmed.starts_with('[')
        && matching_close(trimmed, 0) == Some(trimmed.len() - 1)
    {
        let inner = trimmed[1..trimmed.len() - 1].trim();
        if is_for_body(inner) {
            if let Some(expr) = parse_for(inner, false, raw(), include_raw) {
                return expr;
            }
        } else {
            let elements = split_top_level(inner, b',')
                .into_iter()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(|e| classify(e, include_raw))
                .collect();
            return HclExpression::Array {
                elements,
                raw: raw(),
            };
        }
    }

    if trimmed.starts_with('{')
        && matching_close(trimmed, 0) == Some(trimmed.len() - 1)
    {
        let inner = trimmed[1..trimmed.len() - 1].trim();
        if is_for_body(inner) {
            if let Some(expr) = parse_for(inner, true, raw(), include_raw) {
                return expr;
            }
        } else if let Some(expr) = parse_object(inner, raw(), include_raw) {
            return expr;
        }
    }

    // 7. Conditional at depth zero.
    if let Some((condition, true_result, false_result)) = split_conditional(trimmed) {
        return HclExpression::Conditional {
            condition: Box::new(classify(condition.trim(), include_raw)),
            true_result: Box::new(classify(true_result.trim(), include_raw)),
            false_result: Box::new(classify(false_result.trim(), include_raw)),
            raw: raw(),
        };
    }

    // 8. Splat.
    if let Some(position) = find_top_level(trimmed, "[*]")
        && position > 0
    {
        let source = &trimmed[..position];
        let rest = &trimmed[position + 3..];
        if rest.is_empty() {
            return HclExpression::Splat {
                source: Box::new(classify(source.trim(), include_raw)),
                each: None,
                raw: raw(),
            };
        }
        if let Some(attr) = rest.strip_prefix('.') {
            return HclExpression::Splat {
                source: Box::new(classify(source.trim(), include_raw)),
                each: Some(Box::new(classify(attr.trim(), include_raw))),
                raw: raw(),
            };
        }
    }

    // 9. Index: `expr[key]`, but never for inputs that open with `[`.
    if !trimmed.starts_with('[')
        && trimmed.ends_with(']')
        && let Some((open, close)) = index_brackets(trimmed)
        && close == trimmed.len() - 1
    {
        let collection = &trimmed[..open];
        let key = &trimmed[open + 1..close];
        if !collection.is_empty() && !key.is_empty() {
            return HclExpression::Index {
                collection: Box::new(classify(collection.trim(), include_raw)),
                key: Box::new(classify(key.trim(), include_raw)),
                raw: raw(),
            };
        }
    }

    // 10. Function call.
    if trimmed.ends_with(')')
        && let Some(captures) = FUNCTION_HEAD_RE.captures(trimmed)
    {
        let open = trimmed.find('(').unwrap_or(0);
        if matching_close(trimmed, open) == Some(trimmed.len() - 1) {
            let name = captures
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            let inner = trimmed[open + 1..trimmed.len() - 1].trim();
            let args = split_top_level(inner, b',')
                .into_iter()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(|a| classify(a, include_raw))
                .collect();
            return HclExpression::Function {
                name,
                args,
                raw: raw(),
            };
        }
    }

    // 11. Bare template text.
    if trimmed.contains("${") {
        return template(trimmed, raw(), include_raw, false);
    }

    // 12. Dotted reference.
    if REFERENCE_RE.is_match(trimmed) {
        return HclExpression::Reference {
            parts: split_reference_parts(trimmed),
            raw: raw(),
        };
    }

    // 13. Fallback: the raw text as a literal.
    HclExpression::Literal {
        value: LiteralValue::String(trimmed.to_string()),
        raw: raw(),
    }
}

/// Parses a template body into text and interpolation parts.
///
/// The leading text segment is always recorded (even when empty) so that
/// interpolation-initial templates keep their shape; a trailing empty
/// segment is dropped.
fn template(
    body: &str,
    raw: Option<String>,
    include_raw: bool,
    quoted: bool,
) -> HclExpression {
    let mut parts = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find("${") {
        let text = &rest[..start];
        parts.push(TemplatePart::Text(if quoted {
            unescape(text)
        } else {
            text.to_string()
        }));

        match matching_close(rest, start + 1) {
            Some(close) => {
                let inner = rest[start + 2..close].trim();
                parts.push(TemplatePart::Interpolation(classify(inner, include_raw)));
                rest = &rest[close + 1..];
            }
            None => {
                // Unterminated interpolation; keep the remainder as text.
                rest = &rest[start..];
                break;
            }
        }
    }

    if !rest.is_empty() {
        parts.push(TemplatePart::Text(if quoted {
            unescape(rest)
        } else {
            rest.to_string()
        }));
    }

    HclExpression::Template { parts, raw }
}

/// Whether a bracketed body is a `for` expression rather than a collection.
fn is_for_body(inner: &str) -> bool {
    inner == "for" || inner.starts_with("for ") || inner.starts_with("for\t")
}

/// Parses `for` bodies of either form:
/// `for v in coll : expr [if cond]` and
/// `for k, v in coll : key => value [if cond]`.
fn parse_for(
    inner: &str,
    is_object: bool,
    raw: Option<String>,
    include_raw: bool,
) -> Option<HclExpression> {
    let after_for = inner.strip_prefix("for")?.trim_start();

    let in_pos = find_top_level_word(after_for, "in")?;
    let vars_text = &after_for[..in_pos];
    let after_in = after_for[in_pos + 2..].trim_start();

    let mut vars = vars_text.split(',').map(str::trim).filter(|v| !v.is_empty());
    let first = vars.next()?.to_string();
    let second = vars.next().map(str::to_string);
    let (key_var, value_var) = match second {
        Some(second) => (Some(first), second),
        None => (None, first),
    };

    let colon = find_top_level(after_in, ":")?;
    let collection_text = after_in[..colon].trim();
    let mut body = after_in[colon + 1..].trim();

    let condition = find_top_level_word(body, "if").map(|if_pos| {
        let condition_text = body[if_pos + 2..].trim();
        body = body[..if_pos].trim_end();
        classify(condition_text, include_raw)
    });

    let key_expr = if is_object {
        let arrow = find_top_level(body, "=>")?;
        let key_text = body[..arrow].trim();
        body = body[arrow + 2..].trim();
        Some(Box::new(classify(key_text, include_raw)))
    } else {
        None
    };

    Some(HclExpression::For {
        key_var,
        value_var,
        collection: Box::new(classify(collection_text, include_raw)),
        key_expr,
        value_expr: Box::new(classify(body, include_raw)),
        condition: condition.map(Box::new),
        is_object,
        raw,
    })
}

/// Parses an object body into an attribute map. Entries are separated by
/// top-level commas or newlines; keys and values split at the first
/// top-level `=` (or `:` for JSON-flavored bodies).
fn parse_object(
    inner: &str,
    raw: Option<String>,
    include_raw: bool,
) -> Option<HclExpression> {
    let mut attributes = IndexMap::new();

    for entry in split_object_entries(inner) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let separator = find_assignment(entry).or_else(|| find_top_level(entry, ":"))?;
        let key = entry[..separator].trim().trim_matches('"').to_string();
        let value = entry[separator + 1..].trim();
        if key.is_empty() {
            return None;
        }
        attributes.insert(key, classify(value, include_raw));
    }

    Some(HclExpression::Object { attributes, raw })
}

/// Splits an object body on top-level commas and newlines.
fn split_object_entries(inner: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = inner.as_bytes();
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(inner, position).unwrap_or(bytes.len());
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b',' | b'\n' if depth == 0 => {
                entries.push(&inner[start..position]);
                start = position + 1;
            }
            _ => {}
        }
        position += 1;
    }
    entries.push(&inner[start..]);
    entries
}

/// Finds the first top-level `=` that is an assignment (not part of
/// `==`, `!=`, `<=`, `>=`, or `=>`).
fn find_assignment(entry: &str) -> Option<usize> {
    let bytes = entry.as_bytes();
    let mut depth = 0usize;
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(entry, position)?;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let prev = position.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(position + 1).copied();
                if next != Some(b'=')
                    && next != Some(b'>')
                    && !matches!(prev, Some(b'=' | b'!' | b'<' | b'>'))
                {
                    return Some(position);
                }
            }
            _ => {}
        }
        position += 1;
    }
    None
}

/// Splits a conditional `cond ? a : b` at depth zero, pairing nested
/// `?`/`:` so embedded conditionals stay intact.
fn split_conditional(trimmed: &str) -> Option<(&str, &str, &str)> {
    let bytes = trimmed.as_bytes();
    let mut depth = 0usize;
    let mut position = 0usize;
    let mut question = None;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(trimmed, position)?;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'?' if depth == 0 => {
                question = Some(position);
                position += 1;
                break;
            }
            _ => {}
        }
        position += 1;
    }

    let question = question?;
    let mut nested = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(trimmed, position)?;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'?' if depth == 0 => nested += 1,
            b':' if depth == 0 => {
                if nested == 0 {
                    return Some((
                        &trimmed[..question],
                        &trimmed[question + 1..position],
                        &trimmed[position + 1..],
                    ));
                }
                nested -= 1;
            }
            _ => {}
        }
        position += 1;
    }
    None
}

/// Finds the top-level `[`/`]` pair whose close bracket ends the input.
fn index_brackets(trimmed: &str) -> Option<(usize, usize)> {
    let bytes = trimmed.as_bytes();
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(trimmed, position)?;
                continue;
            }
            b'[' => {
                let close = matching_close(trimmed, position)?;
                if close == trimmed.len() - 1 {
                    return Some((position, close));
                }
                position = close + 1;
                continue;
            }
            _ => {}
        }
        position += 1;
    }
    None
}

/// Returns the byte index just past the closing quote of the string
/// starting at `start` (which must point at `"` or `'`).
fn string_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let quote = bytes[start];
    let mut position = start + 1;

    while position < bytes.len() {
        match bytes[position] {
            b'\\' => position += 2,
            byte if byte == quote => return Some(position + 1),
            _ => position += 1,
        }
    }
    None
}

/// Returns the index of the bracket matching the opener at `open`.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (opener, closer) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };

    let mut depth = 0usize;
    let mut position = open;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(text, position)?;
                continue;
            }
            byte if byte == opener => depth += 1,
            byte if byte == closer => {
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

/// Splits on a separator byte at depth zero, outside strings.
fn split_top_level(text: &str, separator: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(text, position).unwrap_or(bytes.len());
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            byte if byte == separator && depth == 0 => {
                pieces.push(&text[start..position]);
                start = position + 1;
            }
            _ => {}
        }
        position += 1;
    }
    pieces.push(&text[start..]);
    pieces
}

/// Finds a needle at depth zero, outside strings.
///
/// The needle check runs before depth tracking so bracket-initial needles
/// (like the splat marker `[*]`) are still found.
fn find_top_level(text: &str, needle: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let needle_bytes = needle.as_bytes();
    let mut depth = 0usize;
    let mut position = 0usize;

    while position < bytes.len() {
        if matches!(bytes[position], b'"' | b'\'') {
            position = string_end(text, position)?;
            continue;
        }
        if depth == 0 && position > 0 && bytes[position..].starts_with(needle_bytes) {
            return Some(position);
        }
        match bytes[position] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        position += 1;
    }
    None
}

/// Finds a whole keyword (whitespace-delimited) at depth zero.
fn find_top_level_word(text: &str, word: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let word_bytes = word.as_bytes();
    let mut depth = 0usize;
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'"' | b'\'' => {
                position = string_end(text, position)?;
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ if depth == 0 && bytes[position..].starts_with(word_bytes) => {
                let before_ok = position == 0
                    || bytes[position - 1].is_ascii_whitespace();
                let after = position + word_bytes.len();
                let after_ok = bytes
                    .get(after)
                    .is_none_or(|b| b.is_ascii_whitespace());
                if before_ok && after_ok && position > 0 {
                    return Some(position);
                }
            }
            _ => {}
        }
        position += 1;
    }
    None
}

/// Splits a dotted reference into parts, keeping bracketed segments whole.
fn split_reference_parts(reference: &str) -> Vec<String> {
    let bytes = reference.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut bracket_depth = 0usize;

    for (position, byte) in bytes.iter().enumerate() {
        match byte {
            b'[' => bracket_depth += 1,
            b']' => bracket_depth = bracket_depth.saturating_sub(1),
            b'.' if bracket_depth == 0 => {
                parts.push(reference[start..position].to_string());
                start = position + 1;
            }
            _ => {}
        }
    }
    parts.push(reference[start..].to_string());
    parts
}

/// Unescapes the string escapes the lexer recognizes.
fn unescape(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
