//! Context-reference extraction (e.g. `github.event.name`,
//! `needs.build.outputs.tag`).

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// A context reference: the known context head plus a path, e.g.
/// `(github)(\.segment)+` with bracket segments allowed.
///
/// The leading group rejects matches whose head is actually the tail of a
/// longer dotted path (`a.env.b`). The path character class additionally
/// permits `*` so wildcard segments like `labels.*.name` survive.
static CONTEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^|[^A-Za-z0-9_.-])(github|env|vars|jobs|job|steps|runner|secrets|strategy|matrix|needs|inputs)((?:\.[A-Za-z0-9_*'"-]+|\[[^\]]*\])+)"#,
    )
    .unwrap()
});

/// The twelve runtime contexts a workflow expression may access.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Github,
    Env,
    Vars,
    Job,
    Jobs,
    Steps,
    Runner,
    Secrets,
    Strategy,
    Matrix,
    Needs,
    Inputs,
}

impl ContextKind {
    fn from_str(name: &str) -> Option<Self> {
        match name {
            "github" => Some(Self::Github),
            "env" => Some(Self::Env),
            "vars" => Some(Self::Vars),
            "job" => Some(Self::Job),
            "jobs" => Some(Self::Jobs),
            "steps" => Some(Self::Steps),
            "runner" => Some(Self::Runner),
            "secrets" => Some(Self::Secrets),
            "strategy" => Some(Self::Strategy),
            "matrix" => Some(Self::Matrix),
            "needs" => Some(Self::Needs),
            "inputs" => Some(Self::Inputs),
            _ => None,
        }
    }

    /// The stable string form of this context.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Env => "env",
            Self::Vars => "vars",
            Self::Job => "job",
            Self::Jobs => "jobs",
            Self::Steps => "steps",
            Self::Runner => "runner",
            Self::Secrets => "secrets",
            Self::Strategy => "strategy",
            Self::Matrix => "matrix",
            Self::Needs => "needs",
            Self::Inputs => "inputs",
        }
    }
}

/// A single context access inside an expression body.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ContextRef {
    pub context: ContextKind,
    /// The path segments after the context head. Bracket segments are
    /// flattened: `steps['build'].outputs` → `["build", "outputs"]`.
    pub path: Vec<String>,
    /// The full dotted reference as written.
    pub full_path: String,
    /// Byte offsets of the reference within the expression body.
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Extracts all context references from an expression body, skipping any
/// that begin inside single-quoted strings.
pub fn extract_context_refs(body: &str) -> Vec<ContextRef> {
    let string_ranges = string_ranges(body);

    CONTEXT_RE
        .captures_iter(body)
        .filter_map(|captures| {
            let head = captures.get(1)?;
            let path = captures.get(2)?;

            if string_ranges
                .iter()
                .any(|range| range.contains(&head.start()))
            {
                return None;
            }

            let context = ContextKind::from_str(head.as_str())?;
            Some(ContextRef {
                context,
                path: split_path(path.as_str()),
                full_path: format!("{}{}", head.as_str(), path.as_str()),
                start_offset: head.start(),
                end_offset: path.end(),
            })
        })
        .collect()
}

/// The byte ranges of single-quoted strings within a body.
pub(crate) fn string_ranges(body: &str) -> Vec<std::ops::Range<usize>> {
    let bytes = body.as_bytes();
    let mut ranges = Vec::new();
    let mut position = 0usize;

    while position < bytes.len() {
        if bytes[position] == b'\'' {
            let start = position;
            position += 1;
            while position < bytes.len() && bytes[position] != b'\'' {
                position += 1;
            }
            ranges.push(start + 1..position.min(bytes.len()));
        }
        position += 1;
    }
    ranges
}

/// Splits a reference path into segments, respecting brackets. Dots inside
/// brackets do not split; quote characters inside brackets are dropped.
fn split_path(path: &str) -> Vec<String> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut position = 0usize;

    while position < bytes.len() {
        match bytes[position] {
            b'.' => {
                position += 1;
                let start = position;
                while position < bytes.len() && !matches!(bytes[position], b'.' | b'[') {
                    position += 1;
                }
                if position > start {
                    segments.push(path[start..position].to_string());
                }
            }
            b'[' => {
                position += 1;
                let start = position;
                while position < bytes.len() && bytes[position] != b']' {
                    position += 1;
                }
                let inner: String = path[start..position]
                    .chars()
                    .filter(|c| *c != '\'' && *c != '"')
                    .collect();
                let inner = inner.trim().to_string();
                if !inner.is_empty() {
                    segments.push(inner);
                }
                position += 1;
            }
            _ => position += 1,
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_simple_context() {
        let refs = extract_context_refs("github.ref");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].context, ContextKind::Github);
        assert_eq!(refs[0].path, vec!["ref".to_string()]);
        assert_eq!(refs[0].full_path, "github.ref");
        assert_eq!((refs[0].start_offset, refs[0].end_offset), (0, 10));
    }

    #[test]
    fn test_wildcard_path_segments() {
        // `github.event.labels.*.name` keeps its `*` segment.
        let refs = extract_context_refs("contains(github.event.labels.*.name, 'bug')");
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].path,
            vec!["event".to_string(), "labels".into(), "*".into(), "name".into()]
        );
    }

    #[test]
    fn test_bracket_segments() {
        let refs = extract_context_refs("steps['build'].outputs.tag");
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].path,
            vec!["build".to_string(), "outputs".into(), "tag".into()]
        );
    }

    #[test]
    fn test_dots_inside_brackets_do_not_split() {
        let refs = extract_context_refs("github.event['a.b'].c");
        assert_eq!(refs[0].path, vec!["event".to_string(), "a.b".into(), "c".into()]);
    }

    #[test]
    fn test_needs_outputs() {
        let refs = extract_context_refs("needs.terraform.outputs.cluster_endpoint");
        assert_eq!(refs[0].context, ContextKind::Needs);
        assert_eq!(
            refs[0].path,
            vec!["terraform".to_string(), "outputs".into(), "cluster_endpoint".into()]
        );
    }

    #[test]
    fn test_head_mid_path_not_matched() {
        // `a.env.b` must not produce an `env` reference.
        assert_eq!(extract_context_refs("a.env.b"), vec![]);
    }

    #[test]
    fn test_refs_inside_strings_skipped() {
        assert_eq!(extract_context_refs("'needs.build.outputs.x'"), vec![]);
    }

    #[test]
    fn test_multiple_refs() {
        let refs = extract_context_refs("needs.a.outputs.x == matrix.env && env.FOO");
        let contexts: Vec<ContextKind> = refs.iter().map(|r| r.context).collect();
        assert_eq!(
            contexts,
            vec![ContextKind::Needs, ContextKind::Matrix, ContextKind::Env]
        );
    }

    #[test]
    fn test_jobs_vs_job_disambiguation() {
        let refs = extract_context_refs("jobs.build.result");
        assert_eq!(refs[0].context, ContextKind::Jobs);
        assert_eq!(refs[0].path[0], "build");
    }
}
