//! Extraction of canonical references from expression trees.

use serde::Serialize;

use crate::expr::{HclExpression, TemplatePart};

/// What a reference points at, keyed by its first path segment.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Resource,
    Data,
    Module,
    Var,
    Local,
    Each,
    Count,
    #[serde(rename = "self")]
    Self_,
    Path,
}

impl ReferenceKind {
    /// The stable string form of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Data => "data",
            Self::Module => "module",
            Self::Var => "var",
            Self::Local => "local",
            Self::Each => "each",
            Self::Count => "count",
            Self::Self_ => "self",
            Self::Path => "path",
        }
    }
}

/// A canonical reference record.
///
/// `parts` excludes the kind keyword for keyword-prefixed references
/// (`var.region` → `["region"]`); for bare resource references it is the
/// full dotted path. `attribute` is the dotted tail naming the accessed
/// property: from index 2 of `parts` for resource/data, from index 1
/// otherwise. `None` when there is no tail.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ParsedReference {
    pub kind: ReferenceKind,
    pub parts: Vec<String>,
    pub attribute: Option<String>,
    pub raw: String,
}

/// Walks an expression tree and collects every reference in evaluation
/// order.
pub fn collect_references(expression: &HclExpression) -> Vec<ParsedReference> {
    let mut references = Vec::new();
    walk(expression, &mut references);
    references
}

fn walk(expression: &HclExpression, references: &mut Vec<ParsedReference>) {
    match expression {
        HclExpression::Literal { .. } => {}
        HclExpression::Reference { parts, raw } => {
            if let Some(reference) = classify_reference(parts, raw.as_deref()) {
                references.push(reference);
            }
        }
        HclExpression::Function { args, .. } => {
            for arg in args {
                walk(arg, references);
            }
        }
        HclExpression::Template { parts, .. } => {
            for part in parts {
                if let TemplatePart::Interpolation(inner) = part {
                    walk(inner, references);
                }
            }
        }
        HclExpression::For {
            collection,
            key_expr,
            value_expr,
            condition,
            ..
        } => {
            walk(collection, references);
            if let Some(key_expr) = key_expr {
                walk(key_expr, references);
            }
            walk(value_expr, references);
            if let Some(condition) = condition {
                walk(condition, references);
            }
        }
        HclExpression::Conditional {
            condition,
            true_result,
            false_result,
            ..
        } => {
            walk(condition, references);
            walk(true_result, references);
            walk(false_result, references);
        }
        HclExpression::Index { collection, key, .. } => {
            walk(collection, references);
            walk(key, references);
        }
        HclExpression::Splat { source, each, .. } => {
            walk(source, references);
            if let Some(each) = each {
                walk(each, references);
            }
        }
        HclExpression::Object { attributes, .. } => {
            for value in attributes.values() {
                walk(value, references);
            }
        }
        HclExpression::Array { elements, .. } => {
            for element in elements {
                walk(element, references);
            }
        }
    }
}

/// Routes a raw reference path by its first segment.
///
/// Single-segment paths that are not context keywords (`each`, `count`,
/// `self`, `path`) name nothing addressable and yield no record.
fn classify_reference(segments: &[String], raw: Option<&str>) -> Option<ParsedReference> {
    let first = segments.first()?.as_str();
    let raw = raw
        .map(str::to_string)
        .unwrap_or_else(|| segments.join("."));

    let (kind, parts) = match first {
        "var" => (ReferenceKind::Var, tail_parts(segments, 1)),
        "local" => (ReferenceKind::Local, tail_parts(segments, 1)),
        "module" => (ReferenceKind::Module, tail_parts(segments, 1)),
        "data" => (ReferenceKind::Data, tail_parts(segments, 1)),
        "each" => (ReferenceKind::Each, tail_parts(segments, 1)),
        "count" => (ReferenceKind::Count, tail_parts(segments, 1)),
        "self" => (ReferenceKind::Self_, tail_parts(segments, 1)),
        "path" => (ReferenceKind::Path, tail_parts(segments, 1)),
        _ if segments.len() >= 2 => (ReferenceKind::Resource, tail_parts(segments, 0)),
        _ => return None,
    };

    let attribute_from = match kind {
        ReferenceKind::Resource | ReferenceKind::Data => 2,
        _ => 1,
    };
    let attribute = if parts.len() > attribute_from {
        Some(parts[attribute_from..].join("."))
    } else {
        None
    };

    Some(ParsedReference {
        kind,
        parts,
        attribute,
        raw,
    })
}

/// The path segments from `from` on, with index suffixes stripped
/// (`web[0]` → `web`).
fn tail_parts(segments: &[String], from: usize) -> Vec<String> {
    segments[from..]
        .iter()
        .map(|segment| match segment.find('[') {
            Some(bracket) => segment[..bracket].to_string(),
            None => segment.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use iac_diagnostics::ParseOptions;
    use pretty_assertions::assert_eq;

    use crate::expr::ExpressionParser;

    use super::*;

    fn references(input: &str) -> Vec<ParsedReference> {
        let parser = ExpressionParser::new(&ParseOptions::default());
        collect_references(&parser.parse(input))
    }

    #[test]
    fn test_var_reference() {
        // `var.region` → kind var, parts ["region"], no attribute.
        assert_eq!(
            references("var.region"),
            vec![ParsedReference {
                kind: ReferenceKind::Var,
                parts: vec!["region".into()],
                attribute: None,
                raw: "var.region".into(),
            }]
        );
    }

    #[test]
    fn test_template_references() {
        // Both interpolations of the template surface, resource first.
        let refs = references(r#""${aws_instance.web.id}-${var.env}""#);
        assert_eq!(
            refs.iter().map(|r| r.kind).collect::<Vec<_>>(),
            vec![ReferenceKind::Resource, ReferenceKind::Var]
        );
        assert_eq!(
            refs[0].parts,
            vec!["aws_instance".to_string(), "web".into(), "id".into()]
        );
        assert_eq!(refs[0].attribute.as_deref(), Some("id"));
        assert_eq!(refs[1].parts, vec!["env".to_string()]);
    }

    #[test]
    fn test_data_reference() {
        let refs = references("data.aws_ami.ubuntu.id");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::Data);
        assert_eq!(
            refs[0].parts,
            vec!["aws_ami".to_string(), "ubuntu".into(), "id".into()]
        );
        assert_eq!(refs[0].attribute.as_deref(), Some("id"));
    }

    #[test]
    fn test_module_output_reference() {
        let refs = references("module.vpc.subnet_ids");
        assert_eq!(refs[0].kind, ReferenceKind::Module);
        assert_eq!(refs[0].parts, vec!["vpc".to_string(), "subnet_ids".into()]);
        assert_eq!(refs[0].attribute.as_deref(), Some("subnet_ids"));
    }

    #[test]
    fn test_keyword_kinds() {
        for (input, kind) in [
            ("each.value", ReferenceKind::Each),
            ("count.index", ReferenceKind::Count),
            ("self.private_ip", ReferenceKind::Self_),
            ("path.module", ReferenceKind::Path),
        ] {
            let refs = references(input);
            assert_eq!(refs.len(), 1, "failed for {input}");
            assert_eq!(refs[0].kind, kind, "failed for {input}");
        }
    }

    #[test]
    fn test_references_inside_composites() {
        let refs = references(r#"var.enabled ? join("-", [local.prefix, var.name]) : "none""#);
        let kinds: Vec<ReferenceKind> = refs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![ReferenceKind::Var, ReferenceKind::Local, ReferenceKind::Var]
        );
    }

    #[test]
    fn test_index_suffix_stripped() {
        let refs = references("aws_subnet.public[0].id");
        assert_eq!(refs.len(), 1);
        assert_eq!(
            refs[0].parts,
            vec!["aws_subnet".to_string(), "public".into(), "id".into()]
        );
    }

    #[test]
    fn test_bare_identifier_yields_nothing() {
        assert_eq!(references("standalone"), vec![]);
    }

    #[test]
    fn test_splat_reference() {
        let refs = references("aws_instance.web[*].id");
        // Source and `each` tail both walk; only the source is addressable.
        assert_eq!(refs[0].kind, ReferenceKind::Resource);
        assert_eq!(refs[0].parts, vec!["aws_instance".to_string(), "web".into()]);
    }
}
