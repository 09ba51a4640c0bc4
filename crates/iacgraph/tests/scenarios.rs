//! End-to-end scenarios across all three domains.

use iacgraph::expressions::{ContextKind, ExpressionKind, extract_expressions};
use iacgraph::hcl::{
    ExpressionParser, HclExpression, HclParser, ModuleSource, ParsedReference,
    ReferenceKind, TemplatePart, classify_module_source, collect_references,
};
use iacgraph::helmfile::{HelmfileParser, releases_in_order};
use iacgraph::{
    ConfidenceLevel, DiagnosticCode, EvidenceKind, FlowPattern, ParseOptions,
    analyze_workflow, parse_helmfile,
};
use pretty_assertions::assert_eq;

/// `var.region` parses to a two-part reference and yields a single
/// variable record with no attribute tail.
#[test]
fn test_variable_reference_roundtrip() {
    let parser = ExpressionParser::new(&ParseOptions::default());
    let expression = parser.parse("var.region");

    assert_eq!(
        *expression,
        HclExpression::Reference {
            parts: vec!["var".into(), "region".into()],
            raw: Some("var.region".into()),
        }
    );

    assert_eq!(
        collect_references(&expression),
        vec![ParsedReference {
            kind: ReferenceKind::Var,
            parts: vec!["region".into()],
            attribute: None,
            raw: "var.region".into(),
        }]
    );
}

/// An interpolated string parses to a four-part template whose references
/// classify as resource and variable.
#[test]
fn test_template_reference_extraction() {
    let parser = ExpressionParser::new(&ParseOptions::default());
    let expression = parser.parse(r#""${aws_instance.web.id}-${var.env}""#);

    let HclExpression::Template { parts, .. } = (*expression).clone() else {
        panic!("expected template");
    };
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], TemplatePart::Text(String::new()));
    assert_eq!(parts[2], TemplatePart::Text("-".into()));

    let kinds: Vec<ReferenceKind> = collect_references(&expression)
        .iter()
        .map(|r| r.kind)
        .collect();
    assert_eq!(kinds, vec![ReferenceKind::Resource, ReferenceKind::Var]);
}

/// A module source with a subdirectory and ref classifies as GitHub.
#[test]
fn test_module_source_classification() -> anyhow::Result<()> {
    let source = r#"
module "m" {
  source = "github.com/acme/repo//modules/db?ref=v1.2.0"
}
"#;
    let blocks = HclParser::new(ParseOptions::default())
        .parse(source, None)
        .value
        .ok_or_else(|| anyhow::anyhow!("no blocks"))?;
    let raw = blocks[0]
        .attribute("source")
        .and_then(|e| e.raw())
        .ok_or_else(|| anyhow::anyhow!("missing source attribute"))?
        .trim_matches('"')
        .to_string();

    assert_eq!(
        classify_module_source(&raw, "."),
        ModuleSource::Github {
            owner: "acme".into(),
            repo: "repo".into(),
            path: Some("modules/db".into()),
            git_ref: Some("v1.2.0".into()),
            is_ssh: false,
        }
    );
    Ok(())
}

/// A build job exposing a Terraform output consumed by a downstream Helm
/// `--set` produces a high-confidence direct flow.
#[test]
fn test_terraform_to_helm_direct_flow() {
    let source = r#"
on: push
jobs:
  build:
    runs-on: ubuntu-latest
    outputs:
      tag: ${{ steps.meta.outputs.tag }}
    steps:
      - id: meta
        run: |
          terraform init
          terraform apply -auto-approve
          echo "tag=$(terraform output -raw tag)" >> "$GITHUB_OUTPUT"
  deploy:
    runs-on: ubuntu-latest
    needs: build
    steps:
      - run: helm upgrade myrel ./chart --set image.tag=${{ needs.build.outputs.tag }}
"#;

    let result = analyze_workflow(source, Some("deploy.yml"), &ParseOptions::default());
    assert!(result.success);
    let analysis = result.value.expect("analysis value");

    assert_eq!(analysis.flows.len(), 1);
    let flow = &analysis.flows[0];
    assert_eq!(flow.pattern, FlowPattern::DirectOutput);
    assert!(flow.confidence >= 90);
    assert_eq!(flow.confidence_level, ConfidenceLevel::High);

    let kinds: Vec<EvidenceKind> = flow.evidence.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EvidenceKind::ExplicitReference));
    assert!(kinds.contains(&EvidenceKind::JobDependency));
}

/// Release chains order topologically; a cycle is reported with a closed
/// path.
#[test]
fn test_helmfile_ordering_and_cycles() {
    let chain = "releases:\n  - name: a\n    chart: c\n  - name: b\n    chart: c\n    needs: [a]\n  - name: c\n    chart: c\n    needs: [b]\n";
    let helmfile = HelmfileParser::new(ParseOptions::default())
        .parse(chain, None)
        .value
        .expect("helmfile");
    let order: Vec<&str> = releases_in_order(&helmfile)
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(order, vec!["a", "b", "c"]);

    let cyclic = "releases:\n  - name: a\n    chart: c\n    needs: [c]\n  - name: b\n    chart: c\n    needs: [a]\n  - name: c\n    chart: c\n    needs: [b]\n";
    let result = parse_helmfile(cyclic, None, &ParseOptions::default());
    assert!(!result.success);
    let cycle = result
        .errors
        .iter()
        .find(|e| e.code == DiagnosticCode::CircularDependency)
        .expect("cycle diagnostic");
    assert!(cycle.message.contains("a -> c -> b -> a"));
}

/// The labels ternary classifies as such, with one function call and one
/// wildcard context reference.
#[test]
fn test_ternary_expression_scenario() {
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
