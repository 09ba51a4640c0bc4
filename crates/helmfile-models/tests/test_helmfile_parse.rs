//! Helmfile parsing and ordering against realistic documents.

use helmfile_models::{HelmfileParser, releases_in_order};
use iac_diagnostics::{DiagnosticCode, ParseOptions};
use pretty_assertions::assert_eq;

const PLATFORM: &str = r#"
helmDefaults:
  wait: true
  atomic: true

repositories:
  - name: ingress-nginx
    url: https://kubernetes.github.io/ingress-nginx
  - name: jetstack
    url: https://charts.jetstack.io

environments:
  staging:
    values:
      - env/staging.yaml
  production:
    values:
      - env/production.yaml

releases:
  - name: cert-manager
    namespace: cert-manager
    chart: jetstack/cert-manager
    version: v1.14.4
    createNamespace: true

  - name: ingress
    namespace: ingress
    chart: ingress-nginx/ingress-nginx
    needs:
      - cert-manager/cert-manager

  - name: api
    namespace: apps
    chart: charts/api
    condition: '{{ .Values.api.enabled }}'
    needs:
      - ingress/ingress
    values:
      - values/api-{{ .Environment.Name }}.yaml
    set:
      - name: image.tag
        value: '{{ .StateValues.apiTag }}'

  - name: worker
    namespace: apps
    chart: charts/worker
    needs:
      - apps/api
"#;

fn parse_platform() -> helmfile_models::Helmfile {
    let result =
        HelmfileParser::new(ParseOptions::default()).parse(PLATFORM, Some("helmfile.yaml"));
    assert!(result.success, "diagnostics: {:?}", result.errors);
    result.value.expect("helmfile value")
}

#[test]
fn test_structure() -> anyhow::Result<()> {
    let result =
        HelmfileParser::new(ParseOptions::default()).parse(PLATFORM, Some("helmfile.yaml"));
    let helmfile = result.value.ok_or_else(|| anyhow::anyhow!("no helmfile"))?;
    assert_eq!(helmfile.repositories.len(), 2);
    assert_eq!(helmfile.environments.len(), 2);
    assert_eq!(helmfile.releases.len(), 4);
    assert_eq!(helmfile.helm_defaults.atomic, Some(true));

    let cert_manager = &helmfile.releases[0];
    assert_eq!(cert_manager.version.as_deref(), Some("v1.14.4"));
    assert_eq!(cert_manager.create_namespace, Some(true));
    Ok(())
}

#[test]
fn test_topological_order() {
    let helmfile = parse_platform();
    let order: Vec<&str> = releases_in_order(&helmfile)
        .iter()
        .map(|release| release.name.as_str())
        .collect();
    assert_eq!(order, vec!["cert-manager", "ingress", "api", "worker"]);
}

#[test]
fn test_environment_templating() {
    let helmfile = parse_platform();
    let api = helmfile.find_release("api").expect("api release");
    assert!(api.uses_environment_templating());

    let ingress = helmfile.find_release("ingress").expect("ingress release");
    assert!(!ingress.uses_environment_templating());
}

#[test]
fn test_qualified_needs_resolve() {
    let helmfile = parse_platform();
    let worker = helmfile.find_release("worker").expect("worker release");
    assert_eq!(worker.needs, vec!["apps/api"]);
    assert!(helmfile.find_release("apps/api").is_some());
}

#[test]
fn test_rotated_cycle_reported_once() {
    let source = "releases:\n  - name: a\n    chart: c\n    needs: [c]\n  - name: b\n    chart: c\n    needs: [a]\n  - name: c\n    chart: c\n    needs: [b]\n";
    let result = HelmfileParser::new(ParseOptions::default()).parse(source, None);
    assert!(!result.success);

    let cycles: Vec<&iac_diagnostics::Diagnostic> = result
        .errors
        .iter()
        .filter(|e| e.code == DiagnosticCode::CircularDependency)
        .collect();
    assert_eq!(cycles.len(), 1);
    // The reported path closes on itself: a -> c -> b -> a.
    assert!(cycles[0].message.contains("a -> c -> b -> a"));
}
