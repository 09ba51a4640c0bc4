//! Tolerant YAML → [`Helmfile`] parsing.

use indexmap::IndexMap;
use iac_diagnostics::{
    Diagnostic, DiagnosticCode, ParseOptions, ParseResult, Severity, SourceSpan,
};
use serde_yaml::Value;

use crate::deps::validate_dependencies;
use crate::model::{
    Environment, HelmDefaults, Helmfile, Release, Repository, SetValue,
};

/// Parses helmfile YAML into the typed model and validates release
/// dependencies.
pub struct HelmfileParser {
    options: ParseOptions,
}

impl HelmfileParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parses `source` into a [`Helmfile`].
    ///
    /// A release missing its `name` or `chart` is dropped with an error;
    /// the rest of the document continues to parse. Dependency validation
    /// diagnostics (`UNKNOWN_DEPENDENCY`, `CIRCULAR_DEPENDENCY`) are
    /// appended to the result.
    pub fn parse(&self, source: &str, file_path: Option<&str>) -> ParseResult<Helmfile> {
        if source.len() > self.options.yaml_size_limit() {
            let mut result = empty_result();
            result.push(Diagnostic::error(
                DiagnosticCode::FileTooLarge,
                format!(
                    "input is {} bytes, over the {}-byte limit",
                    source.len(),
                    self.options.yaml_size_limit()
                ),
            ));
            return result;
        }

        let root: Value = match serde_yaml::from_str(source) {
            Ok(root) => root,
            Err(error) => {
                let diagnostic = Diagnostic {
                    code: DiagnosticCode::InvalidYaml,
                    message: format!("invalid YAML: {error}"),
                    location: error
                        .location()
                        .map(|l| SourceSpan::point(l.line() as u32, l.column() as u32)),
                    severity: if self.options.error_recovery {
                        Severity::Error
                    } else {
                        Severity::Fatal
                    },
                    recoverable: self.options.error_recovery,
                };
                return if self.options.error_recovery {
                    let mut result = empty_result();
                    result.push(diagnostic);
                    result
                } else {
                    ParseResult::fatal(diagnostic)
                };
            }
        };

        let Some(mapping) = root.as_mapping() else {
            let mut result = empty_result();
            result.push(Diagnostic::error(
                DiagnosticCode::ParseError,
                "helmfile document is not a mapping",
            ));
            return result;
        };

        let mut diagnostics = Vec::new();

        let mut helmfile = Helmfile {
            file_path: file_path.map(str::to_string),
            helm_defaults: mapping
                .get("helmDefaults")
                .and_then(parse_helm_defaults)
                .unwrap_or_default(),
            helm_binary: mapping.get("helmBinary").and_then(value_string),
            bases: mapping
                .get("bases")
                .and_then(Value::as_sequence)
                .map(|bases| bases.iter().filter_map(value_string_ref).collect())
                .unwrap_or_default(),
            ..Default::default()
        };

        if let Some(environments) = mapping.get("environments").and_then(Value::as_mapping) {
            for (name, body) in environments {
                if let Some(name) = name.as_str() {
                    helmfile
                        .environments
                        .insert(name.to_string(), parse_environment(body));
                }
            }
        }

        if let Some(repositories) = mapping.get("repositories").and_then(Value::as_sequence) {
            for entry in repositories {
                if let Some(repository) = parse_repository(entry) {
                    helmfile.repositories.push(repository);
                }
            }
        }

        let release_lines = release_lines(source);
        if let Some(releases) = mapping.get("releases").and_then(Value::as_sequence) {
            for (index, entry) in releases.iter().enumerate() {
                let line_number = release_lines.get(index).copied().unwrap_or(0);
                match parse_release(entry, line_number) {
                    Ok(release) => helmfile.releases.push(release),
                    Err(diagnostic) => diagnostics.push(diagnostic),
                }
            }
        }

        diagnostics.extend(validate_dependencies(&helmfile));

        tracing::debug!(
            releases = helmfile.releases.len(),
            repositories = helmfile.repositories.len(),
            "helmfile parsed"
        );
        ParseResult::with_diagnostics(helmfile, diagnostics)
    }
}

fn empty_result() -> ParseResult<Helmfile> {
    ParseResult {
        success: true,
        value: None,
        errors: Vec::new(),
        warnings: Vec::new(),
    }
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_string_ref(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn parse_helm_defaults(value: &Value) -> Option<HelmDefaults> {
    let mapping = value.as_mapping()?;
    Some(HelmDefaults {
        wait: mapping.get("wait").and_then(Value::as_bool),
        timeout: mapping.get("timeout").and_then(Value::as_u64),
        atomic: mapping.get("atomic").and_then(Value::as_bool),
        create_namespace: mapping.get("createNamespace").and_then(Value::as_bool),
        kube_context: mapping.get("kubeContext").and_then(value_string),
        verify: mapping.get("verify").and_then(Value::as_bool),
    })
}

fn parse_environment(value: &Value) -> Environment {
    let Some(mapping) = value.as_mapping() else {
        return Environment::default();
    };
    Environment {
        values: mapping
            .get("values")
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default(),
        secrets: mapping
            .get("secrets")
            .and_then(Value::as_sequence)
            .map(|secrets| secrets.iter().filter_map(value_string_ref).collect())
            .unwrap_or_default(),
        kube_context: mapping.get("kubeContext").and_then(value_string),
    }
}

fn parse_repository(value: &Value) -> Option<Repository> {
    let mapping = value.as_mapping()?;
    Some(Repository {
        name: mapping.get("name").and_then(value_string)?,
        url: mapping.get("url").and_then(value_string).unwrap_or_default(),
        oci: mapping.get("oci").and_then(Value::as_bool),
    })
}

/// Parses one release entry. `name` and `chart` are required and
/// non-empty; a violation drops the release with an error.
fn parse_release(entry: &Value, line_number: u32) -> Result<Release, Diagnostic> {
    let Some(mapping) = entry.as_mapping() else {
        return Err(Diagnostic::error(
            DiagnosticCode::MissingReleaseName,
            "release entry is not a mapping",
        )
        .at(SourceSpan::point(line_number.max(1), 1)));
    };

    let name = mapping.get("name").and_then(value_string).unwrap_or_default();
    if name.is_empty() {
        return Err(Diagnostic::error(
            DiagnosticCode::MissingReleaseName,
            "release has no `name`",
        )
        .at(SourceSpan::point(line_number.max(1), 1)));
    }

    let chart = mapping.get("chart").and_then(value_string).unwrap_or_default();
    if chart.is_empty() {
        return Err(Diagnostic::error(
            DiagnosticCode::MissingReleaseChart,
            format!("release `{name}` has no `chart`"),
        )
        .at(SourceSpan::point(line_number.max(1), 1)));
    }

    let mut labels = IndexMap::new();
    if let Some(mapping) = mapping.get("labels").and_then(Value::as_mapping) {
        for (key, value) in mapping {
            if let (Some(key), Some(value)) = (key.as_str(), value_string(value)) {
                labels.insert(key.to_string(), value);
            }
        }
    }

    Ok(Release {
        name,
        namespace: mapping
            .get("namespace")
            .and_then(value_string)
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "default".to_string()),
        chart,
        version: mapping.get("version").and_then(value_string),
        needs: mapping
            .get("needs")
            .and_then(Value::as_sequence)
            .map(|needs| needs.iter().filter_map(value_string_ref).collect())
            .unwrap_or_default(),
        values: mapping
            .get("values")
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default(),
        set: parse_set_values(mapping.get("set")),
        condition: mapping.get("condition").and_then(value_string),
        installed: mapping.get("installed").and_then(Value::as_bool),
        wait: mapping.get("wait").and_then(Value::as_bool),
        timeout: mapping.get("timeout").and_then(Value::as_u64),
        atomic: mapping.get("atomic").and_then(Value::as_bool),
        force: mapping.get("force").and_then(Value::as_bool),
        recreate_pods: mapping.get("recreatePods").and_then(Value::as_bool),
        create_namespace: mapping.get("createNamespace").and_then(Value::as_bool),
        labels,
        missing_file_handler: mapping.get("missingFileHandler").and_then(value_string),
        hooks: mapping
            .get("hooks")
            .and_then(Value::as_sequence)
            .cloned()
            .unwrap_or_default(),
        secrets: mapping
            .get("secrets")
            .and_then(Value::as_sequence)
            .map(|secrets| secrets.iter().filter_map(value_string_ref).collect())
            .unwrap_or_default(),
        line_number,
    })
}

fn parse_set_values(value: Option<&Value>) -> Vec<SetValue> {
    let Some(Value::Sequence(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let mapping = entry.as_mapping()?;
            Some(SetValue {
                name: mapping.get("name").and_then(value_string)?,
                value: mapping.get("value").and_then(value_string).unwrap_or_default(),
            })
        })
        .collect()
}

/// 1-based line numbers of `- ` items under the top-level `releases:` key,
/// recovered by scanning the raw text.
fn release_lines(source: &str) -> Vec<u32> {
    let lines: Vec<&str> = source.lines().collect();
    let Some(releases_line) = lines
        .iter()
        .position(|line| line.trim_end() == "releases:")
    else {
        return Vec::new();
    };

    let mut numbers = Vec::new();
    let mut item_indent = None;
    for (offset, line) in lines[releases_line + 1..].iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();
        if indent == 0 {
            break;
        }
        if trimmed.starts_with('-') {
            let item = *item_indent.get_or_insert(indent);
            if indent == item {
                numbers.push((releases_line + 1 + offset + 1) as u32);
            }
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const HELMFILE: &str = r#"
helmDefaults:
  wait: true
  timeout: 600

repositories:
  - name: bitnami
    url: https://charts.bitnami.com/bitnami

environments:
  production:
    values:
      - env/production.yaml

releases:
  - name: postgres
    namespace: data
    chart: bitnami/postgresql
    version: 13.2.0
  - name: web
    namespace: apps
    chart: charts/web
    needs:
      - data/postgres
    values:
      - values/web.yaml
    set:
      - name: image.tag
        value: v1.2.3
"#;

    fn parse(source: &str) -> ParseResult<Helmfile> {
        HelmfileParser::new(ParseOptions::default()).parse(source, Some("helmfile.yaml"))
    }

    #[test]
    fn test_full_document() {
        let result = parse(HELMFILE);
        assert!(result.success, "diagnostics: {:?}", result.errors);
        let helmfile = result.value.expect("helmfile value");

        assert_eq!(helmfile.helm_defaults.wait, Some(true));
        assert_eq!(helmfile.helm_defaults.timeout, Some(600));
        assert_eq!(helmfile.repositories.len(), 1);
        assert_eq!(helmfile.repositories[0].name, "bitnami");
        assert!(helmfile.environments.contains_key("production"));
        assert_eq!(helmfile.releases.len(), 2);

        let web = &helmfile.releases[1];
        assert_eq!(web.namespace, "apps");
        assert_eq!(web.needs, vec!["data/postgres"]);
        assert_eq!(web.set[0].name, "image.tag");
        assert_eq!(web.set[0].value, "v1.2.3");
    }

    #[test]
    fn test_release_line_numbers() {
        let helmfile = parse(HELMFILE).value.expect("helmfile value");
        // `- name: postgres` is on line 16 of the fixture.
        assert_eq!(helmfile.releases[0].line_number, 16);
        assert!(helmfile.releases[1].line_number > 16);
    }

    #[test]
    fn test_namespace_defaults() {
        let result = parse("releases:\n  - name: app\n    chart: charts/app\n");
        let helmfile = result.value.expect("helmfile value");
        assert_eq!(helmfile.releases[0].namespace, "default");
    }

    #[test]
    fn test_missing_name_drops_release() {
        let result = parse(
            "releases:\n  - chart: charts/app\n  - name: ok\n    chart: charts/ok\n",
        );
        assert!(!result.success);
        let helmfile = result.value.expect("helmfile value");
        assert_eq!(helmfile.releases.len(), 1);
        assert_eq!(helmfile.releases[0].name, "ok");
        assert_eq!(result.errors[0].code, DiagnosticCode::MissingReleaseName);
    }

    #[test]
    fn test_missing_chart_drops_release() {
        let result = parse("releases:\n  - name: app\n");
        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::MissingReleaseChart);
        assert!(result.value.expect("helmfile value").releases.is_empty());
    }

    #[test]
    fn test_unknown_dependency_reported() {
        let result = parse(
            "releases:\n  - name: app\n    chart: c\n    needs: [missing]\n",
        );
        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::UnknownDependency);
    }

    #[test]
    fn test_cycle_reported() {
        let result = parse(
            "releases:\n  - name: a\n    chart: c\n    needs: [b]\n  - name: b\n    chart: c\n    needs: [a]\n",
        );
        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .any(|e| e.code == DiagnosticCode::CircularDependency));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = parse("releases: [unclosed\n");
        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::InvalidYaml);
        assert!(result.value.is_none());
    }
}
