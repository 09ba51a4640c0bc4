//! Detection of the classification-only tool families: Kubernetes, cloud
//! CLIs, and Docker.

use std::sync::LazyLock;

use iac_diagnostics::ParseOptions;
use gha_models::Step;
use regex::Regex;
use serde::Serialize;

use super::{ToolFamily, USES_CONFIDENCE, run_confidence, uses_matches};

struct FamilySpec {
    family: ToolFamily,
    uses_prefixes: &'static [&'static str],
    explicit_marker: &'static str,
    run_pattern: &'static LazyLock<Regex>,
}

static KUBECTL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:kubectl|kustomize)\s+(\w[\w-]*)").unwrap());
static AWS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\baws\s+(\w[\w-]*)").unwrap());
static GCP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:gcloud|gsutil)\s+(\w[\w-]*)").unwrap());
static AZURE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\baz\s+(\w[\w-]*)").unwrap());
static DOCKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdocker(?:-compose)?\s+(\w[\w-]*)").unwrap()
});

static FAMILIES: LazyLock<Vec<FamilySpec>> = LazyLock::new(|| {
    vec![
        FamilySpec {
            family: ToolFamily::Kubernetes,
            uses_prefixes: &[
                "azure/setup-kubectl",
                "azure/k8s-deploy",
                "azure/k8s-set-context",
                "actions-hub/kubectl",
            ],
            explicit_marker: "kubectl ",
            run_pattern: &KUBECTL_RE,
        },
        FamilySpec {
            family: ToolFamily::Aws,
            uses_prefixes: &["aws-actions/"],
            explicit_marker: "aws ",
            run_pattern: &AWS_RE,
        },
        FamilySpec {
            family: ToolFamily::Gcp,
            uses_prefixes: &["google-github-actions/"],
            explicit_marker: "gcloud ",
            run_pattern: &GCP_RE,
        },
        FamilySpec {
            family: ToolFamily::Azure,
            uses_prefixes: &["azure/login", "azure/cli", "azure/arm-deploy"],
            explicit_marker: "az ",
            run_pattern: &AZURE_RE,
        },
        FamilySpec {
            family: ToolFamily::Docker,
            uses_prefixes: &[
                "docker/build-push-action",
                "docker/setup-buildx-action",
                "docker/setup-qemu-action",
                "docker/login-action",
                "docker/metadata-action",
            ],
            explicit_marker: "docker ",
            run_pattern: &DOCKER_RE,
        },
    ]
});

/// A detected step of a classification-only family.
#[derive(Serialize, Clone, Debug)]
pub struct OtherToolStep {
    pub tool: ToolFamily,
    pub step_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub job_id: String,
    /// The subcommand as written (`apply`, `build`, `s3`, …).
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_ref: Option<String>,
    pub confidence: u8,
    pub location: iac_diagnostics::SourceSpan,
}

/// Classifies one step into the first matching family.
pub(crate) fn detect(
    job_id: &str,
    step_index: usize,
    step: &Step,
    options: &ParseOptions,
) -> Option<OtherToolStep> {
    for spec in FAMILIES.iter() {
        let enabled = match spec.family {
            ToolFamily::Kubernetes => options.detect_kubernetes,
            ToolFamily::Aws | ToolFamily::Gcp | ToolFamily::Azure => {
                options.detect_cloud_providers
            }
            // Docker has no dedicated toggle; it is always scanned.
            _ => true,
        };
        if !enabled {
            continue;
        }

        if let Some(uses) = step.uses_clause()
            && uses_matches(uses, spec.uses_prefixes).is_some()
        {
            return Some(OtherToolStep {
                tool: spec.family,
                step_index,
                step_id: step.common().id.clone(),
                job_id: job_id.to_string(),
                command: action_command(uses),
                action_ref: Some(uses.to_string()),
                confidence: USES_CONFIDENCE,
                location: step.common().span.clone(),
            });
        }

        if let Some(run) = step.run_text()
            && let Some(captures) = spec.run_pattern.captures(run)
        {
            let command = captures
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            return Some(OtherToolStep {
                tool: spec.family,
                step_index,
                step_id: step.common().id.clone(),
                job_id: job_id.to_string(),
                command,
                action_ref: None,
                confidence: run_confidence(run, spec.explicit_marker, &[]),
                location: step.common().span.clone(),
            });
        }
    }
    None
}

/// A coarse command inferred from the action name.
fn action_command(uses: &str) -> String {
    let name = uses.to_ascii_lowercase();
    for (needle, command) in [
        ("build-push", "build"),
        ("login", "login"),
        ("deploy", "apply"),
        ("set-context", "config"),
        ("setup-", "setup"),
        ("configure-aws-credentials", "configure"),
        ("metadata", "inspect"),
    ] {
        if name.contains(needle) {
            return command.to_string();
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use gha_models::WorkflowParser;
    use pretty_assertions::assert_eq;

    use crate::tools::detect_tools;

    use super::*;

    fn detect_in(step_yaml: &str) -> Vec<OtherToolStep> {
        let source = format!(
            "on: push\njobs:\n  ops:\n    runs-on: ubuntu-latest\n    steps:\n{step_yaml}"
        );
        let workflow = WorkflowParser::new(ParseOptions::default())
            .parse(&source, None)
            .value
            .expect("workflow value");
        detect_tools(&workflow, &ParseOptions::default()).other
    }

    #[test]
    fn test_kubectl_run() {
        let steps = detect_in("      - run: kubectl apply -f manifests/\n");
        assert_eq!(steps[0].tool, ToolFamily::Kubernetes);
        assert_eq!(steps[0].command, "apply");
    }

    #[test]
    fn test_cloud_clis() {
        let steps = detect_in(
            "      - run: aws s3 cp out.json s3://bucket/\n      - run: gcloud container clusters list\n      - run: az aks get-credentials\n",
        );
        let families: Vec<ToolFamily> = steps.iter().map(|s| s.tool).collect();
        assert_eq!(
            families,
            vec![ToolFamily::Aws, ToolFamily::Gcp, ToolFamily::Azure]
        );
        assert_eq!(steps[0].command, "s3");
    }

    #[test]
    fn test_docker_actions_and_run() {
        let steps = detect_in(
            "      - uses: docker/build-push-action@v5\n      - run: docker build -t app .\n",
        );
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool, ToolFamily::Docker);
        assert_eq!(steps[0].command, "build");
        assert_eq!(steps[0].confidence, 95);
        assert_eq!(steps[1].command, "build");
    }

    #[test]
    fn test_cloud_toggle() {
        let source = "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: aws sts get-caller-identity\n";
        let workflow = WorkflowParser::new(ParseOptions::default())
            .parse(source, None)
            .value
            .expect("workflow value");
        let options = ParseOptions {
            detect_cloud_providers: false,
            ..Default::default()
        };
        assert!(detect_tools(&workflow, &options).other.is_empty());
    }

    #[test]
    fn test_aws_configure_action() {
        let steps = detect_in("      - uses: aws-actions/configure-aws-credentials@v4\n");
        assert_eq!(steps[0].tool, ToolFamily::Aws);
        assert_eq!(steps[0].command, "configure");
    }
}
