//! Per-step tool detection for workflow jobs.
//!
//! A step is classified into at most one tool family. Families are tried
//! in a fixed order (Terraform, Helm, Kubernetes, AWS, GCP, Azure,
//! Docker); within a family, `uses:` prefixes are checked before the
//! ordered run-command regex tables, and the first match wins.

use iac_diagnostics::ParseOptions;
use gha_models::{Step, Workflow};
use itertools::Itertools as _;
use serde::Serialize;

pub mod helm;
pub mod other;
pub mod terraform;

pub use helm::{HelmCommand, HelmStep};
pub use other::OtherToolStep;
pub use terraform::{BackendConfig, TerraformCommand, TerraformStep};

/// The tool families a step can be attributed to.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolFamily {
    Terraform,
    Helm,
    Kubernetes,
    Aws,
    Gcp,
    Azure,
    Docker,
}

impl ToolFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::Helm => "helm",
            Self::Kubernetes => "kubernetes",
            Self::Aws => "aws",
            Self::Gcp => "gcp",
            Self::Azure => "azure",
            Self::Docker => "docker",
        }
    }
}

/// Everything tool detection found in one workflow.
#[derive(Serialize, Clone, Debug, Default)]
pub struct ToolDetections {
    pub terraform: Vec<TerraformStep>,
    pub helm: Vec<HelmStep>,
    pub other: Vec<OtherToolStep>,
}

impl ToolDetections {
    /// Job ids containing at least one Terraform step.
    pub fn terraform_jobs(&self) -> Vec<&str> {
        self.terraform
            .iter()
            .map(|s| s.job_id.as_str())
            .unique()
            .collect()
    }

    /// Job ids containing at least one Helm step.
    pub fn helm_jobs(&self) -> Vec<&str> {
        self.helm.iter().map(|s| s.job_id.as_str()).unique().collect()
    }
}

/// Confidence assigned to `uses:`-matched steps.
pub(crate) const USES_CONFIDENCE: u8 = 95;
/// Base confidence for run-command matches.
pub(crate) const RUN_CONFIDENCE: i32 = 85;

/// Scans every step of every job, in declaration order.
pub fn detect_tools(workflow: &Workflow, options: &ParseOptions) -> ToolDetections {
    let mut detections = ToolDetections::default();

    for (job_id, job) in &workflow.jobs {
        for (step_index, step) in job.steps.iter().enumerate() {
            detect_step(job_id, step_index, step, options, &mut detections);
        }
    }

    detections.terraform.retain(|s| s.confidence >= options.min_confidence);
    detections.helm.retain(|s| s.confidence >= options.min_confidence);
    detections.other.retain(|s| s.confidence >= options.min_confidence);

    detections
}

/// Classifies one step into at most one family.
fn detect_step(
    job_id: &str,
    step_index: usize,
    step: &Step,
    options: &ParseOptions,
    detections: &mut ToolDetections,
) {
    if options.detect_terraform
        && let Some(detected) = terraform::detect(job_id, step_index, step)
    {
        tracing::debug!(job = job_id, step = step_index, command = ?detected.command, "terraform step");
        detections.terraform.push(detected);
        return;
    }

    if options.detect_helm
        && let Some(detected) = helm::detect(job_id, step_index, step)
    {
        tracing::debug!(job = job_id, step = step_index, command = ?detected.command, "helm step");
        detections.helm.push(detected);
        return;
    }

    if let Some(detected) = other::detect(job_id, step_index, step, options) {
        detections.other.push(detected);
    }
}

/// Applies the shared run-step confidence adjustments: +5 for an explicit
/// binary invocation, +3 for typical flags, -10 when the matched line
/// suggests non-executive usage (`echo`, `grep`, `which`), clamped to
/// [50, 100].
pub(crate) fn run_confidence(run: &str, explicit_marker: &str, typical_flags: &[&str]) -> u8 {
    let mut confidence = RUN_CONFIDENCE;

    if run.contains(explicit_marker) {
        confidence += 5;
    }
    if typical_flags.iter().any(|flag| run.contains(flag)) {
        confidence += 3;
    }
    if non_executive(run, explicit_marker.trim_end()) {
        confidence -= 10;
    }

    confidence.clamp(50, 100) as u8
}

/// Whether every line mentioning the tool starts with a non-executive
/// command like `echo`, `grep`, or `which`.
fn non_executive(run: &str, tool: &str) -> bool {
    let mut mentions = 0usize;
    let mut passive = 0usize;

    for line in run.lines() {
        if !line.contains(tool) {
            continue;
        }
        mentions += 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with("echo ")
            || trimmed.starts_with("grep ")
            || trimmed.starts_with("which ")
        {
            passive += 1;
        }
    }
    mentions > 0 && mentions == passive
}

/// Collapses whitespace inside `${{ … }}` regions so shell-token regexes
/// see each expression as a single token
/// (`--set t=${{ needs.b.outputs.x }}` → `--set t=${{needs.b.outputs.x}}`).
pub(crate) fn collapse_expressions(text: &str) -> String {
    static EXPR_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"(?s)\$\{\{.*?\}\}").unwrap()
    });
    EXPR_RE
        .replace_all(text, |captures: &regex::Captures<'_>| {
            captures[0]
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
        })
        .into_owned()
}

/// Case-insensitive `uses:` prefix matching against a family allow-list.
pub(crate) fn uses_matches<'a>(uses: &str, prefixes: &[&'a str]) -> Option<&'a str> {
    let lowered = uses.to_ascii_lowercase();
    prefixes
        .iter()
        .find(|prefix| lowered.starts_with(&prefix.to_ascii_lowercase()))
        .copied()
}

#[cfg(test)]
mod tests {
    use gha_models::WorkflowParser;
    use pretty_assertions::assert_eq;

    use super::*;

    fn workflow(source: &str) -> Workflow {
        WorkflowParser::new(ParseOptions::default())
            .parse(source, None)
            .value
            .expect("workflow value")
    }

    #[test]
    fn test_step_matches_one_family_only() {
        // A step mixing terraform and helm text is claimed by Terraform,
        // the first family in the order.
        let workflow = workflow(
            "on: push\njobs:\n  mixed:\n    runs-on: x\n    steps:\n      - run: terraform apply && helm upgrade app ./chart\n",
        );
        let detections = detect_tools(&workflow, &ParseOptions::default());

        assert_eq!(detections.terraform.len(), 1);
        assert_eq!(detections.helm.len(), 0);
        assert_eq!(detections.other.len(), 0);
    }

    #[test]
    fn test_detection_toggles() {
        let workflow = workflow(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: terraform plan\n      - run: helm lint ./chart\n",
        );
        let options = ParseOptions {
            detect_terraform: false,
            ..Default::default()
        };
        let detections = detect_tools(&workflow, &options);
        assert_eq!(detections.terraform.len(), 0);
        assert_eq!(detections.helm.len(), 1);
    }

    #[test]
    fn test_min_confidence_filters() {
        let workflow = workflow(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: 'echo terraform plan would run here'\n",
        );
        let options = ParseOptions {
            min_confidence: 90,
            ..Default::default()
        };
        let detections = detect_tools(&workflow, &options);
        assert_eq!(detections.terraform.len(), 0);
    }

    #[test]
    fn test_non_executive_detection() {
        assert!(non_executive("echo terraform plan", "terraform"));
        assert!(!non_executive("terraform plan", "terraform"));
        assert!(!non_executive(
            "echo starting\nterraform apply",
            "terraform"
        ));
    }
}
