//! Intra-workflow output-flow detection.
//!
//! Discovers how values move between steps and jobs inside one workflow:
//! `needs.*.outputs.*` consumption, `steps.*.outputs.*` wiring, env
//! propagation, and Terraform→Helm job chains.

use std::collections::HashMap;

use gha_expressions::{ContextKind, extract_context_refs};
use gha_models::{Job, Step, Workflow};
use iac_diagnostics::ParseOptions;
use serde::Serialize;

use crate::tools::ToolDetections;

/// The kinds of intra-workflow flow.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFlowKind {
    JobOutput,
    StepOutput,
    EnvPropagation,
    TerraformToHelm,
}

impl OutputFlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobOutput => "job_output",
            Self::StepOutput => "step_output",
            Self::EnvPropagation => "env_propagation",
            Self::TerraformToHelm => "terraform_to_helm",
        }
    }

    fn confidence(&self) -> f64 {
        match self {
            Self::JobOutput | Self::StepOutput => 0.95,
            Self::EnvPropagation => 0.9,
            Self::TerraformToHelm => 0.85,
        }
    }
}

/// One discovered flow.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct OutputFlow {
    pub id: String,
    pub kind: OutputFlowKind,
    /// The producing job (`X` in `needs.X.outputs.Y`), when job-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_job: Option<String>,
    /// The producing step id (`X` in `steps.X.outputs.Y`), when
    /// step-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_step: Option<String>,
    pub output_name: String,
    pub target_job: String,
    /// The reference as written.
    pub expression: String,
    pub confidence: f64,
}

/// Discovers output flows across a workflow.
///
/// Flows are deduplicated by id, keeping the highest confidence; only
/// flows at or above the configured minimum are returned.
pub fn detect_output_flows(
    workflow: &Workflow,
    detections: &ToolDetections,
    options: &ParseOptions,
) -> Vec<OutputFlow> {
    let mut flows: HashMap<String, OutputFlow> = HashMap::new();
    let mut add = |flow: OutputFlow| match flows.get_mut(&flow.id) {
        Some(existing) => {
            if flow.confidence > existing.confidence {
                *existing = flow;
            }
        }
        None => {
            flows.insert(flow.id.clone(), flow);
        }
    };

    for (job_id, job) in &workflow.jobs {
        // Step texts are concatenated into one searchable buffer.
        let step_buffer = job_scan_buffer(job);
        for reference in extract_context_refs(&step_buffer) {
            match reference.context {
                ContextKind::Needs => {
                    if let Some((source_job, output)) = outputs_path(&reference.path) {
                        add(flow(
                            OutputFlowKind::JobOutput,
                            Some(source_job.clone()),
                            None,
                            &output,
                            job_id,
                            &reference.full_path,
                        ));
                    }
                }
                ContextKind::Steps => {
                    if let Some((source_step, output)) = outputs_path(&reference.path) {
                        add(flow(
                            OutputFlowKind::StepOutput,
                            None,
                            Some(source_step.clone()),
                            &output,
                            job_id,
                            &reference.full_path,
                        ));
                    }
                }
                _ => {}
            }
        }

        // Job-level env is scanned separately: a needs-output consumed
        // there is env propagation into the whole job.
        for value in job.env.values() {
            for reference in extract_context_refs(value) {
                if reference.context == ContextKind::Needs
                    && let Some((source_job, output)) = outputs_path(&reference.path)
                {
                    add(flow(
                        OutputFlowKind::EnvPropagation,
                        Some(source_job.clone()),
                        None,
                        &output,
                        job_id,
                        &reference.full_path,
                    ));
                }
            }
        }

        // Job outputs wire step outputs up to the job boundary.
        for value in job.outputs.values() {
            for reference in extract_context_refs(value) {
                if reference.context == ContextKind::Steps
                    && let Some((source_step, output)) = outputs_path(&reference.path)
                {
                    add(flow(
                        OutputFlowKind::StepOutput,
                        None,
                        Some(source_step.clone()),
                        &output,
                        job_id,
                        &reference.full_path,
                    ));
                }
            }
        }
    }

    // Terraform→Helm job chains: a Helm job needing a Terraform job and
    // consuming its outputs.
    let terraform_jobs = detections.terraform_jobs();
    for helm_job in detections.helm_jobs() {
        let Some(job) = workflow.jobs.get(helm_job) else {
            continue;
        };
        let closure = workflow.needs_closure(helm_job);
        let buffer = job_scan_buffer(job);

        for reference in extract_context_refs(&buffer) {
            if reference.context != ContextKind::Needs {
                continue;
            }
            let Some((source_job, output)) = outputs_path(&reference.path) else {
                continue;
            };
            if terraform_jobs.contains(&source_job.as_str())
                && closure.iter().any(|needed| needed == &source_job)
            {
                add(flow(
                    OutputFlowKind::TerraformToHelm,
                    Some(source_job.clone()),
                    None,
                    &output,
                    helm_job,
                    &reference.full_path,
                ));
            }
        }
    }

    let minimum = f64::from(options.min_confidence) / 100.0;
    let mut flows: Vec<OutputFlow> = flows
        .into_values()
        .filter(|flow| flow.confidence >= minimum)
        .collect();
    flows.sort_by(|a, b| a.id.cmp(&b.id));
    flows
}

fn flow(
    kind: OutputFlowKind,
    source_job: Option<String>,
    source_step: Option<String>,
    output_name: &str,
    target_job: &str,
    expression: &str,
) -> OutputFlow {
    let source = source_job
        .clone()
        .or_else(|| source_step.clone())
        .unwrap_or_default();
    OutputFlow {
        id: format!("{}:{source}.{output_name}->{target_job}", kind.as_str()),
        kind,
        source_job,
        source_step,
        output_name: output_name.to_string(),
        target_job: target_job.to_string(),
        expression: expression.to_string(),
        confidence: kind.confidence(),
    }
}

/// Splits a context path of the form `X.outputs.Y…` into `(X, Y…)`.
fn outputs_path(path: &[String]) -> Option<(String, String)> {
    if path.len() >= 3 && path[1] == "outputs" {
        Some((path[0].clone(), path[2..].join(".")))
    } else {
        None
    }
}

/// All step texts of a job, concatenated: run text, uses clause, `with:`
/// values, step env values, and `if:` conditions.
fn job_scan_buffer(job: &Job) -> String {
    let mut buffer = String::new();
    for step in &job.steps {
        match step {
            Step::Run { run, .. } => {
                buffer.push_str(run);
                buffer.push('\n');
            }
            Step::Uses { uses, with, .. } => {
                buffer.push_str(uses);
                buffer.push('\n');
                for value in with.values() {
                    buffer.push_str(value);
                    buffer.push('\n');
                }
            }
        }
        for value in step.common().env.values() {
            buffer.push_str(value);
            buffer.push('\n');
        }
        if let Some(condition) = &step.common().if_condition {
            buffer.push_str(condition);
            buffer.push('\n');
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use gha_models::WorkflowParser;
    use pretty_assertions::assert_eq;

    use crate::tools::detect_tools;

    use super::*;

    fn analyze(source: &str) -> Vec<OutputFlow> {
        let options = ParseOptions::default();
        let workflow = WorkflowParser::new(ParseOptions::default())
            .parse(source, None)
            .value
            .expect("workflow value");
        let detections = detect_tools(&workflow, &options);
        detect_output_flows(&workflow, &detections, &options)
    }

    const TF_HELM: &str = r#"
on: push
jobs:
  terraform:
    runs-on: ubuntu-latest
    outputs:
      endpoint: ${{ steps.tf.outputs.endpoint }}
    steps:
      - id: tf
        run: |
          terraform apply -auto-approve
          echo "endpoint=$(terraform output -raw endpoint)" >> "$GITHUB_OUTPUT"
  deploy:
    runs-on: ubuntu-latest
    needs: terraform
    env:
      ENDPOINT: ${{ needs.terraform.outputs.endpoint }}
    steps:
      - run: helm upgrade app ./chart --set api.endpoint=${{ needs.terraform.outputs.endpoint }}
"#;

    #[test]
    fn test_job_output_flow() {
        let flows = analyze(TF_HELM);
        let job_flow = flows
            .iter()
            .find(|f| f.kind == OutputFlowKind::JobOutput)
            .expect("job output flow");
        assert_eq!(job_flow.source_job.as_deref(), Some("terraform"));
        assert_eq!(job_flow.target_job, "deploy");
        assert_eq!(job_flow.output_name, "endpoint");
        assert_eq!(job_flow.confidence, 0.95);
    }

    #[test]
    fn test_step_output_flow_from_job_outputs() {
        let flows = analyze(TF_HELM);
        let step_flow = flows
            .iter()
            .find(|f| f.kind == OutputFlowKind::StepOutput)
            .expect("step output flow");
        assert_eq!(step_flow.source_step.as_deref(), Some("tf"));
        assert_eq!(step_flow.target_job, "terraform");
    }

    #[test]
    fn test_env_propagation_flow() {
        let flows = analyze(TF_HELM);
        assert!(flows.iter().any(|f| f.kind == OutputFlowKind::EnvPropagation));
    }

    #[test]
    fn test_terraform_to_helm_flow() {
        let flows = analyze(TF_HELM);
        let chain = flows
            .iter()
            .find(|f| f.kind == OutputFlowKind::TerraformToHelm)
            .expect("terraform_to_helm flow");
        assert_eq!(chain.source_job.as_deref(), Some("terraform"));
        assert_eq!(chain.target_job, "deploy");
        assert_eq!(chain.confidence, 0.85);
    }

    #[test]
    fn test_duplicates_keep_highest_confidence() {
        let flows = analyze(TF_HELM);
        let ids: Vec<&str> = flows.iter().map(|f| f.id.as_str()).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
    }

    #[test]
    fn test_min_confidence_threshold() {
        let options = ParseOptions {
            min_confidence: 90,
            ..Default::default()
        };
        let workflow = WorkflowParser::new(ParseOptions::default())
            .parse(TF_HELM, None)
            .value
            .expect("workflow value");
        let detections = detect_tools(&workflow, &options);
        let flows = detect_output_flows(&workflow, &detections, &options);
        assert!(flows.iter().all(|f| f.confidence >= 0.9));
        assert!(!flows.iter().any(|f| f.kind == OutputFlowKind::TerraformToHelm));
    }
}
