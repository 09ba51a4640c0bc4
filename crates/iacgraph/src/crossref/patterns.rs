//! Pattern-specific flow detectors.
//!
//! Each detector accumulates its own evidence; the engine deduplicates
//! and bounds the combined candidate set.

use std::sync::LazyLock;

use gha_expressions::{ContextKind, extract_context_refs};
use gha_models::{Step, Workflow};
use regex::Regex;

use crate::tools::{HelmStep, ToolDetections, collapse_expressions};

use super::{
    Evidence, EvidenceKind, Flow, FlowPattern, HelmValueSite, HelmValueSource,
    TfOutputInfo, WorkflowContext, build_flow,
};

/// `echo "KEY=$(terraform output … NAME)" >> $GITHUB_OUTPUT`.
static GH_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"echo\s+["']?([A-Za-z0-9_-]+)=\$\((?:terraform|tf)\s+output\s+(?:-raw\s+|-json\s+)?([A-Za-z0-9_.-]+)\)["']?\s*>>\s*["']?\$\{?GITHUB_OUTPUT"#,
    )
    .unwrap()
});

/// The same wiring into `$GITHUB_ENV`.
static GH_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"echo\s+["']?([A-Za-z0-9_-]+)=\$\((?:terraform|tf)\s+output\s+(?:-raw\s+|-json\s+)?([A-Za-z0-9_.-]+)\)["']?\s*>>\s*["']?\$\{?GITHUB_ENV"#,
    )
    .unwrap()
});

/// A bare `terraform output NAME` invocation.
static OUTPUT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:terraform|tf)\s+output\s+(?:-raw\s+|-json\s+)?([A-Za-z0-9_-]+)").unwrap()
});

/// `terraform output … > PATH` redirection.
static OUTPUT_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:terraform|tf)\s+output\s+(?:-json\s+|-raw\s+)?([A-Za-z0-9_-]+)?\s*>\s*([^\s>]+)",
    )
    .unwrap()
});

/// `kubectl create secret TYPE NAME`.
static SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"kubectl\s+create\s+secret\s+(?:generic|tls|docker-registry)\s+(\S+)").unwrap()
});

/// A Terraform output produced inside a job.
pub(crate) struct TfOutput {
    pub name: String,
    /// The job-output key it is exposed under, when wired through
    /// `$GITHUB_OUTPUT`.
    pub github_key: Option<String>,
    pub step_index: usize,
}

/// Everything the detectors need to know about one Terraform job.
pub(crate) struct TfJobInfo {
    pub job_id: String,
    pub outputs: Vec<TfOutput>,
    /// Env key → output name pairs wired through `$GITHUB_ENV`.
    pub env_outputs: Vec<(String, String, usize)>,
    /// (optional output name, file path) redirections.
    pub file_outputs: Vec<(Option<String>, String, usize)>,
    /// Kubernetes secrets created from Terraform output.
    pub secrets: Vec<(String, usize)>,
    /// Uploaded artifact names.
    pub artifacts: Vec<(String, usize)>,
    pub job_output_keys: Vec<String>,
    pub has_matrix: bool,
}

impl TfJobInfo {
    /// Resolves a job-output key back to the Terraform output behind it.
    fn resolve(&self, github_key: &str) -> (String, Option<usize>) {
        match self
            .outputs
            .iter()
            .find(|output| output.github_key.as_deref() == Some(github_key))
        {
            Some(output) => (output.name.clone(), Some(output.step_index)),
            None => (github_key.to_string(), None),
        }
    }
}

/// Everything the detectors need to know about one Helm job.
pub(crate) struct HelmJobInfo<'a> {
    pub job_id: String,
    pub steps: Vec<&'a HelmStep>,
    /// Downloaded artifact names.
    pub downloads: Vec<(String, usize)>,
    /// All step text of the job, expression-collapsed.
    pub buffer: String,
    pub has_matrix: bool,
}

/// Shared per-workflow context for all detectors.
pub(crate) struct EngineContext<'a> {
    pub workflow: &'a Workflow,
    pub tf_jobs: Vec<TfJobInfo>,
    pub helm_jobs: Vec<HelmJobInfo<'a>>,
    pub context: WorkflowContext,
}

impl<'a> EngineContext<'a> {
    pub(crate) fn new(workflow: &'a Workflow, detections: &'a ToolDetections) -> Self {
        let mut tf_jobs: Vec<TfJobInfo> = Vec::new();
        for step in &detections.terraform {
            if !tf_jobs.iter().any(|j| j.job_id == step.job_id) {
                tf_jobs.push(tf_job_info(workflow, detections, &step.job_id));
            }
        }

        let mut helm_jobs: Vec<HelmJobInfo<'a>> = Vec::new();
        for step in &detections.helm {
            if !helm_jobs.iter().any(|j| j.job_id == step.job_id) {
                helm_jobs.push(helm_job_info(workflow, detections, &step.job_id));
            }
        }

        Self {
            workflow,
            tf_jobs,
            helm_jobs,
            context: WorkflowContext {
                workflow_name: workflow.name.clone(),
                file_path: workflow.file_path.clone(),
            },
        }
    }

    fn tf_job(&self, job_id: &str) -> Option<&TfJobInfo> {
        self.tf_jobs.iter().find(|job| job.job_id == job_id)
    }

    /// The collapsed run text of one step.
    fn step_run(&self, job_id: &str, step_index: usize) -> Option<String> {
        let step = self.workflow.jobs.get(job_id)?.steps.get(step_index)?;
        step.run_text().map(collapse_expressions)
    }
}

fn tf_job_info(workflow: &Workflow, detections: &ToolDetections, job_id: &str) -> TfJobInfo {
    let mut info = TfJobInfo {
        job_id: job_id.to_string(),
        outputs: Vec::new(),
        env_outputs: Vec::new(),
        file_outputs: Vec::new(),
        secrets: Vec::new(),
        artifacts: Vec::new(),
        job_output_keys: Vec::new(),
        has_matrix: false,
    };

    let Some(job) = workflow.jobs.get(job_id) else {
        return info;
    };
    info.job_output_keys = job.outputs.keys().cloned().collect();
    info.has_matrix = job.has_matrix();

    for tool_step in detections.terraform.iter().filter(|s| s.job_id == job_id) {
        let Some(step) = job.steps.get(tool_step.step_index) else {
            continue;
        };
        let Some(run) = step.run_text() else {
            continue;
        };
        let run = collapse_expressions(run);

        for captures in GH_OUTPUT_RE.captures_iter(&run) {
            if let (Some(key), Some(name)) = (captures.get(1), captures.get(2)) {
                info.outputs.push(TfOutput {
                    name: name.as_str().to_string(),
                    github_key: Some(key.as_str().to_string()),
                    step_index: tool_step.step_index,
                });
            }
        }
        for captures in GH_ENV_RE.captures_iter(&run) {
            if let (Some(key), Some(name)) = (captures.get(1), captures.get(2)) {
                info.env_outputs.push((
                    key.as_str().to_string(),
                    name.as_str().to_string(),
                    tool_step.step_index,
                ));
            }
        }
        for captures in OUTPUT_NAME_RE.captures_iter(&run) {
            if let Some(name) = captures.get(1) {
                let name = name.as_str();
                if !info.outputs.iter().any(|o| o.name == name) {
                    info.outputs.push(TfOutput {
                        name: name.to_string(),
                        github_key: None,
                        step_index: tool_step.step_index,
                    });
                }
            }
        }
        for captures in OUTPUT_FILE_RE.captures_iter(&run) {
            let Some(path) = captures.get(2) else {
                continue;
            };
            let path = path.as_str();
            if path.contains("GITHUB_OUTPUT") || path.contains("GITHUB_ENV") {
                continue;
            }
            info.file_outputs.push((
                captures.get(1).map(|m| m.as_str().to_string()),
                path.to_string(),
                tool_step.step_index,
            ));
        }
        if run.contains("terraform output") || run.contains("tf output") {
            for captures in SECRET_RE.captures_iter(&run) {
                if let Some(name) = captures.get(1) {
                    info.secrets
                        .push((name.as_str().to_string(), tool_step.step_index));
                }
            }
        }
    }

    for (index, step) in job.steps.iter().enumerate() {
        if let Some(uses) = step.uses_clause()
            && uses.starts_with("actions/upload-artifact")
            && let Some(name) = step.with_input("name")
        {
            info.artifacts.push((name.to_string(), index));
        }
    }

    info
}

fn helm_job_info<'a>(
    workflow: &Workflow,
    detections: &'a ToolDetections,
    job_id: &str,
) -> HelmJobInfo<'a> {
    let steps: Vec<&'a HelmStep> = detections
        .helm
        .iter()
        .filter(|s| s.job_id == job_id)
        .collect();

    let mut buffer = String::new();
    let mut downloads = Vec::new();
    let mut has_matrix = false;

    if let Some(job) = workflow.jobs.get(job_id) {
        has_matrix = job.has_matrix();
        for (index, step) in job.steps.iter().enumerate() {
            match step {
                Step::Run { run, .. } => {
                    buffer.push_str(&collapse_expressions(run));
                    buffer.push('\n');
                }
                Step::Uses { uses, with, .. } => {
                    if uses.starts_with("actions/download-artifact")
                        && let Some(name) = step.with_input("name")
                    {
                        downloads.push((name.to_string(), index));
                    }
                    buffer.push_str(uses);
                    buffer.push('\n');
                    for value in with.values() {
                        buffer.push_str(&collapse_expressions(value));
                        buffer.push('\n');
                    }
                }
            }
            for value in step.common().env.values() {
                buffer.push_str(&collapse_expressions(value));
                buffer.push('\n');
            }
        }
    }

    HelmJobInfo {
        job_id: job_id.to_string(),
        steps,
        downloads,
        buffer,
        has_matrix,
    }
}

/// `needs.X.outputs.Y` pairs referenced in a text.
fn needs_output_refs(text: &str) -> Vec<(String, String)> {
    extract_context_refs(text)
        .into_iter()
        .filter(|r| r.context == ContextKind::Needs)
        .filter_map(|r| {
            if r.path.len() >= 3 && r.path[1] == "outputs" {
                Some((r.path[0].clone(), r.path[2..].join(".")))
            } else {
                None
            }
        })
        .collect()
}

/// A Terraform job output consumed in a Helm `--set` through an explicit
/// `needs.*.outputs.*` reference, exposed through the job's `outputs:`.
pub(crate) fn direct_output(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for helm_job in &ctx.helm_jobs {
        let closure = ctx.workflow.needs_closure(&helm_job.job_id);

        for step in &helm_job.steps {
            for (set_key, set_value) in &step.set_values {
                for (tf_job_id, output_key) in needs_output_refs(set_value) {
                    let Some(tf_job) = ctx.tf_job(&tf_job_id) else {
                        continue;
                    };
                    if !tf_job.job_output_keys.contains(&output_key) {
                        continue;
                    }

                    let mut evidence = vec![Evidence::of(
                        EvidenceKind::ExplicitReference,
                        format!(
                            "--set {set_key} references needs.{tf_job_id}.outputs.{output_key}"
                        ),
                    )];
                    if closure.iter().any(|needed| needed == &tf_job_id) {
                        evidence.push(Evidence::of(
                            EvidenceKind::JobDependency,
                            format!("{} needs {tf_job_id}", helm_job.job_id),
                        ));
                    }

                    let (output_name, step_index) = tf_job.resolve(&output_key);
                    flows.push(build_flow(
                        FlowPattern::DirectOutput,
                        TfOutputInfo {
                            job_id: tf_job_id.clone(),
                            step_index,
                            output_name,
                            github_output_key: Some(output_key.clone()),
                        },
                        HelmValueSource {
                            job_id: helm_job.job_id.clone(),
                            step_index: Some(step.step_index),
                            site: HelmValueSite::SetValue,
                            target: set_key.clone(),
                        },
                        evidence,
                        ctx.context.clone(),
                    ));
                }
            }
        }
    }
    flows
}

/// A Terraform output exported to `$GITHUB_ENV` and consumed by a Helm
/// step in the same job as `${{ env.KEY }}` or `$KEY`.
pub(crate) fn output_to_env(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for helm_job in &ctx.helm_jobs {
        let Some(tf_job) = ctx.tf_job(&helm_job.job_id) else {
            continue;
        };

        for (env_key, output_name, tf_step) in &tf_job.env_outputs {
            for step in &helm_job.steps {
                let run = ctx
                    .step_run(&helm_job.job_id, step.step_index)
                    .unwrap_or_default();
                let expr_form = format!("env.{env_key}");
                let shell_form = format!("${env_key}");
                let braced_form = format!("${{{env_key}}}");

                let consumed = run.contains(&expr_form)
                    || run.contains(&shell_form)
                    || run.contains(&braced_form)
                    || step.set_values.values().any(|v| v.contains(&expr_form))
                    || step.env_vars.values().any(|v| v.contains(&expr_form));
                if !consumed {
                    continue;
                }

                flows.push(build_flow(
                    FlowPattern::OutputToEnv,
                    TfOutputInfo {
                        job_id: tf_job.job_id.clone(),
                        step_index: Some(*tf_step),
                        output_name: output_name.clone(),
                        github_output_key: None,
                    },
                    HelmValueSource {
                        job_id: helm_job.job_id.clone(),
                        step_index: Some(step.step_index),
                        site: HelmValueSite::Env,
                        target: env_key.clone(),
                    },
                    vec![Evidence::of(
                        EvidenceKind::EnvVariable,
                        format!("terraform output {output_name} exported as ${env_key}"),
                    )],
                    ctx.context.clone(),
                ));
            }
        }
    }
    flows
}

/// `terraform output -json > FILE` consumed via `-f FILE` or
/// `--set-file KEY=FILE`.
pub(crate) fn output_to_file(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for tf_job in &ctx.tf_jobs {
        for (output_name, path, tf_step) in &tf_job.file_outputs {
            for helm_job in &ctx.helm_jobs {
                let reachable = helm_job.job_id == tf_job.job_id
                    || ctx
                        .workflow
                        .needs_closure(&helm_job.job_id)
                        .iter()
                        .any(|needed| needed == &tf_job.job_id);
                if !reachable {
                    continue;
                }

                for step in &helm_job.steps {
                    let site = if step.values_files.iter().any(|f| f == path) {
                        Some((HelmValueSite::ValuesFile, path.clone()))
                    } else {
                        step.set_files
                            .iter()
                            .find(|(_, file)| *file == path)
                            .map(|(key, _)| (HelmValueSite::SetFile, key.clone()))
                    };
                    let Some((site, target)) = site else {
                        continue;
                    };

                    flows.push(build_flow(
                        FlowPattern::OutputToFile,
                        TfOutputInfo {
                            job_id: tf_job.job_id.clone(),
                            step_index: Some(*tf_step),
                            output_name: output_name
                                .clone()
                                .unwrap_or_else(|| "outputs".to_string()),
                            github_output_key: None,
                        },
                        HelmValueSource {
                            job_id: helm_job.job_id.clone(),
                            step_index: Some(step.step_index),
                            site,
                            target,
                        },
                        vec![Evidence::of(
                            EvidenceKind::FilePathMatch,
                            format!("terraform output written to {path} and consumed by helm"),
                        )],
                        ctx.context.clone(),
                    ));
                }
            }
        }
    }
    flows
}

/// A Terraform output piped into a Kubernetes secret that Helm then
/// references.
pub(crate) fn output_to_secret(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for tf_job in &ctx.tf_jobs {
        for (secret, tf_step) in &tf_job.secrets {
            for helm_job in &ctx.helm_jobs {
                let reachable = helm_job.job_id == tf_job.job_id
                    || ctx
                        .workflow
                        .needs_closure(&helm_job.job_id)
                        .iter()
                        .any(|needed| needed == &tf_job.job_id);
                if !reachable || !helm_job.buffer.contains(secret.as_str()) {
                    continue;
                }

                flows.push(build_flow(
                    FlowPattern::OutputToSecret,
                    TfOutputInfo {
                        job_id: tf_job.job_id.clone(),
                        step_index: Some(*tf_step),
                        output_name: secret.clone(),
                        github_output_key: None,
                    },
                    HelmValueSource {
                        job_id: helm_job.job_id.clone(),
                        step_index: None,
                        site: HelmValueSite::Secret,
                        target: secret.clone(),
                    },
                    vec![Evidence::of(
                        EvidenceKind::SemanticMatch,
                        format!("secret {secret} created from terraform output"),
                    )],
                    ctx.context.clone(),
                ));
            }
        }
    }
    flows
}

/// A dependency chain with no expression-level evidence, where output
/// names match Helm configuration by naming convention.
pub(crate) fn job_chain(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for helm_job in &ctx.helm_jobs {
        let closure = ctx.workflow.needs_closure(&helm_job.job_id);
        let explicit: Vec<(String, String)> = needs_output_refs(&helm_job.buffer);

        for tf_job_id in &closure {
            let Some(tf_job) = ctx.tf_job(tf_job_id) else {
                continue;
            };
            if explicit.iter().any(|(job, _)| job == tf_job_id) {
                continue;
            }

            let mut names: Vec<&str> =
                tf_job.outputs.iter().map(|o| o.name.as_str()).collect();
            names.extend(tf_job.job_output_keys.iter().map(String::as_str));
            names.dedup();

            for name in names {
                for step in &helm_job.steps {
                    let set_match = step
                        .set_values
                        .keys()
                        .find(|key| names_align(name, key))
                        .cloned();
                    let file_match = step
                        .values_files
                        .iter()
                        .find(|file| file.contains(name))
                        .cloned();
                    let Some(target) = set_match.clone().or(file_match) else {
                        continue;
                    };

                    flows.push(build_flow(
                        FlowPattern::JobChain,
                        TfOutputInfo {
                            job_id: tf_job.job_id.clone(),
                            step_index: None,
                            output_name: name.to_string(),
                            github_output_key: None,
                        },
                        HelmValueSource {
                            job_id: helm_job.job_id.clone(),
                            step_index: Some(step.step_index),
                            site: if set_match.is_some() {
                                HelmValueSite::SetValue
                            } else {
                                HelmValueSite::ValuesFile
                            },
                            target,
                        },
                        vec![
                            Evidence::of(
                                EvidenceKind::JobDependency,
                                format!("{} needs {tf_job_id}", helm_job.job_id),
                            ),
                            Evidence::of(
                                EvidenceKind::NamingConvention,
                                format!("output {name} matches helm configuration"),
                            ),
                        ],
                        ctx.context.clone(),
                    ));
                }
            }
        }
    }
    flows
}

/// An artifact uploaded by the Terraform job and downloaded by the Helm
/// job.
pub(crate) fn artifact_transfer(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for tf_job in &ctx.tf_jobs {
        for (artifact, tf_step) in &tf_job.artifacts {
            for helm_job in &ctx.helm_jobs {
                let Some((_, download_step)) = helm_job
                    .downloads
                    .iter()
                    .find(|(name, _)| name == artifact)
                else {
                    continue;
                };

                flows.push(build_flow(
                    FlowPattern::ArtifactTransfer,
                    TfOutputInfo {
                        job_id: tf_job.job_id.clone(),
                        step_index: Some(*tf_step),
                        output_name: artifact.clone(),
                        github_output_key: None,
                    },
                    HelmValueSource {
                        job_id: helm_job.job_id.clone(),
                        step_index: Some(*download_step),
                        site: HelmValueSite::Artifact,
                        target: artifact.clone(),
                    },
                    vec![Evidence::of(
                        EvidenceKind::ArtifactPath,
                        format!("artifact {artifact} uploaded and downloaded"),
                    )],
                    ctx.context.clone(),
                ));
            }
        }
    }
    flows
}

/// Output references flowing through a matrix dimension.
pub(crate) fn matrix_propagation(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for helm_job in &ctx.helm_jobs {
        if !helm_job.buffer.contains("matrix.") {
            continue;
        }
        let closure = ctx.workflow.needs_closure(&helm_job.job_id);

        for (tf_job_id, output_key) in needs_output_refs(&helm_job.buffer) {
            let Some(tf_job) = ctx.tf_job(&tf_job_id) else {
                continue;
            };
            if !helm_job.has_matrix && !tf_job.has_matrix {
                continue;
            }

            let mut evidence = vec![Evidence::weighted(
                EvidenceKind::ExplicitReference,
                format!("needs.{tf_job_id}.outputs.{output_key} used under a matrix"),
                0.8,
            )];
            if closure.iter().any(|needed| needed == &tf_job_id) {
                evidence.push(Evidence::of(
                    EvidenceKind::JobDependency,
                    format!("{} needs {tf_job_id}", helm_job.job_id),
                ));
            }

            let (output_name, step_index) = tf_job.resolve(&output_key);
            flows.push(build_flow(
                FlowPattern::MatrixPropagation,
                TfOutputInfo {
                    job_id: tf_job_id.clone(),
                    step_index,
                    output_name,
                    github_output_key: Some(output_key),
                },
                HelmValueSource {
                    job_id: helm_job.job_id.clone(),
                    step_index: None,
                    site: HelmValueSite::SetValue,
                    target: "matrix".to_string(),
                },
                evidence,
                ctx.context.clone(),
            ));
        }
    }
    flows
}

/// Heuristic naming matches (`image_tag` → `image.tag`) with no other
/// supporting evidence. Only consulted when inferred flows are enabled.
pub(crate) fn inferred(ctx: &EngineContext<'_>) -> Vec<Flow> {
    let mut flows = Vec::new();

    for tf_job in &ctx.tf_jobs {
        let mut names: Vec<&str> = tf_job.outputs.iter().map(|o| o.name.as_str()).collect();
        names.extend(tf_job.job_output_keys.iter().map(String::as_str));
        names.dedup();

        for helm_job in &ctx.helm_jobs {
            let explicit = needs_output_refs(&helm_job.buffer);

            for name in &names {
                if explicit
                    .iter()
                    .any(|(job, output)| job == &tf_job.job_id && output == name)
                {
                    continue;
                }

                for step in &helm_job.steps {
                    let Some(set_key) =
                        step.set_values.keys().find(|key| names_align(name, key))
                    else {
                        continue;
                    };

                    flows.push(build_flow(
                        FlowPattern::Inferred,
                        TfOutputInfo {
                            job_id: tf_job.job_id.clone(),
                            step_index: None,
                            output_name: name.to_string(),
                            github_output_key: None,
                        },
                        HelmValueSource {
                            job_id: helm_job.job_id.clone(),
                            step_index: Some(step.step_index),
                            site: HelmValueSite::Naming,
                            target: set_key.clone(),
                        },
                        vec![Evidence::of(
                            EvidenceKind::NamingConvention,
                            format!("output {name} resembles --set {set_key}"),
                        )],
                        ctx.context.clone(),
                    ));
                }
            }
        }
    }
    flows
}

/// Whether a Terraform output name and a Helm `--set` path align by
/// naming convention: `image_tag` matches `image.tag`, and a bare name
/// matches the path's final segment.
fn names_align(output_name: &str, set_key: &str) -> bool {
    let flattened = set_key.replace('.', "_").to_ascii_lowercase();
    let output = output_name.to_ascii_lowercase();
    if flattened == output {
        return true;
    }
    set_key
        .rsplit('.')
        .next()
        .is_some_and(|last| last.to_ascii_lowercase() == output)
}
