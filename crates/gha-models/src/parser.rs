//! Tolerant YAML → [`Workflow`] parsing.
//!
//! The document is deserialized into a YAML value first and the typed
//! model is built per entry, so a malformed job or step degrades to a
//! diagnostic instead of failing the whole document.

use indexmap::IndexMap;
use iac_diagnostics::{
    Diagnostic, DiagnosticCode, ParseOptions, ParseResult, Severity, SourceSpan,
};
use serde_yaml::Value;

use crate::common::{
    Concurrency, Defaults, PermissionLevel, Permissions, RunDefaults,
    normalize_permission_key, scalar_to_string, value_to_env,
};
use crate::event::Trigger;
use crate::workflow::{
    Container, Job, JobEnvironment, RunsOn, Step, StepCommon, Strategy, Workflow,
};

/// Parses workflow YAML into the typed model.
pub struct WorkflowParser {
    options: ParseOptions,
}

impl WorkflowParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parses `source` into a [`Workflow`].
    ///
    /// YAML-level failures are fatal unless error recovery is enabled;
    /// everything below that degrades per entry.
    pub fn parse(&self, source: &str, file_path: Option<&str>) -> ParseResult<Workflow> {
        if source.len() > self.options.yaml_size_limit() {
            let mut result = ParseResult {
                success: true,
                value: None,
                errors: Vec::new(),
                warnings: Vec::new(),
            };
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
                tracing::debug!(%error, "workflow YAML failed to parse");
                let diagnostic = Diagnostic {
                    code: DiagnosticCode::InvalidYaml,
                    message: format!("invalid YAML: {error}"),
                    location: error.location().map(|l| {
                        SourceSpan::point(l.line() as u32, l.column() as u32)
                    }),
                    severity: if self.options.error_recovery {
                        Severity::Error
                    } else {
                        Severity::Fatal
                    },
                    recoverable: self.options.error_recovery,
                };
                return if self.options.error_recovery {
                    let mut result = ParseResult {
                        success: true,
                        value: None,
                        errors: Vec::new(),
                        warnings: Vec::new(),
                    };
                    result.push(diagnostic);
                    result
                } else {
                    ParseResult::fatal(diagnostic)
                };
            }
        };

        let Some(mapping) = root.as_mapping() else {
            let mut result = ParseResult {
                success: true,
                value: None,
                errors: Vec::new(),
                warnings: Vec::new(),
            };
            result.push(Diagnostic::error(
                DiagnosticCode::InvalidWorkflow,
                "workflow document is not a mapping",
            ));
            return result;
        };

        let mut diagnostics = Vec::new();
        let locator = StepLocator::new(source);

        let mut workflow = Workflow {
            name: mapping.get("name").and_then(scalar_to_string),
            file_path: file_path.map(str::to_string),
            env: mapping.get("env").map(value_to_env).unwrap_or_default(),
            permissions: mapping.get("permissions").and_then(parse_permissions),
            concurrency: mapping.get("concurrency").and_then(parse_concurrency),
            defaults: mapping.get("defaults").and_then(parse_defaults),
            ..Default::default()
        };

        workflow.triggers = match mapping.get("on") {
            Some(on) => parse_triggers(on, &mut diagnostics),
            None => {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::InvalidWorkflow,
                    "workflow has no `on:` trigger",
                ));
                Vec::new()
            }
        };

        match mapping.get("jobs").and_then(Value::as_mapping) {
            Some(jobs) => {
                for (id, body) in jobs {
                    let Some(id) = id.as_str() else {
                        diagnostics.push(Diagnostic::warning(
                            DiagnosticCode::InvalidJob,
                            "job id is not a string; skipping",
                        ));
                        continue;
                    };
                    match parse_job(id, body, &locator, &mut diagnostics) {
                        Some(job) => {
                            workflow.jobs.insert(id.to_string(), job);
                        }
                        None => {
                            diagnostics.push(Diagnostic::warning(
                                DiagnosticCode::InvalidJob,
                                format!("job `{id}` is not a mapping; skipping"),
                            ));
                        }
                    }
                }
            }
            None => {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::InvalidWorkflow,
                    "workflow has no `jobs:` section",
                ));
            }
        }

        tracing::debug!(
            jobs = workflow.jobs.len(),
            triggers = workflow.triggers.len(),
            "workflow parsed"
        );
        ParseResult::with_diagnostics(workflow, diagnostics)
    }
}

/// Parses the `on:` value in all three forms: bare string, sequence of
/// strings, or a mapping of event → filter body.
fn parse_triggers(on: &Value, diagnostics: &mut Vec<Diagnostic>) -> Vec<Trigger> {
    match on {
        Value::String(event) => vec![Trigger::from_event(event, None)],
        Value::Sequence(events) => events
            .iter()
            .filter_map(|event| match event.as_str() {
                Some(event) => Some(Trigger::from_event(event, None)),
                None => {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticCode::InvalidTrigger,
                        "trigger entry is not a string; skipping",
                    ));
                    None
                }
            })
            .collect(),
        Value::Mapping(events) => events
            .iter()
            .filter_map(|(event, body)| match event.as_str() {
                Some(event) => {
                    let body = (!body.is_null()).then_some(body);
                    Some(Trigger::from_event(event, body))
                }
                None => {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticCode::InvalidTrigger,
                        "trigger key is not a string; skipping",
                    ));
                    None
                }
            })
            .collect(),
        _ => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::InvalidTrigger,
                "`on:` has an unsupported shape",
            ));
            Vec::new()
        }
    }
}

fn parse_job(
    id: &str,
    body: &Value,
    locator: &StepLocator<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Job> {
    let mapping = body.as_mapping()?;

    let mut job = Job {
        id: id.to_string(),
        name: mapping.get("name").and_then(scalar_to_string),
        runs_on: mapping.get("runs-on").map(parse_runs_on).unwrap_or_default(),
        needs: mapping.get("needs").map(parse_string_or_list).unwrap_or_default(),
        outputs: mapping.get("outputs").map(value_to_env).unwrap_or_default(),
        env: mapping.get("env").map(value_to_env).unwrap_or_default(),
        if_condition: mapping.get("if").and_then(scalar_to_string),
        strategy: mapping.get("strategy").and_then(parse_strategy),
        container: mapping.get("container").and_then(parse_container),
        environment: mapping.get("environment").and_then(parse_environment),
        permissions: mapping.get("permissions").and_then(parse_permissions),
        concurrency: mapping.get("concurrency").and_then(parse_concurrency),
        defaults: mapping.get("defaults").and_then(parse_defaults),
        ..Default::default()
    };

    if let Some(services) = mapping.get("services").and_then(Value::as_mapping) {
        for (name, config) in services {
            if let (Some(name), Some(container)) =
                (name.as_str(), parse_container(config))
            {
                job.services.insert(name.to_string(), container);
            }
        }
    }

    if let Some(steps) = mapping.get("steps") {
        match steps.as_sequence() {
            Some(entries) => {
                let spans = locator.step_spans(id, entries.len());
                for (index, entry) in entries.iter().enumerate() {
                    let span = spans.get(index).cloned().unwrap_or_default();
                    match parse_step(entry, span) {
                        Some(step) => job.steps.push(step),
                        None => diagnostics.push(Diagnostic::warning(
                            DiagnosticCode::InvalidStep,
                            format!("step {index} of job `{id}` is not a mapping; skipping"),
                        )),
                    }
                }
            }
            None => diagnostics.push(Diagnostic::warning(
                DiagnosticCode::InvalidStep,
                format!("`steps` of job `{id}` is not a sequence"),
            )),
        }
    }

    Some(job)
}

/// A step is `Uses` exactly when `uses` is a string; otherwise it is a
/// `Run` step with `run` defaulting to empty.
fn parse_step(entry: &Value, span: SourceSpan) -> Option<Step> {
    let mapping = entry.as_mapping()?;

    let common = StepCommon {
        id: mapping.get("id").and_then(scalar_to_string),
        name: mapping.get("name").and_then(scalar_to_string),
        if_condition: mapping.get("if").and_then(scalar_to_string),
        env: mapping.get("env").map(value_to_env).unwrap_or_default(),
        continue_on_error: mapping.get("continue-on-error").and_then(Value::as_bool),
        timeout_minutes: mapping.get("timeout-minutes").and_then(Value::as_f64),
        working_directory: mapping.get("working-directory").and_then(scalar_to_string),
        span,
    };

    if let Some(Value::String(uses)) = mapping.get("uses") {
        return Some(Step::Uses {
            uses: uses.clone(),
            with: mapping.get("with").map(value_to_env).unwrap_or_default(),
            common,
        });
    }

    Some(Step::Run {
        run: mapping.get("run").and_then(scalar_to_string).unwrap_or_default(),
        shell: mapping.get("shell").and_then(scalar_to_string),
        common,
    })
}

fn parse_runs_on(value: &Value) -> RunsOn {
    match value {
        Value::String(label) => RunsOn::One(label.clone()),
        Value::Sequence(labels) => RunsOn::Many(
            labels
                .iter()
                .filter_map(scalar_to_string)
                .filter(|l| !l.is_empty())
                .collect(),
        ),
        _ => RunsOn::default(),
    }
}

fn parse_string_or_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(one) => vec![one.clone()],
        Value::Sequence(many) => many
            .iter()
            .filter_map(scalar_to_string)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Accepts kebab-case and camelCase scope keys; retains only
/// `read`/`write`/`none` values.
fn parse_permissions(value: &Value) -> Option<Permissions> {
    match value {
        Value::String(base) => Some(Permissions::Base(base.clone())),
        Value::Mapping(mapping) => {
            let mut scopes = IndexMap::new();
            for (key, level) in mapping {
                let (Some(key), Some(level)) = (key.as_str(), level.as_str()) else {
                    continue;
                };
                if let Some(level) = PermissionLevel::from_str(level) {
                    scopes.insert(normalize_permission_key(key), level);
                }
            }
            Some(Permissions::Explicit(scopes))
        }
        _ => None,
    }
}

/// A bare string is a group with `cancel-in-progress: false`.
fn parse_concurrency(value: &Value) -> Option<Concurrency> {
    match value {
        Value::String(group) => Some(Concurrency {
            group: group.clone(),
            cancel_in_progress: false,
        }),
        Value::Mapping(mapping) => Some(Concurrency {
            group: mapping.get("group").and_then(scalar_to_string).unwrap_or_default(),
            cancel_in_progress: mapping
                .get("cancel-in-progress")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        _ => None,
    }
}

fn parse_defaults(value: &Value) -> Option<Defaults> {
    let mapping = value.as_mapping()?;
    let run = mapping.get("run").and_then(Value::as_mapping).map(|run| RunDefaults {
        shell: run.get("shell").and_then(scalar_to_string),
        working_directory: run.get("working-directory").and_then(scalar_to_string),
    });
    Some(Defaults { run })
}

/// Matrix dimensions are the array-valued keys; `include` and `exclude`
/// rows are kept separately.
fn parse_strategy(value: &Value) -> Option<Strategy> {
    let mapping = value.as_mapping()?;
    let mut strategy = Strategy {
        fail_fast: mapping.get("fail-fast").and_then(Value::as_bool),
        max_parallel: mapping.get("max-parallel").and_then(Value::as_u64),
        ..Default::default()
    };

    if let Some(matrix) = mapping.get("matrix").and_then(Value::as_mapping) {
        for (key, value) in matrix {
            let Some(key) = key.as_str() else {
                continue;
            };
            match key {
                "include" | "exclude" => {
                    let rows = value
                        .as_sequence()
                        .map(|rows| rows.iter().filter_map(mapping_row).collect())
                        .unwrap_or_default();
                    if key == "include" {
                        strategy.include = rows;
                    } else {
                        strategy.exclude = rows;
                    }
                }
                _ => {
                    if let Some(values) = value.as_sequence() {
                        strategy.matrix.insert(key.to_string(), values.clone());
                    }
                }
            }
        }
    }

    Some(strategy)
}

fn mapping_row(value: &Value) -> Option<IndexMap<String, Value>> {
    let mapping = value.as_mapping()?;
    let mut row = IndexMap::new();
    for (key, value) in mapping {
        if let Some(key) = key.as_str() {
            row.insert(key.to_string(), value.clone());
        }
    }
    Some(row)
}

fn parse_container(value: &Value) -> Option<Container> {
    match value {
        Value::String(image) => Some(Container {
            image: image.clone(),
            ..Default::default()
        }),
        Value::Mapping(mapping) => Some(Container {
            image: mapping.get("image").and_then(scalar_to_string).unwrap_or_default(),
            env: mapping.get("env").map(value_to_env).unwrap_or_default(),
            options: mapping.get("options").and_then(scalar_to_string),
        }),
        _ => None,
    }
}

fn parse_environment(value: &Value) -> Option<JobEnvironment> {
    match value {
        Value::String(name) => Some(JobEnvironment {
            name: Some(name.clone()),
            url: None,
        }),
        Value::Mapping(mapping) => Some(JobEnvironment {
            name: mapping.get("name").and_then(scalar_to_string),
            url: mapping.get("url").and_then(scalar_to_string),
        }),
        _ => None,
    }
}

/// Best-effort source locations for steps, recovered by scanning the raw
/// text (the YAML value tree does not retain positions). Locations are
/// supplementary; a miss yields a default span.
struct StepLocator<'src> {
    lines: Vec<&'src str>,
}

impl<'src> StepLocator<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            lines: source.lines().collect(),
        }
    }

    fn indent(line: &str) -> usize {
        line.len() - line.trim_start().len()
    }

    /// 1-based line/column spans for the first `count` steps of a job.
    fn step_spans(&self, job_id: &str, count: usize) -> Vec<SourceSpan> {
        let Some(job_line) = self.job_line(job_id) else {
            return Vec::new();
        };
        let job_indent = Self::indent(self.lines[job_line]);

        let mut steps_line = None;
        for (offset, line) in self.lines[job_line + 1..].iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = Self::indent(line);
            if indent <= job_indent {
                break;
            }
            if trimmed == "steps:" || trimmed.starts_with("steps:") {
                steps_line = Some(job_line + 1 + offset);
                break;
            }
        }
        let Some(steps_line) = steps_line else {
            return Vec::new();
        };

        let mut spans = Vec::new();
        let mut item_indent = None;
        for (offset, line) in self.lines[steps_line + 1..].iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = Self::indent(line);
            if indent <= job_indent {
                break;
            }
            if trimmed.starts_with('-') {
                let item = *item_indent.get_or_insert(indent);
                if indent == item {
                    let line_number = (steps_line + 1 + offset + 1) as u32;
                    spans.push(SourceSpan::point(line_number, (indent + 1) as u32));
                    if spans.len() == count {
                        break;
                    }
                }
            }
        }
        spans
    }

    /// Finds the line declaring `job_id` under the `jobs:` section.
    fn job_line(&self, job_id: &str) -> Option<usize> {
        let jobs_line = self
            .lines
            .iter()
            .position(|line| line.trim_end() == "jobs:")?;

        let quoted = format!("\"{job_id}\":");
        self.lines[jobs_line + 1..]
            .iter()
            .position(|line| {
                let trimmed = line.trim();
                trimmed.strip_prefix(job_id).is_some_and(|rest| rest.starts_with(':'))
                    || trimmed.starts_with(&quoted)
            })
            .map(|offset| jobs_line + 1 + offset)
    }
}
