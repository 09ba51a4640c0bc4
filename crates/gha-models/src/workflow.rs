//! The typed workflow model.

use indexmap::IndexMap;
use iac_diagnostics::SourceSpan;
use serde::Serialize;

use crate::common::{Concurrency, Defaults, Permissions, UsesCoordinate};
use crate::event::Trigger;

/// An entire GitHub Actions workflow.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Workflow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub triggers: Vec<Trigger>,
    pub env: IndexMap<String, String>,
    pub jobs: IndexMap<String, Job>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<Concurrency>,
}

impl Workflow {
    /// Whether any trigger has the given stable name.
    pub fn has_trigger(&self, name: &str) -> bool {
        self.triggers.iter().any(|trigger| trigger.name() == name)
    }

    /// The job ids every job in `needs` chains down from, i.e. the
    /// transitive closure of `needs` for `job_id`.
    pub fn needs_closure(&self, job_id: &str) -> Vec<String> {
        let mut closure = Vec::new();
        let mut stack = vec![job_id.to_string()];

        while let Some(current) = stack.pop() {
            let Some(job) = self.jobs.get(&current) else {
                continue;
            };
            for dependency in &job.needs {
                if !closure.contains(dependency) {
                    closure.push(dependency.clone());
                    stack.push(dependency.clone());
                }
            }
        }
        closure
    }
}

/// Where a job runs: a single runner label or a sequence of labels.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum RunsOn {
    One(String),
    Many(Vec<String>),
}

impl Default for RunsOn {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl RunsOn {
    /// All labels, regardless of form.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Self::One(label) => vec![label.as_str()],
            Self::Many(labels) => labels.iter().map(String::as_str).collect(),
        }
    }
}

/// A single workflow job.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Job {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub runs_on: RunsOn,
    pub needs: Vec<String>,
    pub outputs: IndexMap<String, String>,
    pub steps: Vec<Step>,
    pub env: IndexMap<String, String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    pub services: IndexMap<String, Container>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<JobEnvironment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<Concurrency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<Defaults>,
}

impl Job {
    /// Whether this job uses a matrix strategy.
    pub fn has_matrix(&self) -> bool {
        self.strategy
            .as_ref()
            .is_some_and(|strategy| !strategy.matrix.is_empty())
    }
}

/// Fields shared by both step forms.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct StepCommon {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_condition: Option<String>,
    pub env: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    pub span: SourceSpan,
}

/// A workflow step: a shell invocation or an action use.
///
/// A step is `Uses` exactly when its `uses:` key is a string; anything
/// else is a `Run` step, with `run` defaulting to the empty string.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Run {
        run: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        shell: Option<String>,
        #[serde(flatten)]
        common: StepCommon,
    },
    Uses {
        uses: String,
        with: IndexMap<String, String>,
        #[serde(flatten)]
        common: StepCommon,
    },
}

impl Step {
    pub fn common(&self) -> &StepCommon {
        match self {
            Self::Run { common, .. } | Self::Uses { common, .. } => common,
        }
    }

    /// The `run:` text for run steps.
    pub fn run_text(&self) -> Option<&str> {
        match self {
            Self::Run { run, .. } => Some(run),
            Self::Uses { .. } => None,
        }
    }

    /// The `uses:` clause for uses steps.
    pub fn uses_clause(&self) -> Option<&str> {
        match self {
            Self::Uses { uses, .. } => Some(uses),
            Self::Run { .. } => None,
        }
    }

    /// The parsed action coordinate for uses steps.
    pub fn coordinate(&self) -> Option<UsesCoordinate> {
        UsesCoordinate::parse(self.uses_clause()?).ok()
    }

    /// The `with:` input for a uses step.
    pub fn with_input(&self, key: &str) -> Option<&str> {
        match self {
            Self::Uses { with, .. } => with.get(key).map(String::as_str),
            Self::Run { .. } => None,
        }
    }
}

/// A job `strategy:`: matrix dimensions plus include/exclude rows.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Strategy {
    /// Array-valued matrix keys, in declaration order.
    pub matrix: IndexMap<String, Vec<serde_yaml::Value>>,
    pub include: Vec<IndexMap<String, serde_yaml::Value>>,
    pub exclude: Vec<IndexMap<String, serde_yaml::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_fast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<u64>,
}

/// A `container:` or `services:` entry.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Container {
    pub image: String,
    pub env: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,
}

/// A job `environment:`: bare name or `{name, url}` mapping.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct JobEnvironment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
