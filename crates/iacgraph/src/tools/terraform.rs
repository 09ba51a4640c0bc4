//! Terraform step detection and argument extraction.

use std::sync::LazyLock;

use indexmap::IndexMap;
use gha_models::Step;
use regex::Regex;
use serde::Serialize;

use super::{USES_CONFIDENCE, collapse_expressions, run_confidence, uses_matches};

/// `uses:` prefixes that mark a step as Terraform tooling.
const USES_PREFIXES: &[&str] = &[
    "hashicorp/setup-terraform",
    "hashicorp/terraform-github-actions",
    "dflook/terraform-",
    "gruntwork-io/terragrunt-action",
    "opentofu/setup-opentofu",
];

const COMMAND_NAMES: &str =
    "init|validate|plan|apply|destroy|fmt|output|import|state|workspace|refresh|taint|untaint|force-unlock";

/// Ordered run-command patterns; the first match selects the command.
static RUN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(&format!(r"\bterraform\s+(?:-chdir=\S+\s+)?({COMMAND_NAMES})\b")).unwrap(),
        Regex::new(&format!(r"\bterragrunt\s+(?:run-all\s+)?({COMMAND_NAMES})\b")).unwrap(),
        Regex::new(&format!(r"\btf\s+({COMMAND_NAMES})\b")).unwrap(),
        Regex::new(r"\b(terraform)\b").unwrap(),
    ]
});

static CD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*cd\s+([^\s;&|]+)").unwrap());
static CHDIR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-chdir=(\S+)").unwrap());
static WORKSPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"terraform\s+workspace\s+(?:select|new)\s+(\S+)").unwrap()
});
static TF_WORKSPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"TF_WORKSPACE=(\S+)").unwrap());
static VAR_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"-var-file=["']?([^\s"']+)"#).unwrap());
static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"-var[= ]\s*["']?([A-Za-z0-9_]+)=([^"'\s]+)"#).unwrap()
});
static BACKEND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"-backend-config=["']?([^\s"']+)"#).unwrap());

/// Markers of Terraform Cloud / Enterprise usage.
const CLOUD_MARKERS: &[&str] = &["TF_CLOUD_", "TFE_", "app.terraform.io", "terraform login"];

/// The closed Terraform command set.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TerraformCommand {
    Init,
    Validate,
    Plan,
    Apply,
    Destroy,
    Fmt,
    Output,
    Import,
    State,
    Workspace,
    Refresh,
    Taint,
    Untaint,
    ForceUnlock,
    Unknown,
}

impl TerraformCommand {
    fn from_str(command: &str) -> Self {
        match command {
            "init" => Self::Init,
            "validate" => Self::Validate,
            "plan" => Self::Plan,
            "apply" => Self::Apply,
            "destroy" => Self::Destroy,
            "fmt" => Self::Fmt,
            "output" => Self::Output,
            "import" => Self::Import,
            "state" => Self::State,
            "workspace" => Self::Workspace,
            "refresh" => Self::Refresh,
            "taint" => Self::Taint,
            "untaint" => Self::Untaint,
            "force-unlock" => Self::ForceUnlock,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Validate => "validate",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Fmt => "fmt",
            Self::Output => "output",
            Self::Import => "import",
            Self::State => "state",
            Self::Workspace => "workspace",
            Self::Refresh => "refresh",
            Self::Taint => "taint",
            Self::Untaint => "untaint",
            Self::ForceUnlock => "force-unlock",
            Self::Unknown => "unknown",
        }
    }
}

/// Backend configuration gathered from `-backend-config` flags.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct BackendConfig {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub backend_type: Option<String>,
    pub config: IndexMap<String, String>,
}

/// A detected Terraform step.
#[derive(Serialize, Clone, Debug)]
pub struct TerraformStep {
    pub step_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub job_id: String,
    pub command: TerraformCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub uses_cloud: bool,
    pub var_files: Vec<String>,
    pub variables: IndexMap<String, String>,
    pub arguments: Vec<String>,
    pub env_vars: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_ref: Option<String>,
    pub confidence: u8,
    pub location: iac_diagnostics::SourceSpan,
}

/// Classifies one step as Terraform usage, if it is.
pub(crate) fn detect(job_id: &str, step_index: usize, step: &Step) -> Option<TerraformStep> {
    if let Some(uses) = step.uses_clause() {
        let prefix = uses_matches(uses, USES_PREFIXES)?;
        return Some(from_uses(job_id, step_index, step, uses, prefix));
    }

    // Collapsed form: `${{ … }}` regions squashed to single tokens so the
    // flag regexes capture whole expression values.
    let run = &collapse_expressions(step.run_text()?);
    let (pattern_index, command) = RUN_PATTERNS.iter().enumerate().find_map(|(index, re)| {
        re.captures(run)
            .and_then(|c| c.get(1))
            .map(|m| (index, m.as_str()))
    })?;

    let command = if pattern_index == RUN_PATTERNS.len() - 1 {
        TerraformCommand::Unknown
    } else {
        TerraformCommand::from_str(command)
    };

    Some(TerraformStep {
        step_index,
        step_id: step.common().id.clone(),
        job_id: job_id.to_string(),
        command,
        working_directory: working_directory(run, step),
        workspace: workspace(run),
        uses_cloud: CLOUD_MARKERS.iter().any(|marker| run.contains(marker)),
        var_files: VAR_FILE_RE
            .captures_iter(run)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        variables: VAR_RE
            .captures_iter(run)
            .filter_map(|c| {
                Some((
                    c.get(1)?.as_str().to_string(),
                    c.get(2)?.as_str().to_string(),
                ))
            })
            .collect(),
        arguments: command_arguments(run),
        env_vars: step.common().env.clone(),
        backend: backend_config(run),
        action_ref: None,
        confidence: run_confidence(run, "terraform ", &["-auto-approve", "-no-color"]),
        location: step.common().span.clone(),
    })
}

/// Builds the step record for a matched `uses:` action. The command is
/// inferred from the action name; inputs populate the obvious fields.
fn from_uses(
    job_id: &str,
    step_index: usize,
    step: &Step,
    uses: &str,
    _prefix: &str,
) -> TerraformStep {
    let name = uses.to_ascii_lowercase();
    let command = if name.contains("apply") {
        TerraformCommand::Apply
    } else if name.contains("plan") {
        TerraformCommand::Plan
    } else if name.contains("destroy") {
        TerraformCommand::Destroy
    } else if name.contains("validate") {
        TerraformCommand::Validate
    } else if name.contains("fmt") {
        TerraformCommand::Fmt
    } else if name.contains("output") {
        TerraformCommand::Output
    } else {
        // setup-* actions install the binary; init is the nearest phase.
        TerraformCommand::Init
    };

    let mut var_files = Vec::new();
    for key in ["var-file", "var_file", "var-files"] {
        if let Some(value) = step.with_input(key) {
            var_files.extend(value.lines().map(str::trim).filter(|v| !v.is_empty()).map(String::from));
        }
    }

    TerraformStep {
        step_index,
        step_id: step.common().id.clone(),
        job_id: job_id.to_string(),
        command,
        working_directory: ["working-directory", "workdir", "path"]
            .iter()
            .find_map(|key| step.with_input(key))
            .map(str::to_string)
            .or_else(|| step.common().working_directory.clone()),
        workspace: step.with_input("workspace").map(str::to_string),
        uses_cloud: step
            .with_input("cli_config_credentials_hostname")
            .is_some_and(|host| host.contains("terraform.io")),
        var_files,
        variables: IndexMap::new(),
        arguments: Vec::new(),
        env_vars: step.common().env.clone(),
        backend: None,
        action_ref: Some(uses.to_string()),
        confidence: USES_CONFIDENCE,
        location: step.common().span.clone(),
    }
}

/// Working directory: a `cd` before the command or a `-chdir=` flag, then
/// the step's own `working-directory`.
fn working_directory(run: &str, step: &Step) -> Option<String> {
    CD_RE
        .captures(run)
        .or_else(|| CHDIR_RE.captures(run))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| step.common().working_directory.clone())
}

fn workspace(run: &str) -> Option<String> {
    WORKSPACE_RE
        .captures(run)
        .or_else(|| TF_WORKSPACE_RE.captures(run))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn backend_config(run: &str) -> Option<BackendConfig> {
    let mut backend = BackendConfig::default();
    for captures in BACKEND_RE.captures_iter(run) {
        let Some(entry) = captures.get(1) else {
            continue;
        };
        match entry.as_str().split_once('=') {
            Some((key, value)) => {
                backend.config.insert(key.to_string(), value.to_string());
            }
            None => {
                backend
                    .config
                    .insert("file".to_string(), entry.as_str().to_string());
            }
        }
    }
    (!backend.config.is_empty()).then_some(backend)
}

/// The tokens following the terraform command on its matched line.
fn command_arguments(run: &str) -> Vec<String> {
    for line in run.lines() {
        let Some(position) = line.find("terraform ").or_else(|| line.find("terragrunt ")) else {
            continue;
        };
        let mut tokens = line[position..].split_whitespace();
        tokens.next();
        let command = tokens.next();
        if command.is_none() {
            continue;
        }
        return tokens.map(str::to_string).collect();
    }
    Vec::new()
}
