//! Helm step detection and argument extraction.

use std::sync::LazyLock;

use indexmap::IndexMap;
use gha_models::Step;
use regex::Regex;
use serde::Serialize;

use super::{USES_CONFIDENCE, collapse_expressions, run_confidence, uses_matches};

/// `uses:` prefixes that mark a step as Helm tooling.
const USES_PREFIXES: &[&str] = &[
    "azure/setup-helm",
    "azure/k8s-bake",
    "deliverybot/helm",
    "helmfile/helmfile-action",
    "wandera/helmfile-action",
];

const COMMAND_NAMES: &str =
    "install|upgrade|uninstall|rollback|template|lint|package|push|pull|repo|dependency|test";

/// Ordered run-command patterns; the first match selects the command.
static RUN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(&format!(r"\bhelm\s+({COMMAND_NAMES})\b")).unwrap(),
        Regex::new(r"\bhelmfile\s+(\w[\w-]*)").unwrap(),
        Regex::new(r"\b(helm)\b").unwrap(),
    ]
});

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:-n|--namespace)[= ](\S+)").unwrap());
static VALUES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:-f|--values)[= ](\S+)").unwrap());
static SET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--set(?:-string)?[= ](\S+)").unwrap());
static SET_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--set-file[= ](\S+)").unwrap());
static REPO_ADD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"helm\s+repo\s+add\s+(\S+)\s+(\S+)").unwrap());

/// Flags whose value is the following token, skipped when scanning for the
/// positional release and chart arguments.
const VALUE_FLAGS: &[&str] = &[
    "-n",
    "--namespace",
    "-f",
    "--values",
    "--set",
    "--set-string",
    "--set-file",
    "--version",
    "--timeout",
    "--kubeconfig",
    "--kube-context",
];

/// The closed Helm command set.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HelmCommand {
    Install,
    Upgrade,
    Uninstall,
    Rollback,
    Template,
    Lint,
    Package,
    Push,
    Pull,
    Repo,
    Dependency,
    Test,
    Unknown,
}

impl HelmCommand {
    fn from_str(command: &str) -> Self {
        match command {
            "install" => Self::Install,
            "upgrade" => Self::Upgrade,
            "uninstall" | "delete" => Self::Uninstall,
            "rollback" => Self::Rollback,
            "template" => Self::Template,
            "lint" => Self::Lint,
            "package" => Self::Package,
            "push" => Self::Push,
            "pull" => Self::Pull,
            "repo" => Self::Repo,
            "dependency" => Self::Dependency,
            "test" => Self::Test,
            _ => Self::Unknown,
        }
    }

    /// Maps helmfile subcommands onto the nearest Helm phase.
    fn from_helmfile(command: &str) -> Self {
        match command {
            "apply" | "sync" => Self::Upgrade,
            "template" => Self::Template,
            "destroy" | "delete" => Self::Uninstall,
            "lint" => Self::Lint,
            "diff" => Self::Template,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Uninstall => "uninstall",
            Self::Rollback => "rollback",
            Self::Template => "template",
            Self::Lint => "lint",
            Self::Package => "package",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Repo => "repo",
            Self::Dependency => "dependency",
            Self::Test => "test",
            Self::Unknown => "unknown",
        }
    }
}

/// A detected Helm step.
#[derive(Serialize, Clone, Debug)]
pub struct HelmStep {
    pub step_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub job_id: String,
    pub command: HelmCommand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub values_files: Vec<String>,
    pub set_values: IndexMap<String, String>,
    pub set_files: IndexMap<String, String>,
    pub dry_run: bool,
    pub atomic: bool,
    pub wait: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    pub env_vars: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_ref: Option<String>,
    pub confidence: u8,
    pub location: iac_diagnostics::SourceSpan,
}

/// Classifies one step as Helm usage, if it is.
pub(crate) fn detect(job_id: &str, step_index: usize, step: &Step) -> Option<HelmStep> {
    if let Some(uses) = step.uses_clause() {
        uses_matches(uses, USES_PREFIXES)?;
        return Some(from_uses(job_id, step_index, step, uses));
    }

    // Collapsed form: `${{ … }}` regions squashed to single tokens so the
    // flag regexes capture whole expression values.
    let run = &collapse_expressions(step.run_text()?);
    let (pattern_index, matched) = RUN_PATTERNS.iter().enumerate().find_map(|(index, re)| {
        re.captures(run)
            .and_then(|c| c.get(1))
            .map(|m| (index, m.as_str()))
    })?;

    let command = match pattern_index {
        0 => HelmCommand::from_str(matched),
        1 => HelmCommand::from_helmfile(matched),
        _ => HelmCommand::Unknown,
    };

    let (release_name, chart) = release_and_chart(run);
    let set_files: IndexMap<String, String> = SET_FILE_RE
        .captures_iter(run)
        .filter_map(|c| c.get(1))
        .flat_map(|m| m.as_str().split(','))
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Some(HelmStep {
        step_index,
        step_id: step.common().id.clone(),
        job_id: job_id.to_string(),
        command,
        working_directory: step.common().working_directory.clone(),
        chart,
        release_name,
        namespace: NAMESPACE_RE
            .captures(run)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        values_files: VALUES_RE
            .captures_iter(run)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        set_values: set_value_pairs(run),
        set_files,
        dry_run: run.contains("--dry-run"),
        atomic: run.contains("--atomic"),
        wait: run.contains("--wait"),
        repo_url: REPO_ADD_RE
            .captures(run)
            .and_then(|c| c.get(2))
            .map(|m| m.as_str().to_string()),
        env_vars: step.common().env.clone(),
        action_ref: None,
        confidence: run_confidence(run, "helm ", &["--namespace", "-namespace", "--atomic"]),
        location: step.common().span.clone(),
    })
}

fn from_uses(job_id: &str, step_index: usize, step: &Step, uses: &str) -> HelmStep {
    let name = uses.to_ascii_lowercase();
    let command = if name.contains("k8s-bake") {
        HelmCommand::Template
    } else if name.contains("helmfile") {
        HelmCommand::Upgrade
    } else {
        // Includes setup-helm, which installs the binary ahead of an
        // upgrade elsewhere in the job.
        HelmCommand::Upgrade
    };

    let mut values_files = Vec::new();
    for key in ["values", "value-files", "values-files", "helm-values"] {
        if let Some(value) = step.with_input(key) {
            values_files.extend(
                value
                    .lines()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from),
            );
        }
    }

    let set_values = step
        .with_input("set")
        .or_else(|| step.with_input("set-values"))
        .map(|set| {
            set.split(',')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect()
        })
        .unwrap_or_default();

    HelmStep {
        step_index,
        step_id: step.common().id.clone(),
        job_id: job_id.to_string(),
        command,
        working_directory: ["working-directory", "workdir"]
            .iter()
            .find_map(|key| step.with_input(key))
            .map(str::to_string)
            .or_else(|| step.common().working_directory.clone()),
        chart: ["chart", "chart-path", "helm-chart"]
            .iter()
            .find_map(|key| step.with_input(key))
            .map(str::to_string),
        release_name: ["release", "release-name"]
            .iter()
            .find_map(|key| step.with_input(key))
            .map(str::to_string),
        namespace: step.with_input("namespace").map(str::to_string),
        values_files,
        set_values,
        set_files: IndexMap::new(),
        dry_run: step.with_input("dry-run").is_some_and(|v| v == "true"),
        atomic: step.with_input("atomic").is_some_and(|v| v == "true"),
        wait: step.with_input("wait").is_some_and(|v| v == "true"),
        repo_url: None,
        env_vars: step.common().env.clone(),
        action_ref: Some(uses.to_string()),
        confidence: USES_CONFIDENCE,
        location: step.common().span.clone(),
    }
}

/// `--set` / `--set-string` pairs, with comma-joined entries split apart.
/// `--set-file` entries are collected separately.
fn set_value_pairs(run: &str) -> IndexMap<String, String> {
    let mut pairs = IndexMap::new();
    for captures in SET_RE.captures_iter(run) {
        let Some(entry) = captures.get(1) else {
            continue;
        };
        for pair in entry.as_str().split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                pairs.insert(key.to_string(), value.to_string());
            }
        }
    }
    pairs
}

/// The positional release and chart after `helm install|upgrade`,
/// skipping flags and their values.
fn release_and_chart(run: &str) -> (Option<String>, Option<String>) {
    for line in run.lines() {
        let Some(position) = line
            .find("helm install")
            .or_else(|| line.find("helm upgrade"))
        else {
            continue;
        };

        let mut positional = Vec::new();
        let mut tokens = line[position..].split_whitespace().skip(2);
        while let Some(token) = tokens.next() {
            if token == "\\" {
                continue;
            }
            if token.starts_with('-') {
                // A bare flag that takes a value consumes the next token;
                // inline `--flag=value` forms are self-contained.
                if VALUE_FLAGS.contains(&token) {
                    tokens.next();
                }
                continue;
            }
            positional.push(token.to_string());
            if positional.len() == 2 {
                break;
            }
        }

        let mut positional = positional.into_iter();
        return (positional.next(), positional.next());
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use iac_diagnostics::ParseOptions;
    use gha_models::WorkflowParser;
    use pretty_assertions::assert_eq;

    use crate::tools::detect_tools;

    use super::*;

    fn detect_in(step_yaml: &str) -> Vec<HelmStep> {
        let source = format!(
            "on: push\njobs:\n  deploy:\n    runs-on: ubuntu-latest\n    steps:\n{step_yaml}"
        );
        let workflow = WorkflowParser::new(ParseOptions::default())
            .parse(&source, None)
            .value
            .expect("workflow value");
        detect_tools(&workflow, &ParseOptions::default()).helm
    }

    #[test]
    fn test_upgrade_extraction() {
        let steps = detect_in(
            "      - run: helm upgrade web ./charts/web --namespace apps --set image.tag=v1 -f values/prod.yaml --wait --atomic\n",
        );
        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert_eq!(step.command, HelmCommand::Upgrade);
        assert_eq!(step.release_name.as_deref(), Some("web"));
        assert_eq!(step.chart.as_deref(), Some("./charts/web"));
        assert_eq!(step.namespace.as_deref(), Some("apps"));
        assert_eq!(step.set_values["image.tag"], "v1");
        assert_eq!(step.values_files, vec!["values/prod.yaml"]);
        assert!(step.wait);
        assert!(step.atomic);
        assert!(!step.dry_run);
    }

    #[test]
    fn test_upgrade_install_flag_skipped() {
        let steps =
            detect_in("      - run: helm upgrade --install api charts/api -n backend\n");
        assert_eq!(steps[0].release_name.as_deref(), Some("api"));
        assert_eq!(steps[0].chart.as_deref(), Some("charts/api"));
        assert_eq!(steps[0].namespace.as_deref(), Some("backend"));
    }

    #[test]
    fn test_comma_joined_set_values() {
        let steps = detect_in(
            "      - run: helm install app ./chart --set a=1,b=2 --set-string c=3\n",
        );
        assert_eq!(steps[0].set_values.len(), 3);
        assert_eq!(steps[0].set_values["b"], "2");
        assert_eq!(steps[0].set_values["c"], "3");
    }

    #[test]
    fn test_set_file() {
        let steps = detect_in(
            "      - run: helm upgrade app ./chart --set-file config=outputs.json\n",
        );
        assert_eq!(steps[0].set_files["config"], "outputs.json");
    }

    #[test]
    fn test_helmfile_commands() {
        let steps = detect_in("      - run: helmfile apply -e production\n");
        assert_eq!(steps[0].command, HelmCommand::Upgrade);

        let steps = detect_in("      - run: helmfile template\n");
        assert_eq!(steps[0].command, HelmCommand::Template);
    }

    #[test]
    fn test_repo_add() {
        let steps = detect_in(
            "      - run: helm repo add bitnami https://charts.bitnami.com/bitnami\n",
        );
        assert_eq!(steps[0].command, HelmCommand::Repo);
        assert_eq!(
            steps[0].repo_url.as_deref(),
            Some("https://charts.bitnami.com/bitnami")
        );
    }

    #[test]
    fn test_setup_helm_action() {
        let steps = detect_in("      - uses: azure/setup-helm@v4\n");
        assert_eq!(steps[0].command, HelmCommand::Upgrade);
        assert_eq!(steps[0].confidence, 95);
        assert_eq!(steps[0].action_ref.as_deref(), Some("azure/setup-helm@v4"));
    }

    #[test]
    fn test_bake_action_inputs() {
        let steps = detect_in(
            "      - uses: azure/k8s-bake@v3\n        with:\n          helm-chart: charts/web\n          namespace: apps\n",
        );
        assert_eq!(steps[0].command, HelmCommand::Template);
        assert_eq!(steps[0].chart.as_deref(), Some("charts/web"));
        assert_eq!(steps[0].namespace.as_deref(), Some("apps"));
    }

    #[test]
    fn test_expression_set_values_survive() {
        let steps = detect_in(
            "      - run: helm upgrade web ./chart --set image.tag=${{ needs.build.outputs.tag }}\n",
        );
        assert_eq!(steps[0].release_name.as_deref(), Some("web"));
        assert_eq!(
            steps[0].set_values["image.tag"],
            "${{needs.build.outputs.tag}}"
        );
    }

    #[test]
    fn test_dry_run_flag() {
        let steps = detect_in("      - run: helm install app ./chart --dry-run\n");
        assert!(steps[0].dry_run);
    }
}
