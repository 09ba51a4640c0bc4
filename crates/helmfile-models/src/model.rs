//! The helmfile data model.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

/// Go-template accesses that make a release environment-dependent.
static ENV_TEMPLATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{[^}]*\.(Environment|Values|StateValues)\.").unwrap()
});

/// A parsed helmfile.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Helmfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub helm_defaults: HelmDefaults,
    pub environments: IndexMap<String, Environment>,
    pub repositories: Vec<Repository>,
    pub releases: Vec<Release>,
    pub bases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm_binary: Option<String>,
}

impl Helmfile {
    /// Finds a release by `name` or `namespace/name`.
    pub fn find_release(&self, reference: &str) -> Option<&Release> {
        match reference.split_once('/') {
            Some((namespace, name)) => self
                .releases
                .iter()
                .find(|release| release.namespace == namespace && release.name == name),
            None => self.releases.iter().find(|release| release.name == reference),
        }
    }
}

/// `helmDefaults:` settings that releases inherit.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct HelmDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atomic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_namespace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
}

/// An entry under `environments:`.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Environment {
    pub values: Vec<serde_yaml::Value>,
    pub secrets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kube_context: Option<String>,
}

/// An entry under `repositories:`.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Repository {
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oci: Option<bool>,
}

/// A `--set` style override on a release.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct SetValue {
    pub name: String,
    pub value: String,
}

/// A single release.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Release {
    pub name: String,
    /// Defaults to `"default"` when unset.
    pub namespace: String,
    pub chart: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// References to other releases, as `name` or `namespace/name`.
    pub needs: Vec<String>,
    /// Values files and inline value mappings, in declaration order.
    pub values: Vec<serde_yaml::Value>,
    pub set: Vec<SetValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atomic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recreate_pods: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_namespace: Option<bool>,
    pub labels: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_file_handler: Option<String>,
    pub hooks: Vec<serde_yaml::Value>,
    pub secrets: Vec<String>,
    /// 1-based line of the release's `- name:` entry in the source.
    pub line_number: u32,
}

impl Default for Release {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: "default".to_string(),
            chart: String::new(),
            version: None,
            needs: Vec::new(),
            values: Vec::new(),
            set: Vec::new(),
            condition: None,
            installed: None,
            wait: None,
            timeout: None,
            atomic: None,
            force: None,
            recreate_pods: None,
            create_namespace: None,
            labels: IndexMap::new(),
            missing_file_handler: None,
            hooks: Vec::new(),
            secrets: Vec::new(),
            line_number: 0,
        }
    }
}

impl Release {
    /// The `namespace/name` key identifying this release.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether any of this release's `values`, `condition`, or `chart`
    /// fields goes through environment templating
    /// (`{{ .Environment.* }}`, `{{ .Values.* }}`, `{{ .StateValues.* }}`).
    pub fn uses_environment_templating(&self) -> bool {
        if ENV_TEMPLATING_RE.is_match(&self.chart) {
            return true;
        }
        if self
            .condition
            .as_deref()
            .is_some_and(|condition| ENV_TEMPLATING_RE.is_match(condition))
        {
            return true;
        }
        self.values.iter().any(|value| {
            serde_yaml::to_string(value)
                .map(|text| ENV_TEMPLATING_RE.is_match(&text))
                .unwrap_or(false)
        })
    }
}
