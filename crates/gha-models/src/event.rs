//! Workflow triggers: the typed `on:` model.

use indexmap::IndexMap;
use serde::Serialize;

use crate::common::scalar_to_string;

/// A typed workflow trigger.
///
/// The tag strings are part of the emitted record shape: `push`,
/// `pull_request`, `workflow_dispatch`, `schedule`, `workflow_call`,
/// `workflow_run`, `repository_dispatch`, `release`, `issues`,
/// `issue_comment`, and `generic` for everything else.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Push {
        branches: Vec<String>,
        branches_ignore: Vec<String>,
        tags: Vec<String>,
        tags_ignore: Vec<String>,
        paths: Vec<String>,
        paths_ignore: Vec<String>,
    },
    PullRequest {
        branches: Vec<String>,
        branches_ignore: Vec<String>,
        paths: Vec<String>,
        paths_ignore: Vec<String>,
        types: Vec<String>,
    },
    WorkflowDispatch {
        inputs: IndexMap<String, DispatchInput>,
    },
    Schedule {
        cron: Vec<String>,
    },
    WorkflowCall {
        inputs: IndexMap<String, DispatchInput>,
        outputs: IndexMap<String, String>,
        secrets: Vec<String>,
    },
    WorkflowRun {
        workflows: Vec<String>,
        types: Vec<String>,
        branches: Vec<String>,
    },
    RepositoryDispatch {
        types: Vec<String>,
    },
    Release {
        types: Vec<String>,
    },
    Issues {
        types: Vec<String>,
    },
    IssueComment {
        types: Vec<String>,
    },
    Generic {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<serde_yaml::Value>,
    },
}

impl Trigger {
    /// The stable trigger name for this variant.
    pub fn name(&self) -> &str {
        match self {
            Self::Push { .. } => "push",
            Self::PullRequest { .. } => "pull_request",
            Self::WorkflowDispatch { .. } => "workflow_dispatch",
            Self::Schedule { .. } => "schedule",
            Self::WorkflowCall { .. } => "workflow_call",
            Self::WorkflowRun { .. } => "workflow_run",
            Self::RepositoryDispatch { .. } => "repository_dispatch",
            Self::Release { .. } => "release",
            Self::Issues { .. } => "issues",
            Self::IssueComment { .. } => "issue_comment",
            Self::Generic { name, .. } => name,
        }
    }

    /// Builds a trigger from its `on:` key and optional body.
    pub(crate) fn from_event(name: &str, body: Option<&serde_yaml::Value>) -> Self {
        match name {
            "push" => Self::Push {
                branches: string_list(body, "branches"),
                branches_ignore: string_list(body, "branches-ignore"),
                tags: string_list(body, "tags"),
                tags_ignore: string_list(body, "tags-ignore"),
                paths: string_list(body, "paths"),
                paths_ignore: string_list(body, "paths-ignore"),
            },
            "pull_request" => Self::PullRequest {
                branches: string_list(body, "branches"),
                branches_ignore: string_list(body, "branches-ignore"),
                paths: string_list(body, "paths"),
                paths_ignore: string_list(body, "paths-ignore"),
                types: string_list(body, "types"),
            },
            "workflow_dispatch" => Self::WorkflowDispatch {
                inputs: dispatch_inputs(body),
            },
            "schedule" => Self::Schedule {
                cron: schedule_entries(body),
            },
            "workflow_call" => Self::WorkflowCall {
                inputs: dispatch_inputs(body),
                outputs: call_outputs(body),
                secrets: mapping_keys(body, "secrets"),
            },
            "workflow_run" => Self::WorkflowRun {
                workflows: string_list(body, "workflows"),
                types: string_list(body, "types"),
                branches: string_list(body, "branches"),
            },
            "repository_dispatch" => Self::RepositoryDispatch {
                types: string_list(body, "types"),
            },
            "release" => Self::Release {
                types: string_list(body, "types"),
            },
            "issues" => Self::Issues {
                types: string_list(body, "types"),
            },
            "issue_comment" => Self::IssueComment {
                types: string_list(body, "types"),
            },
            other => Self::Generic {
                name: other.to_string(),
                config: body.cloned(),
            },
        }
    }
}

/// A `workflow_dispatch` / `workflow_call` input declaration.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct DispatchInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

fn body_key<'v>(body: Option<&'v serde_yaml::Value>, key: &str) -> Option<&'v serde_yaml::Value> {
    body?.as_mapping()?.get(key)
}

/// A filter that may be a single string or a sequence of strings.
fn string_list(body: Option<&serde_yaml::Value>, key: &str) -> Vec<String> {
    match body_key(body, key) {
        Some(serde_yaml::Value::String(s)) => vec![s.clone()],
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(scalar_to_string)
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn mapping_keys(body: Option<&serde_yaml::Value>, key: &str) -> Vec<String> {
    body_key(body, key)
        .and_then(serde_yaml::Value::as_mapping)
        .map(|mapping| {
            mapping
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `schedule:` is a sequence of `{cron: "..."}` entries.
fn schedule_entries(body: Option<&serde_yaml::Value>) -> Vec<String> {
    let Some(serde_yaml::Value::Sequence(entries)) = body else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| entry.as_mapping()?.get("cron")?.as_str())
        .map(str::to_string)
        .collect()
}

fn dispatch_inputs(body: Option<&serde_yaml::Value>) -> IndexMap<String, DispatchInput> {
    let mut inputs = IndexMap::new();
    let Some(serde_yaml::Value::Mapping(mapping)) = body_key(body, "inputs") else {
        return inputs;
    };

    for (name, config) in mapping {
        let Some(name) = name.as_str() else {
            continue;
        };
        let config = config.as_mapping();
        let get = |key: &str| config.and_then(|m| m.get(key));

        inputs.insert(
            name.to_string(),
            DispatchInput {
                description: get("description").and_then(scalar_to_string),
                required: get("required").and_then(serde_yaml::Value::as_bool).unwrap_or(false),
                default: get("default").and_then(scalar_to_string),
                input_type: get("type").and_then(scalar_to_string),
                options: get("options")
                    .and_then(serde_yaml::Value::as_sequence)
                    .map(|seq| seq.iter().filter_map(scalar_to_string).collect())
                    .unwrap_or_default(),
            },
        );
    }
    inputs
}

fn call_outputs(body: Option<&serde_yaml::Value>) -> IndexMap<String, String> {
    let mut outputs = IndexMap::new();
    let Some(serde_yaml::Value::Mapping(mapping)) = body_key(body, "outputs") else {
        return outputs;
    };

    for (name, config) in mapping {
        let Some(name) = name.as_str() else {
            continue;
        };
        let value = config
            .as_mapping()
            .and_then(|m| m.get("value"))
            .and_then(scalar_to_string)
            .unwrap_or_default();
        outputs.insert(name.to_string(), value);
    }
    outputs
}
