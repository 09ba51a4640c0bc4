//! Shared model pieces: permissions, concurrency, defaults, environment
//! coercion, and `uses:` coordinates.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

/// `permissions` for a workflow or job.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Permissions {
    /// Blanket permissions, e.g. `read-all` / `write-all`.
    Base(String),
    /// Fine-grained scope → level mappings.
    Explicit(IndexMap<String, PermissionLevel>),
}

/// A single permission level. Values other than these three are dropped
/// during parsing.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    None,
}

impl PermissionLevel {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "none" => Some(Self::None),
            _ => Option::None,
        }
    }
}

/// Normalizes a permission scope key: camelCase keys are folded to the
/// kebab-case form GitHub documents (`pullRequests` → `pull-requests`).
pub(crate) fn normalize_permission_key(key: &str) -> String {
    let mut normalized = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            normalized.push('-');
            normalized.push(ch.to_ascii_lowercase());
        } else {
            normalized.push(ch);
        }
    }
    normalized
}

/// A `concurrency:` group, from either the bare-string or mapping form.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Concurrency {
    pub group: String,
    pub cancel_in_progress: bool,
}

/// `defaults:` for a workflow or job.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct Defaults {
    pub run: Option<RunDefaults>,
}

/// `defaults.run`.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct RunDefaults {
    pub shell: Option<String>,
    pub working_directory: Option<String>,
}

/// Coerces a scalar YAML value to the string GitHub Actions would use.
/// Nulls become empty strings; non-scalars yield `None`.
pub(crate) fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Coerces a YAML mapping into an ordered string → string environment.
/// Non-scalar values are dropped.
pub(crate) fn value_to_env(value: &serde_yaml::Value) -> IndexMap<String, String> {
    let mut env = IndexMap::new();
    if let serde_yaml::Value::Mapping(mapping) = value {
        for (key, value) in mapping {
            if let (Some(key), Some(value)) = (key.as_str(), scalar_to_string(value)) {
                env.insert(key.to_string(), value);
            }
        }
    }
    env
}

/// An error parsing a `uses:` coordinate.
#[derive(Error, Debug, PartialEq)]
#[error("malformed `uses` clause: {0}")]
pub struct UsesError(pub String);

/// A parsed `uses:` coordinate.
///
/// Unlike a linter, this model is descriptive: unpinned repository uses
/// (no `@ref`) are accepted.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UsesCoordinate {
    /// `uses: ./path/to/action`.
    Local { path: String },
    /// `uses: owner/repo[/subpath][@ref]`.
    Repository {
        owner: String,
        repo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        subpath: Option<String>,
        #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
    },
    /// `uses: docker://[registry/]image[:tag]`.
    Docker {
        #[serde(skip_serializing_if = "Option::is_none")]
        registry: Option<String>,
        image: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
}

impl UsesCoordinate {
    /// Parses a `uses:` clause into its appropriate variant.
    pub fn parse(uses: &str) -> Result<Self, UsesError> {
        if uses.starts_with("./") {
            return Ok(Self::Local {
                path: uses.to_string(),
            });
        }

        if let Some(image) = uses.strip_prefix("docker://") {
            return Self::parse_docker(image);
        }

        let (path, git_ref) = match uses.rsplit_once('@') {
            Some((path, git_ref)) => (path, Some(git_ref.to_string())),
            None => (uses, None),
        };

        let mut components = path.splitn(3, '/');
        let (Some(owner), Some(repo)) = (components.next(), components.next()) else {
            return Err(UsesError(format!("owner/repo slug is too short: {uses}")));
        };
        if owner.is_empty() || repo.is_empty() {
            return Err(UsesError(format!("owner/repo slug is too short: {uses}")));
        }

        Ok(Self::Repository {
            owner: owner.to_string(),
            repo: repo.to_string(),
            subpath: components.next().map(str::to_string),
            git_ref,
        })
    }

    fn parse_docker(image: &str) -> Result<Self, UsesError> {
        if image.is_empty() {
            return Err(UsesError("empty docker image".into()));
        }

        let (registry, rest) = match image.split_once('/') {
            Some((registry, rest))
                if registry == "localhost"
                    || registry.contains('.')
                    || registry.contains(':') =>
            {
                (Some(registry.to_string()), rest)
            }
            _ => (None, image),
        };

        let (image, tag) = match rest.rsplit_once(':') {
            Some((image, tag)) if !tag.contains('/') && !tag.is_empty() => {
                (image.to_string(), Some(tag.to_string()))
            }
            _ => (rest.to_string(), None),
        };

        Ok(Self::Docker {
            registry,
            image,
            tag,
        })
    }

    /// The `owner/repo` slug for repository coordinates.
    pub fn slug(&self) -> Option<String> {
        match self {
            Self::Repository { owner, repo, .. } => Some(format!("{owner}/{repo}")),
            _ => None,
        }
    }
}
