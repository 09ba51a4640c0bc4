//! Classification of Terraform module `source` strings.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static S3_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^s3::https://s3(?:-([a-z0-9-]+))?\.amazonaws\.com/([^/]+)/(.+)$").unwrap()
});

static GCS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^gcs::https://www\.googleapis\.com/storage/v1/([^/]+)(?:/(.*))?$").unwrap()
});

static REGISTRY_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z._-]+$").unwrap());

/// The default Terraform module registry.
const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

/// A classified module source.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleSource {
    Local {
        path: String,
        resolved_path: String,
    },
    Registry {
        host: String,
        namespace: String,
        name: String,
        provider: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        submodule: Option<String>,
    },
    Github {
        owner: String,
        repo: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
        is_ssh: bool,
    },
    Git {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sub_path: Option<String>,
        #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
        git_ref: Option<String>,
    },
    S3 {
        #[serde(skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        bucket: String,
        key: String,
    },
    Gcs {
        bucket: String,
        path: String,
    },
    Unknown {
        raw: String,
    },
}

/// Classifies a module `source` string relative to the directory of the
/// calling configuration. First matching rule wins.
pub fn classify(source: &str, caller_dir: &str) -> ModuleSource {
    let source = source.trim();

    if source.starts_with("./") || source.starts_with("../") || source.starts_with('/') {
        return ModuleSource::Local {
            path: source.to_string(),
            resolved_path: resolve_path(caller_dir, source),
        };
    }

    let https_rest = source
        .strip_prefix("https://github.com/")
        .or_else(|| source.strip_prefix("github.com/"));
    if let Some(rest) = https_rest {
        return parse_github(rest, false);
    }

    if let Some(rest) = source.strip_prefix("git@github.com:") {
        return parse_github(rest, true);
    }

    if let Some(rest) = source.strip_prefix("git::") {
        return parse_git(rest);
    }

    if let Some(captures) = S3_RE.captures(source) {
        return ModuleSource::S3 {
            region: captures.get(1).map(|m| m.as_str().to_string()),
            bucket: captures
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            key: captures
                .get(3)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        };
    }

    if let Some(captures) = GCS_RE.captures(source) {
        return ModuleSource::Gcs {
            bucket: captures
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            path: captures
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        };
    }

    if let Some(registry) = parse_registry(source) {
        return registry;
    }

    ModuleSource::Unknown {
        raw: source.to_string(),
    }
}

/// Splits a trailing `?ref=…` (or `?version=…`) query off a source string.
fn split_ref(source: &str) -> (&str, Option<String>) {
    match source.split_once('?') {
        Some((base, query)) => {
            let git_ref = query.split('&').find_map(|pair| {
                pair.strip_prefix("ref=")
                    .or_else(|| pair.strip_prefix("version="))
                    .map(str::to_string)
            });
            (base, git_ref)
        }
        None => (source, None),
    }
}

fn parse_github(rest: &str, is_ssh: bool) -> ModuleSource {
    let (rest, git_ref) = split_ref(rest);
    let (repo_part, sub_path) = match rest.split_once("//") {
        Some((repo_part, sub)) => (repo_part, Some(sub.to_string())),
        None => (rest, None),
    };

    let mut segments = repo_part.splitn(2, '/');
    let owner = segments.next().unwrap_or_default();
    let repo = segments
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");

    if owner.is_empty() || repo.is_empty() {
        return ModuleSource::Unknown {
            raw: rest.to_string(),
        };
    }

    ModuleSource::Github {
        owner: owner.to_string(),
        repo: repo.to_string(),
        path: sub_path.filter(|p| !p.is_empty()),
        git_ref,
        is_ssh,
    }
}

/// Parses a `git::URL` source: the sub-path splits at the first `//` that
/// is not part of a `://` scheme separator.
fn parse_git(rest: &str) -> ModuleSource {
    let (rest, git_ref) = split_ref(rest);

    let mut split_at = None;
    let bytes = rest.as_bytes();
    let mut position = 0usize;
    while let Some(found) = rest[position..].find("//") {
        let index = position + found;
        if index == 0 || bytes[index - 1] != b':' {
            split_at = Some(index);
            break;
        }
        position = index + 2;
    }

    let (url, sub_path) = match split_at {
        Some(index) => (
            rest[..index].to_string(),
            Some(rest[index + 2..].to_string()),
        ),
        None => (rest.to_string(), None),
    };

    ModuleSource::Git {
        url,
        sub_path: sub_path.filter(|p| !p.is_empty()),
        git_ref,
    }
}

/// Parses a registry source: `[HOST/]NAMESPACE/NAME/PROVIDER[//SUBMODULE]`.
fn parse_registry(source: &str) -> Option<ModuleSource> {
    let (base, submodule) = match source.split_once("//") {
        Some((base, sub)) => (base, Some(sub.to_string())),
        None => (source, None),
    };

    let segments: Vec<&str> = base.split('/').collect();
    let (host, namespace, name, provider) = match segments.as_slice() {
        [namespace, name, provider] => {
            (DEFAULT_REGISTRY_HOST, *namespace, *name, *provider)
        }
        [host, namespace, name, provider] if host.contains('.') => {
            (*host, *namespace, *name, *provider)
        }
        _ => return None,
    };

    for segment in [namespace, name, provider] {
        if !REGISTRY_SEGMENT_RE.is_match(segment) {
            return None;
        }
    }

    Some(ModuleSource::Registry {
        host: host.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        provider: provider.to_string(),
        submodule,
    })
}

/// Lexically joins and normalizes a relative path against a base directory.
fn resolve_path(caller_dir: &str, path: &str) -> String {
    if path.starts_with('/') {
        return normalize(path);
    }
    if caller_dir.is_empty() {
        return normalize(path);
    }
    normalize(&format!("{caller_dir}/{path}"))
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();

    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|c| *c != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
            }
            other => stack.push(other),
        }
    }

    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
