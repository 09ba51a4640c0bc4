//! Input-kind recognition.

/// The kinds of source files the parsing core understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    TerraformHcl,
    GithubWorkflow,
    Helmfile,
}

impl InputKind {
    /// Classifies a file by path, and optionally by content when the path
    /// alone is ambiguous.
    ///
    /// Recognition rules:
    /// - `.tf` / `.tf.json` → Terraform;
    /// - `.yml` / `.yaml` under a `.github/workflows/` directory, or any
    ///   YAML whose content carries a top-level `on:` or `jobs:` key →
    ///   GitHub workflow;
    /// - a base name of `helmfile`, `helmfile.yaml`, `helmfile.yml`, or
    ///   `helmfile.*.yaml`, or content with a top-level `releases:` plus
    ///   `repositories:` or `helmDefaults:` → Helmfile.
    pub fn detect(path: &str, content: Option<&str>) -> Option<Self> {
        let normalized = path.replace('\\', "/");
        let base = normalized.rsplit('/').next().unwrap_or(&normalized);

        if base.ends_with(".tf") || base.ends_with(".tf.json") {
            return Some(InputKind::TerraformHcl);
        }

        let is_yaml = base.ends_with(".yml") || base.ends_with(".yaml");

        if is_helmfile_name(base) {
            return Some(InputKind::Helmfile);
        }

        if is_yaml && normalized.contains(".github/workflows/") {
            return Some(InputKind::GithubWorkflow);
        }

        if let Some(content) = content {
            if has_top_level_key(content, "releases")
                && (has_top_level_key(content, "repositories")
                    || has_top_level_key(content, "helmDefaults"))
            {
                return Some(InputKind::Helmfile);
            }

            if is_yaml
                && (has_top_level_key(content, "on") || has_top_level_key(content, "jobs"))
            {
                return Some(InputKind::GithubWorkflow);
            }
        }

        None
    }
}

fn is_helmfile_name(base: &str) -> bool {
    base == "helmfile"
        || base == "helmfile.yaml"
        || base == "helmfile.yml"
        || (base.starts_with("helmfile.") && base.ends_with(".yaml"))
}

/// Whether `content` has an unindented `key:` line.
fn has_top_level_key(content: &str, key: &str) -> bool {
    content.lines().any(|line| {
        let Some(rest) = line.strip_prefix(key) else {
            return false;
        };
        rest.starts_with(':')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_terraform() {
        assert_eq!(
            InputKind::detect("infra/main.tf", None),
            Some(InputKind::TerraformHcl)
        );
        assert_eq!(
            InputKind::detect("infra/main.tf.json", None),
            Some(InputKind::TerraformHcl)
        );
    }

    #[test]
    fn test_detect_workflow_by_path() {
        assert_eq!(
            InputKind::detect("repo/.github/workflows/ci.yml", None),
            Some(InputKind::GithubWorkflow)
        );
    }

    #[test]
    fn test_detect_workflow_by_content() {
        let content = "name: CI\non:\n  push: {}\njobs: {}\n";
        assert_eq!(
            InputKind::detect("pipelines/deploy.yaml", Some(content)),
            Some(InputKind::GithubWorkflow)
        );
    }

    #[test]
    fn test_detect_helmfile_names() {
        for name in ["helmfile", "helmfile.yaml", "helmfile.yml", "helmfile.prod.yaml"] {
            assert_eq!(
                InputKind::detect(name, None),
                Some(InputKind::Helmfile),
                "failed for {name}"
            );
        }
    }

    #[test]
    fn test_detect_helmfile_by_content() {
        let content = "repositories:\n  - name: stable\nreleases:\n  - name: app\n";
        assert_eq!(
            InputKind::detect("deploy/releases.yaml", Some(content)),
            Some(InputKind::Helmfile)
        );
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(InputKind::detect("README.md", None), None);
        assert_eq!(InputKind::detect("values.yaml", Some("image: app\n")), None);
    }
}
