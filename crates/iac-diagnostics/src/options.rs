//! Parser configuration.

use std::time::{Duration, Instant};

/// Options recognized across the parsing core.
///
/// A single options value is threaded through every parser; each parser
/// reads the fields relevant to it and ignores the rest.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Continue parsing after recoverable errors.
    pub error_recovery: bool,
    /// Reject inputs larger than this many bytes. `None` selects the
    /// per-domain default (10 MiB for Terraform, 5 MiB for GHA).
    pub max_file_size: Option<usize>,
    /// Wall-clock budget for a single parse, in milliseconds.
    pub timeout_ms: u64,
    /// Retain original source text on AST nodes.
    pub include_raw: bool,
    /// Expand nested HCL blocks.
    pub parse_nested_blocks: bool,
    /// Reject duplicate mapping keys in YAML inputs.
    pub strict_yaml: bool,
    /// Per-tool detection toggles for GHA steps.
    pub detect_terraform: bool,
    pub detect_helm: bool,
    pub detect_kubernetes: bool,
    pub detect_cloud_providers: bool,
    /// Extract `${{ … }}` expressions from workflow files.
    pub parse_expressions: bool,
    /// Drop tool detections and cross-reference flows scoring below this.
    pub min_confidence: u8,
    /// Include low-confidence inferred Terraform→Helm flows.
    pub include_inferred: bool,
    /// Cap on cross-reference flows emitted per workflow.
    pub max_flows: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_recovery: true,
            max_file_size: None,
            timeout_ms: 30_000,
            include_raw: true,
            parse_nested_blocks: true,
            strict_yaml: false,
            detect_terraform: true,
            detect_helm: true,
            detect_kubernetes: true,
            detect_cloud_providers: true,
            parse_expressions: true,
            min_confidence: 0,
            include_inferred: false,
            max_flows: 100,
        }
    }
}

impl ParseOptions {
    /// The effective input-size limit for Terraform sources.
    pub fn terraform_size_limit(&self) -> usize {
        self.max_file_size.unwrap_or(10 * 1024 * 1024)
    }

    /// The effective input-size limit for workflow and helmfile sources.
    pub fn yaml_size_limit(&self) -> usize {
        self.max_file_size.unwrap_or(5 * 1024 * 1024)
    }

    /// Starts the wall-clock budget for one parse.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(Duration::from_millis(self.timeout_ms))
    }
}

/// A wall-clock deadline checked at parser loop boundaries.
#[derive(Copy, Clone, Debug)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now() + budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert!(options.error_recovery);
        assert_eq!(options.timeout_ms, 30_000);
        assert_eq!(options.max_flows, 100);
        assert_eq!(options.terraform_size_limit(), 10 * 1024 * 1024);
        assert_eq!(options.yaml_size_limit(), 5 * 1024 * 1024);
    }

    #[test]
    fn test_explicit_size_limit_wins() {
        let options = ParseOptions {
            max_file_size: Some(1024),
            ..Default::default()
        };
        assert_eq!(options.terraform_size_limit(), 1024);
        assert_eq!(options.yaml_size_limit(), 1024);
    }
}
