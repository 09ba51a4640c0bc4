//! iacgraph: typed dependency graphs across Terraform, Helmfile, and
//! GitHub Actions sources.
//!
//! The crate is the facade over the workspace's parsers and the home of
//! the analysis layers built on top of them:
//!
//! - [`tools`]: per-step Terraform/Helm/Kubernetes/cloud/Docker detection;
//! - [`flows`]: intra-workflow output-flow discovery;
//! - [`crossref`]: the Terraform→Helm cross-reference engine;
//! - [`graph`]: flat node/edge emission;
//! - [`analysis`]: the parse → detect → correlate pipeline.
//!
//! Inputs arrive as `(path, bytes)` pairs from the caller; recognition
//! heuristics live in [`InputKind`]. All parsers report through
//! [`ParseResult`], and a single [`ParseOptions`] value configures the
//! whole pipeline.

#![forbid(unsafe_code)]

pub mod analysis;
pub mod crossref;
pub mod flows;
pub mod graph;
pub mod tools;

pub use analysis::{WorkflowAnalysis, WorkflowAnalyzer};
pub use crossref::{
    ConfidenceLevel, CrossRefEngine, Evidence, EvidenceKind, Flow, FlowPattern,
    HelmValueSite, HelmValueSource, TfOutputInfo, WorkflowContext,
};
pub use flows::{OutputFlow, OutputFlowKind, detect_output_flows};
pub use graph::{Graph, GraphEdge, GraphNode, emit_helmfile, emit_terraform, emit_workflow};
pub use tools::{
    BackendConfig, HelmCommand, HelmStep, OtherToolStep, TerraformCommand, TerraformStep,
    ToolDetections, ToolFamily, detect_tools,
};

pub use iac_diagnostics::{
    Deadline, Diagnostic, DiagnosticCode, InputKind, ParseOptions, ParseResult, Severity,
    SourceSpan,
};

pub use gha_expressions as expressions;
pub use gha_models as workflow_model;
pub use hcl_syntax as hcl;
pub use helmfile_models as helmfile;

use hcl_syntax::{HclBlock, HclParser};
use helmfile_models::{Helmfile, HelmfileParser};
use gha_models::{Workflow, WorkflowParser};

/// Parses Terraform HCL source into blocks.
pub fn parse_terraform(
    source: &str,
    file_path: Option<&str>,
    options: &ParseOptions,
) -> ParseResult<Vec<HclBlock>> {
    HclParser::new(options.clone()).parse(source, file_path)
}

/// Parses a GitHub Actions workflow document.
pub fn parse_workflow(
    source: &str,
    file_path: Option<&str>,
    options: &ParseOptions,
) -> ParseResult<Workflow> {
    WorkflowParser::new(options.clone()).parse(source, file_path)
}

/// Parses a helmfile document, including dependency validation.
pub fn parse_helmfile(
    source: &str,
    file_path: Option<&str>,
    options: &ParseOptions,
) -> ParseResult<Helmfile> {
    HelmfileParser::new(options.clone()).parse(source, file_path)
}

/// Parses and analyzes a workflow in one call.
pub fn analyze_workflow(
    source: &str,
    file_path: Option<&str>,
    options: &ParseOptions,
) -> ParseResult<WorkflowAnalysis> {
    WorkflowAnalyzer::new(options.clone()).analyze(source, file_path)
}
