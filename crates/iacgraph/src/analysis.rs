//! The workflow analysis pipeline: parse, detect, extract, correlate.

use gha_expressions::{Expression, extract_expressions, extract_expressions_from_file};
use gha_models::{Workflow, WorkflowParser};
use iac_diagnostics::{ParseOptions, ParseResult};
use serde::Serialize;

use crate::crossref::{CrossRefEngine, Flow};
use crate::flows::{OutputFlow, detect_output_flows};
use crate::tools::{HelmStep, OtherToolStep, TerraformStep, detect_tools};

/// A parsed workflow together with everything the detectors derived from
/// it.
#[derive(Serialize, Clone, Debug)]
pub struct WorkflowAnalysis {
    pub workflow: Workflow,
    pub terraform_steps: Vec<TerraformStep>,
    pub helm_steps: Vec<HelmStep>,
    pub other_tool_steps: Vec<OtherToolStep>,
    pub expressions: Vec<Expression>,
    pub output_flows: Vec<OutputFlow>,
    pub flows: Vec<Flow>,
}

/// Runs the full pipeline over workflow sources.
pub struct WorkflowAnalyzer {
    options: ParseOptions,
    parser: WorkflowParser,
}

impl WorkflowAnalyzer {
    pub fn new(options: ParseOptions) -> Self {
        let parser = WorkflowParser::new(options.clone());
        Self { options, parser }
    }

    /// Parses and analyzes one workflow document.
    ///
    /// Structural diagnostics carry through from the parser; the
    /// enrichment passes (tool detection, expression extraction, flow
    /// discovery, cross-referencing) have no error conditions of their
    /// own.
    pub fn analyze(
        &self,
        source: &str,
        file_path: Option<&str>,
    ) -> ParseResult<WorkflowAnalysis> {
        let parsed = self.parser.parse(source, file_path);

        let ParseResult {
            success,
            value,
            errors,
            warnings,
        } = parsed;

        let Some(workflow) = value else {
            return ParseResult {
                success,
                value: None,
                errors,
                warnings,
            };
        };

        let detections = detect_tools(&workflow, &self.options);

        let expressions = if self.options.parse_expressions {
            match file_path {
                Some(file) => extract_expressions_from_file(source, file),
                None => extract_expressions(source),
            }
        } else {
            Vec::new()
        };

        let output_flows = detect_output_flows(&workflow, &detections, &self.options);
        let flows =
            CrossRefEngine::new(self.options.clone()).correlate(&workflow, &detections);

        tracing::debug!(
            jobs = workflow.jobs.len(),
            terraform_steps = detections.terraform.len(),
            helm_steps = detections.helm.len(),
            flows = flows.len(),
            "workflow analyzed"
        );

        ParseResult {
            success,
            value: Some(WorkflowAnalysis {
                workflow,
                terraform_steps: detections.terraform,
                helm_steps: detections.helm,
                other_tool_steps: detections.other,
                expressions,
                output_flows,
                flows,
            }),
            errors,
            warnings,
        }
    }
}
