//! The Terraform→Helm cross-reference engine.
//!
//! Correlates Terraform output sites with Helm input sites across a
//! workflow's jobs, using pattern-specific detectors that each accumulate
//! evidence independently. Flows are scored on an integer 0–100 scale,
//! deduplicated by (source job, target job, output name) keeping the
//! maximum-scoring variant, and bounded by the configured flow cap.

use std::collections::HashMap;

use gha_models::Workflow;
use iac_diagnostics::ParseOptions;
use serde::Serialize;

use crate::tools::ToolDetections;

mod patterns;

/// The eight flow classifications.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowPattern {
    DirectOutput,
    OutputToEnv,
    OutputToFile,
    OutputToSecret,
    JobChain,
    ArtifactTransfer,
    MatrixPropagation,
    Inferred,
}

impl FlowPattern {
    /// The base score each pattern starts from.
    pub fn base(&self) -> i32 {
        match self {
            Self::DirectOutput => 90,
            Self::OutputToEnv => 80,
            Self::OutputToFile => 75,
            Self::OutputToSecret => 85,
            Self::JobChain => 70,
            Self::ArtifactTransfer => 65,
            Self::MatrixPropagation => 60,
            Self::Inferred => 40,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectOutput => "direct_output",
            Self::OutputToEnv => "output_to_env",
            Self::OutputToFile => "output_to_file",
            Self::OutputToSecret => "output_to_secret",
            Self::JobChain => "job_chain",
            Self::ArtifactTransfer => "artifact_transfer",
            Self::MatrixPropagation => "matrix_propagation",
            Self::Inferred => "inferred",
        }
    }
}

/// The kinds of evidence a detector can attach to a flow.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    ExplicitReference,
    ExpressionMatch,
    EnvVariable,
    ArtifactPath,
    JobDependency,
    NamingConvention,
    StepProximity,
    SemanticMatch,
    FilePathMatch,
}

impl EvidenceKind {
    /// The weight each evidence kind carries in score combination.
    pub fn weight(&self) -> f64 {
        match self {
            Self::ExplicitReference => 1.0,
            Self::ExpressionMatch => 0.9,
            Self::EnvVariable => 0.8,
            Self::ArtifactPath => 0.7,
            Self::JobDependency => 0.8,
            Self::NamingConvention => 0.5,
            Self::StepProximity => 0.4,
            Self::SemanticMatch => 0.6,
            Self::FilePathMatch => 0.6,
        }
    }
}

/// One piece of evidence supporting a flow.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub description: String,
    pub weight: f64,
}

impl Evidence {
    /// Evidence carrying its kind's default weight.
    pub fn of(kind: EvidenceKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            weight: kind.weight(),
        }
    }

    /// Evidence with an explicitly adjusted weight.
    pub fn weighted(kind: EvidenceKind, description: impl Into<String>, weight: f64) -> Self {
        Self {
            kind,
            description: description.into(),
            weight,
        }
    }
}

/// Banded confidence. High is 80 and up, medium 50 and up, low below.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::High
        } else if score >= 50 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Where a Terraform output leaves Terraform.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TfOutputInfo {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// The Terraform output name, resolved through the job's
    /// `$GITHUB_OUTPUT` wiring when possible.
    pub output_name: String,
    /// The job-output key the value is exposed under, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_output_key: Option<String>,
}

/// The kind of Helm input site a flow lands on.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HelmValueSite {
    SetValue,
    SetFile,
    ValuesFile,
    Env,
    Secret,
    Artifact,
    Naming,
}

/// Where a value enters Helm.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct HelmValueSource {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    pub site: HelmValueSite,
    /// The `--set` path, file path, env key, secret or artifact name.
    pub target: String,
}

/// The workflow a flow was discovered in.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct WorkflowContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// A scored Terraform→Helm data-propagation flow.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Flow {
    pub id: String,
    pub source: TfOutputInfo,
    pub target: HelmValueSource,
    pub pattern: FlowPattern,
    pub confidence: u8,
    pub confidence_level: ConfidenceLevel,
    pub evidence: Vec<Evidence>,
    pub workflow_context: WorkflowContext,
}

/// Combines a pattern base with accumulated evidence.
///
/// `evidence_score` sums only evidence at or above weight 0.5 (capped at
/// 20) so that shedding weak evidence can never lower a flow's score; a
/// +5 bonus applies when any evidence is an explicit reference, and a 10
/// penalty applies when all evidence present is weak.
pub(crate) fn combine_score(pattern: FlowPattern, evidence: &[Evidence]) -> u8 {
    let evidence_score: f64 = evidence
        .iter()
        .filter(|e| e.weight >= 0.5)
        .map(|e| e.weight * 10.0)
        .sum::<f64>()
        .min(20.0);

    let explicit_bonus = if evidence
        .iter()
        .any(|e| e.kind == EvidenceKind::ExplicitReference)
    {
        5
    } else {
        0
    };

    let weakness_penalty =
        if !evidence.is_empty() && evidence.iter().all(|e| e.weight < 0.5) {
            10
        } else {
            0
        };

    (pattern.base() + evidence_score as i32 + explicit_bonus - weakness_penalty)
        .clamp(0, 100) as u8
}

/// Builds a flow from its parts, deriving id, score, and level.
pub(crate) fn build_flow(
    pattern: FlowPattern,
    source: TfOutputInfo,
    target: HelmValueSource,
    evidence: Vec<Evidence>,
    context: WorkflowContext,
) -> Flow {
    let confidence = combine_score(pattern, &evidence);
    Flow {
        id: format!(
            "{}:{}.{}->{}",
            pattern.as_str(),
            source.job_id,
            source.output_name,
            target.job_id
        ),
        confidence,
        confidence_level: ConfidenceLevel::from_score(confidence),
        source,
        target,
        pattern,
        evidence,
        workflow_context: context,
    }
}

/// The cross-reference engine.
pub struct CrossRefEngine {
    options: ParseOptions,
}

impl CrossRefEngine {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Correlates Terraform outputs with Helm input sites across one
    /// workflow.
    pub fn correlate(&self, workflow: &Workflow, detections: &ToolDetections) -> Vec<Flow> {
        let context = patterns::EngineContext::new(workflow, detections);
        let mut candidates = Vec::new();

        candidates.extend(patterns::direct_output(&context));
        candidates.extend(patterns::output_to_env(&context));
        candidates.extend(patterns::output_to_file(&context));
        candidates.extend(patterns::output_to_secret(&context));
        candidates.extend(patterns::job_chain(&context));
        candidates.extend(patterns::artifact_transfer(&context));
        candidates.extend(patterns::matrix_propagation(&context));
        if self.options.include_inferred {
            candidates.extend(patterns::inferred(&context));
        }

        // Dedup by (source job, target job, output), keeping the best.
        let mut best: HashMap<(String, String, String), Flow> = HashMap::new();
        for flow in candidates {
            let key = (
                flow.source.job_id.clone(),
                flow.target.job_id.clone(),
                flow.source.output_name.clone(),
            );
            match best.get(&key) {
                Some(existing) if existing.confidence >= flow.confidence => {}
                _ => {
                    best.insert(key, flow);
                }
            }
        }

        let mut flows: Vec<Flow> = best
            .into_values()
            .filter(|flow| flow.confidence >= self.options.min_confidence)
            .collect();
        flows.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
        });
        flows.truncate(self.options.max_flows);
        flows
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_score(100), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(80), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(79), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(50), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(49), ConfidenceLevel::Low);
    }

    #[test]
    fn test_score_combination() {
        let explicit = Evidence::of(EvidenceKind::ExplicitReference, "set value reference");
        let dependency = Evidence::of(EvidenceKind::JobDependency, "needs edge");

        // 90 + (10 + 8) + 5, clamped to 100.
        assert_eq!(
            combine_score(
                FlowPattern::DirectOutput,
                &[explicit.clone(), dependency.clone()]
            ),
            100
        );

        // 70 + 8 = 78.
        assert_eq!(combine_score(FlowPattern::JobChain, &[dependency]), 78);

        // All-weak evidence takes the 10 penalty: 40 + 0 - 10 = 30.
        let weak = Evidence::of(EvidenceKind::StepProximity, "adjacent steps");
        assert_eq!(combine_score(FlowPattern::Inferred, &[weak]), 30);

        // No evidence at all: no penalty, bare base.
        assert_eq!(combine_score(FlowPattern::Inferred, &[]), 40);
    }

    #[test]
    fn test_adding_explicit_reference_never_decreases() {
        let kinds = [
            EvidenceKind::EnvVariable,
            EvidenceKind::JobDependency,
            EvidenceKind::StepProximity,
            EvidenceKind::NamingConvention,
        ];

        for pattern in [
            FlowPattern::DirectOutput,
            FlowPattern::JobChain,
            FlowPattern::Inferred,
        ] {
            for kind in kinds {
                let mut evidence = vec![Evidence::of(kind, "existing")];
                let before = combine_score(pattern, &evidence);
                evidence.push(Evidence::of(EvidenceKind::ExplicitReference, "added"));
                let after = combine_score(pattern, &evidence);
                assert!(after >= before, "{pattern:?}/{kind:?}: {before} -> {after}");
            }
        }
    }

    #[test]
    fn test_removing_weak_evidence_never_decreases() {
        let strong = Evidence::of(EvidenceKind::JobDependency, "needs edge");
        let weak = Evidence::of(EvidenceKind::StepProximity, "adjacent");

        for pattern in [FlowPattern::DirectOutput, FlowPattern::JobChain] {
            let with_weak = combine_score(pattern, &[strong.clone(), weak.clone()]);
            let without_weak = combine_score(pattern, &[strong.clone()]);
            assert!(without_weak >= with_weak);

            let only_weak = combine_score(pattern, &[weak.clone()]);
            let empty = combine_score(pattern, &[]);
            assert!(empty >= only_weak);
        }
    }

    #[test]
    fn test_evidence_weights_table() {
        assert_eq!(EvidenceKind::ExplicitReference.weight(), 1.0);
        assert_eq!(EvidenceKind::ExpressionMatch.weight(), 0.9);
        assert_eq!(EvidenceKind::EnvVariable.weight(), 0.8);
        assert_eq!(EvidenceKind::ArtifactPath.weight(), 0.7);
        assert_eq!(EvidenceKind::JobDependency.weight(), 0.8);
        assert_eq!(EvidenceKind::NamingConvention.weight(), 0.5);
        assert_eq!(EvidenceKind::StepProximity.weight(), 0.4);
        assert_eq!(EvidenceKind::SemanticMatch.weight(), 0.6);
        assert_eq!(EvidenceKind::FilePathMatch.weight(), 0.6);
    }

    #[test]
    fn test_pattern_names_stable() {
        assert_eq!(FlowPattern::DirectOutput.as_str(), "direct_output");
        assert_eq!(FlowPattern::OutputToEnv.as_str(), "output_to_env");
        assert_eq!(FlowPattern::OutputToFile.as_str(), "output_to_file");
        assert_eq!(FlowPattern::OutputToSecret.as_str(), "output_to_secret");
        assert_eq!(FlowPattern::JobChain.as_str(), "job_chain");
        assert_eq!(FlowPattern::ArtifactTransfer.as_str(), "artifact_transfer");
        assert_eq!(FlowPattern::MatrixPropagation.as_str(), "matrix_propagation");
        assert_eq!(FlowPattern::Inferred.as_str(), "inferred");
    }
}
