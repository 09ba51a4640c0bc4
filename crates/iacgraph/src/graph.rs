//! Graph emission: flat node/edge tables with opaque ids.
//!
//! Cyclic structures (Terraform `depends_on`, job graphs) are never built
//! as object graphs; everything is emitted as id-keyed rows for the
//! consumer to store or traverse.

use hcl_syntax::{HclBlock, HclBlockType, ReferenceKind, collect_references};
use helmfile_models::Helmfile;
use serde::Serialize;
use serde_json::json;

use crate::analysis::WorkflowAnalysis;

/// A typed graph node.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    pub metadata: serde_json::Value,
}

/// A typed, directed graph edge.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub metadata: serde_json::Value,
}

/// An emitted node/edge table.
#[derive(Serialize, Clone, Debug, Default)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    fn node(&mut self, id: impl Into<String>, node_type: &str, label: impl Into<String>) {
        self.node_with(id, node_type, label, serde_json::Value::Null);
    }

    fn node_with(
        &mut self,
        id: impl Into<String>,
        node_type: &str,
        label: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        let id = id.into();
        if self.nodes.iter().any(|node| node.id == id) {
            return;
        }
        self.nodes.push(GraphNode {
            id,
            node_type: node_type.to_string(),
            label: label.into(),
            metadata,
        });
    }

    fn edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        edge_type: &str,
        metadata: serde_json::Value,
    ) {
        self.edges.push(GraphEdge {
            source: source.into(),
            target: target.into(),
            edge_type: edge_type.to_string(),
            metadata,
        });
    }

    /// Appends another graph's rows.
    pub fn merge(&mut self, other: Graph) {
        for node in other.nodes {
            self.node_with(node.id, &node.node_type, node.label, node.metadata);
        }
        self.edges.extend(other.edges);
    }
}

/// Emits nodes and reference edges for parsed Terraform blocks.
pub fn emit_terraform(blocks: &[HclBlock]) -> Graph {
    let mut graph = Graph::default();

    for block in blocks {
        let Some(kind) = block.kind() else {
            continue;
        };
        match kind {
            HclBlockType::Resource => {
                let id = resource_id(&block.labels);
                graph.node_with(
                    &id,
                    "terraform_resource",
                    block.labels.join("."),
                    json!({"file": block.span.file}),
                );
                emit_block_references(&mut graph, &id, block);
            }
            HclBlockType::Data => {
                let id = format!("tf:data.{}", block.labels.join("."));
                graph.node_with(
                    &id,
                    "terraform_data",
                    format!("data.{}", block.labels.join(".")),
                    json!({"file": block.span.file}),
                );
                emit_block_references(&mut graph, &id, block);
            }
            HclBlockType::Module => {
                let name = block.labels.first().cloned().unwrap_or_default();
                let id = format!("tf:module.{name}");
                let source = block
                    .attribute("source")
                    .and_then(|expr| expr.raw())
                    .map(|raw| raw.trim_matches('"').to_string());
                graph.node_with(
                    &id,
                    "terraform_module",
                    format!("module.{name}"),
                    json!({"source": source}),
                );
                emit_block_references(&mut graph, &id, block);
            }
            HclBlockType::Variable => {
                let name = block.labels.first().cloned().unwrap_or_default();
                graph.node(format!("tf:var.{name}"), "terraform_variable", &name);
            }
            HclBlockType::Output => {
                let name = block.labels.first().cloned().unwrap_or_default();
                let id = format!("tf:output.{name}");
                graph.node(&id, "terraform_output", &name);
                emit_block_references(&mut graph, &id, block);
            }
            HclBlockType::Locals => {
                for (name, value) in &block.attributes {
                    let id = format!("tf:local.{name}");
                    graph.node(&id, "terraform_local", name);
                    for reference in collect_references(value) {
                        if let Some(target) = reference_id(&reference.kind, &reference.parts) {
                            graph.edge(&id, target, "references", serde_json::Value::Null);
                        }
                    }
                }
            }
            HclBlockType::Provider => {
                let name = block.labels.first().cloned().unwrap_or_default();
                graph.node(format!("tf:provider.{name}"), "terraform_provider", &name);
            }
            HclBlockType::Terraform | HclBlockType::Moved | HclBlockType::Import => {}
        }
    }

    graph
}

/// Reference and `depends_on` edges out of a block's attributes.
fn emit_block_references(graph: &mut Graph, source_id: &str, block: &HclBlock) {
    for (name, value) in &block.attributes {
        let edge_type = if name == "depends_on" {
            "depends_on"
        } else {
            "references"
        };
        for reference in collect_references(value) {
            if let Some(target) = reference_id(&reference.kind, &reference.parts) {
                if target == source_id {
                    continue;
                }
                graph.edge(
                    source_id,
                    target,
                    edge_type,
                    json!({"attribute": name}),
                );
            }
        }
    }

    for nested in &block.nested_blocks {
        emit_block_references(graph, source_id, nested);
    }
}

fn resource_id(labels: &[String]) -> String {
    format!("tf:{}", labels.join("."))
}

/// The node id a reference points at, for the reference kinds that name
/// graph nodes.
fn reference_id(kind: &ReferenceKind, parts: &[String]) -> Option<String> {
    match kind {
        ReferenceKind::Var => Some(format!("tf:var.{}", parts.first()?)),
        ReferenceKind::Local => Some(format!("tf:local.{}", parts.first()?)),
        ReferenceKind::Module => Some(format!("tf:module.{}", parts.first()?)),
        ReferenceKind::Data => {
            let (first, second) = (parts.first()?, parts.get(1)?);
            Some(format!("tf:data.{first}.{second}"))
        }
        ReferenceKind::Resource => {
            let (first, second) = (parts.first()?, parts.get(1)?);
            Some(format!("tf:{first}.{second}"))
        }
        _ => None,
    }
}

/// Emits the workflow graph: the workflow, its jobs and steps, action
/// uses, tool annotations, and flow edges.
pub fn emit_workflow(analysis: &WorkflowAnalysis) -> Graph {
    let mut graph = Graph::default();
    let workflow = &analysis.workflow;

    let workflow_id = format!(
        "gha:{}",
        workflow
            .file_path
            .as_deref()
            .or(workflow.name.as_deref())
            .unwrap_or("workflow")
    );
    graph.node_with(
        &workflow_id,
        "gha_workflow",
        workflow.name.clone().unwrap_or_else(|| "workflow".into()),
        json!({
            "triggers": workflow.triggers.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
        }),
    );

    for (job_id, job) in &workflow.jobs {
        let job_node = job_node_id(&workflow_id, job_id);
        graph.node_with(
            &job_node,
            "gha_job",
            job.name.clone().unwrap_or_else(|| job_id.clone()),
            json!({"outputs": job.outputs.keys().collect::<Vec<_>>()}),
        );
        graph.edge(&workflow_id, &job_node, "gha_contains", serde_json::Value::Null);

        // Entry jobs are what the workflow's triggers start.
        if job.needs.is_empty() {
            graph.edge(&workflow_id, &job_node, "gha_triggers", serde_json::Value::Null);
        }
        for needed in &job.needs {
            graph.edge(
                &job_node,
                job_node_id(&workflow_id, needed),
                "gha_needs",
                serde_json::Value::Null,
            );
        }

        for (index, step) in job.steps.iter().enumerate() {
            let step_node = format!("{job_node}:step:{index}");
            let label = step
                .common()
                .name
                .clone()
                .or_else(|| step.common().id.clone())
                .unwrap_or_else(|| format!("step {index}"));
            graph.node_with(
                &step_node,
                "gha_step",
                label,
                json!({"line": step.common().span.line_start}),
            );
            graph.edge(&job_node, &step_node, "gha_contains", serde_json::Value::Null);

            if let Some(coordinate) = step.coordinate()
                && let Some(slug) = coordinate.slug()
            {
                let action_node = format!("action:{slug}");
                graph.node(&action_node, "gha_action", &slug);
                graph.edge(
                    &step_node,
                    &action_node,
                    "gha_uses_action",
                    json!({"uses": step.uses_clause()}),
                );
            }
        }
    }

    for step in &analysis.terraform_steps {
        graph.edge(
            job_node_id(&workflow_id, &step.job_id),
            format!("{}:step:{}", job_node_id(&workflow_id, &step.job_id), step.step_index),
            "gha_uses_tf",
            json!({"command": step.command.as_str(), "confidence": step.confidence}),
        );
    }
    for step in &analysis.helm_steps {
        graph.edge(
            job_node_id(&workflow_id, &step.job_id),
            format!("{}:step:{}", job_node_id(&workflow_id, &step.job_id), step.step_index),
            "gha_uses_helm",
            json!({"command": step.command.as_str(), "confidence": step.confidence}),
        );
    }

    for flow in &analysis.output_flows {
        let Some(source_job) = &flow.source_job else {
            continue;
        };
        graph.edge(
            job_node_id(&workflow_id, source_job),
            job_node_id(&workflow_id, &flow.target_job),
            "gha_outputs_to",
            json!({
                "output": flow.output_name,
                "kind": flow.kind.as_str(),
                "confidence": flow.confidence,
            }),
        );
    }

    for flow in &analysis.flows {
        graph.edge(
            job_node_id(&workflow_id, &flow.source.job_id),
            job_node_id(&workflow_id, &flow.target.job_id),
            "terraform_to_helm",
            json!({
                "pattern": flow.pattern.as_str(),
                "output": flow.source.output_name,
                "confidence": flow.confidence,
                "confidence_level": flow.confidence_level,
            }),
        );
    }

    graph
}

fn job_node_id(workflow_id: &str, job_id: &str) -> String {
    format!("{workflow_id}:job:{job_id}")
}

/// Emits release nodes and `depends_on` edges for a helmfile.
pub fn emit_helmfile(helmfile: &Helmfile) -> Graph {
    let mut graph = Graph::default();

    for release in &helmfile.releases {
        let id = format!("helm:{}", release.key());
        graph.node_with(
            &id,
            "helmfile_release",
            release.name.clone(),
            json!({
                "namespace": release.namespace,
                "chart": release.chart,
                "version": release.version,
            }),
        );
    }

    for release in &helmfile.releases {
        let id = format!("helm:{}", release.key());
        for needed in &release.needs {
            if let Some(target) = helmfile.find_release(needed) {
                graph.edge(
                    &id,
                    format!("helm:{}", target.key()),
                    "depends_on",
                    serde_json::Value::Null,
                );
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use hcl_syntax::HclParser;
    use helmfile_models::HelmfileParser;
    use iac_diagnostics::ParseOptions;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_terraform_emission() {
        let source = r#"
variable "env" {
  default = "dev"
}

resource "aws_instance" "web" {
  ami = data.aws_ami.ubuntu.id
  tags = {
    Env = var.env
  }
  depends_on = [aws_security_group.sg]
}

resource "aws_security_group" "sg" {
  name = "web-sg"
}

data "aws_ami" "ubuntu" {
  most_recent = true
}

output "instance_ip" {
  value = aws_instance.web.public_ip
}

locals {
  name_prefix = var.env
}
"#;
        let blocks = HclParser::new(ParseOptions::default())
            .parse(source, Some("main.tf"))
            .value
            .expect("blocks");
        let graph = emit_terraform(&blocks);

        let types: Vec<&str> = graph.nodes.iter().map(|n| n.node_type.as_str()).collect();
        for expected in [
            "terraform_variable",
            "terraform_resource",
            "terraform_data",
            "terraform_output",
            "terraform_local",
        ] {
            assert!(types.contains(&expected), "missing {expected}");
        }

        assert!(graph.edges.iter().any(|e| {
            e.edge_type == "depends_on"
                && e.source == "tf:aws_instance.web"
                && e.target == "tf:aws_security_group.sg"
        }));
        assert!(graph.edges.iter().any(|e| {
            e.edge_type == "references"
                && e.source == "tf:aws_instance.web"
                && e.target == "tf:data.aws_ami.ubuntu"
        }));
        assert!(graph.edges.iter().any(|e| {
            e.edge_type == "references"
                && e.source == "tf:output.instance_ip"
                && e.target == "tf:aws_instance.web"
        }));
        assert!(graph.edges.iter().any(|e| {
            e.edge_type == "references"
                && e.source == "tf:local.name_prefix"
                && e.target == "tf:var.env"
        }));
    }

    #[test]
    fn test_helmfile_emission() {
        let source = "releases:\n  - name: db\n    chart: bitnami/postgresql\n  - name: app\n    chart: charts/app\n    needs: [db]\n";
        let helmfile = HelmfileParser::new(ParseOptions::default())
            .parse(source, None)
            .value
            .expect("helmfile");
        let graph = emit_helmfile(&helmfile);

        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.nodes.iter().all(|n| n.node_type == "helmfile_release"));
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].edge_type, "depends_on");
        assert_eq!(graph.edges[0].source, "helm:default/app");
        assert_eq!(graph.edges[0].target, "helm:default/db");
    }
}
