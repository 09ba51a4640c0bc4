//! End-to-end workflow parsing against realistic documents.

use gha_models::{RunsOn, Step, Trigger, UsesCoordinate, WorkflowParser};
use iac_diagnostics::ParseOptions;
use pretty_assertions::assert_eq;

const TERRAFORM_DEPLOY: &str = r#"
name: Terraform Deploy
on:
  push:
    branches: [main]
  pull_request:
    types: [opened, synchronize]
  schedule:
    - cron: '0 6 * * 1'

permissions:
  contents: read
  id-token: write

concurrency:
  group: deploy-${{ github.ref }}
  cancel-in-progress: true

env:
  TF_VERSION: 1.7.5

jobs:
  terraform:
    runs-on: ubuntu-latest
    environment: production
    outputs:
      cluster_name: ${{ steps.outputs.outputs.cluster_name }}
      image_tag: ${{ steps.outputs.outputs.image_tag }}
    steps:
      - uses: actions/checkout@v4
      - uses: hashicorp/setup-terraform@v3
        with:
          terraform_version: ${{ env.TF_VERSION }}
      - run: terraform init -backend-config=env/prod.backend
        working-directory: infra
      - run: terraform apply -auto-approve -var-file=prod.tfvars
        working-directory: infra
      - id: outputs
        run: |
          echo "cluster_name=$(terraform output -raw cluster_name)" >> "$GITHUB_OUTPUT"
          echo "image_tag=$(terraform output -raw image_tag)" >> "$GITHUB_OUTPUT"
        working-directory: infra

  helm:
    runs-on: ubuntu-latest
    needs: terraform
    strategy:
      matrix:
        namespace: [staging, prod]
    steps:
      - uses: actions/checkout@v4
      - uses: azure/setup-helm@v4
      - run: |
          helm upgrade web ./charts/web \
            --namespace ${{ matrix.namespace }} \
            --set image.tag=${{ needs.terraform.outputs.image_tag }} \
            --set cluster=${{ needs.terraform.outputs.cluster_name }} \
            --wait --atomic
"#;

const WORKFLOW_CALL: &str = r#"
on:
  workflow_call:
    inputs:
      environment:
        type: string
        required: true
    outputs:
      deployed:
        value: ${{ jobs.deploy.outputs.done }}
    secrets:
      KUBE_CONFIG:
        required: true

jobs:
  deploy:
    runs-on: ubuntu-latest
    outputs:
      done: 'true'
    steps:
      - run: echo deploying to ${{ inputs.environment }}
"#;

fn parse(source: &str) -> gha_models::Workflow {
    let result = WorkflowParser::new(ParseOptions::default()).parse(source, Some("deploy.yml"));
    assert!(result.success, "diagnostics: {:?}", result.errors);
    result.value.expect("workflow value")
}

#[test]
fn test_terraform_deploy_structure() {
    let workflow = parse(TERRAFORM_DEPLOY);

    assert_eq!(workflow.name.as_deref(), Some("Terraform Deploy"));
    assert_eq!(workflow.triggers.len(), 3);
    assert!(matches!(workflow.triggers[0], Trigger::Push { .. }));
    assert!(matches!(workflow.triggers[1], Trigger::PullRequest { .. }));
    assert!(
        matches!(&workflow.triggers[2], Trigger::Schedule { cron } if cron == &["0 6 * * 1"])
    );

    assert_eq!(workflow.jobs.len(), 2);
    let terraform = &workflow.jobs["terraform"];
    assert_eq!(terraform.outputs.len(), 2);
    assert_eq!(
        terraform.environment.as_ref().and_then(|e| e.name.as_deref()),
        Some("production")
    );

    let helm = &workflow.jobs["helm"];
    assert_eq!(helm.needs, vec!["terraform"]);
    assert!(helm.has_matrix());
}

#[test]
fn test_steps_keep_declaration_order() {
    let workflow = parse(TERRAFORM_DEPLOY);
    let steps = &workflow.jobs["terraform"].steps;
    assert_eq!(steps.len(), 5);

    assert_eq!(steps[0].uses_clause(), Some("actions/checkout@v4"));
    assert_eq!(steps[1].uses_clause(), Some("hashicorp/setup-terraform@v3"));
    assert!(steps[2].run_text().is_some_and(|r| r.contains("terraform init")));
    assert!(steps[3].run_text().is_some_and(|r| r.contains("terraform apply")));
    assert!(steps[4].run_text().is_some_and(|r| r.contains("terraform output")));

    // Step spans ascend with declaration order.
    let lines: Vec<u32> = steps.iter().map(|s| s.common().span.line_start).collect();
    assert!(lines.windows(2).all(|pair| pair[0] < pair[1]), "{lines:?}");
}

#[test]
fn test_uses_step_inputs_and_coordinates() {
    let workflow = parse(TERRAFORM_DEPLOY);
    let setup = &workflow.jobs["terraform"].steps[1];

    assert_eq!(
        setup.with_input("terraform_version"),
        Some("${{ env.TF_VERSION }}")
    );
    assert_eq!(
        setup.coordinate(),
        Some(UsesCoordinate::Repository {
            owner: "hashicorp".into(),
            repo: "setup-terraform".into(),
            subpath: None,
            git_ref: Some("v3".into()),
        })
    );
}

#[test]
fn test_run_step_working_directory() {
    let workflow = parse(TERRAFORM_DEPLOY);
    let init = &workflow.jobs["terraform"].steps[2];
    assert_eq!(init.common().working_directory.as_deref(), Some("infra"));
}

#[test]
fn test_workflow_call_trigger() -> anyhow::Result<()> {
    let result = WorkflowParser::new(ParseOptions::default()).parse(WORKFLOW_CALL, None);
    let workflow = result.value.ok_or_else(|| anyhow::anyhow!("no workflow"))?;
    let Trigger::WorkflowCall {
        inputs,
        outputs,
        secrets,
    } = &workflow.triggers[0]
    else {
        anyhow::bail!("expected workflow_call trigger");
    };

    assert!(inputs["environment"].required);
    assert_eq!(inputs["environment"].input_type.as_deref(), Some("string"));
    assert_eq!(outputs["deployed"], "${{ jobs.deploy.outputs.done }}");
    assert_eq!(secrets, &["KUBE_CONFIG"]);
    Ok(())
}

#[test]
fn test_bare_and_list_on_forms() {
    let options = ParseOptions::default();
    let parser = WorkflowParser::new(options);

    let bare = parser
        .parse("on: push\njobs: {}\n", None)
        .value
        .expect("workflow value");
    assert_eq!(bare.triggers.len(), 1);
    assert_eq!(bare.triggers[0].name(), "push");

    let listed = parser
        .parse("on: [push, pull_request, release]\njobs: {}\n", None)
        .value
        .expect("workflow value");
    assert_eq!(
        listed.triggers.iter().map(Trigger::name).collect::<Vec<_>>(),
        vec!["push", "pull_request", "release"]
    );
}

#[test]
fn test_runs_on_forms() {
    let workflow = parse(TERRAFORM_DEPLOY);
    assert_eq!(
        workflow.jobs["terraform"].runs_on,
        RunsOn::One("ubuntu-latest".into())
    );
    assert_eq!(workflow.jobs["terraform"].runs_on.labels(), vec!["ubuntu-latest"]);
}

#[test]
fn test_run_true_coerces_to_string() {
    let parser = WorkflowParser::new(ParseOptions::default());
    let workflow = parser
        .parse(
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: true\n",
            None,
        )
        .value
        .expect("workflow value");
    let Step::Run { run, .. } = &workflow.jobs["a"].steps[0] else {
        panic!("expected run step");
    };
    assert_eq!(run, "true");
}
