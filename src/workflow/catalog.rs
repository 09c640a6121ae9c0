//! Workflow catalog
//!
//! Every `deployctl` subcommand maps to one [`Workflow`], which builds the
//! ordered step list from the resolved configuration:
//!
//! - `setup {full|prereq|dev|docker|aws|terraform|bootstrap}`
//! - `k8s {setup|start|deploy|access|status|logs|scale|update|cleanup|full}`
//! - `infra {deploy|destroy|status|plan|output}`
//!
//! Positional overrides (`k8s scale 5`, `k8s update web:2`) are folded into
//! the configuration before the workflow is built, so the config is the
//! only source of parameters here.

use std::fmt;
use std::path::Path;

use crate::engine::command::CommandSpec;
use crate::engine::steps::{
    BootstrapStep, CheckToolsStep, CommandStep, ConfirmStep, ForegroundStep, RolloutWaitStep,
    ScaleStep, SshKeyStep,
};
use crate::workflow::config::ResolvedConfig;
use crate::workflow::definition::WorkflowDefinition;
use crate::workflow::tools::{self, PackageManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupTarget {
    Full,
    Prereq,
    Dev,
    Docker,
    Aws,
    Terraform,
    Bootstrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum K8sAction {
    Setup,
    Start,
    Deploy,
    Access,
    Status,
    Logs,
    Scale,
    Update,
    Cleanup,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraAction {
    Deploy,
    Destroy,
    Status,
    Plan,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Setup(SetupTarget),
    K8s(K8sAction),
    Infra(InfraAction),
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Workflow::Setup(t) => write!(f, "setup {}", format!("{:?}", t).to_lowercase()),
            Workflow::K8s(a) => write!(f, "k8s {}", format!("{:?}", a).to_lowercase()),
            Workflow::Infra(a) => write!(f, "infra {}", format!("{:?}", a).to_lowercase()),
        }
    }
}

impl Workflow {
    /// Build the step list for this workflow
    pub fn build(&self, config: &ResolvedConfig) -> WorkflowDefinition {
        let def = match self {
            Workflow::Setup(target) => setup(*target, config),
            Workflow::K8s(action) => k8s(*action, config),
            Workflow::Infra(action) => infra(*action, config),
        };
        WorkflowDefinition {
            name: self.to_string(),
            ..def
        }
    }

    /// Settings without a built-in default that this workflow never reads
    pub fn unused_settings(&self) -> &'static [&'static str] {
        const BOTH: &[&str] = &["image", "region"];
        match self {
            Workflow::Setup(SetupTarget::Full) => &[],
            Workflow::Setup(SetupTarget::Docker) => &["region"],
            Workflow::Setup(SetupTarget::Aws) => &["image"],
            Workflow::Setup(_) => BOTH,
            Workflow::K8s(K8sAction::Deploy | K8sAction::Update | K8sAction::Full) => &["region"],
            Workflow::K8s(_) => BOTH,
            Workflow::Infra(InfraAction::Plan | InfraAction::Deploy | InfraAction::Destroy) => &[],
            Workflow::Infra(_) => BOTH,
        }
    }

    /// Long-lived commands that block until interrupted
    pub fn is_foreground(&self) -> bool {
        matches!(
            self,
            Workflow::K8s(K8sAction::Access) | Workflow::K8s(K8sAction::Logs)
        )
    }
}

// ============================================================================
// setup
// ============================================================================

fn setup(target: SetupTarget, config: &ResolvedConfig) -> WorkflowDefinition {
    match target {
        SetupTarget::Prereq => WorkflowDefinition::new("setup prereq")
            .describe("Check that every required tool is installed")
            .step(CheckToolsStep::new(tools::all())),
        SetupTarget::Bootstrap => WorkflowDefinition::new("setup bootstrap")
            .describe("Install missing tools with the host package manager")
            .step(BootstrapStep::new(tools::all(), PackageManager::for_host())),
        SetupTarget::Dev => setup_dev(),
        SetupTarget::Docker => setup_docker(config),
        SetupTarget::Aws => setup_aws(config),
        SetupTarget::Terraform => setup_terraform(config),
        SetupTarget::Full => WorkflowDefinition::new("setup full")
            .describe("Local environment, container, AWS credentials and Terraform")
            .extend(setup_dev())
            .extend(setup_docker(config))
            .extend(setup_aws(config))
            .extend(setup_terraform(config)),
    }
}

fn venv_pip() -> &'static str {
    if cfg!(windows) {
        r"venv\Scripts\pip"
    } else {
        "venv/bin/pip"
    }
}

fn setup_dev() -> WorkflowDefinition {
    WorkflowDefinition::new("setup dev")
        .describe("Create a Python virtual environment with the app's dependencies")
        .require(tools::python3())
        .step(
            CommandStep::new("create virtualenv")
                .command(CommandSpec::new("python3").args(["-m", "venv", "venv"])),
        )
        .step(
            CommandStep::new("install dependencies").command(
                CommandSpec::new(venv_pip()).args(["install", "-r", "requirements.txt"]),
            ),
        )
}

fn setup_docker(config: &ResolvedConfig) -> WorkflowDefinition {
    let port_mapping = format!("{}:{}", config.port, config.port);
    WorkflowDefinition::new("setup docker")
        .describe("Build the image and run it locally")
        .require(tools::docker())
        .step(
            CommandStep::new("build image").command(
                CommandSpec::new("docker").args(["build", "-t", config.image.as_str(), "."]),
            ),
        )
        .step(
            CommandStep::new("remove old container").command_if(
                CommandSpec::new("docker").args(["container", "inspect", config.container.as_str()]),
                CommandSpec::new("docker").args(["rm", "-f", config.container.as_str()]),
            ),
        )
        .step(
            CommandStep::new("run container")
                .not_idempotent()
                .command(CommandSpec::new("docker").args([
                    "run".to_string(),
                    "-d".to_string(),
                    "--name".to_string(),
                    config.container.clone(),
                    "-p".to_string(),
                    port_mapping,
                    "-e".to_string(),
                    format!("PORT={}", config.port),
                    config.image.clone(),
                ])),
        )
}

fn setup_aws(config: &ResolvedConfig) -> WorkflowDefinition {
    WorkflowDefinition::new("setup aws")
        .describe("Verify AWS credentials, set the region and create an SSH key")
        .require(tools::aws())
        .require(tools::ssh_keygen())
        .step(
            CommandStep::new("verify credentials")
                .command(CommandSpec::new("aws").args(["sts", "get-caller-identity"])),
        )
        .step(CommandStep::new("set region").command(
            CommandSpec::new("aws").args(["configure", "set", "region", config.region.as_str()]),
        ))
        .step(SshKeyStep::new())
}

fn terraform(dir: &Path) -> CommandSpec {
    CommandSpec::new("terraform").current_dir(dir)
}

fn setup_terraform(config: &ResolvedConfig) -> WorkflowDefinition {
    WorkflowDefinition::new("setup terraform")
        .describe("Initialise and validate the Terraform configuration")
        .require(tools::terraform())
        .step(terraform_init(config))
        .step(
            CommandStep::new("terraform validate")
                .command(terraform(&config.terraform_dir).arg("validate")),
        )
}

// ============================================================================
// k8s
// ============================================================================

fn kubectl(config: &ResolvedConfig) -> CommandSpec {
    CommandSpec::new("kubectl").args(["-n", config.namespace.as_str()])
}

fn k8s(action: K8sAction, config: &ResolvedConfig) -> WorkflowDefinition {
    match action {
        K8sAction::Start => k8s_start(),
        K8sAction::Setup => k8s_setup(),
        K8sAction::Deploy => k8s_deploy(config),
        K8sAction::Status => k8s_status(config),
        K8sAction::Access => WorkflowDefinition::new("k8s access")
            .describe("Forward the service port to localhost until interrupted")
            .require(tools::kubectl())
            .step(ForegroundStep::new(
                "port-forward",
                kubectl(config).args([
                    "port-forward".to_string(),
                    format!("service/{}", config.app),
                    format!("{}:{}", config.port, config.port),
                ]),
            )),
        K8sAction::Logs => WorkflowDefinition::new("k8s logs")
            .describe("Follow the deployment's logs until interrupted")
            .require(tools::kubectl())
            .step(ForegroundStep::new(
                "follow logs",
                kubectl(config).args([
                    "logs".to_string(),
                    "-f".to_string(),
                    format!("deployment/{}", config.app),
                ]),
            )),
        K8sAction::Scale => WorkflowDefinition::new("k8s scale")
            .describe("Scale the deployment and wait for the new replicas")
            .require(tools::kubectl())
            .step(ScaleStep::new(config.replicas.desired)),
        K8sAction::Update => WorkflowDefinition::new("k8s update")
            .describe("Roll the deployment to a new image")
            .require(tools::kubectl())
            .step(CommandStep::new("set image").command(kubectl(config).args([
                "set".to_string(),
                "image".to_string(),
                format!("deployment/{}", config.app),
                format!("{}={}", config.app, config.image),
            ])))
            .step(RolloutWaitStep::new()),
        K8sAction::Cleanup => WorkflowDefinition::new("k8s cleanup")
            .describe("Delete every resource from the manifests")
            .require(tools::kubectl())
            .step(ConfirmStep::new(format!(
                "Delete all resources from {} in namespace '{}'?",
                config.manifests_dir.display(),
                config.namespace
            )))
            .step(CommandStep::new("delete resources").command(kubectl(config).args([
                "delete".to_string(),
                "-f".to_string(),
                config.manifests_dir.display().to_string(),
                "--ignore-not-found".to_string(),
            ]))),
        K8sAction::Full => WorkflowDefinition::new("k8s full")
            .describe("Set up the cluster, deploy and show status")
            .extend(k8s_setup())
            .extend(k8s_deploy(config))
            .extend(k8s_status(config)),
    }
}

fn start_minikube() -> CommandStep {
    CommandStep::new("start minikube")
        .command(CommandSpec::new("minikube").args(["start", "--driver=docker"]))
}

fn k8s_start() -> WorkflowDefinition {
    WorkflowDefinition::new("k8s start")
        .describe("Start the local cluster")
        .require(tools::minikube())
        .step(start_minikube())
}

fn k8s_setup() -> WorkflowDefinition {
    WorkflowDefinition::new("k8s setup")
        .describe("Start the local cluster with metrics for autoscaling")
        .require(tools::minikube())
        .require(tools::kubectl())
        .step(start_minikube())
        .step(
            CommandStep::new("enable metrics-server").command(
                CommandSpec::new("minikube").args(["addons", "enable", "metrics-server"]),
            ),
        )
        .step(
            CommandStep::new("select context")
                .command(CommandSpec::new("kubectl").args(["config", "use-context", "minikube"])),
        )
}

fn k8s_deploy(config: &ResolvedConfig) -> WorkflowDefinition {
    WorkflowDefinition::new("k8s deploy")
        .describe("Build the image in the cluster, apply manifests and wait for rollout")
        .require(tools::minikube())
        .require(tools::kubectl())
        .step(CommandStep::new("build image").command(
            CommandSpec::new("minikube").args(["image", "build", "-t", config.image.as_str(), "."]),
        ))
        .step(CommandStep::new("apply manifests").command(kubectl(config).args([
            "apply".to_string(),
            "-f".to_string(),
            config.manifests_dir.display().to_string(),
        ])))
        .step(RolloutWaitStep::new())
}

fn k8s_status(config: &ResolvedConfig) -> WorkflowDefinition {
    WorkflowDefinition::new("k8s status")
        .describe("Show deployments, pods, services and autoscalers")
        .require(tools::kubectl())
        .step(
            CommandStep::new("show resources")
                .command(kubectl(config).args(["get", "deployments,pods,services,hpa"])),
        )
}

// ============================================================================
// infra
// ============================================================================

const PLAN_FILE: &str = "tfplan";

fn terraform_vars(config: &ResolvedConfig) -> Vec<String> {
    [
        ("region", config.region.clone()),
        ("min_size", config.replicas.min.to_string()),
        ("max_size", config.replicas.max.to_string()),
        ("desired_capacity", config.replicas.desired.to_string()),
        ("app_port", config.port.to_string()),
        ("image", config.image.clone()),
    ]
    .into_iter()
    .flat_map(|(name, value)| ["-var".to_string(), format!("{}={}", name, value)])
    .collect()
}

fn terraform_init(config: &ResolvedConfig) -> CommandStep {
    CommandStep::new("terraform init")
        .command(terraform(&config.terraform_dir).args(["init", "-input=false"]))
}

fn terraform_plan(config: &ResolvedConfig) -> CommandStep {
    CommandStep::new("terraform plan").command(
        terraform(&config.terraform_dir)
            .args(["plan", "-input=false"])
            .arg(format!("-out={}", PLAN_FILE))
            .args(terraform_vars(config)),
    )
}

fn infra(action: InfraAction, config: &ResolvedConfig) -> WorkflowDefinition {
    let base = WorkflowDefinition::new(format!("infra {:?}", action).to_lowercase())
        .require(tools::terraform());

    match action {
        InfraAction::Plan => base
            .describe("Preview infrastructure changes")
            .require(tools::aws())
            .step(terraform_init(config))
            .step(terraform_plan(config)),
        InfraAction::Deploy => base
            .describe("Plan, confirm and apply infrastructure changes")
            .require(tools::aws())
            .step(terraform_init(config))
            .step(terraform_plan(config))
            .step(ConfirmStep::new(format!(
                "Apply this plan in region {}?",
                config.region
            )))
            .step(
                CommandStep::new("terraform apply")
                    .not_idempotent()
                    .command(
                        terraform(&config.terraform_dir).args(["apply", "-input=false", PLAN_FILE]),
                    ),
            ),
        InfraAction::Destroy => base
            .describe("Destroy all managed infrastructure")
            .require(tools::aws())
            .step(ConfirmStep::new(format!(
                "Destroy all infrastructure in region {}? This cannot be undone.",
                config.region
            )))
            .step(
                CommandStep::new("terraform destroy").command(
                    terraform(&config.terraform_dir)
                        .args(["destroy", "-auto-approve", "-input=false"])
                        .args(terraform_vars(config)),
                ),
            ),
        InfraAction::Status => base.describe("List managed resources").step(
            CommandStep::new("terraform state")
                .command(terraform(&config.terraform_dir).args(["state", "list"])),
        ),
        InfraAction::Output => base.describe("Show Terraform outputs").step(
            CommandStep::new("terraform output")
                .command(terraform(&config.terraform_dir).arg("output")),
        ),
    }
}
