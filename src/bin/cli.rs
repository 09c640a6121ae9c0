use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use deploy_orchestrator::prelude::*;
use tracing_subscriber::EnvFilter;

/// Lines of stderr shown for a failed step
const STDERR_TAIL_LINES: usize = 20;

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(about = "Build, deploy and manage the web application's environments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    settings: Settings,

    /// Print what would run without executing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    yes: bool,

    /// Print the execution report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Configuration overrides; these take precedence over deploy.yaml and DEPLOY_* variables
#[derive(Args, Debug, Default)]
struct Settings {
    /// Path to the config file (default: ./deploy.yaml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Application (deployment and service) name
    #[arg(long, global = true)]
    app: Option<String>,

    /// Container image reference
    #[arg(long, global = true)]
    image: Option<String>,

    /// Name of the local Docker container
    #[arg(long, global = true)]
    container: Option<String>,

    /// Port the application listens on
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Kubernetes namespace
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// AWS region
    #[arg(long, global = true)]
    region: Option<String>,

    #[arg(long, global = true)]
    min_replicas: Option<u32>,

    #[arg(long, global = true)]
    max_replicas: Option<u32>,

    /// Desired replica count
    #[arg(long, global = true)]
    replicas: Option<u32>,

    /// Directory of Kubernetes manifests
    #[arg(long, global = true)]
    manifests_dir: Option<PathBuf>,

    /// Directory of the Terraform configuration
    #[arg(long, global = true)]
    terraform_dir: Option<PathBuf>,

    /// SSH key created by `setup aws`
    #[arg(long, global = true)]
    ssh_key: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Maximum rollout status polls
    #[arg(long, global = true)]
    rollout_attempts: Option<u32>,

    /// Seconds between rollout status polls
    #[arg(long, global = true, value_name = "SECS")]
    rollout_interval: Option<u64>,
}

impl Settings {
    fn to_layer(&self) -> PartialConfig {
        PartialConfig {
            app: self.app.clone(),
            image: self.image.clone(),
            container: self.container.clone(),
            port: self.port,
            min_replicas: self.min_replicas,
            max_replicas: self.max_replicas,
            replicas: self.replicas,
            region: self.region.clone(),
            namespace: self.namespace.clone(),
            manifests_dir: self.manifests_dir.clone(),
            terraform_dir: self.terraform_dir.clone(),
            ssh_key: self.ssh_key.clone(),
            step_timeout_secs: self.timeout,
            rollout_attempts: self.rollout_attempts,
            rollout_interval_secs: self.rollout_interval,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the local environment and credentials
    Setup {
        #[command(subcommand)]
        target: SetupCommand,
    },

    /// Manage the application on the local Kubernetes cluster
    K8s {
        #[command(subcommand)]
        action: K8sCommand,
    },

    /// Manage AWS infrastructure with Terraform
    Infra {
        #[command(subcommand)]
        action: InfraCommand,
    },

    /// Print the resolved configuration
    Config,
}

#[derive(Subcommand, Clone, Copy)]
enum SetupCommand {
    /// Run dev, docker, aws and terraform setup in order
    Full,
    /// Check that all required tools are installed
    Prereq,
    /// Create the Python virtual environment
    Dev,
    /// Build the image and run it locally
    Docker,
    /// Verify AWS credentials and create an SSH key
    Aws,
    /// Initialise and validate Terraform
    Terraform,
    /// Install missing tools with the host package manager
    Bootstrap,
}

#[derive(Subcommand, Clone)]
enum K8sCommand {
    /// Start the cluster and enable metrics
    Setup,
    /// Start the cluster
    Start,
    /// Build, apply manifests and wait for rollout
    Deploy,
    /// Forward the service port to localhost (Ctrl-C to stop)
    Access,
    /// Show deployments, pods, services and autoscalers
    Status,
    /// Follow application logs (Ctrl-C to stop)
    Logs,
    /// Scale the deployment and wait for the new replicas
    Scale {
        /// Replica count (default: configured replicas)
        #[arg(id = "scale_replicas", value_name = "REPLICAS")]
        replicas: Option<u32>,
    },
    /// Roll the deployment to a new image
    Update {
        /// Image reference (default: configured image)
        #[arg(id = "update_image", value_name = "IMAGE")]
        image: Option<String>,
    },
    /// Delete all application resources
    Cleanup,
    /// Setup, deploy and show status
    Full,
}

#[derive(Subcommand, Clone, Copy)]
enum InfraCommand {
    /// Plan, confirm and apply
    Deploy,
    /// Destroy all managed infrastructure
    Destroy,
    /// List managed resources
    Status,
    /// Preview changes
    Plan,
    /// Show outputs
    Output,
}

impl Commands {
    fn workflow(&self) -> Option<Workflow> {
        Some(match self {
            Commands::Setup { target } => Workflow::Setup(match target {
                SetupCommand::Full => SetupTarget::Full,
                SetupCommand::Prereq => SetupTarget::Prereq,
                SetupCommand::Dev => SetupTarget::Dev,
                SetupCommand::Docker => SetupTarget::Docker,
                SetupCommand::Aws => SetupTarget::Aws,
                SetupCommand::Terraform => SetupTarget::Terraform,
                SetupCommand::Bootstrap => SetupTarget::Bootstrap,
            }),
            Commands::K8s { action } => Workflow::K8s(match action {
                K8sCommand::Setup => K8sAction::Setup,
                K8sCommand::Start => K8sAction::Start,
                K8sCommand::Deploy => K8sAction::Deploy,
                K8sCommand::Access => K8sAction::Access,
                K8sCommand::Status => K8sAction::Status,
                K8sCommand::Logs => K8sAction::Logs,
                K8sCommand::Scale { .. } => K8sAction::Scale,
                K8sCommand::Update { .. } => K8sAction::Update,
                K8sCommand::Cleanup => K8sAction::Cleanup,
                K8sCommand::Full => K8sAction::Full,
            }),
            Commands::Infra { action } => Workflow::Infra(match action {
                InfraCommand::Deploy => InfraAction::Deploy,
                InfraCommand::Destroy => InfraAction::Destroy,
                InfraCommand::Status => InfraAction::Status,
                InfraCommand::Plan => InfraAction::Plan,
                InfraCommand::Output => InfraAction::Output,
            }),
            Commands::Config => return None,
        })
    }

    /// Positional overrides become the highest-precedence config values
    fn apply_overrides(&self, layer: &mut PartialConfig) {
        match self {
            Commands::K8s {
                action: K8sCommand::Scale { replicas: Some(n) },
            } => layer.replicas = Some(*n),
            Commands::K8s {
                action: K8sCommand::Update { image: Some(image) },
            } => layer.image = Some(image.clone()),
            _ => {}
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "deploy_orchestrator=debug,deployctl=debug"
    } else {
        "deploy_orchestrator=info,deployctl=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn resolve_config(cli: &Cli, optional: &[&str]) -> anyhow::Result<ResolvedConfig> {
    let mut flags = cli.settings.to_layer();
    cli.command.apply_overrides(&mut flags);

    let mut resolver = ConfigResolver::new().optional(optional.iter().copied());
    let file = match &cli.settings.config {
        Some(path) => Some(path.clone()),
        None => std::env::current_dir()
            .ok()
            .and_then(|dir| ConfigResolver::discover_file(dir)),
    };
    if let Some(path) = file {
        resolver = resolver.file_path(&path)?;
    }

    let config = resolver
        .process_env()
        .flags(flags)
        .resolve()
        .map_err(DeployError::from)?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let Some(workflow) = cli.command.workflow() else {
        let config = resolve_config(&cli, &["image", "region"])?;
        print!("{}", config.to_yaml()?);
        return Ok(true);
    };
    let config = resolve_config(&cli, workflow.unused_settings())?;

    let definition = workflow.build(&config);
    if workflow.is_foreground() && cli.json {
        anyhow::bail!("--json is not supported for {}", workflow);
    }

    let confirm: Arc<dyn Confirm> = if cli.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(TerminalConfirm)
    };
    let engine =
        WorkflowEngine::new(Arc::new(ProcessExecutor::new()), confirm).dry_run(cli.dry_run);

    let report = match engine.execute(&definition, &config).await {
        Ok(report) => report,
        Err(DeployError::PrerequisiteMissing(missing)) => {
            eprintln!("Missing prerequisites:");
            for tool in &missing {
                eprintln!("  ✗ {}", tool);
            }
            eprintln!("Run `deployctl setup bootstrap` to install them.");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match report.into_result() {
        Ok(_) => Ok(true),
        Err(e) => {
            if !cli.json {
                eprintln!("Error: {}", e);
            }
            Ok(false)
        }
    }
}

fn print_report(report: &ExecutionReport) {
    println!();
    println!(
        "Workflow: {}{}",
        report.workflow,
        if report.dry_run { " (dry run)" } else { "" }
    );
    println!("Run ID: {}", report.run_id);

    for result in &report.steps {
        let mark = if !result.succeeded {
            "✗"
        } else if result.skipped {
            "-"
        } else {
            "✓"
        };
        println!(
            "  {} {} ({:.1}s)",
            mark,
            result.step,
            result.duration.as_secs_f64()
        );
        for line in &result.planned {
            println!("      $ {}", line);
        }
        if !result.stdout.is_empty() {
            for line in result.stdout.lines() {
                println!("      {}", line);
            }
        }
    }

    println!(
        "Success: {}",
        if report.success() { "YES" } else { "NO" }
    );
    println!("Duration: {:.1}s", report.total_duration().as_secs_f64());

    if let (Outcome::FailedAt(index), Some(failed)) = (report.outcome, report.failed_step()) {
        println!(
            "Failed at step {} of {}: {} (exit code {})",
            index + 1,
            report.steps.len(),
            failed.step,
            failed.exit_code
        );
        let tail = failed.stderr_tail(STDERR_TAIL_LINES);
        if !tail.is_empty() {
            println!("--- stderr (last {} lines) ---", STDERR_TAIL_LINES);
            println!("{}", tail);
        }
    }
}
