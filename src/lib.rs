//! # Deploy Orchestrator
//!
//! A single command-runner for the deployment chores of a small web
//! application: building and running its container, deploying it to a
//! local Kubernetes cluster, and managing its AWS infrastructure with
//! Terraform.
//!
//! ## Features
//!
//! - **Ordered, fail-fast workflows** - Steps run one at a time and the first failure stops the run
//! - **Layered configuration** - Defaults, `deploy.yaml`, `DEPLOY_*` variables and flags
//! - **Prerequisite checks** - Required tools are checked before anything runs
//! - **Dry run** - Print every command without executing any of them
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deploy_orchestrator::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigResolver::new()
//!         .file_path("deploy.yaml")?
//!         .process_env()
//!         .resolve()?;
//!
//!     let workflow = Workflow::K8s(K8sAction::Deploy).build(&config);
//!     let engine = WorkflowEngine::new(Arc::new(ProcessExecutor::new()), Arc::new(TerminalConfirm));
//!     let report = engine.execute(&workflow, &config).await?;
//!
//!     println!("Workflow completed: success={}", report.success());
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod workflow;

// Re-export main types
pub use engine::{
    AssumeYes, CommandExecutor, CommandSpec, Confirm, DeployError, ExecutionReport, FailureKind,
    MissingReason, MissingTool, Outcome, PrerequisiteChecker, PrerequisiteReport, ProcessExecutor,
    RunState, StepContext, StepResult, TerminalConfirm, ToolRequirement, ToolStatus,
    WorkflowEngine, WorkflowStep,
};
pub use workflow::{
    ConfigError, ConfigResolver, FieldProblem, InfraAction, K8sAction, PackageManager,
    PartialConfig, ProblemKind, ReplicaBounds, ResolvedConfig, SetupTarget, Workflow,
    WorkflowDefinition,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{
        AssumeYes, CommandExecutor, CommandSpec, Confirm, DeployError, ExecutionReport,
        Outcome, ProcessExecutor, StepResult, TerminalConfirm, WorkflowEngine,
    };
    pub use crate::workflow::{
        ConfigResolver, InfraAction, K8sAction, PartialConfig, ResolvedConfig, SetupTarget,
        Workflow, WorkflowDefinition,
    };
}
