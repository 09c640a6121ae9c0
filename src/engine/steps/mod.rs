//! Workflow step implementations
//!
//! Each submodule contains one kind of step:
//! - `command` - Run one or more external commands in order
//! - `rollout` - Poll a deployment until its rollout completes
//! - `scale` - Scale a deployment and wait for it
//! - `confirm` - Ask the user before an irreversible step
//! - `ssh_key` - Generate an SSH key pair unless one exists
//! - `foreground` - Long-lived attached commands (logs, port-forward)
//! - `check` - Report the status of required tools
//! - `bootstrap` - Install missing tools

use async_trait::async_trait;

use crate::engine::command::CommandExecutor;
use crate::engine::prompt::Confirm;
use crate::engine::result::StepResult;
use crate::workflow::config::ResolvedConfig;

pub mod bootstrap;
pub mod check;
pub mod command;
pub mod confirm;
pub mod foreground;
pub mod rollout;
pub mod scale;
pub mod ssh_key;

pub use bootstrap::BootstrapStep;
pub use check::CheckToolsStep;
pub use command::CommandStep;
pub use confirm::ConfirmStep;
pub use foreground::ForegroundStep;
pub use rollout::RolloutWaitStep;
pub use scale::ScaleStep;
pub use ssh_key::SshKeyStep;

/// Everything a step may use while running
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub config: &'a ResolvedConfig,
    pub executor: &'a dyn CommandExecutor,
    pub confirm: &'a dyn Confirm,
}

/// A named unit of work in a workflow
#[async_trait]
pub trait WorkflowStep: Send + Sync {
    fn name(&self) -> &str;

    /// Whether running the step twice leaves the system as running it once
    fn idempotent(&self) -> bool;

    /// Human-readable description of what `run` would execute
    fn plan(&self, ctx: &StepContext<'_>) -> Vec<String>;

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult;
}
