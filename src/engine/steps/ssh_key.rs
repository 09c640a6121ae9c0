//! SSH key generation
//!
//! Not idempotent: `ssh-keygen` would prompt to overwrite an existing key,
//! so the step checks for the key file first and does nothing if present.

use async_trait::async_trait;
use tracing::info;

use super::{StepContext, WorkflowStep};
use crate::engine::command::CommandSpec;
use crate::engine::result::{FailureKind, StepResult};
use crate::workflow::config::ResolvedConfig;

#[derive(Debug, Clone, Default)]
pub struct SshKeyStep;

impl SshKeyStep {
    pub fn new() -> Self {
        Self
    }

    fn keygen_command(config: &ResolvedConfig) -> CommandSpec {
        CommandSpec::new("ssh-keygen").args([
            "-t".to_string(),
            "rsa".to_string(),
            "-b".to_string(),
            "4096".to_string(),
            "-f".to_string(),
            config.ssh_key.display().to_string(),
            "-N".to_string(),
            String::new(),
            "-C".to_string(),
            format!("{}-deploy", config.app),
        ])
    }
}

#[async_trait]
impl WorkflowStep for SshKeyStep {
    fn name(&self) -> &str {
        "generate ssh key"
    }

    fn idempotent(&self) -> bool {
        false
    }

    fn plan(&self, ctx: &StepContext<'_>) -> Vec<String> {
        vec![format!(
            "if [ ! -f {} ]; then {}",
            ctx.config.ssh_key.display(),
            Self::keygen_command(ctx.config)
        )]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        let key = &ctx.config.ssh_key;
        if tokio::fs::try_exists(key).await.unwrap_or(false) {
            info!("SSH key already exists at {}", key.display());
            return StepResult::skipped(
                self.name(),
                format!("{} already exists", key.display()),
            );
        }

        if let Some(parent) = key.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return StepResult::failed(
                    self.name(),
                    FailureKind::SpawnFailed(e.to_string()),
                    format!("cannot create {}: {}", parent.display(), e),
                );
            }
        }

        let command = Self::keygen_command(ctx.config).default_timeout(ctx.config.step_timeout);
        info!("[{}] {}", self.name(), command);
        ctx.executor.run(&command).await.named(self.name())
    }
}
