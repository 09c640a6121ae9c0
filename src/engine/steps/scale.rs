//! Scale a deployment, then wait for the new replica count

use async_trait::async_trait;
use tracing::info;

use super::{RolloutWaitStep, StepContext, WorkflowStep};
use crate::engine::command::CommandSpec;
use crate::engine::result::StepResult;
use crate::workflow::config::ResolvedConfig;

#[derive(Debug, Clone)]
pub struct ScaleStep {
    name: String,
    replicas: u32,
    wait: RolloutWaitStep,
}

impl ScaleStep {
    pub fn new(replicas: u32) -> Self {
        Self {
            name: format!("scale to {}", replicas),
            replicas,
            wait: RolloutWaitStep::new().target(replicas),
        }
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    fn scale_command(&self, config: &ResolvedConfig) -> CommandSpec {
        CommandSpec::new("kubectl").args([
            "scale".to_string(),
            format!("deployment/{}", config.app),
            format!("--replicas={}", self.replicas),
            "-n".to_string(),
            config.namespace.clone(),
        ])
    }
}

#[async_trait]
impl WorkflowStep for ScaleStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn plan(&self, ctx: &StepContext<'_>) -> Vec<String> {
        let mut plan = vec![self.scale_command(ctx.config).to_string()];
        plan.extend(self.wait.plan(ctx));
        plan
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        let command = self
            .scale_command(ctx.config)
            .default_timeout(ctx.config.step_timeout);
        info!("[{}] {}", self.name, command);

        let mut combined = ctx.executor.run(&command).await.named(self.name.clone());
        if !combined.succeeded {
            return combined;
        }
        combined.absorb(self.wait.run(ctx).await);
        combined
    }
}
