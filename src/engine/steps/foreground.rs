//! Foreground commands
//!
//! Log following and port forwarding run attached to the terminal until
//! the user stops them. They are only ever the single step of their own
//! workflow.

use async_trait::async_trait;

use super::{StepContext, WorkflowStep};
use crate::engine::command::CommandSpec;
use crate::engine::result::StepResult;

#[derive(Debug, Clone)]
pub struct ForegroundStep {
    name: String,
    command: CommandSpec,
}

impl ForegroundStep {
    pub fn new(name: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

#[async_trait]
impl WorkflowStep for ForegroundStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn plan(&self, _ctx: &StepContext<'_>) -> Vec<String> {
        vec![format!("{} (until interrupted)", self.command)]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        ctx.executor.attach(&self.command).await.named(self.name.clone())
    }
}
