//! Confirmation gate before irreversible steps

use async_trait::async_trait;
use tracing::info;

use super::{StepContext, WorkflowStep};
use crate::engine::result::{FailureKind, StepResult};

#[derive(Debug, Clone)]
pub struct ConfirmStep {
    prompt: String,
}

impl ConfirmStep {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

#[async_trait]
impl WorkflowStep for ConfirmStep {
    fn name(&self) -> &str {
        "confirm"
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn plan(&self, _ctx: &StepContext<'_>) -> Vec<String> {
        vec![format!("ask: {}", self.prompt)]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        if ctx.confirm.confirm(&self.prompt).await {
            StepResult::success(self.name(), "confirmed")
        } else {
            info!("Declined: {}", self.prompt);
            StepResult::failed(self.name(), FailureKind::Cancelled, "cancelled by user")
        }
    }
}
