//! Tool installation
//!
//! Probes every tool first and installs only the absent ones with the
//! host's package manager, so the step can be re-run safely.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{StepContext, WorkflowStep};
use crate::engine::prerequisites::{PrerequisiteChecker, ToolRequirement};
use crate::engine::result::{FailureKind, StepResult};
use crate::workflow::tools::PackageManager;

#[derive(Debug, Clone)]
pub struct BootstrapStep {
    tools: Vec<ToolRequirement>,
    package_manager: Option<PackageManager>,
}

impl BootstrapStep {
    pub fn new(tools: Vec<ToolRequirement>, package_manager: Option<PackageManager>) -> Self {
        Self {
            tools,
            package_manager,
        }
    }
}

#[async_trait]
impl WorkflowStep for BootstrapStep {
    fn name(&self) -> &str {
        "install missing tools"
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn plan(&self, _ctx: &StepContext<'_>) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| {
                let install = self
                    .package_manager
                    .and_then(|pm| pm.install_command(&tool.name))
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "manual install required".to_string());
                format!("if ! {}; then {}", tool.detect, install)
            })
            .collect()
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        let checker = PrerequisiteChecker::new(ctx.executor);
        let mut combined = StepResult::success(self.name(), "");
        let mut installed = 0;

        for tool in &self.tools {
            if checker.inspect(tool).await.present {
                continue;
            }

            let Some(pm) = self.package_manager else {
                return StepResult::failed(
                    self.name(),
                    FailureKind::Exit(1),
                    format!("{} is missing and no supported package manager was found", tool.name),
                );
            };
            let Some(command) = pm.install_command(&tool.name) else {
                warn!("No {} recipe for {}", pm, tool.name);
                return StepResult::failed(
                    self.name(),
                    FailureKind::Exit(1),
                    format!("{} must be installed manually on this host", tool.name),
                );
            };

            let command = command.default_timeout(ctx.config.step_timeout);
            info!("Installing {}: {}", tool.name, command);
            let result = ctx.executor.run(&command).await;
            installed += 1;
            let succeeded = result.succeeded;
            combined.absorb(result);
            if !succeeded {
                return combined;
            }
        }

        if installed == 0 {
            return StepResult::skipped(self.name(), "all tools already installed");
        }
        combined
    }
}
