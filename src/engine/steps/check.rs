//! Tool check step
//!
//! Runs the prerequisite checker as a visible workflow step and reports
//! every tool's status in the step output.

use std::time::Instant;

use async_trait::async_trait;

use super::{StepContext, WorkflowStep};
use crate::engine::prerequisites::{PrerequisiteChecker, PrerequisiteReport, ToolRequirement};
use crate::engine::result::{FailureKind, StepResult};

#[derive(Debug, Clone)]
pub struct CheckToolsStep {
    tools: Vec<ToolRequirement>,
}

impl CheckToolsStep {
    pub fn new(tools: Vec<ToolRequirement>) -> Self {
        Self { tools }
    }
}

pub(crate) fn summarize(report: &PrerequisiteReport) -> String {
    report
        .tools
        .iter()
        .map(|(name, status)| match (status.present, &status.version) {
            (true, Some(version)) => format!("✓ {} {}", name, version),
            (true, None) => format!("✓ {}", name),
            (false, _) => format!("✗ {}", name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl WorkflowStep for CheckToolsStep {
    fn name(&self) -> &str {
        "check tools"
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn plan(&self, _ctx: &StepContext<'_>) -> Vec<String> {
        self.tools.iter().map(|t| t.detect.to_string()).collect()
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        let started = Instant::now();
        let report = PrerequisiteChecker::new(ctx.executor)
            .check(&self.tools)
            .await;
        let summary = summarize(&report);

        if report.is_satisfied() {
            StepResult::success(self.name(), summary).with_duration(started.elapsed())
        } else {
            let missing = report
                .missing
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join("\n");
            StepResult::failed(self.name(), FailureKind::Exit(1), missing)
                .with_stdout(summary)
                .with_duration(started.elapsed())
        }
    }
}
