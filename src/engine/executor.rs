//! Workflow Engine - Runs workflow definitions step by step
//!
//! This is the main engine that:
//! 1. Checks the workflow's tool prerequisites
//! 2. Executes steps strictly in declared order
//! 3. Stops at the first failing step (no retries, no partial completion)
//! 4. Produces an execution report for the CLI
//!
//! In dry-run mode each step only describes what it would execute and the
//! command executor is never called.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument};

use crate::engine::command::CommandExecutor;
use crate::engine::error::DeployError;
use crate::engine::prerequisites::{PrerequisiteChecker, PrerequisiteReport};
use crate::engine::prompt::Confirm;
use crate::engine::result::{ExecutionReport, Outcome, StepResult};
use crate::engine::steps::StepContext;
use crate::workflow::config::ResolvedConfig;
use crate::workflow::definition::WorkflowDefinition;

/// Progress of a single workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running(usize),
    Succeeded,
    Failed(usize),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed(_))
    }

    fn start(self, step_count: usize) -> RunState {
        match self {
            RunState::Pending if step_count == 0 => RunState::Succeeded,
            RunState::Pending => RunState::Running(0),
            other => other,
        }
    }

    /// Next state after the current step produced `result`
    fn advance(self, result: &StepResult, step_count: usize) -> RunState {
        match self {
            RunState::Running(i) if !result.succeeded => RunState::Failed(i),
            RunState::Running(i) if i + 1 < step_count => RunState::Running(i + 1),
            RunState::Running(_) => RunState::Succeeded,
            other => other,
        }
    }
}

pub struct WorkflowEngine {
    executor: Arc<dyn CommandExecutor>,
    confirm: Arc<dyn Confirm>,
    dry_run: bool,
}

impl WorkflowEngine {
    pub fn new(executor: Arc<dyn CommandExecutor>, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            executor,
            confirm,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Check the workflow's prerequisites, then run it.
    ///
    /// Under dry-run the prerequisite checks are skipped too, since they
    /// spawn processes.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        config: &ResolvedConfig,
    ) -> Result<ExecutionReport, DeployError> {
        if self.dry_run {
            for tool in &workflow.requires {
                info!("[dry-run] would check {}: {}", tool.name, tool.detect);
            }
        } else {
            self.check_prerequisites(workflow).await?;
        }
        Ok(self.run(workflow, config).await)
    }

    /// Probe the workflow's required tools; fails listing every missing one
    pub async fn check_prerequisites(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<PrerequisiteReport, DeployError> {
        PrerequisiteChecker::new(self.executor.as_ref())
            .check(&workflow.requires)
            .await
            .ensure()
    }

    /// Run every step in order, stopping at the first failure
    #[instrument(skip(self, workflow, config), fields(workflow = %workflow.name, run_id = tracing::field::Empty))]
    pub async fn run(&self, workflow: &WorkflowDefinition, config: &ResolvedConfig) -> ExecutionReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());

        let started_at = Utc::now();
        let ctx = StepContext {
            config,
            executor: self.executor.as_ref(),
            confirm: self.confirm.as_ref(),
        };

        info!(
            "Starting workflow: {} ({} steps{})",
            workflow.name,
            workflow.steps.len(),
            if self.dry_run { ", dry run" } else { "" }
        );

        let mut results = Vec::with_capacity(workflow.steps.len());
        let mut state = RunState::Pending.start(workflow.steps.len());

        while let RunState::Running(index) = state {
            let step = &workflow.steps[index];
            debug!(
                "Step {}/{}: {} (idempotent: {})",
                index + 1,
                workflow.steps.len(),
                step.name(),
                step.idempotent()
            );

            let result = if self.dry_run {
                let plan = step.plan(&ctx);
                for line in &plan {
                    info!("[dry-run] {}: {}", step.name(), line);
                }
                StepResult::planned(step.name(), plan)
            } else {
                info!("Running step: {}", step.name());
                step.run(&ctx).await.named(step.name())
            };

            if result.succeeded {
                info!(
                    "Step '{}' completed in {:.1}s{}",
                    result.step,
                    result.duration.as_secs_f64(),
                    if result.skipped { " (nothing to do)" } else { "" }
                );
            } else {
                error!(
                    "Step '{}' failed with exit code {}",
                    result.step, result.exit_code
                );
            }

            state = state.advance(&result, workflow.steps.len());
            results.push(result);
        }

        let outcome = match state {
            RunState::Failed(index) => Outcome::FailedAt(index),
            _ => Outcome::Succeeded,
        };
        info!("Workflow {} finished: {:?}", workflow.name, outcome);

        ExecutionReport {
            run_id,
            workflow: workflow.name.clone(),
            started_at,
            dry_run: self.dry_run,
            steps: results,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::result::FailureKind;

    #[test]
    fn test_run_state_transitions() {
        let ok = StepResult::success("a", "");
        let bad = StepResult::failed("a", FailureKind::Exit(1), "");

        assert_eq!(RunState::Pending.start(3), RunState::Running(0));
        assert_eq!(RunState::Pending.start(0), RunState::Succeeded);
        assert_eq!(RunState::Running(0).advance(&ok, 3), RunState::Running(1));
        assert_eq!(RunState::Running(2).advance(&ok, 3), RunState::Succeeded);
        assert_eq!(RunState::Running(1).advance(&bad, 3), RunState::Failed(1));
        assert_eq!(RunState::Succeeded.advance(&bad, 3), RunState::Succeeded);
        assert!(RunState::Failed(0).is_terminal());
        assert!(!RunState::Pending.is_terminal());
        assert!(!RunState::Running(0).is_terminal());
    }
}
