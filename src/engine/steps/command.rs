//! Command steps
//!
//! Runs a fixed list of external commands in order. The first failing
//! command ends the step and its result is returned unchanged.
//!
//! A command may carry a guard: the command only runs when the guard
//! exits 0 (for example, remove a container only if it exists). A failing
//! guard skips its command; it is not a step failure.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{StepContext, WorkflowStep};
use crate::engine::command::CommandSpec;
use crate::engine::result::StepResult;

#[derive(Debug, Clone)]
struct Invocation {
    command: CommandSpec,
    only_if: Option<CommandSpec>,
}

#[derive(Debug, Clone)]
pub struct CommandStep {
    name: String,
    idempotent: bool,
    invocations: Vec<Invocation>,
}

impl CommandStep {
    /// A step that is safe to re-run
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            idempotent: true,
            invocations: Vec::new(),
        }
    }

    pub fn not_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    pub fn command(mut self, command: CommandSpec) -> Self {
        self.invocations.push(Invocation {
            command,
            only_if: None,
        });
        self
    }

    /// Run `command` only when `guard` exits 0
    pub fn command_if(mut self, guard: CommandSpec, command: CommandSpec) -> Self {
        self.invocations.push(Invocation {
            command,
            only_if: Some(guard),
        });
        self
    }

    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.invocations.iter().map(|i| &i.command)
    }
}

#[async_trait]
impl WorkflowStep for CommandStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn idempotent(&self) -> bool {
        self.idempotent
    }

    fn plan(&self, _ctx: &StepContext<'_>) -> Vec<String> {
        self.invocations
            .iter()
            .map(|i| match &i.only_if {
                Some(guard) => format!("if {}; then {}", guard, i.command),
                None => i.command.to_string(),
            })
            .collect()
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        let timeout = ctx.config.step_timeout;
        let mut combined = StepResult::success(self.name.clone(), "");
        let mut ran = 0;

        for invocation in &self.invocations {
            if let Some(guard) = &invocation.only_if {
                let guard = guard.clone().default_timeout(timeout);
                let check = ctx.executor.run(&guard).await;
                combined.duration += check.duration;
                if !check.succeeded {
                    debug!("Skipping '{}': guard '{}' did not pass", invocation.command, guard);
                    continue;
                }
            }

            let command = invocation.command.clone().default_timeout(timeout);
            info!("[{}] {}", self.name, command);
            let result = ctx.executor.run(&command).await;
            ran += 1;
            let succeeded = result.succeeded;
            combined.absorb(result);
            if !succeeded {
                return combined;
            }
        }

        if ran == 0 && !self.invocations.is_empty() {
            combined.skipped = true;
        }
        combined
    }
}
