//! Rollout wait
//!
//! Polls the deployment's status until the controller has observed the
//! latest spec, every replica runs the new template, no old replicas are
//! left and enough of them are available. A status read that fails (for
//! example while the API server is still starting) counts as an
//! unsuccessful attempt rather than a step failure.

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{StepContext, WorkflowStep};
use crate::engine::command::CommandSpec;
use crate::engine::result::{FailureKind, StepResult};
use crate::workflow::config::ResolvedConfig;

/// Status fields read from the deployment, in output order
const STATUS_JSONPATH: &str = "jsonpath={.metadata.generation},{.status.observedGeneration},\
{.spec.replicas},{.status.replicas},{.status.updatedReplicas},{.status.availableReplicas}";

#[derive(Debug, Clone)]
pub struct RolloutWaitStep {
    name: String,
    target: Option<u32>,
}

impl Default for RolloutWaitStep {
    fn default() -> Self {
        Self::new()
    }
}

impl RolloutWaitStep {
    /// Wait for the replica count declared by the deployment
    pub fn new() -> Self {
        Self {
            name: "wait for rollout".to_string(),
            target: None,
        }
    }

    /// Also require at least this many available replicas
    pub fn target(mut self, replicas: u32) -> Self {
        self.target = Some(replicas);
        self
    }

    /// The command used to read the deployment's rollout status
    pub fn status_command(config: &ResolvedConfig) -> CommandSpec {
        CommandSpec::new("kubectl").args([
            "get".to_string(),
            "deployment".to_string(),
            config.app.clone(),
            "-n".to_string(),
            config.namespace.clone(),
            "-o".to_string(),
            STATUS_JSONPATH.to_string(),
        ])
    }
}

/// Snapshot of a deployment's rollout progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RolloutStatus {
    generation: u64,
    observed_generation: u64,
    desired: u32,
    replicas: u32,
    updated: u32,
    available: u32,
}

impl RolloutStatus {
    /// Parse the comma-separated jsonpath output. Fields the API server
    /// has not populated yet are empty and read as zero.
    pub(crate) fn parse(stdout: &str) -> Option<Self> {
        let trimmed = stdout.trim().trim_matches('\'');
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() > 6 {
            return None;
        }

        let mut values = [0u64; 6];
        for (slot, field) in values.iter_mut().zip(&fields) {
            if !field.is_empty() {
                *slot = field.parse().ok()?;
            }
        }

        let count = |v: u64| u32::try_from(v).ok();
        Some(Self {
            generation: values[0],
            observed_generation: values[1],
            desired: count(values[2])?,
            replicas: count(values[3])?,
            updated: count(values[4])?,
            available: count(values[5])?,
        })
    }

    /// Why the rollout is not complete yet, or `None` once it is
    pub(crate) fn pending(&self, target: Option<u32>) -> Option<Pending> {
        if self.observed_generation < self.generation {
            return Some(Pending::NotObserved);
        }
        if self.updated < self.desired {
            return Some(Pending::Updating {
                updated: self.updated,
                desired: self.desired,
            });
        }
        if self.replicas > self.updated {
            return Some(Pending::OldReplicas(self.replicas - self.updated));
        }
        let wanted = target.unwrap_or(self.desired).max(self.desired);
        if self.available < wanted {
            return Some(Pending::Unavailable {
                available: self.available,
                wanted,
            });
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    NotObserved,
    Updating { updated: u32, desired: u32 },
    OldReplicas(u32),
    Unavailable { available: u32, wanted: u32 },
}

impl fmt::Display for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pending::NotObserved => write!(f, "latest spec not yet observed"),
            Pending::Updating { updated, desired } => {
                write!(f, "{}/{} replicas updated", updated, desired)
            }
            Pending::OldReplicas(n) => write!(f, "{} old replicas pending termination", n),
            Pending::Unavailable { available, wanted } => {
                write!(f, "{}/{} replicas available", available, wanted)
            }
        }
    }
}

#[async_trait]
impl WorkflowStep for RolloutWaitStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn idempotent(&self) -> bool {
        true
    }

    fn plan(&self, ctx: &StepContext<'_>) -> Vec<String> {
        let config = ctx.config;
        let target = match self.target {
            Some(n) => format!("{} replicas", n),
            None => "declared replicas".to_string(),
        };
        vec![format!(
            "poll up to {}x every {}s until rolled out with {} available: {}",
            config.rollout_attempts,
            config.rollout_interval.as_secs(),
            target,
            Self::status_command(config)
        )]
    }

    async fn run(&self, ctx: &StepContext<'_>) -> StepResult {
        let config = ctx.config;
        let command = Self::status_command(config).default_timeout(config.step_timeout);
        let started = Instant::now();
        let mut last = "status not read".to_string();

        info!("Waiting for deployment/{} to roll out", config.app);

        for attempt in 1..=config.rollout_attempts {
            let result = ctx.executor.run(&command).await;
            if !result.succeeded {
                warn!(
                    "Attempt {}/{}: status read exited with code {}",
                    attempt, config.rollout_attempts, result.exit_code
                );
                last = format!("status read exited with code {}", result.exit_code);
            } else if let Some(status) = RolloutStatus::parse(&result.stdout) {
                match status.pending(self.target) {
                    None => {
                        return StepResult::success(
                            self.name.clone(),
                            format!(
                                "deployment/{} rolled out: {}/{} available",
                                config.app, status.available, status.desired
                            ),
                        )
                        .with_duration(started.elapsed());
                    }
                    Some(reason) => {
                        debug!("Attempt {}/{}: {}", attempt, config.rollout_attempts, reason);
                        last = reason.to_string();
                    }
                }
            } else {
                warn!("Unexpected rollout status output: {:?}", result.stdout);
            }

            if attempt < config.rollout_attempts && !config.rollout_interval.is_zero() {
                tokio::time::sleep(config.rollout_interval).await;
            }
        }

        let window = config.rollout_interval * config.rollout_attempts;
        StepResult::failed(
            self.name.clone(),
            FailureKind::Timeout(window),
            format!(
                "deployment/{} not rolled out after {} attempts: {}",
                config.app, config.rollout_attempts, last
            ),
        )
        .with_duration(started.elapsed())
    }
}
