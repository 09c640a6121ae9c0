//! Deployment error types

use std::time::Duration;

use crate::engine::prerequisites::MissingTool;
use crate::engine::result::{ExecutionReport, FailureKind};
use crate::workflow::config::ConfigError;

/// Errors that end a deployctl invocation
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Missing prerequisites: {}", format_missing(.0))]
    PrerequisiteMissing(Vec<MissingTool>),

    #[error("{0}")]
    ConfigUnresolved(#[from] ConfigError),

    #[error("Step '{step}' failed with exit code {exit_code}")]
    StepFailed {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Step '{step}' timed out after {}s", .after.as_secs())]
    Timeout { step: String, after: Duration },

    #[error("Cancelled by user at step '{step}'")]
    UserCancelled { step: String },

    #[error("Cannot read config file {file}: {error}")]
    ConfigFile {
        file: String,
        error: std::io::Error,
    },

    #[error("Config file parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

fn format_missing(tools: &[MissingTool]) -> String {
    tools
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ExecutionReport {
    /// Convert a failed report into the matching error
    pub fn into_result(self) -> Result<ExecutionReport, DeployError> {
        let Some(failed) = self.failed_step() else {
            return Ok(self);
        };
        let step = failed.step.clone();
        Err(match &failed.failure {
            Some(FailureKind::Timeout(after)) => DeployError::Timeout {
                step,
                after: *after,
            },
            Some(FailureKind::Cancelled) => DeployError::UserCancelled { step },
            _ => DeployError::StepFailed {
                step,
                exit_code: failed.exit_code,
                stderr: failed.stderr.clone(),
            },
        })
    }
}
