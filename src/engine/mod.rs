//! Workflow execution engine module
//!
//! This module contains:
//! - `command` - External command execution
//! - `prerequisites` - Tool presence and version checks
//! - `prompt` - Confirmation capability for irreversible steps
//! - `steps` - Step implementations
//! - `executor` - The workflow engine
//! - `error` - Deployment error types
//! - `result` - Step results and execution reports

pub mod command;
pub mod error;
pub mod executor;
pub mod prerequisites;
pub mod prompt;
pub mod result;
pub mod steps;

pub use command::{CommandExecutor, CommandSpec, ProcessExecutor};
pub use error::DeployError;
pub use executor::{RunState, WorkflowEngine};
pub use prerequisites::{
    MissingReason, MissingTool, PrerequisiteChecker, PrerequisiteReport, ToolRequirement,
    ToolStatus,
};
pub use prompt::{AssumeYes, Confirm, TerminalConfirm};
pub use result::{ExecutionReport, FailureKind, Outcome, StepResult};
pub use steps::{StepContext, WorkflowStep};
