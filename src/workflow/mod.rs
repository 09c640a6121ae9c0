//! Workflow types and definitions
//!
//! This module contains everything that describes what to run:
//! - `config` - Layered configuration resolution
//! - `definition` - WorkflowDefinition (name, tools, ordered steps)
//! - `catalog` - The workflows behind each CLI subcommand
//! - `tools` - Tool detection commands and install recipes

pub mod catalog;
pub mod config;
pub mod definition;
pub mod tools;

pub use catalog::{InfraAction, K8sAction, SetupTarget, Workflow};
pub use config::{
    ConfigError, ConfigResolver, FieldProblem, PartialConfig, ProblemKind, ReplicaBounds,
    ResolvedConfig,
};
pub use definition::WorkflowDefinition;
pub use tools::PackageManager;
