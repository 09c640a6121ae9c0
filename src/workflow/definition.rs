//! Workflow definitions
//!
//! A workflow is a name, the tools it needs and an ordered list of steps.
//! Definitions are built once at startup and never change while running.

use std::fmt;

use crate::engine::prerequisites::ToolRequirement;
use crate::engine::steps::WorkflowStep;

pub struct WorkflowDefinition {
    pub name: String,
    pub description: String,
    pub requires: Vec<ToolRequirement>,
    pub steps: Vec<Box<dyn WorkflowStep>>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            requires: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a tool requirement; duplicates are ignored
    pub fn require(mut self, tool: ToolRequirement) -> Self {
        if !self.requires.iter().any(|t| t.name == tool.name) {
            self.requires.push(tool);
        }
        self
    }

    pub fn step(mut self, step: impl WorkflowStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Append another workflow's requirements and steps
    pub fn extend(mut self, other: WorkflowDefinition) -> Self {
        for tool in other.requires {
            self = self.require(tool);
        }
        self.steps.extend(other.steps);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("name", &self.name)
            .field("requires", &self.requires.iter().map(|t| &t.name).collect::<Vec<_>>())
            .field("steps", &self.step_names())
            .finish()
    }
}
