//! Prerequisite checks
//!
//! Probes the external tools a workflow needs before any of its steps run.
//! Checking never mutates the host; installing missing tools is the job of
//! the separate `setup bootstrap` workflow.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::command::{CommandExecutor, CommandSpec};
use crate::engine::error::DeployError;

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").unwrap());

/// An external tool a workflow depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequirement {
    pub name: String,
    pub detect: CommandSpec,
    pub min_version: Option<String>,
}

impl ToolRequirement {
    /// Requirement detected by running `<program> <args...>`
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        Self {
            detect: CommandSpec::new(name.clone()).args(args),
            name,
            min_version: None,
        }
    }

    pub fn min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub present: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum MissingReason {
    Absent,
    Outdated { found: String, required: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTool {
    pub name: String,
    #[serde(flatten)]
    pub reason: MissingReason,
}

impl fmt::Display for MissingTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            MissingReason::Absent => write!(f, "{} (not found)", self.name),
            MissingReason::Outdated { found, required } => {
                write!(f, "{} (found {}, need >= {})", self.name, found, required)
            }
        }
    }
}

/// Outcome of probing a set of tools
#[derive(Debug, Clone, Default, Serialize)]
pub struct PrerequisiteReport {
    pub tools: BTreeMap<String, ToolStatus>,
    pub missing: Vec<MissingTool>,
}

impl PrerequisiteReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn is_present(&self, tool: &str) -> bool {
        self.tools.get(tool).map(|s| s.present).unwrap_or(false)
    }

    /// Fail with every missing tool listed
    pub fn ensure(self) -> Result<Self, DeployError> {
        if self.missing.is_empty() {
            Ok(self)
        } else {
            Err(DeployError::PrerequisiteMissing(self.missing))
        }
    }
}

pub struct PrerequisiteChecker<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> PrerequisiteChecker<'a> {
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Probe one tool
    pub async fn inspect(&self, requirement: &ToolRequirement) -> ToolStatus {
        let result = self.executor.run(&requirement.detect).await;
        if !result.succeeded {
            debug!(
                "{} not available (exit code {})",
                requirement.name, result.exit_code
            );
            return ToolStatus {
                present: false,
                version: None,
            };
        }

        let version = extract_version(&result.stdout).or_else(|| extract_version(&result.stderr));
        ToolStatus {
            present: true,
            version,
        }
    }

    /// Probe every requirement, in order
    pub async fn check(&self, requirements: &[ToolRequirement]) -> PrerequisiteReport {
        let mut report = PrerequisiteReport::default();

        for requirement in requirements {
            if report.tools.contains_key(&requirement.name) {
                continue;
            }
            let status = self.inspect(requirement).await;

            if !status.present {
                warn!("Required tool not found: {}", requirement.name);
                report.missing.push(MissingTool {
                    name: requirement.name.clone(),
                    reason: MissingReason::Absent,
                });
            } else if let (Some(required), Some(found)) =
                (&requirement.min_version, &status.version)
            {
                if compare_versions(found, required) == Ordering::Less {
                    warn!(
                        "{} {} is older than required {}",
                        requirement.name, found, required
                    );
                    report.missing.push(MissingTool {
                        name: requirement.name.clone(),
                        reason: MissingReason::Outdated {
                            found: found.clone(),
                            required: required.clone(),
                        },
                    });
                }
            } else if requirement.min_version.is_some() {
                warn!(
                    "Could not read the {} version; assuming it is recent enough",
                    requirement.name
                );
            } else {
                info!(
                    "Found {} {}",
                    requirement.name,
                    status.version.as_deref().unwrap_or("(unknown version)")
                );
            }

            report.tools.insert(requirement.name.clone(), status);
        }

        report
    }
}

/// First `major.minor[.patch]` in a tool's version banner
pub fn extract_version(output: &str) -> Option<String> {
    VERSION_REGEX.find(output).map(|m| m.as_str().to_string())
}

fn components(version: &str) -> Vec<u64> {
    VERSION_REGEX
        .captures(version)
        .map(|caps| {
            (1..=3)
                .map(|i| {
                    caps.get(i)
                        .and_then(|m| m.as_str().parse().ok())
                        .unwrap_or(0)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Numeric comparison of dotted versions; unparsable sorts lowest
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    components(a).cmp(&components(b))
}
