#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use deploy_orchestrator::prelude::*;
use deploy_orchestrator::FailureKind;
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_config(dir: &Path, filename: &str, content: &str) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, content).expect("Failed to write config file");
    path
}

/// Flags every test configuration shares: a fixed image and region, and
/// fast rollout polling
pub fn test_flags() -> PartialConfig {
    PartialConfig {
        image: Some("web:1".into()),
        region: Some("us-east-1".into()),
        rollout_attempts: Some(3),
        rollout_interval_secs: Some(0),
        ..Default::default()
    }
}

pub fn test_config() -> ResolvedConfig {
    config_with(PartialConfig::default())
}

/// Test configuration with `overrides` layered on top of [`test_flags`]
pub fn config_with(overrides: PartialConfig) -> ResolvedConfig {
    ConfigResolver::with_home(Some(PathBuf::from("/home/tester")))
        .flags(test_flags().overlay(overrides))
        .resolve()
        .expect("test config should resolve")
}

enum Rule {
    Fail { pattern: String, exit_code: i32 },
    Respond { pattern: String, outputs: Vec<String> },
}

/// Records every command and answers from a script instead of spawning
/// processes. Commands are matched by substring of their display line;
/// anything unmatched succeeds with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
    served: Mutex<Vec<usize>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_when(mut self, pattern: &str, exit_code: i32) -> Self {
        self.rules.push(Rule::Fail {
            pattern: pattern.to_string(),
            exit_code,
        });
        self
    }

    /// Successive matching calls get successive outputs; the last repeats
    pub fn respond(mut self, pattern: &str, outputs: &[&str]) -> Self {
        self.rules.push(Rule::Respond {
            pattern: pattern.to_string(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }

    fn answer(&self, spec: &CommandSpec) -> StepResult {
        let line = spec.display_line();
        self.calls.lock().unwrap().push(line.clone());

        for (index, rule) in self.rules.iter().enumerate() {
            match rule {
                Rule::Fail { pattern, exit_code } if line.contains(pattern.as_str()) => {
                    return StepResult::failed(
                        line,
                        FailureKind::Exit(*exit_code),
                        format!("scripted failure of {}", pattern),
                    );
                }
                Rule::Respond { pattern, outputs } if line.contains(pattern.as_str()) => {
                    let mut served = self.served.lock().unwrap();
                    let n = served.iter().filter(|&&i| i == index).count();
                    served.push(index);
                    let output = outputs
                        .get(n)
                        .or_else(|| outputs.last())
                        .cloned()
                        .unwrap_or_default();
                    return StepResult::success(line, output);
                }
                _ => {}
            }
        }

        StepResult::success(line, "")
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> StepResult {
        self.answer(spec)
    }

    async fn attach(&self, spec: &CommandSpec) -> StepResult {
        self.answer(spec)
    }
}

/// Gives a fixed answer and remembers every prompt
pub struct ScriptedConfirm {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer
    }
}
