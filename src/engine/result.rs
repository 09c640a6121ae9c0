//! Execution result types

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exit code reported when a program could not be started
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code reported when a process was killed or terminated by a signal
pub const TERMINATED_EXIT_CODE: i32 = -1;

/// Why a step did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum FailureKind {
    /// The process ran and exited non-zero
    Exit(i32),
    /// The process (or a bounded poll) did not finish in time
    Timeout(#[serde(with = "duration_secs")] Duration),
    /// The program could not be started at all
    SpawnFailed(String),
    /// The user declined a confirmation prompt
    Cancelled,
}

/// Result of a step execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Set when the step decided there was nothing to do
    #[serde(default)]
    pub skipped: bool,
    /// Commands the step would run (dry-run only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned: Vec<String>,
}

impl StepResult {
    /// A successful result with the given output
    pub fn success(step: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration: Duration::ZERO,
            succeeded: true,
            failure: None,
            skipped: false,
            planned: Vec::new(),
        }
    }

    /// A successful result for a step that had nothing to do
    pub fn skipped(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::success(step, reason)
        }
    }

    /// A failed result; the exit code is derived from the failure kind
    pub fn failed(step: impl Into<String>, failure: FailureKind, stderr: impl Into<String>) -> Self {
        let exit_code = match &failure {
            FailureKind::Exit(code) => *code,
            FailureKind::SpawnFailed(_) => SPAWN_FAILURE_EXIT_CODE,
            FailureKind::Timeout(_) | FailureKind::Cancelled => TERMINATED_EXIT_CODE,
        };
        Self {
            step: step.into(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration: Duration::ZERO,
            succeeded: false,
            failure: Some(failure),
            skipped: false,
            planned: Vec::new(),
        }
    }

    /// A dry-run result listing what would have been executed
    pub fn planned(step: impl Into<String>, planned: Vec<String>) -> Self {
        Self {
            planned,
            ..Self::success(step, String::new())
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Rename the result to the step that owns it
    pub fn named(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    /// Append another command's result onto this one.
    ///
    /// Output is concatenated, durations add up and the exit status of
    /// `next` becomes the status of the combined result.
    pub fn absorb(&mut self, next: StepResult) {
        append_output(&mut self.stdout, &next.stdout);
        append_output(&mut self.stderr, &next.stderr);
        self.duration += next.duration;
        self.exit_code = next.exit_code;
        self.succeeded = next.succeeded;
        self.failure = next.failure;
    }

    /// The last `lines` lines of stderr, for failure summaries
    pub fn stderr_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Timeout(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Cancelled))
    }
}

fn append_output(into: &mut String, more: &str) {
    if more.is_empty() {
        return;
    }
    if !into.is_empty() && !into.ends_with('\n') {
        into.push('\n');
    }
    into.push_str(more);
}

/// Terminal state of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "camelCase")]
pub enum Outcome {
    Succeeded,
    FailedAt(usize),
}

/// Ordered results of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub run_id: String,
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub steps: Vec<StepResult>,
    pub outcome: Outcome,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// The result of the step that ended the run, if it failed
    pub fn failed_step(&self) -> Option<&StepResult> {
        match self.outcome {
            Outcome::FailedAt(index) => self.steps.get(index),
            Outcome::Succeeded => None,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_exit_code_follows_failure_kind() {
        let r = StepResult::failed("build", FailureKind::Exit(2), "boom");
        assert_eq!(r.exit_code, 2);
        assert!(!r.succeeded);

        let r = StepResult::failed("build", FailureKind::SpawnFailed("nope".into()), "");
        assert_eq!(r.exit_code, SPAWN_FAILURE_EXIT_CODE);

        let r = StepResult::failed("wait", FailureKind::Timeout(Duration::from_secs(3)), "");
        assert!(r.is_timeout());
    }

    #[test]
    fn test_absorb_takes_status_of_last_command() {
        let mut combined = StepResult::success("setup", "one").with_duration(Duration::from_secs(1));
        combined.absorb(
            StepResult::failed("x", FailureKind::Exit(1), "bad")
                .with_duration(Duration::from_secs(2)),
        );

        assert_eq!(combined.step, "setup");
        assert!(!combined.succeeded);
        assert_eq!(combined.exit_code, 1);
        assert_eq!(combined.stdout, "one");
        assert_eq!(combined.stderr, "bad");
        assert_eq!(combined.duration, Duration::from_secs(3));
    }

    #[test]
    fn test_stderr_tail() {
        let r = StepResult::failed("s", FailureKind::Exit(1), "a\nb\nc\nd");
        assert_eq!(r.stderr_tail(2), "c\nd");
        assert_eq!(r.stderr_tail(10), "a\nb\nc\nd");
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = ExecutionReport {
            run_id: "r1".into(),
            workflow: "k8s deploy".into(),
            started_at: Utc::now(),
            dry_run: false,
            steps: vec![StepResult::failed("build", FailureKind::Exit(1), "e")],
            outcome: Outcome::FailedAt(0),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["runId"], "r1");
        assert_eq!(json["outcome"]["state"], "failedAt");
        assert_eq!(json["outcome"]["step"], 0);
        assert_eq!(json["steps"][0]["exitCode"], 1);
        assert_eq!(json["steps"][0]["failure"]["kind"], "exit");
    }
}
