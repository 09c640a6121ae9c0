//! External command execution
//!
//! Every external tool (`docker`, `kubectl`, `minikube`, `terraform`,
//! `aws`) is invoked through the [`CommandExecutor`] trait. The production
//! implementation, [`ProcessExecutor`], spawns real processes with tokio;
//! tests inject stubs.
//!
//! Host differences (program lookup, process-group termination) live here
//! and nowhere else.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::engine::result::{FailureKind, StepResult, TERMINATED_EXIT_CODE};

/// A single external command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply a timeout only if none was set explicitly
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.get_or_insert(timeout);
        self
    }

    /// Shell-like rendering used in logs and dry-run output
    pub fn display_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dir) = &self.working_dir {
            write!(f, "(cd {}) ", quote(&dir.display().to_string()))?;
        }
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, quote(value))?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+{}[]".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Runs external commands and reports how they ended
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run to completion (or timeout), capturing stdout and stderr.
    ///
    /// Never fails: problems are encoded in the returned result.
    async fn run(&self, spec: &CommandSpec) -> StepResult;

    /// Run a long-lived command attached to the terminal until it exits or
    /// the user interrupts it.
    async fn attach(&self, spec: &CommandSpec) -> StepResult;
}

/// Spawns real processes on the host
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, spec: &CommandSpec) -> Result<Command, StepResult> {
        let program = which::which(&spec.program).map_err(|e| {
            StepResult::failed(
                spec.display_line(),
                FailureKind::SpawnFailed(e.to_string()),
                format!("{}: command not found", spec.program),
            )
        })?;

        let mut cmd = Command::new(program);
        cmd.args(&spec.args);
        cmd.envs(&spec.env);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        Ok(cmd)
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, spec: &CommandSpec) -> StepResult {
        let label = spec.display_line();
        debug!("Executing: {}", label);

        let mut cmd = match self.build(spec) {
            Ok(cmd) => cmd,
            Err(result) => return result,
        };
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let started = Instant::now();
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return StepResult::failed(
                    label,
                    FailureKind::SpawnFailed(e.to_string()),
                    format!("failed to start {}: {}", spec.program, e),
                )
            }
        };
        let pid = child.id();

        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(output) => output,
                Err(_) => {
                    warn!("Command timed out after {:?}: {}", limit, label);
                    // The child itself is killed when the future drops it;
                    // its process group may still hold descendants.
                    if let Some(pid) = pid {
                        terminate_tree(pid).await;
                    }
                    return StepResult::failed(
                        label,
                        FailureKind::Timeout(limit),
                        format!("timed out after {}s", limit.as_secs()),
                    )
                    .with_duration(started.elapsed());
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return StepResult::failed(
                    label,
                    FailureKind::SpawnFailed(e.to_string()),
                    e.to_string(),
                )
                .with_duration(started.elapsed())
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let elapsed = started.elapsed();

        if output.status.success() {
            StepResult::success(label, stdout).with_duration(elapsed)
        } else {
            let code = output.status.code().unwrap_or(TERMINATED_EXIT_CODE);
            debug!("Command exited with code {}", code);
            StepResult::failed(label, FailureKind::Exit(code), stderr)
                .with_stdout(stdout)
                .with_duration(elapsed)
        }
    }

    async fn attach(&self, spec: &CommandSpec) -> StepResult {
        let label = spec.display_line();
        info!("Attaching to: {} (Ctrl-C to stop)", label);

        let mut cmd = match self.build(spec) {
            Ok(cmd) => cmd,
            Err(result) => return result,
        };
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return StepResult::failed(
                    label,
                    FailureKind::SpawnFailed(e.to_string()),
                    format!("failed to start {}: {}", spec.program, e),
                )
            }
        };

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if status.success() => {
                    StepResult::success(label, "").with_duration(started.elapsed())
                }
                Ok(status) => {
                    let code = status.code().unwrap_or(TERMINATED_EXIT_CODE);
                    StepResult::failed(label, FailureKind::Exit(code), "")
                        .with_duration(started.elapsed())
                }
                Err(e) => StepResult::failed(label, FailureKind::SpawnFailed(e.to_string()), e.to_string()),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping {}", spec.program);
                stop(&mut child).await;
                StepResult::success(label, "stopped by user").with_duration(started.elapsed())
            }
        }
    }
}

async fn stop(child: &mut Child) {
    if let Some(pid) = child.id() {
        terminate_tree(pid).await;
    }
    let _ = child.kill().await;
}

/// Time descendants get to exit after SIGTERM before they are killed
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_millis(100);

/// Terminate a process and everything it spawned
#[cfg(unix)]
async fn terminate_tree(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // The child leads its own process group, so the negative pid targets
    // all of its descendants as well.
    let group = Pid::from_raw(-(pid as i32));
    match kill(group, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return,
        Err(e) => warn!("Failed to signal process group {}: {}", pid, e),
    }

    tokio::time::sleep(TERMINATE_GRACE).await;

    match kill(group, Signal::SIGKILL) {
        Ok(()) => debug!("Killed remaining processes in group {}", pid),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

#[cfg(windows)]
async fn terminate_tree(pid: u32) {
    let status = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = status {
        warn!("Failed to terminate process tree {}: {}", pid, e);
    }
}
