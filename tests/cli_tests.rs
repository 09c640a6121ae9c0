mod common;

use common::*;
use std::path::Path;
use std::process::{Command, Output};

const DEPLOY_VARS: &[&str] = &[
    "DEPLOY_APP",
    "DEPLOY_IMAGE",
    "DEPLOY_CONTAINER",
    "DEPLOY_PORT",
    "DEPLOY_MIN_REPLICAS",
    "DEPLOY_MAX_REPLICAS",
    "DEPLOY_REPLICAS",
    "DEPLOY_REGION",
    "DEPLOY_NAMESPACE",
    "DEPLOY_MANIFESTS_DIR",
    "DEPLOY_TERRAFORM_DIR",
    "DEPLOY_SSH_KEY",
    "DEPLOY_STEP_TIMEOUT_SECS",
    "DEPLOY_ROLLOUT_ATTEMPTS",
    "DEPLOY_ROLLOUT_INTERVAL_SECS",
];

fn cli_command() -> Command {
    Command::new(env!("CARGO_BIN_EXE_deployctl"))
}

/// Command running in `dir` with a clean configuration environment
fn cli_in(dir: &Path) -> Command {
    let mut cmd = cli_command();
    cmd.current_dir(dir).env("HOME", dir);
    for var in DEPLOY_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_cli_help() {
    let output = cli_command().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Build, deploy and manage"));
    assert!(stdout.contains("setup"));
    assert!(stdout.contains("k8s"));
    assert!(stdout.contains("infra"));
    assert!(stdout.contains("config"));
    assert!(stdout.contains("--dry-run"));
}

#[test]
fn test_cli_version() {
    let output = cli_command().arg("--version").output().unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("deployctl"));
}

#[test]
fn test_cli_k8s_help() {
    let output = cli_command().args(["k8s", "--help"]).output().unwrap();

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("deploy"));
    assert!(stdout.contains("scale"));
    assert!(stdout.contains("cleanup"));
}

#[test]
fn test_cli_unknown_action_is_rejected() {
    let output = cli_command().args(["k8s", "explode"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_dry_run_deploy() {
    let dir = create_test_dir();

    let output = cli_in(dir.path())
        .args(["--dry-run", "--image", "web:1", "k8s", "deploy"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("Workflow: k8s deploy (dry run)"));
    assert!(stdout.contains("$ minikube image build -t web:1 ."));
    assert!(stdout.contains("$ kubectl -n default apply -f k8s"));
    assert!(stdout.contains("Success: YES"));
}

#[test]
fn test_cli_missing_settings_exit_1() {
    let dir = create_test_dir();

    let output = cli_in(dir.path()).args(["infra", "plan"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("image: missing"));
    assert!(stderr.contains("region: missing"));
}

#[test]
fn test_cli_only_asks_for_settings_the_workflow_uses() {
    let dir = create_test_dir();

    let output = cli_in(dir.path()).args(["k8s", "deploy"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("image: missing"));
    assert!(!stderr(&output).contains("region: missing"));

    let output = cli_in(dir.path())
        .args(["--dry-run", "setup", "prereq"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn test_cli_reads_config_file() {
    let dir = create_test_dir();
    write_config(
        dir.path(),
        "deploy.yaml",
        "image: registry.example.com/shop:3\nregion: eu-west-1\nnamespace: staging\n",
    );

    let output = cli_in(dir.path()).arg("config").output().unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("registry.example.com/shop:3"));
    assert!(stdout.contains("eu-west-1"));
    assert!(stdout.contains("staging"));
}

#[test]
fn test_cli_flags_override_env_and_file() {
    let dir = create_test_dir();
    write_config(dir.path(), "deploy.yaml", "namespace: from-file\n");

    let output = cli_in(dir.path())
        .env("DEPLOY_NAMESPACE", "from-env")
        .env("DEPLOY_APP", "from-env-app")
        .args(["config", "--namespace", "from-flag"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let stdout = stdout(&output);
    assert!(stdout.contains("from-flag"));
    assert!(!stdout.contains("from-file"));
    assert!(stdout.contains("from-env-app"));
}

#[test]
fn test_cli_explicit_config_path() {
    let dir = create_test_dir();
    let path = write_config(dir.path(), "prod.yaml", "image: prod:1\n");

    let output = cli_in(dir.path())
        .args(["config", "--config", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("prod:1"));
}

#[test]
fn test_cli_missing_explicit_config_names_the_path() {
    let dir = create_test_dir();

    let output = cli_in(dir.path())
        .args(["config", "--config", "missing-deploy.yaml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr(&output);
    assert!(stderr.contains("Cannot read config file"));
    assert!(stderr.contains("missing-deploy.yaml"));
}

#[test]
fn test_cli_invalid_config_file() {
    let dir = create_test_dir();
    write_config(dir.path(), "deploy.yaml", "imagee: web:1\n");

    let output = cli_in(dir.path()).arg("config").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("parse error"));
}

#[test]
fn test_cli_invalid_env_value() {
    let dir = create_test_dir();

    let output = cli_in(dir.path())
        .env("DEPLOY_PORT", "http")
        .arg("config")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("DEPLOY_PORT"));
}

#[test]
fn test_cli_json_dry_run() {
    let dir = create_test_dir();

    let output = cli_in(dir.path())
        .args(["--dry-run", "--json", "--replicas", "3", "k8s", "scale", "4"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["workflow"], "k8s scale");
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["outcome"]["state"], "succeeded");
    assert_eq!(report["steps"][0]["step"], "scale to 4");
}

#[test]
fn test_cli_scale_outside_bounds() {
    let dir = create_test_dir();

    let output = cli_in(dir.path())
        .args(["--dry-run", "k8s", "scale", "9"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("replicas: 9 is outside 1..=5"));
}

#[test]
fn test_cli_json_rejected_for_foreground_commands() {
    let dir = create_test_dir();

    let output = cli_in(dir.path())
        .args(["--json", "k8s", "logs"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--json is not supported"));
}
