mod common;

use common::*;
use deploy_orchestrator::workflow::tools;
use deploy_orchestrator::{DeployError, MissingReason, PrerequisiteChecker};

#[tokio::test]
async fn test_all_tools_present() {
    let executor = ScriptedExecutor::new()
        .respond("docker --version", &["Docker version 24.0.7, build afdd53b"])
        .respond("terraform version", &["Terraform v1.6.2\non linux_amd64"]);

    let report = PrerequisiteChecker::new(&executor)
        .check(&[tools::docker(), tools::terraform()])
        .await;

    assert!(report.is_satisfied());
    assert!(report.is_present("docker"));
    assert_eq!(report.tools["docker"].version.as_deref(), Some("24.0.7"));
    assert_eq!(report.tools["terraform"].version.as_deref(), Some("1.6.2"));
}

#[tokio::test]
async fn test_failing_version_command_means_absent() {
    let executor = ScriptedExecutor::new().fail_when("kubectl", 1);

    let report = PrerequisiteChecker::new(&executor)
        .check(&[tools::kubectl()])
        .await;

    assert!(!report.is_satisfied());
    assert!(!report.is_present("kubectl"));
    assert_eq!(report.missing[0].name, "kubectl");
    assert_eq!(report.missing[0].reason, MissingReason::Absent);
}

#[tokio::test]
async fn test_old_version_is_reported() {
    let executor = ScriptedExecutor::new().respond("terraform version", &["Terraform v0.14.2"]);

    let report = PrerequisiteChecker::new(&executor)
        .check(&[tools::terraform()])
        .await;

    // Present, but not new enough
    assert!(report.is_present("terraform"));
    assert_eq!(
        report.missing[0].reason,
        MissingReason::Outdated {
            found: "0.14.2".into(),
            required: "1.0.0".into()
        }
    );
    assert_eq!(
        report.missing[0].to_string(),
        "terraform (found 0.14.2, need >= 1.0.0)"
    );
}

#[tokio::test]
async fn test_unreadable_version_is_accepted() {
    let executor = ScriptedExecutor::new().respond("aws --version", &["aws-cli (dev build)"]);

    let report = PrerequisiteChecker::new(&executor)
        .check(&[tools::aws()])
        .await;

    assert!(report.is_satisfied());
    assert_eq!(report.tools["aws"].version, None);
}

#[tokio::test]
async fn test_ensure_lists_every_missing_tool() {
    let executor = ScriptedExecutor::new()
        .fail_when("minikube", 127)
        .fail_when("docker", 127)
        .respond("aws --version", &["aws-cli/1.18.69 Python/3.8"]);

    let err = PrerequisiteChecker::new(&executor)
        .check(&tools::all())
        .await
        .ensure()
        .unwrap_err();

    match err {
        DeployError::PrerequisiteMissing(missing) => {
            let names: Vec<_> = missing.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["docker", "minikube", "aws"]);
        }
        other => panic!("expected PrerequisiteMissing, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_requirements_are_checked_once() {
    let executor = ScriptedExecutor::new();

    PrerequisiteChecker::new(&executor)
        .check(&[tools::kubectl(), tools::kubectl()])
        .await;

    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn test_ssh_keygen_detected_through_ssh() {
    let executor = ScriptedExecutor::new();

    let report = PrerequisiteChecker::new(&executor)
        .check(&[tools::ssh_keygen()])
        .await;

    assert!(report.is_present("ssh-keygen"));
    assert_eq!(executor.calls(), vec!["ssh -V"]);
}
