//! Failure handling: duplicate registration and error propagation from
//! node and filesystem collaborators.

use regtest_pipeline::core::OperationStatus;
use regtest_pipeline::orchestration::FailurePolicy;
use regtest_pipeline::{Error, Verb};

use crate::fixtures::{populate_data_dir, Harness};

#[test]
fn test_duplicate_suffix_rejected() {
    let mut harness = Harness::new();
    harness.register("node-a", "A");

    let dir_b = harness.data_dir("node-b");
    let result = harness.registrar.register_all(&mut harness.graph, dir_b, "A");

    assert!(matches!(result, Err(Error::DuplicateInstance { .. })));
    assert_eq!(harness.graph.len(), 3);
}

#[test]
fn test_duplicate_default_suffix_rejected() {
    let mut harness = Harness::new();
    harness.register("node-a", "");

    let dir_b = harness.data_dir("node-b");
    let err = harness
        .registrar
        .register_all(&mut harness.graph, dir_b, "")
        .unwrap_err();
    assert!(err.to_string().contains("start"));
}

#[test]
fn test_distinct_suffixes_accepted() {
    let mut harness = Harness::new();
    for (i, suffix) in ["", "A", "B", "Alice"].iter().enumerate() {
        let ops = harness.register(&format!("node-{}", i), suffix);
        assert_eq!(ops.name(Verb::Stop), format!("stop{}", suffix));
    }
    assert_eq!(harness.graph.len(), 12);
}

/// Test: failed stop blocks clean
/// Given a node whose stop fails
/// When clean is requested
/// Then the stop error is reported intact and the data dir is kept
#[tokio::test]
async fn test_failed_stop_keeps_data_dir() {
    let mut harness = Harness::new();
    let dir = harness.data_dir("node-a");
    populate_data_dir(&dir);
    harness.register("node-a", "");
    harness.node.leave_running(&dir);
    harness.node.fail_stop_with("rpc connection refused");

    let report = harness
        .scheduler(4, FailurePolicy::Continue)
        .run(&["clean"])
        .await
        .unwrap();

    assert_eq!(report.failed(), vec!["stop"]);
    assert!(matches!(
        report.status("clean"),
        Some(OperationStatus::Skipped { .. })
    ));
    assert!(dir.join("regtest/.cookie").exists());

    let err = report.into_result().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("stop"));
    assert!(message.contains("Failed to stop node: rpc connection refused"));
}

/// Test: failed stop carried into a later run
/// Given stop failed in an earlier run of the same scheduler
/// When clean is requested in the next run
/// Then clean is skipped and the run still fails with the stop error
#[tokio::test]
async fn test_failed_stop_from_earlier_run_fails_clean_run() {
    let mut harness = Harness::new();
    let dir = harness.data_dir("node-a");
    populate_data_dir(&dir);
    harness.register("node-a", "");
    harness.node.leave_running(&dir);
    harness.node.fail_stop_with("rpc refused");

    let mut scheduler = harness.scheduler(1, FailurePolicy::FailFast);
    let first = scheduler.run(&["stop"]).await.unwrap();
    assert_eq!(first.failed(), vec!["stop"]);

    let report = scheduler.run(&["clean"]).await.unwrap();
    assert!(matches!(
        report.status("stop"),
        Some(OperationStatus::Failed { .. })
    ));
    assert!(matches!(
        report.status("clean"),
        Some(OperationStatus::Skipped { .. })
    ));
    assert!(dir.exists());

    let err = report.into_result().unwrap_err();
    assert!(err.to_string().contains("Failed to stop node: rpc refused"));
}

/// Test: failed start of one instance does not affect another under Continue
#[tokio::test]
async fn test_start_failure_isolated_with_continue() {
    let mut harness = Harness::new();
    harness.register("node-a", "A");
    harness.register("node-b", "B");
    let dir_b = harness.data_dir("node-b");
    populate_data_dir(&dir_b);
    harness.node.fail_start_with("no bitcoind on PATH");

    let report = harness
        .scheduler(1, FailurePolicy::Continue)
        .run(&["startA", "stopB", "cleanB"])
        .await
        .unwrap();

    assert_eq!(report.failed(), vec!["startA"]);
    assert_eq!(report.status("stopB"), Some(&OperationStatus::Completed));
    assert_eq!(report.status("cleanB"), Some(&OperationStatus::Completed));
    assert!(!dir_b.exists());
}

/// Test: fail-fast aborts the remaining work
#[tokio::test]
async fn test_fail_fast_aborts_remaining() {
    let mut harness = Harness::new();
    harness.register("node-a", "A");
    harness.register("node-b", "B");
    harness.node.fail_start_with("no bitcoind on PATH");

    let report = harness
        .scheduler(1, FailurePolicy::FailFast)
        .run(&["startA", "startB"])
        .await
        .unwrap();

    assert_eq!(report.failed(), vec!["startA"]);
    assert!(matches!(
        report.status("startB"),
        Some(OperationStatus::Skipped { .. })
    ));
    assert!(matches!(
        report.into_result(),
        Err(Error::OperationFailed { ref name, .. }) if name == "startA"
    ));
}

/// Test: cleanup failure surfaces the io error
#[cfg(unix)]
#[tokio::test]
async fn test_clean_permission_error_surfaces() {
    use std::os::unix::fs::PermissionsExt;

    // Root ignores directory permissions, so the failure cannot be provoked
    if std::process::Command::new("id")
        .arg("-u")
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
        .unwrap_or(true)
    {
        return;
    }

    let mut harness = Harness::new();
    let parent = harness.data_dir("locked");
    let dir = parent.join("node-a");
    populate_data_dir(&dir);
    harness
        .registrar
        .register_all(&mut harness.graph, &dir, "")
        .unwrap();

    std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o555)).unwrap();
    let report = harness
        .scheduler(1, FailurePolicy::FailFast)
        .run(&["clean"])
        .await
        .unwrap();
    std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o755)).unwrap();

    let err = report.into_result().unwrap_err();
    match err {
        Error::OperationFailed { name, source } => {
            assert_eq!(name, "clean");
            assert!(matches!(*source, Error::Cleanup { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(dir.exists());
}
