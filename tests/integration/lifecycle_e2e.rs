//! End-to-end lifecycle scenarios.
//!
//! Register one or two instances, execute start → stop → clean through
//! the scheduler, and check the node and the data directories afterwards.

use std::collections::HashSet;

use regtest_pipeline::core::OperationStatus;
use regtest_pipeline::orchestration::FailurePolicy;
use regtest_pipeline::{NodeProcess, Verb};

use crate::fixtures::{populate_data_dir, Harness};

/// Test: default instance
/// Given dataDir=<tmp>/node-a and an empty suffix
/// When start, stop and clean run in order
/// Then the operations are named start/stop/clean, no node runs and the dir is gone
#[tokio::test]
async fn test_default_instance_full_lifecycle() {
    let mut harness = Harness::new();
    let data_dir = harness.data_dir("node-a");
    populate_data_dir(&data_dir);

    let ops = harness.register("node-a", "");
    assert_eq!(harness.graph.names(), vec!["start", "stop", "clean"]);
    assert_eq!(ops.name(Verb::Start), "start");

    let node = harness.node.clone();
    let mut scheduler = harness.scheduler(1, FailurePolicy::FailFast);

    let report = scheduler.run(&["start"]).await.unwrap();
    assert!(report.is_success());
    assert!(node.is_running_at(&data_dir));

    let report = scheduler.run(&["stop"]).await.unwrap();
    assert!(report.is_success());
    assert!(!node.is_running_at(&data_dir));

    let report = scheduler.run(&["clean"]).await.unwrap();
    // stop already ran in this pipeline run, so only clean executes
    assert_eq!(report.executed(), vec!["clean"]);
    assert_eq!(report.status("stop"), Some(&OperationStatus::UpToDate));

    assert!(!data_dir.exists());
    assert_eq!(node.running_count(), 0);
    assert!(node.lookup(&data_dir).is_none());
}

/// Test: single invocation
/// Given a registered default instance
/// When all three operations are requested at once
/// Then they execute in registration order with clean last
#[tokio::test]
async fn test_default_instance_single_run() {
    let mut harness = Harness::new();
    let data_dir = harness.data_dir("node-a");
    populate_data_dir(&data_dir);
    harness.register("node-a", "");

    let node = harness.node.clone();
    let mut scheduler = harness.scheduler(1, FailurePolicy::FailFast);
    let report = scheduler
        .run(&["start", "stop", "clean"])
        .await
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(report.executed(), vec!["start", "stop", "clean"]);
    assert_eq!(node.spawn_count(), 1);
    assert_eq!(node.kill_count(), 1);
    assert!(!data_dir.exists());
}

/// Test: clean pulls in stop
/// Given a running node
/// When only clean is requested
/// Then stop runs first because clean depends on it
#[tokio::test]
async fn test_clean_alone_stops_node_first() {
    let mut harness = Harness::new();
    let data_dir = harness.data_dir("node-a");
    populate_data_dir(&data_dir);
    harness.register("node-a", "");
    harness.node.leave_running(&data_dir);

    let node = harness.node.clone();
    let mut scheduler = harness.scheduler(4, FailurePolicy::FailFast);
    let report = scheduler.run(&["clean"]).await.unwrap();

    assert_eq!(report.executed(), vec!["stop", "clean"]);
    assert!(!node.is_running_at(&data_dir));
    assert!(!data_dir.exists());
}

/// Test: two instances
/// Given instances A and B registered in the same run
/// Then six distinct operation names exist
/// And the lifecycles can be driven independently
#[tokio::test]
async fn test_two_instances_are_independent() {
    let mut harness = Harness::new();
    let dir_a = harness.data_dir("node-a");
    let dir_b = harness.data_dir("node-b");
    populate_data_dir(&dir_a);
    populate_data_dir(&dir_b);

    harness.register("node-a", "A");
    harness.register("node-b", "B");

    let names: HashSet<&str> = harness.graph.names().into_iter().collect();
    let expected: HashSet<&str> = ["startA", "stopA", "cleanA", "startB", "stopB", "cleanB"]
        .into_iter()
        .collect();
    assert_eq!(names, expected);
    assert!(harness.graph.has_dependency("stopA", "cleanA"));
    assert!(harness.graph.has_dependency("stopB", "cleanB"));
    assert!(!harness.graph.has_dependency("stopA", "cleanB"));
    assert!(!harness.graph.has_dependency("stopB", "cleanA"));

    let node = harness.node.clone();
    let mut scheduler = harness.scheduler(4, FailurePolicy::FailFast);

    scheduler.run(&["startA", "startB"]).await.unwrap();
    assert_eq!(node.running_count(), 2);

    // Tearing down A leaves B untouched
    let report = scheduler.run(&["cleanA"]).await.unwrap();
    assert_eq!(report.executed(), vec!["stopA", "cleanA"]);
    assert!(!dir_a.exists());
    assert!(dir_b.join("regtest/blocks/blk00000.dat").exists());
    assert!(node.is_running_at(&dir_b));
    assert!(!node.is_running_at(&dir_a));

    let report = scheduler.run(&["cleanB"]).await.unwrap();
    assert!(report.is_success());
    assert!(!dir_b.exists());
    assert_eq!(node.running_count(), 0);
}

/// Test: labelled names
/// Given a registrar with label "Bitcoind"
/// Then names follow verb + label + suffix
#[tokio::test]
async fn test_labelled_instance_names() {
    let mut harness = Harness::new();
    harness.registrar = regtest_pipeline::LifecycleRegistrar::new(harness.node.clone())
        .with_label("Bitcoind");
    harness.register("node-a", "Regtest");

    assert_eq!(
        harness.graph.names(),
        vec!["startBitcoindRegtest", "stopBitcoindRegtest", "cleanBitcoindRegtest"]
    );
    assert_eq!(
        harness.graph.dependencies_of("cleanBitcoindRegtest"),
        vec!["stopBitcoindRegtest"]
    );
}
