//! Suites: bounded parallelism, unique identifiers and isolation.

use std::collections::HashSet;
use std::time::Duration;

use terraprobe_core::types::{FailureKind, Platform};
use terraprobe_runner::Scenario;

use crate::helpers::harness::TestHarness;
use crate::helpers::mock_client::ClientBehavior;
use crate::helpers::mock_provisioner::ProvisionerBehavior;

fn buckets(harness: &TestHarness, count: usize) -> Vec<Scenario> {
    (0..count)
        .map(|i| {
            Scenario::new(format!("bucket-{i}"), Platform::Gcs, harness.module_dir())
                .with_var("storage_class", "STANDARD")
        })
        .collect()
}

fn slow_apply() -> TestHarness {
    TestHarness::with(
        ProvisionerBehavior {
            apply_delay: Some(Duration::from_millis(50)),
            ..ProvisionerBehavior::default()
        },
        ClientBehavior::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_suite_respects_concurrency_limit() {
    // Given: six scenarios and a limit of two
    let harness = slow_apply();
    let scenarios = buckets(&harness, 6);

    // When
    let report = harness.suite(2).run(scenarios).await;

    // Then
    assert_eq!(report.total(), 6);
    assert!(report.is_clean(), "{report:?}");
    let peak = harness.provisioner.max_in_flight();
    assert!((1..=2).contains(&peak), "peak concurrency {peak}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_e2e_concurrent_scenarios_get_unique_identifiers() {
    let harness = slow_apply();
    let scenarios = buckets(&harness, 8);

    let report = harness.suite(8).run(scenarios).await;

    let identifiers: HashSet<String> = report
        .results
        .iter()
        .map(|r| r.identifier.clone().unwrap())
        .collect();
    assert_eq!(identifiers.len(), 8);
    assert_eq!(harness.provisioner.applied().len(), 8);
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_suite_keeps_input_order_and_isolates_failures() {
    // Given: a failing scenario between two passing ones
    let harness = TestHarness::new();
    let scenarios = vec![
        Scenario::new("first", Platform::Gcs, harness.module_dir())
            .with_var("storage_class", "STANDARD"),
        Scenario::new("broken", Platform::Gcs, harness.module_dir())
            .with_var("storage_class", "NOT_A_STORAGE_CLASS"),
        Scenario::new("last", Platform::Gcs, harness.module_dir())
            .with_var("storage_class", "COLDLINE"),
    ];

    // When
    let report = harness.suite(3).run(scenarios).await;

    // Then
    let names: Vec<&str> = report.results.iter().map(|r| r.scenario.as_str()).collect();
    assert_eq!(names, ["first", "broken", "last"]);
    assert_eq!(report.passed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.results[1].kind, Some(FailureKind::ApplyFailed));
    assert!(report.results[0].is_passed());
    assert!(report.results[2].is_passed());
    assert_eq!(report.cleanup_failures, 0);
}
