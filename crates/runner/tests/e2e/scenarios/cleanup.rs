//! Guaranteed teardown: destroy failures, lingering resources and faults.

use terraprobe_core::types::{CleanupReport, FailureKind, Platform, ScenarioPhase, Verdict};
use terraprobe_runner::{AssertionGroup, Check, Scenario};
use terraprobe_verifier::Matcher;

use crate::helpers::harness::TestHarness;
use crate::helpers::mock_client::ClientBehavior;
use crate::helpers::mock_provisioner::ProvisionerBehavior;

fn bucket(harness: &TestHarness, name: &str) -> Scenario {
    Scenario::new(name, Platform::Gcs, harness.module_dir())
        .with_var("location", "US")
        .with_var("storage_class", "STANDARD")
}

#[tokio::test]
async fn test_e2e_destroy_failure_is_reported_without_changing_verdict() {
    // Given: destroy always fails
    let harness = TestHarness::with(
        ProvisionerBehavior {
            destroy_error: Some("Error: deleting bucket: context deadline exceeded".to_owned()),
            ..ProvisionerBehavior::default()
        },
        ClientBehavior::default(),
    );
    let scenario = bucket(&harness, "destroy-fails");

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: verification passed, the leak is reported with the kept workdir
    assert_eq!(result.verdict, Verdict::Passed);
    match &result.cleanup {
        CleanupReport::DestroyFailed { reason, workdir } => {
            assert!(reason.contains("context deadline exceeded"), "{reason}");
            let workdir = workdir.as_deref().unwrap();
            assert!(std::path::Path::new(workdir).exists(), "workdir kept for manual cleanup");
        }
        other => panic!("expected DestroyFailed, got {other:?}"),
    }
    assert_eq!(harness.provisioner.destroyed().len(), 1);
    assert_eq!(harness.cloud.live_resources().len(), 1);
}

#[tokio::test]
async fn test_e2e_resource_still_reachable_after_destroy_fails_scenario() {
    // Given: destroy returns success but the bucket is still readable
    let harness = TestHarness::with(
        ProvisionerBehavior {
            leave_resource_on_destroy: true,
            ..ProvisionerBehavior::default()
        },
        ClientBehavior::default(),
    );
    let scenario = bucket(&harness, "lingering").verify_destroyed(true);

    // When
    let result = harness.runner().run(&scenario).await;

    // Then
    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.failed_phase, Some(ScenarioPhase::Destroying));
    assert_eq!(result.kind, Some(FailureKind::VerifyMismatch));
    assert_eq!(
        result.cleanup,
        CleanupReport::Destroyed {
            absence_confirmed: Some(false)
        }
    );
}

#[tokio::test]
async fn test_e2e_verification_failure_still_destroys_exactly_once() {
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "mismatch").with_group(AssertionGroup::new(
        "wrong-class",
        vec![Check::live(
            "storage_class",
            Matcher::Equals("ARCHIVE".to_owned()),
        )],
    ));

    let result = harness.runner().run(&scenario).await;

    assert_eq!(result.verdict, Verdict::Failed);
    let identifier = result.identifier.unwrap();
    assert_eq!(harness.provisioner.destroyed(), vec![identifier]);
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_panicking_assertion_group_is_a_fault_and_destroy_runs() {
    // Given: every live read panics inside the assertion group task
    let harness = TestHarness::with(
        ProvisionerBehavior::default(),
        ClientBehavior {
            panic_on_fetch: true,
            ..ClientBehavior::default()
        },
    );
    let scenario = bucket(&harness, "panicking");

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: the panic stays inside the group and cleanup still happens
    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.kind, Some(FailureKind::Fault));
    assert!(result.primary_error.unwrap().contains("panicked"));
    assert_eq!(harness.provisioner.destroyed().len(), 1);
    assert!(harness.cloud.live_resources().is_empty());
}
