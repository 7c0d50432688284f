//! Failures before verification: invalid specs and rejected applies.

use terraprobe_core::types::{CleanupReport, FailureKind, Platform, ScenarioPhase, Verdict};
use terraprobe_runner::{Expect, Scenario};

use crate::helpers::harness::TestHarness;

fn invalid_storage_class(harness: &TestHarness) -> Scenario {
    Scenario::new("invalid-storage-class", Platform::Gcs, harness.module_dir())
        .with_var("location", "US")
        .with_var("storage_class", "NOT_A_STORAGE_CLASS")
}

#[tokio::test]
async fn test_e2e_expected_apply_failure_passes_and_still_destroys() {
    // Given: a scenario that expects the provider to reject the storage class
    let harness = TestHarness::new();
    let scenario = invalid_storage_class(&harness)
        .expecting(Expect::ApplyFails)
        .verify_spec(false);

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: passed, the rejection is recorded, destroy was attempted anyway
    assert_eq!(result.verdict, Verdict::Passed);
    assert_eq!(result.kind, Some(FailureKind::ApplyFailed));
    assert_eq!(result.failed_phase, Some(ScenarioPhase::Applying));
    assert!(!result.verification_ran());
    assert!(result.mismatches().is_empty());

    let identifier = result.identifier.unwrap();
    assert_eq!(harness.provisioner.destroyed(), vec![identifier]);
    assert_eq!(
        result.cleanup,
        CleanupReport::Destroyed {
            absence_confirmed: None
        }
    );
}

#[tokio::test]
async fn test_e2e_unexpected_apply_failure_fails_with_apply_failed() {
    let harness = TestHarness::new();
    let scenario = invalid_storage_class(&harness);

    let result = harness.runner().run(&scenario).await;

    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.kind, Some(FailureKind::ApplyFailed));
    assert!(result.mismatches().is_empty());
    assert!(result.primary_error.unwrap().contains("NOT_A_STORAGE_CLASS"));
    assert_eq!(
        result.phases,
        vec![
            ScenarioPhase::Pending,
            ScenarioPhase::Applying,
            ScenarioPhase::Destroying,
            ScenarioPhase::Failed,
        ]
    );
    assert_eq!(harness.provisioner.destroyed().len(), 1);
}

#[tokio::test]
async fn test_e2e_apply_success_when_failure_expected_is_a_mismatch() {
    let harness = TestHarness::new();
    let scenario = Scenario::new("should-have-failed", Platform::Gcs, harness.module_dir())
        .with_var("storage_class", "STANDARD")
        .expecting(Expect::ApplyFails);

    let result = harness.runner().run(&scenario).await;

    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.kind, Some(FailureKind::VerifyMismatch));
    assert!(result.primary_error.unwrap().contains("apply"));
    // the bucket that should never have existed is cleaned up
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_missing_module_dir_never_applies() {
    // Given: a module directory that does not exist
    let harness = TestHarness::new();
    let scenario = Scenario::new(
        "missing-module",
        Platform::Gcs,
        harness.module_dir().join("does-not-exist"),
    );

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: failed in Pending, nothing to destroy
    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.kind, Some(FailureKind::SpecInvalid));
    assert_eq!(result.failed_phase, Some(ScenarioPhase::Pending));
    assert_eq!(result.cleanup, CleanupReport::NotRequired);
    assert!(harness.provisioner.applied().is_empty());
    assert!(harness.provisioner.destroyed().is_empty());
    assert_eq!(
        result.phases,
        vec![
            ScenarioPhase::Pending,
            ScenarioPhase::Destroying,
            ScenarioPhase::Failed,
        ]
    );
}

#[tokio::test]
async fn test_e2e_unresolved_template_is_spec_invalid() {
    let harness = TestHarness::new();
    let scenario = Scenario::new("bad-template", Platform::Gcs, harness.module_dir())
        .with_var("labels_owner", "${var.owner}");

    let result = harness.runner().run(&scenario).await;

    assert_eq!(result.kind, Some(FailureKind::SpecInvalid));
    assert!(result.primary_error.unwrap().contains("owner"));
    assert!(harness.provisioner.applied().is_empty());
}

#[tokio::test]
async fn test_e2e_aks_without_resource_group_is_spec_invalid() {
    let harness = TestHarness::new();
    let scenario = Scenario::new("cluster", Platform::Aks, harness.module_dir())
        .with_var("location", "eastus");

    let result = harness.runner().run(&scenario).await;

    assert_eq!(result.kind, Some(FailureKind::SpecInvalid));
    assert_eq!(result.cleanup, CleanupReport::NotRequired);
}
