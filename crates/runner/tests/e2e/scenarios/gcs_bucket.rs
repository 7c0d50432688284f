//! GCS bucket lifecycle: apply, live verification and confirmed teardown.

use std::collections::BTreeMap;

use terraprobe_core::types::{
    CleanupReport, FailureKind, Platform, ScenarioPhase, SpecValue, Verdict,
};
use terraprobe_runner::{AssertionGroup, Check, SPEC_GROUP, Scenario};
use terraprobe_verifier::Matcher;

use crate::helpers::harness::TestHarness;
use crate::helpers::mock_client::ClientBehavior;
use crate::helpers::mock_provisioner::ProvisionerBehavior;

fn versioning(enabled: bool) -> SpecValue {
    SpecValue::Map(BTreeMap::from([(
        "enabled".to_owned(),
        SpecValue::from(enabled),
    )]))
}

fn bucket(harness: &TestHarness, name: &str) -> Scenario {
    Scenario::new(name, Platform::Gcs, harness.module_dir())
        .with_var("location", "US")
        .with_var("storage_class", "STANDARD")
        .with_var("versioning", versioning(false))
        .with_var(
            "labels",
            SpecValue::Map(BTreeMap::from([(
                "environment".to_owned(),
                SpecValue::from("testing"),
            )])),
        )
}

#[tokio::test]
async fn test_e2e_basic_bucket_passes_and_is_gone_after_destroy() {
    // Given: a basic bucket scenario with output checks and absence confirmation
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "basic")
        .with_group(AssertionGroup::new(
            "outputs",
            vec![
                Check::output("bucket_name", Matcher::Equals("${id}".to_owned())),
                Check::output("bucket_url", Matcher::Equals("gs://${id}".to_owned())),
            ],
        ))
        .verify_destroyed(true);

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: every phase ran in order and the bucket no longer exists
    assert_eq!(result.verdict, Verdict::Passed, "{:?}", result.primary_error);
    assert_eq!(
        result.phases,
        vec![
            ScenarioPhase::Pending,
            ScenarioPhase::Applying,
            ScenarioPhase::Verifying,
            ScenarioPhase::Destroying,
            ScenarioPhase::Passed,
        ]
    );
    let groups: Vec<&str> = result.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(groups, [SPEC_GROUP, "outputs"]);
    assert!(result.groups.iter().all(|g| g.passed));
    assert_eq!(
        result.cleanup,
        CleanupReport::Destroyed {
            absence_confirmed: Some(true)
        }
    );

    let identifier = result.identifier.unwrap();
    assert!(identifier.starts_with("tp-gcs-"));
    assert!(!harness.cloud.exists(&identifier));
    assert_eq!(harness.provisioner.destroyed(), vec![identifier]);
}

#[tokio::test]
async fn test_e2e_versioning_enabled_is_observed_live() {
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "versioning")
        .with_var("location", "US-WEST1")
        .with_var("storage_class", "NEARLINE")
        .with_var("versioning", versioning(true))
        .with_group(AssertionGroup::new(
            "versioning",
            vec![Check::live("versioning", Matcher::Equals("true".to_owned()))],
        ));

    let result = harness.runner().run(&scenario).await;

    assert!(result.is_passed(), "{:?}", result.primary_error);
    assert_eq!(result.groups.len(), 2);
}

#[tokio::test]
async fn test_e2e_versioning_disabled_fails_a_versioning_check() {
    // Given: the module disables versioning but a group insists on it
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "versioning-expected").with_group(AssertionGroup::new(
        "versioning",
        vec![Check::live("versioning", Matcher::Equals("true".to_owned()))],
    ));

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: the spec group passes, the named group reports the mismatch
    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.failed_phase, Some(ScenarioPhase::Verifying));
    assert_eq!(result.kind, Some(FailureKind::VerifyMismatch));

    let spec_group = result.groups.iter().find(|g| g.name == SPEC_GROUP).unwrap();
    assert!(spec_group.passed);

    let mismatches = result.mismatches();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].field, "versioning");
    assert_eq!(mismatches[0].expected, "true");
    assert_eq!(mismatches[0].actual.as_deref(), Some("false"));

    // destroy still ran
    assert_eq!(result.phases.last(), Some(&ScenarioPhase::Failed));
    assert!(result.phases.contains(&ScenarioPhase::Destroying));
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_location_comparison_ignores_case() {
    // Given: lowercase location in the module, uppercase in the live bucket
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "lowercase-location").with_var("location", "us-west1");

    let result = harness.runner().run(&scenario).await;

    assert!(result.is_passed(), "{:?}", result.primary_error);
}

#[tokio::test]
async fn test_e2e_not_found_once_then_found_passes() {
    // Given: the first read after apply hits an eventually consistent 404
    let harness = TestHarness::with(
        ProvisionerBehavior::default(),
        ClientBehavior {
            not_found_reads: 1,
            ..ClientBehavior::default()
        },
    );
    let scenario = bucket(&harness, "eventual");

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: the verifier retried instead of failing
    assert!(result.is_passed(), "{:?}", result.primary_error);
    let identifier = result.identifier.unwrap();
    assert!(harness.cloud.reads(&identifier) >= 2);
}

#[tokio::test]
async fn test_e2e_permanent_fetch_error_fails_without_mismatch() {
    let harness = TestHarness::with(
        ProvisionerBehavior::default(),
        ClientBehavior {
            permanent_error: Some("HTTP 403 for gcs: PERMISSION_DENIED".to_owned()),
            ..ClientBehavior::default()
        },
    );
    let scenario = bucket(&harness, "forbidden");

    let result = harness.runner().run(&scenario).await;

    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.kind, Some(FailureKind::VerifyTransient));
    assert!(result.mismatches().is_empty());
    assert!(result.primary_error.unwrap().contains("PERMISSION_DENIED"));
    // a permanent error is not retried
    let identifier = result.identifier.unwrap();
    assert_eq!(harness.cloud.reads(&identifier), 1);
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_force_destroy_removes_bucket_with_objects() {
    // Given: an object is uploaded after verification
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "force-destroy")
        .with_var("force_destroy", true)
        .with_fixture(terraprobe_verifier::Fixture::UploadObject {
            name: "leftover.txt".to_owned(),
            content: "x".to_owned(),
            content_type: "text/plain".to_owned(),
        })
        .verify_destroyed(true);

    // When
    let result = harness.runner().run(&scenario).await;

    // Then
    assert!(result.is_passed(), "{:?}", result.primary_error);
    assert_eq!(harness.client.seeds(), 1);
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_bucket_with_objects_and_no_force_destroy_leaks() {
    // Given: the same fixture without force_destroy
    let harness = TestHarness::new();
    let scenario = bucket(&harness, "no-force-destroy").with_fixture(
        terraprobe_verifier::Fixture::UploadObject {
            name: "leftover.txt".to_owned(),
            content: "x".to_owned(),
            content_type: "text/plain".to_owned(),
        },
    );

    // When
    let result = harness.runner().run(&scenario).await;

    // Then: verification passed but destroy failed and is reported separately
    assert_eq!(result.verdict, Verdict::Passed);
    match &result.cleanup {
        CleanupReport::DestroyFailed { reason, workdir } => {
            assert!(reason.contains("not empty"), "{reason}");
            assert!(workdir.is_some());
        }
        other => panic!("expected DestroyFailed, got {other:?}"),
    }
    assert_eq!(harness.cloud.live_resources().len(), 1);
}
