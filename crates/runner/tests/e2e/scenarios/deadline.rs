//! Scenario deadline: a hung apply is cut off and still cleaned up.

use std::time::Duration;

use terraprobe_core::types::{CleanupReport, FailureKind, Platform, ScenarioPhase, Verdict};
use terraprobe_runner::Scenario;

use crate::helpers::harness::TestHarness;
use crate::helpers::mock_client::ClientBehavior;
use crate::helpers::mock_provisioner::ProvisionerBehavior;

#[tokio::test]
async fn test_e2e_deadline_during_apply_times_out_and_destroys() {
    // Given: apply takes far longer than the scenario deadline
    let harness = TestHarness::with(
        ProvisionerBehavior {
            apply_delay: Some(Duration::from_secs(30)),
            ..ProvisionerBehavior::default()
        },
        ClientBehavior::default(),
    )
    .with_scenario_deadline(Duration::from_millis(200));
    let scenario = Scenario::new("slow-apply", Platform::Gcs, harness.module_dir())
        .with_var("storage_class", "STANDARD");

    // When
    let started = std::time::Instant::now();
    let result = harness.runner().run(&scenario).await;

    // Then: the run ended near the deadline, as a timeout in Applying
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.kind, Some(FailureKind::Timeout));
    assert_eq!(result.failed_phase, Some(ScenarioPhase::Applying));
    assert!(result.primary_error.unwrap().contains("timed out"));

    // and destroy ran for the half-applied workdir
    assert_eq!(harness.provisioner.destroyed().len(), 1);
    assert_eq!(
        result.cleanup,
        CleanupReport::Destroyed {
            absence_confirmed: None
        }
    );
    assert_eq!(
        result.phases,
        vec![
            ScenarioPhase::Pending,
            ScenarioPhase::Applying,
            ScenarioPhase::Destroying,
            ScenarioPhase::Failed,
        ]
    );
}
