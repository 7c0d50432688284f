//! The built-in catalog runs green against a well-behaved module.

use terraprobe_core::types::Platform;
use terraprobe_runner::catalog;

use crate::helpers::harness::TestHarness;
use crate::helpers::mock_client::ClientBehavior;
use crate::helpers::mock_provisioner::ProvisionerBehavior;

#[tokio::test]
async fn test_e2e_gcs_catalog_passes() {
    // Given
    let harness = TestHarness::new();
    let scenarios = catalog::builtin(Platform::Gcs, harness.module_dir(), None);

    // When
    let report = harness.suite(2).run(scenarios).await;

    // Then: every built-in scenario passes and nothing is left behind
    for result in &report.results {
        assert!(
            result.is_passed(),
            "{} failed: {:?}",
            result.scenario,
            result.primary_error
        );
    }
    assert!(report.is_clean());
    assert_eq!(harness.client.seeds(), 1, "force-destroy uploads one object");
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_aks_catalog_passes() {
    let harness = TestHarness::new();
    let scenarios = catalog::builtin(Platform::Aks, harness.module_dir(), Some("rg-terraprobe"));

    let report = harness.suite(1).run(scenarios).await;

    let result = &report.results[0];
    assert!(result.is_passed(), "{:?}", result.primary_error);
    assert_eq!(result.groups.len(), 8, "spec group plus seven named groups");
    let connectivity = result
        .groups
        .iter()
        .find(|g| g.name == "kubernetes-connectivity")
        .unwrap();
    assert!(connectivity.passed, "{:?}", connectivity.failures);
    assert!(result.identifier.as_deref().unwrap().starts_with("tp-aks-"));
    assert!(harness.cloud.live_resources().is_empty());
}

#[tokio::test]
async fn test_e2e_aks_catalog_flags_system_pod_not_running() {
    // Given: kube-proxy never leaves Pending
    let harness = TestHarness::with(
        ProvisionerBehavior::default(),
        ClientBehavior {
            pending_system_pod: Some("kube-proxy"),
            ..ClientBehavior::default()
        },
    );
    let scenarios = catalog::builtin(Platform::Aks, harness.module_dir(), Some("rg-terraprobe"));

    // When
    let report = harness.suite(1).run(scenarios).await;

    // Then: only the connectivity group fails and the cluster is still destroyed
    let result = &report.results[0];
    assert!(!result.is_passed());
    let failed: Vec<&str> = result
        .groups
        .iter()
        .filter(|g| !g.passed)
        .map(|g| g.name.as_str())
        .collect();
    assert_eq!(failed, ["kubernetes-connectivity"]);
    let checks: Vec<&str> = result
        .groups
        .iter()
        .flat_map(|g| &g.failures)
        .map(|f| f.check.as_str())
        .collect();
    assert_eq!(checks, ["cluster:kube-system/pods.running"]);
    assert!(harness.cloud.live_resources().is_empty());
}
