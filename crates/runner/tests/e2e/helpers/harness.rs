//! Wires a [`ScenarioRunner`] to the mocks with short, test-friendly timings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use terraprobe_core::naming::IdentifierGenerator;
use terraprobe_core::retry::RetryPolicy;
use terraprobe_lifecycle::{DriverSettings, LifecycleDriver};
use terraprobe_runner::{ScenarioRunner, Suite};
use terraprobe_verifier::StateVerifier;

use super::fake_cloud::FakeCloud;
use super::mock_client::{ClientBehavior, MockPlatformClient};
use super::mock_provisioner::{MockProvisioner, ProvisionerBehavior};

pub type TestRunner = ScenarioRunner<MockProvisioner, MockPlatformClient>;

/// Retry policy used for both the driver and the verifier.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::fixed(4, Duration::from_millis(10))
}

/// Everything one test needs: the fake cloud, both mocks and scratch directories.
pub struct TestHarness {
    pub cloud: Arc<FakeCloud>,
    pub provisioner: Arc<MockProvisioner>,
    pub client: Arc<MockPlatformClient>,
    module_dir: TempDir,
    work_root: TempDir,
    scenario_deadline: Option<Duration>,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn new() -> Self {
        Self::with(ProvisionerBehavior::default(), ClientBehavior::default())
    }

    pub fn with(provisioner: ProvisionerBehavior, client: ClientBehavior) -> Self {
        let cloud = Arc::new(FakeCloud::new());
        let module_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            module_dir.path().join("main.tf"),
            "variable \"bucket_name\" {}\n",
        )
        .unwrap();

        Self {
            provisioner: Arc::new(MockProvisioner::new(Arc::clone(&cloud), provisioner)),
            client: Arc::new(MockPlatformClient::new(Arc::clone(&cloud), client)),
            cloud,
            module_dir,
            work_root: tempfile::tempdir().unwrap(),
            scenario_deadline: None,
        }
    }

    pub fn with_scenario_deadline(mut self, deadline: Duration) -> Self {
        self.scenario_deadline = Some(deadline);
        self
    }

    pub fn module_dir(&self) -> &Path {
        self.module_dir.path()
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root.path().to_path_buf()
    }

    pub fn runner(&self) -> TestRunner {
        let settings = DriverSettings {
            apply_timeout: Duration::from_secs(30),
            destroy_timeout: Duration::from_secs(30),
            retry: fast_retry(),
            keep_workdirs: false,
            work_root: Some(self.work_root()),
            env: Vec::new(),
            interrupt_grace: Duration::from_secs(5),
        };
        let driver = LifecycleDriver::new(Arc::clone(&self.provisioner), settings);
        let verifier =
            StateVerifier::new(Arc::clone(&self.client), fast_retry(), Duration::from_secs(5));
        let runner = ScenarioRunner::new(driver, verifier, Arc::new(IdentifierGenerator::new()));
        match self.scenario_deadline {
            Some(deadline) => runner.with_scenario_deadline(deadline),
            None => runner,
        }
    }

    pub fn suite(&self, max_concurrent: usize) -> Suite<MockProvisioner, MockPlatformClient> {
        Suite::new(Arc::new(self.runner()), max_concurrent)
    }
}
