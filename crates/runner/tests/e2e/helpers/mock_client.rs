//! Mock platform client reading from a [`FakeCloud`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use terraprobe_core::types::{LiveState, ResourceRef};
use terraprobe_verifier::kube::pods_state;
use terraprobe_verifier::{FetchError, Fixture, PlatformClient};

use super::fake_cloud::FakeCloud;

/// Knobs for eventual-consistency and error injection.
#[derive(Debug, Clone, Default)]
pub struct ClientBehavior {
    /// The first N reads of each resource answer `NotFound` even if it exists.
    pub not_found_reads: u32,
    /// Every read fails with a permanent error carrying this reason.
    pub permanent_error: Option<String>,
    /// Every read panics, simulating a bug in an assertion helper.
    pub panic_on_fetch: bool,
    /// System pod reported in phase `Pending` instead of `Running`.
    pub pending_system_pod: Option<&'static str>,
}

/// Pods every healthy AKS cluster runs in `kube-system`.
const SYSTEM_PODS: &[&str] = &[
    "coredns-7d8f9c6b5-x2k9z",
    "kube-proxy-4hq8n",
    "metrics-server-5c7f8d-q7wlp",
];

pub struct MockPlatformClient {
    cloud: Arc<FakeCloud>,
    behavior: ClientBehavior,
    seeds: AtomicUsize,
}

#[allow(dead_code)]
impl MockPlatformClient {
    pub fn new(cloud: Arc<FakeCloud>, behavior: ClientBehavior) -> Self {
        Self {
            cloud,
            behavior,
            seeds: AtomicUsize::new(0),
        }
    }

    pub fn seeds(&self) -> usize {
        self.seeds.load(Ordering::SeqCst)
    }
}

impl PlatformClient for MockPlatformClient {
    async fn fetch(&self, reference: &ResourceRef) -> Result<LiveState, FetchError> {
        let reads = self.cloud.record_read(&reference.name);
        if self.behavior.panic_on_fetch {
            panic!("mock client asked to panic reading {reference}");
        }
        if let Some(reason) = &self.behavior.permanent_error {
            return Err(FetchError::Permanent {
                reason: reason.clone(),
            });
        }
        let not_found = FetchError::NotFound {
            reference: reference.to_string(),
        };
        if reads <= self.behavior.not_found_reads {
            return Err(not_found);
        }
        self.cloud.get(&reference.name).ok_or(not_found)
    }

    async fn seed(&self, reference: &ResourceRef, fixture: &Fixture) -> Result<(), FetchError> {
        if !self.cloud.exists(&reference.name) {
            return Err(FetchError::NotFound {
                reference: reference.to_string(),
            });
        }
        match fixture {
            Fixture::UploadObject { name, .. } => self.cloud.add_object(&reference.name, name),
        }
        self.seeds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn inspect_cluster(
        &self,
        reference: &ResourceRef,
        kubeconfig: &str,
        namespace: &str,
    ) -> Result<LiveState, FetchError> {
        if !self.cloud.exists(&reference.name) {
            return Err(FetchError::Transient {
                reason: "kubectl: Unable to connect to the server".to_owned(),
            });
        }
        if !kubeconfig.contains(&format!("name: {}", reference.name)) {
            return Err(FetchError::Permanent {
                reason: "kubectl: You must be logged in to the server (Unauthorized)".to_owned(),
            });
        }
        let items: Vec<Value> = if namespace == "kube-system" {
            SYSTEM_PODS
                .iter()
                .map(|name| {
                    let pending = self
                        .behavior
                        .pending_system_pod
                        .is_some_and(|prefix| name.starts_with(prefix));
                    let phase = if pending { "Pending" } else { "Running" };
                    json!({ "metadata": { "name": name }, "status": { "phase": phase } })
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(pods_state(reference, namespace, &json!({ "items": items })))
    }
}
