//! Mock provisioner for E2E scenario tests.
//!
//! Reads the variables file the driver wrote into the workdir and creates or
//! deletes the matching resource in a [`FakeCloud`], the way Terraform would
//! against the real provider.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use terraprobe_core::types::{LiveState, Outputs, Platform, ResourceRef};
use terraprobe_lifecycle::{Invocation, ProvisionError, Provisioner, VARS_FILE_NAME};

use super::fake_cloud::FakeCloud;

/// Storage classes the fake GCS provider accepts.
const STORAGE_CLASSES: &[&str] = &[
    "STANDARD",
    "NEARLINE",
    "COLDLINE",
    "ARCHIVE",
    "MULTI_REGIONAL",
    "REGIONAL",
];

/// Knobs for failure injection.
#[derive(Debug, Clone, Default)]
pub struct ProvisionerBehavior {
    /// Sleep inside `apply` before creating the resource.
    pub apply_delay: Option<Duration>,
    /// Every `destroy` fails with this stderr.
    pub destroy_error: Option<String>,
    /// `destroy` reports success but the resource stays in the cloud.
    pub leave_resource_on_destroy: bool,
}

/// A provisioner that records every call and applies into a [`FakeCloud`].
pub struct MockProvisioner {
    cloud: Arc<FakeCloud>,
    behavior: ProvisionerBehavior,
    applied: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter even when apply is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
impl MockProvisioner {
    pub fn new(cloud: Arc<FakeCloud>, behavior: ProvisionerBehavior) -> Self {
        Self {
            cloud,
            behavior,
            applied: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Identifiers that reached `apply`, in call order.
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// Identifiers passed to `destroy`, in call order.
    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Highest number of applies observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Variables of the module under test, as Terraform would see them.
struct ModuleVars {
    platform: Platform,
    identifier: String,
    values: BTreeMap<String, Value>,
}

impl ModuleVars {
    async fn read(workdir: &Path) -> Result<Self, ProvisionError> {
        let path = workdir.join(VARS_FILE_NAME);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProvisionError::Workspace {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let values: BTreeMap<String, Value> = serde_json::from_str(&raw)
            .map_err(|e| ProvisionError::OutputsInvalid(e.to_string()))?;

        let (platform, identifier) = if let Some(name) = values.get("bucket_name") {
            (Platform::Gcs, name)
        } else if let Some(name) = values.get("cluster_name") {
            (Platform::Aks, name)
        } else {
            return Err(command_failed(
                "terraform plan",
                "Error: No value for required variable",
            ));
        };
        let identifier = identifier.as_str().unwrap_or_default().to_owned();

        Ok(Self {
            platform,
            identifier,
            values,
        })
    }

    fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    fn flag(&self, key: &str) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn reference(&self) -> ResourceRef {
        ResourceRef {
            platform: self.platform,
            name: self.identifier.clone(),
            scope: self.str("resource_group_name").map(str::to_owned),
        }
    }

    /// Kubeconfig naming the cluster, so the mock client can tell whose it is.
    fn kube_config(&self) -> String {
        format!(
            "apiVersion: v1\nkind: Config\nclusters:\n- name: {}\n",
            self.identifier
        )
    }

    fn kubernetes_version(&self) -> String {
        format!("{}.4", self.str("kubernetes_version").unwrap_or("1.29"))
    }

    fn live_state(&self) -> LiveState {
        let mut state = LiveState::new(self.reference()).with("name", self.identifier.as_str());
        match self.platform {
            Platform::Gcs => self.bucket_attributes(&mut state),
            Platform::Aks => self.cluster_attributes(&mut state),
        }
        state
    }

    fn bucket_attributes(&self, state: &mut LiveState) {
        state.insert("location", self.str("location").unwrap_or("US").to_uppercase());
        state.insert("storage_class", self.str("storage_class").unwrap_or("STANDARD"));
        let versioning = self
            .values
            .get("versioning")
            .and_then(|v| v["enabled"].as_bool())
            .unwrap_or_else(|| self.flag("enable_versioning"));
        state.insert("versioning", versioning.to_string());
        state.insert(
            "uniform_bucket_level_access",
            self.flag("uniform_bucket_level_access").to_string(),
        );
        copy_map(state, self.values.get("labels"), "labels");
        copy_map(state, self.values.get("website"), "website");
    }

    fn cluster_attributes(&self, state: &mut LiveState) {
        let location = self.str("location").unwrap_or("eastus");
        for (key, value) in [
            ("location", location.to_owned()),
            ("kubernetes_version", self.kubernetes_version()),
            ("provisioning_state", "Succeeded".to_owned()),
            ("fqdn", format!("{}.hcp.{location}.azmk8s.io", self.identifier)),
            ("identity.type", "SystemAssigned".to_owned()),
            ("disable_local_accounts", "true".to_owned()),
            ("network.plugin", "azure".to_owned()),
            ("network.policy", "calico".to_owned()),
            ("network.service_cidr", "10.0.0.0/16".to_owned()),
            ("network.dns_service_ip", "10.0.0.10".to_owned()),
            ("rbac.aad_managed", "true".to_owned()),
            ("rbac.azure_rbac", "true".to_owned()),
            ("addons.omsagent.enabled", "true".to_owned()),
            ("addons.omsagent.workspace", "/subscriptions/s/workspaces/law".to_owned()),
            ("addons.azurepolicy.enabled", "true".to_owned()),
            ("addons.azurekeyvaultsecretsprovider.enabled", "true".to_owned()),
            ("defender.workspace", "/subscriptions/s/workspaces/law".to_owned()),
            ("node_pools.count", "1".to_owned()),
            ("node_pools.0.vm_size", "Standard_D4s_v5".to_owned()),
            ("node_pools.0.enable_auto_scaling", "true".to_owned()),
            ("node_pools.0.availability_zones.count", "3".to_owned()),
            ("node_pools.0.os_disk_size_gb", "128".to_owned()),
            ("node_pools.0.min_count", "3".to_owned()),
            ("node_pools.0.max_count", "10".to_owned()),
            ("node_pools.0.autoscale_bounds_valid", "true".to_owned()),
        ] {
            state.insert(key, value);
        }
        copy_map(state, self.values.get("tags"), "tags");
    }
}

fn copy_map(state: &mut LiveState, value: Option<&Value>, prefix: &str) {
    if let Some(map) = value.and_then(Value::as_object) {
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            state.insert(format!("{prefix}.{key}"), rendered);
        }
    }
}

fn command_failed(command: &str, stderr: &str) -> ProvisionError {
    ProvisionError::CommandFailed {
        command: command.to_owned(),
        exit_code: Some(1),
        stderr_tail: stderr.to_owned(),
        transient: false,
    }
}

impl Provisioner for MockProvisioner {
    async fn init(&self, _workdir: &Path, _invocation: &Invocation) -> Result<(), ProvisionError> {
        Ok(())
    }

    async fn apply(&self, workdir: &Path, _invocation: &Invocation) -> Result<(), ProvisionError> {
        let vars = ModuleVars::read(workdir).await?;
        self.applied.lock().unwrap().push(vars.identifier.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.behavior.apply_delay {
            tokio::time::sleep(delay).await;
        }

        if vars.platform == Platform::Gcs {
            let class = vars.str("storage_class").unwrap_or("STANDARD");
            if !STORAGE_CLASSES.contains(&class) {
                return Err(command_failed(
                    "terraform apply",
                    &format!(
                        "Error: googleapi: Error 400: Invalid argument: storage class {class} is not supported"
                    ),
                ));
            }
        }

        self.cloud.put(vars.live_state());
        Ok(())
    }

    async fn outputs(
        &self,
        workdir: &Path,
        _invocation: &Invocation,
    ) -> Result<Outputs, ProvisionError> {
        let vars = ModuleVars::read(workdir).await?;
        let mut values = BTreeMap::new();
        match vars.platform {
            Platform::Gcs => {
                values.insert("bucket_name".to_owned(), json!(vars.identifier));
                values.insert(
                    "bucket_url".to_owned(),
                    json!(format!("gs://{}", vars.identifier)),
                );
            }
            Platform::Aks => {
                values.insert("cluster_name".to_owned(), json!(vars.identifier));
                values.insert(
                    "kubernetes_version".to_owned(),
                    json!(vars.kubernetes_version()),
                );
                values.insert("kube_config".to_owned(), json!(vars.kube_config()));
                values.insert("azure_policy_enabled".to_owned(), json!(true));
            }
        }
        Ok(Outputs::new(values))
    }

    async fn destroy(
        &self,
        workdir: &Path,
        _invocation: &Invocation,
    ) -> Result<(), ProvisionError> {
        let vars = ModuleVars::read(workdir).await?;
        self.destroyed.lock().unwrap().push(vars.identifier.clone());

        if let Some(stderr) = &self.behavior.destroy_error {
            return Err(command_failed("terraform destroy", stderr));
        }
        if !self.cloud.objects(&vars.identifier).is_empty() && !vars.flag("force_destroy") {
            return Err(command_failed(
                "terraform destroy",
                "Error: googleapi: Error 409: The bucket you tried to delete is not empty",
            ));
        }
        if !self.behavior.leave_resource_on_destroy {
            self.cloud.remove(&vars.identifier);
        }
        Ok(())
    }
}
