//! Azure Kubernetes Service client.
//!
//! Reads managed clusters through Azure Resource Manager:
//! `GET /subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.ContainerService/managedClusters/{name}`.
//! The resource group comes from [`ResourceRef::scope`].
//!
//! Attribute paths produced:
//!
//! - `name`, `location`, `kubernetes_version`, `current_kubernetes_version`,
//!   `provisioning_state`, `power_state`, `dns_prefix`, `fqdn`, `node_resource_group`
//! - `network.plugin`, `network.policy`, `network.service_cidr`,
//!   `network.dns_service_ip`, `network.pod_cidr`, `network.load_balancer_sku`,
//!   `network.outbound_type`
//! - `rbac.enabled`, `rbac.aad_managed`, `rbac.azure_rbac`
//! - `identity.type`, `disable_local_accounts`
//! - `addons.<name>.enabled`, `addons.omsagent.workspace` (addon names lowercased)
//! - `defender.enabled`, `defender.workspace`
//! - `node_pools.count`, `node_pools.<index>.<field>` and `node_pool.<name>.<field>`
//! - `node_pools.<index>.autoscale_bounds_valid`: `true` unless auto-scaling is
//!   enabled without `max_count > min_count`
//! - `tags.<key>`
//!
//! Pods inside the cluster are read with `kubectl` (see [`crate::kube`]).

use serde_json::Value;
use terraprobe_core::types::{LiveState, Platform, ResourceRef};
use tracing::debug;

use crate::client::{Fixture, PlatformClient};
use crate::error::FetchError;
use crate::kube::KubectlCli;
use crate::token::TokenProvider;

/// Production endpoint of Azure Resource Manager.
pub const DEFAULT_BASE_URL: &str = "https://management.azure.com";

/// ARM API version for `Microsoft.ContainerService/managedClusters`.
pub const API_VERSION: &str = "2024-05-01";

/// AKS managed cluster client.
#[derive(Debug)]
pub struct AksClient {
    http: reqwest::Client,
    token: TokenProvider,
    subscription_id: String,
    base_url: String,
    kubectl: KubectlCli,
}

impl AksClient {
    pub fn new(subscription_id: impl Into<String>, token: TokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            subscription_id: subscription_id.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            kubectl: KubectlCli::default(),
        }
    }

    pub fn with_kubectl(mut self, kubectl: KubectlCli) -> Self {
        self.kubectl = kubectl;
        self
    }

    /// Points the client at another endpoint (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn cluster_url(&self, resource_group: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}?api-version={}",
            self.base_url, self.subscription_id, resource_group, name, API_VERSION
        )
    }
}

impl PlatformClient for AksClient {
    async fn fetch(&self, reference: &ResourceRef) -> Result<LiveState, FetchError> {
        let resource_group =
            reference
                .scope
                .as_deref()
                .ok_or_else(|| FetchError::Permanent {
                    reason: format!("{reference}: AKS lookups need a resource group"),
                })?;

        let token = self.token.token().await?;
        let url = self.cluster_url(resource_group, &reference.name);
        debug!(url = %url, "Azure ARM GET");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&e, &reference.to_string()))?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(FetchError::from_status(
                status,
                &reference.to_string(),
                &parse_arm_error(&body),
            ));
        }

        Ok(cluster_state(reference, &body))
    }

    async fn seed(&self, _reference: &ResourceRef, fixture: &Fixture) -> Result<(), FetchError> {
        Err(FetchError::Unsupported {
            platform: Platform::Aks.to_string(),
            operation: fixture.describe(),
        })
    }

    async fn inspect_cluster(
        &self,
        reference: &ResourceRef,
        kubeconfig: &str,
        namespace: &str,
    ) -> Result<LiveState, FetchError> {
        self.kubectl.pods(reference, kubeconfig, namespace).await
    }
}

fn insert_str(state: &mut LiveState, attr: impl Into<String>, value: &Value) {
    match value {
        Value::String(s) => state.insert(attr, s.as_str()),
        Value::Bool(b) => state.insert(attr, b.to_string()),
        Value::Number(n) => state.insert(attr, n.to_string()),
        _ => {}
    }
}

/// Maps a managed cluster resource onto a [`LiveState`].
pub fn cluster_state(reference: &ResourceRef, cluster: &Value) -> LiveState {
    let mut state = LiveState::new(reference.clone());
    let props = &cluster["properties"];

    insert_str(&mut state, "name", &cluster["name"]);
    insert_str(&mut state, "location", &cluster["location"]);
    insert_str(&mut state, "identity.type", &cluster["identity"]["type"]);

    for (attr, field) in [
        ("kubernetes_version", "kubernetesVersion"),
        ("current_kubernetes_version", "currentKubernetesVersion"),
        ("provisioning_state", "provisioningState"),
        ("dns_prefix", "dnsPrefix"),
        ("fqdn", "fqdn"),
        ("node_resource_group", "nodeResourceGroup"),
        ("rbac.enabled", "enableRBAC"),
        ("disable_local_accounts", "disableLocalAccounts"),
    ] {
        insert_str(&mut state, attr, &props[field]);
    }
    insert_str(&mut state, "power_state", &props["powerState"]["code"]);

    let network = &props["networkProfile"];
    for (attr, field) in [
        ("network.plugin", "networkPlugin"),
        ("network.policy", "networkPolicy"),
        ("network.service_cidr", "serviceCidr"),
        ("network.dns_service_ip", "dnsServiceIP"),
        ("network.pod_cidr", "podCidr"),
        ("network.load_balancer_sku", "loadBalancerSku"),
        ("network.outbound_type", "outboundType"),
    ] {
        insert_str(&mut state, attr, &network[field]);
    }

    let aad = &props["aadProfile"];
    insert_str(&mut state, "rbac.aad_managed", &aad["managed"]);
    insert_str(&mut state, "rbac.azure_rbac", &aad["enableAzureRBAC"]);

    if let Some(addons) = props["addonProfiles"].as_object() {
        for (name, addon) in addons {
            let name = name.to_ascii_lowercase();
            insert_str(&mut state, format!("addons.{name}.enabled"), &addon["enabled"]);
            if name == "omsagent" {
                insert_str(
                    &mut state,
                    "addons.omsagent.workspace",
                    &addon["config"]["logAnalyticsWorkspaceResourceID"],
                );
            }
        }
    }

    let defender = &props["securityProfile"]["defender"];
    insert_str(
        &mut state,
        "defender.workspace",
        &defender["logAnalyticsWorkspaceResourceId"],
    );
    insert_str(
        &mut state,
        "defender.enabled",
        &defender["securityMonitoring"]["enabled"],
    );

    let pools = props["agentPoolProfiles"].as_array().map(Vec::as_slice).unwrap_or_default();
    state.insert("node_pools.count", pools.len().to_string());
    for (index, pool) in pools.iter().enumerate() {
        let pool_name = pool["name"].as_str().map(str::to_owned);
        for (attr, field) in [
            ("name", "name"),
            ("vm_size", "vmSize"),
            ("count", "count"),
            ("mode", "mode"),
            ("os_type", "osType"),
            ("os_disk_size_gb", "osDiskSizeGB"),
            ("enable_auto_scaling", "enableAutoScaling"),
            ("min_count", "minCount"),
            ("max_count", "maxCount"),
            ("orchestrator_version", "orchestratorVersion"),
        ] {
            insert_str(&mut state, format!("node_pools.{index}.{attr}"), &pool[field]);
            if let Some(pool_name) = &pool_name {
                insert_str(&mut state, format!("node_pool.{pool_name}.{attr}"), &pool[field]);
            }
        }

        let autoscaling = pool["enableAutoScaling"].as_bool().unwrap_or(false);
        let bounds_valid = !autoscaling
            || matches!(
                (pool["minCount"].as_u64(), pool["maxCount"].as_u64()),
                (Some(min), Some(max)) if max > min
            );
        state.insert(
            format!("node_pools.{index}.autoscale_bounds_valid"),
            bounds_valid.to_string(),
        );

        let zones: Vec<&str> = pool["availabilityZones"]
            .as_array()
            .map(|z| z.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        state.insert(format!("node_pools.{index}.availability_zones"), zones.join(","));
        state.insert(
            format!("node_pools.{index}.availability_zones.count"),
            zones.len().to_string(),
        );
    }

    if let Some(tags) = cluster["tags"].as_object() {
        for (key, value) in tags {
            insert_str(&mut state, format!("tags.{key}"), value);
        }
    }

    state
}

/// Extracts `code: message` from an ARM error body.
pub fn parse_arm_error(body: &Value) -> String {
    let err = &body["error"];
    match (err["code"].as_str(), err["message"].as_str()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_owned(),
        (None, Some(message)) => message.to_owned(),
        (None, None) => "unknown error".to_owned(),
    }
}
