//! Kubernetes API reads through `kubectl`.
//!
//! Cluster checks need credentials that only the module knows, so the caller
//! passes the kubeconfig taken from the module's outputs. It is written to a
//! private temp file for the duration of one `kubectl` call.
//!
//! Attribute paths produced for namespace `<ns>`:
//!
//! - `<ns>/pods.count`
//! - `<ns>/pods.running`: names of pods in phase `Running`, sorted, comma-separated
//! - `<ns>/pods.<name>.phase`

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use terraprobe_core::types::{LiveState, ResourceRef};
use tracing::debug;

use crate::error::FetchError;

/// Lowercased `kubectl` stderr fragments that mark a failure as retryable.
const TRANSIENT_PATTERNS: &[&str] = &[
    "unable to connect to the server",
    "connection refused",
    "connection reset",
    "i/o timeout",
    "tls handshake timeout",
    "context deadline exceeded",
    "the server is currently unable to handle the request",
    "too many requests",
    "service unavailable",
    "etcdserver: request timed out",
];

/// Classifies a failed `kubectl` call by its stderr.
pub fn classify_failure(stderr: &str) -> FetchError {
    let lower = stderr.to_ascii_lowercase();
    let reason = format!("kubectl: {}", stderr.trim());
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        FetchError::Transient { reason }
    } else {
        FetchError::Permanent { reason }
    }
}

/// Runs `kubectl get pods` against a cluster.
#[derive(Debug, Clone)]
pub struct KubectlCli {
    binary: PathBuf,
    request_timeout: Duration,
}

impl Default for KubectlCli {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Lists the pods of `namespace` and maps them onto a [`LiveState`].
    pub async fn pods(
        &self,
        reference: &ResourceRef,
        kubeconfig: &str,
        namespace: &str,
    ) -> Result<LiveState, FetchError> {
        if kubeconfig.trim().is_empty() {
            return Err(FetchError::Permanent {
                reason: format!("{reference}: kubeconfig is empty"),
            });
        }
        let file = write_kubeconfig(kubeconfig)?;

        debug!(
            reference = %reference,
            namespace,
            binary = %self.binary.display(),
            "listing pods"
        );
        let output = tokio::process::Command::new(&self.binary)
            .args(["get", "pods", "--namespace", namespace, "--output", "json"])
            .arg(format!("--request-timeout={}s", self.request_timeout.as_secs().max(1)))
            .arg("--kubeconfig")
            .arg(file.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::Permanent {
                reason: format!("failed to run {}: {e}", self.binary.display()),
            })?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let body: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| FetchError::Permanent {
                reason: format!("kubectl returned invalid JSON: {e}"),
            })?;
        Ok(pods_state(reference, namespace, &body))
    }
}

fn write_kubeconfig(kubeconfig: &str) -> Result<tempfile::NamedTempFile, FetchError> {
    let io_err = |e: std::io::Error| FetchError::Permanent {
        reason: format!("failed to write kubeconfig: {e}"),
    };
    let mut file = tempfile::Builder::new()
        .prefix("terraprobe-kubeconfig-")
        .tempfile()
        .map_err(io_err)?;
    file.write_all(kubeconfig.as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)?;
    Ok(file)
}

/// Maps a `kubectl get pods -o json` list onto a [`LiveState`].
pub fn pods_state(reference: &ResourceRef, namespace: &str, list: &Value) -> LiveState {
    let mut state = LiveState::new(reference.clone());
    let items = list["items"].as_array().map(Vec::as_slice).unwrap_or_default();

    let mut running = Vec::new();
    for pod in items {
        let Some(name) = pod["metadata"]["name"].as_str() else {
            continue;
        };
        let phase = pod["status"]["phase"].as_str().unwrap_or("Unknown");
        state.insert(format!("{namespace}/pods.{name}.phase"), phase);
        if phase == "Running" {
            running.push(name);
        }
    }
    running.sort_unstable();

    state.insert(format!("{namespace}/pods.count"), items.len().to_string());
    state.insert(format!("{namespace}/pods.running"), running.join(","));
    state
}
