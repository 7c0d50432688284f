//! Platform API abstraction for testability.
//!
//! The [`PlatformClient`] trait reads a resource's live state straight from the
//! platform's authoritative API, never from the provisioning tool's state
//! file, so verification does not inherit provisioning-tool bugs.
//!
//! # Implementations
//!
//! - [`GcsClient`](crate::gcs::GcsClient): Google Cloud Storage JSON API
//! - [`AksClient`](crate::aks::AksClient): Azure Resource Manager, plus the
//!   cluster's own API through [`KubectlCli`](crate::kube::KubectlCli)
//! - [`PlatformClients`](crate::dispatch::PlatformClients): dispatches on the resource's platform

use std::future::Future;

use serde::{Deserialize, Serialize};
use terraprobe_core::types::{LiveState, ResourceRef};

use crate::error::FetchError;

/// Data placed into a resource after apply so that destroy has something to clean up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    /// Uploads one object into a bucket.
    UploadObject {
        /// Object name
        name: String,
        /// Object body
        content: String,
        /// MIME type of the body
        #[serde(default = "default_content_type")]
        content_type: String,
    },
}

fn default_content_type() -> String {
    "text/plain".to_owned()
}

impl Fixture {
    /// Short description used in logs and failure messages.
    pub fn describe(&self) -> String {
        match self {
            Self::UploadObject { name, .. } => format!("upload_object({name})"),
        }
    }
}

/// Trait abstracting live-state reads against a cloud platform.
///
/// The trait is `Send + Sync + 'static`, allowing one client to be shared by
/// every concurrently running scenario.
///
/// # Error Handling
///
/// - **404**: `FetchError::NotFound`
/// - **408 / 429 / 5xx / connection errors**: `FetchError::Transient`
/// - **Other statuses**: `FetchError::Permanent`
/// - **Platform without a configured client**: `FetchError::Unsupported`
pub trait PlatformClient: Send + Sync + 'static {
    /// Reads the current attributes of `reference`.
    ///
    /// Two fetches with no mutation in between return equal states.
    fn fetch(
        &self,
        reference: &ResourceRef,
    ) -> impl Future<Output = Result<LiveState, FetchError>> + Send;

    /// Puts fixture data into `reference`.
    fn seed(
        &self,
        reference: &ResourceRef,
        fixture: &Fixture,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Reads `namespace` of the Kubernetes cluster behind `reference` with the
    /// credentials in `kubeconfig`.
    ///
    /// Platforms without a Kubernetes API answer with `FetchError::Unsupported`.
    fn inspect_cluster(
        &self,
        reference: &ResourceRef,
        _kubeconfig: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<LiveState, FetchError>> + Send {
        let err = FetchError::Unsupported {
            platform: reference.platform.to_string(),
            operation: format!("inspect_cluster({namespace})"),
        };
        async move { Err(err) }
    }
}
