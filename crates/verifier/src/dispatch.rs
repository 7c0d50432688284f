//! Platform dispatch.

use terraprobe_core::context::PlatformContext;
use terraprobe_core::types::{LiveState, Platform, ResourceRef};

use crate::aks::AksClient;
use crate::client::{Fixture, PlatformClient};
use crate::error::FetchError;
use crate::gcs::GcsClient;
use crate::kube::KubectlCli;
use crate::token::{TokenProvider, TokenSource};

/// Routes each request to the client for the resource's platform.
///
/// A platform without a configured client answers with
/// [`FetchError::Unsupported`].
#[derive(Debug, Default)]
pub struct PlatformClients {
    gcs: Option<GcsClient>,
    aks: Option<AksClient>,
}

impl PlatformClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gcs(mut self, client: GcsClient) -> Self {
        self.gcs = Some(client);
        self
    }

    pub fn with_aks(mut self, client: AksClient) -> Self {
        self.aks = Some(client);
        self
    }

    /// Builds clients for every platform present in `context`, using the
    /// default token source of each platform.
    pub fn from_context(context: &PlatformContext) -> Self {
        let mut clients = Self::new();
        if context.gcp.is_some() {
            clients.gcs = Some(GcsClient::new(TokenProvider::new(TokenSource::gcp_default())));
        }
        if let Some(azure) = &context.azure {
            clients.aks = Some(AksClient::new(
                azure.subscription_id.clone(),
                TokenProvider::new(TokenSource::azure_default()),
            ));
        }
        clients
    }

    /// Uses `kubectl` for in-cluster checks on AKS clusters.
    pub fn with_kubectl(mut self, kubectl: KubectlCli) -> Self {
        self.aks = self.aks.map(|client| client.with_kubectl(kubectl));
        self
    }

    pub fn supports(&self, platform: Platform) -> bool {
        match platform {
            Platform::Gcs => self.gcs.is_some(),
            Platform::Aks => self.aks.is_some(),
        }
    }
}

fn unsupported(platform: Platform, operation: &str) -> FetchError {
    FetchError::Unsupported {
        platform: platform.to_string(),
        operation: operation.to_owned(),
    }
}

impl PlatformClient for PlatformClients {
    async fn fetch(&self, reference: &ResourceRef) -> Result<LiveState, FetchError> {
        match reference.platform {
            Platform::Gcs => match &self.gcs {
                Some(client) => client.fetch(reference).await,
                None => Err(unsupported(Platform::Gcs, "fetch")),
            },
            Platform::Aks => match &self.aks {
                Some(client) => client.fetch(reference).await,
                None => Err(unsupported(Platform::Aks, "fetch")),
            },
        }
    }

    async fn seed(&self, reference: &ResourceRef, fixture: &Fixture) -> Result<(), FetchError> {
        match reference.platform {
            Platform::Gcs => match &self.gcs {
                Some(client) => client.seed(reference, fixture).await,
                None => Err(unsupported(Platform::Gcs, &fixture.describe())),
            },
            Platform::Aks => match &self.aks {
                Some(client) => client.seed(reference, fixture).await,
                None => Err(unsupported(Platform::Aks, &fixture.describe())),
            },
        }
    }

    async fn inspect_cluster(
        &self,
        reference: &ResourceRef,
        kubeconfig: &str,
        namespace: &str,
    ) -> Result<LiveState, FetchError> {
        let operation = format!("inspect_cluster({namespace})");
        match (reference.platform, &self.aks) {
            (Platform::Aks, Some(client)) => {
                client.inspect_cluster(reference, kubeconfig, namespace).await
            }
            (platform, _) => Err(unsupported(platform, &operation)),
        }
    }
}
