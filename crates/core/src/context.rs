//! 플랫폼 컨텍스트 -- 프로젝트/구독 ID 해석
//!
//! 시작 시 한 번 해석되어 참조로 전달됩니다. 값마다 다음 순서로 찾습니다.
//!
//! 1. 명시적 설정 (`terraprobe.toml`, `TERRAPROBE_*` 환경변수)
//! 2. 플랫폼 표준 환경변수 (`GOOGLE_CLOUD_PROJECT`, `ARM_SUBSCRIPTION_ID` 등)
//! 3. 플랫폼 CLI 설정 (`gcloud config get-value project`, `az account show`)
//! 4. 실패 ([`ConfigError::Unresolved`])
//!
//! 선택된 시나리오가 사용하는 플랫폼만 해석합니다.

use std::future::Future;

use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::error::ConfigError;
use crate::types::Platform;

const GCLOUD_PROJECT: &[&str] = &["config", "get-value", "project"];
const GCLOUD_REGION: &[&str] = &["config", "get-value", "compute/region"];
const AZ_SUBSCRIPTION: &[&str] = &["account", "show", "--query", "id", "-o", "tsv"];

/// 환경변수와 플랫폼 CLI 설정을 읽는 소스
///
/// 테스트에서는 고정된 값을 돌려주는 구현으로 대체합니다.
pub trait AmbientSource: Send + Sync {
    /// 환경변수 값을 반환합니다.
    fn env(&self, key: &str) -> Option<String>;

    /// CLI를 실행하여 표준 출력 한 줄을 반환합니다. 실행 실패 시 `None`.
    fn cli_value(
        &self,
        program: &str,
        args: &[&str],
    ) -> impl Future<Output = Option<String>> + Send;
}

/// 실제 프로세스 환경을 읽는 소스
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAmbient;

impl AmbientSource for SystemAmbient {
    fn env(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    async fn cli_value(&self, program: &str, args: &[&str]) -> Option<String> {
        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| debug!(program, error = %e, "ambient cli unavailable"))
            .ok()?;

        if !output.status.success() {
            debug!(program, status = ?output.status.code(), "ambient cli returned non-zero");
            return None;
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_owned())
    }
}

/// GCP 컨텍스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpContext {
    pub project: String,
    pub region: Option<String>,
}

/// Azure 컨텍스트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureContext {
    pub subscription_id: String,
    pub location: Option<String>,
}

/// 해석된 플랫폼 컨텍스트
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformContext {
    pub gcp: Option<GcpContext>,
    pub azure: Option<AzureContext>,
}

/// 한 값을 찾기 위한 조회 경로
struct Lookup<'a> {
    field: &'a str,
    explicit: Option<&'a str>,
    env_keys: &'a [&'a str],
    cli: Option<(&'a str, &'a [&'a str])>,
}

impl Lookup<'_> {
    async fn find(&self, ambient: &impl AmbientSource) -> Option<String> {
        if let Some(value) = self.explicit.and_then(usable) {
            debug!(field = self.field, source = "config", "resolved");
            return Some(value);
        }

        for key in self.env_keys {
            if let Some(value) = ambient.env(key).as_deref().and_then(usable) {
                debug!(field = self.field, source = key, "resolved");
                return Some(value);
            }
        }

        let (program, args) = self.cli?;
        let value = ambient.cli_value(program, args).await;
        let value = value.as_deref().and_then(usable)?;
        debug!(field = self.field, source = program, "resolved");
        Some(value)
    }

    fn tried(&self) -> String {
        let mut sources = vec![format!("config {}", self.field)];
        sources.extend(self.env_keys.iter().map(|k| format!("${k}")));
        if let Some((program, args)) = self.cli {
            sources.push(format!("`{program} {}`", args.join(" ")));
        }
        sources.join(", ")
    }

    async fn require(&self, ambient: &impl AmbientSource) -> Result<String, ConfigError> {
        self.find(ambient).await.ok_or_else(|| ConfigError::Unresolved {
            field: self.field.to_owned(),
            tried: self.tried(),
        })
    }
}

/// 빈 값과 gcloud의 `(unset)` 표기는 값이 없는 것으로 봅니다.
fn usable(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "(unset)" {
        None
    } else {
        Some(value.to_owned())
    }
}

impl PlatformContext {
    /// 지정된 플랫폼에 필요한 컨텍스트를 해석합니다.
    pub async fn resolve(
        config: &HarnessConfig,
        platforms: &[Platform],
        ambient: &impl AmbientSource,
    ) -> Result<Self, ConfigError> {
        let mut context = Self::default();

        if platforms.contains(&Platform::Gcs) {
            let project = Lookup {
                field: "gcp.project",
                explicit: config.gcp.project.as_deref(),
                env_keys: &[
                    "TERRAPROBE_GCP_PROJECT",
                    "GOOGLE_CLOUD_PROJECT",
                    "CLOUDSDK_CORE_PROJECT",
                ],
                cli: Some(("gcloud", GCLOUD_PROJECT)),
            }
            .require(ambient)
            .await?;

            let region = Lookup {
                field: "gcp.region",
                explicit: config.gcp.region.as_deref(),
                env_keys: &["TERRAPROBE_GCP_REGION", "CLOUDSDK_COMPUTE_REGION"],
                cli: Some(("gcloud", GCLOUD_REGION)),
            }
            .find(ambient)
            .await;

            info!(project = %project, region = ?region, "resolved gcp context");
            context.gcp = Some(GcpContext { project, region });
        }

        if platforms.contains(&Platform::Aks) {
            let subscription_id = Lookup {
                field: "azure.subscription_id",
                explicit: config.azure.subscription_id.as_deref(),
                env_keys: &["TERRAPROBE_AZURE_SUBSCRIPTION_ID", "ARM_SUBSCRIPTION_ID"],
                cli: Some(("az", AZ_SUBSCRIPTION)),
            }
            .require(ambient)
            .await?;

            let location = Lookup {
                field: "azure.location",
                explicit: config.azure.location.as_deref(),
                env_keys: &["TERRAPROBE_AZURE_LOCATION"],
                cli: None,
            }
            .find(ambient)
            .await;

            info!(subscription_id = %subscription_id, "resolved azure context");
            context.azure = Some(AzureContext {
                subscription_id,
                location,
            });
        }

        Ok(context)
    }

    /// Terraform 프로세스에 전달할 환경변수 목록
    pub fn terraform_env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(gcp) = &self.gcp {
            env.push(("GOOGLE_PROJECT".to_owned(), gcp.project.clone()));
            if let Some(region) = &gcp.region {
                env.push(("GOOGLE_REGION".to_owned(), region.clone()));
            }
        }
        if let Some(azure) = &self.azure {
            env.push((
                "ARM_SUBSCRIPTION_ID".to_owned(),
                azure.subscription_id.clone(),
            ));
        }
        env
    }
}
