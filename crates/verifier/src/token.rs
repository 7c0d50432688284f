//! Bearer token sources for the platform APIs.
//!
//! Credentials come from the environment or the platform CLI the operator is
//! already logged into. Tokens obtained from a CLI are cached until shortly
//! before they expire.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::FetchError;

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// `gcloud auth print-access-token` does not report an expiry; its tokens live one hour.
const GCLOUD_TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

/// Used when `az` output carries no parsable expiry.
const AZURE_FALLBACK_TTL: Duration = Duration::from_secs(30 * 60);

const AZURE_MANAGEMENT_RESOURCE: &str = "https://management.azure.com";

/// Where a bearer token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Fixed token (tests, short-lived CI credentials).
    Static(String),
    /// Read from an environment variable on every request.
    Env(String),
    /// `gcloud auth print-access-token`
    GcloudCli,
    /// `az account get-access-token --resource https://management.azure.com`
    AzureCli,
}

impl TokenSource {
    /// GCS default: `GOOGLE_OAUTH_ACCESS_TOKEN` when set, otherwise the gcloud CLI.
    pub fn gcp_default() -> Self {
        Self::env_or("GOOGLE_OAUTH_ACCESS_TOKEN", Self::GcloudCli)
    }

    /// ARM default: `TERRAPROBE_AZURE_ACCESS_TOKEN` when set, otherwise the az CLI.
    pub fn azure_default() -> Self {
        Self::env_or("TERRAPROBE_AZURE_ACCESS_TOKEN", Self::AzureCli)
    }

    fn env_or(var: &str, fallback: Self) -> Self {
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Self::Env(var.to_owned()),
            _ => fallback,
        }
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Caching token provider.
pub struct TokenProvider {
    source: TokenSource,
    cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            cache: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    /// Returns a valid bearer token, refreshing it from the source when needed.
    pub async fn token(&self) -> Result<String, FetchError> {
        match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Env(var) => {
                return std::env::var(var).map_err(|_| FetchError::Permanent {
                    reason: format!("environment variable {var} is not set"),
                });
            }
            TokenSource::GcloudCli | TokenSource::AzureCli => {}
        }

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| Instant::now() < c.refresh_at) {
            return Ok(cached.value.clone());
        }

        let (value, ttl) = match self.source {
            TokenSource::GcloudCli => {
                let stdout = run_cli("gcloud", &["auth", "print-access-token"]).await?;
                (stdout.trim().to_owned(), GCLOUD_TOKEN_TTL)
            }
            _ => {
                let stdout = run_cli(
                    "az",
                    &[
                        "account",
                        "get-access-token",
                        "--resource",
                        AZURE_MANAGEMENT_RESOURCE,
                        "--output",
                        "json",
                    ],
                )
                .await?;
                parse_azure_token(&stdout, SystemTime::now())?
            }
        };

        if value.is_empty() {
            return Err(FetchError::Permanent {
                reason: "token source returned an empty token".to_owned(),
            });
        }

        debug!(source = ?self.source, ttl_secs = ttl.as_secs(), "refreshed access token");
        *cache = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + ttl.saturating_sub(REFRESH_MARGIN),
        });
        Ok(value)
    }
}

async fn run_cli(program: &str, args: &[&str]) -> Result<String, FetchError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| FetchError::Permanent {
            reason: format!("{program} not available: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FetchError::Permanent {
            reason: format!("{program} {} failed: {}", args.join(" "), stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `az account get-access-token` JSON into the token and its remaining lifetime.
fn parse_azure_token(raw: &str, now: SystemTime) -> Result<(String, Duration), FetchError> {
    let body: Value = serde_json::from_str(raw).map_err(|e| FetchError::Permanent {
        reason: format!("az output parse: {e}"),
    })?;
    let token = body["accessToken"]
        .as_str()
        .ok_or_else(|| FetchError::Permanent {
            reason: "az output has no accessToken".to_owned(),
        })?
        .to_owned();

    let expires_on = match &body["expires_on"] {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    };
    let now_secs = now.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let ttl = expires_on
        .map(|at| Duration::from_secs(at.saturating_sub(now_secs)))
        .unwrap_or(AZURE_FALLBACK_TTL);

    Ok((token, ttl))
}
