//! Google Cloud Storage client.
//!
//! Reads buckets through the JSON API (`GET /storage/v1/b/{bucket}`) and maps
//! the response onto flat, dotted attribute paths:
//!
//! | attribute | source field |
//! |---|---|
//! | `name`, `location`, `location_type`, `storage_class` | `name`, `location`, `locationType`, `storageClass` |
//! | `versioning` | `versioning.enabled` (absent means `false`) |
//! | `website.main_page_suffix`, `website.not_found_page` | `website.*` |
//! | `labels.<key>` | `labels` |
//! | `uniform_bucket_level_access` | `iamConfiguration.uniformBucketLevelAccess.enabled` |
//! | `public_access_prevention` | `iamConfiguration.publicAccessPrevention` |
//! | `self_link`, `url`, `project_number` | `selfLink`, `gs://{name}`, `projectNumber` |

use bytes::Bytes;
use serde_json::Value;
use terraprobe_core::types::{LiveState, ResourceRef};
use tracing::debug;

use crate::client::{Fixture, PlatformClient};
use crate::error::FetchError;
use crate::token::TokenProvider;

/// Production endpoint of the JSON API.
pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// GCS bucket client.
#[derive(Debug)]
pub struct GcsClient {
    http: reqwest::Client,
    token: TokenProvider,
    base_url: String,
}

impl GcsClient {
    pub fn new(token: TokenProvider) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    /// Points the client at another endpoint (emulators, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Replaces the HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn error_from(resp: reqwest::Response, reference: &ResourceRef) -> FetchError {
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        FetchError::from_status(status, &reference.to_string(), &extract_gcp_error(&body))
    }
}

impl PlatformClient for GcsClient {
    async fn fetch(&self, reference: &ResourceRef) -> Result<LiveState, FetchError> {
        let token = self.token.token().await?;
        let url = format!("{}/storage/v1/b/{}", self.base_url, reference.name);
        debug!(url = %url, "GCS bucket GET");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&e, &reference.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_from(resp, reference).await);
        }

        let body: Value = resp.json().await.map_err(|e| FetchError::Transient {
            reason: format!("bucket decode: {e}"),
        })?;
        Ok(bucket_state(reference, &body))
    }

    async fn seed(&self, reference: &ResourceRef, fixture: &Fixture) -> Result<(), FetchError> {
        let Fixture::UploadObject {
            name,
            content,
            content_type,
        } = fixture;

        let token = self.token.token().await?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, reference.name);
        debug!(url = %url, object = %name, "GCS object upload");

        let resp = self
            .http
            .post(&url)
            .query(&[("uploadType", "media"), ("name", name.as_str())])
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
            .body(Bytes::from(content.clone()))
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&e, &reference.to_string()))?;

        if !resp.status().is_success() {
            return Err(Self::error_from(resp, reference).await);
        }
        Ok(())
    }
}

/// Maps a bucket resource onto a [`LiveState`].
pub fn bucket_state(reference: &ResourceRef, bucket: &Value) -> LiveState {
    let mut state = LiveState::new(reference.clone());

    for (attr, field) in [
        ("name", "name"),
        ("location", "location"),
        ("location_type", "locationType"),
        ("storage_class", "storageClass"),
        ("self_link", "selfLink"),
        ("project_number", "projectNumber"),
    ] {
        if let Some(v) = bucket[field].as_str() {
            state.insert(attr, v);
        }
    }

    if let Some(name) = bucket["name"].as_str() {
        state.insert("url", format!("gs://{name}"));
    }

    let versioning = bucket["versioning"]["enabled"].as_bool().unwrap_or(false);
    state.insert("versioning", versioning.to_string());

    if let Some(website) = bucket["website"].as_object() {
        for (key, attr) in [
            ("mainPageSuffix", "website.main_page_suffix"),
            ("notFoundPage", "website.not_found_page"),
        ] {
            if let Some(v) = website.get(key).and_then(Value::as_str) {
                state.insert(attr, v);
            }
        }
    }

    if let Some(labels) = bucket["labels"].as_object() {
        for (key, value) in labels {
            if let Some(v) = value.as_str() {
                state.insert(format!("labels.{key}"), v);
            }
        }
    }

    let iam = &bucket["iamConfiguration"];
    if let Some(enabled) = iam["uniformBucketLevelAccess"]["enabled"].as_bool() {
        state.insert("uniform_bucket_level_access", enabled.to_string());
    }
    if let Some(pap) = iam["publicAccessPrevention"].as_str() {
        state.insert("public_access_prevention", pap);
    }

    state
}

/// Converts a Google API error envelope into a readable message.
pub fn extract_gcp_error(body: &Value) -> String {
    let err = &body["error"];
    let status = err["status"].as_str();
    let message = err["message"].as_str().unwrap_or("unknown error");
    let reasons: Vec<&str> = err["errors"]
        .as_array()
        .map(|items| items.iter().filter_map(|e| e["reason"].as_str()).collect())
        .unwrap_or_default();

    let head = match status {
        Some(status) => format!("{status}: {message}"),
        None => message.to_owned(),
    };
    if reasons.is_empty() {
        head
    } else {
        format!("{head} ({})", reasons.join(", "))
    }
}
