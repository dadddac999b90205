use std::sync::Mutex;

use serde::Deserialize;
use thiserror::Error;

/// One published renderer bundle release.
///
/// `main_hash` fingerprints the native main-process build this bundle was
/// compiled against; a bundle is only safe to hot-apply when it matches the
/// running binary's own fingerprint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererManifest {
    pub version: String,
    pub hash: String,
    pub commit: String,
    pub filename: String,
    pub main_hash: String,
    pub download_url: String,
}

/// One installer file offered for a platform. Fields are optional on the
/// wire so a malformed entry can be skipped instead of failing the whole
/// payload parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFile {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha512: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformEntry {
    pub platform: String,
    #[serde(default)]
    pub files: Vec<PlatformFile>,
}

/// Full-app installer metadata for the native updater path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPayload {
    pub version: String,
    #[serde(default)]
    pub platforms: Vec<PlatformEntry>,
    #[serde(default)]
    pub selected_platform: Option<String>,
    #[serde(default)]
    pub release_name: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    #[default]
    None,
    Renderer,
    App,
    /// Forward compatibility: an unrecognized decision type never fails the
    /// parse, it just reports no update.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Decision {
    #[serde(rename = "type", default)]
    pub kind: DecisionKind,
    #[serde(default)]
    pub renderer: Option<RendererManifest>,
    #[serde(default)]
    pub app: Option<AppPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub decision: Decision,
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("failed to fetch latest release: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release check failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse release payload: {0}")]
    Parse(#[source] reqwest::Error),
}

/// Client for the "latest release" API endpoint.
///
/// Keeps the most recently fetched payload in memory so collaborators can
/// read the last known release without re-fetching. The cache has no TTL; it
/// is replaced only by an explicit refresh.
pub struct ReleaseClient {
    client: reqwest::Client,
    endpoint: String,
    cached: Mutex<Option<ReleasePayload>>,
}

impl ReleaseClient {
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self {
            client,
            endpoint,
            cached: Mutex::new(None),
        }
    }

    /// Fetch the latest release payload.
    ///
    /// With `refresh` unset, a previously fetched payload is returned without
    /// a network round trip.
    ///
    /// # Errors
    /// Returns an error when the request fails, the server responds with a
    /// non-success status, or the payload does not match the expected schema.
    pub async fn fetch_latest(&self, refresh: bool) -> Result<ReleasePayload, ReleaseError> {
        if !refresh && let Some(payload) = self.cached() {
            return Ok(payload);
        }

        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(ReleaseError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(ReleaseError::HttpStatus {
                status,
                body_snippet,
            });
        }

        let payload: ReleasePayload = response.json().await.map_err(ReleaseError::Parse)?;

        *self
            .cached
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(payload.clone());

        Ok(payload)
    }

    /// Last successfully fetched payload, if any.
    #[must_use]
    pub fn cached(&self) -> Option<ReleasePayload> {
        self.cached
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
