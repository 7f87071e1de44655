//! Manifest (bundle) loading and sync endpoint derivation.

use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, warn};
use vfs_sync_core::VfsError;

/// Fetches the manifest the worker is bootstrapped with.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    client: Client,
}

impl ManifestLoader {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!("Failed to build manifest client ({}), using defaults", e);
            Client::new()
        });
        Self { client }
    }

    /// Download the manifest at `url`.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, VfsError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VfsError::Manifest(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VfsError::Manifest(format!("{} returned {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VfsError::Manifest(format!("{}: {}", url, e)))?;
        debug!("Fetched manifest {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Sync endpoint handed to the worker along with the manifest.
///
/// An explicit target wins. Otherwise a `serverUrl` field in a JSON manifest
/// is used, and failing that the manifest's origin with a websocket scheme
/// and the `/sync` path.
pub fn derive_server_url(
    manifest_url: &str,
    manifest: &[u8],
    transport_target: Option<&str>,
) -> Option<String> {
    if let Some(target) = transport_target.filter(|t| !t.is_empty()) {
        return Some(target.to_string());
    }

    if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(manifest) {
        if let Some(Value::String(url)) = fields.get("serverUrl") {
            return Some(url.clone());
        }
    }

    let mut url = Url::parse(manifest_url).ok()?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return None,
    };
    url.set_scheme(scheme).ok()?;
    url.set_path("/sync");
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}
