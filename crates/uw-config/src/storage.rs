//! Object storage configuration (S3-compatible, including Cloudflare R2).

use serde::{Deserialize, Serialize};

fn default_bucket_name() -> String {
    String::from("underwrite")
}

fn default_region() -> String {
    String::from("auto")
}

/// Presigned download links expire after 15 minutes unless overridden.
const fn default_presign_ttl_secs() -> u64 {
    900
}

fn default_local_path() -> String {
    String::from(".underwrite/blobs")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Cloudflare account ID. Used to build the endpoint when `endpoint` is empty.
    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint URL. If empty, built from `account_id`.
    #[serde(default)]
    pub endpoint: String,

    /// Lifetime of presigned download URLs.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,

    /// Directory used as the blob store when no remote bucket is configured.
    #[serde(default = "default_local_path")]
    pub local_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket_name: default_bucket_name(),
            region: default_region(),
            endpoint: String::new(),
            presign_ttl_secs: default_presign_ttl_secs(),
            local_path: default_local_path(),
        }
    }
}

impl StorageConfig {
    /// Whether a remote bucket can be reached with these settings.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        (!self.account_id.is_empty() || !self.endpoint.is_empty())
            && !self.access_key_id.is_empty()
            && !self.secret_access_key.is_empty()
            && !self.bucket_name.is_empty()
    }

    /// Returns the custom `endpoint` if set, otherwise the R2 endpoint for `account_id`.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://{}.r2.cloudflarestorage.com", self.account_id)
        } else {
            self.endpoint.clone()
        }
    }
}
