//! # uw-blob
//!
//! Object storage for uploaded source documents and generated document
//! versions, over the `object_store` crate.
//!
//! A configured bucket (S3 or Cloudflare R2) is used when
//! [`StorageConfig::is_configured`] holds; otherwise blobs live on the local
//! filesystem under `storage.local_path`. Only the S3 backend can presign
//! download URLs.

mod error;

pub use error::BlobError;

use std::sync::Arc;
use std::time::Duration;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use uw_config::StorageConfig;

/// Handle to the configured object store.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    /// `LocalFileSystem` rejects puts that carry attributes.
    attributes: bool,
    presign_ttl: Duration,
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("store", &self.store.to_string())
            .field("presigns", &self.signer.is_some())
            .finish()
    }
}

impl BlobStore {
    /// Build the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Config`] if the S3 client or the local directory
    /// cannot be set up.
    pub fn from_config(config: &StorageConfig) -> Result<Self, BlobError> {
        let presign_ttl = Duration::from_secs(config.presign_ttl_secs);

        if config.is_configured() {
            let s3 = AmazonS3Builder::new()
                .with_bucket_name(&config.bucket_name)
                .with_region(&config.region)
                .with_access_key_id(&config.access_key_id)
                .with_secret_access_key(&config.secret_access_key)
                .with_endpoint(config.endpoint_url())
                .build()
                .map_err(|e| BlobError::Config(e.to_string()))?;
            let s3 = Arc::new(s3);
            tracing::debug!(bucket = %config.bucket_name, "using remote object store");
            return Ok(Self {
                store: s3.clone(),
                signer: Some(s3),
                attributes: true,
                presign_ttl,
            });
        }

        std::fs::create_dir_all(&config.local_path)
            .map_err(|e| BlobError::Config(format!("{}: {e}", config.local_path)))?;
        let local = LocalFileSystem::new_with_prefix(&config.local_path)
            .map_err(|e| BlobError::Config(e.to_string()))?;
        tracing::debug!(path = %config.local_path, "using local object store");
        Ok(Self {
            store: Arc::new(local),
            signer: None,
            attributes: false,
            presign_ttl,
        })
    }

    /// Process-local store, for tests and dry runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()))
    }

    /// Wrap an existing backend without signing support. The backend must
    /// accept the content-type attribute on puts.
    #[must_use]
    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            signer: None,
            attributes: true,
            presign_ttl: Duration::from_secs(900),
        }
    }

    /// Whether [`Self::presigned_url`] can return a URL.
    #[must_use]
    pub fn can_presign(&self) -> bool {
        self.signer.is_some()
    }

    /// Store `bytes` under `key`, recording the content type.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Store`] if the backend rejects the write.
    pub async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let mut attributes = Attributes::new();
        if self.attributes {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        let len = bytes.len();
        self.store
            .put_opts(&Path::from(key), PutPayload::from(bytes), opts)
            .await?;
        tracing::debug!(key, len, "blob stored");
        Ok(())
    }

    /// Fetch the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::NotFound`] if nothing is stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let result = self.store.get(&Path::from(key)).await.map_err(|e| not_found(key, e))?;
        let bytes = result.bytes().await.map_err(|e| not_found(key, e))?;
        Ok(bytes.to_vec())
    }

    /// Remove the object under `key`. Missing objects are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Store`] on backend failure.
    pub async fn delete(&self, key: &str) -> Result<(), BlobError> {
        match self.store.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Presigned GET URL for `key`, valid for `ttl` (or the configured
    /// default). `None` when the backend cannot sign.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Store`] if signing fails.
    pub async fn presigned_url(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<Option<String>, BlobError> {
        let Some(signer) = &self.signer else {
            return Ok(None);
        };
        let url = signer
            .signed_url(
                http::Method::GET,
                &Path::from(key),
                ttl.unwrap_or(self.presign_ttl),
            )
            .await?;
        Ok(Some(url.to_string()))
    }
}

fn not_found(key: &str, e: object_store::Error) -> BlobError {
    match e {
        object_store::Error::NotFound { .. } => BlobError::NotFound(key.to_string()),
        other => BlobError::Store(other),
    }
}
