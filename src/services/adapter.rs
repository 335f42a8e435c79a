use crate::config::{AdapterConfig, UploadOptions};
use crate::error::{AdapterError, Result};
use crate::models::{BodyStream, SignedOperation};
use crate::services::storage::{ObjectNotFound, ObjectStore};
use crate::services::uploader::Uploader;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// S3 caps presigned URL lifetimes at one week.
pub const MAX_SIGNED_URL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Host-facing facade. Uploads go through an [`Uploader`]; everything else
/// is a single store call.
#[derive(Clone)]
pub struct Adapter {
    store: Arc<dyn ObjectStore>,
    config: AdapterConfig,
}

impl Adapter {
    pub fn new(store: Arc<dyn ObjectStore>, config: AdapterConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Keys under `dirname`, relative to it. `None` lists the whole bucket.
    pub async fn ls(&self, dirname: Option<&str>) -> Result<Vec<String>> {
        let dirname = dirname.unwrap_or_default().trim_matches('/');
        let prefix = if dirname.is_empty() {
            String::new()
        } else {
            format!("{}/", dirname)
        };

        let keys = self
            .store
            .list(&prefix)
            .await
            .map_err(AdapterError::Storage)?;

        Ok(keys
            .into_iter()
            .map(|key| match key.strip_prefix(&prefix) {
                Some(relative) => relative.to_string(),
                None => key,
            })
            .collect())
    }

    pub async fn rm(&self, key: &str) -> Result<()> {
        self.store.delete(key).await.map_err(AdapterError::Storage)?;
        tracing::info!("Removed {}/{}", self.store.bucket(), key);
        Ok(())
    }

    /// Whole object, buffered.
    pub async fn read(&self, key: &str) -> Result<Bytes> {
        self.store.get(key).await.map_err(storage_error)
    }

    /// Object contents as a lazily read stream.
    pub async fn read_stream(&self, key: &str) -> Result<BodyStream<'static>> {
        self.store.get_stream(key).await.map_err(storage_error)
    }

    pub async fn url(
        &self,
        operation: SignedOperation,
        key: &str,
        expires_in: Option<Duration>,
    ) -> Result<String> {
        let expires_in = expires_in.unwrap_or(self.config.signed_url_ttl);
        if expires_in.is_zero() || expires_in > MAX_SIGNED_URL_TTL {
            return Err(AdapterError::Config(format!(
                "signed URL lifetime must be between 1s and {}s",
                MAX_SIGNED_URL_TTL.as_secs()
            )));
        }

        self.store
            .signed_url(operation, key, expires_in)
            .await
            .map_err(AdapterError::Storage)
    }

    /// Uploader bound to the global config merged with `options`.
    pub fn receive(&self, options: UploadOptions) -> Uploader {
        Uploader::new(self.store.clone(), self.config.upload_settings(options))
    }
}

fn storage_error(err: anyhow::Error) -> AdapterError {
    match err.downcast::<ObjectNotFound>() {
        Ok(ObjectNotFound(key)) => AdapterError::NotFound(key),
        Err(err) => AdapterError::Storage(err),
    }
}
