use crate::config::{ClientOptions, RequestOverrides};
use crate::models::{
    BodyStream, PutOutput, PutParams, SignedOperation, TransferListener, TransferProgress,
    UploadMode,
};
use crate::services::storage::{ObjectNotFound, ObjectStore};
use crate::utils::hash::{DigestAlgorithm, calculate_hash};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: String,
    pub overrides: RequestOverrides,
    pub e_tag: String,
}

/// Process-local store for development and tests. ETags are quoted MD5s of
/// the content, as S3 reports them for single-part uploads.
pub struct InMemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl InMemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    fn objects(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put<'a>(
        &self,
        params: PutParams<'a>,
        _options: &ClientOptions,
        listener: &dyn TransferListener,
    ) -> Result<PutOutput> {
        let PutParams {
            key,
            mut body,
            content_type,
            content_length,
            overrides,
        } = params;

        let mut data = BytesMut::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
            listener.on_transfer_progress(TransferProgress {
                loaded: data.len() as u64,
                total: content_length,
            });
        }

        let data = data.freeze();
        let size = data.len() as u64;
        listener.on_transfer_progress(TransferProgress {
            loaded: size,
            total: Some(size),
        });

        let e_tag = format!("\"{}\"", calculate_hash(DigestAlgorithm::Md5, &data));
        self.objects()?.insert(
            key.clone(),
            StoredObject {
                data,
                content_type,
                overrides,
                e_tag: e_tag.clone(),
            },
        );

        Ok(PutOutput {
            bucket: self.bucket.clone(),
            key,
            e_tag: Some(e_tag),
            version_id: None,
            size,
            mode: UploadMode::Single,
            parts: 1,
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects()?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 treats deleting a missing key as success.
        self.objects()?.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects()?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| ObjectNotFound(key.to_string()).into())
    }

    async fn get_stream(&self, key: &str) -> Result<BodyStream<'static>> {
        let data = self.get(key).await?;
        Ok(Box::pin(futures::stream::iter([Ok(data)])))
    }

    async fn signed_url(
        &self,
        operation: SignedOperation,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let method = match operation {
            SignedOperation::GetObject => "GET",
            SignedOperation::PutObject => "PUT",
            SignedOperation::DeleteObject => "DELETE",
        };
        Ok(format!(
            "memory://{}/{}?method={}&expires={}",
            self.bucket,
            key,
            method,
            expires_in.as_secs()
        ))
    }
}
