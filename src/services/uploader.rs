use crate::config::UploadSettings;
use crate::error::{AdapterError, Result};
use crate::models::{PutParams, UploadRequest, UploadResult};
use crate::services::digest_tee::DigestTee;
use crate::services::progress::ProgressTracker;
use crate::services::storage::ObjectStore;
use crate::utils::hash::DigestEncoding;
use crate::utils::key::{content_type_for, resolve_key};
use axum::http::{HeaderValue, header::CONTENT_TYPE};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Upload sink: streams each request into the store exactly once.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    settings: UploadSettings,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, settings: UploadSettings) -> Self {
        Self { store, settings }
    }

    /// Uploads `request` and attaches the result to it.
    ///
    /// Exactly one outcome per request: either a fully populated result or a
    /// single error. A source failure wins over the transfer error it causes.
    pub async fn upload<'a>(&self, request: &mut UploadRequest<'a>) -> Result<UploadResult> {
        let key = resolve_key(request, self.settings.directory_prefix.as_deref());
        let content_type = content_type_for(&key);
        debug!("Resolved key {} ({})", key, content_type);

        // Clients often guess the type wrong; store and headers must agree.
        if let Some(headers) = request.headers.as_mut() {
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }

        let source = request.take_source().ok_or_else(|| {
            AdapterError::InvalidState("source stream already consumed".to_string())
        })?;
        let (tee, mut digest) = DigestTee::new(
            source,
            self.settings.digest_algorithm,
            self.settings.max_object_size,
        );

        let params = PutParams::build(
            &self.settings.request_overrides,
            Box::pin(tee),
            &content_type,
            &key,
        )
        .with_content_length(request.content_length);

        let tracker = ProgressTracker::attach(
            self.settings.on_progress.clone(),
            &key,
            request.display_name(),
            request.content_length,
        );

        let raw = match self
            .store
            .put(params, &self.settings.client_options, &tracker)
            .await
        {
            Ok(raw) => raw,
            Err(err) => {
                return Err(digest
                    .take_failure()
                    .unwrap_or(AdapterError::Transfer(err)));
            }
        };

        if let Some(err) = digest.take_failure() {
            return Err(err);
        }
        let digest_value = digest.digest(DigestEncoding::Hex)?;
        let etag = raw.e_tag.as_deref().map(strip_quotes).ok_or_else(|| {
            AdapterError::Transfer(anyhow::anyhow!("store returned no ETag for {}", key))
        })?;

        let result = UploadResult {
            key,
            content_type,
            digest: digest_value,
            digest_algorithm: digest.algorithm(),
            etag,
            raw,
        };

        info!(
            "Uploaded {} to {}/{} ({} bytes, {} {})",
            request.display_name().unwrap_or("stream"),
            result.raw.bucket,
            result.key,
            result.raw.size,
            result.digest_algorithm.as_str(),
            result.digest
        );

        request.result = Some(result.clone());
        Ok(result)
    }

    /// Drains `requests` one at a time, stopping at the first failure.
    pub async fn upload_all<'a, S>(&self, requests: S) -> Result<Vec<UploadRequest<'a>>>
    where
        S: Stream<Item = UploadRequest<'a>> + Send,
    {
        let mut requests = std::pin::pin!(requests);
        let mut completed = Vec::new();

        while let Some(mut request) = requests.next().await {
            self.upload(&mut request).await?;
            completed.push(request);
        }

        Ok(completed)
    }
}

fn strip_quotes(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"abc123\""), "abc123");
        assert_eq!(strip_quotes("abc123"), "abc123");
        assert_eq!(
            strip_quotes("\"9b2cf535f27731c974343645a3985328-3\""),
            "9b2cf535f27731c974343645a3985328-3"
        );
    }
}
