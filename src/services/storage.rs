use crate::config::{ClientOptions, RequestOverrides};
use crate::models::{
    BodyStream, PutOutput, PutParams, SignedOperation, TransferListener, TransferProgress,
    UploadMode,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, ServerSideEncryption, StorageClass,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::time::Duration;
use tokio_util::io::ReaderStream;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    /// Streams `params.body` into the object at `params.key`. Completes only
    /// after the body has reached end-of-data.
    async fn put<'a>(
        &self,
        params: PutParams<'a>,
        options: &ClientOptions,
        listener: &dyn TransferListener,
    ) -> Result<PutOutput>;

    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Bytes>;
    async fn get_stream(&self, key: &str) -> Result<BodyStream<'static>>;
    async fn signed_url(
        &self,
        operation: SignedOperation,
        key: &str,
        expires_in: Duration,
    ) -> Result<String>;
}

/// Returned by stores when the requested key does not exist.
#[derive(Debug, thiserror::Error)]
#[error("NoSuchKey: {0}")]
pub struct ObjectNotFound(pub String);

fn get_object_error<R>(key: &str, err: SdkError<GetObjectError, R>) -> anyhow::Error
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let missing = err
        .as_service_error()
        .is_some_and(|service| service.is_no_such_key());
    if missing {
        ObjectNotFound(key.to_string()).into()
    } else {
        err.into()
    }
}

/// Pulls fixed-size parts out of a body stream. The multipart path reads one
/// part ahead, so up to two parts are resident while a part is in flight.
pub(crate) struct PartReader<'a> {
    body: BodyStream<'a>,
    buffer: BytesMut,
    part_size: usize,
    exhausted: bool,
}

impl<'a> PartReader<'a> {
    pub(crate) fn new(body: BodyStream<'a>, part_size: usize) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            part_size,
            exhausted: false,
        }
    }

    pub(crate) async fn next_part(&mut self) -> std::io::Result<Option<Bytes>> {
        while !self.exhausted && self.buffer.len() < self.part_size {
            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e),
                None => self.exhausted = true,
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }
        let take = self.part_size.min(self.buffer.len());
        Ok(Some(self.buffer.split_to(take).freeze()))
    }

    /// Polls the body once more when the buffer is empty, so a body that
    /// ends exactly on a part boundary is seen as drained.
    pub(crate) async fn confirm_end(&mut self) -> std::io::Result<()> {
        if self.exhausted || !self.buffer.is_empty() {
            return Ok(());
        }
        match self.body.next().await {
            Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
            Some(Err(e)) => return Err(e),
            None => self.exhausted = true,
        }
        Ok(())
    }

    /// True once the body ended and every buffered byte was handed out.
    pub(crate) fn is_drained(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }
}

macro_rules! with_overrides {
    ($builder:expr, $overrides:expr) => {{
        let o: &RequestOverrides = $overrides;
        $builder
            .set_cache_control(o.cache_control.clone())
            .set_content_disposition(o.content_disposition.clone())
            .set_content_encoding(o.content_encoding.clone())
            .set_content_language(o.content_language.clone())
            .set_acl(o.acl.as_deref().map(ObjectCannedAcl::from))
            .set_storage_class(o.storage_class.as_deref().map(StorageClass::from))
            .set_server_side_encryption(
                o.server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_tagging(o.tagging.clone())
            .set_metadata((!o.metadata.is_empty()).then(|| o.metadata.clone()))
    }};
}

/// Object attributes shared by the single-part and multipart paths.
struct ObjectSpec<'s> {
    key: &'s str,
    content_type: &'s str,
    overrides: &'s RequestOverrides,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    async fn put_single(
        &self,
        spec: &ObjectSpec<'_>,
        data: Bytes,
        listener: &dyn TransferListener,
    ) -> Result<PutOutput> {
        let size = data.len() as u64;
        let builder = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(spec.key)
            .content_type(spec.content_type)
            .content_length(size as i64)
            .body(ByteStream::from(data));

        let res = with_overrides!(builder, spec.overrides).send().await?;

        listener.on_transfer_progress(TransferProgress {
            loaded: size,
            total: Some(size),
        });

        Ok(PutOutput {
            bucket: self.bucket.clone(),
            key: spec.key.to_string(),
            e_tag: res.e_tag().map(str::to_string),
            version_id: res.version_id().map(str::to_string),
            size,
            mode: UploadMode::Single,
            parts: 1,
        })
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        reader: &mut PartReader<'_>,
        listener: &dyn TransferListener,
    ) -> Result<(Vec<CompletedPart>, u64)> {
        let mut completed_parts = Vec::new();
        let mut loaded = 0u64;
        let mut next = Some(first);
        let mut chunk_index = 1;

        while let Some(part) = next.take() {
            let n = part.len() as u64;
            // Read ahead one part so the final one can carry the total.
            let following = reader.next_part().await?;

            let upload_part_res = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(chunk_index)
                .content_length(n as i64)
                .body(ByteStream::from(part))
                .send()
                .await?;

            completed_parts.push(
                CompletedPart::builder()
                    .e_tag(upload_part_res.e_tag().unwrap_or_default())
                    .part_number(chunk_index)
                    .build(),
            );

            loaded += n;
            let total = following.is_none().then_some(loaded);
            listener.on_transfer_progress(TransferProgress { loaded, total });
            tracing::debug!("Uploaded part {} of {} ({} bytes)", chunk_index, key, n);

            chunk_index += 1;
            next = following;
        }

        Ok((completed_parts, loaded))
    }

    async fn put_multipart(
        &self,
        spec: &ObjectSpec<'_>,
        first: Bytes,
        reader: &mut PartReader<'_>,
        options: &ClientOptions,
        listener: &dyn TransferListener,
    ) -> Result<PutOutput> {
        let builder = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(spec.key)
            .content_type(spec.content_type);
        let multipart_upload_res = with_overrides!(builder, spec.overrides).send().await?;

        let upload_id = multipart_upload_res
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?
            .to_string();

        let outcome = async {
            let (completed_parts, size) = self
                .upload_parts(spec.key, &upload_id, first, reader, listener)
                .await?;
            let parts = completed_parts.len() as u32;

            let completed_multipart_upload = CompletedMultipartUpload::builder()
                .set_parts(Some(completed_parts))
                .build();

            let res = self
                .client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(spec.key)
                .upload_id(&upload_id)
                .multipart_upload(completed_multipart_upload)
                .send()
                .await?;

            Ok::<_, anyhow::Error>(PutOutput {
                bucket: self.bucket.clone(),
                key: spec.key.to_string(),
                e_tag: res.e_tag().map(str::to_string),
                version_id: res.version_id().map(str::to_string),
                size,
                mode: UploadMode::Multipart,
                parts,
            })
        }
        .await;

        if outcome.is_err() && !options.leave_parts_on_error {
            tracing::warn!("Aborting multipart upload {} for {}", upload_id, spec.key);
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(spec.key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                tracing::error!(
                    "S3 abort_multipart_upload failed: key={}, upload_id={}, error={:?}",
                    spec.key,
                    upload_id,
                    e
                );
            }
        }

        outcome
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put<'a>(
        &self,
        params: PutParams<'a>,
        options: &ClientOptions,
        listener: &dyn TransferListener,
    ) -> Result<PutOutput> {
        let PutParams {
            key,
            body,
            content_type,
            content_length,
            overrides,
        } = params;
        let spec = ObjectSpec {
            key: &key,
            content_type: &content_type,
            overrides: &overrides,
        };
        let part_size = options.effective_part_size();
        let mut reader = PartReader::new(body, part_size);

        let first = reader.next_part().await?;
        if content_length.is_some_and(|len| len <= part_size as u64) {
            reader.confirm_end().await?;
        }
        if reader.is_drained() {
            return self
                .put_single(&spec, first.unwrap_or_default(), listener)
                .await;
        }

        // Not drained implies a full first part is buffered.
        let first = first.ok_or_else(|| anyhow!("body ended without data"))?;
        self.put_multipart(&spec, first, &mut reader, options, listener)
            .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token)
                .send()
                .await?;

            if let Some(contents) = res.contents {
                for object in contents {
                    if let Some(key) = object.key {
                        objects.push(key);
                    }
                }
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| get_object_error(key, e))?;
        Ok(res.body.collect().await?.into_bytes())
    }

    async fn get_stream(&self, key: &str) -> Result<BodyStream<'static>> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| get_object_error(key, e))?;
        Ok(Box::pin(ReaderStream::new(res.body.into_async_read())))
    }

    async fn signed_url(
        &self,
        operation: SignedOperation,
        key: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let config = PresigningConfig::expires_in(expires_in)?;
        let request = match operation {
            SignedOperation::GetObject => {
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(config)
                    .await?
            }
            SignedOperation::PutObject => {
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(config)
                    .await?
            }
            SignedOperation::DeleteObject => {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(config)
                    .await?
            }
        };
        Ok(request.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> BodyStream<'static> {
        let items: Vec<std::io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_part_reader_rechunks() {
        let mut reader = PartReader::new(body(&["ab", "cdefg", "h"]), 3);
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "abc");
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "def");
        assert!(!reader.is_drained());
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "gh");
        assert!(reader.is_drained());
        assert!(reader.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_part_reader_small_body_is_drained_after_first_part() {
        let mut reader = PartReader::new(body(&["tiny"]), 1024);
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "tiny");
        assert!(reader.is_drained());
    }

    #[tokio::test]
    async fn test_part_reader_confirms_end_on_part_boundary() {
        let mut reader = PartReader::new(body(&["abcd"]), 4);
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "abcd");
        assert!(!reader.is_drained());
        reader.confirm_end().await.unwrap();
        assert!(reader.is_drained());
    }

    #[tokio::test]
    async fn test_part_reader_confirm_end_keeps_extra_data() {
        let mut reader = PartReader::new(body(&["abcd", "ef"]), 4);
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "abcd");
        reader.confirm_end().await.unwrap();
        assert!(!reader.is_drained());
        assert_eq!(reader.next_part().await.unwrap().unwrap(), "ef");
        assert!(reader.is_drained());
    }

    #[tokio::test]
    async fn test_part_reader_empty_body() {
        let mut reader = PartReader::new(body(&[]), 8);
        assert!(reader.next_part().await.unwrap().is_none());
        assert!(reader.is_drained());
    }

    #[tokio::test]
    async fn test_part_reader_surfaces_errors() {
        let items: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(std::io::Error::other("boom")),
        ];
        let mut reader = PartReader::new(Box::pin(futures::stream::iter(items)), 8);
        assert!(reader.next_part().await.is_err());
    }
}
