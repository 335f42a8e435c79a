use crate::config::RequestOverrides;
use crate::utils::hash::DigestAlgorithm;
use axum::http::HeaderMap;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// A lazily read, single-consumer byte stream.
pub type BodyStream<'a> = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'a>>;

pub type ProgressHandler = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// One inbound file transfer.
pub struct UploadRequest<'a> {
    source: Option<BodyStream<'a>>,
    pub source_path: Option<String>,
    pub source_descriptor: Option<String>,
    pub explicit_key: Option<String>,
    pub headers: Option<HeaderMap>,
    /// Byte count known before the transfer starts, if any.
    pub content_length: Option<u64>,
    pub result: Option<UploadResult>,
}

impl<'a> UploadRequest<'a> {
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'a,
    {
        Self {
            source: Some(Box::pin(source)),
            source_path: None,
            source_descriptor: None,
            explicit_key: None,
            headers: None,
            content_length: None,
            result: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.source_descriptor = Some(descriptor.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.explicit_key = Some(key.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    /// Hands out the source stream; `None` once it has been consumed.
    pub fn take_source(&mut self) -> Option<BodyStream<'a>> {
        self.source.take()
    }

    pub fn is_consumed(&self) -> bool {
        self.source.is_none()
    }

    /// Best name for display purposes, independent of the resolved key.
    pub fn display_name(&self) -> Option<&str> {
        self.source_descriptor
            .as_deref()
            .or(self.source_path.as_deref())
            .or(self.explicit_key.as_deref())
    }
}

impl UploadRequest<'static> {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        UploadRequest::new(futures::stream::iter([Ok(data)])).with_content_length(len)
    }
}

impl fmt::Debug for UploadRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("consumed", &self.is_consumed())
            .field("source_path", &self.source_path)
            .field("source_descriptor", &self.source_descriptor)
            .field("explicit_key", &self.explicit_key)
            .field("content_length", &self.content_length)
            .field("result", &self.result)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub key: String,
    pub content_type: String,
    pub digest: String,
    pub digest_algorithm: DigestAlgorithm,
    /// Backend integrity tag without wrapping quotes. Not the same as
    /// `digest` for multipart uploads.
    pub etag: String,
    pub raw: PutOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub request_id: String,
    pub key: String,
    pub name: Option<String>,
    pub bytes_written: u64,
    pub bytes_total: Option<u64>,
    pub percent: u8,
}

/// Raw transfer notification from a storage client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

/// Receives transfer notifications while a put is in flight.
pub trait TransferListener: Send + Sync {
    fn on_transfer_progress(&self, progress: TransferProgress);
}

/// Parameters of one streaming put.
pub struct PutParams<'a> {
    pub key: String,
    pub body: BodyStream<'a>,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub overrides: RequestOverrides,
}

impl<'a> PutParams<'a> {
    /// Applies the put precedence: caller overrides, then the computed body
    /// and content type, then the resolved key. Only the typed override
    /// fields can come from the caller.
    pub fn build(
        overrides: &RequestOverrides,
        body: BodyStream<'a>,
        content_type: &str,
        key: &str,
    ) -> Self {
        Self {
            overrides: overrides.clone(),
            body,
            content_type: content_type.to_string(),
            content_length: None,
            key: key.to_string(),
        }
    }

    pub fn with_content_length(mut self, len: Option<u64>) -> Self {
        self.content_length = len;
        self
    }
}

impl fmt::Debug for PutParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutParams")
            .field("key", &self.key)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Single,
    Multipart,
}

/// Completion payload of a put, as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutOutput {
    pub bucket: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub version_id: Option<String>,
    pub size: u64,
    pub mode: UploadMode,
    pub parts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedOperation {
    GetObject,
    PutObject,
    DeleteObject,
}

impl std::str::FromStr for SignedOperation {
    type Err = crate::error::AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "getObject" | "get_object" | "get" => Ok(SignedOperation::GetObject),
            "putObject" | "put_object" | "put" => Ok(SignedOperation::PutObject),
            "deleteObject" | "delete_object" | "delete" => Ok(SignedOperation::DeleteObject),
            other => Err(crate::error::AdapterError::Config(format!(
                "unsupported signed operation '{}'",
                other
            ))),
        }
    }
}
