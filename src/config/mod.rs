use crate::error::{AdapterError, Result};
use crate::models::ProgressHandler;
use crate::utils::hash::DigestAlgorithm;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// S3 rejects multipart parts smaller than this (except the last one).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Adapter configuration shared by every operation.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Access key id (default: none, falls back to the SDK credential chain)
    pub access_key: Option<String>,

    /// Secret access key (default: none)
    pub secret_key: Option<String>,

    /// Region (default: "us-east-1")
    pub region: String,

    /// Bucket all keys live in (required)
    pub bucket: String,

    /// Custom endpoint for S3-compatible services such as MinIO
    pub endpoint_url: Option<String>,

    /// Use path-style addressing (default: true when an endpoint is set)
    pub force_path_style: bool,

    /// Directory every generated or derived key is placed under
    pub directory_prefix: Option<String>,

    /// Extra put parameters applied to every upload
    pub request_overrides: RequestOverrides,

    /// Low-level transfer options
    pub client_options: ClientOptions,

    /// Algorithm used for the content digest (default: md5)
    pub digest_algorithm: DigestAlgorithm,

    /// Reject uploads larger than this many bytes (default: unlimited)
    pub max_object_size: Option<u64>,

    /// Lifetime of signed URLs (default: 15 minutes)
    pub signed_url_ttl: Duration,
}

/// Put parameters a caller may set. Key, body and content type are computed
/// by the uploader and deliberately have no field here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub server_side_encryption: Option<String>,
    pub tagging: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl RequestOverrides {
    /// Layers `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(&self, other: &RequestOverrides) -> RequestOverrides {
        let pick = |ours: &Option<String>, theirs: &Option<String>| {
            theirs.clone().or_else(|| ours.clone())
        };

        let mut metadata = self.metadata.clone();
        metadata.extend(other.metadata.clone());

        RequestOverrides {
            cache_control: pick(&self.cache_control, &other.cache_control),
            content_disposition: pick(&self.content_disposition, &other.content_disposition),
            content_encoding: pick(&self.content_encoding, &other.content_encoding),
            content_language: pick(&self.content_language, &other.content_language),
            acl: pick(&self.acl, &other.acl),
            storage_class: pick(&self.storage_class, &other.storage_class),
            server_side_encryption: pick(
                &self.server_side_encryption,
                &other.server_side_encryption,
            ),
            tagging: pick(&self.tagging, &other.tagging),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Size of each multipart part in bytes (default and minimum: 5 MB)
    pub part_size: usize,

    /// Keep already uploaded parts when a multipart upload fails
    pub leave_parts_on_error: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            leave_parts_on_error: false,
        }
    }
}

impl ClientOptions {
    pub fn effective_part_size(&self) -> usize {
        self.part_size.max(MIN_PART_SIZE)
    }
}

/// Per-call upload options; anything set here wins over [`AdapterConfig`].
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub directory_prefix: Option<String>,
    pub request_overrides: Option<RequestOverrides>,
    pub client_options: Option<ClientOptions>,
    pub digest_algorithm: Option<DigestAlgorithm>,
    pub max_object_size: Option<u64>,
    pub on_progress: Option<ProgressHandler>,
}

impl UploadOptions {
    pub fn with_progress<F>(mut self, handler: F) -> Self
    where
        F: Fn(crate::models::ProgressEvent) + Send + Sync + 'static,
    {
        self.on_progress = Some(std::sync::Arc::new(handler));
        self
    }
}

/// Fully merged options for one uploader.
#[derive(Clone)]
pub struct UploadSettings {
    pub directory_prefix: Option<String>,
    pub request_overrides: RequestOverrides,
    pub client_options: ClientOptions,
    pub digest_algorithm: DigestAlgorithm,
    pub max_object_size: Option<u64>,
    pub on_progress: Option<ProgressHandler>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            endpoint_url: None,
            force_path_style: false,
            directory_prefix: None,
            request_overrides: RequestOverrides::default(),
            client_options: ClientOptions::default(),
            digest_algorithm: DigestAlgorithm::Md5,
            max_object_size: None,
            signed_url_ttl: Duration::from_secs(15 * 60),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().and_then(non_empty)
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v.to_lowercase() == "true" || v == "1")
}

impl AdapterConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();
        let endpoint_url = env_opt("S3_ENDPOINT");

        Self {
            access_key: env_opt("S3_ACCESS_KEY"),
            secret_key: env_opt("S3_SECRET_KEY"),
            region: env_opt("S3_REGION").unwrap_or(default.region),
            bucket: env_opt("S3_BUCKET").unwrap_or(default.bucket),
            force_path_style: env_flag("S3_FORCE_PATH_STYLE").unwrap_or(endpoint_url.is_some()),
            endpoint_url,
            directory_prefix: env_opt("S3_DIRECTORY_PREFIX"),
            request_overrides: RequestOverrides {
                cache_control: env_opt("S3_CACHE_CONTROL"),
                acl: env_opt("S3_ACL"),
                storage_class: env_opt("S3_STORAGE_CLASS"),
                server_side_encryption: env_opt("S3_SERVER_SIDE_ENCRYPTION"),
                ..Default::default()
            },
            client_options: ClientOptions {
                part_size: env::var("S3_PART_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(default.client_options.part_size),
                leave_parts_on_error: env_flag("S3_LEAVE_PARTS_ON_ERROR")
                    .unwrap_or(default.client_options.leave_parts_on_error),
            },
            digest_algorithm: env::var("DIGEST_ALGORITHM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.digest_algorithm),
            max_object_size: env::var("MAX_OBJECT_SIZE")
                .ok()
                .and_then(|v| v.parse().ok()),
            signed_url_ttl: env::var("SIGNED_URL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.signed_url_ttl),
        }
    }

    /// Config for a local MinIO instance
    pub fn development() -> Self {
        Self {
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            bucket: "uploads".to_string(),
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            force_path_style: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(AdapterError::Config("a bucket must be configured".to_string()));
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(AdapterError::Config(
                "access key and secret key must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Merges per-call options over the global configuration.
    pub fn upload_settings(&self, options: UploadOptions) -> UploadSettings {
        let request_overrides = match &options.request_overrides {
            Some(overrides) => self.request_overrides.merged_with(overrides),
            None => self.request_overrides.clone(),
        };

        UploadSettings {
            directory_prefix: options
                .directory_prefix
                .or_else(|| self.directory_prefix.clone()),
            request_overrides,
            client_options: options
                .client_options
                .unwrap_or_else(|| self.client_options.clone()),
            digest_algorithm: options.digest_algorithm.unwrap_or(self.digest_algorithm),
            max_object_size: options.max_object_size.or(self.max_object_size),
            on_progress: options.on_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.client_options.part_size, MIN_PART_SIZE);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Md5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_development_config() {
        let config = AdapterConfig::development();
        assert!(config.force_path_style);
        assert_eq!(config.bucket, "uploads");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let config = AdapterConfig {
            bucket: "b".to_string(),
            access_key: Some("key".to_string()),
            ..AdapterConfig::default()
        };
        assert!(matches!(config.validate(), Err(AdapterError::Config(_))));
    }

    #[test]
    fn test_part_size_has_floor() {
        let options = ClientOptions {
            part_size: 1024,
            leave_parts_on_error: false,
        };
        assert_eq!(options.effective_part_size(), MIN_PART_SIZE);
    }

    #[test]
    fn test_per_call_options_win() {
        let config = AdapterConfig {
            directory_prefix: Some("global".to_string()),
            request_overrides: RequestOverrides {
                cache_control: Some("no-cache".to_string()),
                acl: Some("private".to_string()),
                metadata: HashMap::from([("a".to_string(), "1".to_string())]),
                ..Default::default()
            },
            ..AdapterConfig::development()
        };

        let settings = config.upload_settings(UploadOptions {
            directory_prefix: Some("local".to_string()),
            request_overrides: Some(RequestOverrides {
                acl: Some("public-read".to_string()),
                metadata: HashMap::from([("b".to_string(), "2".to_string())]),
                ..Default::default()
            }),
            digest_algorithm: Some(DigestAlgorithm::Sha256),
            ..Default::default()
        });

        assert_eq!(settings.directory_prefix.as_deref(), Some("local"));
        assert_eq!(settings.request_overrides.acl.as_deref(), Some("public-read"));
        assert_eq!(
            settings.request_overrides.cache_control.as_deref(),
            Some("no-cache")
        );
        assert_eq!(settings.request_overrides.metadata.len(), 2);
        assert_eq!(settings.digest_algorithm, DigestAlgorithm::Sha256);
        assert!(settings.on_progress.is_none());
    }

    #[test]
    fn test_global_options_used_when_unset() {
        let config = AdapterConfig {
            directory_prefix: Some("global".to_string()),
            max_object_size: Some(10),
            ..AdapterConfig::development()
        };
        let settings = config.upload_settings(UploadOptions::default());
        assert_eq!(settings.directory_prefix.as_deref(), Some("global"));
        assert_eq!(settings.max_object_size, Some(10));
    }
}
