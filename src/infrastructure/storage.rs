use crate::config::AdapterConfig;
use crate::error::Result;
use crate::services::storage::S3ObjectStore;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AdapterConfig) -> Result<Arc<S3ObjectStore>> {
    config.validate()?;

    info!(
        "☁️  S3 Storage: {} (Bucket: {}, Region: {})",
        config.endpoint_url.as_deref().unwrap_or("aws"),
        config.bucket,
        config.region
    );

    let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));
    if let Some(endpoint_url) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "static",
        ));
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.force_path_style)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    Ok(Arc::new(S3ObjectStore::new(s3_client, config.bucket.clone())))
}
