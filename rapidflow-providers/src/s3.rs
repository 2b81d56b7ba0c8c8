//! Object-store provider
//!
//! Uploads the artifact file to S3 using credentials from the deployment
//! config, never ambient AWS configuration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rapidflow_core::domain::{Deployment, Runnable};

use crate::{with_cancel, OutputProvider};

#[derive(Debug, Default)]
pub struct S3Provider;

#[derive(Debug, Deserialize)]
struct S3Config {
    bucket: String,
    key: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl S3Provider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputProvider for S3Provider {
    fn provider_type(&self) -> &'static str {
        "s3"
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        _runnable: &Runnable,
        deployment: &Deployment,
        artifact_path: &str,
    ) -> Result<()> {
        let config: S3Config =
            serde_json::from_str(&deployment.config).context("invalid S3 config")?;

        if !std::path::Path::new(artifact_path).exists() {
            anyhow::bail!("artifact file does not exist: {}", artifact_path);
        }

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "rapidflow-deployment",
        );
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        let client = aws_sdk_s3::Client::new(&aws_config);

        let body = ByteStream::from_path(artifact_path)
            .await
            .context("failed to open artifact file")?;

        with_cancel(cancel, "s3 upload", async {
            client
                .put_object()
                .bucket(&config.bucket)
                .key(&config.key)
                .body(body)
                .send()
                .await
                .context("failed to upload to S3")
        })
        .await?;

        info!(
            "Uploaded {} to s3://{}/{}",
            artifact_path, config.bucket, config.key
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_all_fields() {
        assert!(serde_json::from_str::<S3Config>(r#"{"bucket": "b"}"#).is_err());

        let config: S3Config = serde_json::from_str(
            r#"{"bucket": "b", "key": "k", "region": "eu-west-1",
                "access_key_id": "AK", "secret_access_key": "SK"}"#,
        )
        .unwrap();
        assert_eq!(config.bucket, "b");
        assert_eq!(config.region, "eu-west-1");
    }
}
