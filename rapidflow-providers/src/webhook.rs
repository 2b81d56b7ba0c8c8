//! Webhook provider
//!
//! Sends the artifact file as the request body; HTTP status >= 400 is a
//! failure.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rapidflow_core::domain::{Deployment, Runnable};

use crate::{with_cancel, OutputProvider};

#[derive(Debug, Default)]
pub struct WebhookProvider {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
}

impl WebhookProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutputProvider for WebhookProvider {
    fn provider_type(&self) -> &'static str {
        "webhook"
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        _runnable: &Runnable,
        deployment: &Deployment,
        artifact_path: &str,
    ) -> Result<()> {
        let config: WebhookConfig =
            serde_json::from_str(&deployment.config).context("invalid webhook config")?;

        let body = tokio::fs::read(artifact_path)
            .await
            .with_context(|| format!("failed to open artifact: {}", artifact_path))?;

        let method = reqwest::Method::from_bytes(config.method.to_uppercase().as_bytes())
            .with_context(|| format!("invalid webhook method: {}", config.method))?;

        let mut request = self.client.request(method, &config.url).body(body);
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }

        let response = with_cancel(cancel, "webhook request", async {
            request.send().await.context("webhook request failed")
        })
        .await?;

        if response.status().as_u16() >= 400 {
            anyhow::bail!("webhook returned status {}", response.status().as_u16());
        }

        info!("Sent webhook to {}", config.url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses_headers() {
        let config: WebhookConfig = serde_json::from_str(
            r#"{"url": "http://example.invalid/hook", "method": "post", "headers": {"X-Token": "t"}}"#,
        )
        .unwrap();
        assert_eq!(config.url, "http://example.invalid/hook");
        assert_eq!(config.headers.get("X-Token").unwrap(), "t");
    }

    #[test]
    fn test_missing_url_is_invalid() {
        assert!(serde_json::from_str::<WebhookConfig>(r#"{"method": "POST"}"#).is_err());
    }
}
