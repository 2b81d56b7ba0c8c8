//! Remote host provider (proxy-manager flavor)
//!
//! Replaces the service container on the target host over SSH, then
//! registers a proxy-host record with a Nginx Proxy Manager instance via
//! its REST API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rapidflow_core::domain::{Deployment, Runnable};

use crate::ssh::{self, SshSession};
use crate::{with_cancel, OutputProvider};

#[derive(Debug, Default)]
pub struct VpsProvider {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VpsConfig {
    host: String,
    ssh_user: String,
    ssh_key_path: String,
    #[serde(default)]
    ssh_port: String,
    nginx_pm_url: String,
    nginx_pm_user: String,
    nginx_pm_pass: String,
    domain: String,
    service_port: String,
    container_name: String,
    image_name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

impl VpsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        config: &VpsConfig,
    ) -> Result<String> {
        let login_url = format!("{}/api/tokens", config.nginx_pm_url);
        let payload = serde_json::json!({
            "identity": config.nginx_pm_user,
            "secret": config.nginx_pm_pass,
        });

        let response = with_cancel(cancel, "proxy-manager auth", async {
            self.client
                .post(&login_url)
                .json(&payload)
                .send()
                .await
                .context("failed to reach Nginx Proxy Manager")
        })
        .await?;

        if response.status().as_u16() != 200 {
            anyhow::bail!(
                "authentication failed with status {}",
                response.status().as_u16()
            );
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("failed to decode token response")?;
        Ok(token.token)
    }

    async fn create_proxy_host(
        &self,
        cancel: &CancellationToken,
        config: &VpsConfig,
        token: &str,
    ) -> Result<()> {
        let hosts_url = format!("{}/api/nginx/proxy-hosts", config.nginx_pm_url);
        // The container is published on the host, so forward locally.
        let payload = serde_json::json!({
            "domain_names": [config.domain],
            "forward_host": "127.0.0.1",
            "forward_port": config.service_port,
            "ssl_enabled": true,
            "ssl_email": config.nginx_pm_user,
            "ssl_force": true,
            "enabled": true,
        });

        let response = with_cancel(cancel, "proxy-host create", async {
            self.client
                .post(&hosts_url)
                .bearer_auth(token)
                .json(&payload)
                .send()
                .await
                .context("failed to reach Nginx Proxy Manager")
        })
        .await?;

        if response.status().as_u16() >= 400 {
            anyhow::bail!(
                "failed to create proxy host, status {}",
                response.status().as_u16()
            );
        }

        info!(
            "Created proxy host for {} forwarding to port {}",
            config.domain, config.service_port
        );
        Ok(())
    }
}

#[async_trait]
impl OutputProvider for VpsProvider {
    fn provider_type(&self) -> &'static str {
        "vps"
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        _runnable: &Runnable,
        deployment: &Deployment,
        _artifact_path: &str,
    ) -> Result<()> {
        let config: VpsConfig =
            serde_json::from_str(&deployment.config).context("invalid VPS config")?;

        info!(
            "Starting VPS deployment to {} for domain {}",
            config.host, config.domain
        );

        let session = SshSession::connect(
            &config.host,
            &config.ssh_user,
            &config.ssh_key_path,
            &config.ssh_port,
        )
        .context("failed to connect to VPS")?;

        ssh::deploy_container(
            &session,
            cancel,
            &config.image_name,
            &config.container_name,
            &config.service_port,
        )
        .await
        .context("failed to deploy container")?;

        let token = self
            .authenticate(cancel, &config)
            .await
            .context("failed to authenticate with Nginx Proxy Manager")?;
        self.create_proxy_host(cancel, &config, &token)
            .await
            .context("failed to configure Nginx Proxy Manager")?;

        info!(
            "Deployed to VPS and configured proxy for {}",
            config.domain
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_requires_proxy_manager_fields() {
        assert!(serde_json::from_str::<VpsConfig>(
            r#"{"host": "vps", "ssh_user": "root", "ssh_key_path": "/k"}"#
        )
        .is_err());

        let config: VpsConfig = serde_json::from_str(
            r#"{"host": "vps", "ssh_user": "root", "ssh_key_path": "/k",
                "nginx_pm_url": "http://vps:81", "nginx_pm_user": "admin",
                "nginx_pm_pass": "secret", "domain": "app.example.com",
                "service_port": "3000", "container_name": "app", "image_name": "app:latest"}"#,
        )
        .unwrap();
        assert_eq!(config.ssh_port, "");
        assert_eq!(config.domain, "app.example.com");
    }
}
