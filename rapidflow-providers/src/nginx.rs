//! Remote host provider (native nginx flavor)
//!
//! Replaces the service container over SSH like the proxy-manager flavor,
//! then writes a virtual-host file, installs it under the configured
//! sites directory, tests the configuration, and reloads nginx.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rapidflow_core::domain::{Deployment, Runnable};

use crate::ssh::{self, SshSession};
use crate::OutputProvider;

const DEFAULT_CONFIG_PATH: &str = "/etc/nginx/sites-enabled";
const DEFAULT_RESTART_CMD: &str = "systemctl restart nginx";

#[derive(Debug, Default)]
pub struct NginxProvider;

#[derive(Debug, Deserialize)]
struct NginxConfig {
    host: String,
    ssh_user: String,
    ssh_key_path: String,
    #[serde(default)]
    ssh_port: String,
    domain: String,
    service_port: String,
    container_name: String,
    image_name: String,
    #[serde(default)]
    nginx_config_path: String,
    #[serde(default)]
    nginx_restart_cmd: String,
    #[serde(default)]
    ssl: bool,
    #[serde(default)]
    ssl_cert_path: String,
    #[serde(default)]
    ssl_key_path: String,
}

impl NginxProvider {
    pub fn new() -> Self {
        Self
    }

    async fn configure_nginx(
        &self,
        cancel: &CancellationToken,
        session: &SshSession,
        config: &NginxConfig,
    ) -> Result<()> {
        let vhost = generate_vhost(config);

        let file_name = format!("{}.conf", config.domain);
        let upload_path = format!("/tmp/{}", file_name);
        session
            .upload(cancel, &vhost, &upload_path)
            .await
            .context("failed to upload nginx config")?;

        let config_path = if config.nginx_config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            &config.nginx_config_path
        };
        let restart_cmd = if config.nginx_restart_cmd.is_empty() {
            DEFAULT_RESTART_CMD
        } else {
            &config.nginx_restart_cmd
        };

        let target_path = format!("{}/{}", config_path, file_name);
        let commands = [
            format!("sudo mv {} {}", upload_path, target_path),
            format!("sudo chown root:root {}", target_path),
            format!("sudo chmod 644 {}", target_path),
            "sudo nginx -t".to_string(),
            restart_cmd.to_string(),
        ];

        for command in &commands {
            session
                .run_command(cancel, command)
                .await
                .with_context(|| format!("failed to execute command '{}'", command))?;
        }

        info!(
            "Configured nginx for domain {} on {}",
            config.domain, config.host
        );
        Ok(())
    }
}

/// Single virtual-host file; HTTP-only or redirect-plus-HTTPS depending on
/// the `ssl` flag.
fn generate_vhost(config: &NginxConfig) -> String {
    if config.ssl {
        format!(
            r#"server {{
    listen 80;
    server_name {domain};
    return 301 https://$server_name$request_uri;
}}

server {{
    listen 443 ssl http2;
    server_name {domain};

    ssl_certificate {cert};
    ssl_certificate_key {key};
    ssl_protocols TLSv1.2 TLSv1.3;
    ssl_ciphers ECDHE-RSA-AES128-GCM-SHA256:ECDHE-RSA-AES256-GCM-SHA384;
    ssl_prefer_server_ciphers off;

    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}"#,
            domain = config.domain,
            cert = config.ssl_cert_path,
            key = config.ssl_key_path,
            port = config.service_port,
        )
    } else {
        format!(
            r#"server {{
    listen 80;
    server_name {domain};

    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
}}"#,
            domain = config.domain,
            port = config.service_port,
        )
    }
}

#[async_trait]
impl OutputProvider for NginxProvider {
    fn provider_type(&self) -> &'static str {
        "nginx"
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        _runnable: &Runnable,
        deployment: &Deployment,
        _artifact_path: &str,
    ) -> Result<()> {
        let config: NginxConfig =
            serde_json::from_str(&deployment.config).context("invalid nginx config")?;

        info!(
            "Starting nginx deployment to {} for domain {}",
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

        self.configure_nginx(cancel, &session, &config)
            .await
            .context("failed to configure nginx")?;

        info!(
            "Deployed to VPS and configured nginx for {}",
            config.domain
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ssl: bool) -> NginxConfig {
        NginxConfig {
            host: "vps".to_string(),
            ssh_user: "root".to_string(),
            ssh_key_path: "/k".to_string(),
            ssh_port: String::new(),
            domain: "app.example.com".to_string(),
            service_port: "3000".to_string(),
            container_name: "app".to_string(),
            image_name: "app:latest".to_string(),
            nginx_config_path: String::new(),
            nginx_restart_cmd: String::new(),
            ssl,
            ssl_cert_path: "/etc/ssl/cert.pem".to_string(),
            ssl_key_path: "/etc/ssl/key.pem".to_string(),
        }
    }

    #[test]
    fn test_plain_vhost() {
        let vhost = generate_vhost(&config(false));
        assert!(vhost.contains("listen 80;"));
        assert!(vhost.contains("server_name app.example.com;"));
        assert!(vhost.contains("proxy_pass http://127.0.0.1:3000;"));
        assert!(!vhost.contains("443"));
    }

    #[test]
    fn test_ssl_vhost_redirects_http() {
        let vhost = generate_vhost(&config(true));
        assert!(vhost.contains("return 301 https://$server_name$request_uri;"));
        assert!(vhost.contains("listen 443 ssl http2;"));
        assert!(vhost.contains("ssl_certificate /etc/ssl/cert.pem;"));
        assert!(vhost.contains("ssl_certificate_key /etc/ssl/key.pem;"));
    }

    #[test]
    fn test_defaults_applied_at_deploy_time() {
        let parsed: NginxConfig = serde_json::from_str(
            r#"{"host": "vps", "ssh_user": "root", "ssh_key_path": "/k",
                "domain": "d.example.com", "service_port": "8080",
                "container_name": "c", "image_name": "i"}"#,
        )
        .unwrap();
        assert_eq!(parsed.nginx_config_path, "");
        assert_eq!(parsed.nginx_restart_cmd, "");
        assert!(!parsed.ssl);
    }
}
