//! Email provider
//!
//! Delivers a notification for the artifact over one of three transports:
//! SMTP, AWS SES, or a JSON HTTP API. Every transport appends a trailing
//! `Artifact: {path}` line to the configured body.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sesv2::config::{Credentials, Region};
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rapidflow_core::domain::{Deployment, Runnable};

use crate::{with_cancel, OutputProvider};

#[derive(Debug, Default)]
pub struct EmailProvider {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmailConfig {
    transport: String,

    // SMTP
    #[serde(default)]
    smtp_host: String,
    #[serde(default)]
    smtp_port: Option<u16>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,

    // AWS SES
    #[serde(default)]
    region: String,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    secret_access_key: String,

    // HTTP API
    #[serde(default)]
    api_url: String,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    headers: HashMap<String, String>,

    from: String,
    to: Vec<String>,
    subject: String,
    #[serde(default)]
    body: String,
}

/// Body with the trailing artifact line every transport sends.
fn body_with_artifact(body: &str, artifact_path: &str) -> String {
    format!("{}\r\n\r\nArtifact: {}", body, artifact_path)
}

impl EmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send_via_smtp(
        &self,
        cancel: &CancellationToken,
        config: &EmailConfig,
        artifact_path: &str,
    ) -> Result<()> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid from address: {}", config.from))?;

        let mut builder = lettre::Message::builder()
            .from(from)
            .subject(&config.subject);
        for to in &config.to {
            builder = builder.to(to
                .parse()
                .with_context(|| format!("invalid to address: {}", to))?);
        }
        let message = builder
            .body(body_with_artifact(&config.body, artifact_path))
            .context("failed to compose email")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .context("invalid SMTP host")?
            .port(config.smtp_port.unwrap_or(587))
            .credentials(SmtpCredentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        with_cancel(cancel, "smtp send", async {
            transport
                .send(message)
                .await
                .context("failed to send email via SMTP")
        })
        .await?;

        info!(
            "Sent email to {:?} with subject '{}' for artifact {}",
            config.to, config.subject, artifact_path
        );
        Ok(())
    }

    async fn send_via_ses(
        &self,
        cancel: &CancellationToken,
        config: &EmailConfig,
        artifact_path: &str,
    ) -> Result<()> {
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
        let client = aws_sdk_sesv2::Client::new(&aws_config);

        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(Content::builder().data(&config.subject).build()?)
                    .body(
                        Body::builder()
                            .text(
                                Content::builder()
                                    .data(body_with_artifact(&config.body, artifact_path))
                                    .build()?,
                            )
                            .build(),
                    )
                    .build(),
            )
            .build();

        with_cancel(cancel, "ses send", async {
            client
                .send_email()
                .from_email_address(&config.from)
                .destination(
                    Destination::builder()
                        .set_to_addresses(Some(config.to.clone()))
                        .build(),
                )
                .content(content)
                .send()
                .await
                .context("failed to send email via SES")
        })
        .await?;

        info!(
            "Sent email via SES to {:?} with subject '{}' for artifact {}",
            config.to, config.subject, artifact_path
        );
        Ok(())
    }

    async fn send_via_http(
        &self,
        cancel: &CancellationToken,
        config: &EmailConfig,
        artifact_path: &str,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "from": config.from,
            "to": config.to,
            "subject": config.subject,
            "body": body_with_artifact(&config.body, artifact_path),
        });

        let mut request = self.client.post(&config.api_url).json(&payload);
        if !config.api_key.is_empty() {
            request = request.bearer_auth(&config.api_key);
        }
        for (key, value) in &config.headers {
            request = request.header(key, value);
        }

        let response = with_cancel(cancel, "email http request", async {
            request.send().await.context("HTTP request failed")
        })
        .await?;

        if response.status().as_u16() >= 400 {
            anyhow::bail!("HTTP API returned status {}", response.status().as_u16());
        }

        info!(
            "Sent email via HTTP API to {:?} with subject '{}' for artifact {}",
            config.to, config.subject, artifact_path
        );
        Ok(())
    }
}

#[async_trait]
impl OutputProvider for EmailProvider {
    fn provider_type(&self) -> &'static str {
        "email"
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        _runnable: &Runnable,
        deployment: &Deployment,
        artifact_path: &str,
    ) -> Result<()> {
        let config: EmailConfig =
            serde_json::from_str(&deployment.config).context("invalid email config")?;

        if !std::path::Path::new(artifact_path).exists() {
            anyhow::bail!("artifact file does not exist: {}", artifact_path);
        }

        match config.transport.to_lowercase().as_str() {
            "smtp" => self.send_via_smtp(cancel, &config, artifact_path).await,
            "ses" => self.send_via_ses(cancel, &config, artifact_path).await,
            "http" => self.send_via_http(cancel, &config, artifact_path).await,
            other => anyhow::bail!(
                "unsupported email transport: {} (supported: smtp, ses, http)",
                other
            ),
        }
    }
}
