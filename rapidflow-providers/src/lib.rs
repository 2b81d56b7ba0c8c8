//! RapidFlow output providers
//!
//! Pluggable sinks that publish a runnable's artifact to one destination.
//! Providers are stateless; configuration arrives per call as the
//! deployment row's JSON bag. A single instance per type is registered at
//! process start.

pub mod email;
pub mod local;
pub mod nginx;
pub mod s3;
pub mod ssh;
pub mod vps;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rapidflow_core::domain::{Deployment, Runnable};

/// A deployment output destination.
#[async_trait]
pub trait OutputProvider: Send + Sync {
    /// Tag the provider is registered under (the deployment `output_type`).
    fn provider_type(&self) -> &'static str;

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        runnable: &Runnable,
        deployment: &Deployment,
        artifact_path: &str,
    ) -> Result<()>;
}

/// Keyed lookup from output-type tag to provider.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn OutputProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in provider registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(s3::S3Provider::new()));
        registry.register(Arc::new(email::EmailProvider::new()));
        registry.register(Arc::new(webhook::WebhookProvider::new()));
        registry.register(Arc::new(local::LocalProvider::new()));
        registry.register(Arc::new(vps::VpsProvider::new()));
        registry.register(Arc::new(nginx::NginxProvider::new()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn OutputProvider>) {
        self.providers.insert(provider.provider_type(), provider);
    }

    pub fn lookup(&self, provider_type: &str) -> Option<Arc<dyn OutputProvider>> {
        self.providers.get(provider_type).cloned()
    }
}

/// Run a provider future, aborting when the job's token fires.
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => anyhow::bail!("{} cancelled", what),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_register_all_types() {
        let registry = ProviderRegistry::with_defaults();
        for tag in ["s3", "email", "webhook", "local", "vps", "nginx"] {
            assert!(registry.lookup(tag).is_some(), "missing provider {}", tag);
        }
    }

    #[test]
    fn test_lookup_miss() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.lookup("carrier-pigeon").is_none());
    }

    #[test]
    fn test_register_overrides_by_type() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(local::LocalProvider::new()));
        registry.register(Arc::new(local::LocalProvider::new()));
        assert!(registry.lookup("local").is_some());
    }
}
