//! Process-wide adapter lookup.
//!
//! Built once by the composition root, then read-only. `fetch_events`
//! transparently runs the adapter's (idempotent) `initialize` before the
//! fetch, so callers never sequence the handshake themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use agora_core::Platform;
use tracing::debug;

use crate::{
    EventbriteAdapter, FetchError, FetchOpts, FetchOutcome, FetchResult, LumaAdapter,
    MeetupAdapter, ProviderAdapter, ProviderEnv,
};

const LOG_TARGET: &str = "agora::provider::registry";

pub struct ProviderRegistry {
    adapters: BTreeMap<Platform, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// All built-in adapters, in one call.
    pub fn with_default_adapters() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MeetupAdapter::new()));
        registry.register(Arc::new(EventbriteAdapter::new()));
        registry.register(Arc::new(LumaAdapter::new()));
        registry
    }

    /// Startup-time registration; the registry is read-only afterwards.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        debug!(
            target: LOG_TARGET,
            platform = %adapter.platform(),
            "Registered provider adapter"
        );
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get_all_adapters(&self) -> impl Iterator<Item = &Arc<dyn ProviderAdapter>> {
        self.adapters.values()
    }

    pub fn get_configured_adapters<'r>(
        &'r self,
        env: &'r ProviderEnv,
    ) -> impl Iterator<Item = &'r Arc<dyn ProviderAdapter>> {
        self.adapters
            .values()
            .filter(move |adapter| adapter.is_configured(env))
    }

    pub fn get_adapter(&self, platform: Platform) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&platform)
    }

    /// Resolve, initialize (first use only, adapters cache their credential)
    /// and fetch.
    pub async fn fetch_events(
        &self,
        platform: Platform,
        platform_id: &str,
        env: &ProviderEnv,
        opts: &FetchOpts,
    ) -> FetchResult<FetchOutcome> {
        let adapter = self
            .get_adapter(platform)
            .ok_or(FetchError::NotConfigured { platform })?;
        if !adapter.is_configured(env) {
            return Err(FetchError::NotConfigured { platform });
        }
        adapter.initialize(env).await?;
        adapter.fetch_events(platform_id, opts).await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_default_adapters()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_every_syncable_platform() {
        let registry = ProviderRegistry::with_default_adapters();
        for platform in Platform::ALL {
            if platform.is_syncable() {
                assert!(registry.get_adapter(platform).is_some(), "{platform}");
            } else {
                assert!(registry.get_adapter(platform).is_none(), "{platform}");
            }
        }
    }

    #[test]
    fn configured_filter_respects_env() {
        let registry = ProviderRegistry::with_default_adapters();
        let empty = ProviderEnv::default();
        assert_eq!(registry.get_configured_adapters(&empty).count(), 0);

        let env = ProviderEnv {
            eventbrite_token: Some("token".to_string()),
            ..Default::default()
        };
        let configured: Vec<_> = registry
            .get_configured_adapters(&env)
            .map(|a| a.platform())
            .collect();
        assert_eq!(configured, vec![Platform::Eventbrite]);
    }

    #[tokio::test]
    async fn fetch_on_unconfigured_platform_is_not_configured() {
        let registry = ProviderRegistry::with_default_adapters();
        let err = registry
            .fetch_events(
                Platform::Meetup,
                "rustaceans",
                &ProviderEnv::default(),
                &FetchOpts::default(),
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, FetchError::NotConfigured { .. }));
    }
}
