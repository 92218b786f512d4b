//! Everything a command needs, built once from [`AppConfig`].

use std::sync::Arc;

use anyhow::Context;
use clipp_core::{AppConfig, StoreConfig, StoresFile};
use clipp_sources::{
    build_sources, CouponCache, CouponFinder, JsonFileStore, KeyValueStore, RetryPolicy,
    SourceSettings, COMMUNITY_NAMESPACE, DISCOVERY_NAMESPACE,
};

pub(crate) struct AppContext {
    pub(crate) config: AppConfig,
    pub(crate) stores: StoresFile,
    kv: Arc<dyn KeyValueStore>,
}

impl AppContext {
    /// Loads the stores file, validates selector overrides, and opens the
    /// cache file.
    ///
    /// # Errors
    ///
    /// Returns an error if the stores file is missing or invalid, or the
    /// cache file cannot be opened.
    pub(crate) fn load(config: AppConfig) -> anyhow::Result<Self> {
        let stores = clipp_core::load_stores(&config.stores_path).with_context(|| {
            format!("loading stores from {}", config.stores_path.display())
        })?;
        clipp_page::validate_store_selectors(&stores).context("validating store selectors")?;

        let kv = JsonFileStore::open(&config.cache_path).with_context(|| {
            format!("opening cache file {}", config.cache_path.display())
        })?;
        tracing::debug!(
            env = %config.env,
            stores = stores.stores.len(),
            sources = stores.coupon_sources.len(),
            "configuration loaded"
        );

        Ok(Self {
            config,
            stores,
            kv: Arc::new(kv),
        })
    }

    /// Looks up an active store by id.
    pub(crate) fn store(&self, store_id: &str) -> anyhow::Result<&StoreConfig> {
        let store = self.stores.store(store_id).ok_or_else(|| {
            anyhow::anyhow!("store '{store_id}' not found; run `clipp stores` to list them")
        })?;
        anyhow::ensure!(store.active, "store '{store_id}' is inactive");
        Ok(store)
    }

    pub(crate) fn discovery_cache(&self) -> CouponCache {
        CouponCache::new(
            Arc::clone(&self.kv),
            DISCOVERY_NAMESPACE,
            self.config.discovery_ttl(),
        )
    }

    pub(crate) fn community_cache(&self) -> CouponCache {
        CouponCache::new(
            Arc::clone(&self.kv),
            COMMUNITY_NAMESPACE,
            self.config.community_ttl(),
        )
    }

    pub(crate) fn finder(&self) -> anyhow::Result<CouponFinder> {
        let settings = SourceSettings::new(
            &self.config.user_agent,
            self.config.source_timeout(),
            RetryPolicy {
                max_retries: self.config.source_max_retries,
                backoff_base_ms: self.config.source_backoff_base_ms,
            },
        )
        .context("building HTTP client")?;
        let sources = build_sources(
            self.stores.active_sources(),
            &settings,
            self.community_cache(),
        );
        Ok(CouponFinder::new(sources, self.discovery_cache())
            .with_source_timeout(self.config.source_timeout())
            .with_max_results(self.config.max_results)
            .with_fallback(self.config.use_fallback))
    }
}
