//! Multi-source coupon lookup with write-through caching.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clipp_core::{Coupon, DiscountKind, StoreConfig, MAX_RESULTS_CAP};
use futures::future::join_all;

use crate::cache::CouponCache;
use crate::error::SourceError;
use crate::sources::CouponSource;

pub const FALLBACK_SOURCE: &str = "fallback";
const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Result of one lookup, with enough detail for the caller to report on it.
#[derive(Debug, Clone, Default)]
pub struct FindOutcome {
    pub coupons: Vec<Coupon>,
    pub from_cache: bool,
    /// Names of the sources that failed or timed out.
    pub failed_sources: Vec<String>,
    /// `true` when `coupons` is the built-in demo set.
    pub fallback: bool,
}

/// Queries the configured sources for a store and caches the ranked result.
pub struct CouponFinder {
    sources: Vec<Arc<dyn CouponSource>>,
    cache: CouponCache,
    source_timeout: Duration,
    max_results: usize,
    use_fallback: bool,
}

impl CouponFinder {
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn CouponSource>>, cache: CouponCache) -> Self {
        Self {
            sources,
            cache,
            source_timeout: Duration::from_secs(10),
            max_results: MAX_RESULTS_CAP,
            use_fallback: false,
        }
    }

    #[must_use]
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    /// Clamped to `1..=10`.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.clamp(1, MAX_RESULTS_CAP);
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, use_fallback: bool) -> Self {
        self.use_fallback = use_fallback;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &CouponCache {
        &self.cache
    }

    pub async fn find_coupons(&self, store: &StoreConfig) -> Vec<Coupon> {
        self.find_coupons_detailed(store).await.coupons
    }

    /// Cache first; on a miss, queries every source concurrently, merges,
    /// ranks, truncates and writes non-empty results back.
    pub async fn find_coupons_detailed(&self, store: &StoreConfig) -> FindOutcome {
        if let Some(cached) = self.cache.get(&store.store_id) {
            tracing::info!(
                store = %store.store_id,
                count = cached.len(),
                "serving coupons from cache"
            );
            return FindOutcome {
                coupons: cached,
                from_cache: true,
                ..FindOutcome::default()
            };
        }
        self.fetch_fresh(store).await
    }

    /// Drops the cached entry and queries the sources again.
    pub async fn refresh(&self, store: &StoreConfig) -> FindOutcome {
        if let Err(e) = self.cache.invalidate(&store.store_id) {
            tracing::warn!(store = %store.store_id, error = %e, "failed to invalidate cache entry");
        }
        self.fetch_fresh(store).await
    }

    async fn fetch_fresh(&self, store: &StoreConfig) -> FindOutcome {
        let timeout = self.source_timeout;
        let fetches = self.sources.iter().map(|source| async move {
            let result = match tokio::time::timeout(timeout, source.fetch(store)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout {
                    source_name: source.name().to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };
            (source.name().to_string(), result)
        });
        let results = join_all(fetches).await;

        let mut all = Vec::new();
        let mut failed_sources = Vec::new();
        for (name, result) in results {
            match result {
                Ok(coupons) => {
                    tracing::debug!(source = %name, count = coupons.len(), "source returned");
                    all.extend(coupons);
                }
                Err(e) => {
                    tracing::warn!(
                        source = %name,
                        store = %store.store_id,
                        error = %e,
                        "coupon source failed; skipping"
                    );
                    failed_sources.push(name);
                }
            }
        }

        let mut coupons = merge_coupons(all);
        rank_coupons(&mut coupons);
        coupons.truncate(self.max_results);

        if coupons.is_empty() {
            if self.use_fallback {
                tracing::info!(store = %store.store_id, "no coupons found; using fallback set");
                return FindOutcome {
                    coupons: fallback_coupons(store),
                    from_cache: false,
                    failed_sources,
                    fallback: true,
                };
            }
        } else if let Err(e) = self.cache.set(&store.store_id, &coupons) {
            tracing::warn!(store = %store.store_id, error = %e, "failed to cache coupons");
        }

        tracing::info!(
            store = %store.store_id,
            count = coupons.len(),
            failed = failed_sources.len(),
            "coupon lookup complete"
        );
        FindOutcome {
            coupons,
            from_cache: false,
            failed_sources,
            fallback: false,
        }
    }
}

/// `Greater` when `candidate` should replace `current` for the same code.
fn preference(candidate: &Coupon, current: &Coupon) -> Ordering {
    candidate
        .verified
        .cmp(&current.verified)
        .then_with(|| candidate.confidence.total_cmp(&current.confidence))
        .then_with(|| discount_key(candidate).total_cmp(&discount_key(current)))
}

fn discount_key(coupon: &Coupon) -> f64 {
    coupon.discount_value.unwrap_or(f64::NEG_INFINITY)
}

/// Deduplicates by code, keeping the verified, then higher-confidence, then
/// higher-discount instance. First-seen order is preserved.
#[must_use]
pub fn merge_coupons(coupons: Vec<Coupon>) -> Vec<Coupon> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Coupon> = Vec::with_capacity(coupons.len());

    for coupon in coupons {
        match index.get(coupon.code.as_str()) {
            Some(&i) => {
                if preference(&coupon, &merged[i]) == Ordering::Greater {
                    merged[i] = coupon;
                }
            }
            None => {
                index.insert(coupon.code.to_string(), merged.len());
                merged.push(coupon);
            }
        }
    }
    merged
}

/// Verified first; then higher discount (missing discounts last); then
/// higher confidence; then code, for a stable total order.
pub fn rank_coupons(coupons: &mut [Coupon]) {
    coupons.sort_by(|a, b| {
        b.verified
            .cmp(&a.verified)
            .then_with(|| discount_key(b).total_cmp(&discount_key(a)))
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.code.cmp(&b.code))
    });
}

/// Built-in demo codes used when every source comes back empty.
#[must_use]
pub fn fallback_coupons(store: &StoreConfig) -> Vec<Coupon> {
    [
        ("DEMO20", "Demo rabatt 20%", Some(20.0), DiscountKind::Percentage),
        ("TEST15", "Test rabatt 15%", Some(15.0), DiscountKind::Percentage),
        ("FRIFRAKT", "Fri frakt", None, DiscountKind::FreeShipping),
    ]
    .into_iter()
    .filter_map(|(code, description, value, kind)| {
        Coupon::new(code, &store.store_id, FALLBACK_SOURCE)
            .ok()
            .map(|c| {
                c.with_description(description)
                    .with_discount(value, kind)
                    .with_confidence(FALLBACK_CONFIDENCE)
            })
    })
    .collect()
}
