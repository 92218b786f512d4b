//! Community-sourced codes: the synthetic `Community` site table and the
//! [`CommunityCodes`] group that fronts it together with Reddit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clipp_core::{Coupon, StoreConfig};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use super::CouponSource;
use crate::cache::CouponCache;
use crate::error::SourceError;

const COMMUNITY_CONFIDENCE: f64 = 0.6;
const MAX_COMMUNITY_RESULTS: usize = 10;
const DEFAULT_MEMBER_TIMEOUT: Duration = Duration::from_secs(8);

/// `(store key, code, description, site)` rows for stores with known
/// community codes. Store keys are matched by substring either way.
const KNOWN_CODES: &[(&str, &str, &str, &str)] = &[
    ("zalando", "NYTT15", "15% rabatt för nya kunder", "Rabattkod.se"),
    ("zalando", "VÄNNER20", "20% med värvningskod", "Kupongkod.com"),
    ("h&m", "MEMBER10", "10% medlemsrabatt", "Rabattkod.se"),
    ("h&m", "HM2024", "Extra rabatt på rea", "Kupongkod.com"),
    ("elgiganten", "ELGI50", "50 kr rabatt", "Rabattkod.se"),
    ("elgiganten", "TECH10", "10% på tillbehör", "Kupongkod.com"),
    ("cdon", "CDON100", "100 kr på köp över 500 kr", "Rabattkod.se"),
    ("cdon", "VINTER15", "15% vinterrabatt", "Kupongkod.com"),
    ("adlibris", "BOK20", "20% på böcker", "Rabattkod.se"),
    ("adlibris", "LÄSNING15", "15% rabatt", "Kupongkod.com"),
];

const GENERIC_CODE: (&str, &str, &str) = ("WELCOME10", "10% välkomstrabatt", "Community");

/// Synthetic stand-in for codes gathered from Swedish coupon communities.
#[derive(Debug, Clone, Copy)]
pub struct CommunitySite;

impl CommunitySite {
    pub const NAME: &'static str = "Community";
    const TAG: &'static str = "community";

    /// Codes for `store`, matched on the store name. Unknown stores get a
    /// single generic welcome code. Rows whose code breaks the code
    /// invariant are skipped.
    #[must_use]
    pub fn codes_for(store: &StoreConfig) -> Vec<Coupon> {
        let name = store.store_name.trim().to_lowercase();
        let known: Vec<_> = KNOWN_CODES
            .iter()
            .filter(|(key, ..)| !name.is_empty() && (name.contains(key) || key.contains(&*name)))
            .map(|&(_, code, description, site)| (code, description, site))
            .collect();
        let rows = if known.is_empty() {
            vec![GENERIC_CODE]
        } else {
            known
        };

        rows.into_iter()
            .filter_map(|(code, description, site)| {
                match Coupon::new(code, &store.store_id, Self::TAG) {
                    Ok(c) => Some(
                        c.with_description(description)
                            .with_source_label(site)
                            .with_confidence(COMMUNITY_CONFIDENCE),
                    ),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping community row");
                        None
                    }
                }
            })
            .collect()
    }
}

impl CouponSource for CommunitySite {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fetch<'a>(
        &'a self,
        store: &'a StoreConfig,
    ) -> BoxFuture<'a, Result<Vec<Coupon>, SourceError>> {
        futures::future::ready(Ok(Self::codes_for(store))).boxed()
    }
}

/// Fans out to the community members, merges by highest confidence and
/// caches the top results per store name.
///
/// Each member runs under its own timeout; a member that fails or runs over
/// is skipped and the others' codes are still returned.
pub struct CommunityCodes {
    members: Vec<Arc<dyn CouponSource>>,
    cache: CouponCache,
    member_timeout: Duration,
}

impl CommunityCodes {
    pub const NAME: &'static str = "CommunityCodes";

    #[must_use]
    pub fn new(members: Vec<Arc<dyn CouponSource>>, cache: CouponCache) -> Self {
        Self {
            members,
            cache,
            member_timeout: DEFAULT_MEMBER_TIMEOUT,
        }
    }

    /// Should be shorter than the aggregator's per-source timeout.
    #[must_use]
    pub fn with_member_timeout(mut self, timeout: Duration) -> Self {
        self.member_timeout = timeout;
        self
    }

    async fn fetch_member(
        &self,
        member: &dyn CouponSource,
        store: &StoreConfig,
    ) -> Result<Vec<Coupon>, SourceError> {
        let timeout = self.member_timeout;
        tokio::time::timeout(timeout, member.fetch(store))
            .await
            .unwrap_or_else(|_| {
                Err(SourceError::Timeout {
                    source_name: member.name().to_string(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }

    async fn fetch_inner(&self, store: &StoreConfig) -> Result<Vec<Coupon>, SourceError> {
        if let Some(cached) = self.cache.get(&store.store_name) {
            if !cached.is_empty() {
                tracing::debug!(
                    store = %store.store_id,
                    count = cached.len(),
                    "community cache hit"
                );
                return Ok(cached);
            }
        }

        let results = join_all(
            self.members
                .iter()
                .map(|member| self.fetch_member(member.as_ref(), store)),
        )
        .await;

        let mut by_code: HashMap<String, Coupon> = HashMap::new();
        let mut failures = Vec::new();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(coupons) => {
                    for coupon in coupons {
                        match by_code.get(coupon.code.as_str()) {
                            Some(existing) if existing.confidence >= coupon.confidence => {}
                            _ => {
                                by_code.insert(coupon.code.to_string(), coupon);
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        source = member.name(),
                        error = %e,
                        "community member failed"
                    );
                    failures.push(e);
                }
            }
        }

        if !self.members.is_empty() && failures.len() == self.members.len() {
            return Err(SourceError::Unavailable {
                source_name: Self::NAME.to_string(),
                reason: format!("all {} community members failed", failures.len()),
            });
        }

        let mut merged: Vec<Coupon> = by_code.into_values().collect();
        merged.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.code.cmp(&b.code))
        });
        merged.truncate(MAX_COMMUNITY_RESULTS);

        if !merged.is_empty() {
            if let Err(e) = self.cache.set(&store.store_name, &merged) {
                tracing::warn!(
                    store = %store.store_id,
                    error = %e,
                    "failed to cache community codes"
                );
            }
        }

        Ok(merged)
    }
}

impl CouponSource for CommunityCodes {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fetch<'a>(
        &'a self,
        store: &'a StoreConfig,
    ) -> BoxFuture<'a, Result<Vec<Coupon>, SourceError>> {
        self.fetch_inner(store).boxed()
    }
}
