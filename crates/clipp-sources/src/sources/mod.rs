//! Coupon source adapters.
//!
//! Each adapter implements [`CouponSource`]. [`build_sources`] turns the
//! configured source descriptors into adapters; `Reddit` and `Community` are
//! folded into a single [`CommunityCodes`] group with its own cache.

mod community;
mod coupon_api;
mod linkmydeals;
mod listing_sites;
mod reddit;

use std::sync::Arc;
use std::time::Duration;

use clipp_core::{Coupon, SourceConfig, StoreConfig};
use futures::future::BoxFuture;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::cache::CouponCache;
use crate::error::SourceError;
use crate::retry::{retry_with_backoff, RetryPolicy};

pub use community::{CommunityCodes, CommunitySite};
pub use coupon_api::CouponApiSource;
pub use linkmydeals::LinkMyDealsSource;
pub use listing_sites::ListingSite;
pub use reddit::RedditSource;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A provider of coupon candidates for a store.
pub trait CouponSource: Send + Sync {
    /// Display name, matching the descriptor's `name`.
    fn name(&self) -> &str;

    /// Fetches candidates for `store`.
    ///
    /// Implementations return `Ok(vec![])` when they are not configured
    /// (e.g. missing API key) and `Err` only for real failures.
    fn fetch<'a>(&'a self, store: &'a StoreConfig)
        -> BoxFuture<'a, Result<Vec<Coupon>, SourceError>>;
}

/// Shared HTTP plumbing for the network-backed adapters.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub http: Client,
    pub retry: RetryPolicy,
    /// Budget for each member of the community group. Stays below the
    /// per-source timeout so the group can still report what it has.
    pub member_timeout: Duration,
}

impl SourceSettings {
    /// Builds a client with a request timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            http,
            retry,
            member_timeout: timeout * 3 / 4,
        })
    }
}

/// Builds adapters for the given descriptors, in order.
///
/// Unknown names are logged and skipped. The community group is placed
/// where its first member appears.
pub fn build_sources<'a>(
    configs: impl IntoIterator<Item = &'a SourceConfig>,
    settings: &SourceSettings,
    community_cache: CouponCache,
) -> Vec<Arc<dyn CouponSource>> {
    let mut sources: Vec<Arc<dyn CouponSource>> = Vec::new();
    let mut community: Vec<Arc<dyn CouponSource>> = Vec::new();
    let mut community_slot = None;

    for config in configs {
        let name = config.name.trim();
        let adapter: Arc<dyn CouponSource> = if name.eq_ignore_ascii_case(CouponApiSource::NAME) {
            Arc::new(CouponApiSource::new(config, settings))
        } else if name.eq_ignore_ascii_case(LinkMyDealsSource::NAME) {
            Arc::new(LinkMyDealsSource::new(config, settings))
        } else if let Some(site) = ListingSite::from_name(name) {
            Arc::new(site)
        } else if name.eq_ignore_ascii_case(RedditSource::NAME) {
            community_slot.get_or_insert(sources.len());
            community.push(Arc::new(RedditSource::new(config, settings)));
            continue;
        } else if name.eq_ignore_ascii_case(CommunitySite::NAME) {
            community_slot.get_or_insert(sources.len());
            community.push(Arc::new(CommunitySite));
            continue;
        } else {
            tracing::warn!(source = name, "unknown coupon source; skipping");
            continue;
        };
        sources.push(adapter);
    }

    if let Some(slot) = community_slot {
        let group = CommunityCodes::new(community, community_cache)
            .with_member_timeout(settings.member_timeout);
        sources.insert(slot, Arc::new(group));
    }

    tracing::debug!(
        sources = ?sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "coupon sources built"
    );
    sources
}

/// Sends the request produced by `build` and decodes a JSON body, retrying
/// transient failures.
///
/// 429 maps to [`SourceError::RateLimited`], any other non-2xx status to
/// [`SourceError::UnexpectedStatus`], and an undecodable body to
/// [`SourceError::Deserialize`].
pub(crate) async fn fetch_json<T, F>(
    source_name: &str,
    retry: RetryPolicy,
    build: F,
) -> Result<T, SourceError>
where
    T: DeserializeOwned,
    F: Fn() -> RequestBuilder,
{
    let build = &build;
    retry_with_backoff(retry, move || async move {
        let response = build().send().await?;
        let status = response.status();
        let url = response.url().to_string();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            return Err(SourceError::RateLimited {
                source_name: source_name.to_string(),
                retry_after_secs,
            });
        }
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| SourceError::Deserialize {
            context: format!("{source_name} {url}"),
            source: e,
        })
    })
    .await
}

/// Joins a configured base URL (or the adapter default) with `path`.
pub(crate) fn endpoint(base_url: Option<&str>, default: &str, path: &str) -> String {
    let base = base_url
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(default);
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
