//! LinkMyDeals deals API.

use chrono::Utc;
use clipp_core::{Coupon, DiscountKind, SourceConfig, StoreConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use super::coupon_api::parse_expiry;
use super::{endpoint, fetch_json, CouponSource, SourceSettings};
use crate::error::SourceError;
use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.linkmydeals.com";
const COUNTRY: &str = "SE";

#[derive(Debug, Deserialize)]
struct DealsResponse {
    #[serde(default)]
    data: Vec<Deal>,
}

#[derive(Debug, Deserialize)]
struct Deal {
    coupon_code: Option<String>,
    title: Option<String>,
    discount_amount: Option<f64>,
    discount_type: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    verified: bool,
}

pub struct LinkMyDealsSource {
    http: Client,
    retry: RetryPolicy,
    api_key: Option<String>,
    base_url: String,
}

impl LinkMyDealsSource {
    pub const NAME: &'static str = "LinkMyDeals";

    #[must_use]
    pub fn new(config: &SourceConfig, settings: &SourceSettings) -> Self {
        Self {
            http: settings.http.clone(),
            retry: settings.retry,
            api_key: config.usable_api_key().map(str::to_string),
            base_url: endpoint(
                config.base_url.as_deref(),
                DEFAULT_BASE_URL,
                "v2/deals/coupons",
            ),
        }
    }

    async fn fetch_inner(&self, store: &StoreConfig) -> Result<Vec<Coupon>, SourceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(source = Self::NAME, "API key not configured; skipping");
            return Ok(Vec::new());
        };

        let response: DealsResponse = fetch_json(Self::NAME, self.retry, || {
            self.http
                .get(&self.base_url)
                .header("X-API-Key", api_key)
                .query(&[("merchant", store.store_name.as_str()), ("country", COUNTRY)])
        })
        .await?;

        let now = Utc::now();
        let mut coupons = Vec::new();
        for deal in response.data {
            // Deals without a code are automatic discounts; nothing to type.
            let Some(code) = deal.coupon_code.as_deref() else {
                continue;
            };
            let expires_at = deal.end_date.as_deref().and_then(parse_expiry);
            if expires_at.is_some_and(|at| at < now) {
                continue;
            }
            let coupon = match Coupon::new(code, &store.store_id, Self::NAME) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping invalid deal code");
                    continue;
                }
            };
            let kind = deal
                .discount_type
                .as_deref()
                .map_or(DiscountKind::Percentage, DiscountKind::from_label);
            let description = deal
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("Rabatt från {}", store.store_name));

            coupons.push(
                coupon
                    .with_description(description)
                    .with_discount(deal.discount_amount, kind)
                    .verified(deal.verified)
                    .with_confidence(if deal.verified { 0.9 } else { 0.7 })
                    .with_expires_at(expires_at),
            );
        }

        tracing::debug!(
            source = Self::NAME,
            store = %store.store_id,
            count = coupons.len(),
            "fetched deals"
        );
        Ok(coupons)
    }
}

impl CouponSource for LinkMyDealsSource {
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
