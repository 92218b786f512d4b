//! CouponAPI.org structured coupon API.

use chrono::{DateTime, NaiveDate, Utc};
use clipp_core::{Coupon, DiscountKind, SourceConfig, StoreConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use super::{endpoint, fetch_json, CouponSource, SourceSettings};
use crate::error::SourceError;
use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.couponapi.org";

#[derive(Debug, Deserialize)]
struct CouponsResponse {
    #[serde(default)]
    coupons: Vec<ApiCoupon>,
}

#[derive(Debug, Deserialize)]
struct ApiCoupon {
    code: String,
    description: Option<String>,
    discount_amount: Option<f64>,
    discount_percent: Option<f64>,
    discount_type: Option<String>,
    expiry_date: Option<String>,
    #[serde(default)]
    verified: bool,
}

pub struct CouponApiSource {
    http: Client,
    retry: RetryPolicy,
    api_key: Option<String>,
    base_url: String,
}

impl CouponApiSource {
    pub const NAME: &'static str = "CouponAPI.org";

    #[must_use]
    pub fn new(config: &SourceConfig, settings: &SourceSettings) -> Self {
        Self {
            http: settings.http.clone(),
            retry: settings.retry,
            api_key: config.usable_api_key().map(str::to_string),
            base_url: endpoint(config.base_url.as_deref(), DEFAULT_BASE_URL, "v1/coupons"),
        }
    }

    async fn fetch_inner(&self, store: &StoreConfig) -> Result<Vec<Coupon>, SourceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!(source = Self::NAME, "API key not configured; skipping");
            return Ok(Vec::new());
        };

        let domain = store.domain_patterns.first().map_or("", String::as_str);
        let response: CouponsResponse = fetch_json(Self::NAME, self.retry, || {
            self.http
                .get(&self.base_url)
                .bearer_auth(api_key)
                .query(&[("store", store.store_name.as_str()), ("domain", domain)])
        })
        .await?;

        let now = Utc::now();
        let coupons: Vec<Coupon> = response
            .coupons
            .into_iter()
            .filter_map(|c| to_coupon(c, store, now))
            .collect();

        tracing::debug!(
            source = Self::NAME,
            store = %store.store_id,
            count = coupons.len(),
            "fetched coupons"
        );
        Ok(coupons)
    }
}

impl CouponSource for CouponApiSource {
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

fn to_coupon(raw: ApiCoupon, store: &StoreConfig, now: DateTime<Utc>) -> Option<Coupon> {
    let expires_at = raw.expiry_date.as_deref().and_then(parse_expiry);
    if expires_at.is_some_and(|at| at < now) {
        tracing::debug!(code = %raw.code, "skipping expired API coupon");
        return None;
    }

    let coupon = match Coupon::new(&raw.code, &store.store_id, CouponApiSource::NAME) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "skipping invalid API coupon");
            return None;
        }
    };

    let kind = raw
        .discount_type
        .as_deref()
        .map_or(DiscountKind::Percentage, DiscountKind::from_label);
    let description = raw
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Spara med {}", coupon.code));

    Some(
        coupon
            .with_description(description)
            .with_discount(raw.discount_amount.or(raw.discount_percent), kind)
            .verified(raw.verified)
            .with_confidence(if raw.verified { 0.9 } else { 0.7 })
            .with_expires_at(expires_at),
    )
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (end of day, UTC).
pub(super) fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
}
