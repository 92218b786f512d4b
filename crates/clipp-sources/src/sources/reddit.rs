//! Reddit public search as a community code source.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clipp_core::{Coupon, SourceConfig, StoreConfig};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use super::{endpoint, fetch_json, CouponSource, SourceSettings};
use crate::confidence::{community_confidence, PostSignals};
use crate::error::SourceError;
use crate::extract::extract_codes;
use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const PERMALINK_BASE: &str = "https://reddit.com";
const SUBREDDITS: &[&str] = &["coupons", "deals", "discounts"];
const MAX_TERMS: usize = 2;
const PAGE_LIMIT: &str = "10";
const DESCRIPTION_MAX_CHARS: usize = 60;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    #[serde(default)]
    title: String,
    selftext: Option<String>,
    score: Option<i64>,
    created_utc: Option<f64>,
    permalink: Option<String>,
}

pub struct RedditSource {
    http: Client,
    retry: RetryPolicy,
    base_url: String,
}

impl RedditSource {
    pub const NAME: &'static str = "Reddit";
    const TAG: &'static str = "reddit";

    #[must_use]
    pub fn new(config: &SourceConfig, settings: &SourceSettings) -> Self {
        Self {
            http: settings.http.clone(),
            retry: settings.retry,
            base_url: endpoint(config.base_url.as_deref(), DEFAULT_BASE_URL, ""),
        }
    }

    async fn search(&self, subreddit: &str, term: &str) -> Result<Vec<PostData>, SourceError> {
        let url = format!("{}r/{subreddit}/search.json", self.base_url);
        let query = format!("{term} coupon OR code OR rabattkod");
        let listing: Listing = fetch_json(Self::NAME, self.retry, || {
            self.http.get(&url).query(&[
                ("q", query.as_str()),
                ("restrict_sr", "1"),
                ("sort", "new"),
                ("limit", PAGE_LIMIT),
            ])
        })
        .await?;
        Ok(listing.data.children.into_iter().map(|p| p.data).collect())
    }

    async fn fetch_inner(&self, store: &StoreConfig) -> Result<Vec<Coupon>, SourceError> {
        let terms = search_terms(&store.store_name);
        let now = Utc::now();
        let mut best: HashMap<String, Coupon> = HashMap::new();
        let mut succeeded = 0usize;
        let mut last_error = None;

        let searches = SUBREDDITS
            .iter()
            .flat_map(|&subreddit| terms.iter().map(move |term| (subreddit, term)));
        let results = join_all(searches.map(|(subreddit, term)| async move {
            (subreddit, term, self.search(subreddit, term).await)
        }))
        .await;

        for (subreddit, term, result) in results {
            let posts = match result {
                Ok(posts) => {
                    succeeded += 1;
                    posts
                }
                Err(e) => {
                    tracing::warn!(subreddit, term = %term, error = %e, "reddit search failed");
                    last_error = Some(e);
                    continue;
                }
            };
            for post in &posts {
                for coupon in post_coupons(post, subreddit, store, now) {
                    keep_most_confident(&mut best, coupon);
                }
            }
        }

        // Only a total outage is an error; partial results are still useful.
        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        tracing::debug!(
            source = Self::NAME,
            store = %store.store_id,
            count = best.len(),
            "reddit codes extracted"
        );
        Ok(best.into_values().collect())
    }
}

impl CouponSource for RedditSource {
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

fn keep_most_confident(best: &mut HashMap<String, Coupon>, coupon: Coupon) {
    match best.get(coupon.code.as_str()) {
        Some(existing) if existing.confidence >= coupon.confidence => {}
        _ => {
            best.insert(coupon.code.to_string(), coupon);
        }
    }
}

fn post_coupons(
    post: &PostData,
    subreddit: &str,
    store: &StoreConfig,
    now: DateTime<Utc>,
) -> Vec<Coupon> {
    let text = format!("{} {}", post.title, post.selftext.as_deref().unwrap_or(""));
    let codes = extract_codes(&text);
    if codes.is_empty() {
        return Vec::new();
    }

    #[allow(clippy::cast_possible_truncation)]
    let created_at = post
        .created_utc
        .filter(|t| t.is_finite())
        .and_then(|t| DateTime::from_timestamp(t as i64, 0));
    let confidence = community_confidence(
        &PostSignals {
            title: &post.title,
            popularity: post.score,
            created_at,
        },
        now,
    );
    let description = truncate(&post.title, DESCRIPTION_MAX_CHARS);
    let url = post
        .permalink
        .as_deref()
        .map(|p| format!("{PERMALINK_BASE}{p}"));

    let mut sorted: Vec<String> = codes.into_iter().collect();
    sorted.sort();
    sorted
        .iter()
        .filter_map(|code| Coupon::new(code, &store.store_id, RedditSource::TAG).ok())
        .map(|c| {
            let c = c
                .with_description(description.clone())
                .with_confidence(confidence)
                .with_source_label(format!("r/{subreddit}"))
                .found_at(now);
            match &url {
                Some(url) => c.with_url(url.clone()),
                None => c,
            }
        })
        .collect()
}

/// The store name as given, then a cleaned lower-case variant; at most two,
/// deduplicated.
fn search_terms(store_name: &str) -> Vec<String> {
    let raw = store_name.trim().to_string();
    let cleaned = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut terms = Vec::with_capacity(MAX_TERMS);
    for term in [raw, cleaned.clone(), format!("{cleaned} rabattkod")] {
        if terms.len() == MAX_TERMS {
            break;
        }
        if !term.trim().is_empty()
            && !terms.iter().any(|t: &String| t.eq_ignore_ascii_case(&term))
        {
            terms.push(term);
        }
    }
    terms
}

/// Truncates to `max` characters, ending in `...` when shortened.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
