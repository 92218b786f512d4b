//! Coupon acquisition for Clipp.
//!
//! [`CouponFinder`] fans out to the configured [`CouponSource`] adapters,
//! merges and ranks what they return, and caches the result through a
//! [`CouponCache`] over any [`KeyValueStore`].

pub mod aggregator;
pub mod cache;
pub mod confidence;
pub mod error;
pub mod extract;
pub mod retry;
pub mod sources;

pub use aggregator::{
    fallback_coupons, merge_coupons, rank_coupons, CouponFinder, FindOutcome, FALLBACK_SOURCE,
};
pub use cache::{
    CouponCache, JsonFileStore, KeyValueStore, MemoryStore, COMMUNITY_NAMESPACE,
    DISCOVERY_NAMESPACE,
};
pub use confidence::{community_confidence, PostSignals};
pub use error::{CacheError, SourceError};
pub use extract::extract_codes;
pub use retry::RetryPolicy;
pub use sources::{
    build_sources, CommunityCodes, CommunitySite, CouponApiSource, CouponSource, LinkMyDealsSource,
    ListingSite, RedditSource, SourceSettings,
};
