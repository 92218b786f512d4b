//! Stand-ins for coupon listing sites that would otherwise be scraped.
//!
//! Each site returns a deterministic subset of a fixed catalogue, derived
//! from a SHA-256 digest of the store id and site name. No network access.

use clipp_core::{Coupon, DiscountKind, StoreConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use sha2::{Digest, Sha256};

use super::CouponSource;
use crate::error::SourceError;

const SITES: &[&str] = &["Rabattkod.se", "Kupongkod.com", "RetailMeNot.com"];

struct CatalogueEntry {
    code: &'static str,
    description: &'static str,
    discount: f64,
    kind: DiscountKind,
}

const CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        code: "SAVE20",
        description: "Spara 20%",
        discount: 20.0,
        kind: DiscountKind::Percentage,
    },
    CatalogueEntry {
        code: "SAVE15",
        description: "Spara 15%",
        discount: 15.0,
        kind: DiscountKind::Percentage,
    },
    CatalogueEntry {
        code: "FREE50",
        description: "Fri frakt över 500 kr",
        discount: 50.0,
        kind: DiscountKind::FreeShipping,
    },
    CatalogueEntry {
        code: "NEW10",
        description: "10% för nya kunder",
        discount: 10.0,
        kind: DiscountKind::Percentage,
    },
    CatalogueEntry {
        code: "STUDENT",
        description: "Studentrabatt 15%",
        discount: 15.0,
        kind: DiscountKind::Percentage,
    },
    CatalogueEntry {
        code: "WELCOME",
        description: "Välkomstrabatt 25%",
        discount: 25.0,
        kind: DiscountKind::Percentage,
    },
];

/// Roughly 70 % of picks come out verified.
const VERIFIED_THRESHOLD: u8 = 77;

#[derive(Debug, Clone, Copy)]
pub struct ListingSite {
    name: &'static str,
}

impl ListingSite {
    /// Resolves a descriptor name to one of the known listing sites.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        SITES
            .iter()
            .find(|site| site.eq_ignore_ascii_case(name.trim()))
            .map(|&name| Self { name })
    }

    /// The 1–3 catalogue picks for `store`, in digest order.
    #[must_use]
    pub fn listings(&self, store: &StoreConfig) -> Vec<Coupon> {
        let mut hasher = Sha256::new();
        hasher.update(store.cache_key().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.name.as_bytes());
        let digest = hasher.finalize();

        let count = usize::from(digest[0] % 3) + 1;
        let mut picked: Vec<usize> = Vec::with_capacity(count);
        for &byte in digest.iter().skip(1) {
            if picked.len() == count {
                break;
            }
            let index = usize::from(byte) % CATALOGUE.len();
            if !picked.contains(&index) {
                picked.push(index);
            }
        }

        picked
            .iter()
            .enumerate()
            .filter_map(|(slot, &index)| {
                let entry = &CATALOGUE[index];
                let verified = digest[16 + slot] > VERIFIED_THRESHOLD;
                Coupon::new(entry.code, &store.store_id, self.name)
                    .ok()
                    .map(|c| {
                        c.with_description(entry.description)
                            .with_discount(Some(entry.discount), entry.kind)
                            .verified(verified)
                            .with_confidence(if verified { 0.8 } else { 0.5 })
                            .with_source_label(self.name)
                    })
            })
            .collect()
    }
}

impl CouponSource for ListingSite {
    fn name(&self) -> &str {
        self.name
    }

    fn fetch<'a>(
        &'a self,
        store: &'a StoreConfig,
    ) -> BoxFuture<'a, Result<Vec<Coupon>, SourceError>> {
        let coupons = self.listings(store);
        tracing::debug!(
            source = self.name,
            store = %store.store_id,
            count = coupons.len(),
            "synthetic listing results"
        );
        futures::future::ready(Ok(coupons)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn store(id: &str) -> StoreConfig {
        StoreConfig {
            store_id: id.to_string(),
            store_name: id.to_string(),
            domain_patterns: vec![format!("{id}.se")],
            active: true,
            coupon_input_selector: None,
            apply_button_selector: None,
        }
    }

    #[test]
    fn resolves_known_sites_only() {
        assert!(ListingSite::from_name("rabattkod.se").is_some());
        assert!(ListingSite::from_name("Honey").is_none());
    }

    #[test]
    fn listings_are_deterministic_and_bounded() {
        let site = ListingSite::from_name("Rabattkod.se").unwrap();
        for id in ["zalando", "hm", "elgiganten", "cdon", "adlibris"] {
            let first = site.listings(&store(id));
            let second = site.listings(&store(id));
            assert_eq!(
                first.iter().map(|c| c.code.clone()).collect::<Vec<_>>(),
                second.iter().map(|c| c.code.clone()).collect::<Vec<_>>()
            );
            assert!((1..=3).contains(&first.len()), "{id}: {}", first.len());
            let unique: HashSet<_> = first.iter().map(|c| c.code.clone()).collect();
            assert_eq!(unique.len(), first.len());
        }
    }

    #[test]
    fn listings_are_tagged_with_site_and_store() {
        let site = ListingSite::from_name("Kupongkod.com").unwrap();
        for coupon in site.listings(&store("cdon")) {
            assert_eq!(coupon.source, "Kupongkod.com");
            assert_eq!(coupon.store_id, "cdon");
            assert!(coupon.discount_value.is_some());
        }
    }
}
