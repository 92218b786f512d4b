//! Store listing, coupon lookup, and cache maintenance.

use anyhow::Context;
use clipp_core::Coupon;

use crate::context::AppContext;

pub(crate) fn run_stores(ctx: &AppContext) {
    if ctx.stores.stores.is_empty() {
        println!("no stores configured in {}", ctx.config.stores_path.display());
        return;
    }

    println!("{:<14}{:<20}{:<8}DOMAINS", "ID", "NAME", "ACTIVE");
    for store in &ctx.stores.stores {
        println!(
            "{:<14}{:<20}{:<8}{}",
            store.store_id,
            store.store_name,
            if store.active { "yes" } else { "no" },
            store.domain_patterns.join(", ")
        );
    }

    println!();
    println!("{:<18}{:<8}API KEY", "SOURCE", "ACTIVE");
    for source in &ctx.stores.coupon_sources {
        println!(
            "{:<18}{:<8}{}",
            source.name,
            if source.active { "yes" } else { "no" },
            if source.usable_api_key().is_some() {
                "set"
            } else {
                "\u{2014}"
            }
        );
    }
}

/// Look up coupons for a store and print them ranked.
///
/// # Errors
///
/// Returns an error if the store is unknown or the HTTP client cannot be
/// built. Individual source failures are reported, not returned.
pub(crate) async fn run_find(
    ctx: &AppContext,
    store_id: &str,
    refresh: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = ctx.store(store_id)?;
    let finder = ctx.finder()?;
    let outcome = if refresh {
        finder.refresh(store).await
    } else {
        finder.find_coupons_detailed(store).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.coupons)?);
        return Ok(());
    }

    if !outcome.failed_sources.is_empty() {
        eprintln!(
            "warning: sources unavailable: {}",
            outcome.failed_sources.join(", ")
        );
    }
    if outcome.coupons.is_empty() {
        println!("no coupons found for {}", store.store_name);
        return Ok(());
    }

    let origin = match (outcome.from_cache, outcome.fallback) {
        (_, true) => " (demo codes; no source returned anything)",
        (true, false) => " (cached)",
        (false, false) => "",
    };
    println!("{} coupons for {}{origin}", outcome.coupons.len(), store.store_name);
    println!(
        "{:<16}{:<10}{:<6}{:<6}{:<18}DESCRIPTION",
        "CODE", "DISCOUNT", "VER", "CONF", "SOURCE"
    );
    for coupon in &outcome.coupons {
        print_coupon(coupon);
    }
    Ok(())
}

fn print_coupon(coupon: &Coupon) {
    let source = coupon
        .source_label
        .as_deref()
        .unwrap_or(coupon.source.as_str());
    let description = if coupon.description.chars().count() > 50 {
        format!("{}...", coupon.description.chars().take(50).collect::<String>())
    } else {
        coupon.description.clone()
    };
    println!(
        "{:<16}{:<10}{:<6}{:<6.2}{:<18}{}",
        coupon.code.as_str(),
        format_discount(coupon),
        if coupon.verified { "yes" } else { "no" },
        coupon.confidence,
        source,
        description
    );
}

fn format_discount(coupon: &Coupon) -> String {
    use clipp_core::DiscountKind;

    match (coupon.discount_kind, coupon.discount_value) {
        (DiscountKind::Percentage, Some(v)) => format!("{v}%"),
        (DiscountKind::FixedAmount, Some(v)) => format!("{v} kr"),
        (DiscountKind::FreeShipping, _) => "frakt".to_string(),
        _ => "\u{2014}".to_string(),
    }
}

/// Drop cached results for a store from both namespaces.
///
/// # Errors
///
/// Returns an error if the cache file cannot be written.
pub(crate) fn run_cache_clear(ctx: &AppContext, store_id: &str) -> anyhow::Result<()> {
    let store = ctx.store(store_id)?;
    ctx.discovery_cache()
        .invalidate(&store.store_id)
        .context("clearing discovery cache")?;
    ctx.community_cache()
        .invalidate(&store.store_name)
        .context("clearing community cache")?;
    println!("cleared cached coupons for {}", store.store_name);
    Ok(())
}
