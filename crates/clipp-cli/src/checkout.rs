//! Trying codes on a saved checkout page.
//!
//! Without `--simulate` the page is static: codes are typed and submitted
//! but nothing reacts, so attempts come back inconclusive. With it, the page
//! behaves like a shop that accepts the listed codes.

use std::path::Path;

use anyhow::Context;
use clipp_core::StoreConfig;
use clipp_page::{
    BatchEvent, BatchSummary, Document, Outcome, Page, PageSession, SessionSettings,
    SimulatedCheckout, TestResult,
};
use rust_decimal::Decimal;

use crate::context::AppContext;

pub(crate) struct TestOptions {
    pub(crate) codes: Vec<String>,
    pub(crate) simulate: Vec<(String, Decimal)>,
    pub(crate) total: Option<Decimal>,
    pub(crate) json: bool,
}

fn load_page(path: &Path) -> anyhow::Result<Document> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("reading checkout page {}", path.display()))?;
    Ok(Document::parse(&html))
}

fn describe(result: &TestResult) -> String {
    match (result.outcome, &result.error) {
        (Outcome::Succeeded, _) if result.savings > Decimal::ZERO => {
            format!("accepted, saves {} kr", result.savings)
        }
        (Outcome::Succeeded, _) => "accepted".to_string(),
        (Outcome::TypedNotSubmitted, _) => "entered; no apply button to press".to_string(),
        (Outcome::Inconclusive, _) => "no visible reaction".to_string(),
        (Outcome::Failed, Some(err)) => err.to_string(),
        (Outcome::Failed, None) => "failed".to_string(),
    }
}

/// Enter one code on a static copy of the page.
///
/// # Errors
///
/// Returns an error if the store is unknown or the page cannot be read.
pub(crate) async fn run_apply(
    ctx: &AppContext,
    store_id: &str,
    page: &Path,
    code: &str,
) -> anyhow::Result<()> {
    let store = ctx.store(store_id)?;
    let doc = load_page(page)?;
    let session = PageSession::new(doc, SessionSettings::from_config(&ctx.config));

    let result = session.apply_coupon(code, store).await;
    println!("{}: {}", result.code, describe(&result));
    Ok(())
}

/// Try several codes and report the best.
///
/// # Errors
///
/// Returns an error if the store is unknown, the page cannot be read, or no
/// codes are given and none can be found.
pub(crate) async fn run_test(
    ctx: &AppContext,
    store_id: &str,
    page: &Path,
    opts: TestOptions,
) -> anyhow::Result<()> {
    let store = ctx.store(store_id)?;
    let doc = load_page(page)?;
    let settings = SessionSettings::from_config(&ctx.config);

    let codes = if opts.codes.is_empty() {
        let found = ctx.finder()?.find_coupons(store).await;
        anyhow::ensure!(
            !found.is_empty(),
            "no codes given and none found for {}",
            store.store_name
        );
        found.into_iter().map(|c| c.code.as_str().to_string()).collect()
    } else {
        opts.codes
    };

    let summary = if opts.simulate.is_empty() && opts.total.is_none() {
        run_batch(PageSession::new(doc, settings), codes, store, opts.json).await?
    } else {
        let mut sim = SimulatedCheckout::new(doc);
        if let Some(total) = opts.total {
            sim = sim.with_total(total);
        }
        for (code, amount) in &opts.simulate {
            sim = sim.with_code(code, *amount);
        }
        run_batch(PageSession::new(sim, settings), codes, store, opts.json).await?
    };

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!(
        "tested {} codes, {} accepted",
        summary.tested_count, summary.success_count
    );
    match &summary.best_result {
        Some(best) => println!("best: {} ({})", best.code, describe(best)),
        None => println!("no code worked"),
    }
    Ok(())
}

async fn run_batch<P: Page + 'static>(
    session: PageSession<P>,
    codes: Vec<String>,
    store: &StoreConfig,
    quiet: bool,
) -> anyhow::Result<BatchSummary> {
    let summary = session
        .test_all(codes, store, |event| {
            if quiet {
                return;
            }
            match event {
                BatchEvent::Testing {
                    current,
                    total,
                    code,
                } => eprintln!("[{current}/{total}] trying {code}"),
                BatchEvent::Tested { result, .. } => {
                    println!("{:<16}{}", result.code, describe(result));
                }
                BatchEvent::Complete { .. } => {}
            }
        })
        .await?;
    Ok(summary)
}
