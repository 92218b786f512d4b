//! Watching the page react to a submitted code.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use tokio::time::Instant;

use crate::dom::{Document, NodeId};
use crate::page::Page;
use crate::selector::Selector;

pub const SUCCESS_MARKERS: &str = ".coupon-success, .promo-success, .discount-applied, \
    [class*=\"success\" i], [class*=\"applied\" i], .alert-success, .message-success, \
    [data-testid*=\"success\" i]";

pub const ERROR_MARKERS: &str = ".coupon-error, .promo-error, .discount-error, \
    [class*=\"error\" i], [class*=\"invalid\" i], .alert-error, .alert-danger, .message-error";

static SUCCESS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(SUCCESS_MARKERS).expect("valid success markers"));

static ERROR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(ERROR_MARKERS).expect("valid error markers"));

fn visible_matches(doc: &Document, selector: &Selector) -> HashSet<NodeId> {
    doc.select(selector)
        .into_iter()
        .filter(|&id| doc.is_visible(id))
        .collect()
}

/// Success and error markers visible at one point in time.
#[derive(Debug, Clone, Default)]
pub struct MarkerSnapshot {
    success: HashSet<NodeId>,
    error: HashSet<NodeId>,
}

/// Which kinds of marker became visible since a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerChange {
    pub new_success: bool,
    pub new_error: bool,
}

impl MarkerSnapshot {
    #[must_use]
    pub fn capture(doc: &Document) -> Self {
        Self {
            success: visible_matches(doc, &SUCCESS),
            error: visible_matches(doc, &ERROR),
        }
    }

    /// Markers visible now that were not visible at capture time. Markers
    /// that were already showing do not count.
    #[must_use]
    pub fn changes(&self, doc: &Document) -> MarkerChange {
        let now = Self::capture(doc);
        MarkerChange {
            new_success: now.success.difference(&self.success).next().is_some(),
            new_error: now.error.difference(&self.error).next().is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleTiming {
    /// Upper bound on the whole wait.
    pub timeout: Duration,
    /// Mutation-free time after the last change that counts as settled.
    pub quiet: Duration,
    pub poll: Duration,
}

impl Default for SettleTiming {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            quiet: Duration::from_millis(500),
            poll: Duration::from_millis(50),
        }
    }
}

/// How a settle wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Mutations happened and then stopped for the quiet period.
    Quiet,
    /// The timeout elapsed with no mutation at all.
    NoChange,
    /// The timeout elapsed while the page was still changing.
    StillChanging,
}

/// Polls the page until its DOM stops changing.
///
/// `baseline` is the mutation count before the action being observed. The
/// wait ends once some mutation has been seen and none has followed for
/// `timing.quiet`, or when `timing.timeout` elapses.
pub async fn wait_for_settle<P: Page + ?Sized>(
    page: &mut P,
    baseline: u64,
    timing: SettleTiming,
) -> Settled {
    let deadline = Instant::now() + timing.timeout;
    let mut last_count = baseline;
    let mut last_change: Option<Instant> = None;
    loop {
        page.tick();
        let now = Instant::now();
        let count = page.document().mutation_count();
        if count != last_count {
            last_count = count;
            last_change = Some(now);
        }
        if let Some(changed_at) = last_change {
            if now.duration_since(changed_at) >= timing.quiet {
                return Settled::Quiet;
            }
        }
        if now >= deadline {
            return if last_change.is_some() {
                Settled::StillChanging
            } else {
                Settled::NoChange
            };
        }
        tokio::time::sleep(timing.poll).await;
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::simulate::SimulatedCheckout;

    #[test]
    fn only_newly_visible_markers_count() {
        let mut doc = Document::parse(
            r#"<div class="alert-success">Välkommen tillbaka</div>
               <div class="promo-error" style="display:none">Ogiltig</div>"#,
        );
        let before = MarkerSnapshot::capture(&doc);
        assert_eq!(before.changes(&doc), MarkerChange::default());

        let hidden = doc
            .elements()
            .into_iter()
            .find(|&n| doc.classes(n).contains(&"promo-error"))
            .expect("error div");
        doc.remove_attr(hidden, "style");
        let change = before.changes(&doc);
        assert!(change.new_error);
        assert!(!change.new_success);
    }

    #[test]
    fn class_substring_markers_are_case_insensitive() {
        let mut doc = Document::new();
        let before = MarkerSnapshot::capture(&doc);
        let node = doc.create_element("p", &[("class", "PromoAppliedBanner")]);
        let body = doc.body();
        doc.append_child(body, node);
        assert!(before.changes(&doc).new_success);
    }

    #[tokio::test(start_paused = true)]
    async fn settles_after_quiet_period() {
        let doc = Document::parse(r#"<form><input><button>Ok</button></form>"#);
        let button = doc.elements()[5];
        let mut page = SimulatedCheckout::new(doc)
            .with_total(Decimal::ONE_HUNDRED)
            .with_latency(Duration::from_millis(200));
        page.click(button).expect("attached");

        let baseline = page.document().mutation_count();
        let start = Instant::now();
        let settled = wait_for_settle(&mut page, baseline, SettleTiming::default()).await;
        assert_eq!(settled, Settled::Quiet);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(700), "{waited:?}");
        assert!(waited < Duration::from_secs(1), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn static_page_times_out_without_change() {
        let mut doc = Document::parse("<p>hej</p>");
        let start = Instant::now();
        let settled = wait_for_settle(&mut doc, 0, SettleTiming::default()).await;
        assert_eq!(settled, Settled::NoChange);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
