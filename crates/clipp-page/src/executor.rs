//! Typing a code into the page, submitting it, and judging the outcome.

use std::time::Duration;

use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dom::NodeId;
use crate::error::PageError;
use crate::observe::{wait_for_settle, MarkerSnapshot, SettleTiming};
use crate::page::{DomEvent, Page};
use crate::price;
use crate::prober::Prober;

/// Whether a missing apply control ends the attempt before typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Testing a candidate: no apply control means nothing to learn.
    Test,
    /// Applying a chosen code: typing it in is still useful on its own.
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Inconclusive,
    TypedNotSubmitted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum TestError {
    #[error("no coupon input found on the page")]
    NoInputFound,
    #[error("no apply button found near the coupon input")]
    NoButtonFound,
    #[error("the page rejected the code")]
    InvalidCode,
    #[error("the batch deadline passed before this code was tried")]
    TimedOut,
    #[error("page interaction failed: {0}")]
    Interaction(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub code: String,
    pub success: bool,
    pub error: Option<TestError>,
    pub savings: Decimal,
    pub initial_total: Option<Decimal>,
    pub new_total: Option<Decimal>,
    pub outcome: Outcome,
}

impl TestResult {
    #[must_use]
    pub fn failed(code: &str, error: TestError) -> Self {
        Self {
            code: code.to_string(),
            success: false,
            error: Some(error),
            savings: Decimal::ZERO,
            initial_total: None,
            new_total: None,
            outcome: Outcome::Failed,
        }
    }

    fn with_totals(mut self, initial: Option<Decimal>, new: Option<Decimal>) -> Self {
        self.initial_total = initial;
        self.new_total = new;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub settle: SettleTiming,
    /// Per-character typing delay bounds, inclusive.
    pub typing_delay_ms: (u64, u64),
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            settle: SettleTiming::default(),
            typing_delay_ms: (30, 50),
        }
    }
}

impl ExecutorSettings {
    fn typing_delay(&self) -> Duration {
        let (lo, hi) = self.typing_delay_ms;
        let ms = if hi > lo {
            rand::rng().random_range(lo..=hi)
        } else {
            lo
        };
        Duration::from_millis(ms)
    }
}

/// Steps of one attempt, logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Locating,
    Typing,
    Submitting,
    Observing,
}

/// Runs one attempt of `code` against `page`.
///
/// Never fails: page errors become a [`TestError::Interaction`] result.
pub async fn run_attempt<P: Page + ?Sized>(
    page: &mut P,
    prober: &Prober,
    code: &str,
    mode: Mode,
    settings: &ExecutorSettings,
) -> TestResult {
    let code = code.trim();
    match attempt(page, prober, code, mode, settings).await {
        Ok(result) => {
            info!(
                code,
                outcome = ?result.outcome,
                savings = %result.savings,
                "coupon attempt finished"
            );
            result
        }
        Err(e) => {
            warn!(code, error = %e, "coupon attempt aborted");
            TestResult::failed(code, TestError::Interaction(e.to_string()))
        }
    }
}

async fn attempt<P: Page + ?Sized>(
    page: &mut P,
    prober: &Prober,
    code: &str,
    mode: Mode,
    settings: &ExecutorSettings,
) -> Result<TestResult, PageError> {
    debug!(code, phase = ?Phase::Locating, ?mode, "attempt phase");
    let Some(input) = prober.find_input(page.document()) else {
        return Ok(TestResult::failed(code, TestError::NoInputFound));
    };
    let submit = prober.find_submit(page.document(), input);
    if mode == Mode::Test && submit.is_none() {
        return Ok(TestResult::failed(code, TestError::NoButtonFound));
    }

    let initial_total = price::read_total(page.document());
    let markers = MarkerSnapshot::capture(page.document());

    debug!(code, phase = ?Phase::Typing, "attempt phase");
    type_code(page, input, code, settings).await?;

    let Some(submit) = submit else {
        return Ok(TestResult {
            code: code.to_string(),
            success: true,
            error: None,
            savings: Decimal::ZERO,
            initial_total,
            new_total: initial_total,
            outcome: Outcome::TypedNotSubmitted,
        });
    };

    debug!(code, phase = ?Phase::Submitting, "attempt phase");
    let baseline = page.document().mutation_count();
    for event in [DomEvent::MouseDown, DomEvent::MouseUp, DomEvent::Click] {
        page.dispatch(submit, event)?;
    }
    page.click(submit)?;

    debug!(code, phase = ?Phase::Observing, "attempt phase");
    let settled = wait_for_settle(page, baseline, settings.settle).await;
    let doc = page.document();
    let new_total = price::read_total(doc);
    let change = markers.changes(doc);
    debug!(code, ?settled, ?change, ?initial_total, ?new_total, "observed page reaction");

    let dropped = match (initial_total, new_total) {
        (Some(before), Some(after)) if after < before => Some(before - after),
        _ => None,
    };
    let result = if let Some(savings) = dropped {
        TestResult {
            code: code.to_string(),
            success: true,
            error: None,
            savings,
            initial_total,
            new_total,
            outcome: Outcome::Succeeded,
        }
    } else if change.new_success {
        TestResult {
            code: code.to_string(),
            success: true,
            error: None,
            savings: Decimal::ZERO,
            initial_total,
            new_total,
            outcome: Outcome::Succeeded,
        }
    } else if change.new_error {
        TestResult::failed(code, TestError::InvalidCode).with_totals(initial_total, new_total)
    } else {
        TestResult {
            code: code.to_string(),
            success: false,
            error: None,
            savings: Decimal::ZERO,
            initial_total,
            new_total,
            outcome: Outcome::Inconclusive,
        }
    };

    if !result.success {
        clear_input(page, input);
    }
    Ok(result)
}

async fn type_code<P: Page + ?Sized>(
    page: &mut P,
    input: NodeId,
    code: &str,
    settings: &ExecutorSettings,
) -> Result<(), PageError> {
    page.dispatch(input, DomEvent::Focus)?;
    page.set_value(input, "")?;
    page.dispatch(input, DomEvent::Input)?;

    let mut typed = String::with_capacity(code.len());
    for ch in code.chars() {
        typed.push(ch);
        page.set_value(input, &typed)?;
        page.dispatch(input, DomEvent::Input)?;
        page.dispatch(input, DomEvent::KeyDown(ch))?;
        page.dispatch(input, DomEvent::KeyUp(ch))?;
        let delay = settings.typing_delay();
        tokio::time::sleep(delay).await;
    }

    page.dispatch(input, DomEvent::Change)?;
    page.dispatch(input, DomEvent::Blur)
}

fn clear_input<P: Page + ?Sized>(page: &mut P, input: NodeId) {
    let cleared = page
        .set_value(input, "")
        .and_then(|()| page.dispatch(input, DomEvent::Input));
    if let Err(e) = cleared {
        debug!(error = %e, "could not clear coupon input");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::simulate::SimulatedCheckout;

    const CART: &str = r#"
        <form class="cart-coupon"><input name="promo"><button type="submit">Använd</button></form>
        <div class="order-total">500 kr</div>"#;

    fn sim() -> SimulatedCheckout {
        SimulatedCheckout::new(Document::parse(CART)).with_code("VINTER50", Decimal::from(50))
    }

    #[tokio::test(start_paused = true)]
    async fn price_drop_is_success_with_savings() {
        let mut page = sim();
        let result = run_attempt(
            &mut page,
            &Prober::default(),
            "vinter50",
            Mode::Test,
            &ExecutorSettings::default(),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Succeeded);
        assert!(result.success);
        assert_eq!(result.savings, Decimal::from(50));
        assert_eq!(result.initial_total, Some(Decimal::from(500)));
        assert_eq!(result.new_total, Some(Decimal::from(450)));
    }

    #[tokio::test(start_paused = true)]
    async fn error_marker_is_invalid_code_and_input_is_cleared() {
        let mut page = sim();
        let result = run_attempt(
            &mut page,
            &Prober::default(),
            "FEL10",
            Mode::Test,
            &ExecutorSettings::default(),
        )
        .await;
        assert_eq!(result.error, Some(TestError::InvalidCode));
        assert_eq!(result.outcome, Outcome::Failed);

        let doc = page.document();
        let input = Prober::default().find_input(doc).expect("input");
        assert_eq!(doc.value(input), "");
    }

    /// Shows a success banner and a field hint styled as an error on every
    /// submit, without touching the total.
    struct MixedMessages {
        doc: Document,
    }

    impl Page for MixedMessages {
        fn document(&self) -> &Document {
            &self.doc
        }

        fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), PageError> {
            Page::set_value(&mut self.doc, node, value)
        }

        fn dispatch(&mut self, node: NodeId, event: DomEvent) -> Result<(), PageError> {
            Page::dispatch(&mut self.doc, node, event)
        }

        fn click(&mut self, node: NodeId) -> Result<(), PageError> {
            Page::click(&mut self.doc, node)?;
            let body = self.doc.body();
            let banner = self.doc.create_element("div", &[("class", "coupon-success")]);
            self.doc.append_text(banner, "Rabattkoden har lagts till");
            self.doc.append_child(body, banner);
            let hint = self.doc.create_element("span", &[("class", "field-error-hint")]);
            self.doc.append_text(hint, "Endast en kod per order");
            self.doc.append_child(body, hint);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_marker_wins_over_simultaneous_error_marker() {
        let mut page = MixedMessages {
            doc: Document::parse(CART),
        };
        let result = run_attempt(
            &mut page,
            &Prober::default(),
            "VINTER50",
            Mode::Test,
            &ExecutorSettings::default(),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Succeeded);
        assert!(result.success);
        assert_eq!(result.error, None);
        assert_eq!(result.savings, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_dispatches_per_character_events() {
        let mut page = sim();
        run_attempt(
            &mut page,
            &Prober::default(),
            "AB",
            Mode::Test,
            &ExecutorSettings::default(),
        )
        .await;
        let doc = page.document();
        let input = Prober::default().find_input(doc).expect("input");
        let on_input: Vec<DomEvent> = doc
            .events()
            .iter()
            .filter(|(node, _)| *node == input)
            .map(|(_, e)| *e)
            .collect();
        assert_eq!(
            &on_input[..9],
            &[
                DomEvent::Focus,
                DomEvent::Input,
                DomEvent::Input,
                DomEvent::KeyDown('A'),
                DomEvent::KeyUp('A'),
                DomEvent::Input,
                DomEvent::KeyDown('B'),
                DomEvent::KeyUp('B'),
                DomEvent::Change,
            ]
        );
        assert_eq!(on_input[9], DomEvent::Blur);
    }

    #[tokio::test(start_paused = true)]
    async fn static_page_is_inconclusive() {
        let mut doc = Document::parse(CART);
        let result = run_attempt(
            &mut doc,
            &Prober::default(),
            "SAVE10",
            Mode::Test,
            &ExecutorSettings::default(),
        )
        .await;
        assert_eq!(result.outcome, Outcome::Inconclusive);
        assert!(!result.success);
        assert_eq!(result.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_button_depends_on_mode() {
        let html = r#"<input name="coupon"><div class="order-total">100 kr</div>"#;

        let mut page = Document::parse(html);
        let tested = run_attempt(
            &mut page,
            &Prober::default(),
            "SAVE10",
            Mode::Test,
            &ExecutorSettings::default(),
        )
        .await;
        assert_eq!(tested.error, Some(TestError::NoButtonFound));
        assert!(page.events().is_empty(), "nothing typed in test mode");

        let applied = run_attempt(
            &mut page,
            &Prober::default(),
            "SAVE10",
            Mode::Apply,
            &ExecutorSettings::default(),
        )
        .await;
        assert_eq!(applied.outcome, Outcome::TypedNotSubmitted);
        assert!(applied.success);
        assert_eq!(applied.savings, Decimal::ZERO);
        let input = Prober::default().find_input(&page).expect("input");
        assert_eq!(page.value(input), "SAVE10");
    }

    #[test]
    fn result_serializes_snake_case() {
        let result = TestResult::failed("X1", TestError::NoInputFound);
        let json = serde_json::to_value(&result).expect("serializable");
        assert_eq!(json["error"], "no_input_found");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["savings"], "0");
    }
}
