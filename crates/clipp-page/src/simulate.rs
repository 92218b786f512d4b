//! A scripted checkout page for demos and tests.
//!
//! [`SimulatedCheckout`] wraps a [`Document`] and reacts to submit clicks the
//! way a typical shop does: after a short latency it either lowers the order
//! total and shows a success message, or shows an error message.

use std::collections::HashMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::time::Instant;
use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::error::PageError;
use crate::page::{ensure_attached, ensure_editable, DomEvent, Page};
use crate::price;

const DEFAULT_LATENCY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reaction {
    Accept { code: String, amount: Decimal },
    Reject { code: String },
}

impl Reaction {
    fn code(&self) -> &str {
        match self {
            Self::Accept { code, .. } | Self::Reject { code } => code,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedCheckout {
    doc: Document,
    codes: HashMap<String, Decimal>,
    total_node: Option<NodeId>,
    total: Decimal,
    latency: Duration,
    pending: Vec<(Instant, Reaction)>,
    message: Option<NodeId>,
    last_edited: Option<NodeId>,
}

impl SimulatedCheckout {
    /// Wraps `doc`, taking the order total from the first visible total
    /// element if there is one.
    #[must_use]
    pub fn new(doc: Document) -> Self {
        let (total_node, total) = match price::total_node(&doc) {
            Some((node, amount)) => (Some(node), amount),
            None => (None, Decimal::ZERO),
        };
        Self {
            doc,
            codes: HashMap::new(),
            total_node,
            total,
            latency: DEFAULT_LATENCY,
            pending: Vec::new(),
            message: None,
            last_edited: None,
        }
    }

    /// Accepts `code` (case-insensitive) for a fixed `amount` off the total.
    #[must_use]
    pub fn with_code(mut self, code: &str, amount: Decimal) -> Self {
        self.codes.insert(code.trim().to_uppercase(), amount);
        self
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the order total, adding an `.order-total` element to the body
    /// when the page has none.
    #[must_use]
    pub fn with_total(mut self, total: Decimal) -> Self {
        let node = match self.total_node {
            Some(node) => node,
            None => {
                let node = self.doc.create_element("div", &[("class", "order-total")]);
                let body = self.doc.body();
                self.doc.append_child(body, node);
                self.total_node = Some(node);
                node
            }
        };
        self.total = total;
        self.doc.set_text(node, &format_total(total));
        self
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.total
    }

    fn is_submit_control(&self, node: NodeId) -> bool {
        match self.doc.tag(node) {
            Some("button") => !self
                .doc
                .attr(node, "type")
                .is_some_and(|t| t.eq_ignore_ascii_case("reset")),
            Some("input") => self
                .doc
                .attr(node, "type")
                .is_some_and(|t| {
                    t.eq_ignore_ascii_case("submit") || t.eq_ignore_ascii_case("button")
                }),
            _ => false,
        }
    }

    /// The code being submitted: the last edited field, else the first text
    /// field in the control's form.
    fn submitted_code(&self, control: NodeId) -> String {
        let field = self.last_edited.or_else(|| {
            let form = self.doc.closest(control, "form")?;
            self.doc
                .descendants(form)
                .into_iter()
                .find(|&n| self.doc.tag(n) == Some("input"))
        });
        field
            .map(|f| self.doc.value(f).trim().to_uppercase())
            .unwrap_or_default()
    }

    fn on_activate(&mut self, control: NodeId) {
        if !self.is_submit_control(control) {
            return;
        }
        let code = self.submitted_code(control);
        // A synthetic click followed by a native one submits once.
        if self.pending.iter().any(|(_, r)| r.code() == code) {
            return;
        }
        let reaction = match self.codes.get(&code) {
            Some(&amount) if !code.is_empty() => Reaction::Accept { code, amount },
            _ => Reaction::Reject { code },
        };
        debug!(?reaction, "simulated checkout scheduled reaction");
        self.pending.push((Instant::now() + self.latency, reaction));
    }

    fn apply(&mut self, reaction: Reaction) {
        if let Some(old) = self.message.take() {
            self.doc.remove(old);
        }
        let body = self.doc.body();
        let message = match reaction {
            Reaction::Accept { code, amount } => {
                self.total = (self.total - amount).max(Decimal::ZERO);
                if let Some(node) = self.total_node {
                    self.doc.set_text(node, &format_total(self.total));
                }
                let node = self.doc.create_element("div", &[("class", "coupon-success")]);
                self.doc.append_child(body, node);
                self.doc
                    .append_text(node, &format!("Rabattkoden {code} har lagts till"));
                node
            }
            Reaction::Reject { .. } => {
                let node = self.doc.create_element("div", &[("class", "coupon-error")]);
                self.doc.append_child(body, node);
                self.doc.append_text(node, "Ogiltig rabattkod");
                node
            }
        };
        self.message = Some(message);
    }
}

fn format_total(total: Decimal) -> String {
    format!("{:.2} kr", total.round_dp(2))
}

impl Page for SimulatedCheckout {
    fn document(&self) -> &Document {
        &self.doc
    }

    fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), PageError> {
        ensure_editable(&self.doc, node)?;
        self.doc.set_value(node, value);
        self.last_edited = Some(node);
        Ok(())
    }

    fn dispatch(&mut self, node: NodeId, event: DomEvent) -> Result<(), PageError> {
        ensure_attached(&self.doc, node)?;
        self.doc.record_event(node, event);
        if event == DomEvent::Click {
            self.on_activate(node);
        }
        Ok(())
    }

    fn click(&mut self, node: NodeId) -> Result<(), PageError> {
        ensure_attached(&self.doc, node)?;
        self.doc.record_event(node, DomEvent::Click);
        self.on_activate(node);
        Ok(())
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|(at, _)| *at <= now);
        self.pending = later;
        for (_, reaction) in due {
            self.apply(reaction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout() -> (SimulatedCheckout, NodeId, NodeId) {
        let doc = Document::parse(
            r#"<form><input name="promo"><button type="submit">Använd</button></form>
               <div class="order-total">100,00 kr</div>"#,
        );
        let input = doc.elements()[4];
        let button = doc.elements()[5];
        let sim = SimulatedCheckout::new(doc).with_code("save10", Decimal::TEN);
        (sim, input, button)
    }

    #[tokio::test(start_paused = true)]
    async fn valid_code_lowers_total_after_latency() {
        let (mut sim, input, button) = checkout();
        assert_eq!(sim.total(), Decimal::ONE_HUNDRED);

        sim.set_value(input, "Save10").expect("editable");
        sim.dispatch(button, DomEvent::Click).expect("attached");
        sim.click(button).expect("attached");
        sim.tick();
        assert_eq!(price::read_total(sim.document()), Some(Decimal::ONE_HUNDRED));

        tokio::time::sleep(DEFAULT_LATENCY).await;
        sim.tick();
        assert_eq!(sim.total(), Decimal::from(90));
        assert_eq!(price::read_total(sim.document()), Some(Decimal::from(90)));
        assert_eq!(sim.pending.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_code_shows_error_and_replaces_previous_message() {
        let (sim, input, button) = checkout();
        let mut sim = sim.with_latency(Duration::ZERO);

        sim.set_value(input, "NOPE").expect("editable");
        sim.click(button).expect("attached");
        sim.tick();
        sim.set_value(input, "SAVE10").expect("editable");
        sim.click(button).expect("attached");
        sim.tick();

        let doc = sim.document();
        let messages: Vec<String> = doc
            .elements()
            .into_iter()
            .filter(|&n| doc.classes(n).iter().any(|c| c.starts_with("coupon-")))
            .map(|n| doc.text_content(n))
            .collect();
        assert_eq!(messages, vec!["Rabattkoden SAVE10 har lagts till".to_string()]);
    }

    #[test]
    fn with_total_adds_total_element_when_missing() {
        let sim = SimulatedCheckout::new(Document::parse("<input>"))
            .with_total(Decimal::from(250));
        assert_eq!(price::read_total(sim.document()), Some(Decimal::from(250)));
    }

    #[test]
    fn non_submit_clicks_are_ignored() {
        let (mut sim, input, _) = checkout();
        sim.click(input).expect("attached");
        assert!(sim.pending.is_empty());
    }
}
