//! Reading the order total off a checkout page.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::dom::{Document, NodeId};
use crate::selector::Selector;

/// Where checkout pages usually render the order total.
pub const TOTAL_SELECTORS: &str = ".order-total, .cart-total, .checkout-total, \
    [data-testid=\"total\"], [data-testid=\"order-total\"], .total-price, .grand-total, \
    #order-total, .summary-total";

static TOTAL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(TOTAL_SELECTORS).expect("valid total selectors"));

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d\s\u{a0}.,]*").expect("valid amount regex"));

/// Parses the first amount in `text`, accepting Swedish and English
/// grouping: `1 299,50 kr`, `$1,299.50`, `1.299,50 €`.
///
/// With both `.` and `,` present the last one is the decimal separator. A
/// single separator kind is decimal only when it occurs once and is
/// followed by one or two digits.
#[must_use]
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let raw = AMOUNT.find(text)?.as_str();
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let compact = compact.trim_end_matches(['.', ',']);

    let last_dot = compact.rfind('.');
    let last_comma = compact.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            let (decimal, group) = if dot > comma { ('.', ',') } else { (',', '.') };
            compact.replace(group, "").replace(decimal, ".")
        }
        (Some(pos), None) | (None, Some(pos)) => {
            let sep = if last_dot.is_some() { '.' } else { ',' };
            let decimals = compact.len() - pos - 1;
            if compact.matches(sep).count() == 1 && (1..=2).contains(&decimals) {
                compact.replace(sep, ".")
            } else {
                compact.replace(sep, "")
            }
        }
        (None, None) => compact.to_string(),
    };
    Decimal::from_str(&normalized).ok()
}

/// The first visible total element whose text parses as an amount.
pub(crate) fn total_node(doc: &Document) -> Option<(NodeId, Decimal)> {
    doc.select(&TOTAL)
        .into_iter()
        .filter(|&id| doc.is_visible(id))
        .find_map(|id| parse_amount(&doc.text_content(id)).map(|amount| (id, amount)))
}

/// The first visible total on the page that parses as an amount.
#[must_use]
pub fn read_total(doc: &Document) -> Option<Decimal> {
    total_node(doc).map(|(_, amount)| amount)
}
