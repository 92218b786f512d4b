//! Built-in locator strategies.

use std::sync::LazyLock;

use regex::Regex;

use super::{LocateContext, Locator};
use crate::dom::{Document, NodeId};
use crate::selector::Selector;

const INPUT_ATTRIBUTES: &[&str] = &[
    "name",
    "id",
    "class",
    "placeholder",
    "aria-label",
    "data-testid",
];

const INPUT_KEYWORDS: &[&str] = &["coupon", "promo", "discount", "voucher", "rabatt", "kod"];

const INPUT_CONTAINERS: &[&str] = &[
    r#"[data-testid="coupon-input"]"#,
    r#"[data-testid="promo-code-input"]"#,
    ".coupon-input input",
    ".promo-code input",
    ".discount-code input",
    "#coupon-code",
    "#promo-code",
    "#discount-code",
    "#rabattkod",
    ".checkout-coupon input",
    ".cart-coupon input",
];

const APPLY_SELECTORS: &[&str] = &[
    r#"[data-testid="apply-coupon"]"#,
    r#"[data-testid="apply-promo"]"#,
    ".coupon-apply",
    ".promo-apply",
    ".apply-coupon",
    ".apply-promo",
    "#apply-coupon",
    "#apply-promo",
    r#"button[data-testid*="apply" i]"#,
];

/// Button wording that means "apply this code", Swedish first.
pub const ACTION_WORDS: &[&str] = &[
    "applicera",
    "använd",
    "tillämpa",
    "lägg till",
    "apply",
    "add",
    "ok",
];

fn compile(selectors: impl IntoIterator<Item = String>) -> Vec<Selector> {
    selectors
        .into_iter()
        .map(|s| Selector::parse(&s).expect("valid built-in selector"))
        .collect()
}

static KEYWORD_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    compile(INPUT_ATTRIBUTES.iter().flat_map(|attr| {
        INPUT_KEYWORDS
            .iter()
            .map(move |kw| format!(r#"input[{attr}*="{kw}" i]"#))
    }))
});

static CONTAINER_SELECTORS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| compile(INPUT_CONTAINERS.iter().map(|s| (*s).to_string())));

static APPLY: LazyLock<Vec<Selector>> =
    LazyLock::new(|| compile(APPLY_SELECTORS.iter().map(|s| (*s).to_string())));

static BUTTON_LIKE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"button, input[type="submit" i], input[type="button" i]"#)
        .expect("valid button selector")
});

static SUBMIT_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"button[type="submit" i]"#).expect("valid selector"));

static SUBMIT_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="submit" i]"#).expect("valid selector"));

static ANY_BUTTON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("button").expect("valid selector"));

static WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("valid word regex"));

/// A visible text-like `<input>`: `type` absent, `text` or `search`.
pub fn is_text_input(doc: &Document, id: NodeId) -> bool {
    doc.tag(id) == Some("input")
        && doc.attr(id, "type").is_none_or(|t| {
            let t = t.trim();
            t.is_empty() || t.eq_ignore_ascii_case("text") || t.eq_ignore_ascii_case("search")
        })
        && doc.is_visible(id)
}

/// A visible text input or textarea; store overrides may point at either.
pub fn is_editable(doc: &Document, id: NodeId) -> bool {
    (is_text_input(doc, id) || doc.tag(id) == Some("textarea")) && doc.is_visible(id)
}

pub fn is_visible_element(doc: &Document, id: NodeId) -> bool {
    doc.is_visible(id)
}

fn first_accepted(
    doc: &Document,
    selectors: &[Selector],
    accept: fn(&Document, NodeId) -> bool,
) -> Option<NodeId> {
    selectors
        .iter()
        .find_map(|sel| doc.select(sel).into_iter().find(|&id| accept(doc, id)))
}

/// Any selector, with an acceptance check on the matched element.
pub struct SelectorLocator {
    name: &'static str,
    selector: Selector,
    accept: fn(&Document, NodeId) -> bool,
}

impl SelectorLocator {
    #[must_use]
    pub fn new(
        name: &'static str,
        selector: Selector,
        accept: fn(&Document, NodeId) -> bool,
    ) -> Self {
        Self {
            name,
            selector,
            accept,
        }
    }
}

impl Locator for SelectorLocator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn locate(&self, doc: &Document, _ctx: &LocateContext) -> Option<NodeId> {
        first_accepted(doc, std::slice::from_ref(&self.selector), self.accept)
    }
}

/// Inputs whose identifying attributes mention coupons, in Swedish or English.
pub struct KeywordInputLocator;

impl Locator for KeywordInputLocator {
    fn name(&self) -> &'static str {
        "attribute_keywords"
    }

    fn locate(&self, doc: &Document, _ctx: &LocateContext) -> Option<NodeId> {
        first_accepted(doc, &KEYWORD_SELECTORS, is_text_input)
    }
}

/// Inputs inside well-known coupon widgets.
pub struct ContainerInputLocator;

impl Locator for ContainerInputLocator {
    fn name(&self) -> &'static str {
        "known_containers"
    }

    fn locate(&self, doc: &Document, _ctx: &LocateContext) -> Option<NodeId> {
        first_accepted(doc, &CONTAINER_SELECTORS, is_text_input)
    }
}

/// Submit controls sharing a container with the input: the closest form,
/// else the closest div, else the parent.
pub struct ContainerSubmitLocator;

impl Locator for ContainerSubmitLocator {
    fn name(&self) -> &'static str {
        "input_container"
    }

    fn locate(&self, doc: &Document, ctx: &LocateContext) -> Option<NodeId> {
        let input = ctx.input?;
        let container = doc
            .closest(input, "form")
            .or_else(|| doc.closest(input, "div"))
            .or_else(|| doc.parent(input))?;
        [&*SUBMIT_BUTTON, &*SUBMIT_INPUT, &*ANY_BUTTON]
            .into_iter()
            .find_map(|sel| {
                doc.select_within(container, sel)
                    .into_iter()
                    .find(|&id| doc.is_visible(id))
            })
    }
}

/// Well-known apply-button selectors anywhere on the page.
pub struct KnownApplyLocator;

impl Locator for KnownApplyLocator {
    fn name(&self) -> &'static str {
        "known_apply_selectors"
    }

    fn locate(&self, doc: &Document, _ctx: &LocateContext) -> Option<NodeId> {
        first_accepted(doc, &APPLY, is_visible_element)
    }
}

/// Buttons labelled with an action word, matched as whole words.
pub struct ActionWordLocator;

impl Locator for ActionWordLocator {
    fn name(&self) -> &'static str {
        "action_words"
    }

    fn locate(&self, doc: &Document, _ctx: &LocateContext) -> Option<NodeId> {
        doc.select(&BUTTON_LIKE)
            .into_iter()
            .filter(|&id| doc.is_visible(id))
            .find(|&id| {
                let label = if doc.tag(id) == Some("input") {
                    doc.value(id).to_string()
                } else {
                    doc.text_content(id)
                };
                has_action_word(&label)
            })
    }
}

/// `true` if `label` contains an action word as a whole word or phrase.
#[must_use]
pub fn has_action_word(label: &str) -> bool {
    let lower = label.to_lowercase();
    let words: Vec<&str> = WORDS.find_iter(&lower).map(|m| m.as_str()).collect();
    ACTION_WORDS.iter().any(|action| {
        let phrase: Vec<&str> = action.split_whitespace().collect();
        words.windows(phrase.len()).any(|w| w == phrase.as_slice())
    })
}
