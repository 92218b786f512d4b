//! Locating the coupon field and its apply control on a checkout page.
//!
//! Each lookup runs an ordered chain of [`Locator`] strategies and returns
//! the first hit: the store's own selector override, then generic
//! heuristics. Not finding anything is a normal outcome, not an error.

mod heuristics;

pub use heuristics::{
    has_action_word, is_editable, is_text_input, ActionWordLocator, ContainerInputLocator,
    ContainerSubmitLocator, KeywordInputLocator, KnownApplyLocator, SelectorLocator,
    ACTION_WORDS,
};

use clipp_core::{StoreConfig, StoresFile};

use crate::dom::{Document, NodeId};
use crate::error::SelectorError;
use crate::selector::Selector;

/// What a locator knows besides the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocateContext {
    /// The coupon input, once found. Submit locators search around it.
    pub input: Option<NodeId>,
}

/// One strategy for finding an element.
pub trait Locator: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, doc: &Document, ctx: &LocateContext) -> Option<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTarget {
    pub input: NodeId,
    pub submit: Option<NodeId>,
}

/// Ordered locator chains for one store.
pub struct Prober {
    inputs: Vec<Box<dyn Locator>>,
    submits: Vec<Box<dyn Locator>>,
}

impl Default for Prober {
    /// Generic heuristics only.
    fn default() -> Self {
        Self::with_overrides(None, None)
    }
}

impl std::fmt::Debug for Prober {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |chain: &[Box<dyn Locator>]| {
            chain.iter().map(|l| l.name()).collect::<Vec<_>>()
        };
        f.debug_struct("Prober")
            .field("inputs", &names(&self.inputs))
            .field("submits", &names(&self.submits))
            .finish()
    }
}

fn parse_override(
    store: &StoreConfig,
    raw: Option<&str>,
) -> Result<Option<Selector>, SelectorError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(Selector::parse)
        .transpose()
        .map_err(|e| SelectorError::StoreOverride {
            store_id: store.store_id.clone(),
            source: Box::new(e),
        })
}

impl Prober {
    /// Builds the chains for `store`. An override selector that does not
    /// parse is logged and skipped; the generic heuristics still run.
    #[must_use]
    pub fn new(store: &StoreConfig) -> Self {
        let lenient = |raw: Option<&str>| match parse_override(store, raw) {
            Ok(sel) => sel,
            Err(e) => {
                tracing::warn!(
                    store = %store.store_id,
                    error = %e,
                    "ignoring store selector override"
                );
                None
            }
        };
        let input = lenient(store.coupon_input_selector.as_deref());
        let submit = lenient(store.apply_button_selector.as_deref());
        Self::with_overrides(input, submit)
    }

    /// Like [`Prober::new`] but rejects unparsable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError::StoreOverride`] naming the store.
    pub fn strict(store: &StoreConfig) -> Result<Self, SelectorError> {
        let input = parse_override(store, store.coupon_input_selector.as_deref())?;
        let submit = parse_override(store, store.apply_button_selector.as_deref())?;
        Ok(Self::with_overrides(input, submit))
    }

    fn with_overrides(input: Option<Selector>, submit: Option<Selector>) -> Self {
        let mut inputs: Vec<Box<dyn Locator>> = Vec::new();
        if let Some(sel) = input {
            inputs.push(Box::new(SelectorLocator::new("store_override", sel, is_editable)));
        }
        inputs.push(Box::new(KeywordInputLocator));
        inputs.push(Box::new(ContainerInputLocator));

        let mut submits: Vec<Box<dyn Locator>> = Vec::new();
        if let Some(sel) = submit {
            submits.push(Box::new(SelectorLocator::new(
                "store_override",
                sel,
                heuristics::is_visible_element,
            )));
        }
        submits.push(Box::new(ContainerSubmitLocator));
        submits.push(Box::new(KnownApplyLocator));
        submits.push(Box::new(ActionWordLocator));

        Self { inputs, submits }
    }

    fn run(
        chain: &[Box<dyn Locator>],
        doc: &Document,
        ctx: &LocateContext,
        what: &str,
    ) -> Option<NodeId> {
        let found = chain
            .iter()
            .find_map(|locator| locator.locate(doc, ctx).map(|id| (locator.name(), id)));
        match found {
            Some((strategy, id)) => {
                tracing::debug!(what, strategy, node = ?id, "located element");
                Some(id)
            }
            None => {
                tracing::debug!(what, "no element located");
                None
            }
        }
    }

    #[must_use]
    pub fn find_input(&self, doc: &Document) -> Option<NodeId> {
        Self::run(&self.inputs, doc, &LocateContext::default(), "coupon_input")
    }

    #[must_use]
    pub fn find_submit(&self, doc: &Document, input: NodeId) -> Option<NodeId> {
        let ctx = LocateContext { input: Some(input) };
        Self::run(&self.submits, doc, &ctx, "apply_control")
    }

    /// The coupon input and, if one can be found, its apply control.
    #[must_use]
    pub fn probe(&self, doc: &Document) -> Option<ProbeTarget> {
        let input = self.find_input(doc)?;
        Some(ProbeTarget {
            input,
            submit: self.find_submit(doc, input),
        })
    }
}

#[must_use]
pub fn find_input(doc: &Document, store: &StoreConfig) -> Option<NodeId> {
    Prober::new(store).find_input(doc)
}

#[must_use]
pub fn find_submit(doc: &Document, input: NodeId, store: &StoreConfig) -> Option<NodeId> {
    Prober::new(store).find_submit(doc, input)
}

/// Checks that every store's override selectors parse.
///
/// # Errors
///
/// Returns the first [`SelectorError::StoreOverride`] found.
pub fn validate_store_selectors(stores: &StoresFile) -> Result<(), SelectorError> {
    stores
        .stores
        .iter()
        .try_for_each(|store| Prober::strict(store).map(drop))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(input: Option<&str>, submit: Option<&str>) -> StoreConfig {
        StoreConfig {
            store_id: "ellos".to_string(),
            store_name: "Ellos".to_string(),
            domain_patterns: vec!["ellos.se".to_string()],
            active: true,
            coupon_input_selector: input.map(str::to_string),
            apply_button_selector: submit.map(str::to_string),
        }
    }

    const CHECKOUT: &str = r#"
        <div class="summary">
          <label>Presentkort</label><input id="gift" name="giftcard">
          <input id="code" name="promoCode"><button id="auto">Använd</button>
        </div>
        <section><button id="custom" class="js-redeem">Lös in</button></section>"#;

    #[test]
    fn generic_chain_finds_input_and_submit() {
        let doc = Document::parse(CHECKOUT);
        let target = Prober::default().probe(&doc).expect("target");
        assert_eq!(doc.attr(target.input, "id"), Some("code"));
        assert_eq!(target.submit.and_then(|s| doc.attr(s, "id")), Some("auto"));
    }

    #[test]
    fn store_overrides_run_first() {
        let doc = Document::parse(CHECKOUT);
        let prober = Prober::new(&store(Some("#gift"), Some(".js-redeem")));
        let target = prober.probe(&doc).expect("target");
        assert_eq!(doc.attr(target.input, "id"), Some("gift"));
        assert_eq!(target.submit.and_then(|s| doc.attr(s, "id")), Some("custom"));
    }

    #[test]
    fn override_matching_nothing_falls_through() {
        let doc = Document::parse(CHECKOUT);
        let found = find_input(&doc, &store(Some("#missing"), None)).expect("input");
        assert_eq!(doc.attr(found, "id"), Some("code"));
    }

    #[test]
    fn invalid_override_is_lenient_in_new_and_strict_in_validation() {
        let bad = store(Some("input[name=promo"), None);
        let doc = Document::parse(CHECKOUT);
        assert!(Prober::new(&bad).find_input(&doc).is_some());

        let file = StoresFile {
            stores: vec![store(None, None), bad],
            coupon_sources: Vec::new(),
        };
        let err = validate_store_selectors(&file).unwrap_err();
        assert!(matches!(
            err,
            SelectorError::StoreOverride { ref store_id, .. } if store_id == "ellos"
        ));
    }

    #[test]
    fn overrides_accept_full_css() {
        let doc = Document::parse(
            r#"<form class="voucher">
                 <input type="hidden" name="voucher" value="csrf">
                 <label for="v">Kampanjkod</label>
                 <input id="v" name="voucher">
                 <span class="hint">Max en kod</span>
                 <button id="save">Spara</button>
                 <button id="redeem">Lös in</button>
               </form>"#,
        );
        let overrides = store(
            Some("input:not([type=hidden])[name=voucher]"),
            Some("label + input ~ button:last-of-type"),
        );
        let file = StoresFile {
            stores: vec![overrides.clone()],
            coupon_sources: Vec::new(),
        };
        assert_eq!(validate_store_selectors(&file), Ok(()));

        let target = Prober::strict(&overrides)
            .expect("overrides parse")
            .probe(&doc)
            .expect("target");
        assert_eq!(doc.attr(target.input, "id"), Some("v"));
        assert_eq!(target.submit.and_then(|s| doc.attr(s, "id")), Some("redeem"));
    }

    #[test]
    fn no_input_is_none() {
        let doc = Document::parse("<p>Tom varukorg</p><button>Ok</button>");
        assert!(Prober::default().probe(&doc).is_none());
    }

    #[test]
    fn submit_falls_back_to_action_words_outside_container() {
        let doc = Document::parse(
            r#"<p><input name="rabattkod" id="in"></p>
               <footer><button id="apply">Lägg till</button></footer>"#,
        );
        let prober = Prober::default();
        let input = prober.find_input(&doc).expect("input");
        // The paragraph container has no buttons.
        let submit = find_submit(&doc, input, &store(None, None)).expect("submit");
        assert_eq!(doc.attr(submit, "id"), Some("apply"));
    }
}
