//! CSS selectors over a [`Document`], parsed and matched by `scraper`.

use std::fmt;
use std::str::FromStr;

use crate::dom::{Document, NodeId};
use crate::error::SelectorError;

/// A parsed selector list that remembers its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    inner: scraper::Selector,
}

impl Selector {
    /// Parses a selector list.
    ///
    /// # Errors
    ///
    /// Returns [`SelectorError`] for empty input or anything the CSS
    /// selector grammar rejects.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(SelectorError::Empty);
        }
        let inner = scraper::Selector::parse(source).map_err(|e| SelectorError::Invalid {
            selector: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            inner,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `true` if the element matches any selector in the list.
    #[must_use]
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        doc.element_ref(id)
            .is_some_and(|element| self.inner.matches(&element))
    }

    /// Like [`Selector::matches`], with `:scope` bound to `scope`.
    #[must_use]
    pub fn matches_in_scope(&self, doc: &Document, scope: NodeId, id: NodeId) -> bool {
        doc.element_ref(id).is_some_and(|element| {
            self.inner
                .matches_with_scope(&element, doc.element_ref(scope))
        })
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Document {
    /// Attached elements matching `selector`, in document order.
    #[must_use]
    pub fn select(&self, selector: &Selector) -> Vec<NodeId> {
        self.elements()
            .into_iter()
            .filter(|&id| selector.matches(self, id))
            .collect()
    }

    #[must_use]
    pub fn select_first(&self, selector: &Selector) -> Option<NodeId> {
        self.elements()
            .into_iter()
            .find(|&id| selector.matches(self, id))
    }

    /// Descendants of `scope` matching `selector`, in document order.
    /// Ancestors outside `scope` still take part in combinator matching.
    #[must_use]
    pub fn select_within(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&id| selector.matches_in_scope(self, scope, id))
            .collect()
    }
}
