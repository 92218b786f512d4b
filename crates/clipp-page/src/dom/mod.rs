//! Element tree standing in for a live page.
//!
//! The tree is a [`scraper::Html`] arena; nodes are addressed by [`NodeId`].
//! Structural and attribute changes bump a mutation counter, the analogue of
//! what a `MutationObserver` would see; input values and dispatched events
//! do not.

mod parse;
mod style;

use std::collections::HashMap;

use ego_tree::NodeRef;
use html5ever::tendril::StrTendril as AttrValue;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use scraper::node::{Element, Text};
use scraper::{ElementRef, Html, Node, StrTendril};

use crate::page::DomEvent;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Handle to a node in one [`Document`]. Only meaningful for the document
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(ego_tree::NodeId);

#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    /// Current form values, separate from the `value` attribute.
    values: HashMap<NodeId, String>,
    mutations: u64,
    events: Vec<(NodeId, DomEvent)>,
    focused: Option<NodeId>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn attribute(name: &str, value: &str) -> Attribute {
    Attribute {
        name: QualName::new(
            None,
            Namespace::from(""),
            LocalName::from(name.to_ascii_lowercase()),
        ),
        value: AttrValue::from_slice(value),
    }
}

impl Document {
    /// An empty `<html><head></head><body></body></html>` document.
    #[must_use]
    pub fn new() -> Self {
        Self::from_html(Html::parse_document(""))
    }

    fn from_html(html: Html) -> Self {
        Self {
            html,
            values: HashMap::new(),
            mutations: 0,
            events: Vec::new(),
            focused: None,
        }
    }

    /// The document node every attached element descends from.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId(self.html.tree.root().id())
    }

    /// The `<body>` element, or the root when there is none.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.elements()
            .into_iter()
            .find(|&id| self.tag(id) == Some("body"))
            .unwrap_or_else(|| self.root())
    }

    /// Number of structural and attribute mutations since construction.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    fn node(&self, id: NodeId) -> Option<NodeRef<'_, Node>> {
        self.html.tree.get(id.0)
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        self.html.tree.get(id.0)?.value().as_element()
    }

    /// The element as scraper sees it, for selector matching.
    pub(crate) fn element_ref(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.node(id).and_then(ElementRef::wrap)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Lower-cased tag name; `None` for text and the document node.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(Element::name)
    }

    #[must_use]
    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Attribute lookup by (case-insensitive) name.
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attrs()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Whitespace-separated class list.
    #[must_use]
    pub fn classes(&self, id: NodeId) -> Vec<&str> {
        self.attr(id, "class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent().map(|p| NodeId(p.id()))
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| n.children().map(|c| NodeId(c.id())).collect())
            .unwrap_or_default()
    }

    /// Element ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
            .filter(move |&p| self.is_element(p))
    }

    /// Nearest element, starting at `id` itself, whose tag is `tag`.
    #[must_use]
    pub fn closest(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&n| self.tag(n) == Some(tag))
    }

    /// Element descendants of `id` in document order, excluding `id`.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|n| {
                n.descendants()
                    .skip(1)
                    .filter(|d| d.value().is_element())
                    .map(|d| NodeId(d.id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every attached element in document order.
    #[must_use]
    pub fn elements(&self) -> Vec<NodeId> {
        self.descendants(self.root())
    }

    /// `true` if the node is reachable from the root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        let root = self.root();
        self.contains(id)
            && std::iter::successors(Some(id), |&n| self.parent(n)).any(|n| n == root)
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| {
                n.descendants()
                    .filter_map(|d| d.value().as_text())
                    .map(|t| &**t)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current form value: the last value set, else the `value` attribute.
    #[must_use]
    pub fn value(&self, id: NodeId) -> &str {
        match self.values.get(&id) {
            Some(value) => value,
            None => self.attr(id, "value").unwrap_or(""),
        }
    }

    /// Sets the form value. Not a DOM mutation.
    pub fn set_value(&mut self, id: NodeId, new_value: &str) {
        if self.is_element(id) {
            self.values.insert(id, new_value.to_string());
        }
    }

    #[must_use]
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Events dispatched so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[(NodeId, DomEvent)] {
        &self.events
    }

    /// Logs an event and tracks focus. Not a DOM mutation.
    pub fn record_event(&mut self, id: NodeId, event: DomEvent) {
        match event {
            DomEvent::Focus => self.focused = Some(id),
            DomEvent::Blur if self.focused == Some(id) => self.focused = None,
            _ => {}
        }
        self.events.push((id, event));
    }

    /// Creates a detached element. Attach it with [`Document::append_child`].
    pub fn create_element(&mut self, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let name = QualName::new(
            None,
            Namespace::from(HTML_NAMESPACE),
            LocalName::from(tag.to_ascii_lowercase()),
        );
        let attrs = attrs.iter().map(|(k, v)| attribute(k, v)).collect();
        let node = Node::Element(Element::new(name, attrs));
        NodeId(self.html.tree.orphan(node).id())
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        let node = Node::Text(Text {
            text: StrTendril::from_slice(text),
        });
        NodeId(self.html.tree.orphan(node).id())
    }

    /// Links `child` under `parent` without counting a mutation.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(parent.0) {
            node.append_id(child.0);
        }
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.html.tree.get_mut(id.0) {
            node.detach();
        }
    }

    fn replace_element(&mut self, id: NodeId, element: Element) {
        if let Some(mut node) = self.html.tree.get_mut(id.0) {
            *node.value() = Node::Element(element);
        }
    }

    /// Moves `child` (with its subtree) to the end of `parent`'s children.
    /// Ignored when `child` is `parent` or one of its ancestors.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.contains(parent) || !self.contains(child) {
            return;
        }
        if std::iter::successors(Some(parent), |&n| self.parent(n)).any(|n| n == child) {
            tracing::debug!(?parent, ?child, "ignoring append that would create a cycle");
            return;
        }
        self.attach(parent, child);
        self.mutations += 1;
    }

    /// Appends a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if !self.contains(parent) {
            return;
        }
        let text_node = self.create_text(text);
        self.attach(parent, text_node);
        self.mutations += 1;
    }

    /// Detaches `id` from the tree. The node stays addressable but is no
    /// longer attached or visible.
    pub fn remove(&mut self, id: NodeId) {
        if self.parent(id).is_some() {
            self.detach(id);
            self.mutations += 1;
        }
        if self.focused.is_some_and(|f| !self.is_attached(f)) {
            self.focused = None;
        }
    }

    /// Replaces all children of `id` with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if !self.is_element(id) {
            return;
        }
        for child in self.children(id) {
            self.detach(child);
        }
        let text_node = self.create_text(text);
        self.attach(id, text_node);
        self.mutations += 1;
    }

    /// Sets an attribute; a no-op (and no mutation) when the value is unchanged.
    pub fn set_attr(&mut self, id: NodeId, name: &str, new_value: &str) {
        if self.attr(id, name) == Some(new_value) {
            return;
        }
        let Some((qual_name, mut attrs)) = self.element_without_attr(id, name) else {
            return;
        };
        attrs.push(attribute(name, new_value));
        self.replace_element(id, Element::new(qual_name, attrs));
        self.mutations += 1;
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if !self.has_attr(id, name) {
            return;
        }
        let Some((qual_name, attrs)) = self.element_without_attr(id, name) else {
            return;
        };
        self.replace_element(id, Element::new(qual_name, attrs));
        self.mutations += 1;
    }

    /// The element's name and its attributes minus `name`. Elements cache
    /// their id and class list, so edits rebuild the element.
    fn element_without_attr(
        &self,
        id: NodeId,
        name: &str,
    ) -> Option<(QualName, Vec<Attribute>)> {
        let element = self.element(id)?;
        let attrs = element
            .attrs
            .iter()
            .filter(|(k, _)| !(*k.local).eq_ignore_ascii_case(name))
            .map(|(k, v)| Attribute {
                name: k.clone(),
                value: AttrValue::from_slice(v),
            })
            .collect();
        Some((element.name.clone(), attrs))
    }
}
