use serde::Serialize;

use crate::dom::{Document, NodeId};
use crate::error::PageError;

/// Synthetic events dispatched while filling in and submitting a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "key")]
pub enum DomEvent {
    Focus,
    Input,
    KeyDown(char),
    KeyUp(char),
    Change,
    Blur,
    MouseDown,
    MouseUp,
    Click,
}

/// The page a coupon attempt runs against.
///
/// Implementations own the document and react to interactions, possibly
/// later: [`Page::tick`] gives them a chance to apply delayed reactions
/// while the caller polls.
pub trait Page: Send {
    fn document(&self) -> &Document;

    /// Replaces the form value of an input or textarea.
    ///
    /// # Errors
    ///
    /// [`PageError::Detached`] if the node is gone, [`PageError::NotEditable`]
    /// if it is not a text field.
    fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), PageError>;

    /// Delivers a synthetic event to `node`.
    ///
    /// # Errors
    ///
    /// [`PageError::Detached`] if the node is gone.
    fn dispatch(&mut self, node: NodeId, event: DomEvent) -> Result<(), PageError>;

    /// Native activation of `node`, as `element.click()` would do.
    ///
    /// # Errors
    ///
    /// [`PageError::Detached`] if the node is gone.
    fn click(&mut self, node: NodeId) -> Result<(), PageError>;

    /// Applies any reactions that have come due.
    fn tick(&mut self) {}
}

pub(crate) fn ensure_attached(doc: &Document, node: NodeId) -> Result<(), PageError> {
    if doc.is_attached(node) {
        Ok(())
    } else {
        Err(PageError::Detached(node))
    }
}

pub(crate) fn ensure_editable(doc: &Document, node: NodeId) -> Result<(), PageError> {
    ensure_attached(doc, node)?;
    match doc.tag(node) {
        Some("input" | "textarea") => Ok(()),
        other => Err(PageError::NotEditable {
            node,
            tag: other.unwrap_or("#text").to_string(),
        }),
    }
}

/// A static page: values and events are recorded, nothing reacts.
impl Page for Document {
    fn document(&self) -> &Document {
        self
    }

    fn set_value(&mut self, node: NodeId, value: &str) -> Result<(), PageError> {
        ensure_editable(self, node)?;
        Document::set_value(self, node, value);
        Ok(())
    }

    fn dispatch(&mut self, node: NodeId, event: DomEvent) -> Result<(), PageError> {
        ensure_attached(self, node)?;
        self.record_event(node, event);
        Ok(())
    }

    fn click(&mut self, node: NodeId) -> Result<(), PageError> {
        ensure_attached(self, node)?;
        self.record_event(node, DomEvent::Click);
        Ok(())
    }
}
