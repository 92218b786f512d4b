use super::{Document, NodeId};

/// Elements whose content is never rendered.
const NON_RENDERED: &[&str] = &["head", "script", "style", "template", "noscript", "title", "meta"];

/// Declarations from an inline `style` attribute, lower-cased.
fn inline_style(doc: &Document, id: NodeId) -> Vec<(String, String)> {
    doc.attr(id, "style")
        .map(|style| {
            style
                .split(';')
                .filter_map(|decl| {
                    let (prop, value) = decl.split_once(':')?;
                    let value = value.trim().trim_end_matches("!important").trim();
                    Some((prop.trim().to_ascii_lowercase(), value.to_ascii_lowercase()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn style_prop(doc: &Document, id: NodeId, prop: &str) -> Option<String> {
    inline_style(doc, id)
        .into_iter()
        .rev()
        .find(|(p, _)| p == prop)
        .map(|(_, v)| v)
}

fn is_zero_length(value: &str) -> bool {
    let number = value.trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '%');
    number.parse::<f64>().is_ok_and(|n| n == 0.0)
}

/// Hidden by this element's own attributes or style, ignoring inheritance
/// of `visibility`.
fn hides_subtree(doc: &Document, id: NodeId) -> bool {
    if doc.tag(id).is_some_and(|t| NON_RENDERED.contains(&t)) || doc.has_attr(id, "hidden") {
        return true;
    }
    if style_prop(doc, id, "display").is_some_and(|d| d == "none") {
        return true;
    }
    style_prop(doc, id, "opacity").is_some_and(|o| o.parse::<f64>().is_ok_and(|n| n <= 0.0))
}

impl Document {
    /// Approximates whether an element is rendered and perceivable.
    #[must_use]
    pub fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_element(id) || !self.is_attached(id) {
            return false;
        }
        if self.tag(id) == Some("input")
            && self
                .attr(id, "type")
                .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        {
            return false;
        }
        for prop in ["width", "height"] {
            if style_prop(self, id, prop).is_some_and(|v| is_zero_length(&v)) {
                return false;
            }
        }
        if std::iter::once(id)
            .chain(self.ancestors(id))
            .any(|n| hides_subtree(self, n))
        {
            return false;
        }
        // Nearest declared visibility wins.
        let visibility = std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|n| style_prop(self, n, "visibility"));
        !matches!(visibility.as_deref(), Some("hidden" | "collapse"))
    }
}
