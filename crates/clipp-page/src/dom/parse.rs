use scraper::Html;

use super::Document;

impl Document {
    /// Parses an HTML document. Comments and doctypes stay in the tree but
    /// are skipped by element and text queries.
    #[must_use]
    pub fn parse(html: &str) -> Self {
        Self::from_html(Html::parse_document(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elements_attributes_and_text_in_order() {
        let doc = Document::parse(
            r#"<!doctype html><html><body>
                <!-- cart -->
                <form id="c">
                  <input name="promo" placeholder="Rabattkod">
                  <button type="submit">Använd</button>
                </form>
                <p class="total">Summa: 100 kr</p>
            </body></html>"#,
        );

        let tags: Vec<&str> = doc
            .elements()
            .into_iter()
            .filter_map(|id| doc.tag(id))
            .collect();
        assert_eq!(tags, vec!["html", "head", "body", "form", "input", "button", "p"]);

        let button = doc
            .elements()
            .into_iter()
            .find(|&id| doc.tag(id) == Some("button"))
            .expect("button parsed");
        assert_eq!(doc.text_content(button), "Använd");
        assert_eq!(doc.attr(button, "type"), Some("submit"));
        let form = doc.closest(button, "form").expect("form");
        assert_eq!(doc.body(), doc.parent(form).expect("parent"));
    }

    #[test]
    fn comments_are_not_text() {
        let doc = Document::parse("<p><!-- 50 kr -->Summa: <b>100 kr</b></p>");
        let p = doc
            .elements()
            .into_iter()
            .find(|&id| doc.tag(id) == Some("p"))
            .expect("paragraph parsed");
        assert_eq!(doc.text_content(p), "Summa: 100 kr");
    }

    #[test]
    fn parse_is_not_counted_as_mutation() {
        let doc = Document::parse("<p>hej</p>");
        assert_eq!(doc.mutation_count(), 0);
        assert!(doc.text_content(doc.body()).contains("hej"));
    }
}
