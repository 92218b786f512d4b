//! Pulls plausible discount-code tokens out of free text.
//!
//! Used on community post titles and bodies. Pure and deterministic.

use std::collections::HashSet;
use std::sync::LazyLock;

use clipp_core::is_valid_code;
use regex::Regex;

/// Ordered code patterns. The first captures bare upper-case tokens; the
/// rest capture the token after an English or Swedish label, any case.
static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b([A-Z0-9]{4,20})\b",
        r#"(?i)rabattkod[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
        r#"(?i)kupong(?:kod)?[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
        r#"(?i)kod[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
        r#"(?i)code[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
        r#"(?i)coupon[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
        r#"(?i)promo[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
        r#"(?i)use[:\s]+["']?([A-Z0-9]{4,20})["']?"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid code pattern"))
    .collect()
});

/// Extracts every candidate code found in `text`.
///
/// Candidates are upper-cased and must pass [`is_valid_code`]: 4–20 chars of
/// `[A-Z0-9]`, at least one letter, not a blacklisted word.
#[must_use]
pub fn extract_codes(text: &str) -> HashSet<String> {
    let mut found = HashSet::new();
    if text.trim().is_empty() {
        return found;
    }

    for pattern in CODE_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let Some(m) = caps.get(1) else {
                continue;
            };
            let candidate = m.as_str().trim().to_uppercase();
            if is_valid_code(&candidate) {
                found.insert(candidate);
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_bare_upper_case_code() {
        let codes = extract_codes("Use code SAVE20 now");
        assert!(codes.contains("SAVE20"), "got {codes:?}");
    }

    #[test]
    fn protocol_words_are_blacklisted() {
        assert!(extract_codes("HTTP GET API").is_empty());
    }

    #[test]
    fn numeric_tokens_are_rejected() {
        assert!(extract_codes("12345").is_empty());
        assert!(extract_codes("code: 2024").is_empty());
    }

    #[test]
    fn labelled_lower_case_code_is_upper_cased() {
        let codes = extract_codes("rabattkod: sommar25 gäller hela veckan");
        assert!(codes.contains("SOMMAR25"), "got {codes:?}");
    }

    #[test]
    fn swedish_label_with_quotes() {
        let codes = extract_codes("Kod: 'vinter15' på allt");
        assert!(codes.contains("VINTER15"), "got {codes:?}");
    }

    #[test]
    fn english_promo_label() {
        let codes = extract_codes("promo bigsale30 works at checkout");
        assert!(codes.contains("BIGSALE30"), "got {codes:?}");
    }

    #[test]
    fn duplicate_mentions_collapse() {
        let codes = extract_codes("SAVE20 is back! code: save20");
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn short_tokens_are_ignored() {
        assert!(extract_codes("Promo: abc").is_empty());
    }

    #[test]
    fn non_ascii_tokens_are_ignored() {
        assert!(!extract_codes("VÄNNER20 är slut").contains("NNER20"));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract_codes("   ").is_empty());
    }

    #[test]
    fn multiple_codes_in_one_post() {
        let codes = extract_codes("Zalando: NYTT15 for new customers, FRIFRAKT for shipping");
        assert!(codes.contains("NYTT15"));
        assert!(codes.contains("FRIFRAKT"));
    }
}
