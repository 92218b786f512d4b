//! Read-only store and coupon-source descriptors.
//!
//! Both lists live in one YAML file (`config/stores.yaml`): `stores:` for the
//! retail sites Clipp recognises and `coupon_sources:` for the adapters the
//! aggregator may query.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY_HERE";

/// Path fragments that indicate a cart or checkout page, in English and Swedish.
const CHECKOUT_TERMS: &[&str] = &[
    "checkout",
    "cart",
    "varukorg",
    "kassa",
    "payment",
    "betalning",
    "order",
    "bestall",
    "confirm",
    "bekrafta",
];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub store_id: String,
    pub store_name: String,
    pub domain_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    /// CSS selector tried before the generic input heuristics.
    #[serde(default)]
    pub coupon_input_selector: Option<String>,
    /// CSS selector tried before the generic apply-control heuristics.
    #[serde(default)]
    pub apply_button_selector: Option<String>,
}

impl StoreConfig {
    /// Cache key component: the store id, lower-cased.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.store_id.trim().to_lowercase()
    }

    /// Returns `true` if any domain pattern occurs in `url` (case-insensitive).
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.domain_patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .any(|p| !p.is_empty() && url.contains(&p))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Overrides the adapter's default endpoint (used for staging and tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SourceConfig {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            api_key: None,
            base_url: None,
        }
    }

    /// The API key, unless it is missing, blank, or still the template placeholder.
    #[must_use]
    pub fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty() && *k != PLACEHOLDER_API_KEY)
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoresFile {
    pub stores: Vec<StoreConfig>,
    #[serde(default)]
    pub coupon_sources: Vec<SourceConfig>,
}

impl StoresFile {
    /// Finds the active store whose domain pattern occurs in `url`.
    #[must_use]
    pub fn match_url(&self, url: &str) -> Option<&StoreConfig> {
        self.stores
            .iter()
            .filter(|s| s.active)
            .find(|s| s.matches_url(url))
    }

    /// Looks a store up by id (case-insensitive).
    #[must_use]
    pub fn store(&self, store_id: &str) -> Option<&StoreConfig> {
        let wanted = store_id.trim().to_lowercase();
        self.stores.iter().find(|s| s.cache_key() == wanted)
    }

    pub fn active_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.coupon_sources.iter().filter(|s| s.active)
    }
}

/// Returns `true` when the URL looks like a cart or checkout page.
#[must_use]
pub fn is_checkout_url(url: &str) -> bool {
    let url = url.to_lowercase();
    CHECKOUT_TERMS.iter().any(|term| url.contains(term))
}

/// Load and validate the stores configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_stores(path: &Path) -> Result<StoresFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::StoresFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let stores_file: StoresFile = serde_yaml::from_str(&content)?;

    validate_stores(&stores_file)?;

    Ok(stores_file)
}

fn validate_stores(stores_file: &StoresFile) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for store in &stores_file.stores {
        if store.store_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store_id must be non-empty".to_string(),
            ));
        }

        if store.store_name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "store '{}' has an empty store_name",
                store.store_id
            )));
        }

        if !store.domain_patterns.iter().any(|p| !p.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "store '{}' needs at least one domain pattern",
                store.store_id
            )));
        }

        for selector in [&store.coupon_input_selector, &store.apply_button_selector]
            .into_iter()
            .flatten()
        {
            if selector.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "store '{}' has an empty selector override",
                    store.store_id
                )));
            }
        }

        if !seen_ids.insert(store.cache_key()) {
            return Err(ConfigError::Validation(format!(
                "duplicate store_id: '{}'",
                store.store_id
            )));
        }
    }

    let mut seen_sources = HashSet::new();
    for source in &stores_file.coupon_sources {
        if source.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "coupon source name must be non-empty".to_string(),
            ));
        }
        if !seen_sources.insert(source.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate coupon source: '{}'",
                source.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(id: &str, domains: &[&str]) -> StoreConfig {
        StoreConfig {
            store_id: id.to_string(),
            store_name: id.to_uppercase(),
            domain_patterns: domains.iter().map(ToString::to_string).collect(),
            active: true,
            coupon_input_selector: None,
            apply_button_selector: None,
        }
    }

    #[test]
    fn validate_rejects_empty_store_id() {
        let file = StoresFile {
            stores: vec![store(" ", &["zalando.se"])],
            coupon_sources: vec![],
        };
        let err = validate_stores(&file).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn validate_rejects_store_without_domains() {
        let file = StoresFile {
            stores: vec![store("zalando", &[""])],
            coupon_sources: vec![],
        };
        let err = validate_stores(&file).unwrap_err();
        assert!(err.to_string().contains("domain pattern"));
    }

    #[test]
    fn validate_rejects_duplicate_ids_case_insensitively() {
        let file = StoresFile {
            stores: vec![store("cdon", &["cdon.se"]), store("CDON", &["cdon.com"])],
            coupon_sources: vec![],
        };
        let err = validate_stores(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate store_id"));
    }

    #[test]
    fn validate_rejects_duplicate_sources() {
        let file = StoresFile {
            stores: vec![store("cdon", &["cdon.se"])],
            coupon_sources: vec![SourceConfig::new("Reddit"), SourceConfig::new("reddit")],
        };
        let err = validate_stores(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate coupon source"));
    }

    #[test]
    fn validate_rejects_blank_selector_override() {
        let mut s = store("cdon", &["cdon.se"]);
        s.apply_button_selector = Some("  ".to_string());
        let file = StoresFile {
            stores: vec![s],
            coupon_sources: vec![],
        };
        assert!(validate_stores(&file).is_err());
    }

    #[test]
    fn match_url_skips_inactive_stores() {
        let mut inactive = store("hm", &["hm.com"]);
        inactive.active = false;
        let file = StoresFile {
            stores: vec![inactive, store("zalando", &["zalando.se", "zalando.com"])],
            coupon_sources: vec![],
        };
        assert!(file.match_url("https://www2.hm.com/sv_se/cart").is_none());
        let hit = file.match_url("https://www.Zalando.se/checkout").unwrap();
        assert_eq!(hit.store_id, "zalando");
    }

    #[test]
    fn store_lookup_is_case_insensitive() {
        let file = StoresFile {
            stores: vec![store("Elgiganten", &["elgiganten.se"])],
            coupon_sources: vec![],
        };
        assert!(file.store("elgiganten").is_some());
        assert!(file.store("komplett").is_none());
    }

    #[test]
    fn placeholder_api_key_is_not_usable() {
        let mut source = SourceConfig::new("CouponAPI.org");
        assert_eq!(source.usable_api_key(), None);
        source.api_key = Some(PLACEHOLDER_API_KEY.to_string());
        assert_eq!(source.usable_api_key(), None);
        source.api_key = Some("k-123".to_string());
        assert_eq!(source.usable_api_key(), Some("k-123"));
    }

    #[test]
    fn source_debug_redacts_api_key() {
        let mut source = SourceConfig::new("LinkMyDeals");
        source.api_key = Some("secret-key".to_string());
        let debug = format!("{source:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn checkout_urls_are_recognised() {
        assert!(is_checkout_url("https://www.cdon.se/varukorg"));
        assert!(is_checkout_url("https://shop.example/Checkout/step-2"));
        assert!(!is_checkout_url("https://www.adlibris.com/se/bok/123"));
    }

    #[test]
    fn yaml_defaults_active_to_true() {
        let yaml = r"
stores:
  - store_id: adlibris
    store_name: Adlibris
    domain_patterns: [adlibris.com]
coupon_sources:
  - name: Reddit
";
        let file: StoresFile = serde_yaml::from_str(yaml).unwrap();
        assert!(file.stores[0].active);
        assert!(file.coupon_sources[0].active);
        assert_eq!(file.active_sources().count(), 1);
    }

    #[test]
    fn load_stores_from_real_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("stores.yaml");
        assert!(
            path.exists(),
            "stores.yaml missing at {path:?}; required for this test"
        );
        let result = load_stores(&path);
        assert!(result.is_ok(), "failed to load stores.yaml: {result:?}");
        assert!(!result.unwrap().stores.is_empty());
    }
}
