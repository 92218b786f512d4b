//! The [`Coupon`] value type and the discount-code invariant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generic words that look like codes but never are.
///
/// Protocol and format names, plus marketing words that show up in
/// upper case in post titles ("FREE SHIPPING TODAY").
pub const CODE_BLACKLIST: &[&str] = &[
    "HTTP", "HTTPS", "HTML", "JSON", "POST", "GET", "API", "WWW", "FREE", "SALE", "DEAL", "SAVE",
    "OFF", "NOW", "NEW", "CODE", "PROMO", "RABATT", "TODAY", "BEST", "GOOD", "KOD", "COUPON",
    "KUPONG",
];

const MIN_CODE_LEN: usize = 4;
const MAX_CODE_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("invalid coupon code \"{code}\": {reason}")]
    InvalidCode { code: String, reason: &'static str },
}

/// Returns `true` when `code` satisfies the code invariant.
///
/// The input must already be upper-cased: 4–20 characters of `[A-Z0-9]`,
/// at least one letter, and not a blacklisted word.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    check_code(code).is_ok()
}

fn check_code(code: &str) -> Result<(), &'static str> {
    let len = code.chars().count();
    if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
        return Err("length must be between 4 and 20");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("only A-Z and 0-9 are allowed");
    }
    if !code.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("must contain at least one letter");
    }
    if CODE_BLACKLIST.contains(&code) {
        return Err("generic word, not a code");
    }
    Ok(())
}

/// A canonical, validated discount code token.
///
/// Construction trims and upper-cases the raw text, so `"save20 "` and
/// `"SAVE20"` are the same code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    /// Normalizes and validates a raw code.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::InvalidCode`] when the normalized token breaks
    /// the code invariant.
    pub fn parse(raw: &str) -> Result<Self, CouponError> {
        let normalized = raw.trim().to_uppercase();
        check_code(&normalized).map_err(|reason| CouponError::InvalidCode {
            code: raw.to_string(),
            reason,
        })?;
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CouponCode {
    type Error = CouponError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CouponCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    FixedAmount,
    FreeShipping,
    Unknown,
}

impl DiscountKind {
    /// Maps the loose discount-type strings used by coupon APIs and listing
    /// sites onto a kind. Unrecognized values map to [`DiscountKind::Unknown`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "percentage" | "percent" | "pct" | "%" => Self::Percentage,
            "fixed" | "fixed_amount" | "amount" | "flat" => Self::FixedAmount,
            "shipping" | "free_shipping" | "freeshipping" => Self::FreeShipping,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountKind::Percentage => write!(f, "percentage"),
            DiscountKind::FixedAmount => write!(f, "fixed_amount"),
            DiscountKind::FreeShipping => write!(f, "free_shipping"),
            DiscountKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// A discount code candidate for one store, as reported by one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: CouponCode,
    pub description: String,
    /// Percent or currency amount depending on `discount_kind`; `None` when
    /// the source does not say (typical for community posts).
    pub discount_value: Option<f64>,
    pub discount_kind: DiscountKind,
    pub verified: bool,
    /// Source adapter name, e.g. `CouponAPI.org`, `reddit`, `fallback`.
    pub source: String,
    /// Finer-grained origin such as `r/deals` or the listing site name.
    pub source_label: Option<String>,
    /// Likelihood the code works, in `[0.0, 1.0]`.
    pub confidence: f64,
    pub store_id: String,
    pub found_at: DateTime<Utc>,
    pub url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    /// Creates an unverified coupon with neutral confidence.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::InvalidCode`] if `code` breaks the code invariant.
    pub fn new(code: &str, store_id: &str, source: &str) -> Result<Self, CouponError> {
        Ok(Self {
            code: CouponCode::parse(code)?,
            description: String::new(),
            discount_value: None,
            discount_kind: DiscountKind::Unknown,
            verified: false,
            source: source.to_string(),
            source_label: None,
            confidence: 0.5,
            store_id: store_id.to_string(),
            found_at: Utc::now(),
            url: None,
            expires_at: None,
        })
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Non-finite or negative values are dropped.
    #[must_use]
    pub fn with_discount(mut self, value: Option<f64>, kind: DiscountKind) -> Self {
        self.discount_value = value.filter(|v| v.is_finite() && *v >= 0.0);
        self.discount_kind = kind;
        self
    }

    #[must_use]
    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    #[must_use]
    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    /// Clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    #[must_use]
    pub fn found_at(mut self, found_at: DateTime<Utc>) -> Self {
        self.found_at = found_at;
        self
    }
}
