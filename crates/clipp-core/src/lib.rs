//! Shared domain types and configuration for Clipp.
//!
//! Holds the [`Coupon`] value type and its code invariant, the read-only
//! store and source descriptors, and the environment-driven [`AppConfig`].

pub mod app_config;
pub mod config;
pub mod coupon;
pub mod stores;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env, MAX_RESULTS_CAP};
pub use coupon::{is_valid_code, Coupon, CouponCode, CouponError, DiscountKind, CODE_BLACKLIST};
pub use stores::{is_checkout_url, load_stores, SourceConfig, StoreConfig, StoresFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read stores file {path}: {source}")]
    StoresFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stores file: {0}")]
    StoresFileParse(#[from] serde_yaml::Error),

    #[error("stores file validation failed: {0}")]
    Validation(String),
}
