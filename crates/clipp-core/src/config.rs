use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Upper bound on coupons handed to the UI and the batch tester.
pub const MAX_RESULTS_CAP: usize = 10;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if values are present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can pass a `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let env = parse_environment(&or_default("CLIPP_ENV", "development"))?;
    let log_level = or_default("CLIPP_LOG_LEVEL", "info");
    let stores_path = PathBuf::from(or_default("CLIPP_STORES_PATH", "./config/stores.yaml"));
    let cache_path = PathBuf::from(or_default("CLIPP_CACHE_PATH", "./.clipp-cache.json"));

    let source_timeout_secs = parse_u64("CLIPP_SOURCE_TIMEOUT_SECS", "10")?;
    if source_timeout_secs == 0 {
        return Err(invalid(
            "CLIPP_SOURCE_TIMEOUT_SECS",
            "must be greater than zero".to_string(),
        ));
    }
    let source_max_retries = parse_u32("CLIPP_SOURCE_MAX_RETRIES", "2")?;
    let source_backoff_base_ms = parse_u64("CLIPP_SOURCE_BACKOFF_BASE_MS", "500")?;
    let user_agent = or_default("CLIPP_USER_AGENT", "Clipp/1.0 Coupon Extension");

    let discovery_ttl_secs = parse_u64("CLIPP_DISCOVERY_TTL_SECS", "3600")?;
    let community_ttl_secs = parse_u64("CLIPP_COMMUNITY_TTL_SECS", "1800")?;

    let max_results = or_default("CLIPP_MAX_RESULTS", "10")
        .trim()
        .parse::<usize>()
        .map_err(|e| invalid("CLIPP_MAX_RESULTS", e.to_string()))?;
    if max_results == 0 {
        return Err(invalid(
            "CLIPP_MAX_RESULTS",
            "must be greater than zero".to_string(),
        ));
    }

    let test_delay_ms = parse_u64("CLIPP_TEST_DELAY_MS", "2000")?;
    let settle_timeout_ms = parse_u64("CLIPP_SETTLE_TIMEOUT_MS", "3000")?;
    let batch_timeout_secs = match lookup("CLIPP_BATCH_TIMEOUT_SECS") {
        Ok(raw) if !raw.trim().is_empty() => Some(
            raw.trim()
                .parse::<u64>()
                .map_err(|e| invalid("CLIPP_BATCH_TIMEOUT_SECS", e.to_string()))?,
        ),
        _ => None,
    };
    let use_fallback = parse_bool("CLIPP_USE_FALLBACK", "false")?;

    Ok(AppConfig {
        env,
        log_level,
        stores_path,
        cache_path,
        source_timeout_secs,
        source_max_retries,
        source_backoff_base_ms,
        user_agent,
        discovery_ttl_secs,
        community_ttl_secs,
        max_results: max_results.min(MAX_RESULTS_CAP),
        test_delay_ms,
        settle_timeout_ms,
        batch_timeout_secs,
        use_fallback,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CLIPP_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}
