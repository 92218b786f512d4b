use thiserror::Error;

/// Failure of a single coupon source.
///
/// The aggregator logs and skips these; they never abort a lookup.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {source_name} (retry after {retry_after_secs}s)")]
    RateLimited {
        source_name: String,
        retry_after_secs: u64,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("{source_name} did not answer within {timeout_ms} ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache store lock poisoned")]
    Poisoned,
}
