use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub stores_path: PathBuf,
    pub cache_path: PathBuf,
    pub source_timeout_secs: u64,
    pub source_max_retries: u32,
    pub source_backoff_base_ms: u64,
    pub user_agent: String,
    pub discovery_ttl_secs: u64,
    pub community_ttl_secs: u64,
    pub max_results: usize,
    pub test_delay_ms: u64,
    pub settle_timeout_ms: u64,
    pub batch_timeout_secs: Option<u64>,
    pub use_fallback: bool,
}

impl AppConfig {
    #[must_use]
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    #[must_use]
    pub fn discovery_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery_ttl_secs)
    }

    #[must_use]
    pub fn community_ttl(&self) -> Duration {
        Duration::from_secs(self.community_ttl_secs)
    }

    #[must_use]
    pub fn test_delay(&self) -> Duration {
        Duration::from_millis(self.test_delay_ms)
    }

    #[must_use]
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    #[must_use]
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }
}
