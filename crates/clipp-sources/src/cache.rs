//! TTL coupon cache over a pluggable key-value store.
//!
//! Entries live under `<namespace>:<store id lower-cased>` as JSON
//! `{coupons, timestamp}` with the timestamp in unix milliseconds. Expiry is
//! lazy: a read past the TTL deletes the entry and reports a miss. Store
//! failures are logged and read as misses so a broken cache never blocks a
//! lookup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use clipp_core::Coupon;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;

/// Namespace for aggregated store discovery results.
pub const DISCOVERY_NAMESPACE: &str = "coupons";
/// Namespace for community-sourced results.
pub const COMMUNITY_NAMESPACE: &str = "community";

/// Outbound persistence: string keys, JSON values.
///
/// Implementations serialize writes internally; callers may share one store
/// between several caches.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing store cannot be written.
    fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;

    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object file.
///
/// The whole map is held in memory and rewritten on every mutation through a
/// temporary sibling file, so a crash mid-write leaves the previous version.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, Value>>,
}

impl JsonFileStore {
    /// Opens the file at `path`, starting empty if it does not exist.
    ///
    /// A file that exists but is not a JSON object is discarded with a
    /// warning; it is overwritten on the next write.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the file exists but cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => match serde_json::from_str::<HashMap<String, Value>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cache file is not a JSON object; starting empty"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, Value>) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.insert(key.to_string(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    coupons: Vec<Coupon>,
    timestamp: i64,
}

/// Namespaced, TTL-checked view over a [`KeyValueStore`].
#[derive(Clone)]
pub struct CouponCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    ttl: Duration,
}

impl std::fmt::Debug for CouponCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponCache")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CouponCache {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str, ttl: Duration) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            ttl,
        }
    }

    /// Full storage key for `id`.
    #[must_use]
    pub fn key(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id.trim().to_lowercase())
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Vec<Coupon>> {
        self.get_at(id, Utc::now())
    }

    /// Reads the entry for `id` as of `now`.
    ///
    /// Returns `None` when the entry is absent, unreadable or older than the
    /// TTL. Expired and unreadable entries are removed.
    #[must_use]
    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Option<Vec<Coupon>> {
        let key = self.key(id);
        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed; treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "dropping unreadable cache entry");
                self.remove_quietly(&key);
                return None;
            }
        };

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let age_ms = now.timestamp_millis().saturating_sub(entry.timestamp);
        if age_ms > ttl_ms {
            tracing::debug!(key = %key, age_ms, "cache entry expired");
            self.remove_quietly(&key);
            return None;
        }

        tracing::debug!(key = %key, count = entry.coupons.len(), "cache hit");
        Some(entry.coupons)
    }

    /// Writes `coupons` for `id`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the entry cannot be serialized or stored.
    pub fn set(&self, id: &str, coupons: &[Coupon]) -> Result<(), CacheError> {
        self.set_at(id, coupons, Utc::now())
    }

    /// Writes `coupons` for `id`, stamped with `now`. Last write wins.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the entry cannot be serialized or stored.
    pub fn set_at(
        &self,
        id: &str,
        coupons: &[Coupon],
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            coupons: coupons.to_vec(),
            timestamp: now.timestamp_millis(),
        };
        self.store.set(&self.key(id), serde_json::to_value(entry)?)
    }

    /// # Errors
    ///
    /// Returns [`CacheError`] if the backing store cannot be written.
    pub fn invalidate(&self, id: &str) -> Result<(), CacheError> {
        self.store.remove(&self.key(id))
    }

    fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            tracing::warn!(key = %key, error = %e, "failed to remove stale cache entry");
        }
    }
}
