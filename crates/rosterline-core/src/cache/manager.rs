use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::time::{Clock, SystemClock};

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

/// Logical resource name, e.g. `students` or `students/7`.
///
/// Invalidating a key also invalidates every key nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key for one item of a collection: `students` + 7 -> `students/7`.
    pub fn item(collection: &str, id: impl std::fmt::Display) -> Self {
        Self(format!("{}/{}", collection, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` equals `other` or is nested under it.
    pub fn is_within(&self, other: &QueryKey) -> bool {
        self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0[other.0.len()..].starts_with('/'))
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// "Mark this resource stale" capability used by mutation verbs.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, key: &QueryKey);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub invalidated: bool,
}

impl<T> CachedData<T> {
    pub fn new(data: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            data,
            cached_at,
            invalidated: false,
        }
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age_minutes(now);
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                // Round up: 1d 12h+ becomes 2d
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.invalidated || now - self.cached_at > stale_after
    }
}

/// In-memory query cache.
///
/// Values are stored as JSON so one cache can hold every resource type.
pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, CachedData<Value>>>,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stale_after: Duration::minutes(CACHE_STALE_MINUTES),
            clock,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &QueryKey, data: &T) -> Result<()> {
        let value = serde_json::to_value(data)
            .with_context(|| format!("Failed to serialize cache entry: {}", key))?;
        let cached = CachedData::new(value, self.clock.now());
        self.write().insert(key.clone(), cached);
        debug!(cache = %key, "Cache entry stored");
        Ok(())
    }

    /// Entry for `key`, fresh or stale.
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<CachedData<T>>> {
        let entry = match self.read().get(key) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        let data = serde_json::from_value(entry.data)
            .with_context(|| format!("Failed to parse cache entry: {}", key))?;
        Ok(Some(CachedData {
            data,
            cached_at: entry.cached_at,
            invalidated: entry.invalidated,
        }))
    }

    /// Data for `key` only when present and not stale.
    pub fn get_fresh<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        match self.get::<T>(key) {
            Ok(Some(cached)) if !cached.is_stale(self.clock.now(), self.stale_after) => {
                Some(cached.data)
            }
            Ok(_) => None,
            Err(e) => {
                debug!(cache = %key, error = %e, "Failed to load cache entry");
                None
            }
        }
    }

    /// Missing entries count as stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.read()
            .get(key)
            .map(|entry| entry.is_stale(self.clock.now(), self.stale_after))
            .unwrap_or(true)
    }

    pub fn age_display(&self, key: &QueryKey) -> String {
        self.read()
            .get(key)
            .map(|entry| entry.age_display(self.clock.now()))
            .unwrap_or_else(|| "never".to_string())
    }

    pub fn remove(&self, key: &QueryKey) {
        self.write().remove(key);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<QueryKey, CachedData<Value>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<QueryKey, CachedData<Value>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheInvalidator for QueryCache {
    fn invalidate(&self, key: &QueryKey) {
        let mut entries = self.write();
        let mut count = 0;
        for (entry_key, entry) in entries.iter_mut() {
            if entry_key.is_within(key) {
                entry.invalidated = true;
                count += 1;
            }
        }
        debug!(cache = %key, count, "Cache entries invalidated");
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
