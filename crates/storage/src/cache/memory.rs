use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::Clock;

use super::{CacheError, FastCache};

struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Process-local cache for single-instance deployments and tests. Expired
/// entries are dropped on read of their key and swept on every write.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<Mutex<Clock>>,
    available: Arc<AtomicBool>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::with_clock(Clock::default())
    }
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry is judged against `clock` instead of wall time.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(Mutex::new(clock)),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Move a fixed clock forward; entries past their TTL disappear.
    pub fn advance_clock(&self, delta: chrono::Duration) {
        if let Ok(mut clock) = self.clock.lock() {
            clock.advance(delta);
        }
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.now();
        self.entries
            .lock()
            .map(|guard| guard.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock
            .lock()
            .map(|clock| clock.now())
            .unwrap_or_else(|_| Utc::now())
    }

    #[cfg(test)]
    fn stored(&self) -> usize {
        self.entries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("in-memory cache disabled".into()))
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl FastCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.ensure_available()?;
        let now = self.now();
        let mut guard = self.lock()?;
        match guard.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                guard.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.ensure_available()?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Serialization(format!("ttl out of range: {e}")))?;
        let now = self.now();
        let expires_at = now + ttl;
        let mut guard = self.lock()?;
        guard.retain(|_, entry| entry.expires_at > now);
        guard.insert(
            key.to_owned(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::time::fixed_clock;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    #[tokio::test]
    async fn values_expire_after_ttl() {
        let cache = InMemoryCache::with_clock(fixed_clock());
        cache.set("k", b"v", WEEK).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));

        cache.advance_clock(chrono::Duration::days(7));
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn rewriting_slides_the_ttl() {
        let cache = InMemoryCache::with_clock(fixed_clock());
        cache.set("k", b"1", WEEK).await.unwrap();
        cache.advance_clock(chrono::Duration::days(6));
        cache.set("k", b"2", WEEK).await.unwrap();
        cache.advance_clock(chrono::Duration::days(6));
        assert_eq!(cache.get("k").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn writes_sweep_expired_entries() {
        let cache = InMemoryCache::with_clock(fixed_clock());
        for key in ["a", "b", "c"] {
            cache.set(key, b"v", WEEK).await.unwrap();
        }
        cache.advance_clock(chrono::Duration::days(8));
        assert_eq!(cache.stored(), 3);

        cache.set("d", b"v", WEEK).await.unwrap();
        assert_eq!(cache.stored(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let cache = InMemoryCache::new();
        cache.set_available(false);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.set("k", b"v", WEEK).await.is_err());
        assert!(cache.delete("k").await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = InMemoryCache::new();
        cache.set("k", b"v", WEEK).await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
