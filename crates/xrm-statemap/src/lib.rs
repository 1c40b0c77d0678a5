//! Bounded, TTL-indexed concurrent map with a background janitor.
//!
//! Used by the correlator for its four maps (state, user, dict, server).
//! Reads take the map's reader lock, writes and the janitor sweep take the
//! writer lock, matching the read-write-lock resource model.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    ttl: Duration,
    max_entries: usize,
    stop: Notify,
    stopped: std::sync::atomic::AtomicBool,
}

/// A bounded map where every entry carries its own expiry, refreshed on
/// every write (reset-on-write), reaped in the background by a janitor
/// task that wakes every `cleanup_interval`.
pub struct TtlMap<V> {
    inner: Arc<Inner<V>>,
    janitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<V> TtlMap<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new map with the given entry TTL and capacity (`0` means
    /// unlimited). The janitor runs every `ttl / 10`.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Arc<Self> {
        Self::with_cleanup_interval(ttl, max_entries, ttl / 10)
    }

    /// Create a new map with an explicit janitor interval.
    #[must_use]
    pub fn with_cleanup_interval(ttl: Duration, max_entries: usize, cleanup_interval: Duration) -> Arc<Self> {
        let inner = Arc::new(Inner {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
            stop: Notify::new(),
            stopped: std::sync::atomic::AtomicBool::new(false),
        });
        let map = Arc::new(Self {
            inner: Arc::clone(&inner),
            janitor: std::sync::Mutex::new(None),
        });
        let weak: Weak<Inner<V>> = Arc::downgrade(&inner);
        let interval = cleanup_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        let now = Instant::now();
                        let mut guard = inner.entries.write().expect("statemap lock poisoned");
                        let before = guard.len();
                        guard.retain(|_, entry| entry.expires_at > now);
                        let evicted = before - guard.len();
                        drop(guard);
                        if evicted > 0 {
                            tracing::debug!(target: "relay.statemap", evicted, "janitor swept expired entries");
                        }
                    }
                    _ = inner.stop.notified() => {
                        break;
                    }
                }
            }
        });
        *map.janitor.lock().expect("janitor lock poisoned") = Some(handle);
        map
    }

    /// Insert or refresh `key`. Rejects new keys once `max_entries > 0`
    /// and the map is at capacity; existing keys are always refreshed
    /// (reset-on-write).
    pub fn set(&self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        let mut guard = self.inner.entries.write().expect("statemap lock poisoned");
        if self.inner.max_entries > 0 && guard.len() >= self.inner.max_entries && !guard.contains_key(&key) {
            return false;
        }
        guard.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.inner.ttl,
            },
        );
        true
    }

    /// Fetch a live value for `key`. Expired entries return `None` even if
    /// the janitor has not yet reaped them.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let guard = self.inner.entries.read().expect("statemap lock poisoned");
        let entry = guard.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Unconditionally remove `key`, returning its value if present.
    pub fn delete(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.entries.write().expect("statemap lock poisoned");
        guard.remove(key).map(|e| e.value)
    }

    /// Current entry count, which may include not-yet-reaped expired
    /// entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.entries.read().expect("statemap lock poisoned").len()
    }

    /// Snapshot of all non-expired entries.
    #[must_use]
    pub fn get_all(&self) -> Vec<(String, V)> {
        let now = Instant::now();
        let guard = self.inner.entries.read().expect("statemap lock poisoned");
        guard
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Stop the background janitor. Reads and writes remain functional.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.inner.stop.notify_one();
        }
    }
}

impl<V> Drop for TtlMap<V> {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.janitor.lock().expect("janitor lock poisoned").take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ttl_eviction_strictly_after_expiry() {
        let map = TtlMap::new(Duration::from_secs(10), 0);
        map.set("k", 1);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(map.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_on_write_extends_ttl() {
        let map = TtlMap::new(Duration::from_secs(10), 0);
        map.set("k", 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        map.set("k", 2);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(map.get("k"), Some(2));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(map.get("k"), None);
    }

    #[tokio::test]
    async fn max_entries_rejects_new_key_past_capacity() {
        let map = TtlMap::new(Duration::from_secs(300), 2);
        assert!(map.set("a", 1));
        assert!(map.set("b", 2));
        assert!(!map.set("c", 3));
        assert_eq!(map.get("a"), Some(1));
        assert_eq!(map.get("b"), Some(2));
        assert_eq!(map.get("c"), None);
    }

    #[tokio::test]
    async fn max_entries_still_allows_refreshing_existing_key() {
        let map = TtlMap::new(Duration::from_secs(300), 1);
        assert!(map.set("a", 1));
        assert!(map.set("a", 2));
        assert_eq!(map.get("a"), Some(2));
    }

    #[tokio::test]
    async fn delete_is_unconditional() {
        let map = TtlMap::new(Duration::from_secs(300), 0);
        map.set("a", 1);
        assert_eq!(map.delete("a"), Some(1));
        assert_eq!(map.get("a"), None);
        assert_eq!(map.delete("a"), None);
    }

    #[tokio::test]
    async fn get_all_excludes_expired_entries() {
        let map = TtlMap::with_cleanup_interval(Duration::from_millis(20), 0, Duration::from_millis(5));
        map.set("a", 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        let all = map.get_all();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn size_reports_entry_count() {
        let map = TtlMap::new(Duration::from_secs(300), 0);
        map.set("a", 1);
        map.set("b", 2);
        assert_eq!(map.size(), 2);
    }
}
