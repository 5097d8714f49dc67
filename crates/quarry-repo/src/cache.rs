//! Single-flight proxy cache
//!
//! Content fetched from proxy upstreams is cached per (repository-id, path)
//! key. For a given key, N concurrent misses issue exactly one upstream
//! fetch; the other N-1 requests wait on that fetch and receive its result.
//! Entries are evicted on TTL expiry or LRU pressure against a byte bound,
//! and a confirmed upstream 404 invalidates any still-valid positive entry.
//!
//! The shared fetch runs on a detached task bounded by a deadline, so a
//! waiter's cancellation never cancels the fetch for the other waiters.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Cache key: one entry per (repository, path)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub repository_id: String,
    pub path: String,
}

impl CacheKey {
    pub fn new(repository_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            path: path.into(),
        }
    }
}

/// Cached upstream content
#[derive(Debug)]
pub struct CachedObject {
    pub content: Vec<u8>,
    pub checksum: String,
}

/// Why a shared fetch failed, delivered to every waiter
#[derive(Debug, Clone)]
pub enum FetchFailure {
    Upstream { message: String },
    ChecksumMismatch { expected: String, actual: String },
    TimedOut { seconds: u64 },
}

/// Result of a cache lookup, shared across all waiters of a fetch
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Content is cached (or was just fetched)
    Found(Arc<CachedObject>),
    /// The upstream confirmed the path does not exist
    Missing,
    /// The shared fetch failed; nothing was cached
    Failed(FetchFailure),
}

/// Cache counters
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct StoredEntry {
    object: Arc<CachedObject>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    /// Insertion/access ordered: index 0 is the least recently used entry
    entries: IndexMap<CacheKey, StoredEntry>,
    total_bytes: usize,
    inflight: HashMap<CacheKey, broadcast::Sender<FetchOutcome>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheShared {
    ttl: Duration,
    max_bytes: usize,
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
}

/// Single-flight, TTL/LRU cache for proxy-fetched content
#[derive(Clone)]
pub struct ProxyCache {
    shared: Arc<CacheShared>,
}

impl ProxyCache {
    pub fn new(ttl: Duration, max_bytes: usize, fetch_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                ttl,
                max_bytes,
                fetch_timeout,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Return cached content for `key`, or join/start the single shared fetch
    ///
    /// `fetch` resolves to `Ok(Some(object))` on upstream success,
    /// `Ok(None)` on a confirmed upstream 404, and `Err` on failure. It is
    /// invoked at most once per miss regardless of concurrent callers.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<CachedObject>, FetchFailure>>
            + Send
            + 'static,
    {
        let mut rx = {
            let mut state = self.shared.state.lock().unwrap();

            if let Some(entry) = state.entries.get(&key) {
                if entry.fetched_at.elapsed() < self.shared.ttl {
                    let object = entry.object.clone();
                    // LRU touch
                    if let Some(index) = state.entries.get_index_of(&key) {
                        let last = state.entries.len() - 1;
                        state.entries.move_index(index, last);
                    }
                    state.hits += 1;
                    return FetchOutcome::Found(object);
                }
                // Expired; drop before refetching
                if let Some(old) = state.entries.shift_remove(&key) {
                    state.total_bytes -= old.object.content.len();
                }
            }

            state.misses += 1;
            if let Some(tx) = state.inflight.get(&key) {
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                state.inflight.insert(key.clone(), tx);
                drop(state);
                self.spawn_fetch(key, fetch());
                rx
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => FetchOutcome::Failed(FetchFailure::Upstream {
                message: "shared fetch aborted".to_string(),
            }),
        }
    }

    /// Run the shared fetch on a detached task so waiter cancellation never
    /// cancels it for the others
    fn spawn_fetch<Fut>(&self, key: CacheKey, fut: Fut)
    where
        Fut: Future<Output = std::result::Result<Option<CachedObject>, FetchFailure>>
            + Send
            + 'static,
    {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let result = match tokio::time::timeout(shared.fetch_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(FetchFailure::TimedOut {
                    seconds: shared.fetch_timeout.as_secs(),
                }),
            };

            let mut state = shared.state.lock().unwrap();
            let outcome = match result {
                Ok(Some(object)) => {
                    let object = Arc::new(object);
                    state.total_bytes += object.content.len();
                    state.entries.insert(
                        key.clone(),
                        StoredEntry {
                            object: object.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                    Self::evict_over_budget(&mut state, shared.max_bytes);
                    FetchOutcome::Found(object)
                }
                Ok(None) => {
                    // Confirmed absence invalidates a stale positive entry
                    if let Some(old) = state.entries.shift_remove(&key) {
                        state.total_bytes -= old.object.content.len();
                    }
                    FetchOutcome::Missing
                }
                Err(failure) => FetchOutcome::Failed(failure),
            };

            if let Some(tx) = state.inflight.remove(&key) {
                let _ = tx.send(outcome);
            }
        });
    }

    fn evict_over_budget(state: &mut CacheState, max_bytes: usize) {
        while state.total_bytes > max_bytes && !state.entries.is_empty() {
            if let Some((key, entry)) = state.entries.shift_remove_index(0) {
                state.total_bytes -= entry.object.content.len();
                state.evictions += 1;
                tracing::debug!(
                    repository = %key.repository_id,
                    path = %key.path,
                    "evicted cache entry under byte pressure"
                );
            }
        }
    }

    /// Drop the entry for `key`, if present
    pub fn invalidate(&self, key: &CacheKey) {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(old) = state.entries.shift_remove(key) {
            state.total_bytes -= old.object.content.len();
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.entries.clear();
        state.total_bytes = 0;
    }

    /// Paths currently cached for a repository under a prefix
    pub fn cached_paths(&self, repository_id: &str, prefix: &str) -> Vec<String> {
        let state = self.shared.state.lock().unwrap();
        let mut paths: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                key.repository_id == repository_id
                    && key.path.starts_with(prefix)
                    && entry.fetched_at.elapsed() < self.shared.ttl
            })
            .map(|(key, _)| key.path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock().unwrap();
        CacheStats {
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> ProxyCache {
        ProxyCache::new(Duration::from_secs(60), 1024 * 1024, Duration::from_secs(5))
    }

    fn object(content: &[u8]) -> CachedObject {
        CachedObject {
            content: content.to_vec(),
            checksum: quarry_core::compute_digest(content),
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = cache();
        let key = CacheKey::new("r1", "a/b");
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fetches = fetches.clone();
            let outcome = cache
                .get_or_fetch(key.clone(), move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(object(b"payload")))
                })
                .await;
            assert!(matches!(outcome, FetchOutcome::Found(_)));
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn test_single_flight() {
        let cache = cache();
        let key = CacheKey::new("r1", "a/b");
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let key = key.clone();
            let fetches = fetches.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_fetch(key, move || async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some(object(b"shared")))
                    })
                    .await
            }));
        }

        for task in tasks {
            match task.await.unwrap() {
                FetchOutcome::Found(obj) => assert_eq!(obj.content, b"shared"),
                other => panic!("expected Found, got {other:?}"),
            }
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_shared_and_not_cached() {
        let cache = cache();
        let key = CacheKey::new("r1", "a/b");

        let outcome = cache
            .get_or_fetch(key.clone(), || async {
                Err(FetchFailure::Upstream {
                    message: "boom".to_string(),
                })
            })
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(FetchFailure::Upstream { .. })
        ));

        // Failure is not cached; the next call fetches again
        let outcome = cache
            .get_or_fetch(key, || async { Ok(Some(object(b"ok"))) })
            .await;
        assert!(matches!(outcome, FetchOutcome::Found(_)));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = ProxyCache::new(
            Duration::from_millis(20),
            1024 * 1024,
            Duration::from_secs(5),
        );
        let key = CacheKey::new("r1", "a");
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fetches = fetches.clone();
            cache
                .get_or_fetch(key.clone(), move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(object(b"x")))
                })
                .await;
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_confirmed_absence_invalidates_entry() {
        let cache = ProxyCache::new(Duration::from_millis(20), 1024, Duration::from_secs(5));
        let key = CacheKey::new("r1", "a");

        cache
            .get_or_fetch(key.clone(), || async { Ok(Some(object(b"present"))) })
            .await;
        assert_eq!(cache.stats().entries, 1);

        // After expiry the refetch observes a 404; the positive entry goes away
        tokio::time::sleep(Duration::from_millis(40)).await;
        let outcome = cache.get_or_fetch(key, || async { Ok(None) }).await;
        assert!(matches!(outcome, FetchOutcome::Missing));
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction_under_byte_pressure() {
        // Budget fits two 4-byte objects but not three
        let cache = ProxyCache::new(Duration::from_secs(60), 8, Duration::from_secs(5));

        for (i, path) in ["a", "b", "c"].iter().enumerate() {
            let key = CacheKey::new("r1", *path);
            cache
                .get_or_fetch(key, move || async move {
                    Ok(Some(object(format!("{i:04}").as_bytes())))
                })
                .await;
        }

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 1);
        // "a" was least recently used
        assert_eq!(cache.cached_paths("r1", ""), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_timeout_releases_waiters() {
        let cache = ProxyCache::new(
            Duration::from_secs(60),
            1024,
            Duration::from_millis(30),
        );
        let key = CacheKey::new("r1", "slow");

        let outcome = cache
            .get_or_fetch(key, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Some(object(b"never")))
            })
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(FetchFailure::TimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache();
        let key = CacheKey::new("r1", "a");
        cache
            .get_or_fetch(key.clone(), || async { Ok(Some(object(b"x"))) })
            .await;

        cache.invalidate(&key);
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().total_bytes, 0);
    }

    #[tokio::test]
    async fn test_cached_paths_filters_by_repository_and_prefix() {
        let cache = cache();
        for (repo, path) in [("r1", "docs/a"), ("r1", "bin/b"), ("r2", "docs/c")] {
            cache
                .get_or_fetch(CacheKey::new(repo, path), || async {
                    Ok(Some(object(b"x")))
                })
                .await;
        }

        assert_eq!(cache.cached_paths("r1", "docs/"), vec!["docs/a"]);
        assert_eq!(cache.cached_paths("r1", ""), vec!["bin/b", "docs/a"]);
    }
}
