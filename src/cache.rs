//! Suspending, single-flight cache keyed by [`QueryKey`].
//!
//! Each key holds at most one producer in flight. Callers that find a key
//! pending attach to that producer's shared future and suspend until it
//! resolves. Producers are spawned onto the ambient Tokio runtime, so a caller
//! that gives up waiting does not cancel the work: the result still lands in
//! the cache for later readers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::ChainError;
use crate::key::QueryKey;
use crate::tracer::{CacheStatus, ExecutionResult, InvalidationReason, Tracer};
use crate::value::Value;

type SharedProduce = Shared<BoxFuture<'static, Result<Value, ChainError>>>;

/// State of a cache entry, as reported by [`SuspenseCache::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// A producer is running.
    Pending,
    /// Resolved with a value.
    Ready,
    /// Resolved with a producer error.
    Failed,
    /// Invalidated; the next read re-produces.
    Stale,
}

enum EntryState {
    Pending(SharedProduce),
    Resolved(Result<Value, ChainError>),
}

struct CacheEntry {
    /// Distinguishes producer runs for the same key, so a run that finishes
    /// after its entry was replaced cannot overwrite the newer one.
    generation: u64,
    stale: bool,
    state: EntryState,
}

impl CacheEntry {
    fn status(&self) -> EntryStatus {
        if self.stale {
            return EntryStatus::Stale;
        }
        match &self.state {
            EntryState::Pending(_) => EntryStatus::Pending,
            EntryState::Resolved(Ok(_)) => EntryStatus::Ready,
            EntryState::Resolved(Err(_)) => EntryStatus::Failed,
        }
    }
}

enum Lookup {
    Hit(Result<Value, ChainError>),
    Joined(SharedProduce),
    Started(SharedProduce),
}

/// What a fresh entry for `key` offers, if there is one.
fn fresh(
    entries: &HashMap<QueryKey, CacheEntry, ahash::RandomState>,
    key: &QueryKey,
) -> Option<Lookup> {
    let entry = entries.get(key).filter(|entry| !entry.stale)?;
    Some(match &entry.state {
        EntryState::Resolved(result) => Lookup::Hit(result.clone()),
        EntryState::Pending(shared) => Lookup::Joined(shared.clone()),
    })
}

struct CacheInner {
    entries: Mutex<HashMap<QueryKey, CacheEntry, ahash::RandomState>>,
    next_generation: AtomicU64,
    tracer: Arc<dyn Tracer>,
}

impl CacheInner {
    /// Store a producer's result if its run still owns the entry.
    fn settle(&self, key: &QueryKey, generation: u64, result: Result<Value, ChainError>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            if entry.generation == generation {
                entry.state = EntryState::Resolved(result);
            }
        }
    }
}

/// Thread-safe memoizing store answering async chain steps.
///
/// This is cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct SuspenseCache {
    inner: Arc<CacheInner>,
}

impl SuspenseCache {
    /// Create an empty cache reporting to `tracer`.
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::with_hasher(ahash::RandomState::new())),
                next_generation: AtomicU64::new(0),
                tracer,
            }),
        }
    }

    /// Return the value for `key`, producing it if needed.
    ///
    /// - Fresh resolved entry: returned immediately, errors included.
    /// - Pending entry: the caller suspends on the producer already running.
    /// - Missing or stale entry: `produce` is called once to create the
    ///   future, which is spawned; the caller suspends on it.
    ///
    /// Neither `produce` nor the tracer is called with the entry lock held,
    /// so both may call back into the cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn read_or_produce<F, Fut>(
        &self,
        key: &QueryKey,
        produce: F,
    ) -> Result<Value, ChainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ChainError>> + Send + 'static,
    {
        let found = fresh(&self.inner.entries.lock(), key);
        let lookup = match found {
            Some(found) => found,
            None => {
                let future = produce();
                let mut entries = self.inner.entries.lock();
                // Another caller may have started a producer meanwhile.
                match fresh(&entries, key) {
                    Some(found) => found,
                    None => {
                        let generation =
                            self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                        let shared = self.spawn_producer(key.clone(), generation, future);
                        entries.insert(
                            key.clone(),
                            CacheEntry {
                                generation,
                                stale: false,
                                state: EntryState::Pending(shared.clone()),
                            },
                        );
                        Lookup::Started(shared)
                    }
                }
            }
        };

        match lookup {
            Lookup::Hit(result) => {
                self.inner.tracer.on_cache_check(key, CacheStatus::Hit);
                result
            }
            Lookup::Joined(shared) => {
                self.inner.tracer.on_cache_check(key, CacheStatus::Joined);
                shared.await
            }
            Lookup::Started(shared) => {
                self.inner.tracer.on_cache_check(key, CacheStatus::Miss);
                shared.await
            }
        }
    }

    fn spawn_producer<Fut>(&self, key: QueryKey, generation: u64, future: Fut) -> SharedProduce
    where
        Fut: Future<Output = Result<Value, ChainError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let k = key.clone();
        let handle = tokio::spawn(async move {
            inner.tracer.on_produce_start(&key);
            let result = future.await;
            let traced = match &result {
                Ok(_) => ExecutionResult::Ok,
                Err(e) => ExecutionResult::Error {
                    message: e.to_string(),
                },
            };
            inner.tracer.on_produce_end(&key, traced);
            inner.settle(&key, generation, result.clone());
            result
        });
        let weak = Arc::downgrade(&self.inner);
        handle
            .map(move |joined| {
                joined.unwrap_or_else(|err| {
                    let result = Err(ChainError::Panicked {
                        message: err.to_string(),
                    });
                    if let Some(inner) = weak.upgrade() {
                        inner.settle(&k, generation, result.clone());
                    }
                    result
                })
            })
            .boxed()
            .shared()
    }

    /// Mark `prefix` and every key extending it as stale.
    ///
    /// Returns the number of entries invalidated. A producer still running
    /// for an invalidated key finishes, but its result is only handed to the
    /// callers already waiting on it.
    pub fn invalidate(&self, prefix: &QueryKey, reason: InvalidationReason) -> usize {
        let invalidated: Vec<QueryKey> = self
            .inner
            .entries
            .lock()
            .iter_mut()
            .filter(|(key, entry)| !entry.stale && key.starts_with(prefix))
            .map(|(key, entry)| {
                entry.stale = true;
                key.clone()
            })
            .collect();
        for key in &invalidated {
            self.inner.tracer.on_invalidated(key, reason);
        }
        invalidated.len()
    }

    /// Current state of the entry for `key`.
    pub fn status(&self, key: &QueryKey) -> Option<EntryStatus> {
        self.inner.entries.lock().get(key).map(CacheEntry::status)
    }

    /// All keys with an entry, stale ones included.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Drop every entry. Producers in flight still resolve their waiters.
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }
}
