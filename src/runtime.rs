//! Evaluation context and invalidation entry points.

use std::sync::Arc;

use crate::cache::{EntryStatus, SuspenseCache};
use crate::chain::Chain;
use crate::key::QueryKey;
use crate::target::TargetHashTable;
use crate::tracer::{InvalidationReason, NoopTracer, Tracer};
use crate::value::Value;

/// Shared evaluation context: the query cache, the target hash table and the
/// tracer.
///
/// Independent runtimes never see each other's entries, which keeps separate
/// sessions (and tests) isolated. Clone is cheap; clones share all state.
///
/// # Example
///
/// ```ignore
/// let runtime = ChainRuntime::new();
/// let evaluation = build_chain(customer)
///     .call("getDetailed")
///     .call("getName")
///     .evaluate(&runtime)
///     .await?;
///
/// // Later, force the chain to be recomputed.
/// evaluation.invalidate();
/// ```
#[derive(Clone)]
pub struct ChainRuntime {
    pub(crate) cache: SuspenseCache,
    pub(crate) targets: Arc<TargetHashTable>,
    pub(crate) tracer: Arc<dyn Tracer>,
}

impl Default for ChainRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainRuntime {
    /// Create a new runtime with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for customizing the runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let runtime = ChainRuntime::builder()
    ///     .tracer(TracingTracer::new())
    ///     .build();
    /// ```
    pub fn builder() -> ChainRuntimeBuilder {
        ChainRuntimeBuilder::new()
    }

    /// Invalidate `key` and every cached key extending it.
    ///
    /// Returns the number of entries marked stale.
    pub fn invalidate_by_key(&self, key: &QueryKey) -> usize {
        self.cache.invalidate(key, InvalidationReason::Manual)
    }

    /// Invalidate the full key of `root` followed by `chain`, cascading to
    /// everything derived further down.
    pub fn invalidate_by_chain(&self, root: &Value, chain: &Chain) -> usize {
        self.invalidate_by_key(&QueryKey::for_chain(root, chain))
    }

    /// Every key with a cache entry, stale ones included.
    pub fn query_keys(&self) -> Vec<QueryKey> {
        self.cache.keys()
    }

    /// State of the cache entry for `key`.
    pub fn cache_status(&self, key: &QueryKey) -> Option<EntryStatus> {
        self.cache.status(key)
    }

    /// Forget every recorded target hash, so the next evaluation of each call
    /// step counts as its first.
    pub fn reset_targets(&self) {
        self.targets.reset();
    }

    /// Drop every cache entry.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// The underlying cache.
    pub fn cache(&self) -> &SuspenseCache {
        &self.cache
    }

    /// The target hash table.
    pub fn targets(&self) -> &TargetHashTable {
        &self.targets
    }
}

/// Builder for [`ChainRuntime`] with custom settings.
pub struct ChainRuntimeBuilder {
    tracer: Arc<dyn Tracer>,
}

impl Default for ChainRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            tracer: Arc::new(NoopTracer),
        }
    }

    /// Set the tracer receiving evaluation and cache events.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// Build the runtime with the configured settings.
    pub fn build(self) -> ChainRuntime {
        ChainRuntime {
            cache: SuspenseCache::new(self.tracer.clone()),
            targets: Arc::new(TargetHashTable::new()),
            tracer: self.tracer,
        }
    }
}
