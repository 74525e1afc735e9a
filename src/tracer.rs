//! Tracer trait for observing chain evaluation.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! evaluations, cache lookups and invalidations. The default [`NoopTracer`]
//! costs nothing when observation is not needed. With the `tracing` feature,
//! [`TracingTracer`] forwards every event to the `tracing` crate.
//!
//! # Example
//!
//! ```ignore
//! use query_chain::{ChainRuntime, QueryKey, SpanId, Tracer};
//!
//! struct MyTracer;
//!
//! impl Tracer for MyTracer {
//!     fn new_span_id(&self) -> SpanId {
//!         SpanId(1)
//!     }
//!
//!     fn on_produce_start(&self, key: &QueryKey) {
//!         println!("calling {:?}", key);
//!     }
//! }
//!
//! let runtime = ChainRuntime::builder().tracer(MyTracer).build();
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::key::QueryKey;

/// Unique identifier for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub u64);

/// What a cache lookup found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A resolved value or error was returned.
    Hit,
    /// The caller attached to a producer already in flight.
    Joined,
    /// No fresh entry; a producer was started.
    Miss,
}

/// Kind of chain step being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Plain property read.
    Property,
    /// Cached method call.
    Call,
    /// Local transform.
    Transform,
}

/// Result classification of a producer run or an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Completed with a value.
    Ok,
    /// Failed with an error.
    Error {
        /// Display form of the error.
        message: String,
    },
}

/// Outcome of a target hash comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    /// No hash was recorded for the key before.
    First,
    /// The target hashes the same as last time.
    Unchanged,
    /// The target changed shape since last time.
    Changed,
}

/// Reason for cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// A caller asked for recomputation.
    Manual,
    /// The object a step was called on changed shape.
    TargetChanged,
}

/// Tracer trait for observing chain evaluation.
///
/// All methods but [`Tracer::new_span_id`] have empty default
/// implementations, so only the events of interest need overriding.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: producers run as spawned tasks and
/// report from whichever thread they finish on.
pub trait Tracer: Send + Sync + 'static {
    /// Generate a new unique span ID. Called at the start of each evaluation.
    fn new_span_id(&self) -> SpanId;

    /// Called when an evaluation starts.
    #[inline]
    fn on_evaluation_start(&self, _span_id: SpanId, _root: &QueryKey) {}

    /// Called for each step, with the key the step composed.
    #[inline]
    fn on_step(&self, _span_id: SpanId, _key: &QueryKey, _kind: StepKind) {}

    /// Called when a step is skipped because the current value is null.
    #[inline]
    fn on_short_circuit(&self, _span_id: SpanId, _key: &QueryKey) {}

    /// Called when an evaluation ends.
    #[inline]
    fn on_evaluation_end(&self, _span_id: SpanId, _key: &QueryKey, _result: ExecutionResult) {}

    /// Called after the target of a call step was hashed and compared.
    #[inline]
    fn on_target_checked(&self, _key: &QueryKey, _change: TargetChange) {}

    /// Called on every cache lookup.
    #[inline]
    fn on_cache_check(&self, _key: &QueryKey, _status: CacheStatus) {}

    /// Called when a producer is started.
    #[inline]
    fn on_produce_start(&self, _key: &QueryKey) {}

    /// Called when a producer finishes.
    #[inline]
    fn on_produce_end(&self, _key: &QueryKey, _result: ExecutionResult) {}

    /// Called for every cached key marked stale.
    #[inline]
    fn on_invalidated(&self, _key: &QueryKey, _reason: InvalidationReason) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`ChainRuntime`](crate::ChainRuntime).
pub struct NoopTracer;

/// Global span counter for NoopTracer.
static NOOP_SPAN_COUNTER: AtomicU64 = AtomicU64::new(1);

impl Tracer for NoopTracer {
    #[inline(always)]
    fn new_span_id(&self) -> SpanId {
        SpanId(NOOP_SPAN_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tracer that forwards events to the `tracing` crate.
#[cfg(feature = "tracing")]
#[derive(Default)]
pub struct TracingTracer {
    next_span: AtomicU64,
}

#[cfg(feature = "tracing")]
impl TracingTracer {
    /// Create a new forwarding tracer.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "tracing")]
impl Tracer for TracingTracer {
    fn new_span_id(&self) -> SpanId {
        SpanId(self.next_span.fetch_add(1, Ordering::Relaxed))
    }

    fn on_evaluation_start(&self, span_id: SpanId, root: &QueryKey) {
        tracing::debug!(span = span_id.0, root = %root.debug_repr(), "evaluate: start");
    }

    fn on_step(&self, span_id: SpanId, key: &QueryKey, kind: StepKind) {
        tracing::trace!(span = span_id.0, key = %key.debug_repr(), ?kind, "step");
    }

    fn on_short_circuit(&self, span_id: SpanId, key: &QueryKey) {
        tracing::trace!(span = span_id.0, key = %key.debug_repr(), "step: null short-circuit");
    }

    fn on_evaluation_end(&self, span_id: SpanId, key: &QueryKey, result: ExecutionResult) {
        match result {
            ExecutionResult::Ok => {
                tracing::debug!(span = span_id.0, key = %key.debug_repr(), "evaluate: ok")
            }
            ExecutionResult::Error { message } => {
                tracing::debug!(span = span_id.0, key = %key.debug_repr(), %message, "evaluate: err")
            }
        }
    }

    fn on_target_checked(&self, key: &QueryKey, change: TargetChange) {
        tracing::trace!(key = %key.debug_repr(), ?change, "target checked");
    }

    fn on_cache_check(&self, key: &QueryKey, status: CacheStatus) {
        tracing::trace!(key = %key.debug_repr(), ?status, "cache check");
    }

    fn on_produce_start(&self, key: &QueryKey) {
        tracing::debug!(key = %key.debug_repr(), "produce: start");
    }

    fn on_produce_end(&self, key: &QueryKey, result: ExecutionResult) {
        match result {
            ExecutionResult::Ok => tracing::debug!(key = %key.debug_repr(), "produce: ok"),
            ExecutionResult::Error { message } => {
                tracing::debug!(key = %key.debug_repr(), %message, "produce: err")
            }
        }
    }

    fn on_invalidated(&self, key: &QueryKey, reason: InvalidationReason) {
        tracing::debug!(key = %key.debug_repr(), ?reason, "invalidated");
    }
}
