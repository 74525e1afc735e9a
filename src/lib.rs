//! Query-Chain: lazy property/method chains over a suspending query cache.
//!
//! A chain records property reads, method calls and pure transforms against a
//! root value without running any of them. Evaluating it walks the chain,
//! answering every method call through a shared cache keyed by the path from
//! the root, so identical paths are computed once and concurrent readers of a
//! pending path wait on the same call.
//!
//! # Key Features
//!
//! - **Lazy**: building a chain, however deep, calls nothing
//! - **Hierarchical keys**: every step's key extends the previous one, so
//!   invalidating a step cascades to everything computed from it
//! - **Single flight**: at most one producer runs per key at a time
//! - **Change detection**: a call whose target object changed shape since the
//!   last evaluation is recomputed even though its key did not change
//! - **Null short-circuit**: a null anywhere in the chain propagates to the
//!   end without further calls
//!
//! # Example
//!
//! ```ignore
//! use query_chain::{build_chain, Chain, ChainRuntime, Value};
//!
//! let runtime = ChainRuntime::new();
//! let name = build_chain(customer)
//!     .call("getDetailed")
//!     .get("child")
//!     .call("getDetailed")
//!     .call("getName");
//!
//! let evaluation = name.evaluate(&runtime).await?;
//! assert_eq!(evaluation.value(), &Value::from("Customer C1"));
//!
//! // Recompute the whole chain from its first call on.
//! runtime.invalidate_by_chain(name.root(), &Chain::new().call("getDetailed"));
//! ```
//!
//! Evaluation must run inside a Tokio runtime; producers are spawned onto it
//! so a caller that stops waiting never cancels a call in flight.
#![deny(missing_docs)]

mod cache;
mod chain;
mod error;
mod evaluate;
mod hash;
mod key;
mod runtime;
mod target;
pub mod tracer;
mod value;

pub use cache::{EntryStatus, SuspenseCache};
pub use chain::{build_chain, Chain, ChainItem, Lazy, Transform, TransformFn};
pub use error::ChainError;
pub use evaluate::{EvaluateOptions, Evaluation};
pub use hash::{structural_hash, StructuralHash};
pub use key::{Identity, KeySegment, QueryKey};
pub use runtime::{ChainRuntime, ChainRuntimeBuilder};
pub use target::TargetHashTable;
#[cfg(feature = "tracing")]
pub use tracer::TracingTracer;
pub use tracer::{
    CacheStatus, ExecutionResult, InvalidationReason, NoopTracer, SpanId, StepKind, TargetChange,
    Tracer,
};
pub use value::{AsAny, Object, Value};

// Implementors of `Object` need these.
pub use async_trait::async_trait;
