//! Chain evaluation.
//!
//! Evaluation is a left fold over the chain, starting from the root value.
//! Property reads and transforms run inline; method calls go through the
//! [`SuspenseCache`](crate::SuspenseCache) under the key composed so far, so
//! the caller suspends only at call steps.

use std::fmt::{self, Debug};

use crate::chain::{Chain, ChainItem};
use crate::error::ChainError;
use crate::hash::structural_hash;
use crate::key::QueryKey;
use crate::runtime::ChainRuntime;
use crate::tracer::{ExecutionResult, InvalidationReason, SpanId, StepKind, TargetChange};
use crate::value::Value;

/// Per-evaluation settings.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Extra values consulted alongside target hashing. A change in any of
    /// them recomputes every call step and transform of the evaluation.
    pub dependencies: Vec<Value>,
}

impl EvaluateOptions {
    /// Options with no dependencies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency.
    #[must_use]
    pub fn dependency(mut self, value: impl Into<Value>) -> Self {
        self.dependencies.push(value.into());
        self
    }
}

/// Result of evaluating a chain.
#[derive(Clone)]
pub struct Evaluation {
    value: Value,
    key: QueryKey,
    root: Value,
    chain: Chain,
    runtime: ChainRuntime,
}

impl Evaluation {
    /// The evaluated value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the evaluation, returning the value.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Full key of the evaluated root and chain.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Invalidate the evaluated chain and everything cached below it.
    ///
    /// Returns the number of cache entries marked stale.
    pub fn invalidate(&self) -> usize {
        self.runtime.invalidate_by_chain(&self.root, &self.chain)
    }
}

impl Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluation")
            .field("value", &self.value)
            .field("key", &self.key)
            .finish()
    }
}

impl ChainRuntime {
    /// Evaluate `chain` against `root`.
    ///
    /// Must be called from within a Tokio runtime: producers for call steps
    /// are spawned onto it.
    ///
    /// # Errors
    ///
    /// - [`ChainError::NotAnObject`] if a step reads off a non-null scalar or
    ///   list.
    /// - [`ChainError::NotCallable`] if a call step names a property that is
    ///   not callable.
    /// - [`ChainError::Producer`] / [`ChainError::Panicked`] if a call step
    ///   failed, now or in an earlier evaluation whose entry is still cached.
    pub async fn evaluate(
        &self,
        root: impl Into<Value>,
        chain: &Chain,
        options: &EvaluateOptions,
    ) -> Result<Evaluation, ChainError> {
        let root = root.into();
        let span_id = self.tracer.new_span_id();
        let mut key = QueryKey::root(&root);
        self.tracer.on_evaluation_start(span_id, &key);

        let result = self
            .fold(span_id, root.clone(), chain, options, &mut key)
            .await;

        match &result {
            Ok(_) => self
                .tracer
                .on_evaluation_end(span_id, &key, ExecutionResult::Ok),
            Err(e) => self.tracer.on_evaluation_end(
                span_id,
                &key,
                ExecutionResult::Error {
                    message: e.to_string(),
                },
            ),
        }

        let value = result?;
        Ok(Evaluation {
            value,
            key,
            root,
            chain: chain.clone(),
            runtime: self.clone(),
        })
    }

    async fn fold(
        &self,
        span_id: SpanId,
        mut current: Value,
        chain: &Chain,
        options: &EvaluateOptions,
        key: &mut QueryKey,
    ) -> Result<Value, ChainError> {
        for item in chain.items() {
            let (name, args) = match item {
                ChainItem::Transform(transform) => {
                    self.tracer.on_step(span_id, key, StepKind::Transform);
                    current = transform.apply(&current, &options.dependencies);
                    continue;
                }
                ChainItem::Property { name } => (name, None),
                ChainItem::Call { method, args } => (method, Some(args)),
            };

            *key = key.compose(item);
            if current.is_null() {
                self.tracer.on_short_circuit(span_id, key);
                continue;
            }

            let Some(target) = current.as_object().cloned() else {
                return Err(ChainError::NotAnObject {
                    key: key.clone(),
                    property: name.to_string(),
                    found: current.kind(),
                });
            };

            let Some(args) = args else {
                self.tracer.on_step(span_id, key, StepKind::Property);
                current = target.get(name).unwrap_or_default();
                continue;
            };

            if !target.is_callable(name) {
                return Err(ChainError::NotCallable {
                    key: key.clone(),
                    method: name.to_string(),
                    type_name: target.type_name(),
                });
            }
            self.tracer.on_step(span_id, key, StepKind::Call);

            let observed = structural_hash(&(&current, &options.dependencies[..]));
            let change = self.targets.check_and_record(key, observed);
            self.tracer.on_target_checked(key, change);
            if change == TargetChange::Changed {
                self.cache.invalidate(key, InvalidationReason::TargetChanged);
            }

            let method = name.clone();
            let args = args.clone();
            current = self
                .cache
                .read_or_produce(key, move || async move {
                    target
                        .call(&method, &args)
                        .await
                        .map_err(ChainError::producer)
                })
                .await?;
        }
        Ok(current)
    }
}
