//! Error types for chain evaluation.

use std::sync::Arc;

use thiserror::Error;

use crate::key::QueryKey;

/// Errors surfaced by chain evaluation.
///
/// Contract errors ([`ChainError::NotAnObject`], [`ChainError::NotCallable`])
/// are raised at the step that misused a value and are never cached.
/// Producer failures are cached per key and handed to every current and
/// future caller until the key is invalidated and successfully re-produced.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// A property was read off a value that is neither null nor an object.
    #[error("cannot read `{property}` at {key:?}: value is a {found}, not an object")]
    NotAnObject {
        /// Key of the offending step.
        key: QueryKey,
        /// Property or method name.
        property: String,
        /// Kind of the value found instead.
        found: &'static str,
    },

    /// A property was called with arguments but is not callable.
    #[error("`{method}` is not callable on {type_name} at {key:?}")]
    NotCallable {
        /// Key of the offending step.
        key: QueryKey,
        /// Method name.
        method: String,
        /// Type name of the target object.
        type_name: &'static str,
    },

    /// The underlying call of an async step failed.
    ///
    /// The error is shared so it can be cached and handed to every waiter.
    #[error("producer failed: {0}")]
    Producer(Arc<anyhow::Error>),

    /// The producer task panicked or was torn down with its runtime.
    #[error("producer panicked: {message}")]
    Panicked {
        /// Panic message, when one could be extracted.
        message: String,
    },
}

impl ChainError {
    /// Wrap a producer failure.
    pub fn producer(err: impl Into<anyhow::Error>) -> Self {
        ChainError::Producer(Arc::new(err.into()))
    }

    /// Returns a reference to the inner producer error if this is a
    /// `Producer` variant.
    pub fn producer_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            ChainError::Producer(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts to downcast the producer error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.producer_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns true for programmer errors that retrying cannot fix.
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            ChainError::NotAnObject { .. } | ChainError::NotCallable { .. }
        )
    }
}
