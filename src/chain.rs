//! Chain construction.
//!
//! A [`Chain`] records property reads, method calls and transforms without
//! running any of them. Every builder method returns a new chain and leaves
//! the receiver untouched, so a chain can be shared, extended in several
//! directions and evaluated any number of times.
//!
//! # Example
//!
//! ```ignore
//! let name = build_chain(customer)
//!     .call("getDetailed")
//!     .get("child")
//!     .call("getDetailed")
//!     .call("getName")
//!     .transform(|name| name.as_str().map(str::to_uppercase).into());
//!
//! let evaluation = name.evaluate(&runtime).await?;
//! ```

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ChainError;
use crate::evaluate::{EvaluateOptions, Evaluation};
use crate::hash::{structural_hash, StructuralHash};
use crate::key::QueryKey;
use crate::runtime::ChainRuntime;
use crate::value::Value;

/// Mapping function carried by a transform step.
pub type TransformFn = dyn Fn(&Value) -> Value + Send + Sync;

/// One deferred step of a chain.
#[derive(Clone)]
pub enum ChainItem {
    /// Read `name` off the current value.
    Property {
        /// Property name.
        name: Arc<str>,
    },
    /// Call `method` on the current value and wait for its result through
    /// the cache.
    Call {
        /// Method name.
        method: Arc<str>,
        /// Arguments passed to the method.
        args: Arc<[Value]>,
    },
    /// Map the current value through a pure function.
    Transform(Arc<Transform>),
}

impl ChainItem {
    /// Create a property read.
    pub fn property(name: impl AsRef<str>) -> Self {
        ChainItem::Property {
            name: Arc::from(name.as_ref()),
        }
    }

    /// Create a method call.
    pub fn call(method: impl AsRef<str>, args: impl IntoIterator<Item = Value>) -> Self {
        ChainItem::Call {
            method: Arc::from(method.as_ref()),
            args: args.into_iter().collect(),
        }
    }

    /// Create an item from a name and optional arguments: absent arguments
    /// make a property read, present ones a method call.
    pub fn new(name: impl AsRef<str>, args: Option<Vec<Value>>) -> Self {
        match args {
            None => Self::property(name),
            Some(args) => Self::call(name, args),
        }
    }

    /// Property or method name, `None` for transforms.
    pub fn name(&self) -> Option<&str> {
        match self {
            ChainItem::Property { name } => Some(name),
            ChainItem::Call { method, .. } => Some(method),
            ChainItem::Transform(_) => None,
        }
    }
}

impl Debug for ChainItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainItem::Property { name } => write!(f, ".{}", name),
            ChainItem::Call { method, args } => {
                write!(f, ".{}(", method)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", arg)?;
                }
                write!(f, ")")
            }
            ChainItem::Transform(_) => write!(f, ".transform(..)"),
        }
    }
}

/// A pure mapping step with a single-slot memo.
///
/// The memo is owned by the step, so every chain sharing this step shares
/// it. It is reused while the input is [`Value::same`] as the last one and
/// the declared dependencies hash equal.
pub struct Transform {
    func: Box<TransformFn>,
    dependencies: Vec<Value>,
    memo: Mutex<Option<TransformMemo>>,
}

struct TransformMemo {
    input: Value,
    dependencies: StructuralHash,
    output: Value,
}

impl Transform {
    fn new(func: Box<TransformFn>, dependencies: Vec<Value>) -> Self {
        Self {
            func,
            dependencies,
            memo: Mutex::new(None),
        }
    }

    /// Declared dependencies of this step.
    pub fn dependencies(&self) -> &[Value] {
        &self.dependencies
    }

    /// Apply the function to `input`, reusing the memo when possible.
    ///
    /// `extra` are evaluation-wide dependencies that also key the memo.
    pub fn apply(&self, input: &Value, extra: &[Value]) -> Value {
        let dependencies = structural_hash(&(&self.dependencies[..], extra));
        if let Some(memo) = self.memo.lock().as_ref() {
            if memo.dependencies == dependencies && Value::same(&memo.input, input) {
                return memo.output.clone();
            }
        }
        // The memo is not locked while the function runs; it may re-enter.
        let output = (self.func)(input);
        let _previous = self.memo.lock().replace(TransformMemo {
            input: input.clone(),
            dependencies,
            output: output.clone(),
        });
        output
    }
}

/// Ordered, immutable list of deferred steps.
///
/// Clone is cheap as the items are wrapped by `Arc`.
#[derive(Clone, Default)]
pub struct Chain(Arc<Vec<ChainItem>>);

impl Chain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new chain with `item` appended.
    #[must_use]
    pub fn push(&self, item: ChainItem) -> Self {
        let mut items = Vec::with_capacity(self.0.len() + 1);
        items.extend(self.0.iter().cloned());
        items.push(item);
        Chain(Arc::new(items))
    }

    /// Append a property read (`args == None`) or a method call.
    #[must_use]
    pub fn extend(&self, name: impl AsRef<str>, args: Option<Vec<Value>>) -> Self {
        self.push(ChainItem::new(name, args))
    }

    /// Append a property read.
    #[must_use]
    pub fn get(&self, name: impl AsRef<str>) -> Self {
        self.push(ChainItem::property(name))
    }

    /// Append a method call without arguments.
    #[must_use]
    pub fn call(&self, method: impl AsRef<str>) -> Self {
        self.push(ChainItem::call(method, []))
    }

    /// Append a method call with arguments.
    #[must_use]
    pub fn call_with(
        &self,
        method: impl AsRef<str>,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.push(ChainItem::call(method, args))
    }

    /// Append a pure transform.
    #[must_use]
    pub fn transform<F>(&self, func: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.transform_with(func, Vec::new())
    }

    /// Append a pure transform whose memo also depends on `dependencies`.
    #[must_use]
    pub fn transform_with<F>(&self, func: F, dependencies: Vec<Value>) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let transform = Transform::new(Box::new(func), dependencies);
        self.push(ChainItem::Transform(Arc::new(transform)))
    }

    /// The recorded steps, in order.
    pub fn items(&self) -> &[ChainItem] {
        &self.0
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no step has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in self.0.iter() {
            write!(f, "{:?}", item)?;
        }
        Ok(())
    }
}

/// Start a chain bound to `root`.
///
/// `root` may be [`Value::Null`] as a placeholder for data that is not loaded
/// yet; such a chain evaluates to `Null` (or to whatever its transforms make
/// of `Null`) without calling anything.
pub fn build_chain(root: impl Into<Value>) -> Lazy {
    Lazy::new(root)
}

/// A chain bound to its root value.
#[derive(Clone, Debug)]
pub struct Lazy {
    root: Value,
    chain: Chain,
}

impl Lazy {
    /// Bind an empty chain to `root`.
    pub fn new(root: impl Into<Value>) -> Self {
        Self {
            root: root.into(),
            chain: Chain::new(),
        }
    }

    fn with_chain(&self, chain: Chain) -> Self {
        Self {
            root: self.root.clone(),
            chain,
        }
    }

    /// See [`Chain::extend`].
    #[must_use]
    pub fn extend(&self, name: impl AsRef<str>, args: Option<Vec<Value>>) -> Self {
        self.with_chain(self.chain.extend(name, args))
    }

    /// See [`Chain::get`].
    #[must_use]
    pub fn get(&self, name: impl AsRef<str>) -> Self {
        self.with_chain(self.chain.get(name))
    }

    /// See [`Chain::call`].
    #[must_use]
    pub fn call(&self, method: impl AsRef<str>) -> Self {
        self.with_chain(self.chain.call(method))
    }

    /// See [`Chain::call_with`].
    #[must_use]
    pub fn call_with(
        &self,
        method: impl AsRef<str>,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.with_chain(self.chain.call_with(method, args))
    }

    /// See [`Chain::transform`].
    #[must_use]
    pub fn transform<F>(&self, func: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.with_chain(self.chain.transform(func))
    }

    /// See [`Chain::transform_with`].
    #[must_use]
    pub fn transform_with<F>(&self, func: F, dependencies: Vec<Value>) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.with_chain(self.chain.transform_with(func, dependencies))
    }

    /// The root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The recorded chain.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Full query key of this chain.
    pub fn key(&self) -> QueryKey {
        QueryKey::for_chain(&self.root, &self.chain)
    }

    /// Evaluate with default options.
    pub async fn evaluate(&self, runtime: &ChainRuntime) -> Result<Evaluation, ChainError> {
        runtime
            .evaluate(self.root.clone(), &self.chain, &EvaluateOptions::default())
            .await
    }

    /// Evaluate with explicit options.
    pub async fn evaluate_with(
        &self,
        runtime: &ChainRuntime,
        options: &EvaluateOptions,
    ) -> Result<Evaluation, ChainError> {
        runtime
            .evaluate(self.root.clone(), &self.chain, options)
            .await
    }

    /// Invalidate this chain's key and everything derived from it.
    pub fn invalidate(&self, runtime: &ChainRuntime) -> usize {
        runtime.invalidate_by_chain(&self.root, &self.chain)
    }
}
