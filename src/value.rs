//! Dynamic values that chains are evaluated against.

use std::any::Any;
use std::fmt::{self, Debug};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use dyn_hash::DynHash;

use crate::hash::structural_hash;
use crate::key::Identity;

/// Helper for downcasting trait objects back to their concrete type.
pub trait AsAny: Any {
    /// Get the value as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A structured object whose properties and methods a chain can reach.
///
/// Implementors provide property reads, async method calls and an identity
/// descriptor. Structural hashing comes from the type's own `Hash` impl, so
/// the hash should cover exactly the state a method result depends on.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Hash)]
/// struct Customer { id: String, name: String }
///
/// #[async_trait]
/// impl Object for Customer {
///     fn identity(&self) -> Option<Identity> {
///         Some(Identity::new("Customer", &self.id))
///     }
///
///     fn get(&self, property: &str) -> Option<Value> {
///         match property {
///             "name" => Some(self.name.as_str().into()),
///             _ => None,
///         }
///     }
///
///     fn is_callable(&self, method: &str) -> bool {
///         method == "getName"
///     }
///
///     async fn call(&self, method: &str, _args: &[Value]) -> anyhow::Result<Value> {
///         match method {
///             "getName" => Ok(self.name.as_str().into()),
///             _ => anyhow::bail!("unknown method {method}"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Object: DynHash + AsAny + Debug + Send + Sync {
    /// Name used in diagnostics and in the default identity.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Identity descriptor used for the root segment of query keys.
    ///
    /// When `None`, the type name plus the structural hash is used, which
    /// makes every content change a new root. Entities with a stable id
    /// should return it here.
    fn identity(&self) -> Option<Identity> {
        None
    }

    /// Read a property. `None` reads as [`Value::Null`].
    fn get(&self, _property: &str) -> Option<Value> {
        None
    }

    /// Whether `method` can be called with arguments.
    fn is_callable(&self, _method: &str) -> bool {
        false
    }

    /// Call a method. Only invoked when [`Object::is_callable`] returned `true`.
    async fn call(&self, method: &str, _args: &[Value]) -> anyhow::Result<Value> {
        anyhow::bail!("`{}` is not callable on {}", method, self.type_name())
    }
}

dyn_hash::hash_trait_object!(Object);

/// A dynamically typed, cheap-to-clone value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value. Chains short-circuit on it.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float. Hashed by its bit pattern.
    Float(f64),
    /// A string.
    Str(Arc<str>),
    /// An ordered list.
    List(Arc<[Value]>),
    /// A structured object.
    Object(Arc<dyn Object>),
}

impl Value {
    /// Wrap a domain object.
    pub fn object<T: Object + 'static>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Object(object) => object.type_name(),
        }
    }

    /// Get the string if this is a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer if this is a [`Value::Int`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the float if this is a [`Value::Float`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get the boolean if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the items if this is a [`Value::List`].
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the object if this is a [`Value::Object`].
    pub fn as_object(&self) -> Option<&Arc<dyn Object>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Downcast an object value to its concrete type.
    pub fn downcast_ref<T: Object + 'static>(&self) -> Option<&T> {
        let object: &dyn Object = self.as_object()?.as_ref();
        object.as_any().downcast_ref()
    }

    /// Identity descriptor of this value when used as a chain root.
    pub fn identity(&self) -> Identity {
        match self {
            Value::Null => Identity::new("null", ""),
            Value::Bool(b) => Identity::new("bool", b.to_string()),
            Value::Int(i) => Identity::new("int", i.to_string()),
            Value::Float(f) => Identity::new("float", f.to_string()),
            Value::Str(s) => Identity::new("str", s),
            Value::List(_) => Identity::new("list", structural_hash(self).to_string()),
            Value::Object(object) => object.identity().unwrap_or_else(|| {
                Identity::new(object.type_name(), structural_hash(self).to_string())
            }),
        }
    }

    /// Cheap identity: shared allocations for `List` and `Object`, equality
    /// for strings and scalars.
    pub fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(object) => Debug::fmt(object, f),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Object(object) => {
                object.type_name().hash(state);
                object.hash(state);
            }
        }
    }
}

/// Scalars compare by value, floats by bit pattern, lists element-wise,
/// objects by reference. Consistent with [`Hash`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::from(items))
    }
}

impl<T: Object + 'static> From<Arc<T>> for Value {
    fn from(object: Arc<T>) -> Self {
        Value::Object(object)
    }
}

impl From<Arc<dyn Object>> for Value {
    fn from(object: Arc<dyn Object>) -> Self {
        Value::Object(object)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
