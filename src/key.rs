//! Hierarchical query keys.
//!
//! A [`QueryKey`] starts with the root's [`Identity`] and grows by one
//! [`KeySegment`] per property read or method call of a chain. Each key is a
//! strict extension of the key of the step before it, which is what makes
//! prefix invalidation cascade down a chain.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::chain::{Chain, ChainItem};
use crate::hash::{structural_hash, StructuralHash};
use crate::value::Value;

/// Identity descriptor of a chain root, e.g. `("Customer", "A")`.
///
/// Roots with equal identities share cache entries even if they are distinct
/// allocations.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    kind: Arc<str>,
    id: Arc<str>,
}

impl Identity {
    /// Create a new identity descriptor.
    pub fn new(kind: impl AsRef<str>, id: impl AsRef<str>) -> Self {
        Self {
            kind: Arc::from(kind.as_ref()),
            id: Arc::from(id.as_ref()),
        }
    }

    /// The kind of root, usually a type name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The id within that kind.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.kind, self.id)
    }
}

/// One token of a [`QueryKey`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
    /// The root identity. Always the first segment.
    Root(Identity),
    /// A plain property read.
    Property(Arc<str>),
    /// A method call. Arguments contribute only their structural hash, so
    /// argument lists with equal hashes share an entry.
    Call {
        /// Method name.
        method: Arc<str>,
        /// Structural hash of the argument list.
        args: StructuralHash,
    },
}

impl Debug for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Root(identity) => write!(f, "{:?}", identity),
            KeySegment::Property(name) => write!(f, ".{}", name),
            KeySegment::Call { method, args } => write!(f, ".{}({:?})", method, args),
        }
    }
}

/// Ordered cache key derived from a root identity and a chain prefix.
///
/// Clone is cheap as segments are wrapped by `Arc`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Arc<Vec<KeySegment>>);

impl QueryKey {
    /// Base key for a root value, derived from its identity descriptor.
    pub fn root(root: &Value) -> Self {
        Self::from_identity(root.identity())
    }

    /// Base key for an explicit identity.
    pub fn from_identity(identity: Identity) -> Self {
        QueryKey(Arc::new(vec![KeySegment::Root(identity)]))
    }

    /// Returns a new key with the segment for `item` appended.
    ///
    /// Transform items contribute no segment, so the key is returned as is.
    #[must_use]
    pub fn compose(&self, item: &ChainItem) -> Self {
        match segment_for(item) {
            Some(segment) => self.pushed(segment),
            None => self.clone(),
        }
    }

    /// Full key of `root` followed by every item of `chain`.
    pub fn for_chain(root: &Value, chain: &Chain) -> Self {
        let mut segments = vec![KeySegment::Root(root.identity())];
        segments.extend(chain.items().iter().filter_map(segment_for));
        QueryKey(Arc::new(segments))
    }

    /// Returns true if `prefix` is this key or an ancestor of it.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The key one segment shorter, or `None` for a root key.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(QueryKey(Arc::new(self.0[..self.0.len() - 1].to_vec())))
    }

    /// The root identity segment.
    pub fn identity(&self) -> Option<&Identity> {
        match self.0.first() {
            Some(KeySegment::Root(identity)) => Some(identity),
            _ => None,
        }
    }

    /// Number of segments, including the root.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no segments. Keys built by this crate
    /// always carry a root segment.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the segments.
    pub fn segments(&self) -> impl Iterator<Item = &KeySegment> + '_ {
        self.0.iter()
    }

    /// Debug representation used in tracing.
    pub fn debug_repr(&self) -> String {
        format!("{:?}", self)
    }

    fn pushed(&self, segment: KeySegment) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend(self.0.iter().cloned());
        segments.push(segment);
        QueryKey(Arc::new(segments))
    }
}

impl Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in self.0.iter() {
            write!(f, "{:?}", segment)?;
        }
        Ok(())
    }
}

impl FromIterator<KeySegment> for QueryKey {
    fn from_iter<T: IntoIterator<Item = KeySegment>>(iter: T) -> Self {
        QueryKey(Arc::new(iter.into_iter().collect()))
    }
}

fn segment_for(item: &ChainItem) -> Option<KeySegment> {
    match item {
        ChainItem::Property { name } => Some(KeySegment::Property(name.clone())),
        ChainItem::Call { method, args } => Some(KeySegment::Call {
            method: method.clone(),
            args: structural_hash(&args[..]),
        }),
        ChainItem::Transform(_) => None,
    }
}
