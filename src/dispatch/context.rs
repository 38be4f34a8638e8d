//! Request-scoped context.
//!
//! A [`Context`] is an immutable chain of bindings. Deriving a child with
//! [`Context::with_value`] never touches the parent, so calls that derive
//! from the same root cannot observe each other's bindings.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::dispatch::pattern::PathVars;

/// A key under which a value can be stored in a [`Context`].
///
/// Keys are distinguished by type, so two modules defining their own key
/// types can never collide.
pub trait ContextKey: 'static {
    type Value: Send + Sync + 'static;
}

struct Node {
    key: TypeId,
    value: Box<dyn Any + Send + Sync>,
    parent: Option<Arc<Node>>,
}

/// An immutable, derivable key/value association.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// Create an empty root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context with `value` bound under `K`.
    pub fn with_value<K: ContextKey>(&self, value: K::Value) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key: TypeId::of::<K>(),
                value: Box::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    /// Look up the most recently bound value for `K`.
    pub fn value<K: ContextKey>(&self) -> Option<&K::Value> {
        let key = TypeId::of::<K>();
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            if current.key == key {
                return current.value.downcast_ref::<K::Value>();
            }
            node = current.parent.as_deref();
        }
        None
    }

    /// Number of bindings along the derivation chain, shadowed ones included.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            depth += 1;
            node = current.parent.as_deref();
        }
        depth
    }

    /// Derive a child context carrying `vars` as the path variables.
    pub fn with_path_vars(&self, vars: PathVars) -> Self {
        self.with_value::<PathVarsKey>(vars)
    }

    /// The bound path variables, or an empty set if none were bound.
    pub fn path_vars(&self) -> PathVars {
        self.value::<PathVarsKey>().cloned().unwrap_or_default()
    }

    /// A single path variable.
    pub fn path_var(&self, name: &str) -> Option<&str> {
        self.value::<PathVarsKey>().and_then(|vars| vars.get(name))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth())
            .field("path_vars", &self.value::<PathVarsKey>())
            .finish()
    }
}

struct PathVarsKey;

impl ContextKey for PathVarsKey {
    type Value = PathVars;
}
