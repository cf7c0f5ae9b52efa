//! Binding tables.
//!
//! An [`Environment`] maps interned names to bindings (value plus docstring
//! plus flags) in insertion order, optionally chaining to a parent for
//! lexical lookup. The core environment produced by the bootstrapper is one
//! of these with no parent and a `_env` self-reference.

use std::fmt;
use std::hash::BuildHasherDefault;
use std::ops::BitOr;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;

use crate::symbol;
use crate::value::Value;

type BindingMap = IndexMap<Arc<str>, Binding, BuildHasherDefault<FxHasher>>;

/// Per-binding flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindFlags(u32);

impl BindFlags {
    pub const NONE: BindFlags = BindFlags(0);
    /// Not exported when the table is treated as a module.
    pub const PRIVATE: BindFlags = BindFlags(1 << 0);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> BindFlags {
        BindFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: BindFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BindFlags {
    type Output = BindFlags;

    fn bitor(self, rhs: BindFlags) -> BindFlags {
        BindFlags(self.0 | rhs.0)
    }
}

/// One entry of a binding table.
#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub doc: Option<Arc<str>>,
    pub flags: BindFlags,
}

#[doc(hidden)]
pub struct EnvInner {
    bindings: BindingMap,
    parent: Option<Environment>,
}

/// A shared, lockable binding table.
#[derive(Clone)]
pub struct Environment(Arc<RwLock<EnvInner>>);

impl Environment {
    pub fn new() -> Environment {
        Environment(Arc::new(RwLock::new(EnvInner {
            bindings: BindingMap::default(),
            parent: None,
        })))
    }

    /// Fresh table chained to `self` for lookups.
    pub fn child(&self) -> Environment {
        Environment(Arc::new(RwLock::new(EnvInner {
            bindings: BindingMap::default(),
            parent: Some(self.clone()),
        })))
    }

    /// Parent table, if this one chains to another.
    pub fn parent(&self) -> Option<Environment> {
        self.0.read().parent.clone()
    }

    /// Replace the parent link. Used when reconstructing tables from
    /// snapshots, where the chain arrives after the table itself.
    pub fn set_parent(&self, parent: Option<Environment>) {
        self.0.write().parent = parent;
    }

    /// Define or replace a binding in this table.
    pub fn def(&self, name: &str, value: Value, doc: Option<&str>) {
        let name = symbol::intern(name);
        let binding = Binding {
            value,
            doc: doc.map(Arc::from),
            flags: BindFlags::NONE,
        };
        self.0.write().bindings.insert(name, binding);
    }

    /// Define with pre-built binding parts; used by the marshal reader.
    pub fn def_binding(&self, name: Arc<str>, binding: Binding) {
        self.0.write().bindings.insert(name, binding);
    }

    /// Value lookup through the parent chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.0.read();
        if let Some(binding) = inner.bindings.get(name) {
            return Some(binding.value.clone());
        }
        let parent = inner.parent.clone()?;
        drop(inner);
        parent.get(name)
    }

    /// Full binding lookup through the parent chain.
    pub fn resolve(&self, name: &str) -> Option<Binding> {
        let inner = self.0.read();
        if let Some(binding) = inner.bindings.get(name) {
            return Some(binding.clone());
        }
        let parent = inner.parent.clone()?;
        drop(inner);
        parent.resolve(name)
    }

    /// Overwrite an existing binding somewhere in the chain. Returns false
    /// when no table in the chain defines `name`.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let mut inner = self.0.write();
        if let Some(binding) = inner.bindings.get_mut(name) {
            binding.value = value;
            return true;
        }
        let parent = inner.parent.clone();
        drop(inner);
        match parent {
            Some(parent) => parent.set(name, value),
            None => false,
        }
    }

    /// Is `name` bound in this table (parents not consulted)?
    pub fn contains_local(&self, name: &str) -> bool {
        self.0.read().bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.read().bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().bindings.is_empty()
    }

    /// Snapshot of the local bindings in definition order.
    pub fn entries(&self) -> Vec<(Arc<str>, Binding)> {
        self.0
            .read()
            .bindings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Local binding names in definition order.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.0.read().bindings.keys().cloned().collect()
    }

    /// Key after `prev` in definition order; `None` for the first key.
    /// Returns `None` past the last key and reports whether `prev` was
    /// found at all.
    pub fn key_after(&self, prev: Option<&str>) -> (bool, Option<Arc<str>>) {
        let inner = self.0.read();
        match prev {
            None => (true, inner.bindings.keys().next().cloned()),
            Some(name) => match inner.bindings.get_index_of(name) {
                Some(i) => (
                    true,
                    inner.bindings.get_index(i + 1).map(|(k, _)| k.clone()),
                ),
                None => (false, None),
            },
        }
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the shared table, for identity hashing.
    #[inline]
    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }

    pub fn downgrade(&self) -> Weak<RwLock<EnvInner>> {
        Arc::downgrade(&self.0)
    }

    /// Rewrap a shared table; used when upgrading weak references.
    pub fn from_shared(inner: Arc<RwLock<EnvInner>>) -> Environment {
        Environment(inner)
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Environment({} bindings @ {:p})",
            self.len(),
            Arc::as_ptr(&self.0)
        )
    }
}
