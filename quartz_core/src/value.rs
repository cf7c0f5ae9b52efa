//! The runtime value representation.
//!
//! Values are cheap to clone: scalars are copied, everything heap-backed is
//! an `Arc`. Mutable payloads (arrays, buffers, tables, environments) put
//! their data behind a `parking_lot::RwLock` so values can be shared across
//! threads; immutable payloads (strings, tuples, structs) share the
//! allocation directly.

use std::any::Any;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;

use crate::env::{EnvInner, Environment};
use crate::error::Result;
use crate::fiber::Fiber;
use crate::funcdef::{Arity, DefFlags, Definition};
use crate::symbol;

/// Insertion-ordered map with the workspace hasher. Used by both tables and
/// structs; structs freeze theirs behind a plain `Arc`.
pub type ValueMap = IndexMap<Value, Value, BuildHasherDefault<FxHasher>>;

/// Signature of a native function.
pub type NativeFn = fn(&[Value]) -> Result<Value>;

/// A host function registered by name.
pub struct NativeFunction {
    pub name: Arc<str>,
    pub doc: Option<Arc<str>>,
    pub fun: NativeFn,
}

/// A guest-compiled function: parameter list, body forms, and the
/// environment it closed over.
pub struct GuestFn {
    pub name: Arc<str>,
    pub params: Box<[Arc<str>]>,
    pub rest: Option<Arc<str>>,
    pub body: Box<[Value]>,
    pub env: Environment,
}

/// Immutable sequence payload. Tuples read from bracket syntax carry a
/// marker so the evaluator builds them as data instead of dispatching a
/// call; the marker never takes part in equality, hashing, or ordering.
pub struct Tuple {
    items: Box<[Value]>,
    bracketed: bool,
}

impl Tuple {
    #[inline]
    pub fn bracketed(&self) -> bool {
        self.bracketed
    }

    #[inline]
    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

impl std::ops::Deref for Tuple {
    type Target = [Value];

    #[inline]
    fn deref(&self) -> &[Value] {
        &self.items
    }
}

/// An opaque host value with a named type.
pub struct AbstractValue {
    pub type_name: &'static str,
    pub data: Box<dyn Any + Send + Sync>,
}

impl AbstractValue {
    pub fn new<T: Any + Send + Sync>(type_name: &'static str, data: T) -> AbstractValue {
        AbstractValue {
            type_name,
            data: Box::new(data),
        }
    }

    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

/// Everything that can be called, behind one calling convention.
///
/// The three variants cover host natives, template-assembled bytecode, and
/// guest-compiled functions. Dispatch lives in the interpreter; this type
/// only carries the data and the introspection surface.
#[derive(Clone)]
pub enum Callable {
    Native(Arc<NativeFunction>),
    Thunk(Arc<Definition>),
    Guest(Arc<GuestFn>),
}

impl Callable {
    pub fn name(&self) -> &Arc<str> {
        match self {
            Callable::Native(n) => &n.name,
            Callable::Thunk(d) => d.name(),
            Callable::Guest(g) => &g.name,
        }
    }

    pub fn doc(&self) -> Option<&Arc<str>> {
        match self {
            Callable::Native(n) => n.doc.as_ref(),
            Callable::Thunk(d) => d.doc(),
            Callable::Guest(_) => None,
        }
    }

    /// Declared arity, where one exists. Natives check their own.
    pub fn arity(&self) -> Option<Arity> {
        match self {
            Callable::Native(_) => None,
            Callable::Thunk(d) => Some(d.arity()),
            Callable::Guest(g) => {
                let n = g.params.len() as u32;
                Some(if g.rest.is_some() {
                    Arity::AtLeast(n)
                } else {
                    Arity::Exact(n)
                })
            }
        }
    }

    /// Type keyword: natives report distinctly from assembled and guest
    /// functions.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Callable::Native(_) => "cfunction",
            Callable::Thunk(_) | Callable::Guest(_) => "function",
        }
    }

    /// Identity comparison: same underlying allocation.
    pub fn identical(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Arc::ptr_eq(a, b),
            (Callable::Thunk(a), Callable::Thunk(b)) => Arc::ptr_eq(a, b),
            (Callable::Guest(a), Callable::Guest(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// True for the builtin apply template.
    pub fn is_apply(&self) -> bool {
        match self {
            Callable::Thunk(d) => d.flags().contains(DefFlags::APPLY),
            _ => false,
        }
    }
}

/// A runtime value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    Str(Arc<str>),
    Symbol(Arc<str>),
    Keyword(Arc<str>),
    Tuple(Arc<Tuple>),
    Struct(Arc<ValueMap>),
    Array(Arc<RwLock<Vec<Value>>>),
    Buffer(Arc<RwLock<Vec<u8>>>),
    Table(Arc<RwLock<ValueMap>>),
    Function(Callable),
    Fiber(Arc<Fiber>),
    Abstract(Arc<AbstractValue>),
    Environment(Environment),
}

impl Value {
    /// Interned symbol.
    pub fn symbol(name: &str) -> Value {
        Value::Symbol(symbol::intern(name))
    }

    /// Interned keyword.
    pub fn keyword(name: &str) -> Value {
        Value::Keyword(symbol::intern(name))
    }

    pub fn tuple(items: impl Into<Box<[Value]>>) -> Value {
        Value::Tuple(Arc::new(Tuple {
            items: items.into(),
            bracketed: false,
        }))
    }

    /// Tuple carrying the bracket marker; the evaluator constructs these
    /// as data.
    pub fn bracket_tuple(items: impl Into<Box<[Value]>>) -> Value {
        Value::Tuple(Arc::new(Tuple {
            items: items.into(),
            bracketed: true,
        }))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn buffer(bytes: Vec<u8>) -> Value {
        Value::Buffer(Arc::new(RwLock::new(bytes)))
    }

    pub fn table(map: ValueMap) -> Value {
        Value::Table(Arc::new(RwLock::new(map)))
    }

    pub fn structure(map: ValueMap) -> Value {
        Value::Struct(Arc::new(map))
    }

    /// Type keyword name reported by introspection.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Keyword(_) => "keyword",
            Value::Tuple(_) => "tuple",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
            Value::Buffer(_) => "buffer",
            Value::Table(_) => "table",
            Value::Function(f) => f.kind_name(),
            Value::Fiber(_) => "fiber",
            Value::Abstract(a) => a.type_name,
            Value::Environment(_) => "environment",
        }
    }

    /// Only `nil` and `false` are falsey.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number that is an exact integer in the given range.
    pub fn as_integer(&self) -> Option<i64> {
        let n = self.as_number()?;
        if n.fract() == 0.0 && n >= -(2f64.powi(53)) && n <= 2f64.powi(53) {
            Some(n as i64)
        } else {
            None
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_environment(&self) -> Option<&Environment> {
        match self {
            Value::Environment(env) => Some(env),
            _ => None,
        }
    }

    pub fn as_fiber(&self) -> Option<&Arc<Fiber>> {
        match self {
            Value::Fiber(f) => Some(f),
            _ => None,
        }
    }

    /// Identity: pointer equality for heap values, plain equality for
    /// scalars. This is what mutable-value equality and root removal use.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b))
            | (Value::Symbol(a), Value::Symbol(b))
            | (Value::Keyword(a), Value::Keyword(b)) => Arc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Arc::ptr_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Buffer(a), Value::Buffer(b)) => Arc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.identical(b),
            (Value::Fiber(a), Value::Fiber(b)) => Arc::ptr_eq(a, b),
            (Value::Abstract(a), Value::Abstract(b)) => Arc::ptr_eq(a, b),
            (Value::Environment(a), Value::Environment(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Weak handle for collector tracking; only mutable heap values are
    /// trackable.
    pub fn downgrade(&self) -> Option<WeakValue> {
        match self {
            Value::Array(a) => Some(WeakValue::Array(Arc::downgrade(a))),
            Value::Buffer(b) => Some(WeakValue::Buffer(Arc::downgrade(b))),
            Value::Table(t) => Some(WeakValue::Table(Arc::downgrade(t))),
            Value::Environment(env) => Some(WeakValue::Environment(env.downgrade())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl From<Callable> for Value {
    fn from(f: Callable) -> Value {
        Value::Function(f)
    }
}

/// Weak reference to a mutable heap value, held by the collector's tracking
/// list.
pub enum WeakValue {
    Array(Weak<RwLock<Vec<Value>>>),
    Buffer(Weak<RwLock<Vec<u8>>>),
    Table(Weak<RwLock<ValueMap>>),
    Environment(Weak<RwLock<EnvInner>>),
}

impl WeakValue {
    /// Does the underlying allocation still have strong holders?
    pub fn is_alive(&self) -> bool {
        match self {
            WeakValue::Array(w) => w.strong_count() > 0,
            WeakValue::Buffer(w) => w.strong_count() > 0,
            WeakValue::Table(w) => w.strong_count() > 0,
            WeakValue::Environment(w) => w.strong_count() > 0,
        }
    }

    /// Recover a strong value while the allocation is alive.
    pub fn upgrade_value(&self) -> Option<Value> {
        match self {
            WeakValue::Array(w) => w.upgrade().map(Value::Array),
            WeakValue::Buffer(w) => w.upgrade().map(Value::Buffer),
            WeakValue::Table(w) => w.upgrade().map(Value::Table),
            WeakValue::Environment(w) => w
                .upgrade()
                .map(|inner| Value::Environment(Environment::from_shared(inner))),
        }
    }
}
