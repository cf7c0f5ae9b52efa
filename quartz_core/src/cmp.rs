//! Equality, hashing, and the total value order.
//!
//! `=` (the `PartialEq` impl) is total structural equality: NaN equals NaN
//! and `-0.0` is normalized, so equality always agrees with `Hash` and
//! values are usable as map keys. Mutable containers compare by identity.
//! The machine's numeric-equality opcode keeps IEEE semantics and lives in
//! the interpreter, not here.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::value::{Callable, Tuple, Value};

/// Canonical bit pattern: one NaN, one zero.
#[inline]
fn canonical_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0f64.to_bits()
    } else {
        n.to_bits()
    }
}

fn callable_ptr(f: &Callable) -> usize {
    match f {
        Callable::Native(n) => Arc::as_ptr(n) as usize,
        Callable::Thunk(d) => Arc::as_ptr(d) as usize,
        Callable::Guest(g) => Arc::as_ptr(g) as usize,
    }
}

// The bracket marker is reader-side metadata; tuples compare by contents.
impl PartialEq for Tuple {
    fn eq(&self, other: &Tuple) -> bool {
        self.items() == other.items()
    }
}

impl Eq for Tuple {}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => {
                // Insertion order does not matter for struct equality.
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map_or(false, |bv| bv == v))
            }
            _ => self.identical(other),
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Nil => state.write_u8(0),
            Value::Boolean(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Number(n) => {
                state.write_u8(2);
                state.write_u64(canonical_bits(*n));
            }
            Value::Str(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            Value::Symbol(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Value::Keyword(s) => {
                state.write_u8(5);
                s.hash(state);
            }
            Value::Tuple(items) => {
                state.write_u8(6);
                state.write_u64(items.len() as u64);
                for item in items.iter() {
                    item.hash(state);
                }
            }
            Value::Struct(map) => {
                // Commutative fold keeps the hash order-independent, to
                // match struct equality.
                state.write_u8(7);
                state.write_u64(map.len() as u64);
                let mut acc = 0u64;
                for (k, v) in map.iter() {
                    let mut pair = FxHasher::default();
                    k.hash(&mut pair);
                    v.hash(&mut pair);
                    acc = acc.wrapping_add(pair.finish());
                }
                state.write_u64(acc);
            }
            Value::Array(a) => {
                state.write_u8(8);
                state.write_usize(Arc::as_ptr(a) as *const () as usize);
            }
            Value::Buffer(b) => {
                state.write_u8(9);
                state.write_usize(Arc::as_ptr(b) as *const () as usize);
            }
            Value::Table(t) => {
                state.write_u8(10);
                state.write_usize(Arc::as_ptr(t) as *const () as usize);
            }
            Value::Function(f) => {
                state.write_u8(11);
                state.write_usize(callable_ptr(f));
            }
            Value::Fiber(f) => {
                state.write_u8(12);
                state.write_usize(Arc::as_ptr(f) as usize);
            }
            Value::Abstract(a) => {
                state.write_u8(13);
                state.write_usize(Arc::as_ptr(a) as usize);
            }
            Value::Environment(env) => {
                state.write_u8(14);
                state.write_usize(env.as_ptr() as usize);
            }
        }
    }
}

/// 32-bit structural hash, the value the `hash` native reports.
pub fn hash_value(v: &Value) -> u32 {
    let mut hasher = FxHasher::default();
    v.hash(&mut hasher);
    (hasher.finish() & 0xffff_ffff) as u32
}

/// Rank in the cross-type total order.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Nil => 0,
        Value::Boolean(_) => 1,
        Value::Number(_) => 2,
        Value::Str(_) => 3,
        Value::Symbol(_) => 4,
        Value::Keyword(_) => 5,
        Value::Tuple(_) => 6,
        Value::Struct(_) => 7,
        Value::Array(_) => 8,
        Value::Buffer(_) => 9,
        Value::Table(_) => 10,
        Value::Function(_) => 11,
        Value::Fiber(_) => 12,
        Value::Abstract(_) => 13,
        Value::Environment(_) => 14,
    }
}

/// Total order over all values: by type rank, then within the type. Used
/// by the generic comparison opcodes and anywhere values need sorting.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => f64::from_bits(canonical_bits(*x))
            .total_cmp(&f64::from_bits(canonical_bits(*y))),
        (Value::Str(x), Value::Str(y))
        | (Value::Symbol(x), Value::Symbol(y))
        | (Value::Keyword(x), Value::Keyword(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Value::Tuple(x), Value::Tuple(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ord = total_cmp(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Struct(x), Value::Struct(y)) => {
            let len = x.len().cmp(&y.len());
            if len != Ordering::Equal {
                return len;
            }
            let mut xs: Vec<(&Value, &Value)> = x.iter().collect();
            let mut ys: Vec<(&Value, &Value)> = y.iter().collect();
            xs.sort_by(|l, r| total_cmp(l.0, r.0));
            ys.sort_by(|l, r| total_cmp(l.0, r.0));
            for ((xk, xv), (yk, yv)) in xs.iter().zip(ys.iter()) {
                let ord = total_cmp(xk, yk);
                if ord != Ordering::Equal {
                    return ord;
                }
                let ord = total_cmp(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        }
        // Identity types order by allocation address: arbitrary but stable,
        // and Equal exactly when `=` says so.
        _ => identity_ptr(a).cmp(&identity_ptr(b)),
    }
}

fn identity_ptr(v: &Value) -> usize {
    match v {
        Value::Array(a) => Arc::as_ptr(a) as *const () as usize,
        Value::Buffer(b) => Arc::as_ptr(b) as *const () as usize,
        Value::Table(t) => Arc::as_ptr(t) as *const () as usize,
        Value::Function(f) => callable_ptr(f),
        Value::Fiber(f) => Arc::as_ptr(f) as usize,
        Value::Abstract(a) => Arc::as_ptr(a) as usize,
        Value::Environment(env) => env.as_ptr() as usize,
        _ => 0,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Value) -> Option<Ordering> {
        Some(total_cmp(self, other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Value) -> Ordering {
        total_cmp(self, other)
    }
}
