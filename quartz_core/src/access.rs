//! Data access shared by opcodes and natives.
//!
//! `get`, `put`, `length`, and `next_key` define one semantics used both by
//! the machine's GET/PUT/LENGTH instructions and by the natives of the same
//! names, so assembled templates and host calls can never disagree.

use crate::describe::describe;
use crate::error::{QuartzError, Result};
use crate::value::Value;

/// Keys must be hashable forever: `nil` and NaN are rejected.
pub fn check_key(key: &Value) -> Result<()> {
    match key {
        Value::Nil => Err(QuartzError::value("nil is not a valid key")),
        Value::Number(n) if n.is_nan() => Err(QuartzError::value("NaN is not a valid key")),
        _ => Ok(()),
    }
}

/// Element or byte count.
pub fn length(v: &Value) -> Result<usize> {
    match v {
        Value::Str(s) | Value::Symbol(s) | Value::Keyword(s) => Ok(s.len()),
        Value::Buffer(b) => Ok(b.read().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Array(a) => Ok(a.read().len()),
        Value::Struct(map) => Ok(map.len()),
        Value::Table(t) => Ok(t.read().len()),
        Value::Environment(env) => Ok(env.len()),
        other => Err(QuartzError::value(format!(
            "cannot take the length of a {}",
            other.type_name()
        ))),
    }
}

fn index_of(key: &Value, len: usize) -> Option<usize> {
    let i = key.as_integer()?;
    if i >= 0 && (i as usize) < len {
        Some(i as usize)
    } else {
        None
    }
}

fn name_of(key: &Value) -> Option<&str> {
    match key {
        Value::Symbol(s) | Value::Keyword(s) | Value::Str(s) => Some(s),
        _ => None,
    }
}

/// Keyed or indexed read. Absent entries and out-of-range indexes read as
/// `nil`; only unindexable types are an error.
pub fn get(ds: &Value, key: &Value) -> Result<Value> {
    match ds {
        Value::Nil => Ok(Value::Nil),
        Value::Tuple(items) => Ok(index_of(key, items.len())
            .map(|i| items[i].clone())
            .unwrap_or(Value::Nil)),
        Value::Array(a) => {
            let items = a.read();
            Ok(index_of(key, items.len())
                .map(|i| items[i].clone())
                .unwrap_or(Value::Nil))
        }
        Value::Str(s) | Value::Symbol(s) | Value::Keyword(s) => {
            Ok(index_of(key, s.len())
                .map(|i| Value::Number(s.as_bytes()[i] as f64))
                .unwrap_or(Value::Nil))
        }
        Value::Buffer(b) => {
            let bytes = b.read();
            Ok(index_of(key, bytes.len())
                .map(|i| Value::Number(bytes[i] as f64))
                .unwrap_or(Value::Nil))
        }
        Value::Struct(map) => Ok(map.get(key).cloned().unwrap_or(Value::Nil)),
        Value::Table(t) => Ok(t.read().get(key).cloned().unwrap_or(Value::Nil)),
        Value::Environment(env) => Ok(name_of(key)
            .and_then(|name| env.resolve(name))
            .map(|binding| binding.value)
            .unwrap_or(Value::Nil)),
        other => Err(QuartzError::value(format!(
            "cannot get from a {}",
            other.type_name()
        ))),
    }
}

/// Keyed or indexed write into a mutable container.
pub fn put(ds: &Value, key: Value, value: Value) -> Result<()> {
    match ds {
        Value::Array(a) => {
            let i = key
                .as_integer()
                .filter(|i| *i >= 0)
                .ok_or_else(|| QuartzError::value("expected a non-negative integer key"))?
                as usize;
            let mut items = a.write();
            if i >= items.len() {
                items.resize(i + 1, Value::Nil);
            }
            items[i] = value;
            Ok(())
        }
        Value::Buffer(b) => {
            let i = key
                .as_integer()
                .filter(|i| *i >= 0)
                .ok_or_else(|| QuartzError::value("expected a non-negative integer key"))?
                as usize;
            let byte = value
                .as_integer()
                .filter(|b| (0..=255).contains(b))
                .ok_or_else(|| QuartzError::value("expected a byte value in 0..=255"))?
                as u8;
            let mut bytes = b.write();
            if i >= bytes.len() {
                bytes.resize(i + 1, 0);
            }
            bytes[i] = byte;
            Ok(())
        }
        Value::Table(t) => {
            check_key(&key)?;
            let mut map = t.write();
            if value.is_nil() {
                map.shift_remove(&key);
            } else {
                map.insert(key, value);
            }
            Ok(())
        }
        Value::Tuple(_) | Value::Struct(_) | Value::Str(_) | Value::Symbol(_)
        | Value::Keyword(_) => Err(QuartzError::value(format!(
            "cannot put into an immutable {}",
            ds.type_name()
        ))),
        Value::Environment(_) => Err(QuartzError::value(
            "cannot put into an environment; define a binding instead",
        )),
        other => Err(QuartzError::value(format!(
            "cannot put into a {}",
            other.type_name()
        ))),
    }
}

/// Ordered-key traversal protocol over associative containers.
///
/// `nil` as `prev` asks for the first key; `nil` out means the traversal is
/// finished. A `prev` key that is not present is an error: the caller lost
/// its place, likely to a concurrent removal.
pub fn next_key(ds: &Value, prev: &Value) -> Result<Value> {
    match ds {
        Value::Nil => Ok(Value::Nil),
        Value::Struct(map) => {
            if prev.is_nil() {
                return Ok(map.keys().next().cloned().unwrap_or(Value::Nil));
            }
            match map.get_index_of(prev) {
                Some(i) => Ok(map
                    .get_index(i + 1)
                    .map(|(k, _)| k.clone())
                    .unwrap_or(Value::Nil)),
                None => Err(missing_key(prev)),
            }
        }
        Value::Table(t) => {
            let map = t.read();
            if prev.is_nil() {
                return Ok(map.keys().next().cloned().unwrap_or(Value::Nil));
            }
            match map.get_index_of(prev) {
                Some(i) => Ok(map
                    .get_index(i + 1)
                    .map(|(k, _)| k.clone())
                    .unwrap_or(Value::Nil)),
                None => Err(missing_key(prev)),
            }
        }
        Value::Environment(env) => {
            let prev_name = if prev.is_nil() {
                None
            } else {
                Some(name_of(prev).ok_or_else(|| {
                    QuartzError::value("environment keys are symbols")
                })?)
            };
            let (found, next) = env.key_after(prev_name);
            if !found {
                return Err(missing_key(prev));
            }
            Ok(next.map(Value::Symbol).unwrap_or(Value::Nil))
        }
        other => Err(QuartzError::value(format!(
            "expected a table, struct or environment, got {}",
            other.type_name()
        ))),
    }
}

fn missing_key(prev: &Value) -> QuartzError {
    QuartzError::value(format!("key {} is not present", describe(prev)))
}
