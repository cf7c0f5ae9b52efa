//! Mutable array natives.

use quartz_core::{args, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};
use crate::libs::{opt_integer, slice_range};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "new",
        doc: "Creates an empty array with capacity for n elements.",
        fun: array_new,
    },
    NativeEntry {
        name: "push",
        doc: "Appends the remaining arguments to the array. Returns the \
              array.",
        fun: array_push,
    },
    NativeEntry {
        name: "pop",
        doc: "Removes and returns the last element of the array, or nil if \
              it is empty.",
        fun: array_pop,
    },
    NativeEntry {
        name: "peek",
        doc: "Returns the last element of the array, or nil if it is empty.",
        fun: array_peek,
    },
    NativeEntry {
        name: "slice",
        doc: "Returns a new array of the elements from start to end. \
              Negative indexes count back from the end, -1 naming the end.",
        fun: array_slice,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("array"), FUNCTIONS);
}

fn as_array(name: &str, arguments: &[Value], i: usize) -> Result<Value> {
    match arguments.get(i) {
        Some(v @ Value::Array(_)) => Ok(v.clone()),
        Some(other) => Err(QuartzError::value(format!(
            "{name} expects an array, got {}",
            other.type_name()
        ))),
        None => Err(QuartzError::arity(format!(
            "{name} called with {} arguments, expected at least {}",
            arguments.len(),
            i + 1
        ))),
    }
}

fn array_new(arguments: &[Value]) -> Result<Value> {
    args::arity("array/new", arguments, 0, Some(1))?;
    let capacity = opt_integer("array/new", arguments, 0)?.unwrap_or(0);
    if capacity < 0 {
        return Err(QuartzError::range(format!(
            "array/new: capacity must be non-negative, got {capacity}"
        )));
    }
    Ok(Value::array(Vec::with_capacity(capacity as usize)))
}

fn array_push(arguments: &[Value]) -> Result<Value> {
    let array = as_array("array/push", arguments, 0)?;
    if let Value::Array(items) = &array {
        items.write().extend_from_slice(&arguments[1..]);
    }
    Ok(array)
}

fn array_pop(arguments: &[Value]) -> Result<Value> {
    args::fixarity("array/pop", arguments, 1)?;
    let array = as_array("array/pop", arguments, 0)?;
    if let Value::Array(items) = &array {
        return Ok(items.write().pop().unwrap_or(Value::Nil));
    }
    Ok(Value::Nil)
}

fn array_peek(arguments: &[Value]) -> Result<Value> {
    args::fixarity("array/peek", arguments, 1)?;
    let array = as_array("array/peek", arguments, 0)?;
    if let Value::Array(items) = &array {
        return Ok(items.read().last().cloned().unwrap_or(Value::Nil));
    }
    Ok(Value::Nil)
}

fn array_slice(arguments: &[Value]) -> Result<Value> {
    args::arity("array/slice", arguments, 1, Some(3))?;
    let array = as_array("array/slice", arguments, 0)?;
    let start = opt_integer("array/slice", arguments, 1)?;
    let end = opt_integer("array/slice", arguments, 2)?;
    if let Value::Array(items) = &array {
        let items = items.read();
        let (start, end) = slice_range("array/slice", items.len(), start, end)?;
        return Ok(Value::array(items[start..end].to_vec()));
    }
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn push_pop_peek() {
        let arr = array_new(&[num(4.0)]).unwrap();
        array_push(&[arr.clone(), num(1.0), num(2.0)]).unwrap();
        assert_eq!(array_peek(&[arr.clone()]).unwrap(), num(2.0));
        assert_eq!(array_pop(&[arr.clone()]).unwrap(), num(2.0));
        assert_eq!(array_pop(&[arr.clone()]).unwrap(), num(1.0));
        assert_eq!(array_pop(&[arr.clone()]).unwrap(), Value::Nil);
        assert_eq!(array_peek(&[arr]).unwrap(), Value::Nil);
    }

    #[test]
    fn slice_copies_a_range() {
        let arr = Value::array(vec![num(0.0), num(1.0), num(2.0), num(3.0)]);
        let out = array_slice(&[arr.clone(), num(1.0), num(3.0)]).unwrap();
        let Value::Array(items) = out else {
            panic!("expected an array");
        };
        assert_eq!(&*items.read(), &[num(1.0), num(2.0)]);
        // The slice is a copy, not a view.
        let out = array_slice(&[arr.clone()]).unwrap();
        array_push(&[out, num(9.0)]).unwrap();
        if let Value::Array(items) = &arr {
            assert_eq!(items.read().len(), 4);
        }
    }

    #[test]
    fn type_errors_name_the_function() {
        let err = array_push(&[Value::Nil]).unwrap_err();
        assert!(err.to_string().contains("array/push expects an array"));
    }
}
