//! Mutable buffer natives.

use quartz_core::{args, describe, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};
use crate::libs::opt_integer;

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "new",
        doc: "Creates an empty buffer with capacity for n bytes.",
        fun: buffer_new,
    },
    NativeEntry {
        name: "push",
        doc: "Appends the remaining arguments as bytes. Each must be an \
              integer between 0 and 255. Returns the buffer.",
        fun: buffer_push,
    },
    NativeEntry {
        name: "push-string",
        doc: "Appends the bytes of the textual form of each remaining \
              argument. Returns the buffer.",
        fun: buffer_push_string,
    },
    NativeEntry {
        name: "clear",
        doc: "Removes every byte from the buffer, keeping its capacity. \
              Returns the buffer.",
        fun: buffer_clear,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("buffer"), FUNCTIONS);
}

fn as_buffer(name: &str, arguments: &[Value]) -> Result<Value> {
    match arguments.first() {
        Some(v @ Value::Buffer(_)) => Ok(v.clone()),
        Some(other) => Err(QuartzError::value(format!(
            "{name} expects a buffer, got {}",
            other.type_name()
        ))),
        None => Err(QuartzError::arity(format!(
            "{name} called with 0 arguments, expected at least 1"
        ))),
    }
}

fn buffer_new(arguments: &[Value]) -> Result<Value> {
    args::arity("buffer/new", arguments, 0, Some(1))?;
    let capacity = opt_integer("buffer/new", arguments, 0)?.unwrap_or(0);
    if capacity < 0 {
        return Err(QuartzError::range(format!(
            "buffer/new: capacity must be non-negative, got {capacity}"
        )));
    }
    Ok(Value::buffer(Vec::with_capacity(capacity as usize)))
}

fn buffer_push(arguments: &[Value]) -> Result<Value> {
    let buffer = as_buffer("buffer/push", arguments)?;
    if let Value::Buffer(bytes) = &buffer {
        let mut bytes = bytes.write();
        for (i, _) in arguments.iter().enumerate().skip(1) {
            let byte = args::integer("buffer/push", arguments, i)?;
            if !(0..=255).contains(&byte) {
                return Err(QuartzError::range(format!(
                    "buffer/push: byte value {byte} out of range"
                )));
            }
            bytes.push(byte as u8);
        }
    }
    Ok(buffer)
}

fn buffer_push_string(arguments: &[Value]) -> Result<Value> {
    let buffer = as_buffer("buffer/push-string", arguments)?;
    if let Value::Buffer(bytes) = &buffer {
        let mut bytes = bytes.write();
        for arg in &arguments[1..] {
            match arg {
                Value::Str(s) => bytes.extend_from_slice(s.as_bytes()),
                other => bytes.extend_from_slice(describe::to_text(other).as_bytes()),
            }
        }
    }
    Ok(buffer)
}

fn buffer_clear(arguments: &[Value]) -> Result<Value> {
    args::fixarity("buffer/clear", arguments, 1)?;
    let buffer = as_buffer("buffer/clear", arguments)?;
    if let Value::Buffer(bytes) = &buffer {
        bytes.write().clear();
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_and_text_accumulate() {
        let buf = buffer_new(&[]).unwrap();
        buffer_push(&[buf.clone(), Value::Number(104.0), Value::Number(105.0)]).unwrap();
        buffer_push_string(&[buf.clone(), Value::from("!"), Value::Number(1.0)]).unwrap();
        if let Value::Buffer(bytes) = &buf {
            assert_eq!(&*bytes.read(), b"hi!1");
        }
        buffer_clear(&[buf.clone()]).unwrap();
        if let Value::Buffer(bytes) = &buf {
            assert!(bytes.read().is_empty());
        }
    }

    #[test]
    fn byte_range_is_enforced() {
        let buf = buffer_new(&[]).unwrap();
        let err = buffer_push(&[buf, Value::Number(256.0)]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
