//! Flat float arrays behind the abstract type machinery.
//!
//! A typed array is an abstract value wrapping a `Vec<f64>`, so guest
//! code can hold large numeric buffers without boxing every element.
//! This is also the in-tree exercise of the abstract type plumbing that
//! native modules use for their own handles.

use parking_lot::RwLock;

use quartz_core::{args, AbstractValue, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};

/// Abstract type name, as reported by `type` and `abstract?`.
pub const TYPE_NAME: &str = "f64array";

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "new",
        doc: "(tarray/new length &opt fill)\n\nCreates a flat array of \
              length float slots, each initialized to fill or 0.",
        fun: tarray_new,
    },
    NativeEntry {
        name: "length",
        doc: "Returns the number of slots in a typed array.",
        fun: tarray_length,
    },
    NativeEntry {
        name: "get",
        doc: "Reads the float at an index of a typed array.",
        fun: tarray_get,
    },
    NativeEntry {
        name: "set",
        doc: "(tarray/set arr index value)\n\nWrites a float into a \
              typed array and returns the array.",
        fun: tarray_set,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("tarray"), FUNCTIONS);
}

fn tarray_new(arguments: &[Value]) -> Result<Value> {
    args::arity("tarray/new", arguments, 1, Some(2))?;
    let length = args::integer("tarray/new", arguments, 0)?;
    let length = usize::try_from(length).map_err(|_| {
        QuartzError::range(format!("tarray/new: length {length} out of range"))
    })?;
    let fill = match args::opt(arguments, 1) {
        Some(_) => args::number("tarray/new", arguments, 1)?,
        None => 0.0,
    };
    let cells = AbstractValue::new(TYPE_NAME, RwLock::new(vec![fill; length]));
    Ok(Value::Abstract(std::sync::Arc::new(cells)))
}

fn tarray_length(arguments: &[Value]) -> Result<Value> {
    args::fixarity("tarray/length", arguments, 1)?;
    let cells = as_floats("tarray/length", arguments, 0)?;
    Ok(Value::Number(cells.read().len() as f64))
}

fn tarray_get(arguments: &[Value]) -> Result<Value> {
    args::fixarity("tarray/get", arguments, 2)?;
    let cells = as_floats("tarray/get", arguments, 0)?;
    let cells = cells.read();
    let index = checked_index("tarray/get", arguments, cells.len())?;
    Ok(Value::Number(cells[index]))
}

fn tarray_set(arguments: &[Value]) -> Result<Value> {
    args::fixarity("tarray/set", arguments, 3)?;
    let cells = as_floats("tarray/set", arguments, 0)?;
    let value = args::number("tarray/set", arguments, 2)?;
    let mut cells = cells.write();
    let index = checked_index("tarray/set", arguments, cells.len())?;
    cells[index] = value;
    Ok(arguments[0].clone())
}

fn as_floats<'a>(
    name: &str,
    arguments: &'a [Value],
    index: usize,
) -> Result<&'a RwLock<Vec<f64>>> {
    match &arguments[index] {
        Value::Abstract(handle) if handle.type_name == TYPE_NAME => handle
            .downcast_ref::<RwLock<Vec<f64>>>()
            .ok_or_else(|| QuartzError::value(format!("{name}: corrupt {TYPE_NAME} payload"))),
        other => Err(QuartzError::value(format!(
            "{name} expects a {TYPE_NAME}, got {}",
            other.type_name()
        ))),
    }
}

fn checked_index(name: &str, arguments: &[Value], length: usize) -> Result<usize> {
    let raw = args::integer(name, arguments, 1)?;
    match usize::try_from(raw) {
        Ok(index) if index < length => Ok(index),
        _ => Err(QuartzError::range(format!(
            "{name}: index {raw} out of range for length {length}"
        ))),
    }
}
