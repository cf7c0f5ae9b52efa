//! Immutable tuple natives.

use quartz_core::{args, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};
use crate::libs::{opt_integer, slice_range};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "slice",
        doc: "Returns a tuple of the elements from start to end. Negative \
              indexes count back from the end, -1 naming the end.",
        fun: tuple_slice,
    },
    NativeEntry {
        name: "join",
        doc: "Returns a tuple of the elements of every argument, which must \
              be tuples or arrays, in order.",
        fun: tuple_join,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("tuple"), FUNCTIONS);
}

fn tuple_slice(arguments: &[Value]) -> Result<Value> {
    args::arity("tuple/slice", arguments, 1, Some(3))?;
    let Some(Value::Tuple(items)) = arguments.first() else {
        return Err(QuartzError::value(format!(
            "tuple/slice expects a tuple, got {}",
            arguments[0].type_name()
        )));
    };
    let start = opt_integer("tuple/slice", arguments, 1)?;
    let end = opt_integer("tuple/slice", arguments, 2)?;
    let (start, end) = slice_range("tuple/slice", items.len(), start, end)?;
    Ok(Value::tuple(items[start..end].to_vec()))
}

fn tuple_join(arguments: &[Value]) -> Result<Value> {
    let mut items = Vec::new();
    for arg in arguments {
        match arg {
            Value::Tuple(part) => items.extend(part.iter().cloned()),
            Value::Array(part) => items.extend(part.read().iter().cloned()),
            other => {
                return Err(QuartzError::value(format!(
                    "tuple/join expects tuples or arrays, got {}",
                    other.type_name()
                )));
            }
        }
    }
    Ok(Value::tuple(items))
}
