//! Table natives.

use quartz_core::{args, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "clone",
        doc: "Returns a shallow copy of the table.",
        fun: table_clone,
    },
    NativeEntry {
        name: "to-struct",
        doc: "Returns an immutable struct holding the table's entries.",
        fun: table_to_struct,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("table"), FUNCTIONS);
}

fn as_table_map(name: &str, arguments: &[Value]) -> Result<quartz_core::ValueMap> {
    args::fixarity(name, arguments, 1)?;
    match &arguments[0] {
        Value::Table(map) => Ok(map.read().clone()),
        other => Err(QuartzError::value(format!(
            "{name} expects a table, got {}",
            other.type_name()
        ))),
    }
}

fn table_clone(arguments: &[Value]) -> Result<Value> {
    Ok(Value::table(as_table_map("table/clone", arguments)?))
}

fn table_to_struct(arguments: &[Value]) -> Result<Value> {
    Ok(Value::structure(as_table_map("table/to-struct", arguments)?))
}
