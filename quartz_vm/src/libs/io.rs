//! Console output natives.

use std::io::{self, Write};

use quartz_core::{args, describe, Environment, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "write",
        doc: "Write the textual form of each argument to standard output \
              without a newline. Returns nil.",
        fun: io_write,
    },
    NativeEntry {
        name: "flush",
        doc: "Flush standard output. Returns nil.",
        fun: io_flush,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("io"), FUNCTIONS);
}

fn io_write(arguments: &[Value]) -> Result<Value> {
    let mut out = io::stdout().lock();
    for arg in arguments {
        write!(out, "{}", describe::to_text(arg)).ok();
    }
    Ok(Value::Nil)
}

fn io_flush(arguments: &[Value]) -> Result<Value> {
    args::fixarity("io/flush", arguments, 0)?;
    io::stdout().lock().flush()?;
    Ok(Value::Nil)
}
