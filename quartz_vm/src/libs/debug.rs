//! Debug natives.

use quartz_core::{args, Callable, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[NativeEntry {
    name: "disasm",
    doc: "Returns the disassembly listing of a bytecode function as a \
          string.",
    fun: debug_disasm,
}];

pub fn install_lib(env: &Environment) {
    install(env, Some("debug"), FUNCTIONS);
}

fn debug_disasm(arguments: &[Value]) -> Result<Value> {
    args::fixarity("debug/disasm", arguments, 1)?;
    match args::callable("debug/disasm", arguments, 0)? {
        Callable::Thunk(def) => Ok(Value::from(quartz_asm::disassemble(&def))),
        other => Err(QuartzError::value(format!(
            "debug/disasm expects a bytecode function, got a {}",
            other.kind_name()
        ))),
    }
}
