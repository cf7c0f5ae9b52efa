//! Compilation natives.
//!
//! Compilation here packages a form with an environment as a zero-argument
//! guest function; evaluation happens when the result is called.

use std::sync::Arc;

use quartz_core::{args, Callable, Environment, GuestFn, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[NativeEntry {
    name: "compile",
    doc: "Compiles a form against an environment, returning a function of \
          no arguments that evaluates it.",
    fun: compile_form,
}];

pub fn install_lib(env: &Environment) {
    install(env, Some("compile"), FUNCTIONS);
}

fn compile_form(arguments: &[Value]) -> Result<Value> {
    args::fixarity("compile/compile", arguments, 2)?;
    let form = arguments[0].clone();
    let env = args::environment("compile/compile", arguments, 1)?;
    Ok(Value::Function(Callable::Guest(Arc::new(GuestFn {
        name: Arc::from("compiled"),
        params: Box::new([]),
        rest: None,
        body: Box::new([form]),
        env,
    }))))
}
