//! Fiber construction and introspection.
//!
//! `yield`, `resume`, and `signal` are bytecode templates in the core
//! environment; this module only covers what those cannot express.

use std::sync::Arc;

use quartz_core::{args, Environment, Fiber, Result, Value};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "new",
        doc: "Creates a new fiber around a function. The value passed to \
              the first resume becomes the function's argument if it \
              accepts one.",
        fun: fiber_new,
    },
    NativeEntry {
        name: "status",
        doc: "Returns the status of a fiber as a keyword: :new, :alive, \
              :pending, :dead, or :error.",
        fun: fiber_status,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("fiber"), FUNCTIONS);
}

fn fiber_new(arguments: &[Value]) -> Result<Value> {
    args::fixarity("fiber/new", arguments, 1)?;
    let entry = args::callable("fiber/new", arguments, 0)?;
    Ok(Value::Fiber(Arc::new(Fiber::new(entry))))
}

fn fiber_status(arguments: &[Value]) -> Result<Value> {
    args::fixarity("fiber/status", arguments, 1)?;
    let fiber = args::fiber("fiber/status", arguments, 0)?;
    Ok(Value::keyword(fiber.status().name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp;

    #[test]
    fn status_tracks_the_fiber_lifecycle() {
        let env = Environment::new();
        crate::corelib::install_core(&env);
        quartz_asm::install_all(&env).unwrap();

        let yield_fn = env.get("yield").unwrap();
        let fiber = fiber_new(&[yield_fn]).unwrap();
        assert_eq!(fiber_status(&[fiber.clone()]).unwrap(), Value::keyword("new"));

        let Value::Fiber(handle) = &fiber else {
            panic!("expected a fiber");
        };
        interp::resume_fiber(handle, Value::Number(1.0)).unwrap();
        assert_eq!(
            fiber_status(&[fiber.clone()]).unwrap(),
            Value::keyword("pending")
        );
        interp::resume_fiber(handle, Value::Nil).unwrap();
        assert_eq!(fiber_status(&[fiber]).unwrap(), Value::keyword("dead"));
    }
}
