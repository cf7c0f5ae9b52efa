//! Operating system natives.

use std::sync::LazyLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use quartz_core::{args, Environment, Result, Value};

use crate::corelib::{install, NativeEntry};

static START: LazyLock<Instant> = LazyLock::new(Instant::now);

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "clock",
        doc: "Returns the seconds elapsed on a monotonic clock as a number. \
              Useful for measuring durations.",
        fun: os_clock,
    },
    NativeEntry {
        name: "time",
        doc: "Returns the current time in whole seconds since the unix \
              epoch.",
        fun: os_time,
    },
    NativeEntry {
        name: "getenv",
        doc: "Returns the value of an environment variable as a string, or \
              nil when it is unset.",
        fun: os_getenv,
    },
];

pub fn install_lib(env: &Environment) {
    // Anchor the monotonic clock at install time.
    let _ = *START;
    install(env, Some("os"), FUNCTIONS);
}

fn os_clock(arguments: &[Value]) -> Result<Value> {
    args::fixarity("os/clock", arguments, 0)?;
    Ok(Value::Number(START.elapsed().as_secs_f64()))
}

fn os_time(arguments: &[Value]) -> Result<Value> {
    args::fixarity("os/time", arguments, 0)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as f64)
        .unwrap_or(0.0);
    Ok(Value::Number(now))
}

fn os_getenv(arguments: &[Value]) -> Result<Value> {
    args::fixarity("os/getenv", arguments, 1)?;
    let name = args::text("os/getenv", arguments, 0)?;
    Ok(match std::env::var(&name) {
        Ok(value) => Value::from(value),
        Err(_) => Value::Nil,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic_and_getenv_misses_return_nil() {
        let a = os_clock(&[]).unwrap();
        let b = os_clock(&[]).unwrap();
        let (Value::Number(a), Value::Number(b)) = (a, b) else {
            panic!("expected numbers");
        };
        assert!(b >= a);
        assert_eq!(
            os_getenv(&[Value::from("QUARTZ_SURELY_UNSET_VARIABLE")]).unwrap(),
            Value::Nil
        );
        assert!(matches!(os_time(&[]).unwrap(), Value::Number(n) if n > 0.0));
    }
}
