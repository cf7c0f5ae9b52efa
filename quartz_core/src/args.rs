//! Argument extraction for native functions.
//!
//! Natives receive a bare `&[Value]`; these helpers give them uniform arity
//! and type errors without repeating the match arms at every call site.

use std::sync::Arc;

use crate::env::Environment;
use crate::error::{QuartzError, Result};
use crate::fiber::Fiber;
use crate::value::{Callable, Value};

/// Exactly `n` arguments.
pub fn fixarity(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(QuartzError::arity(format!(
            "{name} called with {} arguments, expected exactly {n}",
            args.len()
        )))
    }
}

/// Between `min` and `max` arguments; `None` leaves the top open.
pub fn arity(name: &str, args: &[Value], min: usize, max: Option<usize>) -> Result<()> {
    let n = args.len();
    if n >= min && max.map_or(true, |m| n <= m) {
        return Ok(());
    }
    let expected = match max {
        Some(m) if m == min => format!("exactly {min}"),
        Some(m) => format!("between {min} and {m}"),
        None => format!("at least {min}"),
    };
    Err(QuartzError::arity(format!(
        "{name} called with {n} arguments, expected {expected}"
    )))
}

fn slot<'a>(name: &str, args: &'a [Value], i: usize) -> Result<&'a Value> {
    args.get(i).ok_or_else(|| {
        QuartzError::arity(format!("{name}: missing argument {i}"))
    })
}

fn type_error(name: &str, i: usize, expected: &str, got: &Value) -> QuartzError {
    QuartzError::value(format!(
        "{name}: expected {expected} for argument {i}, got {}",
        got.type_name()
    ))
}

pub fn number(name: &str, args: &[Value], i: usize) -> Result<f64> {
    let v = slot(name, args, i)?;
    v.as_number().ok_or_else(|| type_error(name, i, "a number", v))
}

pub fn integer(name: &str, args: &[Value], i: usize) -> Result<i64> {
    let v = slot(name, args, i)?;
    v.as_integer()
        .ok_or_else(|| type_error(name, i, "an integer", v))
}

/// Text content of a string, symbol, keyword, or buffer.
pub fn text(name: &str, args: &[Value], i: usize) -> Result<String> {
    let v = slot(name, args, i)?;
    match v {
        Value::Str(s) | Value::Symbol(s) | Value::Keyword(s) => Ok(s.to_string()),
        Value::Buffer(b) => Ok(String::from_utf8_lossy(&b.read()).into_owned()),
        other => Err(type_error(name, i, "a string-like value", other)),
    }
}

pub fn string(name: &str, args: &[Value], i: usize) -> Result<Arc<str>> {
    let v = slot(name, args, i)?;
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(type_error(name, i, "a string", other)),
    }
}

pub fn environment(name: &str, args: &[Value], i: usize) -> Result<Environment> {
    let v = slot(name, args, i)?;
    v.as_environment()
        .cloned()
        .ok_or_else(|| type_error(name, i, "an environment", v))
}

pub fn fiber(name: &str, args: &[Value], i: usize) -> Result<Arc<Fiber>> {
    let v = slot(name, args, i)?;
    v.as_fiber()
        .cloned()
        .ok_or_else(|| type_error(name, i, "a fiber", v))
}

pub fn callable(name: &str, args: &[Value], i: usize) -> Result<Callable> {
    let v = slot(name, args, i)?;
    v.as_callable()
        .cloned()
        .ok_or_else(|| type_error(name, i, "a function", v))
}

/// Optional argument: present and non-nil.
pub fn opt(args: &[Value], i: usize) -> Option<&Value> {
    match args.get(i) {
        Some(Value::Nil) | None => None,
        Some(v) => Some(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_bounds() {
        assert!(fixarity("f", &[Value::Nil], 1).is_ok());
        assert!(fixarity("f", &[], 1).is_err());
        assert!(arity("f", &[], 0, Some(2)).is_ok());
        assert!(arity("f", &vec![Value::Nil; 3], 0, Some(2)).is_err());
        assert!(arity("f", &vec![Value::Nil; 30], 1, None).is_ok());
    }

    #[test]
    fn extraction_reports_position_and_type() {
        let args = [Value::keyword("x")];
        let err = number("f", &args, 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "f: expected a number for argument 0, got keyword"
        );
        assert_eq!(text("f", &args, 0).unwrap(), "x");
    }

    #[test]
    fn opt_skips_nil() {
        let args = [Value::Nil, Value::Number(1.0)];
        assert!(opt(&args, 0).is_none());
        assert!(opt(&args, 1).is_some());
        assert!(opt(&args, 2).is_none());
    }
}
