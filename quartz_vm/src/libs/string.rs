//! String natives.

use quartz_core::{args, Environment, Result, Value};

use crate::corelib::{install, NativeEntry};
use crate::libs::{opt_integer, slice_range};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "slice",
        doc: "Returns the substring from start to end. Negative indexes \
              count back from the end, -1 naming the end. Boundaries are \
              byte offsets.",
        fun: string_slice,
    },
    NativeEntry {
        name: "ascii-upper",
        doc: "Returns the string with ASCII letters uppercased.",
        fun: string_ascii_upper,
    },
    NativeEntry {
        name: "ascii-lower",
        doc: "Returns the string with ASCII letters lowercased.",
        fun: string_ascii_lower,
    },
    NativeEntry {
        name: "split",
        doc: "Splits str on every occurrence of the separator and returns \
              the pieces as a tuple of strings.",
        fun: string_split,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("string"), FUNCTIONS);
}

fn string_slice(arguments: &[Value]) -> Result<Value> {
    args::arity("string/slice", arguments, 1, Some(3))?;
    let text = args::text("string/slice", arguments, 0)?;
    let start = opt_integer("string/slice", arguments, 1)?;
    let end = opt_integer("string/slice", arguments, 2)?;
    let (start, end) = slice_range("string/slice", text.len(), start, end)?;
    match text.get(start..end) {
        Some(piece) => Ok(Value::from(piece)),
        None => Err(quartz_core::QuartzError::value(
            "string/slice: boundary splits a multi-byte character",
        )),
    }
}

fn string_ascii_upper(arguments: &[Value]) -> Result<Value> {
    args::fixarity("string/ascii-upper", arguments, 1)?;
    let text = args::text("string/ascii-upper", arguments, 0)?;
    Ok(Value::from(text.to_ascii_uppercase()))
}

fn string_ascii_lower(arguments: &[Value]) -> Result<Value> {
    args::fixarity("string/ascii-lower", arguments, 1)?;
    let text = args::text("string/ascii-lower", arguments, 0)?;
    Ok(Value::from(text.to_ascii_lowercase()))
}

fn string_split(arguments: &[Value]) -> Result<Value> {
    args::fixarity("string/split", arguments, 2)?;
    let separator = args::text("string/split", arguments, 0)?;
    let text = args::text("string/split", arguments, 1)?;
    if separator.is_empty() {
        return Err(quartz_core::QuartzError::value(
            "string/split: separator must not be empty",
        ));
    }
    let pieces: Vec<Value> = text.split(&separator).map(Value::from).collect();
    Ok(Value::tuple(pieces))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slicing_and_case_folding() {
        let s = Value::from("Hello, world");
        assert_eq!(
            string_slice(&[s.clone(), Value::Number(7.0)]).unwrap(),
            Value::from("world")
        );
        assert_eq!(
            string_slice(&[s.clone(), Value::Number(0.0), Value::Number(5.0)]).unwrap(),
            Value::from("Hello")
        );
        assert_eq!(
            string_slice(&[s.clone(), Value::Number(-6.0), Value::Number(-1.0)]).unwrap(),
            Value::from("world")
        );
        assert_eq!(
            string_ascii_upper(&[s.clone()]).unwrap(),
            Value::from("HELLO, WORLD")
        );
        assert_eq!(
            string_ascii_lower(&[s]).unwrap(),
            Value::from("hello, world")
        );
    }

    #[test]
    fn split_takes_separator_then_subject() {
        let out = string_split(&[Value::from(","), Value::from("a,b,,c")]).unwrap();
        assert_eq!(
            out,
            Value::tuple(vec![
                Value::from("a"),
                Value::from("b"),
                Value::from(""),
                Value::from("c")
            ])
        );
        assert!(string_split(&[Value::from(""), Value::from("abc")]).is_err());
    }
}
