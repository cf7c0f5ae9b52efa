//! Boxed 64-bit integers.
//!
//! Numbers are doubles, so integers above 2^53 lose exactness. The
//! `int` library boxes full-width signed and unsigned 64-bit values as
//! abstract types for code that needs exact wide arithmetic at the
//! edges, file offsets and hashes mostly.

use std::sync::Arc;

use quartz_core::{args, AbstractValue, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};

pub const S64_NAME: &str = "s64";
pub const U64_NAME: &str = "u64";

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "s64",
        doc: "(int/s64 value)\n\nBoxes a signed 64-bit integer from a \
              number or a decimal string.",
        fun: int_s64,
    },
    NativeEntry {
        name: "u64",
        doc: "(int/u64 value)\n\nBoxes an unsigned 64-bit integer from \
              a number or a decimal string.",
        fun: int_u64,
    },
    NativeEntry {
        name: "to-number",
        doc: "Converts a boxed 64-bit integer back to a number. Values \
              above 2^53 lose exactness.",
        fun: int_to_number,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("int"), FUNCTIONS);
}

fn int_s64(arguments: &[Value]) -> Result<Value> {
    args::fixarity("int/s64", arguments, 1)?;
    let boxed = match &arguments[0] {
        Value::Number(_) => args::integer("int/s64", arguments, 0)?,
        Value::Str(s) => s.trim().parse::<i64>().map_err(|_| {
            QuartzError::value(format!("int/s64: cannot parse {s:?}"))
        })?,
        other => {
            return Err(QuartzError::value(format!(
                "int/s64 expects a number or string, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Abstract(Arc::new(AbstractValue::new(S64_NAME, boxed))))
}

fn int_u64(arguments: &[Value]) -> Result<Value> {
    args::fixarity("int/u64", arguments, 1)?;
    let boxed = match &arguments[0] {
        Value::Number(_) => {
            let raw = args::integer("int/u64", arguments, 0)?;
            u64::try_from(raw).map_err(|_| {
                QuartzError::range(format!("int/u64: {raw} is negative"))
            })?
        }
        Value::Str(s) => s.trim().parse::<u64>().map_err(|_| {
            QuartzError::value(format!("int/u64: cannot parse {s:?}"))
        })?,
        other => {
            return Err(QuartzError::value(format!(
                "int/u64 expects a number or string, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Abstract(Arc::new(AbstractValue::new(U64_NAME, boxed))))
}

fn int_to_number(arguments: &[Value]) -> Result<Value> {
    args::fixarity("int/to-number", arguments, 1)?;
    match &arguments[0] {
        Value::Abstract(handle) if handle.type_name == S64_NAME => {
            let boxed = handle.downcast_ref::<i64>().ok_or_else(|| {
                QuartzError::value(format!("int/to-number: corrupt {S64_NAME} payload"))
            })?;
            Ok(Value::Number(*boxed as f64))
        }
        Value::Abstract(handle) if handle.type_name == U64_NAME => {
            let boxed = handle.downcast_ref::<u64>().ok_or_else(|| {
                QuartzError::value(format!("int/to-number: corrupt {U64_NAME} payload"))
            })?;
            Ok(Value::Number(*boxed as f64))
        }
        other => Err(QuartzError::value(format!(
            "int/to-number expects an s64 or u64, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_round_trip_through_numbers() {
        let small = int_s64(&[Value::Number(-42.0)]).unwrap();
        assert_eq!(small.type_name(), "s64");
        assert_eq!(
            int_to_number(&[small]).unwrap(),
            Value::Number(-42.0)
        );

        let wide = int_u64(&[Value::from("18446744073709551615")]).unwrap();
        assert_eq!(wide.type_name(), "u64");
        let Value::Number(n) = int_to_number(&[wide]).unwrap() else {
            panic!("expected a number");
        };
        assert_eq!(n, u64::MAX as f64);
    }

    #[test]
    fn strings_parse_exactly() {
        let parsed = int_s64(&[Value::from(" -9223372036854775808 ")]).unwrap();
        let Value::Abstract(handle) = &parsed else {
            panic!("expected an abstract");
        };
        assert_eq!(handle.downcast_ref::<i64>(), Some(&i64::MIN));
    }

    #[test]
    fn bad_inputs_are_rejected() {
        assert!(int_s64(&[Value::from("twelve")]).is_err());
        assert!(int_u64(&[Value::Number(-1.0)]).is_err());
        assert!(int_u64(&[Value::Nil]).is_err());
        assert!(int_to_number(&[Value::Number(3.0)]).is_err());
    }
}
