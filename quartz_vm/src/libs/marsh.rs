//! Snapshot natives over the marshal codec.

use quartz_core::{args, Environment, QuartzError, Result, Value};

use crate::corelib::{install, NativeEntry};
use crate::marshal;

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "marshal",
        doc: "Encodes a value as a binary snapshot and returns it as a \
              buffer. Fibers and abstract values cannot be encoded.",
        fun: marsh_marshal,
    },
    NativeEntry {
        name: "unmarshal",
        doc: "Decodes a snapshot buffer back into a value.",
        fun: marsh_unmarshal,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("marsh"), FUNCTIONS);
}

fn marsh_marshal(arguments: &[Value]) -> Result<Value> {
    args::fixarity("marsh/marshal", arguments, 1)?;
    Ok(Value::buffer(marshal::marshal(&arguments[0])?))
}

fn marsh_unmarshal(arguments: &[Value]) -> Result<Value> {
    args::fixarity("marsh/unmarshal", arguments, 1)?;
    match &arguments[0] {
        Value::Buffer(bytes) => marshal::unmarshal(&bytes.read()),
        Value::Str(s) => marshal::unmarshal(s.as_bytes()),
        other => Err(QuartzError::value(format!(
            "marsh/unmarshal expects a buffer, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_facing_round_trip() {
        let value = Value::tuple(vec![Value::Number(1.0), Value::keyword("two")]);
        let snapshot = marsh_marshal(&[value.clone()]).unwrap();
        assert!(matches!(snapshot, Value::Buffer(_)));
        assert_eq!(marsh_unmarshal(&[snapshot]).unwrap(), value);
        assert!(marsh_unmarshal(&[Value::Number(1.0)]).is_err());
    }
}
