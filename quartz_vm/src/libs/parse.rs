//! Reader natives over the boot parser.

use quartz_core::{args, Environment, Result, Value};

use crate::boot::reader;
use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "parse",
        doc: "Reads the first form from a string and returns it as a value.",
        fun: parse_one,
    },
    NativeEntry {
        name: "parse-all",
        doc: "Reads every form from a string and returns them as a tuple.",
        fun: parse_many,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, Some("parse"), FUNCTIONS);
}

fn parse_one(arguments: &[Value]) -> Result<Value> {
    args::fixarity("parse/parse", arguments, 1)?;
    let src = args::text("parse/parse", arguments, 0)?;
    reader::parse(&src)
}

fn parse_many(arguments: &[Value]) -> Result<Value> {
    args::fixarity("parse/parse-all", arguments, 1)?;
    let src = args::text("parse/parse-all", arguments, 0)?;
    Ok(Value::tuple(reader::parse_all(&src)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forms_come_back_as_data() {
        let form = parse_one(&[Value::from("(a 1)")]).unwrap();
        assert_eq!(
            form,
            Value::tuple(vec![Value::symbol("a"), Value::Number(1.0)])
        );
        let forms = parse_many(&[Value::from("1 2 3")]).unwrap();
        assert_eq!(
            forms,
            Value::tuple(vec![
                Value::Number(1.0),
                Value::Number(2.0),
                Value::Number(3.0)
            ])
        );
        assert!(parse_one(&[Value::from("(")]).is_err());
    }
}
