//! Human-readable value forms.
//!
//! `to_text` is what `print` and the string constructors use: strings,
//! buffers, symbols and keywords contribute their raw contents. `describe`
//! is the inspector form: strings are quoted, keywords keep their colon,
//! containers print recursively. Nesting is cut off at a fixed depth so a
//! cyclic table cannot hang the printer.

use std::fmt;

use crate::value::Value;

const MAX_DEPTH: usize = 8;

/// Content form. Byte-ish values contribute their text, everything else its
/// described form.
pub fn to_text(v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        Value::Symbol(s) | Value::Keyword(s) => s.to_string(),
        Value::Buffer(b) => String::from_utf8_lossy(&b.read()).into_owned(),
        other => describe(other),
    }
}

/// Inspector form.
pub fn describe(v: &Value) -> String {
    let mut out = String::new();
    describe_into(&mut out, v, 0);
    out
}

fn describe_into(out: &mut String, v: &Value, depth: usize) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }
    match v {
        Value::Nil => out.push_str("nil"),
        Value::Boolean(true) => out.push_str("true"),
        Value::Boolean(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&number_text(*n)),
        Value::Str(s) => {
            out.push('"');
            escape_into(out, s);
            out.push('"');
        }
        Value::Symbol(s) => out.push_str(s),
        Value::Keyword(s) => {
            out.push(':');
            out.push_str(s);
        }
        Value::Tuple(items) => {
            let (open, close) = if items.bracketed() {
                ('[', ']')
            } else {
                ('(', ')')
            };
            out.push(open);
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                describe_into(out, item, depth + 1);
            }
            out.push(close);
        }
        Value::Struct(map) => {
            out.push('{');
            for (i, (k, val)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                describe_into(out, k, depth + 1);
                out.push(' ');
                describe_into(out, val, depth + 1);
            }
            out.push('}');
        }
        Value::Array(a) => {
            out.push_str("@[");
            for (i, item) in a.read().iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                describe_into(out, item, depth + 1);
            }
            out.push(']');
        }
        Value::Table(t) => {
            out.push_str("@{");
            for (i, (k, val)) in t.read().iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                describe_into(out, k, depth + 1);
                out.push(' ');
                describe_into(out, val, depth + 1);
            }
            out.push('}');
        }
        Value::Buffer(b) => {
            out.push_str("@\"");
            escape_into(out, &String::from_utf8_lossy(&b.read()));
            out.push('"');
        }
        Value::Function(f) => {
            out.push('<');
            out.push_str(f.kind_name());
            out.push(' ');
            out.push_str(f.name());
            out.push('>');
        }
        Value::Fiber(f) => {
            out.push_str(&format!("<fiber {:p}>", std::sync::Arc::as_ptr(f)));
        }
        Value::Abstract(a) => {
            out.push_str(&format!(
                "<{} {:p}>",
                a.type_name,
                std::sync::Arc::as_ptr(a)
            ));
        }
        Value::Environment(env) => {
            out.push_str(&format!("<environment {:p}>", env.as_ptr()));
        }
    }
}

/// Integers print without a trailing `.0`; the non-finite values use the
/// conventional lowercase names.
pub fn number_text(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() <= 2f64.powi(53) {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_text(self))
    }
}

// Debug prints the describe form so assertion failures stay readable.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueMap;

    #[test]
    fn numbers_drop_integer_fractions() {
        assert_eq!(number_text(5.0), "5");
        assert_eq!(number_text(-3.0), "-3");
        assert_eq!(number_text(0.5), "0.5");
        assert_eq!(number_text(f64::NAN), "nan");
        assert_eq!(number_text(f64::INFINITY), "inf");
    }

    #[test]
    fn describe_quotes_strings_but_to_text_does_not() {
        let s = Value::from("hi\nthere");
        assert_eq!(describe(&s), "\"hi\\nthere\"");
        assert_eq!(to_text(&s), "hi\nthere");
    }

    #[test]
    fn keywords_keep_the_colon_only_when_described() {
        let k = Value::keyword("name");
        assert_eq!(describe(&k), ":name");
        assert_eq!(to_text(&k), "name");
    }

    #[test]
    fn containers_nest() {
        let t = Value::tuple(vec![
            Value::Number(1.0),
            Value::tuple(vec![Value::keyword("a")]),
        ]);
        assert_eq!(describe(&t), "(1 (:a))");
        let b = Value::bracket_tuple(vec![Value::Number(1.0)]);
        assert_eq!(describe(&b), "[1]");
        let mut map = ValueMap::default();
        map.insert(Value::keyword("k"), Value::from("v"));
        assert_eq!(describe(&Value::structure(map)), "{:k \"v\"}");
    }

    #[test]
    fn cyclic_tables_terminate() {
        let t = Value::table(ValueMap::default());
        if let Value::Table(inner) = &t {
            inner.write().insert(Value::keyword("self"), t.clone());
        }
        let text = describe(&t);
        assert!(text.contains("..."));
    }
}
