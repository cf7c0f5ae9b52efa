//! Core native functions and the process-wide native registry.
//!
//! Natives are declared in static tables and registered in one pass, with
//! an optional name prefix for library modules. Registration also records
//! each native in a process-wide map so the marshal codec can serialize
//! them by name.

use std::hash::BuildHasherDefault;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use rustc_hash::FxHasher;
use tracing::debug;

use quartz_core::{
    access, args, describe, scan, symbol, Callable, Environment, NativeFn, NativeFunction,
    QuartzError, Result, Value, ValueMap,
};
use quartz_gc::collector;

use crate::loader;

// =========================================================================
// Registry
// =========================================================================

/// One row of a native table: name, docstring, function pointer.
pub struct NativeEntry {
    pub name: &'static str,
    pub doc: &'static str,
    pub fun: NativeFn,
}

static REGISTRY: LazyLock<DashMap<Arc<str>, Arc<NativeFunction>, BuildHasherDefault<FxHasher>>> =
    LazyLock::new(DashMap::default);

/// Register a table of natives into `env`, prefixing each name with
/// `prefix/` when a prefix is given.
pub fn install(env: &Environment, prefix: Option<&str>, entries: &[NativeEntry]) {
    for entry in entries {
        let name = match prefix {
            Some(prefix) => symbol::intern(&format!("{prefix}/{}", entry.name)),
            None => symbol::intern(entry.name),
        };
        let doc = if entry.doc.is_empty() {
            None
        } else {
            Some(entry.doc)
        };
        // A name registered earlier keeps its allocation; later installs
        // bind the stored function, so native identity is stable across
        // boots and image restores resolve to the same value.
        let native = Arc::clone(&REGISTRY.entry(name.clone()).or_insert_with(|| {
            Arc::new(NativeFunction {
                name: name.clone(),
                doc: doc.map(Arc::from),
                fun: entry.fun,
            })
        }));
        env.def(&name, Value::Function(Callable::Native(native)), doc);
    }
}

/// Look up a previously registered native by its full name.
pub fn registered(name: &str) -> Option<Arc<NativeFunction>> {
    REGISTRY.get(name).map(|entry| entry.value().clone())
}

/// Register the core natives into `env`.
pub fn install_core(env: &Environment) {
    install(env, None, CORE_FUNCTIONS);
}

// =========================================================================
// Core natives
// =========================================================================

pub const CORE_FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "native",
        doc: "Load a native module from a shared library at path and return \
              an environment of its exports. An optional second argument \
              gives the environment to populate.",
        fun: core_native,
    },
    NativeEntry {
        name: "print",
        doc: "Print the arguments to standard output, followed by a newline. \
              Returns nil.",
        fun: core_print,
    },
    NativeEntry {
        name: "prin",
        doc: "Print the arguments to standard output without a trailing \
              newline. Returns nil.",
        fun: core_prin,
    },
    NativeEntry {
        name: "describe",
        doc: "Returns a human-readable description of x as a string.",
        fun: core_describe,
    },
    NativeEntry {
        name: "string",
        doc: "Creates a string by concatenating the textual form of each \
              argument.",
        fun: core_string,
    },
    NativeEntry {
        name: "symbol",
        doc: "Creates a symbol by concatenating the textual form of each \
              argument.",
        fun: core_symbol,
    },
    NativeEntry {
        name: "keyword",
        doc: "Creates a keyword by concatenating the textual form of each \
              argument.",
        fun: core_keyword,
    },
    NativeEntry {
        name: "buffer",
        doc: "Creates a mutable buffer holding the bytes of each argument in \
              order.",
        fun: core_buffer,
    },
    NativeEntry {
        name: "abstract?",
        doc: "Returns true if x is an abstract value.",
        fun: core_abstract_p,
    },
    NativeEntry {
        name: "table",
        doc: "Creates a mutable table from alternating keys and values. An \
              odd number of arguments is an error.",
        fun: core_table,
    },
    NativeEntry {
        name: "struct",
        doc: "Creates an immutable struct from alternating keys and values. \
              Duplicate keys keep the last value.",
        fun: core_struct,
    },
    NativeEntry {
        name: "array",
        doc: "Creates a mutable array containing the arguments.",
        fun: core_array,
    },
    NativeEntry {
        name: "tuple",
        doc: "Creates an immutable tuple containing the arguments.",
        fun: core_tuple,
    },
    NativeEntry {
        name: "scan-number",
        doc: "Parse a number from string-like x. Returns nil if x does not \
              spell a number.",
        fun: core_scan_number,
    },
    NativeEntry {
        name: "gensym",
        doc: "Returns a new symbol that is unique for the process.",
        fun: core_gensym,
    },
    NativeEntry {
        name: "gccollect",
        doc: "Run a garbage collection pass. Returns nil.",
        fun: core_gccollect,
    },
    NativeEntry {
        name: "gcsetinterval",
        doc: "Set the allocation interval between automatic collection \
              passes, returning the previous interval. Negative intervals \
              are out of range.",
        fun: core_gcsetinterval,
    },
    NativeEntry {
        name: "gcinterval",
        doc: "Returns the current allocation interval between automatic \
              collection passes.",
        fun: core_gcinterval,
    },
    NativeEntry {
        name: "type",
        doc: "Returns the type of x as a keyword. Natives are :cfunction, \
              other callables are :function.",
        fun: core_type,
    },
    NativeEntry {
        name: "next",
        doc: "Gets the next key in a data structure after key, or the first \
              key when key is nil. Returns nil after the last key.",
        fun: core_next,
    },
    NativeEntry {
        name: "hash",
        doc: "Returns the structural hash of x as a number.",
        fun: core_hash,
    },
    NativeEntry {
        name: "getline",
        doc: "Read a line from standard input into a buffer, optionally \
              printing a prompt first. Returns nil on end of input.",
        fun: core_getline,
    },
];

fn core_native(args: &[Value]) -> Result<Value> {
    args::arity("native", args, 1, Some(2))?;
    let path = args::text("native", args, 0)?;
    let env = if args.len() == 2 {
        args::environment("native", args, 1)?
    } else {
        Environment::new()
    };
    loader::load(&path, &env)?;
    Ok(Value::Environment(env))
}

fn write_all(args: &[Value], newline: bool) {
    let mut out = io::stdout().lock();
    for arg in args {
        write!(out, "{}", describe::to_text(arg)).ok();
    }
    if newline {
        writeln!(out).ok();
    }
    out.flush().ok();
}

fn core_print(args: &[Value]) -> Result<Value> {
    write_all(args, true);
    Ok(Value::Nil)
}

fn core_prin(args: &[Value]) -> Result<Value> {
    write_all(args, false);
    Ok(Value::Nil)
}

fn core_describe(args: &[Value]) -> Result<Value> {
    args::fixarity("describe", args, 1)?;
    Ok(Value::from(describe::describe(&args[0])))
}

fn concat_text(args: &[Value]) -> String {
    args.iter().map(describe::to_text).collect()
}

fn core_string(args: &[Value]) -> Result<Value> {
    Ok(Value::from(concat_text(args)))
}

fn core_symbol(args: &[Value]) -> Result<Value> {
    Ok(Value::symbol(&concat_text(args)))
}

fn core_keyword(args: &[Value]) -> Result<Value> {
    Ok(Value::keyword(&concat_text(args)))
}

fn core_buffer(args: &[Value]) -> Result<Value> {
    let mut bytes = Vec::new();
    for arg in args {
        match arg {
            Value::Buffer(b) => bytes.extend_from_slice(&b.read()),
            Value::Str(s) => bytes.extend_from_slice(s.as_bytes()),
            other => bytes.extend_from_slice(describe::to_text(other).as_bytes()),
        }
    }
    Ok(Value::buffer(bytes))
}

fn core_abstract_p(args: &[Value]) -> Result<Value> {
    args::fixarity("abstract?", args, 1)?;
    Ok(Value::Boolean(matches!(args[0], Value::Abstract(_))))
}

fn kv_pairs(name: &str, args: &[Value]) -> Result<ValueMap> {
    if args.len() % 2 != 0 {
        return Err(QuartzError::value(format!(
            "{name} expects an even number of arguments, got {}",
            args.len()
        )));
    }
    let mut map = ValueMap::default();
    for pair in args.chunks_exact(2) {
        access::check_key(&pair[0])?;
        map.insert(pair[0].clone(), pair[1].clone());
    }
    Ok(map)
}

fn core_table(args: &[Value]) -> Result<Value> {
    Ok(Value::table(kv_pairs("table", args)?))
}

fn core_struct(args: &[Value]) -> Result<Value> {
    Ok(Value::structure(kv_pairs("struct", args)?))
}

fn core_array(args: &[Value]) -> Result<Value> {
    Ok(Value::array(args.to_vec()))
}

fn core_tuple(args: &[Value]) -> Result<Value> {
    Ok(Value::tuple(args.to_vec()))
}

fn core_scan_number(args: &[Value]) -> Result<Value> {
    args::fixarity("scan-number", args, 1)?;
    let text = args::text("scan-number", args, 0)?;
    Ok(match scan::scan_number(&text) {
        Some(n) => Value::Number(n),
        None => Value::Nil,
    })
}

fn core_gensym(args: &[Value]) -> Result<Value> {
    args::fixarity("gensym", args, 0)?;
    Ok(Value::Symbol(symbol::gensym()))
}

fn core_gccollect(args: &[Value]) -> Result<Value> {
    args::fixarity("gccollect", args, 0)?;
    let stats = collector().collect();
    debug!(swept = stats.swept, live = stats.live, "manual collection");
    Ok(Value::Nil)
}

fn core_gcsetinterval(args: &[Value]) -> Result<Value> {
    args::fixarity("gcsetinterval", args, 1)?;
    let interval = args::integer("gcsetinterval", args, 0)?;
    let old = collector().set_interval(interval)?;
    Ok(Value::Number(old as f64))
}

fn core_gcinterval(args: &[Value]) -> Result<Value> {
    args::fixarity("gcinterval", args, 0)?;
    Ok(Value::Number(collector().interval() as f64))
}

fn core_type(args: &[Value]) -> Result<Value> {
    args::fixarity("type", args, 1)?;
    let name = match &args[0] {
        Value::Function(callable) => callable.kind_name(),
        other => other.type_name(),
    };
    Ok(Value::keyword(name))
}

fn core_next(args: &[Value]) -> Result<Value> {
    args::fixarity("next", args, 2)?;
    access::next_key(&args[0], &args[1])
}

fn core_hash(args: &[Value]) -> Result<Value> {
    args::fixarity("hash", args, 1)?;
    Ok(Value::Number(f64::from(quartz_core::hash_value(&args[0]))))
}

fn core_getline(args: &[Value]) -> Result<Value> {
    args::arity("getline", args, 0, Some(2))?;
    if let Some(prompt) = args::opt(args, 0) {
        let mut out = io::stdout().lock();
        write!(out, "{}", describe::to_text(prompt)).ok();
        out.flush().ok();
    }
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(Value::Nil);
    }
    match args::opt(args, 1) {
        Some(Value::Buffer(buf)) => {
            buf.write().extend_from_slice(line.as_bytes());
            Ok(Value::Buffer(buf.clone()))
        }
        Some(other) => Err(QuartzError::value(format!(
            "getline expects a buffer, got {}",
            other.type_name()
        ))),
        None => Ok(Value::buffer(line.into_bytes())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_registers_and_defines() {
        let env = Environment::new();
        install_core(&env);
        for entry in CORE_FUNCTIONS {
            let bound = env.get(entry.name);
            assert!(bound.is_some(), "{} not bound", entry.name);
            assert!(registered(entry.name).is_some(), "{} not registered", entry.name);
        }
        let binding = env.resolve("type").unwrap();
        assert!(binding.doc.is_some());
    }

    #[test]
    fn reinstall_reuses_the_registered_allocation() {
        let first = Environment::new();
        install_core(&first);
        let second = Environment::new();
        install_core(&second);
        let a = first.get("print").unwrap();
        let b = second.get("print").unwrap();
        assert!(a.identical(&b));
        match (a, registered("print")) {
            (Value::Function(Callable::Native(bound)), Some(stored)) => {
                assert!(Arc::ptr_eq(&bound, &stored));
            }
            _ => panic!("print is not a registered native"),
        }
    }

    #[test]
    fn prefix_is_applied_to_every_name() {
        const DEMO: &[NativeEntry] = &[NativeEntry {
            name: "answer",
            doc: "Returns 42.",
            fun: |_| Ok(Value::Number(42.0)),
        }];
        let env = Environment::new();
        install(&env, Some("demo"), DEMO);
        assert!(env.get("demo/answer").is_some());
        assert!(env.get("answer").is_none());
        assert!(registered("demo/answer").is_some());
    }

    #[test]
    fn constructors_build_their_types() {
        let s = core_string(&[Value::from("a"), Value::Number(1.0)]).unwrap();
        assert_eq!(s, Value::from("a1"));
        let k = core_keyword(&[Value::from("name")]).unwrap();
        assert_eq!(k, Value::keyword("name"));
        let t = core_tuple(&[Value::Number(1.0), Value::Number(2.0)]).unwrap();
        assert!(matches!(t, Value::Tuple(ref items) if items.len() == 2));
        let b = core_buffer(&[Value::from("ab"), Value::Number(3.0)]).unwrap();
        match b {
            Value::Buffer(bytes) => assert_eq!(&*bytes.read(), b"ab3"),
            other => panic!("expected a buffer, got {}", other.type_name()),
        }
    }

    #[test]
    fn table_and_struct_take_pairs() {
        let t = core_table(&[Value::keyword("a"), Value::Number(1.0)]).unwrap();
        assert_eq!(
            access::get(&t, &Value::keyword("a")).unwrap(),
            Value::Number(1.0)
        );
        let err = core_table(&[Value::keyword("a")]).unwrap_err();
        assert!(err.to_string().contains("even number"));
        // Struct keeps the last value for a duplicated key.
        let s = core_struct(&[
            Value::keyword("a"),
            Value::Number(1.0),
            Value::keyword("a"),
            Value::Number(2.0),
        ])
        .unwrap();
        assert_eq!(
            access::get(&s, &Value::keyword("a")).unwrap(),
            Value::Number(2.0)
        );
    }

    #[test]
    fn scan_number_returns_nil_on_garbage() {
        assert_eq!(
            core_scan_number(&[Value::from("1.5e2")]).unwrap(),
            Value::Number(150.0)
        );
        assert_eq!(core_scan_number(&[Value::from("pizza")]).unwrap(), Value::Nil);
    }

    #[test]
    fn gensym_never_collides_with_interned_symbols() {
        let taken = symbol::intern("taken-name");
        let a = core_gensym(&[]).unwrap();
        let b = core_gensym(&[]).unwrap();
        assert_ne!(a, b);
        match a {
            // The generated name is claimed in the interner so no later
            // parse or gensym can reuse it.
            Value::Symbol(name) => {
                assert!(symbol::is_interned(&name));
                assert_ne!(name, taken);
            }
            other => panic!("expected a symbol, got {}", other.type_name()),
        }
    }

    #[test]
    fn type_distinguishes_native_from_thunk() {
        let env = Environment::new();
        install_core(&env);
        let native = env.get("type").unwrap();
        assert_eq!(core_type(&[native]).unwrap(), Value::keyword("cfunction"));
        assert_eq!(
            core_type(&[Value::Number(1.0)]).unwrap(),
            Value::keyword("number")
        );
        assert_eq!(core_type(&[Value::Nil]).unwrap(), Value::keyword("nil"));
    }

    #[test]
    fn next_walks_keys_in_order() {
        let t = core_table(&[
            Value::keyword("a"),
            Value::Number(1.0),
            Value::keyword("b"),
            Value::Number(2.0),
        ])
        .unwrap();
        let first = core_next(&[t.clone(), Value::Nil]).unwrap();
        assert_eq!(first, Value::keyword("a"));
        let second = core_next(&[t.clone(), first]).unwrap();
        assert_eq!(second, Value::keyword("b"));
        assert_eq!(core_next(&[t, second]).unwrap(), Value::Nil);
    }

    #[test]
    fn hash_is_stable_per_value() {
        let a = core_hash(&[Value::from("abc")]).unwrap();
        let b = core_hash(&[Value::from("abc")]).unwrap();
        assert_eq!(a, b);
        assert!(matches!(a, Value::Number(n) if n >= 0.0));
    }

    #[test]
    fn interval_round_trips_through_the_collector() {
        let env = Environment::new();
        install_core(&env);
        let old = core_gcinterval(&[]).unwrap();
        let prev = core_gcsetinterval(&[old.clone()]).unwrap();
        assert_eq!(prev, old);
        let err = core_gcsetinterval(&[Value::Number(-1.0)]).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }
}
