//! The booted core environment as a whole: metadata, the prelude, the
//! native registry, snapshot equivalence between the two boot modes, and
//! ordered traversal over the environment itself.

use pretty_assertions::assert_eq;

use quartz_core::{Callable, Value};
use quartz_vm::boot::eval::eval_source;
use quartz_vm::{call, core_env, core_env_with, registered, BootMode};

// =============================================================================
// Boot surface
// =============================================================================

#[test]
fn boot_defines_the_fixed_vocabulary() {
    let env = core_env().unwrap();
    // A sample from every layer: natives, templates, libraries, prelude.
    for name in [
        "print", "type", "gensym", "next", "+", "<", "apply", "error", "yield",
        "array/push", "string/slice", "math/sqrt", "fiber/new", "marsh/marshal",
        "parse/parse", "compile/compile", "asm", "disasm", "map", "reduce",
        "first", "inc",
    ] {
        assert!(env.get(name).is_some(), "{name} is not bound");
    }
    assert!(matches!(env.get("quartz/version"), Some(Value::Str(_))));
    let Some(Value::Environment(inner)) = env.get("_env") else {
        panic!("_env is not bound");
    };
    assert!(inner.ptr_eq(&env));
}

#[test]
fn natives_and_templates_report_distinct_type_keywords() {
    let env = core_env().unwrap();
    let run = |src: &str| eval_source(&env, src).expect(src);
    assert_eq!(run("(type print)"), Value::keyword("cfunction"));
    assert_eq!(run("(type +)"), Value::keyword("function"));
    assert_eq!(run("(type (fn [x] x))"), Value::keyword("function"));
}

#[test]
fn prelude_functions_compose() {
    let env = core_env().unwrap();
    let out = eval_source(
        &env,
        "(reduce + 0 (map inc (filter (fn [x] (< x 3)) (range 5))))",
    )
    .unwrap();
    // 0 1 2 survive the filter, become 1 2 3, and sum to 6.
    assert_eq!(out, Value::Number(6.0));
}

// =============================================================================
// Native registry
// =============================================================================

#[test]
fn registry_holds_plain_and_prefixed_names() {
    core_env().unwrap();
    assert!(registered("print").is_some());
    assert!(registered("array/push").is_some());
    assert!(registered("no/such-native").is_none());

    // The binding and the registry agree on the function.
    let env = core_env().unwrap();
    let Some(Value::Function(Callable::Native(bound))) = env.get("array/push") else {
        panic!("array/push is not a native");
    };
    let looked_up = registered("array/push").unwrap();
    assert!(std::sync::Arc::ptr_eq(&bound, &looked_up));
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn source_and_image_boots_expose_the_same_environment() {
    let source = core_env_with(BootMode::Source).unwrap();
    let image = quartz_vm::marshal(&Value::Environment(source.clone())).unwrap();
    let restored = core_env_with(BootMode::Image(&image)).unwrap();

    let mut want = source.names();
    let mut have = restored.names();
    want.sort();
    have.sort();
    assert_eq!(want, have);

    // Restored bindings still run.
    let out = eval_source(&restored, "(map inc [1 2 3])").unwrap();
    let Value::Array(items) = out else {
        panic!("map did not build an array");
    };
    assert_eq!(
        *items.read(),
        vec![Value::Number(2.0), Value::Number(3.0), Value::Number(4.0)]
    );

    // The restored _env self-reference points at the restored table.
    let Some(Value::Environment(inner)) = restored.get("_env") else {
        panic!("_env is not bound after restore");
    };
    assert!(inner.ptr_eq(&restored));
}

#[test]
fn guest_level_snapshots_round_trip() {
    let env = core_env().unwrap();
    let out = eval_source(
        &env,
        "(marsh/unmarshal (marsh/marshal [1 :two \"three\"]))",
    )
    .unwrap();
    assert_eq!(
        out,
        Value::tuple(vec![
            Value::Number(1.0),
            Value::keyword("two"),
            Value::from("three"),
        ])
    );
}

// =============================================================================
// Traversal
// =============================================================================

#[test]
fn next_visits_every_environment_binding_exactly_once() {
    let env = core_env().unwrap();
    let next = env.get("next").unwrap();
    let table = env.get("_env").unwrap();

    let mut key = Value::Nil;
    let mut seen = 0usize;
    loop {
        key = call(&next, &[table.clone(), key]).unwrap();
        if key.is_nil() {
            break;
        }
        assert!(matches!(key, Value::Symbol(_)));
        seen += 1;
    }
    assert_eq!(seen, env.len());
}
