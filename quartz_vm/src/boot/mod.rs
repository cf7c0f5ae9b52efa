//! Environment bootstrap.
//!
//! Builds the core environment in a fixed sequence: core natives, the
//! assembled builtins, runtime metadata, the library modules, and then
//! exactly one of two finalization strategies behind [`BootMode`]. A
//! source boot evaluates the embedded prelude; an image boot restores
//! a marshaled snapshot and returns it in place of the fresh table.
//! Both strategies yield the same bindings.

pub mod eval;
pub mod reader;

use quartz_core::{Environment, QuartzError, Result, Value};
use tracing::debug;

use crate::{corelib, libs, marshal};

/// The embedded boot prelude.
const BOOT_SOURCE: &str = include_str!("core.qz");

/// Finalization strategy for [`core_env_with`].
#[derive(Clone, Copy)]
pub enum BootMode<'a> {
    /// Evaluate the embedded prelude against the fresh environment.
    Source,
    /// Restore a marshaled snapshot, root it, and return it in place
    /// of the fresh environment. The fresh environment is still built
    /// first so the native registry is populated for name resolution
    /// during the restore.
    Image(&'a [u8]),
}

/// Boot a core environment from the embedded source prelude.
#[cfg(not(feature = "image-boot"))]
pub fn core_env() -> Result<Environment> {
    core_env_with(BootMode::Source)
}

/// Boot a core environment, restoring from a snapshot when one exists.
///
/// The first boot in the process runs from source and caches its
/// marshaled snapshot; every later boot restores that snapshot instead
/// of re-evaluating the prelude.
#[cfg(feature = "image-boot")]
pub fn core_env() -> Result<Environment> {
    static SNAPSHOT: std::sync::OnceLock<Vec<u8>> = std::sync::OnceLock::new();
    if let Some(image) = SNAPSHOT.get() {
        return core_env_with(BootMode::Image(image));
    }
    let env = core_env_with(BootMode::Source)?;
    let image = marshal::marshal(&Value::Environment(env.clone()))?;
    let _ = SNAPSHOT.set(image);
    Ok(env)
}

/// Boot a core environment with an explicit finalization strategy.
pub fn core_env_with(mode: BootMode<'_>) -> Result<Environment> {
    let env = Environment::new();
    corelib::install_core(&env);
    quartz_asm::templates::install_all(&env)?;

    env.def(
        "quartz/version",
        Value::from(env!("CARGO_PKG_VERSION")),
        Some("Version of the quartz runtime."),
    );
    env.def(
        "quartz/build",
        Value::from(option_env!("QUARTZ_BUILD").unwrap_or("local")),
        Some("Build identifier, \"local\" unless set when compiling."),
    );
    env.def(
        "_env",
        Value::Environment(env.clone()),
        Some("The core environment itself."),
    );
    quartz_gc::collector().root(Value::Environment(env.clone()));

    libs::io::install_lib(&env);
    libs::math::install_lib(&env);
    libs::array::install_lib(&env);
    libs::tuple::install_lib(&env);
    libs::buffer::install_lib(&env);
    libs::table::install_lib(&env);
    libs::fiber::install_lib(&env);
    libs::os::install_lib(&env);
    libs::parse::install_lib(&env);
    libs::compile::install_lib(&env);
    libs::debug::install_lib(&env);
    libs::string::install_lib(&env);
    libs::marsh::install_lib(&env);
    #[cfg(feature = "pattern")]
    libs::pattern::install_lib(&env);
    #[cfg(feature = "assembler")]
    libs::asm::install_lib(&env);
    #[cfg(feature = "typed-array")]
    libs::typed_array::install_lib(&env);
    #[cfg(feature = "bigint")]
    libs::bigint::install_lib(&env);

    match mode {
        BootMode::Source => {
            eval::eval_source(&env, BOOT_SOURCE)?;
            debug!(bindings = env.len(), "core environment booted from source");
            Ok(env)
        }
        BootMode::Image(bytes) => {
            let restored = match marshal::unmarshal(bytes)? {
                Value::Environment(restored) => restored,
                other => {
                    return Err(QuartzError::value(format!(
                        "boot image holds a {}, not an environment",
                        other.type_name()
                    )))
                }
            };
            quartz_gc::collector().root(Value::Environment(restored.clone()));
            debug!(
                bindings = restored.len(),
                "core environment restored from image"
            );
            Ok(restored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_binds_the_runtime_metadata() {
        let env = core_env().unwrap();
        assert_eq!(
            env.get("quartz/version").unwrap(),
            Value::from(env!("CARGO_PKG_VERSION"))
        );
        assert!(matches!(env.get("quartz/build"), Some(Value::Str(_))));
        let Some(Value::Environment(inner)) = env.get("_env") else {
            panic!("_env is not bound");
        };
        assert!(inner.ptr_eq(&env));
    }

    #[test]
    fn the_prelude_is_evaluated() {
        let env = core_env().unwrap();
        let out = eval::eval_source(&env, "(map inc [1 2 3])").unwrap();
        let Value::Array(items) = out else {
            panic!("map did not build an array");
        };
        assert_eq!(
            *items.read(),
            vec![Value::Number(2.0), Value::Number(3.0), Value::Number(4.0)]
        );
        let reduce = env.resolve("reduce").unwrap();
        assert!(reduce.doc.is_some());
    }

    #[test]
    fn source_and_image_boots_are_equivalent() {
        let source = core_env_with(BootMode::Source).unwrap();
        let image = marshal::marshal(&Value::Environment(source.clone())).unwrap();
        let restored = core_env_with(BootMode::Image(&image)).unwrap();

        let mut want = source.names();
        let mut have = restored.names();
        want.sort();
        have.sort();
        assert_eq!(want, have);

        for name in ["print", "apply", "+", "map", "quartz/version"] {
            let a = source.resolve(name).unwrap();
            let b = restored.resolve(name).unwrap();
            assert_eq!(a.doc, b.doc, "doc drift on {name}");
            assert_eq!(a.value.type_name(), b.value.type_name());
        }

        // Natives resolve by registered name back to the same function.
        let print_a = source.get("print").unwrap();
        let print_b = restored.get("print").unwrap();
        assert!(print_a.identical(&print_b));
    }

    #[test]
    fn image_boots_reject_non_environment_payloads() {
        let image = marshal::marshal(&Value::Number(1.0)).unwrap();
        let err = core_env_with(BootMode::Image(&image)).unwrap_err();
        assert!(err.to_string().contains("not an environment"));
    }
}
