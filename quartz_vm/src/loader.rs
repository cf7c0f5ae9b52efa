//! Dynamic module loading.
//!
//! Native modules are shared libraries exporting a `_quartz_init` entry
//! point. A module is opened and initialized at most once per process per
//! canonical path; later loads copy the cached exports instead of running
//! the entry point again. Cached libraries stay open for the life of the
//! process.

use std::fs;
use std::hash::BuildHasherDefault;
use std::path::PathBuf;
use std::sync::LazyLock;

use dashmap::DashMap;
use rustc_hash::FxHasher;
use tracing::debug;

use quartz_core::{Environment, QuartzError, Result};

/// Entry point every native module must export. The module registers its
/// bindings into the environment it is handed.
pub type InitFn = unsafe extern "C" fn(env: *const Environment);

/// Reserved entry symbol, nul-terminated for the dynamic linker.
pub const INIT_SYMBOL: &[u8] = b"_quartz_init\0";

/// Thin wrapper over a platform dynamic library handle.
struct DynLib(libloading::Library);

impl DynLib {
    /// # Safety
    ///
    /// Loading a library runs its initializers; the caller vouches for the
    /// file behind `path`.
    unsafe fn open(path: &str) -> Result<DynLib> {
        // SAFETY: forwarded to the caller.
        unsafe { libloading::Library::new(path) }
            .map(DynLib)
            .map_err(|e| QuartzError::load(path, e.to_string()))
    }

    /// # Safety
    ///
    /// The caller must name a symbol whose type really is `T`.
    unsafe fn symbol<T>(&self, name: &[u8]) -> Result<libloading::Symbol<'_, T>> {
        // SAFETY: forwarded to the caller.
        unsafe { self.0.get(name) }
            .map_err(|e| QuartzError::symbol(format!("missing module entry point: {e}")))
    }
}

struct LoadedModule {
    // Keeps the library mapped; the init function's registrations point
    // into it.
    _lib: DynLib,
    exports: Environment,
}

static MODULES: LazyLock<DashMap<PathBuf, LoadedModule, BuildHasherDefault<FxHasher>>> =
    LazyLock::new(DashMap::default);

/// Load the native module at `path` and register its exports into `env`.
pub fn load(path: &str, env: &Environment) -> Result<()> {
    let canonical = fs::canonicalize(path)
        .map_err(|e| QuartzError::load(path, e.to_string()))?;

    if let Some(module) = MODULES.get(&canonical) {
        for (name, binding) in module.exports.entries() {
            env.def_binding(name, binding);
        }
        return Ok(());
    }

    // SAFETY: the path names a module the embedder chose to load; its
    // initializers run here by design of the `native` operation.
    let lib = unsafe { DynLib::open(path) }?;
    // SAFETY: `_quartz_init` is the documented entry contract, with the
    // `InitFn` signature.
    let init = *unsafe { lib.symbol::<InitFn>(INIT_SYMBOL) }?;
    // SAFETY: the environment pointer is valid for the duration of the
    // call; the module must not retain it.
    unsafe { init(env as *const Environment) };
    debug!(path, "native module initialized");

    MODULES.insert(
        canonical,
        LoadedModule {
            _lib: lib,
            exports: env.clone(),
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_a_load_error() {
        let env = Environment::new();
        let err = load("/no/such/module.so", &env).unwrap_err();
        match err {
            QuartzError::Load { path, .. } => assert_eq!(path, "/no/such/module.so"),
            other => panic!("expected a load error, got {other}"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn library_without_the_entry_symbol_is_a_symbol_error() {
        // libc certainly does not export our entry point.
        let candidates = [
            "/usr/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/usr/lib/aarch64-linux-gnu/libc.so.6",
        ];
        let Some(path) = candidates
            .into_iter()
            .find(|p| std::path::Path::new(p).exists())
        else {
            return;
        };
        let env = Environment::new();
        let err = load(path, &env).unwrap_err();
        assert!(matches!(err, QuartzError::Symbol(_)), "got {err}");
    }
}
