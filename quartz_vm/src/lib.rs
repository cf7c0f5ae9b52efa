//! The Quartz runtime: interpreter, native registry, bootstrapper.
//!
//! Everything that executes code lives here. [`interp`] runs assembled
//! definitions and hosts fibers, [`corelib`] owns the process-wide
//! native-function registry, [`loader`] binds dynamic native modules,
//! [`marshal`] snapshots values, and [`boot`] assembles all of it into
//! a core environment. Embedders usually need only [`core_env`] and
//! [`call`].

#![deny(unsafe_op_in_unsafe_fn)]

pub mod boot;
pub mod corelib;
pub mod interp;
pub mod libs;
pub mod loader;
pub mod marshal;

pub use boot::{core_env, core_env_with, BootMode};
pub use corelib::{install, install_core, registered, NativeEntry};
pub use interp::{call, call_callable, resume_fiber};
pub use loader::load;
pub use marshal::{marshal, unmarshal};
