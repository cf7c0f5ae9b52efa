//! Core data model for the Quartz runtime.
//!
//! This crate defines the value representation, the packed 32-bit instruction
//! word and its encoder, assembled function definitions, binding tables, and
//! the small shared services (symbol interning, number scanning, value
//! description) that every other crate builds on. It contains no execution
//! logic; the interpreter and bootstrapper live in `quartz_vm`.

pub mod access;
pub mod args;
pub mod cmp;
pub mod describe;
pub mod env;
pub mod error;
pub mod fiber;
pub mod funcdef;
pub mod instruction;
pub mod scan;
pub mod symbol;
pub mod value;

pub use cmp::{hash_value, total_cmp};
pub use describe::{describe, to_text};
pub use env::{BindFlags, Binding, Environment};
pub use error::{QuartzError, Result};
pub use fiber::{Fiber, FiberState, FiberStatus, Frame};
pub use funcdef::{Arity, DefFlags, Definition};
pub use instruction::{Instruction, Layout, Opcode};
pub use value::{
    AbstractValue, Callable, GuestFn, NativeFn, NativeFunction, Tuple, Value, ValueMap, WeakValue,
};
