//! Bytecode templates and the definition assembler.
//!
//! This crate turns the parameterized builtin templates (variadic
//! arithmetic, chained comparators, apply) and the fixed primitives into
//! verified [`quartz_core::Definition`] values bound into an environment.
pub mod assemble;
pub mod builder;
pub mod disasm;
pub mod templates;
pub mod verify;

pub use assemble::{assemble, bind, quick_asm};
pub use builder::{Label, ProgramBuilder};
pub use disasm::disassemble;
pub use templates::install_all;
pub use verify::verify;
