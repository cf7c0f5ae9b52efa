//! The definition assembler.
//!
//! Turns a verified instruction sequence plus metadata into a [`Definition`]
//! and binds it into an environment as a callable value. Every builtin the
//! template library produces goes through [`quick_asm`].

use std::sync::Arc;

use quartz_core::symbol;
use quartz_core::{
    Arity, Callable, DefFlags, Definition, Environment, Instruction, QuartzError, Result, Value,
};

use crate::verify;

/// Assemble a definition from metadata and a program.
///
/// The program is verified against the declared slot count, and the slot
/// count is checked against the calling convention: the frame must have room
/// for every fixed argument, plus one slot for the rest tuple when the
/// definition is variadic.
pub fn assemble(
    name: &str,
    doc: Option<&str>,
    arity: Arity,
    flags: DefFlags,
    slots: u32,
    code: &[Instruction],
) -> Result<Arc<Definition>> {
    verify::verify(code, slots)?;
    let required = if flags.contains(DefFlags::VARARG) {
        arity.min() + 1
    } else {
        arity.max().unwrap_or_else(|| arity.min())
    };
    if slots < required {
        return Err(QuartzError::value(format!(
            "{name}: {slots} slots cannot hold {required} arguments"
        )));
    }
    let def = Definition::new(
        symbol::intern(name),
        doc.map(Arc::from),
        arity,
        flags,
        slots,
        code,
    )?;
    Ok(Arc::new(def))
}

/// Bind an assembled definition into an environment as a callable value.
///
/// The binding carries the definition's docstring so `doc` lookups work on
/// builtins. Returns the bound value.
pub fn bind(env: &Environment, def: Arc<Definition>) -> Value {
    let name = def.name().clone();
    let doc = def.doc().cloned();
    let value = Value::Function(Callable::Thunk(def));
    env.def(&name, value.clone(), doc.as_deref());
    value
}

/// Assemble and bind in one step.
pub fn quick_asm(
    env: &Environment,
    name: &str,
    arity: Arity,
    flags: DefFlags,
    slots: u32,
    code: &[Instruction],
    doc: &str,
) -> Result<()> {
    let def = assemble(name, Some(doc), arity, flags, slots, code)?;
    bind(env, def);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_core::Opcode;

    fn identity_code() -> [Instruction; 1] {
        [Instruction::s(Opcode::Return, 0)]
    }

    #[test]
    fn assemble_builds_a_thunk() {
        let def = assemble(
            "identity",
            Some("Returns its argument."),
            Arity::Exact(1),
            DefFlags::NONE,
            1,
            &identity_code(),
        )
        .unwrap();
        assert_eq!(&**def.name(), "identity");
        assert_eq!(def.code().len(), 1);
        assert_eq!(def.doc().map(|d| &**d), Some("Returns its argument."));
    }

    #[test]
    fn assemble_rejects_underprovisioned_frames() {
        // Two fixed arguments cannot land in a single slot.
        let code = [
            Instruction::sss(Opcode::Get, 0, 0, 0),
            Instruction::s(Opcode::Return, 0),
        ];
        let err = assemble("get", None, Arity::Exact(2), DefFlags::NONE, 1, &code).unwrap_err();
        assert!(err.to_string().contains("cannot hold"));
    }

    #[test]
    fn vararg_frames_reserve_the_rest_slot() {
        // AtLeast(1) with VARARG needs slots for the argument and the tuple.
        let err = assemble(
            "spread",
            None,
            Arity::AtLeast(1),
            DefFlags::VARARG,
            1,
            &identity_code(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot hold"));
        assert!(assemble(
            "spread",
            None,
            Arity::AtLeast(1),
            DefFlags::VARARG,
            2,
            &identity_code(),
        )
        .is_ok());
    }

    #[test]
    fn assemble_runs_the_verifier() {
        let code = [Instruction::s(Opcode::Return, 9)];
        assert!(assemble("bad", None, Arity::Exact(0), DefFlags::NONE, 1, &code).is_err());
    }

    #[test]
    fn quick_asm_binds_with_doc() {
        let env = Environment::new();
        quick_asm(
            &env,
            "identity",
            Arity::Exact(1),
            DefFlags::NONE,
            1,
            &identity_code(),
            "Returns its argument.",
        )
        .unwrap();

        let value = env.get("identity").unwrap();
        match value.as_callable() {
            Some(Callable::Thunk(def)) => assert_eq!(def.arity(), Arity::Exact(1)),
            _ => panic!("expected a thunk, got {value:?}"),
        }
        let binding = env.resolve("identity").unwrap();
        assert_eq!(binding.doc.as_deref(), Some("Returns its argument."));
    }
}
