//! Assembled function definitions.
//!
//! A [`Definition`] is the immutable product of the definition assembler:
//! metadata plus a defensively copied bytecode program. Definitions are
//! shared behind `Arc` and never mutated after assembly.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use crate::error::{QuartzError, Result};
use crate::instruction::Instruction;

/// Declared argument-count contract of a callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments.
    Exact(u32),
    /// Between `min` and `max` arguments, inclusive.
    Range(u32, u32),
    /// `min` or more arguments.
    AtLeast(u32),
}

impl Arity {
    /// Minimum accepted argument count.
    #[inline]
    pub fn min(self) -> u32 {
        match self {
            Arity::Exact(n) => n,
            Arity::Range(min, _) => min,
            Arity::AtLeast(min) => min,
        }
    }

    /// Maximum accepted argument count, if bounded.
    #[inline]
    pub fn max(self) -> Option<u32> {
        match self {
            Arity::Exact(n) => Some(n),
            Arity::Range(_, max) => Some(max),
            Arity::AtLeast(_) => None,
        }
    }

    /// Check an actual argument count, naming the callable on failure.
    pub fn check(self, name: &str, argc: usize) -> Result<()> {
        let argc = argc as u64;
        let min = self.min() as u64;
        let max = self.max().map(|m| m as u64);
        let ok = argc >= min && max.map_or(true, |m| argc <= m);
        if ok {
            return Ok(());
        }
        let expected = match (self.min(), self.max()) {
            (n, Some(m)) if n == m => format!("exactly {n}"),
            (n, Some(m)) => format!("between {n} and {m}"),
            (n, None) => format!("at least {n}"),
        };
        Err(QuartzError::arity(format!(
            "{name} called with {argc} arguments, expected {expected}"
        )))
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::Range(min, max) => write!(f, "{min}..{max}"),
            Arity::AtLeast(min) => write!(f, "{min}.."),
        }
    }
}

/// Definition flags.
///
/// A plain bitset; `VARARG` marks a variadic calling convention and `APPLY`
/// tags the builtin apply template so tooling can re-identify it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DefFlags(u32);

impl DefFlags {
    pub const NONE: DefFlags = DefFlags(0);
    /// Trailing arguments are collected into a tuple.
    pub const VARARG: DefFlags = DefFlags(1 << 0);
    /// Builtin identity of the apply template.
    pub const APPLY: DefFlags = DefFlags(1 << 1);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> DefFlags {
        DefFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: DefFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: DefFlags) -> DefFlags {
        DefFlags(self.0 | other.0)
    }
}

impl BitOr for DefFlags {
    type Output = DefFlags;

    fn bitor(self, rhs: DefFlags) -> DefFlags {
        self.union(rhs)
    }
}

impl BitOrAssign for DefFlags {
    fn bitor_assign(&mut self, rhs: DefFlags) {
        self.0 |= rhs.0;
    }
}

/// An assembled function: metadata plus bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    name: Arc<str>,
    doc: Option<Arc<str>>,
    arity: Arity,
    flags: DefFlags,
    slot_count: u32,
    code: Box<[Instruction]>,
}

impl Definition {
    /// Build a definition, copying the caller's bytecode.
    ///
    /// The copy is the ownership boundary of the original implementation:
    /// callers keep their scratch program, the definition keeps its own.
    /// Reservation failure surfaces as the allocation kind instead of
    /// aborting.
    pub fn new(
        name: Arc<str>,
        doc: Option<Arc<str>>,
        arity: Arity,
        flags: DefFlags,
        slot_count: u32,
        code: &[Instruction],
    ) -> Result<Definition> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(code.len())?;
        copy.extend_from_slice(code);
        Ok(Definition {
            name,
            doc,
            arity,
            flags,
            slot_count,
            code: copy.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    #[inline]
    pub fn doc(&self) -> Option<&Arc<str>> {
        self.doc.as_ref()
    }

    #[inline]
    pub fn arity(&self) -> Arity {
        self.arity
    }

    #[inline]
    pub fn flags(&self) -> DefFlags {
        self.flags
    }

    #[inline]
    pub fn is_vararg(&self) -> bool {
        self.flags.contains(DefFlags::VARARG)
    }

    #[inline]
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    #[inline]
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Number of slots the calling convention fills with fixed arguments.
    /// For vararg definitions the slot at this index receives the rest
    /// tuple.
    #[inline]
    pub fn fixed_args(&self) -> u32 {
        self.arity.min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;

    fn sample() -> Definition {
        let code = [
            Instruction::ss(Opcode::Length, 0, 0),
            Instruction::s(Opcode::Return, 0),
        ];
        Definition::new(
            "length".into(),
            Some("Returns the length of a value.".into()),
            Arity::Exact(1),
            DefFlags::NONE,
            1,
            &code,
        )
        .unwrap()
    }

    #[test]
    fn definition_copies_bytecode() {
        let mut scratch = vec![
            Instruction::ss(Opcode::Length, 0, 0),
            Instruction::s(Opcode::Return, 0),
        ];
        let def = Definition::new(
            "length".into(),
            None,
            Arity::Exact(1),
            DefFlags::NONE,
            1,
            &scratch,
        )
        .unwrap();
        scratch[0] = Instruction::zero(Opcode::Noop);
        assert_eq!(def.code()[0].opcode(), Some(Opcode::Length));
    }

    #[test]
    fn arity_check_messages() {
        let err = Arity::Exact(2).check("get", 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "get called with 1 arguments, expected exactly 2"
        );
        assert!(Arity::Range(0, 1).check("yield", 0).is_ok());
        assert!(Arity::Range(0, 1).check("yield", 2).is_err());
        assert!(Arity::AtLeast(1).check("apply", 400).is_ok());
        assert!(Arity::AtLeast(1).check("apply", 0).is_err());
    }

    #[test]
    fn flags_combine() {
        let f = DefFlags::VARARG | DefFlags::APPLY;
        assert!(f.contains(DefFlags::VARARG));
        assert!(f.contains(DefFlags::APPLY));
        assert!(!DefFlags::VARARG.contains(f));
        assert_eq!(DefFlags::from_bits(f.bits()), f);
    }

    #[test]
    fn vararg_rest_slot_follows_fixed_args() {
        let def = sample();
        assert_eq!(def.fixed_args(), 1);
        assert!(!def.is_vararg());
    }
}
