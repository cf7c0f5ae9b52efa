//! Bytecode templates for the builtin definitions.
//!
//! Three parameterized program shapes cover most of the builtins: a
//! fold loop for the variadic arithmetic and bitwise operations, a chained
//! pairwise loop for the comparators, and the argument-spreading trampoline
//! behind `apply`. The remaining primitives are fixed one- and two-word
//! programs. [`install_all`] assembles every template into an environment.
//!
//! All three variadic shapes use the same frame: slot 0 holds the first
//! fixed argument (or the rest tuple when there are none), and slots 1..=5
//! are scratch.

use quartz_core::fiber::{SIG_DEBUG, SIG_USER0, SIG_YIELD};
use quartz_core::{Arity, DefFlags, Environment, Instruction, Opcode, Result};

use crate::assemble::quick_asm;
use crate::builder::ProgramBuilder;

/// Frame size shared by the variadic templates.
const TEMPLATE_SLOTS: u32 = 6;

// =========================================================================
// Variadic associative operations
// =========================================================================

/// One entry of the variadic-operation table.
struct VarOp {
    name: &'static str,
    op: Opcode,
    /// Result of the zero-argument call.
    nullary: i16,
    /// Left operand folded against a single argument.
    unary: i16,
    doc: &'static str,
}

const VAR_OPS: &[VarOp] = &[
    VarOp {
        name: "+",
        op: Opcode::Add,
        nullary: 0,
        unary: 0,
        doc: "Returns the sum of xs. If xs is empty, returns 0.",
    },
    VarOp {
        name: "-",
        op: Opcode::Subtract,
        nullary: 0,
        unary: 0,
        doc: "Returns the difference of xs. With no arguments returns 0, with one \
              argument returns its negation, otherwise subtracts the rest from the \
              first value.",
    },
    VarOp {
        name: "*",
        op: Opcode::Multiply,
        nullary: 1,
        unary: 1,
        doc: "Returns the product of xs. If xs is empty, returns 1.",
    },
    VarOp {
        name: "/",
        op: Opcode::Divide,
        nullary: 1,
        unary: 1,
        doc: "Returns the quotient of xs. With no arguments returns 1, with one \
              argument returns its reciprocal, otherwise divides the first value \
              by the rest.",
    },
    VarOp {
        name: "band",
        op: Opcode::BitAnd,
        nullary: -1,
        unary: -1,
        doc: "Returns the bitwise and of xs. If xs is empty, returns -1.",
    },
    VarOp {
        name: "bor",
        op: Opcode::BitOr,
        nullary: 0,
        unary: 0,
        doc: "Returns the bitwise or of xs. If xs is empty, returns 0.",
    },
    VarOp {
        name: "bxor",
        op: Opcode::BitXor,
        nullary: 0,
        unary: 0,
        doc: "Returns the bitwise xor of xs. If xs is empty, returns 0.",
    },
    VarOp {
        name: "blshift",
        op: Opcode::ShiftLeft,
        nullary: 1,
        unary: 1,
        doc: "Returns x shifted left by each subsequent amount. With one argument, \
              shifts 1 left by x. With none, returns 1.",
    },
    VarOp {
        name: "brshift",
        op: Opcode::ShiftRight,
        nullary: 1,
        unary: 1,
        doc: "Returns x shifted right by each subsequent amount. With one argument, \
              shifts 1 right by x. With none, returns 1.",
    },
    VarOp {
        name: "brushift",
        op: Opcode::ShiftRightUnsigned,
        nullary: 1,
        unary: 1,
        doc: "Returns x shifted right by each subsequent amount, shifting in zero \
              bits. With one argument, shifts 1 right by x. With none, returns 1.",
    },
];

/// Build the program for a variadic associative operation.
///
/// The rest tuple arrives in slot 0. Zero arguments return the `nullary`
/// constant, a single argument folds against the `unary` constant, and two
/// or more arguments fold left through the whole tuple.
pub fn varop_program(op: Opcode, nullary: i16, unary: i16) -> Result<Box<[Instruction]>> {
    let mut b = ProgramBuilder::new();

    // arity 0
    b.emit(Instruction::ss(Opcode::Length, 1, 0));
    b.emit(Instruction::ssi(Opcode::EqualsImmediate, 2, 1, 0));
    let not_nullary = b.create_label();
    b.emit_jump_if_not(2, not_nullary);
    b.emit(Instruction::si(Opcode::LoadInteger, 3, nullary));
    b.emit(Instruction::s(Opcode::Return, 3));

    // arity 1
    b.bind_label(not_nullary);
    b.emit(Instruction::ssi(Opcode::EqualsImmediate, 2, 1, 1));
    let not_unary = b.create_label();
    b.emit_jump_if_not(2, not_unary);
    b.emit(Instruction::si(Opcode::LoadInteger, 3, unary));
    b.emit(Instruction::ssu(Opcode::GetIndex, 4, 0, 0));
    b.emit(Instruction::sss(op, 3, 3, 4));
    b.emit(Instruction::s(Opcode::Return, 3));

    // arity 2 or more: fold left over the rest tuple
    b.bind_label(not_unary);
    b.emit(Instruction::ssu(Opcode::GetIndex, 3, 0, 0));
    b.emit(Instruction::si(Opcode::LoadInteger, 5, 1));
    let fold = b.here();
    b.emit(Instruction::sss(Opcode::Get, 4, 0, 5));
    b.emit(Instruction::sss(op, 3, 3, 4));
    b.emit(Instruction::ssi(Opcode::AddImmediate, 5, 5, 1));
    b.emit(Instruction::sss(Opcode::Equals, 2, 5, 1));
    b.emit_jump_if_not(2, fold);
    b.emit(Instruction::s(Opcode::Return, 3));

    b.finish()
}

// =========================================================================
// Chained comparators
// =========================================================================

/// One entry of the comparator table.
struct Comparator {
    name: &'static str,
    op: Opcode,
    /// Negate the result of the pairwise test.
    invert: bool,
    doc: &'static str,
}

const COMPARATORS: &[Comparator] = &[
    Comparator {
        name: "order>",
        op: Opcode::GreaterThan,
        invert: false,
        doc: "Returns true if xs are strictly decreasing in the total order over \
              all values.",
    },
    Comparator {
        name: "order<",
        op: Opcode::LessThan,
        invert: false,
        doc: "Returns true if xs are strictly increasing in the total order over \
              all values.",
    },
    Comparator {
        name: "order>=",
        op: Opcode::LessThan,
        invert: true,
        doc: "Returns true if xs are non-increasing in the total order over all \
              values.",
    },
    Comparator {
        name: "order<=",
        op: Opcode::GreaterThan,
        invert: true,
        doc: "Returns true if xs are non-decreasing in the total order over all \
              values.",
    },
    Comparator {
        name: "=",
        op: Opcode::Equals,
        invert: false,
        doc: "Returns true if all xs are structurally equal.",
    },
    Comparator {
        name: "not=",
        op: Opcode::Equals,
        invert: true,
        doc: "Returns true unless all xs are structurally equal.",
    },
    Comparator {
        name: ">",
        op: Opcode::NumericGreaterThan,
        invert: false,
        doc: "Returns true if xs are strictly decreasing numbers.",
    },
    Comparator {
        name: "<",
        op: Opcode::NumericLessThan,
        invert: false,
        doc: "Returns true if xs are strictly increasing numbers.",
    },
    Comparator {
        name: ">=",
        op: Opcode::NumericGreaterThanEqual,
        invert: false,
        doc: "Returns true if xs are non-increasing numbers.",
    },
    Comparator {
        name: "<=",
        op: Opcode::NumericLessThanEqual,
        invert: false,
        doc: "Returns true if xs are non-decreasing numbers.",
    },
    Comparator {
        name: "==",
        op: Opcode::NumericEqual,
        invert: false,
        doc: "Returns true if all xs are numerically equal.",
    },
    Comparator {
        name: "not==",
        op: Opcode::NumericEqual,
        invert: true,
        doc: "Returns true unless all xs are numerically equal.",
    },
];

/// Build the program for a chained comparator.
///
/// Adjacent argument pairs are tested left to right and the chain
/// short-circuits on the first failing pair. Calls with fewer than two
/// arguments are vacuously true, whether or not the comparator inverts its
/// pairwise test.
pub fn comparator_program(op: Opcode, invert: bool) -> Result<Box<[Instruction]>> {
    let mut b = ProgramBuilder::new();
    let vacuous = b.create_label();
    let fail = b.create_label();

    b.emit(Instruction::ss(Opcode::Length, 1, 0));
    b.emit(Instruction::ssi(Opcode::LessThanImmediate, 2, 1, 2));
    b.emit_jump_if(2, vacuous);

    // chain loop: slot 3 holds the left value, slot 4 the right
    b.emit(Instruction::ssu(Opcode::GetIndex, 3, 0, 0));
    b.emit(Instruction::si(Opcode::LoadInteger, 5, 1));
    let pair = b.here();
    b.emit(Instruction::sss(Opcode::Get, 4, 0, 5));
    b.emit(Instruction::sss(op, 2, 3, 4));
    b.emit_jump_if_not(2, fail);
    b.emit(Instruction::ssi(Opcode::AddImmediate, 5, 5, 1));
    b.emit(Instruction::ss(Opcode::Move, 3, 4));
    b.emit(Instruction::sss(Opcode::Equals, 2, 5, 1));
    b.emit_jump_if_not(2, pair);

    // every pair passed
    if !invert {
        b.bind_label(vacuous);
    }
    b.emit(Instruction::s(
        if invert { Opcode::LoadFalse } else { Opcode::LoadTrue },
        3,
    ));
    b.emit(Instruction::s(Opcode::Return, 3));

    // some pair failed
    b.bind_label(fail);
    if invert {
        b.bind_label(vacuous);
    }
    b.emit(Instruction::s(
        if invert { Opcode::LoadTrue } else { Opcode::LoadFalse },
        3,
    ));
    b.emit(Instruction::s(Opcode::Return, 3));

    b.finish()
}

// =========================================================================
// Apply
// =========================================================================

const APPLY_DOC: &str =
    "Applies f to the concatenation of the leading arguments and the elements \
     of the last argument, so (apply f x [y z]) calls (f x y z). The last \
     argument must be a tuple or array.";

/// Build the argument-spreading program behind `apply`.
///
/// Slot 0 holds the callee and slot 1 the rest tuple. Every rest element but
/// the last is pushed as a single pending argument; the last is spread with
/// a push-array, and the callee is tail-called so `apply` itself never
/// occupies a frame in the result.
pub fn apply_program() -> Result<Box<[Instruction]>> {
    let mut b = ProgramBuilder::new();
    let finish = b.create_label();
    let last = b.create_label();

    b.emit(Instruction::ss(Opcode::Length, 2, 1));
    b.emit(Instruction::ssi(Opcode::EqualsImmediate, 3, 2, 0));
    b.emit_jump_if(3, finish);
    b.emit(Instruction::si(Opcode::LoadInteger, 4, 0));
    let next = b.here();
    b.emit(Instruction::sss(Opcode::Get, 5, 1, 4));
    b.emit(Instruction::ssi(Opcode::AddImmediate, 4, 4, 1));
    b.emit(Instruction::sss(Opcode::Equals, 3, 4, 2));
    b.emit_jump_if(3, last);
    b.emit(Instruction::s(Opcode::Push, 5));
    b.emit_jump(next);
    b.bind_label(last);
    b.emit(Instruction::s(Opcode::PushArray, 5));
    b.bind_label(finish);
    b.emit(Instruction::s(Opcode::Tailcall, 0));

    b.finish()
}

// =========================================================================
// Fixed-shape primitives
// =========================================================================

/// One entry of the fixed primitive table.
struct Primitive {
    name: &'static str,
    arity: Arity,
    slots: u32,
    code: &'static [Instruction],
    doc: &'static str,
}

const PRIMITIVES: &[Primitive] = &[
    Primitive {
        name: "debug",
        arity: Arity::Exact(0),
        slots: 1,
        code: &[
            Instruction::su(Opcode::Signal, 0, SIG_DEBUG),
            Instruction::zero(Opcode::ReturnNil),
        ],
        doc: "Interrupts the current fiber with the debug signal and a nil \
              payload. Returns nil when the fiber is resumed.",
    },
    Primitive {
        name: "error",
        arity: Arity::Exact(1),
        slots: 1,
        code: &[Instruction::s(Opcode::Error, 0)],
        doc: "Raises its argument as an error.",
    },
    Primitive {
        name: "yield",
        arity: Arity::Range(0, 1),
        slots: 2,
        code: &[
            Instruction::su(Opcode::Signal, 0, SIG_YIELD),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Suspends the current fiber, passing an optional value to whatever \
              resumes it. Evaluates to the value given to the next resume.",
    },
    Primitive {
        name: "signal",
        arity: Arity::Range(0, 1),
        slots: 2,
        code: &[
            Instruction::su(Opcode::Signal, 0, SIG_USER0),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Raises the first user signal with an optional payload. Evaluates \
              to the value given to the next resume.",
    },
    Primitive {
        name: "resume",
        arity: Arity::Range(1, 2),
        slots: 2,
        code: &[
            Instruction::sss(Opcode::Resume, 0, 0, 1),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Resumes a fiber, passing an optional value as the result of the \
              signal that suspended it. Returns the fiber's next yield or its \
              final result.",
    },
    Primitive {
        name: "get",
        arity: Arity::Exact(2),
        slots: 2,
        code: &[
            Instruction::sss(Opcode::Get, 0, 0, 1),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Gets a value from a data structure: tuple, array, string, buffer, \
              struct, table or environment. Returns nil if the key is missing.",
    },
    Primitive {
        name: "put",
        arity: Arity::Exact(3),
        slots: 3,
        code: &[
            Instruction::sss(Opcode::Put, 0, 1, 2),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Associates a key with a value in a mutable data structure and \
              returns the structure. A nil value removes a table key.",
    },
    Primitive {
        name: "length",
        arity: Arity::Exact(1),
        slots: 1,
        code: &[
            Instruction::ss(Opcode::Length, 0, 0),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Returns the number of elements or bytes in x.",
    },
    Primitive {
        name: "bnot",
        arity: Arity::Exact(1),
        slots: 1,
        code: &[
            Instruction::ss(Opcode::BitNot, 0, 0),
            Instruction::s(Opcode::Return, 0),
        ],
        doc: "Returns the bitwise complement of the integer x.",
    },
];

// =========================================================================
// Installation
// =========================================================================

/// Assemble and bind the fixed primitives.
pub fn install_primitives(env: &Environment) -> Result<()> {
    for p in PRIMITIVES {
        quick_asm(env, p.name, p.arity, DefFlags::NONE, p.slots, p.code, p.doc)?;
    }
    Ok(())
}

/// Assemble and bind `apply`.
pub fn install_apply(env: &Environment) -> Result<()> {
    let code = apply_program()?;
    quick_asm(
        env,
        "apply",
        Arity::AtLeast(1),
        DefFlags::VARARG | DefFlags::APPLY,
        TEMPLATE_SLOTS,
        &code,
        APPLY_DOC,
    )
}

/// Assemble and bind the variadic arithmetic and bitwise operations.
pub fn install_varops(env: &Environment) -> Result<()> {
    for v in VAR_OPS {
        let code = varop_program(v.op, v.nullary, v.unary)?;
        quick_asm(
            env,
            v.name,
            Arity::AtLeast(0),
            DefFlags::VARARG,
            TEMPLATE_SLOTS,
            &code,
            v.doc,
        )?;
    }
    Ok(())
}

/// Assemble and bind the chained comparators.
pub fn install_comparators(env: &Environment) -> Result<()> {
    for c in COMPARATORS {
        let code = comparator_program(c.op, c.invert)?;
        quick_asm(
            env,
            c.name,
            Arity::AtLeast(0),
            DefFlags::VARARG,
            TEMPLATE_SLOTS,
            &code,
            c.doc,
        )?;
    }
    Ok(())
}

/// Assemble every template into an environment.
pub fn install_all(env: &Environment) -> Result<()> {
    install_primitives(env)?;
    install_apply(env)?;
    install_varops(env)?;
    install_comparators(env)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quartz_core::{Callable, Value};

    #[test]
    fn varop_program_has_the_expected_shape() {
        let code = varop_program(Opcode::Add, 0, 0).unwrap();
        let expected = [
            Instruction::ss(Opcode::Length, 1, 0),
            Instruction::ssi(Opcode::EqualsImmediate, 2, 1, 0),
            Instruction::sl(Opcode::JumpIfNot, 2, 3),
            Instruction::si(Opcode::LoadInteger, 3, 0),
            Instruction::s(Opcode::Return, 3),
            Instruction::ssi(Opcode::EqualsImmediate, 2, 1, 1),
            Instruction::sl(Opcode::JumpIfNot, 2, 5),
            Instruction::si(Opcode::LoadInteger, 3, 0),
            Instruction::ssu(Opcode::GetIndex, 4, 0, 0),
            Instruction::sss(Opcode::Add, 3, 3, 4),
            Instruction::s(Opcode::Return, 3),
            Instruction::ssu(Opcode::GetIndex, 3, 0, 0),
            Instruction::si(Opcode::LoadInteger, 5, 1),
            Instruction::sss(Opcode::Get, 4, 0, 5),
            Instruction::sss(Opcode::Add, 3, 3, 4),
            Instruction::ssi(Opcode::AddImmediate, 5, 5, 1),
            Instruction::sss(Opcode::Equals, 2, 5, 1),
            Instruction::sl(Opcode::JumpIfNot, 2, -4),
            Instruction::s(Opcode::Return, 3),
        ];
        assert_eq!(&*code, &expected[..]);
    }

    #[test]
    fn varop_seeds_differ_per_operation() {
        let product = varop_program(Opcode::Multiply, 1, 1).unwrap();
        assert_eq!(product[3].imm16(), 1);
        assert_eq!(product[9].opcode(), Some(Opcode::Multiply));

        let band = varop_program(Opcode::BitAnd, -1, -1).unwrap();
        assert_eq!(band[3].imm16(), -1);
        assert_eq!(band[7].imm16(), -1);
    }

    #[test]
    fn comparator_program_has_the_expected_shape() {
        let code = comparator_program(Opcode::NumericLessThan, false).unwrap();
        let expected = [
            Instruction::ss(Opcode::Length, 1, 0),
            Instruction::ssi(Opcode::LessThanImmediate, 2, 1, 2),
            Instruction::sl(Opcode::JumpIf, 2, 10),
            Instruction::ssu(Opcode::GetIndex, 3, 0, 0),
            Instruction::si(Opcode::LoadInteger, 5, 1),
            Instruction::sss(Opcode::Get, 4, 0, 5),
            Instruction::sss(Opcode::NumericLessThan, 2, 3, 4),
            Instruction::sl(Opcode::JumpIfNot, 2, 7),
            Instruction::ssi(Opcode::AddImmediate, 5, 5, 1),
            Instruction::ss(Opcode::Move, 3, 4),
            Instruction::sss(Opcode::Equals, 2, 5, 1),
            Instruction::sl(Opcode::JumpIfNot, 2, -6),
            Instruction::s(Opcode::LoadTrue, 3),
            Instruction::s(Opcode::Return, 3),
            Instruction::s(Opcode::LoadFalse, 3),
            Instruction::s(Opcode::Return, 3),
        ];
        assert_eq!(&*code, &expected[..]);
    }

    #[test]
    fn inverted_comparator_still_short_circuits_to_true() {
        // The arity guard must land on the tail that loads true, which for
        // an inverting comparator is the failure tail.
        let code = comparator_program(Opcode::Equals, true).unwrap();
        assert_eq!(code[2].opcode(), Some(Opcode::JumpIf));
        assert_eq!(code[2].offset16(), 12);
        assert_eq!(code[12].opcode(), Some(Opcode::LoadFalse));
        assert_eq!(code[14].opcode(), Some(Opcode::LoadTrue));
    }

    #[test]
    fn apply_program_has_the_expected_shape() {
        let code = apply_program().unwrap();
        let expected = [
            Instruction::ss(Opcode::Length, 2, 1),
            Instruction::ssi(Opcode::EqualsImmediate, 3, 2, 0),
            Instruction::sl(Opcode::JumpIf, 3, 9),
            Instruction::si(Opcode::LoadInteger, 4, 0),
            Instruction::sss(Opcode::Get, 5, 1, 4),
            Instruction::ssi(Opcode::AddImmediate, 4, 4, 1),
            Instruction::sss(Opcode::Equals, 3, 4, 2),
            Instruction::sl(Opcode::JumpIf, 3, 3),
            Instruction::s(Opcode::Push, 5),
            Instruction::l(Opcode::Jump, -5),
            Instruction::s(Opcode::PushArray, 5),
            Instruction::s(Opcode::Tailcall, 0),
        ];
        assert_eq!(&*code, &expected[..]);
    }

    #[test]
    fn install_all_binds_every_template() {
        let env = Environment::new();
        install_all(&env).unwrap();

        for name in [
            "debug", "error", "yield", "signal", "resume", "get", "put", "length", "bnot",
            "apply", "+", "-", "*", "/", "band", "bor", "bxor", "blshift", "brshift",
            "brushift", "=", "not=", "order<", "order>", "order<=", "order>=", "<", ">",
            "<=", ">=", "==", "not==",
        ] {
            let value = env.get(name).unwrap_or_else(|| panic!("{name} missing"));
            assert!(
                matches!(value, Value::Function(Callable::Thunk(_))),
                "{name} is not a thunk"
            );
            let binding = env.resolve(name).unwrap();
            assert!(binding.doc.is_some(), "{name} has no docstring");
        }
    }

    #[test]
    fn apply_is_flagged_for_reidentification() {
        let env = Environment::new();
        install_apply(&env).unwrap();
        let Some(Value::Function(Callable::Thunk(def))) = env.get("apply") else {
            panic!("apply missing");
        };
        assert!(def.flags().contains(DefFlags::APPLY));
        assert!(def.is_vararg());
        assert_eq!(def.arity(), Arity::AtLeast(1));
    }
}
