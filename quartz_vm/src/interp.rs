//! The bytecode interpreter and the single calling convention.
//!
//! Execution runs over an explicit frame stack so that a signal raised
//! anywhere below a fiber's entry frame can suspend the whole stack and be
//! resumed later. Every definition reaching this module has passed the
//! assembler's verifier, so slot indices and jump targets are trusted and
//! indexed directly.
//!
//! The calling convention: arity is checked against the definition's
//! contract, fixed arguments land in the low slots, a variadic tail is
//! collected into a tuple at the first free slot, and everything else
//! starts nil.

use std::cell::Cell;
use std::cmp::Ordering;
use std::mem;
use std::sync::Arc;

use smallvec::SmallVec;

use quartz_core::fiber::{Fiber, FiberStatus, Frame};
use quartz_core::{
    access, total_cmp, Callable, Definition, Instruction, Opcode, QuartzError, Result, Value,
};

use crate::boot::eval;

/// Maximum recursion depth before the interpreter refuses to go deeper.
/// Bounds both the explicit frame stack and host-level reentry (natives or
/// fibers calling back in).
pub const MAX_RECURSION_DEPTH: usize = 1000;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<DepthGuard> {
        DEPTH.with(|d| {
            if d.get() >= MAX_RECURSION_DEPTH {
                Err(QuartzError::value("call stack overflow"))
            } else {
                d.set(d.get() + 1);
                Ok(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get() - 1));
    }
}

/// How a frame stack stopped running.
enum Outcome {
    Return(Value),
    /// A signal left the stack intact; the suspended top frame knows where
    /// the eventual resume value lands.
    Signal { sig: u8, payload: Value },
}

// =========================================================================
// Calling convention
// =========================================================================

/// Call any value as a function.
pub fn call(fun: &Value, args: &[Value]) -> Result<Value> {
    match fun {
        Value::Function(callable) => call_callable(callable, args),
        other => Err(QuartzError::value(format!(
            "cannot call a {}",
            other.type_name()
        ))),
    }
}

/// Call through the callable union.
pub fn call_callable(callable: &Callable, args: &[Value]) -> Result<Value> {
    let _guard = DepthGuard::enter()?;
    match callable {
        Callable::Native(f) => (f.fun)(args),
        Callable::Thunk(def) => call_thunk(def, args),
        Callable::Guest(f) => eval::call_guest(f, args),
    }
}

fn call_thunk(def: &Arc<Definition>, args: &[Value]) -> Result<Value> {
    let mut stack = vec![make_frame(def, args)?];
    match run(&mut stack)? {
        Outcome::Return(value) => Ok(value),
        // A signal with no fiber around it has nothing to suspend into.
        Outcome::Signal { sig, payload } => Err(QuartzError::Signal { sig, payload }),
    }
}

/// Build the entry frame for a definition.
fn make_frame(def: &Arc<Definition>, args: &[Value]) -> Result<Frame> {
    def.arity().check(def.name(), args.len())?;
    let mut slots = vec![Value::Nil; def.slot_count() as usize];
    if def.is_vararg() {
        let fixed = def.fixed_args() as usize;
        for (slot, arg) in slots.iter_mut().zip(args.iter().take(fixed)) {
            *slot = arg.clone();
        }
        slots[fixed] = Value::tuple(args[fixed..].to_vec());
    } else {
        for (slot, arg) in slots.iter_mut().zip(args.iter()) {
            *slot = arg.clone();
        }
    }
    Ok(Frame {
        def: def.clone(),
        slots,
        pending: Vec::new(),
        pc: 0,
        result_slot: 0,
    })
}

// =========================================================================
// Fibers
// =========================================================================

/// Resume a fiber, passing `value` as the result of the signal that
/// suspended it (or as the entry argument on the first resume).
///
/// Returns the payload of the fiber's next signal, or its final result.
pub fn resume_fiber(fiber: &Arc<Fiber>, value: Value) -> Result<Value> {
    let _guard = DepthGuard::enter()?;

    let mut state = fiber.state.lock();
    let (mut stack, first) = match state.status {
        FiberStatus::New => (Vec::new(), true),
        FiberStatus::Pending => (mem::take(&mut state.stack), false),
        status => {
            return Err(QuartzError::value(format!(
                "cannot resume a {} fiber",
                status.name()
            )));
        }
    };
    state.status = FiberStatus::Alive;
    // Run unlocked so the body can touch this fiber (status queries) without
    // deadlocking.
    drop(state);

    let outcome = if first {
        start_entry(&fiber.entry, value, &mut stack)
    } else {
        if let Some(top) = stack.last_mut() {
            let dst = top.result_slot as usize;
            top.slots[dst] = value;
        }
        run(&mut stack)
    };

    let mut state = fiber.state.lock();
    match outcome {
        Ok(Outcome::Return(v)) => {
            state.status = FiberStatus::Dead;
            Ok(v)
        }
        Ok(Outcome::Signal { payload, .. }) => {
            state.status = FiberStatus::Pending;
            state.stack = stack;
            Ok(payload)
        }
        Err(e) => {
            state.status = FiberStatus::Error;
            Err(e)
        }
    }
}

fn start_entry(entry: &Callable, value: Value, stack: &mut Vec<Frame>) -> Result<Outcome> {
    let args = entry_args(entry, value);
    match entry {
        Callable::Thunk(def) => {
            stack.push(make_frame(def, &args)?);
            run(stack)
        }
        // Non-bytecode entries cannot suspend; they run to completion.
        Callable::Native(f) => (f.fun)(&args).map(Outcome::Return),
        Callable::Guest(f) => eval::call_guest(f, &args).map(Outcome::Return),
    }
}

/// The first resume's value is passed to the entry if it can accept an
/// argument, and dropped otherwise.
fn entry_args(entry: &Callable, value: Value) -> SmallVec<[Value; 1]> {
    let takes_arg = match entry.arity() {
        Some(arity) => arity.max().is_none_or(|max| max >= 1),
        None => true,
    };
    if takes_arg {
        let mut args = SmallVec::new();
        args.push(value);
        args
    } else {
        SmallVec::new()
    }
}

// =========================================================================
// The dispatch loop
// =========================================================================

/// Deliver a value produced by the top frame to its caller. Returns the
/// final outcome when the bottom frame finished.
fn deliver(stack: &mut Vec<Frame>, value: Value) -> Option<Outcome> {
    stack.pop();
    match stack.last_mut() {
        None => Some(Outcome::Return(value)),
        Some(caller) => {
            let dst = caller.result_slot as usize;
            caller.slots[dst] = value;
            None
        }
    }
}

fn run(stack: &mut Vec<Frame>) -> Result<Outcome> {
    loop {
        let Some(frame) = stack.last_mut() else {
            return Ok(Outcome::Return(Value::Nil));
        };
        if frame.pc >= frame.def.code().len() {
            // Fell off the end: implicit nil return.
            if let Some(outcome) = deliver(stack, Value::Nil) {
                return Ok(outcome);
            }
            continue;
        }
        let inst = frame.def.code()[frame.pc];
        frame.pc += 1;
        let Some(op) = inst.opcode() else {
            return Err(QuartzError::value(format!(
                "unknown opcode {:#04x}",
                inst.word() & 0xff
            )));
        };
        match op {
            Opcode::Noop => {}
            Opcode::ReturnNil => {
                if let Some(outcome) = deliver(stack, Value::Nil) {
                    return Ok(outcome);
                }
            }
            Opcode::Return => {
                let value = frame.slots[inst.a() as usize].clone();
                if let Some(outcome) = deliver(stack, value) {
                    return Ok(outcome);
                }
            }
            Opcode::Error => {
                let payload = frame.slots[inst.a() as usize].clone();
                return Err(QuartzError::Raised(payload));
            }
            Opcode::Push => {
                let value = frame.slots[inst.a() as usize].clone();
                frame.pending.push(value);
            }
            Opcode::PushArray => {
                let value = frame.slots[inst.a() as usize].clone();
                match value {
                    Value::Tuple(items) => frame.pending.extend(items.iter().cloned()),
                    Value::Array(items) => {
                        let items = items.read();
                        frame.pending.extend(items.iter().cloned());
                    }
                    other => {
                        return Err(QuartzError::value(format!(
                            "cannot spread a {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Opcode::Call => {
                let dst = inst.a();
                let callee = frame.slots[inst.b() as usize].clone();
                let args = mem::take(&mut frame.pending);
                match callee {
                    Value::Function(Callable::Thunk(def)) => {
                        if stack.len() >= MAX_RECURSION_DEPTH {
                            return Err(QuartzError::value("call stack overflow"));
                        }
                        let callee_frame = make_frame(&def, &args)?;
                        // Re-borrow: make_frame may error before we commit.
                        if let Some(frame) = stack.last_mut() {
                            frame.result_slot = dst;
                        }
                        stack.push(callee_frame);
                    }
                    Value::Function(Callable::Native(f)) => {
                        let value = (f.fun)(&args)?;
                        frame.slots[dst as usize] = value;
                    }
                    Value::Function(Callable::Guest(f)) => {
                        let value = eval::call_guest(&f, &args)?;
                        frame.slots[dst as usize] = value;
                    }
                    other => {
                        return Err(QuartzError::value(format!(
                            "cannot call a {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Opcode::Tailcall => {
                let callee = frame.slots[inst.a() as usize].clone();
                let args = mem::take(&mut frame.pending);
                match callee {
                    Value::Function(Callable::Thunk(def)) => {
                        // Replace the top frame in place: proper tail call.
                        *frame = make_frame(&def, &args)?;
                    }
                    Value::Function(Callable::Native(f)) => {
                        let value = (f.fun)(&args)?;
                        if let Some(outcome) = deliver(stack, value) {
                            return Ok(outcome);
                        }
                    }
                    Value::Function(Callable::Guest(f)) => {
                        let value = eval::call_guest(&f, &args)?;
                        if let Some(outcome) = deliver(stack, value) {
                            return Ok(outcome);
                        }
                    }
                    other => {
                        return Err(QuartzError::value(format!(
                            "cannot call a {}",
                            other.type_name()
                        )));
                    }
                }
            }
            Opcode::LoadNil => frame.slots[inst.a() as usize] = Value::Nil,
            Opcode::LoadTrue => frame.slots[inst.a() as usize] = Value::Boolean(true),
            Opcode::LoadFalse => frame.slots[inst.a() as usize] = Value::Boolean(false),
            Opcode::Move => {
                frame.slots[inst.a() as usize] = frame.slots[inst.b() as usize].clone();
            }
            Opcode::Length => {
                let len = access::length(&frame.slots[inst.b() as usize])?;
                frame.slots[inst.a() as usize] = Value::Number(len as f64);
            }
            Opcode::BitNot => {
                let x = int32_of(&frame.slots[inst.b() as usize])?;
                frame.slots[inst.a() as usize] = Value::Number(f64::from(!x));
            }
            Opcode::LoadInteger => {
                frame.slots[inst.a() as usize] = Value::Number(f64::from(inst.imm16()));
            }
            Opcode::Signal => {
                let slot = inst.a();
                let payload = frame.slots[slot as usize].clone();
                frame.result_slot = slot;
                return Ok(Outcome::Signal {
                    sig: inst.uimm8(),
                    payload,
                });
            }
            Opcode::Jump => {
                let base = frame.pc - 1;
                frame.pc = (base as i64 + i64::from(inst.offset24())) as usize;
            }
            Opcode::JumpIf => {
                if frame.slots[inst.a() as usize].is_truthy() {
                    let base = frame.pc - 1;
                    frame.pc = (base as i64 + i64::from(inst.offset16())) as usize;
                }
            }
            Opcode::JumpIfNot => {
                if !frame.slots[inst.a() as usize].is_truthy() {
                    let base = frame.pc - 1;
                    frame.pc = (base as i64 + i64::from(inst.offset16())) as usize;
                }
            }
            Opcode::AddImmediate => {
                let x = number_of(&frame.slots[inst.b() as usize])?;
                frame.slots[inst.a() as usize] = Value::Number(x + f64::from(inst.imm8()));
            }
            Opcode::EqualsImmediate => {
                let imm = Value::Number(f64::from(inst.imm8()));
                let eq = frame.slots[inst.b() as usize] == imm;
                frame.slots[inst.a() as usize] = Value::Boolean(eq);
            }
            Opcode::LessThanImmediate => {
                let x = number_of(&frame.slots[inst.b() as usize])?;
                frame.slots[inst.a() as usize] = Value::Boolean(x < f64::from(inst.imm8()));
            }
            Opcode::GetIndex => {
                let key = Value::Number(f64::from(inst.uimm8()));
                let value = access::get(&frame.slots[inst.b() as usize], &key)?;
                frame.slots[inst.a() as usize] = value;
            }
            Opcode::Get => {
                let value = access::get(
                    &frame.slots[inst.b() as usize],
                    &frame.slots[inst.c() as usize],
                )?;
                frame.slots[inst.a() as usize] = value;
            }
            Opcode::Put => {
                access::put(
                    &frame.slots[inst.a() as usize],
                    frame.slots[inst.b() as usize].clone(),
                    frame.slots[inst.c() as usize].clone(),
                )?;
            }
            Opcode::Add => binary_num(frame, inst, |x, y| x + y)?,
            Opcode::Subtract => binary_num(frame, inst, |x, y| x - y)?,
            Opcode::Multiply => binary_num(frame, inst, |x, y| x * y)?,
            Opcode::Divide => binary_num(frame, inst, |x, y| x / y)?,
            Opcode::BitAnd => binary_int(frame, inst, |x, y| x & y)?,
            Opcode::BitOr => binary_int(frame, inst, |x, y| x | y)?,
            Opcode::BitXor => binary_int(frame, inst, |x, y| x ^ y)?,
            Opcode::ShiftLeft => binary_int(frame, inst, |x, y| x << (y & 31))?,
            Opcode::ShiftRight => binary_int(frame, inst, |x, y| x >> (y & 31))?,
            Opcode::ShiftRightUnsigned => {
                let x = int32_of(&frame.slots[inst.b() as usize])? as u32;
                let y = int32_of(&frame.slots[inst.c() as usize])?;
                let shifted = x >> (y & 31) as u32;
                frame.slots[inst.a() as usize] = Value::Number(f64::from(shifted));
            }
            Opcode::Equals => {
                let eq = frame.slots[inst.b() as usize] == frame.slots[inst.c() as usize];
                frame.slots[inst.a() as usize] = Value::Boolean(eq);
            }
            Opcode::LessThan => {
                let ord = total_cmp(
                    &frame.slots[inst.b() as usize],
                    &frame.slots[inst.c() as usize],
                );
                frame.slots[inst.a() as usize] = Value::Boolean(ord == Ordering::Less);
            }
            Opcode::GreaterThan => {
                let ord = total_cmp(
                    &frame.slots[inst.b() as usize],
                    &frame.slots[inst.c() as usize],
                );
                frame.slots[inst.a() as usize] = Value::Boolean(ord == Ordering::Greater);
            }
            Opcode::NumericEqual => binary_cmp(frame, inst, |x, y| x == y)?,
            Opcode::NumericLessThan => binary_cmp(frame, inst, |x, y| x < y)?,
            Opcode::NumericGreaterThan => binary_cmp(frame, inst, |x, y| x > y)?,
            Opcode::NumericLessThanEqual => binary_cmp(frame, inst, |x, y| x <= y)?,
            Opcode::NumericGreaterThanEqual => binary_cmp(frame, inst, |x, y| x >= y)?,
            Opcode::Resume => {
                let fiber = match &frame.slots[inst.b() as usize] {
                    Value::Fiber(f) => f.clone(),
                    other => {
                        return Err(QuartzError::value(format!(
                            "cannot resume a {}",
                            other.type_name()
                        )));
                    }
                };
                let value = frame.slots[inst.c() as usize].clone();
                let result = resume_fiber(&fiber, value)?;
                frame.slots[inst.a() as usize] = result;
            }
        }
    }
}

// =========================================================================
// Operand helpers
// =========================================================================

#[inline]
fn number_of(v: &Value) -> Result<f64> {
    v.as_number().ok_or_else(|| {
        QuartzError::value(format!("expected a number, got {}", v.type_name()))
    })
}

#[inline]
fn int32_of(v: &Value) -> Result<i32> {
    let n = v.as_integer().ok_or_else(|| {
        QuartzError::value(format!("expected an integer, got {}", v.type_name()))
    })?;
    i32::try_from(n)
        .map_err(|_| QuartzError::range(format!("integer {n} does not fit in 32 bits")))
}

#[inline]
fn binary_num(frame: &mut Frame, inst: Instruction, f: impl Fn(f64, f64) -> f64) -> Result<()> {
    let x = number_of(&frame.slots[inst.b() as usize])?;
    let y = number_of(&frame.slots[inst.c() as usize])?;
    frame.slots[inst.a() as usize] = Value::Number(f(x, y));
    Ok(())
}

#[inline]
fn binary_int(frame: &mut Frame, inst: Instruction, f: impl Fn(i32, i32) -> i32) -> Result<()> {
    let x = int32_of(&frame.slots[inst.b() as usize])?;
    let y = int32_of(&frame.slots[inst.c() as usize])?;
    frame.slots[inst.a() as usize] = Value::Number(f64::from(f(x, y)));
    Ok(())
}

#[inline]
fn binary_cmp(frame: &mut Frame, inst: Instruction, f: impl Fn(f64, f64) -> bool) -> Result<()> {
    let x = number_of(&frame.slots[inst.b() as usize])?;
    let y = number_of(&frame.slots[inst.c() as usize])?;
    frame.slots[inst.a() as usize] = Value::Boolean(f(x, y));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_asm::templates;
    use quartz_core::{Arity, DefFlags, Environment};

    fn template_env() -> Environment {
        let env = Environment::new();
        templates::install_all(&env).unwrap();
        env
    }

    fn invoke(env: &Environment, name: &str, args: &[Value]) -> Result<Value> {
        let fun = env.get(name).unwrap();
        call(&fun, args)
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn varops_fold_per_arity() {
        let env = template_env();
        assert_eq!(invoke(&env, "+", &[]).unwrap(), num(0.0));
        assert_eq!(invoke(&env, "+", &[num(7.0)]).unwrap(), num(7.0));
        assert_eq!(
            invoke(&env, "+", &[num(1.0), num(2.0), num(3.0)]).unwrap(),
            num(6.0)
        );
        assert_eq!(invoke(&env, "-", &[]).unwrap(), num(0.0));
        assert_eq!(invoke(&env, "-", &[num(5.0)]).unwrap(), num(-5.0));
        assert_eq!(
            invoke(&env, "-", &[num(10.0), num(3.0), num(2.0)]).unwrap(),
            num(5.0)
        );
        assert_eq!(invoke(&env, "*", &[]).unwrap(), num(1.0));
        assert_eq!(invoke(&env, "/", &[num(2.0)]).unwrap(), num(0.5));
        assert_eq!(invoke(&env, "band", &[]).unwrap(), num(-1.0));
        assert_eq!(
            invoke(&env, "band", &[num(12.0), num(10.0)]).unwrap(),
            num(8.0)
        );
        assert_eq!(invoke(&env, "blshift", &[num(3.0)]).unwrap(), num(8.0));
        assert_eq!(
            invoke(&env, "brushift", &[num(-1.0), num(0.0)]).unwrap(),
            num(4294967295.0)
        );
    }

    #[test]
    fn comparators_chain_and_are_vacuously_true() {
        let env = template_env();
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);
        assert_eq!(
            invoke(&env, "<", &[num(1.0), num(2.0), num(3.0)]).unwrap(),
            t
        );
        assert_eq!(
            invoke(&env, "<", &[num(1.0), num(3.0), num(2.0)]).unwrap(),
            f
        );
        assert_eq!(invoke(&env, "<", &[]).unwrap(), t);
        assert_eq!(invoke(&env, "<", &[num(5.0)]).unwrap(), t);
        // Inversion does not change the vacuous-arity rule.
        assert_eq!(invoke(&env, "not=", &[]).unwrap(), t);
        assert_eq!(invoke(&env, "not=", &[num(9.0)]).unwrap(), t);
        assert_eq!(invoke(&env, "not=", &[num(1.0), num(1.0)]).unwrap(), f);
        assert_eq!(invoke(&env, "not=", &[num(1.0), num(2.0)]).unwrap(), t);
        assert_eq!(
            invoke(&env, "=", &[Value::from("a"), Value::from("a")]).unwrap(),
            t
        );
    }

    #[test]
    fn failed_chain_short_circuits_past_poison_values() {
        let env = template_env();
        // 3 < 1 fails first, so the string in third position is never fed to
        // the numeric comparison.
        let result = invoke(&env, "<", &[num(3.0), num(1.0), Value::from("poison")]).unwrap();
        assert_eq!(result, Value::Boolean(false));
        // When the chain survives to the poison value, the comparison errors.
        let err = invoke(&env, "<", &[num(1.0), num(3.0), Value::from("poison")]).unwrap_err();
        assert!(err.to_string().contains("expected a number"));
    }

    #[test]
    fn apply_spreads_only_the_last_argument() {
        let env = template_env();
        let plus = env.get("+").unwrap();
        let rest = Value::tuple(vec![num(3.0), num(4.0)]);
        let result = invoke(&env, "apply", &[plus.clone(), num(1.0), num(2.0), rest]).unwrap();
        assert_eq!(result, num(10.0));

        let spread_array = Value::array(vec![num(5.0), num(6.0)]);
        assert_eq!(
            invoke(&env, "apply", &[plus.clone(), spread_array]).unwrap(),
            num(11.0)
        );
        assert_eq!(
            invoke(&env, "apply", &[plus, Value::tuple(Vec::new())]).unwrap(),
            num(0.0)
        );
    }

    #[test]
    fn apply_rejects_unspreadable_tails() {
        let env = template_env();
        let plus = env.get("+").unwrap();
        let err = invoke(&env, "apply", &[plus, num(3.0)]).unwrap_err();
        assert!(err.to_string().contains("cannot spread"));
    }

    #[test]
    fn get_put_length_primitives() {
        let env = template_env();
        let table = Value::table(Default::default());
        let key = Value::keyword("a");
        invoke(&env, "put", &[table.clone(), key.clone(), num(1.0)]).unwrap();
        assert_eq!(invoke(&env, "get", &[table.clone(), key]).unwrap(), num(1.0));
        assert_eq!(invoke(&env, "length", &[table]).unwrap(), num(1.0));
        assert_eq!(invoke(&env, "bnot", &[num(0.0)]).unwrap(), num(-1.0));
    }

    #[test]
    fn error_primitive_raises_its_payload() {
        let env = template_env();
        let err = invoke(&env, "error", &[Value::from("boom")]).unwrap_err();
        match err {
            QuartzError::Raised(payload) => assert_eq!(payload, Value::from("boom")),
            other => panic!("expected a raised error, got {other}"),
        }
    }

    #[test]
    fn top_level_yield_is_an_unhandled_signal() {
        let env = template_env();
        let err = invoke(&env, "yield", &[num(1.0)]).unwrap_err();
        match err {
            QuartzError::Signal { sig, payload } => {
                assert_eq!(sig, quartz_core::fiber::SIG_YIELD);
                assert_eq!(payload, num(1.0));
            }
            other => panic!("expected an unhandled signal, got {other}"),
        }
    }

    #[test]
    fn fiber_over_yield_round_trips_values() {
        let env = template_env();
        let Some(Value::Function(yield_fn)) = env.get("yield") else {
            panic!("yield missing");
        };
        let fiber = Arc::new(Fiber::new(yield_fn));
        assert_eq!(fiber.status(), FiberStatus::New);

        // First resume passes the entry argument, which yield signals back.
        let out = resume_fiber(&fiber, num(42.0)).unwrap();
        assert_eq!(out, num(42.0));
        assert_eq!(fiber.status(), FiberStatus::Pending);

        // Second resume becomes yield's return value.
        let out = resume_fiber(&fiber, num(7.0)).unwrap();
        assert_eq!(out, num(7.0));
        assert_eq!(fiber.status(), FiberStatus::Dead);

        let err = resume_fiber(&fiber, Value::Nil).unwrap_err();
        assert!(err.to_string().contains("dead fiber"));
    }

    #[test]
    fn signal_suspends_through_nested_frames() {
        // outer f: calls f(5), then returns the resume value plus 5. The
        // signal raised inside the callee must suspend both frames.
        let code = [
            Instruction::si(Opcode::LoadInteger, 1, 5),
            Instruction::s(Opcode::Push, 1),
            Instruction::ss(Opcode::Call, 2, 0),
            Instruction::sss(Opcode::Add, 0, 2, 1),
            Instruction::s(Opcode::Return, 0),
        ];
        let outer = quartz_asm::assemble(
            "outer",
            None,
            Arity::Exact(1),
            DefFlags::NONE,
            3,
            &code,
        )
        .unwrap();

        let env = template_env();
        let yield_fn = env.get("yield").unwrap();
        let fiber = Arc::new(Fiber::new(Callable::Thunk(outer)));

        let out = resume_fiber(&fiber, yield_fn).unwrap();
        assert_eq!(out, num(5.0));
        assert_eq!(fiber.status(), FiberStatus::Pending);

        let out = resume_fiber(&fiber, num(37.0)).unwrap();
        assert_eq!(out, num(42.0));
        assert_eq!(fiber.status(), FiberStatus::Dead);
    }

    #[test]
    fn zero_arity_entries_drop_the_first_resume_value() {
        let code = [
            Instruction::si(Opcode::LoadInteger, 0, 9),
            Instruction::s(Opcode::Return, 0),
        ];
        let nine =
            quartz_asm::assemble("nine", None, Arity::Exact(0), DefFlags::NONE, 1, &code).unwrap();
        let fiber = Arc::new(Fiber::new(Callable::Thunk(nine)));
        assert_eq!(resume_fiber(&fiber, num(123.0)).unwrap(), num(9.0));
        assert_eq!(fiber.status(), FiberStatus::Dead);
    }

    #[test]
    fn falling_off_the_end_returns_nil() {
        let code = [Instruction::zero(Opcode::Noop)];
        let def =
            quartz_asm::assemble("noop", None, Arity::Exact(0), DefFlags::NONE, 0, &code).unwrap();
        assert_eq!(
            call_callable(&Callable::Thunk(def), &[]).unwrap(),
            Value::Nil
        );
    }

    #[test]
    fn arity_violations_surface_before_execution() {
        let env = template_env();
        let err = invoke(&env, "get", &[num(1.0)]).unwrap_err();
        assert!(err.to_string().contains("expected exactly 2"));
        let err = invoke(&env, "apply", &[]).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn runaway_reentry_hits_the_depth_guard() {
        fn reenter(args: &[Value]) -> Result<Value> {
            call(&args[0], args)
        }
        let callable = Callable::Native(Arc::new(quartz_core::NativeFunction {
            name: "reenter".into(),
            doc: None,
            fun: reenter,
        }));
        let fun = Value::Function(callable);
        let err = call(&fun, &[fun.clone()]).unwrap_err();
        assert!(err.to_string().contains("call stack overflow"));
    }

    #[test]
    fn calling_a_non_function_is_a_value_error() {
        let err = call(&Value::Nil, &[]).unwrap_err();
        assert!(err.to_string().contains("cannot call a nil"));
    }
}
