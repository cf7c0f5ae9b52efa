//! Guest-facing assembler.
//!
//! Exposes `asm` and `disasm` without a library prefix. `asm` takes a
//! struct or table describing a definition and hands it to the same
//! assembler every builtin goes through, so guest-assembled code is
//! verified exactly like template code. Instructions are written as
//! tuples of an opcode name followed by integer operands, one element
//! per operand of the opcode's layout.

use quartz_core::{
    args, Arity, Callable, DefFlags, Environment, Instruction, Layout, Opcode, QuartzError, Result,
    Value, ValueMap,
};

use crate::corelib::{install, NativeEntry};

const FUNCTIONS: &[NativeEntry] = &[
    NativeEntry {
        name: "asm",
        doc: "(asm spec)\n\nAssembles a bytecode function from a struct \
              or table. Recognized keys are :name, :doc, :arity, \
              :min-arity, :max-arity, :vararg, :slots, and :bytecode, \
              where :bytecode is a sequence of instruction tuples such \
              as (\"add\" 0 0 1). When :slots is omitted the frame is \
              sized to the highest slot the code touches.",
        fun: asm_assemble,
    },
    NativeEntry {
        name: "disasm",
        doc: "(disasm f)\n\nReturns the assembly listing of a bytecode \
              function as a string.",
        fun: asm_disasm,
    },
];

pub fn install_lib(env: &Environment) {
    install(env, None, FUNCTIONS);
}

// ======================================================================
// asm
// ======================================================================

fn asm_assemble(arguments: &[Value]) -> Result<Value> {
    args::fixarity("asm", arguments, 1)?;
    let map = spec_map(&arguments[0])?;

    let name = text_field(&map, "name")?.unwrap_or_else(|| "anonymous".to_string());
    let doc = text_field(&map, "doc")?;
    let vararg = field(&map, "vararg").is_some_and(|v| v.is_truthy());
    let flags = if vararg { DefFlags::VARARG } else { DefFlags::NONE };
    let arity = resolve_arity(&map, vararg)?;

    let Some(bytecode) = field(&map, "bytecode") else {
        return Err(QuartzError::value("asm needs a :bytecode sequence"));
    };
    let forms: Vec<Value> = match &bytecode {
        Value::Tuple(items) => items.to_vec(),
        Value::Array(items) => items.read().clone(),
        other => {
            return Err(QuartzError::value(format!(
                "asm: :bytecode must be a tuple or array, got {}",
                other.type_name()
            )))
        }
    };

    let mut code = Vec::with_capacity(forms.len());
    let mut next_slot = 0u32;
    for form in &forms {
        code.push(parse_instruction(form, &mut next_slot)?);
    }

    let implied = if vararg {
        arity.min() + 1
    } else {
        arity.max().unwrap_or_else(|| arity.min())
    };
    let slots = match int_field(&map, "slots")? {
        Some(n) => u32::try_from(n)
            .map_err(|_| QuartzError::range(format!("asm: :slots {n} out of range")))?,
        None => next_slot.max(implied),
    };

    let def = quartz_asm::assemble(&name, doc.as_deref(), arity, flags, slots, &code)?;
    Ok(Value::from(Callable::Thunk(def)))
}

fn resolve_arity(map: &ValueMap, vararg: bool) -> Result<Arity> {
    let exact = int_field(map, "arity")?;
    let min = int_field(map, "min-arity")?.or(exact).unwrap_or(0);
    let max = match int_field(map, "max-arity")? {
        Some(m) => Some(m),
        None if vararg => None,
        None => exact.or(Some(min)),
    };
    let min = u32::try_from(min)
        .map_err(|_| QuartzError::range(format!("asm: arity {min} out of range")))?;
    match max {
        None => Ok(Arity::AtLeast(min)),
        Some(m) => {
            let m = u32::try_from(m)
                .map_err(|_| QuartzError::range(format!("asm: arity {m} out of range")))?;
            if m < min {
                Err(QuartzError::value(format!(
                    "asm: :max-arity {m} is below :min-arity {min}"
                )))
            } else if m == min {
                Ok(Arity::Exact(min))
            } else {
                Ok(Arity::Range(min, m))
            }
        }
    }
}

fn parse_instruction(form: &Value, next_slot: &mut u32) -> Result<Instruction> {
    let items: Vec<Value> = match form {
        Value::Tuple(items) => items.to_vec(),
        Value::Array(items) => items.read().clone(),
        other => {
            return Err(QuartzError::value(format!(
                "asm: instruction must be a tuple, got {}",
                other.type_name()
            )))
        }
    };
    let Some(head) = items.first() else {
        return Err(QuartzError::value("asm: empty instruction"));
    };
    let name = match head {
        Value::Str(s) => s.clone(),
        Value::Symbol(s) => s.clone(),
        Value::Keyword(s) => s.clone(),
        other => {
            return Err(QuartzError::value(format!(
                "asm: opcode name must be a string, got {}",
                other.type_name()
            )))
        }
    };
    let Some(op) = Opcode::from_name(&name) else {
        return Err(QuartzError::value(format!("asm: unknown opcode {name}")));
    };

    let operands = &items[1..];
    let want = match op.layout() {
        Layout::Zero => 0,
        Layout::S | Layout::L => 1,
        Layout::SS | Layout::SI | Layout::SU | Layout::SL => 2,
        Layout::SSS | Layout::SSI | Layout::SSU => 3,
    };
    if operands.len() != want {
        return Err(QuartzError::value(format!(
            "asm: {} expects {} operands, got {}",
            op.name(),
            want,
            operands.len()
        )));
    }

    let slot = |index: usize, next_slot: &mut u32| -> Result<u8> {
        let raw = int_operand(op, operands, index)?;
        let slot = u8::try_from(raw).map_err(|_| {
            QuartzError::range(format!("asm: {} slot {raw} out of range", op.name()))
        })?;
        *next_slot = (*next_slot).max(u32::from(slot) + 1);
        Ok(slot)
    };

    match op.layout() {
        Layout::Zero => Ok(Instruction::zero(op)),
        Layout::S => Ok(Instruction::s(op, slot(0, next_slot)?)),
        Layout::SS => {
            let a = slot(0, next_slot)?;
            let b = slot(1, next_slot)?;
            Ok(Instruction::ss(op, a, b))
        }
        Layout::SSS => {
            let a = slot(0, next_slot)?;
            let b = slot(1, next_slot)?;
            let c = slot(2, next_slot)?;
            Ok(Instruction::sss(op, a, b, c))
        }
        Layout::SI => {
            let a = slot(0, next_slot)?;
            let imm = immediate::<i16>(op, operands, 1)?;
            Ok(Instruction::si(op, a, imm))
        }
        Layout::SSI => {
            let a = slot(0, next_slot)?;
            let b = slot(1, next_slot)?;
            let imm = immediate::<i8>(op, operands, 2)?;
            Ok(Instruction::ssi(op, a, b, imm))
        }
        Layout::SSU => {
            let a = slot(0, next_slot)?;
            let b = slot(1, next_slot)?;
            let imm = immediate::<u8>(op, operands, 2)?;
            Ok(Instruction::ssu(op, a, b, imm))
        }
        Layout::SU => {
            let a = slot(0, next_slot)?;
            let imm = immediate::<u8>(op, operands, 1)?;
            Ok(Instruction::su(op, a, imm))
        }
        Layout::SL => {
            let a = slot(0, next_slot)?;
            let offset = immediate::<i16>(op, operands, 1)?;
            Ok(Instruction::sl(op, a, offset))
        }
        Layout::L => {
            let offset = int_operand(op, operands, 0)?;
            if !(-(1 << 23)..1 << 23).contains(&offset) {
                return Err(QuartzError::range(format!(
                    "asm: jump offset {offset} out of range"
                )));
            }
            Ok(Instruction::l(op, offset as i32))
        }
    }
}

fn int_operand(op: Opcode, operands: &[Value], index: usize) -> Result<i64> {
    operands[index].as_integer().ok_or_else(|| {
        QuartzError::value(format!(
            "asm: {} operand {} must be an integer, got {}",
            op.name(),
            index,
            operands[index].type_name()
        ))
    })
}

fn immediate<T: TryFrom<i64>>(op: Opcode, operands: &[Value], index: usize) -> Result<T> {
    let raw = int_operand(op, operands, index)?;
    T::try_from(raw).map_err(|_| {
        QuartzError::range(format!(
            "asm: {} immediate {raw} out of range",
            op.name()
        ))
    })
}

// ======================================================================
// disasm
// ======================================================================

fn asm_disasm(arguments: &[Value]) -> Result<Value> {
    args::fixarity("disasm", arguments, 1)?;
    match args::callable("disasm", arguments, 0)? {
        Callable::Thunk(def) => Ok(Value::from(quartz_asm::disassemble(&def))),
        other => Err(QuartzError::value(format!(
            "disasm expects a bytecode function, got a {}",
            other.kind_name()
        ))),
    }
}

// ======================================================================
// Field access
// ======================================================================

fn spec_map(value: &Value) -> Result<ValueMap> {
    match value {
        Value::Struct(map) => Ok((**map).clone()),
        Value::Table(map) => Ok(map.read().clone()),
        other => Err(QuartzError::value(format!(
            "asm expects a struct or table, got {}",
            other.type_name()
        ))),
    }
}

fn field(map: &ValueMap, key: &str) -> Option<Value> {
    map.get(&Value::keyword(key)).cloned()
}

fn int_field(map: &ValueMap, key: &str) -> Result<Option<i64>> {
    match field(map, key) {
        None | Some(Value::Nil) => Ok(None),
        Some(value) => match value.as_integer() {
            Some(n) => Ok(Some(n)),
            None => Err(QuartzError::value(format!(
                "asm: :{key} must be an integer, got {}",
                value.type_name()
            ))),
        },
    }
}

fn text_field(map: &ValueMap, key: &str) -> Result<Option<String>> {
    match field(map, key) {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Str(s)) | Some(Value::Symbol(s)) | Some(Value::Keyword(s)) => {
            Ok(Some(s.to_string()))
        }
        Some(other) => Err(QuartzError::value(format!(
            "asm: :{key} must be a string, got {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp;

    fn inst(parts: &[Value]) -> Value {
        Value::tuple(parts.to_vec())
    }

    fn spec(pairs: &[(&str, Value)]) -> Value {
        let mut map = ValueMap::default();
        for (key, value) in pairs {
            map.insert(Value::keyword(key), value.clone());
        }
        Value::structure(map)
    }

    #[test]
    fn assembles_a_callable_adder() {
        let bytecode = Value::tuple(vec![
            inst(&[Value::from("add"), Value::Number(0.0), Value::Number(0.0), Value::Number(1.0)]),
            inst(&[Value::from("return"), Value::Number(0.0)]),
        ]);
        let spec = spec(&[
            ("name", Value::from("my-add")),
            ("arity", Value::Number(2.0)),
            ("bytecode", bytecode),
        ]);
        let fun = asm_assemble(&[spec]).unwrap();
        let sum = interp::call(&fun, &[Value::Number(40.0), Value::Number(2.0)]).unwrap();
        assert_eq!(sum, Value::Number(42.0));
    }

    #[test]
    fn frames_are_sized_from_the_code_when_slots_is_omitted() {
        let bytecode = Value::tuple(vec![
            inst(&[Value::from("load-integer"), Value::Number(5.0), Value::Number(9.0)]),
            inst(&[Value::from("return"), Value::Number(5.0)]),
        ]);
        let spec = spec(&[("name", Value::from("nine")), ("bytecode", bytecode)]);
        let fun = asm_assemble(&[spec]).unwrap();
        let Some(Callable::Thunk(def)) = fun.as_callable() else {
            panic!("expected a thunk");
        };
        assert_eq!(def.slot_count(), 6);
        assert_eq!(interp::call(&fun, &[]).unwrap(), Value::Number(9.0));
    }

    #[test]
    fn assembled_code_still_passes_the_verifier() {
        let bytecode = Value::tuple(vec![
            inst(&[Value::from("return"), Value::Number(7.0)]),
        ]);
        let spec = spec(&[
            ("name", Value::from("bad")),
            ("slots", Value::Number(1.0)),
            ("bytecode", bytecode),
        ]);
        let err = asm_assemble(&[spec]).unwrap_err();
        assert!(err.to_string().contains("slot 7"));
    }

    #[test]
    fn malformed_specs_are_rejected() {
        let missing = spec(&[("name", Value::from("empty"))]);
        let err = asm_assemble(&[missing]).unwrap_err();
        assert!(err.to_string().contains(":bytecode"));

        let unknown = spec(&[(
            "bytecode",
            Value::tuple(vec![inst(&[Value::from("warp"), Value::Number(0.0)])]),
        )]);
        let err = asm_assemble(&[unknown]).unwrap_err();
        assert!(err.to_string().contains("unknown opcode warp"));

        let short = spec(&[(
            "bytecode",
            Value::tuple(vec![inst(&[Value::from("add"), Value::Number(0.0)])]),
        )]);
        let err = asm_assemble(&[short]).unwrap_err();
        assert!(err.to_string().contains("expects 3 operands"));
    }

    #[test]
    fn vararg_specs_build_open_arities() {
        let bytecode = Value::tuple(vec![
            inst(&[Value::from("return"), Value::Number(1.0)]),
        ]);
        let spec = spec(&[
            ("name", Value::from("rest")),
            ("arity", Value::Number(1.0)),
            ("vararg", Value::Boolean(true)),
            ("bytecode", bytecode),
        ]);
        let fun = asm_assemble(&[spec]).unwrap();
        let Some(Callable::Thunk(def)) = fun.as_callable() else {
            panic!("expected a thunk");
        };
        assert_eq!(def.arity(), Arity::AtLeast(1));
        assert!(def.is_vararg());
        let rest = interp::call(
            &fun,
            &[Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)],
        )
        .unwrap();
        assert_eq!(
            rest,
            Value::tuple(vec![Value::Number(1.0), Value::Number(2.0)])
        );
    }

    #[test]
    fn disasm_lists_the_assembled_program() {
        let bytecode = Value::tuple(vec![
            inst(&[Value::from("load-true"), Value::Number(0.0)]),
            inst(&[Value::from("return"), Value::Number(0.0)]),
        ]);
        let spec = spec(&[("name", Value::from("truth")), ("bytecode", bytecode)]);
        let fun = asm_assemble(&[spec]).unwrap();
        let listing = asm_disasm(&[fun]).unwrap();
        let Value::Str(text) = listing else {
            panic!("expected a string listing");
        };
        assert!(text.contains("defn truth"));
        assert!(text.contains("load-true"));
    }
}
