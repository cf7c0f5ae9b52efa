//! Static checks over assembled instruction sequences.
//!
//! Verification runs before a program is wrapped in a definition. It rejects
//! words with unknown opcodes, slot operands outside the declared frame, and
//! jumps that leave the program. A verified program can still fail at run
//! time (type errors, raised errors), but it can never index a frame out of
//! bounds or land the instruction pointer outside the code.

use quartz_core::{Instruction, Layout, QuartzError, Result};

/// Slots are addressed by a single byte.
pub const MAX_SLOTS: u32 = 256;

/// Check a program against its declared slot count.
pub fn verify(code: &[Instruction], slot_count: u32) -> Result<()> {
    if code.is_empty() {
        return Err(QuartzError::value("program has no instructions"));
    }
    if slot_count > MAX_SLOTS {
        return Err(QuartzError::range(format!(
            "slot count {slot_count} exceeds the limit of {MAX_SLOTS}"
        )));
    }
    let len = code.len() as i64;
    for (index, inst) in code.iter().enumerate() {
        let op = inst.opcode().ok_or_else(|| {
            QuartzError::value(format!(
                "unknown opcode {:#04x} at index {index}",
                inst.word() & 0xff
            ))
        })?;
        let slots: &[u8] = match op.layout() {
            Layout::Zero | Layout::L => &[],
            Layout::S | Layout::SI | Layout::SU | Layout::SL => &[inst.a()],
            Layout::SS | Layout::SSI | Layout::SSU => &[inst.a(), inst.b()],
            Layout::SSS => &[inst.a(), inst.b(), inst.c()],
        };
        for &slot in slots {
            if u32::from(slot) >= slot_count {
                return Err(QuartzError::range(format!(
                    "{} at index {index} uses slot {slot}, frame has {slot_count}",
                    op.name()
                )));
            }
        }
        let target = match op.layout() {
            Layout::SL => Some(index as i64 + i64::from(inst.offset16())),
            Layout::L => Some(index as i64 + i64::from(inst.offset24())),
            _ => None,
        };
        if let Some(target) = target {
            if target < 0 || target >= len {
                return Err(QuartzError::range(format!(
                    "{} at index {index} jumps to {target}, program has {len} instructions",
                    op.name()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartz_core::Opcode;

    #[test]
    fn accepts_a_minimal_program() {
        let code = [Instruction::zero(Opcode::ReturnNil)];
        assert!(verify(&code, 0).is_ok());
    }

    #[test]
    fn rejects_empty_code() {
        let err = verify(&[], 1).unwrap_err();
        assert!(err.to_string().contains("no instructions"));
    }

    #[test]
    fn rejects_unknown_opcodes() {
        let code = [Instruction::from_word(0xff)];
        let err = verify(&code, 1).unwrap_err();
        assert!(err.to_string().contains("unknown opcode"));
    }

    #[test]
    fn rejects_slots_outside_the_frame() {
        let code = [
            Instruction::sss(Opcode::Add, 0, 1, 5),
            Instruction::s(Opcode::Return, 0),
        ];
        let err = verify(&code, 3).unwrap_err();
        assert!(err.to_string().contains("slot 5"));
    }

    #[test]
    fn rejects_jumps_out_of_bounds() {
        let code = [
            Instruction::sl(Opcode::JumpIfNot, 0, 7),
            Instruction::zero(Opcode::ReturnNil),
        ];
        let err = verify(&code, 1).unwrap_err();
        assert!(err.to_string().contains("jumps to 7"));

        let code = [
            Instruction::l(Opcode::Jump, -3),
            Instruction::zero(Opcode::ReturnNil),
        ];
        assert!(verify(&code, 1).is_err());
    }

    #[test]
    fn rejects_oversized_frames() {
        let code = [Instruction::zero(Opcode::ReturnNil)];
        assert!(verify(&code, 257).is_err());
        assert!(verify(&code, 256).is_ok());
    }
}
