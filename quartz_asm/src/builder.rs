//! Program builder for bytecode emission.
//!
//! The `ProgramBuilder` provides a small API for constructing instruction
//! sequences with automatic label resolution. Jump offsets are relative to
//! the jump instruction's own index, so a branch at index 2 with offset +3
//! transfers control to index 5.

use quartz_core::{Instruction, Opcode, QuartzError, Result};

/// A label for jump targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

/// A reference to a label that needs patching once all positions are known.
#[derive(Debug)]
struct ForwardRef {
    /// Instruction index containing the jump.
    instruction_index: usize,
    /// The label being jumped to.
    label: Label,
    /// Opcode of the placeholder jump.
    op: Opcode,
    /// Condition slot for conditional jumps, unused for plain jumps.
    slot: u8,
}

/// Builder for constructing instruction sequences.
///
/// Non-branching instructions are emitted directly with [`ProgramBuilder::emit`];
/// branches go through the jump helpers and are patched during
/// [`ProgramBuilder::finish`].
pub struct ProgramBuilder {
    /// Emitted instructions.
    code: Vec<Instruction>,
    /// Label to instruction index, indexed by label id.
    labels: Vec<Option<usize>>,
    /// Jumps that need patching.
    forward_refs: Vec<ForwardRef>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: Vec::new(),
            forward_refs: Vec::new(),
        }
    }

    /// Number of instructions emitted so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Create a new label for a jump target.
    pub fn create_label(&mut self) -> Label {
        let label = Label(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    /// Mark the current position as the target for a label.
    pub fn bind_label(&mut self, label: Label) {
        let pc = self.code.len();
        self.labels[label.0 as usize] = Some(pc);
    }

    /// Create a label already bound to the current position.
    pub fn here(&mut self) -> Label {
        let label = self.create_label();
        self.bind_label(label);
        label
    }

    // =========================================================================
    // Instruction emission
    // =========================================================================

    /// Emit a raw instruction and return its index.
    #[inline]
    pub fn emit(&mut self, inst: Instruction) -> usize {
        let index = self.code.len();
        self.code.push(inst);
        index
    }

    /// Unconditional jump to a label.
    pub fn emit_jump(&mut self, label: Label) {
        let instruction_index = self.code.len();
        // Placeholder offset, patched in finish().
        self.emit(Instruction::l(Opcode::Jump, 0));
        self.forward_refs.push(ForwardRef {
            instruction_index,
            label,
            op: Opcode::Jump,
            slot: 0,
        });
    }

    /// Jump to a label if the slot holds a truthy value.
    pub fn emit_jump_if(&mut self, slot: u8, label: Label) {
        self.emit_branch(Opcode::JumpIf, slot, label);
    }

    /// Jump to a label if the slot holds a falsy value.
    pub fn emit_jump_if_not(&mut self, slot: u8, label: Label) {
        self.emit_branch(Opcode::JumpIfNot, slot, label);
    }

    fn emit_branch(&mut self, op: Opcode, slot: u8, label: Label) {
        let instruction_index = self.code.len();
        self.emit(Instruction::sl(op, slot, 0));
        self.forward_refs.push(ForwardRef {
            instruction_index,
            label,
            op,
            slot,
        });
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Finish building, patching every jump against its bound label.
    ///
    /// Fails if a jump targets a label that was never bound, or if a patched
    /// offset does not fit the instruction's encoding.
    pub fn finish(mut self) -> Result<Box<[Instruction]>> {
        for fwd in &self.forward_refs {
            let target = self.labels[fwd.label.0 as usize].ok_or_else(|| {
                QuartzError::value(format!(
                    "jump at index {} targets an unbound label",
                    fwd.instruction_index
                ))
            })?;
            let offset = target as i64 - fwd.instruction_index as i64;
            let patched = match fwd.op {
                Opcode::Jump => {
                    if !(-(1 << 23)..(1 << 23)).contains(&offset) {
                        return Err(QuartzError::range(format!(
                            "jump offset {offset} does not fit in 24 bits"
                        )));
                    }
                    Instruction::l(fwd.op, offset as i32)
                }
                _ => {
                    if i16::try_from(offset).is_err() {
                        return Err(QuartzError::range(format!(
                            "jump offset {offset} does not fit in 16 bits"
                        )));
                    }
                    Instruction::sl(fwd.op, fwd.slot, offset as i16)
                }
            };
            self.code[fwd.instruction_index] = patched;
        }
        Ok(self.code.into_boxed_slice())
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_branch_is_patched() {
        let mut b = ProgramBuilder::new();
        b.emit(Instruction::ss(Opcode::Length, 1, 0));
        let done = b.create_label();
        b.emit_jump_if_not(1, done);
        b.emit(Instruction::zero(Opcode::ReturnNil));
        b.bind_label(done);
        b.emit(Instruction::s(Opcode::Return, 1));
        let code = b.finish().unwrap();

        assert_eq!(code.len(), 4);
        assert_eq!(code[1].opcode(), Some(Opcode::JumpIfNot));
        assert_eq!(code[1].a(), 1);
        assert_eq!(code[1].offset16(), 2); // index 1 -> index 3
    }

    #[test]
    fn backward_branch_is_negative() {
        let mut b = ProgramBuilder::new();
        let top = b.here();
        b.emit(Instruction::ssi(Opcode::AddImmediate, 0, 0, 1));
        b.emit(Instruction::sss(Opcode::Equals, 1, 0, 2));
        b.emit_jump_if_not(1, top);
        b.emit(Instruction::s(Opcode::Return, 0));
        let code = b.finish().unwrap();

        assert_eq!(code[2].opcode(), Some(Opcode::JumpIfNot));
        assert_eq!(code[2].offset16(), -2);
    }

    #[test]
    fn plain_jump_uses_wide_offset() {
        let mut b = ProgramBuilder::new();
        let target = b.create_label();
        b.emit_jump(target);
        b.emit(Instruction::zero(Opcode::ReturnNil));
        b.bind_label(target);
        b.emit(Instruction::zero(Opcode::ReturnNil));
        let code = b.finish().unwrap();

        assert_eq!(code[0].opcode(), Some(Opcode::Jump));
        assert_eq!(code[0].offset24(), 2);
    }

    #[test]
    fn unbound_label_is_an_error() {
        let mut b = ProgramBuilder::new();
        let nowhere = b.create_label();
        b.emit_jump(nowhere);
        let err = b.finish().unwrap_err();
        assert!(err.to_string().contains("unbound label"));
    }

    #[test]
    fn two_labels_may_share_a_position() {
        let mut b = ProgramBuilder::new();
        let one = b.create_label();
        let two = b.create_label();
        b.emit_jump_if(0, one);
        b.emit_jump_if(0, two);
        b.bind_label(one);
        b.bind_label(two);
        b.emit(Instruction::zero(Opcode::ReturnNil));
        let code = b.finish().unwrap();

        assert_eq!(code[0].offset16(), 2);
        assert_eq!(code[1].offset16(), 1);
    }
}
