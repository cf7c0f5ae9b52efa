//! Human-readable listings of assembled definitions.

use std::fmt::Write;

use quartz_core::{Definition, Instruction, Layout};

/// Disassemble a definition to a string, one instruction per line.
pub fn disassemble(def: &Definition) -> String {
    let mut output = String::new();

    let vararg = if def.is_vararg() { ", vararg" } else { "" };
    writeln!(
        output,
        "defn {} (arity {}, slots {}{vararg})",
        def.name(),
        def.arity(),
        def.slot_count()
    )
    .unwrap();
    if let Some(doc) = def.doc() {
        writeln!(output, "  ; {}", doc.lines().next().unwrap_or_default()).unwrap();
    }
    output.push_str(&listing(def.code()));
    output
}

/// Disassemble a bare instruction sequence.
pub fn listing(code: &[Instruction]) -> String {
    let mut output = String::new();
    for (index, inst) in code.iter().enumerate() {
        write!(output, "  {index:4}: {inst}").unwrap();
        if let Some(target) = jump_target(index, *inst) {
            write!(output, "  ; -> {target}").unwrap();
        }
        output.push('\n');
    }
    output
}

fn jump_target(index: usize, inst: Instruction) -> Option<i64> {
    let op = inst.opcode()?;
    match op.layout() {
        Layout::SL => Some(index as i64 + i64::from(inst.offset16())),
        Layout::L => Some(index as i64 + i64::from(inst.offset24())),
        _ => None,
    }
}
