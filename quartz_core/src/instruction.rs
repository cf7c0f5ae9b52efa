//! Packed 32-bit instruction words and their encoder.
//!
//! The lowest byte of every word is the opcode; the remaining three bytes
//! hold operands in a layout determined by the opcode alone. The constructors
//! below are the only place shift-and-mask arithmetic appears: template code
//! and the assembler never touch raw words.
//!
//! Jump offsets are measured in instruction words and are relative to the
//! index of the jump itself, so `target = jump_index + offset`.

use std::fmt;

/// Operand layout of an opcode.
///
/// `SI` and `SL` pack identically (slot byte plus a signed 16-bit field);
/// they are distinguished so disassembly can tell an immediate from a jump
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// No operands.
    Zero,
    /// One slot.
    S,
    /// Two slots.
    SS,
    /// Three slots.
    SSS,
    /// Slot and a signed 16-bit immediate.
    SI,
    /// Two slots and a signed 8-bit immediate.
    SSI,
    /// Two slots and an unsigned 8-bit immediate.
    SSU,
    /// Slot and an unsigned 8-bit immediate (byte 2 unused).
    SU,
    /// Slot and a signed 16-bit jump offset.
    SL,
    /// Signed 24-bit jump offset.
    L,
}

macro_rules! opcodes {
    ($($name:ident = $byte:literal, $text:literal, $layout:ident;)*) => {
        /// Every opcode the machine understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $byte,)*
        }

        impl Opcode {
            /// Decode the low byte of a word.
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Look an opcode up by its assembly name.
            pub fn from_name(name: &str) -> Option<Opcode> {
                match name {
                    $($text => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Assembly name.
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$name => $text,)*
                }
            }

            /// Operand layout.
            pub fn layout(self) -> Layout {
                match self {
                    $(Opcode::$name => Layout::$layout,)*
                }
            }
        }
    };
}

opcodes! {
    Noop = 0, "noop", Zero;
    ReturnNil = 1, "return-nil", Zero;
    Return = 2, "return", S;
    Error = 3, "error", S;
    Push = 4, "push", S;
    PushArray = 5, "push-array", S;
    Tailcall = 6, "tailcall", S;
    LoadNil = 7, "load-nil", S;
    LoadTrue = 8, "load-true", S;
    LoadFalse = 9, "load-false", S;
    Move = 10, "move", SS;
    Length = 11, "length", SS;
    BitNot = 12, "bnot", SS;
    Call = 13, "call", SS;
    LoadInteger = 14, "load-integer", SI;
    Signal = 15, "signal", SU;
    Jump = 16, "jump", L;
    JumpIf = 17, "jump-if", SL;
    JumpIfNot = 18, "jump-if-not", SL;
    AddImmediate = 19, "add-immediate", SSI;
    EqualsImmediate = 20, "equals-immediate", SSI;
    LessThanImmediate = 21, "less-than-immediate", SSI;
    GetIndex = 22, "get-index", SSU;
    Get = 23, "get", SSS;
    Put = 24, "put", SSS;
    Add = 25, "add", SSS;
    Subtract = 26, "subtract", SSS;
    Multiply = 27, "multiply", SSS;
    Divide = 28, "divide", SSS;
    BitAnd = 29, "band", SSS;
    BitOr = 30, "bor", SSS;
    BitXor = 31, "bxor", SSS;
    ShiftLeft = 32, "shift-left", SSS;
    ShiftRight = 33, "shift-right", SSS;
    ShiftRightUnsigned = 34, "shift-right-unsigned", SSS;
    Equals = 35, "equals", SSS;
    LessThan = 36, "less-than", SSS;
    GreaterThan = 37, "greater-than", SSS;
    NumericEqual = 38, "numeric-equal", SSS;
    NumericLessThan = 39, "numeric-less-than", SSS;
    NumericGreaterThan = 40, "numeric-greater-than", SSS;
    NumericLessThanEqual = 41, "numeric-less-than-equal", SSS;
    NumericGreaterThanEqual = 42, "numeric-greater-than-equal", SSS;
    Resume = 43, "resume", SSS;
}

/// One packed instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u32);

impl Instruction {
    #[inline]
    pub const fn from_word(word: u32) -> Instruction {
        Instruction(word)
    }

    #[inline]
    pub const fn word(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn opcode(self) -> Option<Opcode> {
        Opcode::from_byte((self.0 & 0xff) as u8)
    }

    // ------------------------------------------------------------------
    // Encoder
    // ------------------------------------------------------------------

    #[inline]
    pub const fn zero(op: Opcode) -> Instruction {
        Instruction(op as u32)
    }

    #[inline]
    pub const fn s(op: Opcode, a: u8) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8)
    }

    #[inline]
    pub const fn ss(op: Opcode, a: u8, b: u8) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (b as u32) << 16)
    }

    #[inline]
    pub const fn sss(op: Opcode, a: u8, b: u8, c: u8) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24)
    }

    #[inline]
    pub const fn si(op: Opcode, a: u8, imm: i16) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (imm as u16 as u32) << 16)
    }

    #[inline]
    pub const fn ssi(op: Opcode, a: u8, b: u8, imm: i8) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (imm as u8 as u32) << 24)
    }

    #[inline]
    pub const fn ssu(op: Opcode, a: u8, b: u8, imm: u8) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (imm as u32) << 24)
    }

    #[inline]
    pub const fn su(op: Opcode, a: u8, imm: u8) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (imm as u32) << 24)
    }

    /// Slot plus signed 16-bit offset. The caller is responsible for range;
    /// the builder checks before patching.
    #[inline]
    pub const fn sl(op: Opcode, a: u8, offset: i16) -> Instruction {
        Instruction(op as u32 | (a as u32) << 8 | (offset as u16 as u32) << 16)
    }

    /// Signed 24-bit offset in bytes 1..=3.
    #[inline]
    pub const fn l(op: Opcode, offset: i32) -> Instruction {
        Instruction(op as u32 | ((offset as u32) & 0x00ff_ffff) << 8)
    }

    // ------------------------------------------------------------------
    // Decoder
    // ------------------------------------------------------------------

    /// First slot operand (byte 1).
    #[inline]
    pub fn a(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Second slot operand (byte 2).
    #[inline]
    pub fn b(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Third slot operand (byte 3).
    #[inline]
    pub fn c(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Signed 16-bit immediate in bytes 2..=3.
    #[inline]
    pub fn imm16(self) -> i16 {
        (self.0 >> 16) as u16 as i16
    }

    /// Signed 8-bit immediate in byte 3.
    #[inline]
    pub fn imm8(self) -> i8 {
        (self.0 >> 24) as u8 as i8
    }

    /// Unsigned 8-bit immediate in byte 3.
    #[inline]
    pub fn uimm8(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Jump offset for the `SL` layout.
    #[inline]
    pub fn offset16(self) -> i32 {
        self.imm16() as i32
    }

    /// Sign-extended 24-bit jump offset for the `L` layout.
    #[inline]
    pub fn offset24(self) -> i32 {
        (self.0 as i32) >> 8
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            return write!(f, "invalid {:#010x}", self.0);
        };
        match op.layout() {
            Layout::Zero => write!(f, "{}", op.name()),
            Layout::S => write!(f, "{} {}", op.name(), self.a()),
            Layout::SS => write!(f, "{} {} {}", op.name(), self.a(), self.b()),
            Layout::SSS => write!(f, "{} {} {} {}", op.name(), self.a(), self.b(), self.c()),
            Layout::SI => write!(f, "{} {} {}", op.name(), self.a(), self.imm16()),
            Layout::SSI => write!(f, "{} {} {} {}", op.name(), self.a(), self.b(), self.imm8()),
            Layout::SSU => write!(f, "{} {} {} {}", op.name(), self.a(), self.b(), self.uimm8()),
            Layout::SU => write!(f, "{} {} {}", op.name(), self.a(), self.uimm8()),
            Layout::SL => write!(f, "{} {} {}", op.name(), self.a(), self.offset16()),
            Layout::L => write!(f, "{} {}", op.name(), self.offset24()),
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_byte_roundtrip() {
        for byte in 0..=255u8 {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op as u8, byte);
                assert_eq!(Opcode::from_name(op.name()), Some(op));
            }
        }
    }

    #[test]
    fn sss_packs_per_byte() {
        let i = Instruction::sss(Opcode::Add, 3, 3, 4);
        assert_eq!(i.word(), Opcode::Add as u32 | 3 << 8 | 3 << 16 | 4 << 24);
        assert_eq!(i.opcode(), Some(Opcode::Add));
        assert_eq!((i.a(), i.b(), i.c()), (3, 3, 4));
    }

    #[test]
    fn negative_immediates_roundtrip() {
        let i = Instruction::si(Opcode::LoadInteger, 3, -1);
        assert_eq!(i.imm16(), -1);
        let i = Instruction::ssi(Opcode::AddImmediate, 5, 5, -7);
        assert_eq!(i.imm8(), -7);
        let i = Instruction::sl(Opcode::JumpIfNot, 2, -4);
        assert_eq!(i.offset16(), -4);
        assert_eq!(i.a(), 2);
    }

    #[test]
    fn jump_offset_24_bit_sign_extends() {
        let i = Instruction::l(Opcode::Jump, -5);
        assert_eq!(i.offset24(), -5);
        assert_eq!(i.opcode(), Some(Opcode::Jump));
        let far = Instruction::l(Opcode::Jump, 0x003f_0000);
        assert_eq!(far.offset24(), 0x003f_0000);
    }

    #[test]
    fn signal_word_matches_hand_packed_form() {
        // signal payload slot 0, signal number 3 in the top byte
        let i = Instruction::su(Opcode::Signal, 0, 3);
        assert_eq!(i.word(), Opcode::Signal as u32 | 3 << 24);
        assert_eq!(i.uimm8(), 3);
    }

    #[test]
    fn display_follows_layout() {
        assert_eq!(Instruction::zero(Opcode::ReturnNil).to_string(), "return-nil");
        assert_eq!(
            Instruction::sl(Opcode::JumpIfNot, 2, -4).to_string(),
            "jump-if-not 2 -4"
        );
        assert_eq!(
            Instruction::sss(Opcode::Get, 4, 0, 5).to_string(),
            "get 4 0 5"
        );
    }
}
