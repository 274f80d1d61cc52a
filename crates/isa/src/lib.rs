//! The machine contract shared by the assembler and the emulator: opcode encoding, condition-code
//! bits, register encoding, and the syscall number table.
//!
//! This crate is pure data and lookup logic; it performs no I/O and allocates nothing beyond the
//! static tables below, so both `robco-asm` (which looks opcodes up by mnemonic) and `robco-emu`
//! (which looks them up by opcode byte) can depend on it without pulling in unrelated machinery.

#![forbid(unsafe_code)]

use bitflags::bitflags;

pub mod opcode;
pub mod syscall;

pub use opcode::{AccessMode, OpcodeEntry, Signedness, SymbolType, find_by_mnemonic, find_by_opcode};

/// Low-bit family selectors shared by the opcode table and the emulator's decoder.
pub mod family {
    pub const ALU_INST_BASE: u8 = 0x80;
    pub const FLOW_INST_BASE: u8 = 0x60;
    pub const OTHER_INST_BASE: u8 = 0x40;
    pub const STACK_INST_BASE: u8 = 0x00;

    /// Only meaningful for ALU and stack instructions: selects 8-bit vs 16-bit operation.
    pub const WIDTH_BIT: u8 = 0x20;

    #[must_use]
    #[inline]
    pub const fn is_alu(opcode: u8) -> bool {
        (opcode & 0xE0) == ALU_INST_BASE
    }

    #[must_use]
    #[inline]
    pub const fn is_stack(opcode: u8) -> bool {
        (opcode & 0xC0) == STACK_INST_BASE
    }

    /// Register-indexed stack operations set the `REGISTER_INDEXED` bit and clear `OTHER`, and are
    /// distinguished from the plain stack-to-register opcodes (`pushdp`, `pushx`, ...) which only
    /// set the register-select bits directly.
    #[must_use]
    #[inline]
    pub const fn is_register_indexed(opcode: u8) -> bool {
        is_stack(opcode)
            && (opcode & opcode::OP_STACK_REGISTER_INDEXED) != 0
            && (opcode & opcode::OP_STACK_OTHER) == 0
    }

    /// True for the conditional/unconditional short-displacement branch family. `jmp`/`jsr`/`rts`/
    /// `syscall` share the flow base but set [`opcode::OP_FLOW_UNSIGNED`] and are excluded here.
    #[must_use]
    #[inline]
    pub const fn is_branch(opcode: u8) -> bool {
        (opcode & opcode::OP_FLOW_UNSIGNED) == 0 && (opcode & 0xE0) == FLOW_INST_BASE
    }
}

bitflags! {
    /// The one-byte condition-code register. Bit assignments are fixed by the ABI and must not be
    /// renumbered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConditionCode: u8 {
        const OVERFLOW  = 0x01;
        const NEGATIVE  = 0x02;
        const CARRY     = 0x04;
        const ZERO      = 0x08;
        const UNDERFLOW = 0x10;
        const DIV0      = 0x20;
    }
}

impl ConditionCode {
    /// Recomputes the Zero/Negative flags from a 16-bit result, leaving Carry/Overflow/Div0/
    /// Underflow untouched (callers set those explicitly from the operation that produced `result`).
    #[must_use]
    pub fn with_zero_negative(self, result: u16, width_bits: u32) -> Self {
        let mut flags = self - (Self::ZERO | Self::NEGATIVE);
        if result == 0 {
            flags |= Self::ZERO;
        }
        let sign_bit = 1u16 << (width_bits - 1);
        if result & sign_bit != 0 {
            flags |= Self::NEGATIVE;
        }
        flags
    }
}

/// Register encodings used by both the register-indexed stack opcodes and the plain
/// stack-to-register opcodes (`pushdp`/`pushx`/`pulldp`/`pullx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// The data-pointer register, one byte wide.
    Dp,
    /// The index register, two bytes wide.
    X,
}

impl Register {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dp => opcode::OP_STACK_AND_DP,
            Self::X => opcode::OP_STACK_AND_X,
        }
    }

    #[must_use]
    pub const fn width_bytes(self) -> u8 {
        match self {
            Self::Dp => 1,
            Self::X => 2,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "dp" => Some(Self::Dp),
            "x" => Some(Self::X),
            _ => None,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            x if x == opcode::OP_STACK_AND_DP => Some(Self::Dp),
            x if x == opcode::OP_STACK_AND_X => Some(Self::X),
            _ => None,
        }
    }
}

/// Branch condition gated by the opcode's low nibble. See [`BranchCondition::is_satisfied`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCondition {
    Unconditional,
    Equal,
    LessThan,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Carry,
    Overflow,
    DivideByZero,
}

impl BranchCondition {
    #[must_use]
    pub const fn from_opcode(opcode: u8) -> Option<Self> {
        if !family::is_branch(opcode) {
            return None;
        }
        match opcode & opcode::OP_BRANCH_COMPARE_MASK {
            opcode::OP_BRANCH_UNCONDITIONAL => Some(Self::Unconditional),
            opcode::OP_BRANCH_EQUAL => Some(Self::Equal),
            opcode::OP_BRANCH_LESS_THAN => Some(Self::LessThan),
            opcode::OP_BRANCH_LESS_THAN_EQUAL => Some(Self::LessOrEqual),
            opcode::OP_BRANCH_GREATER => Some(Self::Greater),
            opcode::OP_BRANCH_GREATER_EQUAL => Some(Self::GreaterOrEqual),
            opcode::OP_BRANCH_CARRY => Some(Self::Carry),
            opcode::OP_BRANCH_OVERFLOW => Some(Self::Overflow),
            opcode::OP_BRANCH_DIVIDE_BY_ZERO => Some(Self::DivideByZero),
            _ => None,
        }
    }

    /// Evaluates the condition against the current condition-code register. Signed relational
    /// conditions follow the standard `N xor OV` construction the spec calls out for `LT`.
    #[must_use]
    pub fn is_satisfied(self, cc: ConditionCode) -> bool {
        let zero = cc.contains(ConditionCode::ZERO);
        let negative = cc.contains(ConditionCode::NEGATIVE);
        let overflow = cc.contains(ConditionCode::OVERFLOW);
        let less_than = negative ^ overflow;
        match self {
            Self::Unconditional => true,
            Self::Equal => zero,
            Self::LessThan => less_than,
            Self::LessOrEqual => less_than || zero,
            Self::Greater => !less_than && !zero,
            Self::GreaterOrEqual => !less_than,
            Self::Carry => cc.contains(ConditionCode::CARRY),
            Self::Overflow => overflow,
            Self::DivideByZero => cc.contains(ConditionCode::DIV0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_conditions_decode_from_flow_opcodes() {
        assert_eq!(BranchCondition::from_opcode(0x60), Some(BranchCondition::Unconditional));
        assert_eq!(BranchCondition::from_opcode(0x68), Some(BranchCondition::Equal));
        assert_eq!(BranchCondition::from_opcode(0x6F), Some(BranchCondition::DivideByZero));
        // jmp/jsr/rts/syscall set the unsigned-family bit and are not branches.
        assert_eq!(BranchCondition::from_opcode(0x70), None);
        assert_eq!(BranchCondition::from_opcode(0x7F), None);
    }

    #[test]
    fn less_than_uses_negative_xor_overflow() {
        let cc = ConditionCode::NEGATIVE;
        assert!(BranchCondition::LessThan.is_satisfied(cc));
        let cc = ConditionCode::NEGATIVE | ConditionCode::OVERFLOW;
        assert!(!BranchCondition::LessThan.is_satisfied(cc));
    }

    #[test]
    fn register_codes_round_trip() {
        assert_eq!(Register::from_code(Register::Dp.code()), Some(Register::Dp));
        assert_eq!(Register::from_code(Register::X.code()), Some(Register::X));
    }
}
