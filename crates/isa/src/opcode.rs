//! The static opcode table: the single source of truth for mnemonic <-> opcode byte <-> operand
//! shape, mirroring the historical `opcode_entries[]` table this machine's toolchain has always
//! shipped.

use crate::family::{ALU_INST_BASE, FLOW_INST_BASE, OTHER_INST_BASE, STACK_INST_BASE, WIDTH_BIT};

// Stack instruction bit layout.
pub const OP_STACK_PUSH: u8 = 0b0_0000;
pub const OP_STACK_PULL: u8 = 0b1_0000;
pub const OP_STACK_REGISTER_MASK: u8 = 0b0_0011;
pub const OP_STACK_AND_DP: u8 = 0b0_0001;
pub const OP_STACK_AND_X: u8 = 0b0_0010;
pub const OP_STACK_REGISTER_INDEXED: u8 = 0b0_1000;
pub const OP_STACK_OTHER: u8 = 0b0_0100;
pub const OP_STACK_TO_STACK: u8 = 0b0_0000;
pub const OP_STACK_MISC: u8 = 0b0_1000;
pub const OP_STACK_S: u8 = 0b0_0010;
pub const OP_STACK_R: u8 = 0b0_0001;
pub const OP_STACK_COPY: u8 = 0b1_0000;

/// Register-indexed post-byte flag bits: bit 7 selects pre- vs post-increment, the low seven bits
/// are a two's-complement adjustment magnitude.
pub const OP_STACK_INCREMENT_PRE: u8 = 0b1000_0000;

pub const OPCODE_PUSHI: u8 = STACK_INST_BASE + OP_STACK_PUSH;
pub const OPCODE_PUSHDP: u8 = STACK_INST_BASE + OP_STACK_PUSH + OP_STACK_AND_DP;
pub const OPCODE_PUSHX: u8 = STACK_INST_BASE + OP_STACK_PUSH + OP_STACK_AND_X + WIDTH_BIT;
pub const OPCODE_PUSH_INDEXED: u8 = STACK_INST_BASE + OP_STACK_PUSH + OP_STACK_REGISTER_INDEXED;
pub const OPCODE_PUSHDP_INDEXED: u8 = OPCODE_PUSH_INDEXED + OP_STACK_AND_DP;
pub const OPCODE_PUSHX_INDEXED: u8 = OPCODE_PUSH_INDEXED + OP_STACK_AND_X;
pub const OPCODE_POP: u8 = STACK_INST_BASE + OP_STACK_PULL;
pub const OPCODE_PULLDP: u8 = STACK_INST_BASE + OP_STACK_PULL + OP_STACK_AND_DP;
pub const OPCODE_PULLX: u8 = STACK_INST_BASE + OP_STACK_PULL + OP_STACK_AND_X + WIDTH_BIT;
pub const OPCODE_PULL_INDEXED: u8 = STACK_INST_BASE + OP_STACK_PULL + OP_STACK_REGISTER_INDEXED;
pub const OPCODE_PULLDP_INDEXED: u8 = OPCODE_PULL_INDEXED + OP_STACK_AND_DP;
pub const OPCODE_PULLX_INDEXED: u8 = OPCODE_PULL_INDEXED + OP_STACK_AND_X;
pub const OPCODE_MOVER: u8 = STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_TO_STACK + OP_STACK_R;
pub const OPCODE_MOVES: u8 = STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_TO_STACK + OP_STACK_S;
pub const OPCODE_COPYR: u8 =
    STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_TO_STACK + OP_STACK_R + OP_STACK_COPY;
pub const OPCODE_COPYS: u8 =
    STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_TO_STACK + OP_STACK_S + OP_STACK_COPY;
pub const OPCODE_DUP: u8 = STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_MISC + 0b0_0001;
pub const OPCODE_SWAP: u8 = STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_MISC + 0b0_0010;
pub const OPCODE_DEPTH: u8 = STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_MISC + 0b0_0011;
pub const OPCODE_ROLL: u8 = STACK_INST_BASE + OP_STACK_OTHER + OP_STACK_MISC + 0b1_0011;

// ALU instructions.
pub const OPCODE_ADD: u8 = ALU_INST_BASE + 0b1_0000;
pub const OPCODE_SUB: u8 = ALU_INST_BASE + 0b1_0001;
pub const OPCODE_MUL: u8 = ALU_INST_BASE + 0b0_0000;
pub const OPCODE_DIV: u8 = ALU_INST_BASE + 0b0_0001;
pub const OPCODE_INC: u8 = ALU_INST_BASE + 0b1_1000;
pub const OPCODE_DEC: u8 = ALU_INST_BASE + 0b1_1001;
pub const OPCODE_CMP: u8 = ALU_INST_BASE + 0b1_1010;
pub const OPCODE_OR: u8 = ALU_INST_BASE + 0b0_0010;
pub const OPCODE_AND: u8 = ALU_INST_BASE + 0b0_0011;
pub const OPCODE_SHL: u8 = ALU_INST_BASE + 0b0_0110;
pub const OPCODE_SHR: u8 = ALU_INST_BASE + 0b0_0111;

// Flow control.
pub const OP_FLOW_UNSIGNED: u8 = 0b1_0000;
pub const OP_BRANCH_COMPARE_MASK: u8 = 0b1111;
pub const OP_BRANCH_UNCONDITIONAL: u8 = 0b0000;
pub const OP_BRANCH_OVERFLOW: u8 = 0b0001;
pub const OP_BRANCH_LESS_THAN: u8 = 0b0010;
pub const OP_BRANCH_CARRY: u8 = 0b0100;
pub const OP_BRANCH_GREATER: u8 = 0b0101;
pub const OP_BRANCH_EQUAL: u8 = 0b1000;
pub const OP_BRANCH_LESS_THAN_EQUAL: u8 = 0b1010;
/// The historical opcode macro for `bge` additionally set [`OP_FLOW_UNSIGNED`], which would
/// misclassify it out of the branch family entirely and contradicts `GE` being a gated branch
/// condition. We drop that bit here; see `DESIGN.md`.
pub const OP_BRANCH_GREATER_EQUAL: u8 = 0b1101;
pub const OP_BRANCH_DIVIDE_BY_ZERO: u8 = 0b1111;

pub const OPCODE_B: u8 = FLOW_INST_BASE + OP_BRANCH_UNCONDITIONAL;
pub const OPCODE_BEQ: u8 = FLOW_INST_BASE + OP_BRANCH_EQUAL;
pub const OPCODE_BLT: u8 = FLOW_INST_BASE + OP_BRANCH_LESS_THAN;
pub const OPCODE_BLE: u8 = FLOW_INST_BASE + OP_BRANCH_LESS_THAN_EQUAL;
pub const OPCODE_BGT: u8 = FLOW_INST_BASE + OP_BRANCH_GREATER;
pub const OPCODE_BGE: u8 = FLOW_INST_BASE + OP_BRANCH_GREATER_EQUAL;
pub const OPCODE_BCR: u8 = FLOW_INST_BASE + OP_BRANCH_CARRY;
pub const OPCODE_BOV: u8 = FLOW_INST_BASE + OP_BRANCH_OVERFLOW;
pub const OPCODE_BDIV0: u8 = FLOW_INST_BASE + OP_BRANCH_DIVIDE_BY_ZERO;
pub const OPCODE_JMP: u8 = FLOW_INST_BASE + OP_FLOW_UNSIGNED + 0b0000;
pub const OPCODE_RTS: u8 = FLOW_INST_BASE + OP_FLOW_UNSIGNED + 0b0001;
pub const OPCODE_JSR: u8 = FLOW_INST_BASE + OP_FLOW_UNSIGNED + 0b0010;
pub const OPCODE_SYSCALL: u8 = FLOW_INST_BASE + OP_FLOW_UNSIGNED + 0b1111;

pub const OPCODE_SYNC: u8 = OTHER_INST_BASE + 0b1_1111;

/// A symbol's value shape, matching the assembler's type-checked reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    None,
    Word,
    Byte,
    AddressInst,
    AddressData,
}

/// Expected signedness of an operand or symbol reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Any,
    Unsigned,
    Signed,
}

/// How an instruction's operand bytes are produced and what context they need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// No operand bytes at all (`rts`, `sync`).
    None,
    /// The instruction takes its operands purely from the data stack; any assembler argument is
    /// an error.
    StackOnly,
    /// One or two operand bytes follow the opcode, either a literal or a symbol reference.
    ImmediateOperands,
    /// Plain (non-indexed) stack-to-register transfer; the register is baked into the opcode.
    StackToFromRegister,
    /// Register-indexed stack transfer; operand is a single post-byte encoding pre/post-increment.
    RegisterIndexed,
}

/// One row of the opcode table.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub mnemonic: &'static str,
    pub opcode: u8,
    /// Cycle cost; negative means computed at runtime (e.g. `roll` depends on its depth operand),
    /// zero means control has been ceded via `sync`/`syscall`.
    pub cycles: i32,
    pub arg_byte_count: u8,
    pub argument_type: SymbolType,
    pub access_mode: AccessMode,
    pub argument_signedness: Signedness,
}

macro_rules! entry {
    ($name:expr, $opcode:expr, $cycles:expr, $args:expr, $ty:expr, $mode:expr) => {
        entry!($name, $opcode, $cycles, $args, $ty, $mode, Signedness::Any)
    };
    ($name:expr, $opcode:expr, $cycles:expr, $args:expr, $ty:expr, $mode:expr, $sign:expr) => {
        OpcodeEntry {
            mnemonic: $name,
            opcode: $opcode,
            cycles: $cycles,
            arg_byte_count: $args,
            argument_type: $ty,
            access_mode: $mode,
            argument_signedness: $sign,
        }
    };
}

/// The static mnemonic table, in the order the assembler's error messages and `summary` dumps
/// should enumerate them.
pub static OPCODE_TABLE: &[OpcodeEntry] = &[
    // ALU
    entry!("add", OPCODE_ADD, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("addw", OPCODE_ADD + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("sub", OPCODE_SUB, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("subw", OPCODE_SUB + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("mul", OPCODE_MUL, 6, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("mulw", OPCODE_MUL + WIDTH_BIT, 10, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("div", OPCODE_DIV, 6, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("divw", OPCODE_DIV + WIDTH_BIT, 10, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("or", OPCODE_OR, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("orw", OPCODE_OR + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("and", OPCODE_AND, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("andw", OPCODE_AND + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("shr", OPCODE_SHR, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("shrw", OPCODE_SHR + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("shl", OPCODE_SHL, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("shlw", OPCODE_SHL + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("inc", OPCODE_INC, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("incw", OPCODE_INC + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("dec", OPCODE_DEC, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("decw", OPCODE_DEC + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("cmp", OPCODE_CMP, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("cmpw", OPCODE_CMP + WIDTH_BIT, 4, 0, SymbolType::None, AccessMode::StackOnly),
    // Stack
    entry!(
        "pushi",
        OPCODE_PUSHI,
        1,
        1,
        SymbolType::Byte,
        AccessMode::ImmediateOperands,
        Signedness::Any
    ),
    entry!(
        "pushiw",
        OPCODE_PUSHI + WIDTH_BIT,
        2,
        2,
        SymbolType::Word,
        AccessMode::ImmediateOperands,
        Signedness::Any
    ),
    entry!("pop", OPCODE_POP, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("popw", OPCODE_POP + WIDTH_BIT, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("dup", OPCODE_DUP, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("dupw", OPCODE_DUP + WIDTH_BIT, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("swap", OPCODE_SWAP, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("swapw", OPCODE_SWAP + WIDTH_BIT, 2, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("depth", OPCODE_DEPTH, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("roll", OPCODE_ROLL, -1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("rollw", OPCODE_ROLL + WIDTH_BIT, -1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("mover", OPCODE_MOVER, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("moves", OPCODE_MOVES, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("copyr", OPCODE_COPYR, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("copys", OPCODE_COPYS, 1, 0, SymbolType::None, AccessMode::StackOnly),
    entry!("pushdp", OPCODE_PUSHDP, 1, 0, SymbolType::None, AccessMode::StackToFromRegister),
    entry!("pushx", OPCODE_PUSHX, 2, 0, SymbolType::None, AccessMode::StackToFromRegister),
    entry!("pulldp", OPCODE_PULLDP, 1, 0, SymbolType::None, AccessMode::StackToFromRegister),
    entry!("pullx", OPCODE_PULLX, 2, 0, SymbolType::None, AccessMode::StackToFromRegister),
    // Register indexed: the assembler argument is the post-byte (increment amount/direction), the
    // register itself is selected by a separate `[ reg ]` syntax, not by distinct mnemonics.
    entry!("push", OPCODE_PUSH_INDEXED, 2, 1, SymbolType::None, AccessMode::RegisterIndexed),
    entry!(
        "pushw",
        OPCODE_PUSH_INDEXED + WIDTH_BIT,
        3,
        1,
        SymbolType::None,
        AccessMode::RegisterIndexed
    ),
    entry!("pull", OPCODE_PULL_INDEXED, 2, 1, SymbolType::None, AccessMode::RegisterIndexed),
    entry!(
        "pullw",
        OPCODE_PULL_INDEXED + WIDTH_BIT,
        3,
        1,
        SymbolType::None,
        AccessMode::RegisterIndexed
    ),
    // Flow
    entry!(
        "b",
        OPCODE_B,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "beq",
        OPCODE_BEQ,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "blt",
        OPCODE_BLT,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "ble",
        OPCODE_BLE,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "bgt",
        OPCODE_BGT,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "bge",
        OPCODE_BGE,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "bcr",
        OPCODE_BCR,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "bov",
        OPCODE_BOV,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "bdiv0",
        OPCODE_BDIV0,
        3,
        1,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Signed
    ),
    entry!(
        "jmp",
        OPCODE_JMP,
        4,
        2,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Unsigned
    ),
    entry!(
        "jsr",
        OPCODE_JSR,
        5,
        2,
        SymbolType::AddressInst,
        AccessMode::ImmediateOperands,
        Signedness::Unsigned
    ),
    entry!("rts", OPCODE_RTS, 2, 0, SymbolType::None, AccessMode::None),
    entry!(
        "syscall",
        OPCODE_SYSCALL,
        0,
        2,
        SymbolType::Word,
        AccessMode::ImmediateOperands,
        Signedness::Any
    ),
    entry!("sync", OPCODE_SYNC, 0, 0, SymbolType::None, AccessMode::None),
];

/// Looks an opcode entry up by mnemonic, case-insensitively, as the assembler's line parser does.
#[must_use]
pub fn find_by_mnemonic(name: &str) -> Option<&'static OpcodeEntry> {
    OPCODE_TABLE.iter().find(|entry| entry.mnemonic.eq_ignore_ascii_case(name))
}

/// Looks an opcode entry up by its encoded byte, as the emulator's decoder and the disassembler
/// do. Register-indexed opcodes have their register-select bits masked off first, matching
/// `IS_INDEXED_INST` in the historical decoder.
#[must_use]
pub fn find_by_opcode(opcode: u8) -> Option<&'static OpcodeEntry> {
    let lookup = if crate::family::is_register_indexed(opcode) {
        opcode & !OP_STACK_REGISTER_MASK
    } else {
        opcode
    };
    OPCODE_TABLE.iter().find(|entry| entry.opcode == lookup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_byte_round_trips_through_the_table() {
        for entry in OPCODE_TABLE {
            let found = find_by_mnemonic(entry.mnemonic).expect("mnemonic must resolve");
            assert_eq!(found.opcode, entry.opcode);
        }
    }

    #[test]
    fn mnemonic_lookup_is_case_insensitive() {
        assert_eq!(find_by_mnemonic("PUSHI").unwrap().opcode, OPCODE_PUSHI);
        assert_eq!(find_by_mnemonic("PushIw").unwrap().opcode, OPCODE_PUSHI + WIDTH_BIT);
    }

    #[test]
    fn indexed_opcode_lookup_masks_register_bits() {
        let with_dp = OPCODE_PUSH_INDEXED + OP_STACK_AND_DP;
        let with_x = OPCODE_PUSH_INDEXED + OP_STACK_AND_X;
        assert_eq!(find_by_opcode(with_dp).unwrap().mnemonic, "push");
        assert_eq!(find_by_opcode(with_x).unwrap().mnemonic, "push");
    }

    #[test]
    fn syscall_opcode_is_in_the_unsigned_flow_family_not_the_branch_family() {
        assert!(!crate::family::is_branch(OPCODE_SYSCALL));
        assert!(find_by_opcode(OPCODE_SYSCALL).is_some());
    }
}
