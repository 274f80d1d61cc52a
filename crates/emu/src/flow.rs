//! Flow-control instruction execution (`opcode & 0xE0 == 0x60`): short conditional/unconditional
//! branches, and the `jmp`/`jsr`/`rts`/`syscall` family that shares the same base but sets the
//! unsigned-flow bit.
//!
//! Deliberately does NOT follow the historical reference emulator's two-byte signed displacement
//! or four-condition branch set (`BE`/`BC`/`BN`/`BO`): that file only ever ran the incomplete
//! `ARCH_ORIGINAL` configuration and is superseded here by the single-byte-displacement, 9-way
//! condition design the opcode table and the symbol resolver already implement. See `DESIGN.md`.

use robco_isa::opcode::{OPCODE_JMP, OPCODE_JSR, OPCODE_RTS, OPCODE_SYSCALL};
use robco_isa::{BranchCondition, ConditionCode};

use crate::memory::Memory;
use crate::Error;

/// The outcome of dispatching one flow-control instruction.
pub enum Outcome {
    /// Control continues at the `PC` already written into the CPU.
    Continue,
    /// A `syscall` instruction was decoded; `PC` has been frozen at the byte following the
    /// syscall number and the syscall number is returned for the outer dispatcher to handle.
    Syscall(u16),
}

/// Executes one short branch (`opcode & 0xF0 == 0x60`, unsigned-flow bit clear). `opcode` still
/// carries its condition bits; `pc` points just past the opcode byte on entry.
pub fn execute_branch(
    memory: &Memory,
    pc: &mut u16,
    cc: ConditionCode,
    opcode: u8,
) -> Result<(), Error> {
    let condition = BranchCondition::from_opcode(opcode)
        .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;
    let displacement = memory
        .fetch_instruction_byte(*pc)
        .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })? as i8;
    let opcode_pc = pc.wrapping_sub(1);
    let next_pc = pc.wrapping_add(1);
    *pc = if condition.is_satisfied(cc) {
        opcode_pc.wrapping_add_signed(i16::from(displacement))
    } else {
        next_pc
    };
    Ok(())
}

/// Executes `jmp`/`jsr`/`rts`/`syscall`. Returns `Ok(None)` for an unrecognized opcode, signaling
/// illegal instruction to the caller.
pub fn execute_jump(
    memory: &mut Memory,
    pc: &mut u16,
    isp: &mut u16,
    opcode: u8,
) -> Result<Option<Outcome>, Error> {
    match opcode {
        OPCODE_JMP => {
            let target = memory
                .fetch_instruction_word(*pc)
                .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;
            *pc = target;
            Ok(Some(Outcome::Continue))
        }
        OPCODE_JSR => {
            let target = memory
                .fetch_instruction_word(*pc)
                .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;
            let return_address = pc.wrapping_add(2);
            memory.push_return_address(isp, return_address)?;
            *pc = target;
            Ok(Some(Outcome::Continue))
        }
        OPCODE_RTS => {
            *pc = memory.pop_return_address(isp)?;
            Ok(Some(Outcome::Continue))
        }
        OPCODE_SYSCALL => {
            let number = memory
                .fetch_instruction_word(*pc)
                .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;
            *pc = pc.wrapping_add(2);
            Ok(Some(Outcome::Syscall(number)))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconditional_branch_applies_signed_displacement_to_its_opcode_address() {
        // Opcode byte sits at 0x0F, its displacement operand at 0x10 (where `pc` points on entry).
        let mut memory = Memory::new();
        memory.write_instruction_byte(0x10, 0x06).unwrap(); // +6
        let mut pc = 0x10u16;
        execute_branch(&memory, &mut pc, ConditionCode::empty(), robco_isa::opcode::OPCODE_B)
            .unwrap();
        assert_eq!(pc, 0x16); // opcode_pc (0x0F) + 6
    }

    #[test]
    fn self_loop_branches_back_to_its_own_opcode_address() {
        // `loop: b loop` assembles to a zero displacement and must branch to itself, not to
        // opcode_pc + 2, or the canonical self-loop program would fall through into garbage.
        let mut memory = Memory::new();
        memory.write_instruction_byte(0x01, 0x00).unwrap(); // displacement 0
        let mut pc = 0x01u16;
        execute_branch(&memory, &mut pc, ConditionCode::empty(), robco_isa::opcode::OPCODE_B)
            .unwrap();
        assert_eq!(pc, 0x00);
    }

    #[test]
    fn branch_not_taken_falls_through_past_the_displacement_byte() {
        let mut memory = Memory::new();
        memory.write_instruction_byte(0x10, 0x06).unwrap();
        let mut pc = 0x10u16;
        execute_branch(&memory, &mut pc, ConditionCode::empty(), robco_isa::opcode::OPCODE_BEQ)
            .unwrap();
        assert_eq!(pc, 0x11);
    }

    #[test]
    fn jsr_pushes_the_address_after_its_two_operand_bytes() {
        let mut memory = Memory::new();
        memory.write_instruction_byte(0x00, 0x12).unwrap();
        memory.write_instruction_byte(0x01, 0x34).unwrap();
        let mut pc = 0x00u16;
        let mut isp = crate::memory::RETURN_STACK_BEGIN;
        let outcome = execute_jump(&mut memory, &mut pc, &mut isp, OPCODE_JSR).unwrap();
        assert!(matches!(outcome, Some(Outcome::Continue)));
        assert_eq!(pc, 0x1234);
        assert_eq!(memory.pop_return_address(&mut isp).unwrap(), 0x02);
    }

    #[test]
    fn syscall_freezes_pc_at_the_byte_following_the_syscall_number() {
        let mut memory = Memory::new();
        memory.write_instruction_byte(0x00, 0x01).unwrap();
        memory.write_instruction_byte(0x01, 0x02).unwrap();
        let mut pc = 0x00u16;
        let mut isp = crate::memory::RETURN_STACK_BEGIN;
        let outcome = execute_jump(&mut memory, &mut pc, &mut isp, OPCODE_SYSCALL).unwrap();
        assert!(matches!(outcome, Some(Outcome::Syscall(0x0102))));
        assert_eq!(pc, 0x02);
    }
}
