//! Stack-family instruction execution (`opcode & 0xC0 == 0x00`): the plain operand-stack
//! operations, register-indexed `PUSH`/`PULL`, and the return-address-stack transfers
//! (`MOVER`/`MOVES`/`COPYR`/`COPYS`).
//!
//! `MOVER`/`MOVES`/`COPYR`/`COPYS` and `DEPTH` have no counterpart in the historical reference
//! emulator (it only ever ran the stack-only `ARCH_ORIGINAL` subset); their semantics here follow
//! the Forth convention the mnemonics borrow from (`>r`/`r>`/`r@`), recorded as an Open Question
//! decision in `DESIGN.md`. They operate at word granularity, matching the return-address stack's
//! own addressing unit.

use robco_isa::opcode::{
    OPCODE_COPYR, OPCODE_COPYS, OPCODE_DEPTH, OPCODE_DUP, OPCODE_MOVER, OPCODE_MOVES, OPCODE_POP,
    OPCODE_PUSHI, OPCODE_PULLDP, OPCODE_PULLX, OPCODE_PULL_INDEXED, OPCODE_PUSHDP, OPCODE_PUSHX,
    OPCODE_PUSH_INDEXED, OPCODE_ROLL, OPCODE_SWAP,
};
use robco_isa::Register;

use crate::memory::{Memory, STACK_BEGIN};
use crate::Error;

/// Executes one plain (non-register-indexed, non-stack-to-register) stack opcode. Returns
/// `Ok(false)` for an unrecognized `baseopcode`, signaling illegal instruction.
pub fn execute(
    memory: &mut Memory,
    pc: &mut u16,
    sp: &mut u16,
    isp: &mut u16,
    baseopcode: u8,
    wide: bool,
) -> Result<bool, Error> {
    match baseopcode {
        OPCODE_PUSHI => {
            if wide {
                let value = memory.fetch_instruction_word(*pc).ok_or(
                    crate::memory::Error::InstructionOutOfRange { address: *pc },
                )?;
                *pc = pc.wrapping_add(2);
                memory.push_word(sp, value);
            } else {
                let value = memory
                    .fetch_instruction_byte(*pc)
                    .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;
                *pc = pc.wrapping_add(1);
                memory.push_byte(sp, value);
            }
        }
        OPCODE_POP => memory.drop_bytes(sp, if wide { 2 } else { 1 }),
        OPCODE_DUP => {
            if wide {
                let value = memory.peek_word(*sp)?;
                memory.push_word(sp, value);
            } else {
                let value = memory.peek_byte(*sp)?;
                memory.push_byte(sp, value);
            }
        }
        OPCODE_SWAP => {
            if wide {
                let top = memory.pop_word(sp)?;
                let second = memory.pop_word(sp)?;
                memory.push_word(sp, top);
                memory.push_word(sp, second);
            } else {
                let top = memory.pop_byte(sp)?;
                let second = memory.pop_byte(sp)?;
                memory.push_byte(sp, top);
                memory.push_byte(sp, second);
            }
        }
        OPCODE_ROLL => roll(memory, sp, wide)?,
        OPCODE_DEPTH => {
            let depth = STACK_BEGIN.wrapping_sub(*sp);
            memory.push_word(sp, depth);
        }
        OPCODE_MOVER => {
            let value = memory.pop_word(sp)?;
            memory.push_return_address(isp, value)?;
        }
        OPCODE_MOVES => {
            let value = memory.pop_return_address(isp)?;
            memory.push_word(sp, value);
        }
        OPCODE_COPYR => {
            let value = memory.peek_word(*sp)?;
            memory.push_return_address(isp, value)?;
        }
        OPCODE_COPYS => {
            let value = memory.peek_return_address(*isp)?;
            memory.push_word(sp, value);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// `ROLL`'s depth-to-top rotation: the element at `SP + depth` moves to `SP`, and every element
/// between the old top and that depth shifts one slot toward the bottom (away from the top).
fn roll(memory: &mut Memory, sp: &mut u16, wide: bool) -> Result<(), Error> {
    if wide {
        let depth_units = memory.pop_byte(sp)?;
        let byte_depth = u16::from(depth_units) * 2;
        let rolled = memory.read_data_word(sp.wrapping_add(byte_depth));
        let mut current = byte_depth + 1;
        while current > 1 {
            let value = memory.read_data_byte(sp.wrapping_add(current - 2));
            memory.set_data_byte_at(sp.wrapping_add(current), value);
            current -= 1;
        }
        let [hi, lo] = rolled.to_be_bytes();
        memory.set_data_byte_at(*sp, hi);
        memory.set_data_byte_at(sp.wrapping_add(1), lo);
    } else {
        let depth = memory.pop_byte(sp)?;
        let rolled = memory.read_data_byte(sp.wrapping_add(u16::from(depth)));
        let mut current = u16::from(depth);
        while current > 0 {
            let value = memory.read_data_byte(sp.wrapping_add(current - 1));
            memory.set_data_byte_at(sp.wrapping_add(current), value);
            current -= 1;
        }
        memory.set_data_byte_at(*sp, rolled);
    }
    Ok(())
}

/// Stack-to-register transfer opcodes (`PUSHDP`/`PUSHX`/`PULLDP`/`PULLX`, not register-indexed).
pub fn execute_stack_to_register(
    memory: &mut Memory,
    sp: &mut u16,
    dp: &mut u8,
    x: &mut u16,
    opcode: u8,
) -> Result<bool, Error> {
    match opcode {
        OPCODE_PUSHDP => memory.push_byte(sp, *dp),
        OPCODE_PUSHX => memory.push_word(sp, *x),
        OPCODE_PULLDP => *dp = memory.pop_byte(sp)?,
        OPCODE_PULLX => *x = memory.pop_word(sp)?,
        _ => return Ok(false),
    }
    Ok(true)
}

/// Register-indexed `PUSH`/`PULL`: the post-byte's pre/post-increment flag and two's-complement
/// magnitude are applied to the register, which is also written back.
pub fn execute_register_indexed(
    memory: &mut Memory,
    pc: &mut u16,
    sp: &mut u16,
    dp: &mut u8,
    x: &mut u16,
    opcode: u8,
    wide: bool,
) -> Result<bool, Error> {
    let baseopcode = opcode
        & !(robco_isa::opcode::OP_STACK_REGISTER_MASK | robco_isa::family::WIDTH_BIT);
    let register = Register::from_code(opcode & robco_isa::opcode::OP_STACK_REGISTER_MASK)
        .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;

    let post_byte = memory
        .fetch_instruction_byte(*pc)
        .ok_or(crate::memory::Error::InstructionOutOfRange { address: *pc })?;
    *pc = pc.wrapping_add(1);
    let pre_increment = post_byte & 0x80 != 0;
    let raw = post_byte & 0x7F;
    // Sign-extend a 7-bit two's-complement magnitude: if bit 6 is set, the value is negative.
    let magnitude = if raw & 0x40 != 0 { (raw | 0x80) as i8 } else { raw as i8 };

    let mut address: u16 = match register {
        Register::Dp => u16::from(*dp),
        Register::X => *x,
    };

    if pre_increment {
        address = address.wrapping_add_signed(i16::from(magnitude));
    }

    match (baseopcode, wide) {
        (OPCODE_PUSH_INDEXED, true) => {
            let value = memory.read_data_word(address);
            memory.push_word(sp, value);
        }
        (OPCODE_PUSH_INDEXED, false) => {
            let value = memory.read_data_byte(address);
            memory.push_byte(sp, value);
        }
        (OPCODE_PULL_INDEXED, true) => {
            let value = memory.pop_word(sp)?;
            memory.write_data_slice(address, &value.to_be_bytes())?;
        }
        (OPCODE_PULL_INDEXED, false) => {
            let value = memory.pop_byte(sp)?;
            memory.write_data_slice(address, &[value])?;
        }
        _ => return Ok(false),
    }

    if !pre_increment {
        address = address.wrapping_add_signed(i16::from(magnitude));
    }

    match register {
        Register::Dp => *dp = address as u8,
        Register::X => *x = address,
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roll_moves_the_element_at_depth_to_the_top() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        // Push, bottom to top: 0x03 0x02 0x01 (top = 0x01), then roll depth 2 -> brings 0x03 up.
        memory.push_byte(&mut sp, 0x03);
        memory.push_byte(&mut sp, 0x02);
        memory.push_byte(&mut sp, 0x01);
        memory.push_byte(&mut sp, 2); // depth operand
        let mut pc = 0u16;
        let mut isp = crate::memory::RETURN_STACK_BEGIN;
        execute(&mut memory, &mut pc, &mut sp, &mut isp, OPCODE_ROLL, false).unwrap();
        assert_eq!(memory.pop_byte(&mut sp).unwrap(), 0x03);
        assert_eq!(memory.pop_byte(&mut sp).unwrap(), 0x01);
        assert_eq!(memory.pop_byte(&mut sp).unwrap(), 0x02);
    }

    #[test]
    fn depth_reports_bytes_used_on_the_operand_stack() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        memory.push_word(&mut sp, 0xAAAA);
        let mut pc = 0u16;
        let mut isp = crate::memory::RETURN_STACK_BEGIN;
        execute(&mut memory, &mut pc, &mut sp, &mut isp, OPCODE_DEPTH, false).unwrap();
        assert_eq!(memory.pop_word(&mut sp).unwrap(), 2);
    }

    #[test]
    fn mover_then_moves_round_trips_a_value_through_the_return_stack() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut isp = crate::memory::RETURN_STACK_BEGIN;
        let mut pc = 0u16;
        memory.push_word(&mut sp, 0x4242);
        execute(&mut memory, &mut pc, &mut sp, &mut isp, OPCODE_MOVER, false).unwrap();
        assert_eq!(isp, crate::memory::RETURN_STACK_BEGIN - 2);
        execute(&mut memory, &mut pc, &mut sp, &mut isp, OPCODE_MOVES, false).unwrap();
        assert_eq!(memory.pop_word(&mut sp).unwrap(), 0x4242);
        assert_eq!(isp, crate::memory::RETURN_STACK_BEGIN);
    }

    #[test]
    fn wide_register_indexed_push_post_increments_x_by_two() {
        let mut memory = Memory::new();
        memory.write_data_slice(0x0100, &[0x12, 0x34]).unwrap();
        let mut sp = STACK_BEGIN;
        let mut pc = 0u16;
        let mut dp = 0u8;
        let mut x = 0x0100u16;
        memory.write_instruction_byte(0, 2).unwrap(); // post-byte: post-increment by 2
        let opcode = OPCODE_PUSH_INDEXED + robco_isa::family::WIDTH_BIT + robco_isa::opcode::OP_STACK_AND_X;
        execute_register_indexed(&mut memory, &mut pc, &mut sp, &mut dp, &mut x, opcode, true)
            .unwrap();
        assert_eq!(memory.pop_word(&mut sp).unwrap(), 0x1234);
        assert_eq!(x, 0x0102);
        assert_eq!(pc, 1);
    }
}
