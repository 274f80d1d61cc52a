//! ALU instruction execution (`opcode & 0xE0 == 0x80`): binary and unary arithmetic/logic,
//! operating on one or two stack operands depending on the width bit.
//!
//! Diverges from the historical reference in two ways, both noted in `DESIGN.md`: flags are
//! recomputed from scratch each instruction (via [`ConditionCode::with_zero_negative`]) rather
//! than accumulated with `|=`, and the byte-width `SHL` carry check tests bit `0x80`, not the
//! word-width `0x8000` the historical C shares between both paths by copy-paste.

use robco_isa::opcode::{
    OPCODE_ADD, OPCODE_AND, OPCODE_CMP, OPCODE_DEC, OPCODE_DIV, OPCODE_INC, OPCODE_MUL, OPCODE_OR,
    OPCODE_SHL, OPCODE_SHR, OPCODE_SUB,
};
use robco_isa::ConditionCode;

use crate::memory::Memory;
use crate::Error;

/// Executes one ALU opcode (width bit already stripped by the caller). Returns `Ok(false)` for an
/// unrecognized `baseopcode`, signaling illegal instruction to the caller.
pub fn execute(
    memory: &mut Memory,
    sp: &mut u16,
    cc: &mut ConditionCode,
    baseopcode: u8,
    wide: bool,
) -> Result<bool, Error> {
    if baseopcode == OPCODE_INC || baseopcode == OPCODE_DEC {
        let delta: i32 = if baseopcode == OPCODE_INC { 1 } else { -1 };
        if wide {
            let operand = memory.pop_word(sp)? as i16;
            let result = operand.wrapping_add(delta as i16);
            memory.push_word(sp, result as u16);
            *cc = cc.with_zero_negative(result as u16, 16);
        } else {
            let operand = memory.pop_byte(sp)? as i8;
            let result = operand.wrapping_add(delta as i8);
            memory.push_byte(sp, result as u8);
            *cc = cc.with_zero_negative(u16::from(result as u8), 8);
        }
        return Ok(true);
    }

    if wide {
        let operand_b = memory.pop_word(sp)? as i16;
        let operand_a = memory.pop_word(sp)? as i16;
        let mut overflow = false;
        let result = match baseopcode {
            OPCODE_ADD => {
                let (result, ov) = operand_a.overflowing_add(operand_b);
                overflow = ov;
                result
            }
            OPCODE_SUB => {
                let (result, ov) = operand_a.overflowing_sub(operand_b);
                overflow = ov;
                result
            }
            OPCODE_MUL => {
                let (result, ov) = operand_a.overflowing_mul(operand_b);
                overflow = ov;
                result
            }
            OPCODE_DIV => {
                if operand_b == 0 {
                    *cc |= ConditionCode::DIV0;
                    return Ok(true);
                }
                operand_a.wrapping_div(operand_b)
            }
            OPCODE_CMP => {
                *cc = if operand_a == operand_b { *cc | ConditionCode::ZERO } else { *cc - ConditionCode::ZERO };
                return Ok(true);
            }
            OPCODE_OR => operand_a | operand_b,
            OPCODE_AND => operand_a & operand_b,
            OPCODE_SHL => {
                let result = ((operand_a as u16) << (operand_b as u16 & 0xF)) as i16;
                if operand_a as u16 & 0x8000 != 0 {
                    *cc |= ConditionCode::CARRY;
                } else {
                    *cc -= ConditionCode::CARRY;
                }
                result
            }
            OPCODE_SHR => ((operand_a as u16) >> (operand_b as u16 & 0xF)) as i16,
            _ => return Ok(false),
        };
        memory.push_word(sp, result as u16);
        *cc = cc.with_zero_negative(result as u16, 16);
        *cc = if overflow { *cc | ConditionCode::OVERFLOW } else { *cc - ConditionCode::OVERFLOW };
    } else {
        let operand_b = memory.pop_byte(sp)? as i8;
        let operand_a = memory.pop_byte(sp)? as i8;
        let mut overflow = false;
        let result = match baseopcode {
            OPCODE_ADD => {
                let (result, ov) = operand_a.overflowing_add(operand_b);
                overflow = ov;
                result
            }
            OPCODE_SUB => {
                let (result, ov) = operand_a.overflowing_sub(operand_b);
                overflow = ov;
                result
            }
            OPCODE_MUL => {
                let (result, ov) = operand_a.overflowing_mul(operand_b);
                overflow = ov;
                result
            }
            OPCODE_DIV => {
                if operand_b == 0 {
                    *cc |= ConditionCode::DIV0;
                    return Ok(true);
                }
                operand_a.wrapping_div(operand_b)
            }
            OPCODE_CMP => {
                *cc = if operand_a == operand_b { *cc | ConditionCode::ZERO } else { *cc - ConditionCode::ZERO };
                return Ok(true);
            }
            OPCODE_OR => operand_a | operand_b,
            OPCODE_AND => operand_a & operand_b,
            OPCODE_SHL => {
                let result = ((operand_a as u8) << (operand_b as u8 & 0x7)) as i8;
                if operand_a as u8 & 0x80 != 0 {
                    *cc |= ConditionCode::CARRY;
                } else {
                    *cc -= ConditionCode::CARRY;
                }
                result
            }
            OPCODE_SHR => ((operand_a as u8) >> (operand_b as u8 & 0x7)) as i8,
            _ => return Ok(false),
        };
        memory.push_byte(sp, result as u8);
        *cc = cc.with_zero_negative(u16::from(result as u8), 8);
        *cc = if overflow { *cc | ConditionCode::OVERFLOW } else { *cc - ConditionCode::OVERFLOW };
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::STACK_BEGIN;

    #[test]
    fn add_pops_b_then_a_and_pushes_the_sum() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut cc = ConditionCode::empty();
        memory.push_word(&mut sp, 10); // A
        memory.push_word(&mut sp, 3); // B
        execute(&mut memory, &mut sp, &mut cc, OPCODE_ADD, true).unwrap();
        assert_eq!(memory.pop_word(&mut sp).unwrap(), 13);
    }

    #[test]
    fn div_by_zero_sets_div0_and_pushes_nothing() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut cc = ConditionCode::empty();
        memory.push_word(&mut sp, 10);
        memory.push_word(&mut sp, 0);
        let sp_before = sp;
        execute(&mut memory, &mut sp, &mut cc, OPCODE_DIV, true).unwrap();
        assert!(cc.contains(ConditionCode::DIV0));
        // Both operands were consumed; nothing was pushed back.
        assert_eq!(sp, sp_before.wrapping_add(4));
    }

    #[test]
    fn signed_add_overflow_sets_the_overflow_flag() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut cc = ConditionCode::empty();
        memory.push_word(&mut sp, i16::MAX as u16);
        memory.push_word(&mut sp, 1);
        execute(&mut memory, &mut sp, &mut cc, OPCODE_ADD, true).unwrap();
        assert!(cc.contains(ConditionCode::OVERFLOW));
    }

    #[test]
    fn add_without_overflow_clears_a_stale_overflow_flag() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut cc = ConditionCode::OVERFLOW;
        memory.push_byte(&mut sp, 1);
        memory.push_byte(&mut sp, 1);
        execute(&mut memory, &mut sp, &mut cc, OPCODE_ADD, false).unwrap();
        assert!(!cc.contains(ConditionCode::OVERFLOW));
    }

    #[test]
    fn cmp_sets_zero_without_pushing_a_result() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut cc = ConditionCode::empty();
        memory.push_byte(&mut sp, 5);
        memory.push_byte(&mut sp, 5);
        let sp_before = sp;
        execute(&mut memory, &mut sp, &mut cc, OPCODE_CMP, false).unwrap();
        assert!(cc.contains(ConditionCode::ZERO));
        assert_eq!(sp, sp_before.wrapping_add(2));
    }

    #[test]
    fn byte_width_shl_carry_checks_bit_0x80_not_0x8000() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        let mut cc = ConditionCode::empty();
        memory.push_byte(&mut sp, 0x80u8 as i8 as u8); // operand A, sign bit set at byte width
        memory.push_byte(&mut sp, 1); // shift amount
        execute(&mut memory, &mut sp, &mut cc, OPCODE_SHL, false).unwrap();
        assert!(cc.contains(ConditionCode::CARRY));
    }
}
