//! [`Machine`]: the top-level handle that ties the CPU, the three memory images, and the holotape
//! deck together, driving the run loop the way the historical emulator's `main` loop drove
//! `execute_instruction` and its syscall table.

use std::collections::VecDeque;

use robco_holotape::Deck;

use crate::cpu::{Cpu, State};
use crate::memory::Memory;
use crate::syscall::{self, Response};
use crate::Result;

/// A complete machine: CPU registers, the instruction/data/return-address images, the holotape
/// deck, and the pending-keystroke queue `GETCH` and keystroke injection share.
pub struct Machine {
    pub cpu: Cpu,
    pub memory: Memory,
    pub deck: Deck,
    keystrokes: VecDeque<u16>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    #[must_use]
    pub fn new() -> Self {
        Self { cpu: Cpu::new(), memory: Memory::new(), deck: Deck::new(), keystrokes: VecDeque::new() }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.cpu.state
    }

    /// Decodes and executes one instruction, dispatching a syscall immediately if the instruction
    /// decoded to one.
    ///
    /// # Errors
    /// Propagates [`Cpu::step`]'s errors, transitioning to [`State::Error`] on an illegal opcode or
    /// out-of-range memory access, and any error the dispatched syscall itself returns.
    pub fn step(&mut self) -> Result<()> {
        if let Some(number) = self.cpu.step(&mut self.memory)? {
            let response =
                syscall::dispatch(&mut self.cpu, &mut self.memory, &mut self.deck, &mut self.keystrokes, number)?;
            if matches!(response, Response::Wait) {
                self.cpu.state = State::Waiting;
            }
        }
        Ok(())
    }

    /// Steps until the machine leaves [`State::Running`], i.e. until it parks on a blocking
    /// `GETCH`, halts on `EXIT`, or faults.
    ///
    /// # Errors
    /// Propagates the first error [`Machine::step`] returns.
    pub fn run(&mut self) -> Result<()> {
        while self.cpu.can_execute() {
            self.step()?;
        }
        Ok(())
    }

    /// Delivers a keystroke from outside the machine, mirroring `handle_keypress_for_syscall`: if
    /// the machine is parked on a blocking `GETCH` it resumes immediately, otherwise the key is
    /// queued for a future `GETCH`.
    pub fn inject_keystroke(&mut self, key: u16) {
        syscall::inject_keystroke(&mut self.cpu, &mut self.memory, &mut self.keystrokes, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robco_exe::{ExecutableFile, Segment};
    use robco_holotape::BlockHeader;
    use robco_isa::opcode;
    use robco_isa::syscall;

    fn deck_with(file: &ExecutableFile) -> Deck {
        let mut deck = Deck::new_blank();
        let encoded = file.encode().unwrap();
        deck.buffer[..encoded.len()].copy_from_slice(&encoded);
        let header = BlockHeader {
            block_bytes: encoded.len() as u16,
            remaining_blocks: 0,
            filename: *b"PROG\0\0\0\0",
            next_block: 0,
        };
        deck.write(&header).unwrap();
        deck.rewind().unwrap();
        deck
    }

    #[test]
    fn execute_syscall_loads_and_starts_a_program_from_the_deck() {
        let mut file = ExecutableFile::new(0x0200);
        file.segments.push(Segment {
            load_address: 0x0200,
            is_code: true,
            bytes: vec![opcode::OPCODE_SYNC],
        });

        let mut machine = Machine::new();
        machine.deck = deck_with(&file);
        machine.cpu.x = 0; // unused by EXECUTE; loader reads straight off the deck
        machine.cpu.state = State::Running;

        // Bootstrap: run a tiny loader program that issues EXECUTE, then hand control to it.
        machine
            .memory
            .write_instruction_byte(0, opcode::OPCODE_SYSCALL)
            .unwrap();
        machine
            .memory
            .write_instruction_byte(1, (syscall::EXECUTE >> 8) as u8)
            .unwrap();
        machine
            .memory
            .write_instruction_byte(2, (syscall::EXECUTE & 0xFF) as u8)
            .unwrap();

        machine.step().unwrap();
        assert_eq!(machine.cpu.pc, 0x0200);
        assert_eq!(machine.state(), State::Running);

        let err = machine.step().unwrap_err();
        assert!(matches!(err, crate::Error::IllegalInstruction { .. }));
        assert_eq!(machine.state(), State::Error);
    }

    #[test]
    fn blocking_getch_parks_the_machine_until_a_keystroke_arrives() {
        let mut machine = Machine::new();
        machine.memory.write_instruction_byte(0, opcode::OPCODE_SYSCALL).unwrap();
        machine.memory.write_instruction_byte(1, (syscall::GETCH >> 8) as u8).unwrap();
        machine.memory.write_instruction_byte(2, (syscall::GETCH & 0xFF) as u8).unwrap();
        machine.memory.push_byte(&mut machine.cpu.sp, 1); // blocking = true
        machine.cpu.state = State::Running;

        machine.step().unwrap();
        assert_eq!(machine.state(), State::Waiting);

        machine.inject_keystroke(0x41);
        assert_eq!(machine.state(), State::Running);
        assert_eq!(machine.memory.pop_word(&mut machine.cpu.sp).unwrap(), 0x41);
    }

    #[test]
    fn keystroke_injected_while_not_waiting_is_queued_for_a_later_getch() {
        let mut machine = Machine::new();
        machine.inject_keystroke(0x42);
        assert_eq!(machine.state(), State::Init);

        machine.memory.write_instruction_byte(0, opcode::OPCODE_SYSCALL).unwrap();
        machine.memory.write_instruction_byte(1, (syscall::GETCH >> 8) as u8).unwrap();
        machine.memory.write_instruction_byte(2, (syscall::GETCH & 0xFF) as u8).unwrap();
        machine.memory.push_byte(&mut machine.cpu.sp, 1); // blocking = true
        machine.cpu.state = State::Running;

        machine.step().unwrap();
        assert_eq!(machine.state(), State::Running);
        assert_eq!(machine.memory.pop_word(&mut machine.cpu.sp).unwrap(), 0x42);
    }
}
