//! Syscall dispatch: the host side of `SYSCALL`'s stack-calling convention, grouped by family the
//! way `syscall_handlers.cpp`/`syscall_holotape_handlers.cpp` are split. Console and holotape
//! families are implemented in full; mainframe I/O stays entirely out of scope (default arm);
//! graphics and audio only validate their calling convention and push the documented result code,
//! since the framebuffer and DSP themselves are out of scope.

use std::collections::VecDeque;

use robco_core::prelude::*;
use robco_holotape::{BLOCK_SIZE, BlockHeader, Deck, HEADER_SIZE, PAYLOAD_SIZE};
use robco_isa::syscall;

use crate::cpu::{Cpu, State};
use crate::loader;
use crate::memory::Memory;
use crate::Result;

/// What the caller should do after dispatching one syscall.
pub enum Response {
    Continue,
    /// `GETCH` was invoked in blocking mode with nothing queued; the caller should move the
    /// machine to [`State::Waiting`].
    Wait,
}

/// Dispatches `number` against the family its high byte selects.
pub fn dispatch(
    cpu: &mut Cpu,
    memory: &mut Memory,
    deck: &mut Deck,
    queue: &mut VecDeque<u16>,
    number: u16,
) -> Result<Response> {
    match syscall::family(number) {
        syscall::Family::System => {
            dispatch_system(cpu, number);
            Ok(Response::Continue)
        }
        syscall::Family::Console => dispatch_console(memory, &mut cpu.sp, cpu.x, queue, number),
        syscall::Family::Holotape => {
            dispatch_holotape(cpu, memory, deck, number)?;
            Ok(Response::Continue)
        }
        syscall::Family::Mainframe => {
            log::warn!("unimplemented mainframe syscall 0x{number:04x}");
            Ok(Response::Continue)
        }
        syscall::Family::Graphics => {
            dispatch_graphics(memory, &mut cpu.sp, number);
            Ok(Response::Continue)
        }
        syscall::Family::Audio => {
            dispatch_audio(memory, cpu.x, number);
            Ok(Response::Continue)
        }
        syscall::Family::Unknown => {
            log::warn!("unrecognized syscall 0x{number:04x}");
            Ok(Response::Continue)
        }
    }
}

/// Resumes a machine parked in [`State::Waiting`] on a blocking `GETCH`, mirroring
/// `handle_keypress_for_syscall`: if the machine is currently waiting, push the key and resume
/// immediately; otherwise queue it for a future `GETCH`.
pub fn inject_keystroke(cpu: &mut Cpu, memory: &mut Memory, queue: &mut VecDeque<u16>, key: u16) {
    if cpu.state == State::Waiting {
        memory.push_word(&mut cpu.sp, key);
        cpu.state = State::Running;
    } else {
        queue.push_back(key);
    }
}

fn dispatch_system(cpu: &mut Cpu, number: u16) {
    match number {
        syscall::EXIT => cpu.state = State::Finished,
        syscall::NONE => {}
        _ => log::warn!("unimplemented system syscall 0x{number:04x}"),
    }
}

/// Reads a NUL-terminated string out of the data image starting at `address`, as
/// `handle_syscall_print` does via the `X` register.
fn read_c_string(memory: &Memory, address: u16) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut cursor = address;
    loop {
        let byte = memory.read_data_byte(cursor);
        if byte == 0 || bytes.len() >= crate::memory::DATA_SIZE {
            break;
        }
        bytes.push(byte);
        cursor = cursor.wrapping_add(1);
    }
    bytes
}

fn dispatch_console(
    memory: &mut Memory,
    sp: &mut u16,
    x: u16,
    queue: &mut VecDeque<u16>,
    number: u16,
) -> Result<Response> {
    Ok(match number {
        syscall::GETCH => {
            let blocking = memory.pop_byte(sp)? != 0;
            if let Some(key) = queue.pop_front() {
                memory.push_word(sp, key);
                Response::Continue
            } else if blocking {
                Response::Wait
            } else {
                memory.push_word(sp, 0xFFFF);
                Response::Continue
            }
        }
        syscall::SETCH => {
            memory.pop_byte(sp)?;
            Response::Continue
        }
        syscall::PRINT => {
            let text = read_c_string(memory, x);
            log::debug!(
                "print: \"{}\" ({} bytes at X=0x{:04x})",
                String::from_utf8_lossy(&text),
                text.len(),
                x
            );
            Response::Continue
        }
        syscall::SETCURSOR => {
            memory.pop_word(sp)?; // Y
            memory.pop_word(sp)?; // X
            memory.push_byte(sp, 0);
            Response::Continue
        }
        syscall::GETCURSOR => {
            memory.push_word(sp, 0); // X
            memory.push_word(sp, 0); // Y
            Response::Continue
        }
        syscall::SETATTR | syscall::SETATTRC => {
            memory.pop_word(sp)?;
            Response::Continue
        }
        syscall::CLEAR => Response::Continue,
        _ => {
            log::warn!("unimplemented console syscall 0x{number:04x}");
            Response::Continue
        }
    })
}

fn dispatch_holotape(cpu: &mut Cpu, memory: &mut Memory, deck: &mut Deck, number: u16) -> Result<()> {
    match number {
        syscall::HOLOTAPECHECK => {
            memory.push_byte(&mut cpu.sp, u8::from(deck.is_inserted()));
        }
        syscall::HOLOTAPEEJECT => {
            let result = u8::from(deck.eject().is_err());
            memory.push_byte(&mut cpu.sp, result.wrapping_mul(255));
        }
        syscall::REWIND => {
            let result = u8::from(deck.rewind().is_err());
            memory.push_byte(&mut cpu.sp, result.wrapping_mul(255));
        }
        syscall::SEEK => {
            let offset = memory.pop_word(&mut cpu.sp)? as i16;
            let result = u8::from(deck.seek(i32::from(offset)).is_err());
            memory.push_byte(&mut cpu.sp, result.wrapping_mul(255));
        }
        syscall::FIND => {
            let name_bytes = read_c_string(memory, cpu.x);
            let name = String::from_utf8_lossy(&name_bytes).into_owned();
            let found = deck.find(&name).is_ok();
            memory.push_word(&mut cpu.sp, if found { 0 } else { 0xFFFF });
        }
        syscall::READ => {
            let result = match deck.read() {
                Ok(_header) => memory.write_data_slice(cpu.x, &deck.buffer).is_ok(),
                Err(_) => false,
            };
            memory.push_byte(&mut cpu.sp, if result { 0 } else { 255 });
        }
        syscall::WRITE => {
            // The guest lays out a full on-tape block (header then payload) at `data[X]`, the
            // same buffer model `syscall_holotape_handlers.cpp` copies out of with a single
            // `memcpy` of `HOLOTAPE_BLOCK_SIZE` bytes; the header's filename and chain links are
            // the guest's to set, not ours to overwrite.
            let slice = memory.data_slice(cpu.x, BLOCK_SIZE);
            let result = if slice.len() == BLOCK_SIZE {
                let mut cursor = DataCursorRef::new(&slice[..HEADER_SIZE], Endian::Big);
                match BlockHeader::decode(&mut cursor) {
                    Ok(header) => {
                        deck.buffer.copy_from_slice(&slice[HEADER_SIZE..]);
                        deck.write(&header).is_ok()
                    }
                    Err(_) => false,
                }
            } else {
                false
            };
            memory.push_byte(&mut cpu.sp, if result { 0 } else { 255 });
        }
        syscall::EXECUTE => {
            match loader::read_executable(deck) {
                Ok(file) => {
                    memory.clear();
                    cpu.reset();
                    loader::relocate(memory, &file)?;
                    cpu.pc = file.execution_start_address;
                    cpu.state = State::Running;
                    let _ = deck.rewind();
                }
                Err(err) => log::warn!("holotape EXECUTE failed: {err}"),
            }
        }
        _ => log::warn!("unimplemented holotape syscall 0x{number:04x}"),
    }
    Ok(())
}

/// `GRAPHICSTART`/`GRAPHICEND` only validate the calling convention and push the documented
/// result; the framebuffer itself stays out of scope.
fn dispatch_graphics(memory: &mut Memory, sp: &mut u16, number: u16) {
    match number {
        syscall::GRAPHICSTART => {
            let _mode = memory.pop_byte(sp).unwrap_or(0);
            memory.push_byte(sp, 0);
        }
        syscall::GRAPHICEND => {}
        _ => log::warn!("unimplemented graphics syscall 0x{number:04x}"),
    }
}

/// `SOUNDCMD`/`SOUNDACK`/`SOUNDNACK` only validate the calling convention; the DSP stays out of
/// scope.
fn dispatch_audio(memory: &mut Memory, x: u16, number: u16) {
    match number {
        syscall::SOUNDCMD => {
            let byte_count = usize::from(u16::from_be_bytes([
                memory.read_data_byte(x),
                memory.read_data_byte(x.wrapping_add(1)),
            ]));
            log::debug!("soundcmd: {byte_count} bytes at X=0x{x:04x} (DSP out of scope)");
        }
        syscall::SOUNDACK | syscall::SOUNDNACK => {}
        _ => log::warn!("unimplemented audio syscall 0x{number:04x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::STACK_BEGIN;

    #[test]
    fn blocking_getch_with_nothing_queued_asks_for_wait() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        memory.push_byte(&mut sp, 1); // blocking = true
        let mut queue = VecDeque::new();
        let response = dispatch_console(&mut memory, &mut sp, 0, &mut queue, syscall::GETCH).unwrap();
        assert!(matches!(response, Response::Wait));
    }

    #[test]
    fn queued_keystroke_satisfies_a_blocking_getch_immediately() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        memory.push_byte(&mut sp, 1);
        let mut queue = VecDeque::from([0x41u16]);
        let response = dispatch_console(&mut memory, &mut sp, 0, &mut queue, syscall::GETCH).unwrap();
        assert!(matches!(response, Response::Continue));
        assert_eq!(memory.pop_word(&mut sp).unwrap(), 0x41);
    }

    #[test]
    fn non_blocking_getch_with_nothing_queued_pushes_sentinel() {
        let mut memory = Memory::new();
        let mut sp = STACK_BEGIN;
        memory.push_byte(&mut sp, 0); // blocking = false
        let mut queue = VecDeque::new();
        let response = dispatch_console(&mut memory, &mut sp, 0, &mut queue, syscall::GETCH).unwrap();
        assert!(matches!(response, Response::Continue));
        assert_eq!(memory.pop_word(&mut sp).unwrap(), 0xFFFF);
    }

    #[test]
    fn inject_keystroke_wakes_a_waiting_machine_immediately() {
        let mut memory = Memory::new();
        let mut cpu = Cpu::new();
        cpu.state = State::Waiting;
        let mut queue = VecDeque::new();
        inject_keystroke(&mut cpu, &mut memory, &mut queue, 0x42);
        assert_eq!(cpu.state, State::Running);
        assert_eq!(memory.pop_word(&mut cpu.sp).unwrap(), 0x42);
    }

    #[test]
    fn inject_keystroke_queues_when_not_waiting() {
        let mut memory = Memory::new();
        let mut cpu = Cpu::new();
        let mut queue = VecDeque::new();
        inject_keystroke(&mut cpu, &mut memory, &mut queue, 0x42);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn holotapecheck_pushes_zero_with_no_tape_inserted() {
        let mut memory = Memory::new();
        let mut cpu = Cpu::new();
        let mut deck = Deck::new();
        dispatch_holotape(&mut cpu, &mut memory, &mut deck, syscall::HOLOTAPECHECK).unwrap();
        assert_eq!(memory.pop_byte(&mut cpu.sp).unwrap(), 0);
    }

    #[test]
    fn write_preserves_the_guests_header_so_the_block_can_be_found_afterward() {
        let mut memory = Memory::new();
        let mut cpu = Cpu::new();
        let mut deck = Deck::new_blank();

        let header = BlockHeader {
            block_bytes: PAYLOAD_SIZE as u16,
            remaining_blocks: 0,
            filename: *b"PROG\0\0\0\0",
            next_block: 0,
        };
        let mut block = vec![0u8; BLOCK_SIZE];
        {
            let mut cursor = DataCursorMut::new(&mut block[..HEADER_SIZE], Endian::Big);
            header.encode(&mut cursor).unwrap();
        }
        memory.write_data_slice(0x1000, &block).unwrap();
        cpu.x = 0x1000;

        dispatch_holotape(&mut cpu, &mut memory, &mut deck, syscall::WRITE).unwrap();
        assert_eq!(memory.pop_byte(&mut cpu.sp).unwrap(), 0);

        deck.rewind().unwrap();
        assert!(deck.find("PROG").is_ok());
    }
}
