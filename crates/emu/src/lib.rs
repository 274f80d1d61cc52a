//! Fetch/decode/execute core for the machine: the three-image memory model, the ALU/stack/flow
//! instruction families, the holotape executable loader, syscall dispatch, and the top-level
//! [`machine::Machine`] that ties them together.
//!
//! Mirrors the historical emulator's division of labor (`emulator.c`'s opcode dispatch,
//! `syscall_handlers.cpp`/`syscall_holotape_handlers.cpp`'s syscall tables) but corrects two bugs
//! documented in `DESIGN.md` and adds the `mover`/`moves`/`copyr`/`copys`/`depth` opcodes that
//! table has always reserved but never implemented.

#![forbid(unsafe_code)]

use snafu::prelude::*;

pub mod alu;
pub mod cpu;
pub mod flow;
pub mod loader;
pub mod machine;
pub mod memory;
pub mod stack;
pub mod syscall;

pub use cpu::{Cpu, State};
pub use machine::Machine;
pub use memory::Memory;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("memory access failed: {source}"))]
    Memory { source: memory::Error },
    #[snafu(display("opcode 0x{opcode:02x} at PC=0x{pc:04x} is not a recognized instruction"))]
    IllegalInstruction { opcode: u8, pc: u16 },
    #[snafu(display("syscall {number} is not a recognized syscall"))]
    UnknownSyscall { number: u16 },
    #[snafu(display("holotape executable is malformed: {reason}"))]
    MalformedExecutable { reason: String },
    #[snafu(display("holotape deck error: {source}"))]
    Holotape { source: robco_holotape::Error },
    #[snafu(display("executable codec error: {source}"))]
    Executable { source: robco_exe::Error },
    #[snafu(display("the machine is not running"))]
    NotRunning,
}

impl From<memory::Error> for Error {
    fn from(source: memory::Error) -> Self {
        Self::Memory { source }
    }
}

impl From<robco_holotape::Error> for Error {
    fn from(source: robco_holotape::Error) -> Self {
        Self::Holotape { source }
    }
}

impl From<robco_exe::Error> for Error {
    fn from(source: robco_exe::Error) -> Self {
        Self::Executable { source }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
