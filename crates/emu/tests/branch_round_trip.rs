//! Assembles real source through `robco-asm` and runs the resulting executable through the
//! emulator core, so a displacement bug in either the assembler's encoding or the emulator's
//! decoding shows up here even when each crate's own unit tests pass in isolation.

use robco_asm::Assembler;
use robco_emu::{loader, Machine, State};

fn assemble(source: &str) -> robco_exe::ExecutableFile {
    let dir = std::env::temp_dir().join(format!("robco-emu-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{:x}.asm", source.len() as u64 ^ 0x9E37_79B9));
    std::fs::write(&path, source).unwrap();

    let mut assembler = Assembler::new(vec![]);
    assembler.assemble_file(&path);
    let file = assembler.finalize().unwrap();
    let _ = std::fs::remove_file(&path);
    file
}

fn loaded_machine(file: &robco_exe::ExecutableFile) -> Machine {
    let mut machine = Machine::new();
    loader::relocate(&mut machine.memory, file).unwrap();
    machine.cpu.pc = file.execution_start_address;
    machine.cpu.state = State::Running;
    machine
}

#[test]
fn assembled_self_loop_branches_back_to_its_own_address_instead_of_erroring() {
    // Scenario A's canonical self-loop: `loop: b loop` assembles to a zero displacement.
    let file = assemble("loop:\nb loop\n");
    let mut machine = loaded_machine(&file);
    let loop_address = machine.cpu.pc;

    machine.step().unwrap();
    assert_eq!(machine.cpu.pc, loop_address);
    assert_eq!(machine.state(), State::Running);

    // Confirm it keeps looping rather than erroring on the second iteration too.
    machine.step().unwrap();
    assert_eq!(machine.cpu.pc, loop_address);
    assert_eq!(machine.state(), State::Running);
}

#[test]
fn assembled_forward_branch_lands_exactly_on_its_target_label() {
    // Scenario B: `b target` followed by two `pushi 0` then `target: rts`.
    let file = assemble("b target\npushi 0\npushi 0\ntarget:\nrts\n");
    let mut machine = loaded_machine(&file);

    machine.step().unwrap(); // the branch itself
    assert_eq!(usize::from(machine.cpu.pc), 6); // `b`(2) + two `pushi 0`(2 each) = target at byte 6

    machine.step().unwrap(); // rts pops the (empty) return stack
    assert_eq!(machine.state(), State::Error);
}
