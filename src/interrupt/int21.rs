use log::debug;

use crate::cpu::R;
use crate::machine::Machine;

// DOS services
pub fn handle(machine: &mut Machine) {
    match machine.cpu.get_r8(R::AH) {
        0x02 => {
            // WRITE CHARACTER TO STANDARD OUTPUT
            // DL = character to write
            let dl = machine.cpu.get_r8(R::DL);
            machine.write_console(dl);
        }
        0x09 => {
            // WRITE STRING TO STANDARD OUTPUT
            // DS:DX -> '$'-terminated string
            let ds = machine.cpu.get_r16(R::DS);
            let mut dx = machine.cpu.get_r16(R::DX);
            // bounded by the segment size so a missing terminator
            // cannot spin forever
            for _ in 0..0x1_0000 {
                let b = machine.mmu.read_u8(ds, dx);
                if b == b'$' {
                    break;
                }
                machine.write_console(b);
                dx = dx.wrapping_add(1);
            }
        }
        0x4C => {
            // TERMINATE WITH RETURN CODE
            machine.cpu.halted = true;
        }
        _ => {
            debug!(
                "int21 (dos): ignored ah={:02X}, ax={:04X}",
                machine.cpu.get_r8(R::AH),
                machine.cpu.get_r16(R::AX)
            );
        }
    }
}
