use log::debug;

use crate::cpu::R;
use crate::machine::Machine;

// BIOS video services
pub fn handle(machine: &mut Machine) {
    match machine.cpu.get_r8(R::AH) {
        0x0E => {
            // TELETYPE OUTPUT
            // AL = character to write
            let al = machine.cpu.get_r8(R::AL);
            machine.write_console(al);
        }
        _ => {
            debug!(
                "int10 (video): ignored ah={:02X}, ax={:04X}",
                machine.cpu.get_r8(R::AH),
                machine.cpu.get_r16(R::AX)
            );
        }
    }
}
