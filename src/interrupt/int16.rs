use std::io::Read;

use log::debug;

use crate::cpu::R;
use crate::machine::Machine;

// BIOS keyboard services
pub fn handle(machine: &mut Machine) {
    match machine.cpu.get_r8(R::AH) {
        0x00 => {
            // GET KEYSTROKE: block until a key is available,
            // return its code in AL
            let code = match machine.pop_key() {
                Some(k) => k,
                None => {
                    if machine.cpu.deterministic {
                        0
                    } else {
                        read_host_key()
                    }
                }
            };
            machine.cpu.set_r8(R::AL, code);
            machine.cpu.set_r8(R::AH, 0);
        }
        0x01 => {
            // CHECK FOR KEYSTROKE: ZF clear if a key is available,
            // its code in AL. the key stays queued
            match machine.peek_key() {
                Some(k) => {
                    machine.cpu.regs.flags.zero = false;
                    machine.cpu.set_r8(R::AL, k);
                }
                None => machine.cpu.regs.flags.zero = true,
            }
        }
        _ => {
            debug!(
                "int16 (keyboard): ignored ah={:02X}, ax={:04X}",
                machine.cpu.get_r8(R::AH),
                machine.cpu.get_r16(R::AX)
            );
        }
    }
}

/// one blocking byte from standard input; 0 at end of input
fn read_host_key() -> u8 {
    let mut buf = [0u8; 1];
    match std::io::stdin().read(&mut buf) {
        Ok(1) => buf[0],
        _ => 0,
    }
}
