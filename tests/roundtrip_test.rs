use pretty_assertions::assert_eq;
use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use micro86::asm::{assemble, Assembler};
use micro86::cpu::R;
use micro86::disasm::disassemble;
use micro86::machine::Machine;

/// assemble, disassemble at the same origin, re-assemble the listing
/// text and require the exact same bytes back
fn roundtrip(src: &str) {
    let bin = assemble(src).unwrap();

    let infos = disassemble(&bin, 0);
    let swept: Vec<u8> = infos.iter().flat_map(|i| i.bytes.clone()).collect();
    assert_eq!(bin, swept, "sweep must cover every input byte");

    let listing: Vec<String> = infos.iter().map(|i| format!("{}", i.instruction)).collect();
    let relisted = listing.join("\n");
    let bin2 = Assembler::new().assemble(&relisted).unwrap_or_else(|e| {
        panic!("re-assembly failed: {:?}\nlisting:\n{}", e, relisted);
    });
    assert_eq!(bin, bin2, "re-assembled listing:\n{}", relisted);
}

#[test]
fn roundtrips_moves_and_alu() {
    roundtrip(
        "
MOV AX, 1234h
MOV AL, 5
MOV SP, AX
MOV AX, [BX]
MOV [BX+SI], AX
MOV BYTE [BP], 7
ADD AX, 5
ADD BX, 5
ADD BX, 1234h
ADC CL, [SI]
SUB CX, DX
SBB AX, 1
AND AL, 0Fh
OR AX, BX
XOR AX, AX
CMP AL, 5
CMP WORD [BX+DI+8], 100h
HLT
",
    );
}

#[test]
fn roundtrips_group_instructions() {
    roundtrip(
        "
NOT AX
NEG BL
TEST AL, 0FFh
TEST BH, DL
TEST CX, 1234h
MUL CL
IMUL DX
DIV CX
IDIV BX
INC AX
INC BYTE [BX]
DEC WORD [SI]
SHL AX, 1
SHR BL, CL
SAR WORD [SI], 1
ROL DX, 1
ROR AL, 1
RCL CX, CL
RCR BH, 1
HLT
",
    );
}

#[test]
fn roundtrips_control_flow() {
    roundtrip(
        "
start:
MOV AX, 0
INC AX
CMP AX, 5
JNE back
JE skip
back:
JMP start
skip:
CALL sub_1
HLT
sub_1:
RET
",
    );
}

#[test]
fn roundtrips_strings_stack_and_io() {
    roundtrip(
        "
CLD
MOV SI, 100h
MOV DI, 200h
MOV CX, 10h
REP MOVSB
REPNE SCASB
LODSW
STOSW
CMPSB
PUSH AX
POP BX
PUSH BP
POP BP
IN AL, 60h
IN AX, DX
OUT 7Fh, AL
OUT DX, AX
INT 21h
IRET
HLT
",
    );
}

#[test]
fn roundtrips_near_jumps() {
    let mut src = String::from("JMP target\nJMP second\n");
    for _ in 0..180 {
        src.push_str("INC AX\n");
    }
    src.push_str("target: HLT\nsecond: HLT\n");
    roundtrip(&src);
}

#[test]
fn roundtrips_trailing_data() {
    roundtrip("MOV BX, 3\nHLT\nmsg DB 'Hi', 0\n");
}

#[test]
fn sweep_of_random_bytes_is_total() {
    let mut rng = XorShiftRng::seed_from_u64(0x1234);
    for _ in 0..50 {
        let mut data = vec![0u8; 64];
        for b in &mut data {
            *b = rng.gen();
        }
        let infos = disassemble(&data, 0);
        let swept: Vec<u8> = infos.iter().flat_map(|i| i.bytes.clone()).collect();
        assert_eq!(data, swept);
    }
}

#[test]
fn promoted_jump_still_lands_on_its_target() {
    let mut src = String::from("JMP over\n");
    for _ in 0..150 {
        src.push_str("DB 0\n");
    }
    src.push_str("over: MOV AX, 7\nHLT\n");
    let bin = assemble(&src).unwrap();
    assert_eq!(0xE9, bin[0]);

    let mut machine = Machine::deterministic();
    machine.load_rom(&bin).unwrap();
    machine.run(100).unwrap();
    assert_eq!(7, machine.cpu.get_r16(R::AX));
}

#[test]
fn address_synthesis_matches_ground_truth() {
    use micro86::memory::MemoryAddress;
    let mut rng = XorShiftRng::seed_from_u64(7);
    for _ in 0..1000 {
        let seg: u16 = rng.gen();
        let off: u16 = rng.gen();
        let expected = ((u32::from(seg) << 4) + u32::from(off)) % 0x10_0000;
        assert_eq!(expected, MemoryAddress::new(seg, off).value());
    }
}
