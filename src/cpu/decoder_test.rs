use pretty_assertions::assert_eq;

use crate::cpu::decoder::Decoder;
use crate::cpu::instruction::Instruction;
use crate::memory::MMU;

fn decode_at(bytes: &[u8], offset: u16) -> Instruction {
    let mut mmu = MMU::default();
    mmu.write(0, offset, bytes).unwrap();
    let mut decoder = Decoder::default();
    decoder.get_instruction(&mmu, 0, offset)
}

fn assert_decodes(bytes: Vec<u8>, text: &str) {
    let ins = decode_at(&bytes, 0x100);
    assert_eq!(text, format!("{}", ins));
    assert_eq!(bytes.len(), ins.length as usize);
}

#[test]
fn decodes_mov_forms() {
    assert_decodes(vec![0xB8, 0x34, 0x12], "MOV AX, 1234h");
    assert_decodes(vec![0xB0, 0x05], "MOV AL, 5h");
    assert_decodes(vec![0x89, 0xC4], "MOV SP, AX");
    assert_decodes(vec![0x8B, 0x00], "MOV AX, [BX+SI]");
    assert_decodes(vec![0x8B, 0x47, 0x04], "MOV AX, [BX+4h]");
    assert_decodes(vec![0x8B, 0x86, 0x00, 0x80], "MOV AX, [BP-8000h]");
    assert_decodes(vec![0x89, 0x06, 0x34, 0x12], "MOV [1234h], AX");
    assert_decodes(vec![0xC6, 0x46, 0x00, 0x05], "MOV BYTE [BP+0h], 5h");
    assert_decodes(vec![0x8E, 0xD8], "MOV DS, AX");
    assert_decodes(vec![0x8C, 0xC8], "MOV AX, CS");
}

#[test]
fn decodes_alu_forms() {
    assert_decodes(vec![0x3C, 0x05], "CMP AL, 5h");
    assert_decodes(vec![0x05, 0x34, 0x12], "ADD AX, 1234h");
    assert_decodes(vec![0x83, 0xC3, 0x05], "ADD BX, 5h");
    assert_decodes(vec![0x83, 0xC3, 0xFF], "ADD BX, 0FFFFh");
    assert_decodes(vec![0x81, 0xC3, 0x34, 0x12], "ADD BX, 1234h");
    assert_decodes(vec![0x29, 0xD1], "SUB CX, DX");
    assert_decodes(vec![0x31, 0xC0], "XOR AX, AX");
    assert_decodes(vec![0x80, 0x3E, 0x00, 0x20, 0x41], "CMP BYTE [2000h], 41h");
    assert_decodes(vec![0x12, 0x0C], "ADC CL, [SI]");
}

#[test]
fn decodes_group_members_from_the_reg_field() {
    assert_decodes(vec![0xF6, 0xC7, 0xFF], "TEST BH, 0FFh");
    assert_decodes(vec![0xF7, 0xD0], "NOT AX");
    assert_decodes(vec![0xF6, 0xDB], "NEG BL");
    assert_decodes(vec![0xF6, 0xE1], "MUL CL");
    assert_decodes(vec![0xF7, 0xEA], "IMUL DX");
    assert_decodes(vec![0xF7, 0xF1], "DIV CX");
    assert_decodes(vec![0xF7, 0xFB], "IDIV BX");
    assert_decodes(vec![0xFE, 0x07], "INC BYTE [BX]");
    assert_decodes(vec![0xFF, 0x0C], "DEC WORD [SI]");
}

#[test]
fn decodes_shift_group() {
    assert_decodes(vec![0xD1, 0xE0], "SHL AX, 1h");
    assert_decodes(vec![0xD2, 0xEB], "SHR BL, CL");
    assert_decodes(vec![0xD1, 0x3C], "SAR WORD [SI], 1h");
    assert_decodes(vec![0xD0, 0xC8], "ROR AL, 1h");
    assert_decodes(vec![0xD3, 0xD2], "RCL DX, CL");
}

#[test]
fn jump_targets_resolve_to_absolute_addresses() {
    // a short jump at 0x100; the displacement counts from the next
    // instruction
    let ins = decode_at(&[0x74, 0x02], 0x100);
    assert_eq!("JE 104h", format!("{}", ins));

    let ins = decode_at(&[0xEB, 0xFE], 0x100);
    assert_eq!("JMP 100h", format!("{}", ins));

    let ins = decode_at(&[0xE9, 0x00, 0x02], 0x100);
    assert_eq!("JMP NEAR 303h", format!("{}", ins));

    let ins = decode_at(&[0xE8, 0x10, 0x00], 0x100);
    assert_eq!("CALL 113h", format!("{}", ins));

    let ins = decode_at(&[0x7C, 0x80], 0x100);
    assert_eq!("JL 82h", format!("{}", ins));
}

#[test]
fn decodes_string_ops_and_prefixes() {
    assert_decodes(vec![0xA4], "MOVSB");
    assert_decodes(vec![0xAF], "SCASW");
    assert_decodes(vec![0xF3, 0xA4], "REP MOVSB");
    assert_decodes(vec![0xF2, 0xAE], "REPNE SCASB");
}

#[test]
fn rep_on_a_non_string_opcode_is_invalid() {
    let ins = decode_at(&[0xF3, 0x90], 0x100);
    assert!(!ins.command.is_valid());
}

#[test]
fn reserved_encodings_are_invalid() {
    // 0x0F is outside the supported set
    assert!(!decode_at(&[0x0F], 0x100).command.is_valid());
    // group-2 reg=6 is reserved
    assert!(!decode_at(&[0xD1, 0xF0], 0x100).command.is_valid());
    // group-3 reg=1 is reserved
    assert!(!decode_at(&[0xF6, 0xC8], 0x100).command.is_valid());
    // 0xFF with a reg outside inc/dec
    assert!(!decode_at(&[0xFF, 0xD0], 0x100).command.is_valid());
}

#[test]
fn decodes_misc() {
    assert_decodes(vec![0xCD, 0x21], "INT 21h");
    assert_decodes(vec![0xF4], "HLT");
    assert_decodes(vec![0xF8], "CLC");
    assert_decodes(vec![0xFD], "STD");
    assert_decodes(vec![0xE4, 0x60], "IN AL, 60h");
    assert_decodes(vec![0xED], "IN AX, DX");
    assert_decodes(vec![0xE6, 0x3F], "OUT 3Fh, AL");
    assert_decodes(vec![0xEF], "OUT DX, AX");
    assert_decodes(vec![0x50], "PUSH AX");
    assert_decodes(vec![0x5F], "POP DI");
    assert_decodes(vec![0x41], "INC CX");
    assert_decodes(vec![0xCF], "IRET");
}
