use pretty_assertions::assert_eq;

use crate::cpu::encoder::Encoder;
use crate::cpu::instruction::{Instruction, RepeatMode};
use crate::cpu::op::Op;
use crate::cpu::parameter::Parameter;
use crate::cpu::register::{AMode, R};

fn assert_enc(op: &Instruction, expected: Vec<u8>) {
    let encoder = Encoder::new();
    assert_eq!(expected, encoder.encode(op).unwrap());
}

#[test]
fn can_encode_mov() {
    // mov r8, imm8
    assert_enc(
        &Instruction::new2(Op::Mov8, Parameter::Reg8(R::AL), Parameter::Imm8(0x05)),
        vec![0xB0, 0x05],
    );
    // mov r16, imm16
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::Reg16(R::AX), Parameter::Imm16(0x1234)),
        vec![0xB8, 0x34, 0x12],
    );
    // mov r16, r16
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::Reg16(R::SP), Parameter::Reg16(R::AX)),
        vec![0x89, 0xC4],
    );
    // mov r16, [amode]
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::Reg16(R::AX), Parameter::Ptr16Amode(AMode::BXSI)),
        vec![0x8B, 0x00],
    );
    // mov [disp16], r16
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::Ptr16(0x1234), Parameter::Reg16(R::AX)),
        vec![0x89, 0x06, 0x34, 0x12],
    );
    // mov byte [bp+0], imm8: the displacement-free BP form does not exist
    assert_enc(
        &Instruction::new2(Op::Mov8, Parameter::Ptr8AmodeS8(AMode::BP, 0), Parameter::Imm8(0x05)),
        vec![0xC6, 0x46, 0x00, 0x05],
    );
    // mov m16, imm16
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::Ptr16Amode(AMode::BX), Parameter::Imm16(0x0102)),
        vec![0xC7, 0x07, 0x02, 0x01],
    );
}

#[test]
fn can_encode_segment_movs() {
    // mov sreg, r/m16
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::SReg16(R::DS), Parameter::Reg16(R::AX)),
        vec![0x8E, 0xD8],
    );
    // mov r/m16, sreg
    assert_enc(
        &Instruction::new2(Op::Mov16, Parameter::Reg16(R::AX), Parameter::SReg16(R::CS)),
        vec![0x8C, 0xC8],
    );
}

#[test]
fn alu_prefers_the_accumulator_short_form() {
    assert_enc(
        &Instruction::new2(Op::Cmp8, Parameter::Reg8(R::AL), Parameter::Imm8(0x05)),
        vec![0x3C, 0x05],
    );
    assert_enc(
        &Instruction::new2(Op::Add16, Parameter::Reg16(R::AX), Parameter::ImmS8(0x05)),
        vec![0x05, 0x05, 0x00],
    );
    // non-accumulator destinations take the group-1 form
    assert_enc(
        &Instruction::new2(Op::Add8, Parameter::Reg8(R::BL), Parameter::Imm8(0x05)),
        vec![0x80, 0xC3, 0x05],
    );
}

#[test]
fn alu_uses_sign_extended_bytes_where_they_fit() {
    assert_enc(
        &Instruction::new2(Op::Add16, Parameter::Reg16(R::BX), Parameter::ImmS8(0x05)),
        vec![0x83, 0xC3, 0x05],
    );
    assert_enc(
        &Instruction::new2(Op::Add16, Parameter::Reg16(R::BX), Parameter::ImmS8(-1)),
        vec![0x83, 0xC3, 0xFF],
    );
    assert_enc(
        &Instruction::new2(Op::Add16, Parameter::Reg16(R::BX), Parameter::Imm16(0x1234)),
        vec![0x81, 0xC3, 0x34, 0x12],
    );
}

#[test]
fn can_encode_alu_register_forms() {
    // sub r/m16, r16
    assert_enc(
        &Instruction::new2(Op::Sub16, Parameter::Reg16(R::CX), Parameter::Reg16(R::DX)),
        vec![0x29, 0xD1],
    );
    // xor r/m16, r16
    assert_enc(
        &Instruction::new2(Op::Xor16, Parameter::Reg16(R::AX), Parameter::Reg16(R::AX)),
        vec![0x31, 0xC0],
    );
    // adc r8, r/m8
    assert_enc(
        &Instruction::new2(Op::Adc8, Parameter::Reg8(R::CL), Parameter::Ptr8Amode(AMode::SI)),
        vec![0x12, 0x0C],
    );
}

#[test]
fn can_encode_incdec_and_stack() {
    assert_enc(&Instruction::new1(Op::Inc16, Parameter::Reg16(R::CX)), vec![0x41]);
    assert_enc(&Instruction::new1(Op::Dec16, Parameter::Reg16(R::BX)), vec![0x4B]);
    assert_enc(
        &Instruction::new1(Op::Inc8, Parameter::Ptr8Amode(AMode::BX)),
        vec![0xFE, 0x07],
    );
    assert_enc(
        &Instruction::new1(Op::Dec16, Parameter::Ptr16Amode(AMode::SI)),
        vec![0xFF, 0x0C],
    );
    assert_enc(&Instruction::new1(Op::Push16, Parameter::Reg16(R::AX)), vec![0x50]);
    assert_enc(&Instruction::new1(Op::Pop16, Parameter::Reg16(R::DI)), vec![0x5F]);
}

#[test]
fn can_encode_group3() {
    assert_enc(
        &Instruction::new2(Op::Test8, Parameter::Reg8(R::AL), Parameter::Imm8(0xFF)),
        vec![0xA8, 0xFF],
    );
    assert_enc(
        &Instruction::new2(Op::Test8, Parameter::Reg8(R::BH), Parameter::Imm8(0xFF)),
        vec![0xF6, 0xC7, 0xFF],
    );
    assert_enc(
        &Instruction::new2(Op::Test8, Parameter::Reg8(R::BH), Parameter::Reg8(R::DL)),
        vec![0x84, 0xD7],
    );
    assert_enc(&Instruction::new1(Op::Not16, Parameter::Reg16(R::AX)), vec![0xF7, 0xD0]);
    assert_enc(&Instruction::new1(Op::Neg8, Parameter::Reg8(R::BL)), vec![0xF6, 0xDB]);
    assert_enc(&Instruction::new1(Op::Mul8, Parameter::Reg8(R::CL)), vec![0xF6, 0xE1]);
    assert_enc(&Instruction::new1(Op::Imul16, Parameter::Reg16(R::DX)), vec![0xF7, 0xEA]);
    assert_enc(&Instruction::new1(Op::Div16, Parameter::Reg16(R::CX)), vec![0xF7, 0xF1]);
    assert_enc(&Instruction::new1(Op::Idiv16, Parameter::Reg16(R::BX)), vec![0xF7, 0xFB]);
}

#[test]
fn can_encode_shifts() {
    assert_enc(
        &Instruction::new2(Op::Shl16, Parameter::Reg16(R::AX), Parameter::Imm8(1)),
        vec![0xD1, 0xE0],
    );
    assert_enc(
        &Instruction::new2(Op::Shr8, Parameter::Reg8(R::BL), Parameter::Reg8(R::CL)),
        vec![0xD2, 0xEB],
    );
    assert_enc(
        &Instruction::new2(Op::Sar16, Parameter::Ptr16Amode(AMode::SI), Parameter::Imm8(1)),
        vec![0xD1, 0x3C],
    );
    assert_enc(
        &Instruction::new2(Op::Rol16, Parameter::Reg16(R::DX), Parameter::Imm8(1)),
        vec![0xD1, 0xC2],
    );
    assert_enc(
        &Instruction::new2(Op::Rcr8, Parameter::Reg8(R::AH), Parameter::Imm8(1)),
        vec![0xD0, 0xDC],
    );
}

#[test]
fn can_encode_jumps_and_calls() {
    assert_enc(&Instruction::new1(Op::JmpShort, Parameter::ImmS8(5)), vec![0xEB, 0x05]);
    assert_enc(&Instruction::new1(Op::JmpShort, Parameter::ImmS8(-3)), vec![0xEB, 0xFD]);
    assert_enc(
        &Instruction::new1(Op::JmpNear, Parameter::Imm16(0x0200)),
        vec![0xE9, 0x00, 0x02],
    );
    assert_enc(&Instruction::new1(Op::Jz, Parameter::ImmS8(2)), vec![0x74, 0x02]);
    assert_enc(&Instruction::new1(Op::Jnz, Parameter::ImmS8(-2)), vec![0x75, 0xFE]);
    assert_enc(
        &Instruction::new1(Op::CallNear, Parameter::Imm16(0x0010)),
        vec![0xE8, 0x10, 0x00],
    );
    assert_enc(&Instruction::new(Op::Retn), vec![0xC3]);
    assert_enc(&Instruction::new(Op::Iret), vec![0xCF]);
}

#[test]
fn can_encode_string_and_prefix() {
    assert_enc(&Instruction::new(Op::Movsb), vec![0xA4]);
    assert_enc(&Instruction::new(Op::Scasw), vec![0xAF]);

    let mut rep = Instruction::new(Op::Movsb);
    rep.repeat = RepeatMode::Rep;
    assert_enc(&rep, vec![0xF3, 0xA4]);

    let mut repne = Instruction::new(Op::Scasb);
    repne.repeat = RepeatMode::Repne;
    assert_enc(&repne, vec![0xF2, 0xAE]);
}

#[test]
fn can_encode_io_and_misc() {
    assert_enc(
        &Instruction::new2(Op::In8, Parameter::Reg8(R::AL), Parameter::Imm8(0x60)),
        vec![0xE4, 0x60],
    );
    assert_enc(
        &Instruction::new2(Op::In16, Parameter::Reg16(R::AX), Parameter::Reg16(R::DX)),
        vec![0xED],
    );
    assert_enc(
        &Instruction::new2(Op::Out8, Parameter::Imm8(0x3F), Parameter::Reg8(R::AL)),
        vec![0xE6, 0x3F],
    );
    assert_enc(
        &Instruction::new2(Op::Out16, Parameter::Reg16(R::DX), Parameter::Reg16(R::AX)),
        vec![0xEF],
    );
    assert_enc(&Instruction::new1(Op::Int, Parameter::Imm8(0x21)), vec![0xCD, 0x21]);
    assert_enc(&Instruction::new(Op::Hlt), vec![0xF4]);
    assert_enc(&Instruction::new(Op::Clc), vec![0xF8]);
    assert_enc(&Instruction::new(Op::Std), vec![0xFD]);
}
