use pretty_assertions::assert_eq;

use super::*;
use crate::asm::assembler::AsmError;
use crate::cpu::{RepeatMode, R};

#[test]
fn classifies_labels_and_comments() {
    let stmt = parse_line("  start:  ; entry point", 1).unwrap();
    assert_eq!(vec!["start".to_string()], stmt.labels);
    assert_eq!(None, stmt.body);

    let stmt = parse_line("loop_1: HLT", 1).unwrap();
    assert_eq!(vec!["loop_1".to_string()], stmt.labels);
    assert!(stmt.body.is_some());

    let stmt = parse_line("; just a comment", 1).unwrap();
    assert!(stmt.labels.is_empty());
    assert_eq!(None, stmt.body);

    assert_eq!(Ok(Statement::default()), parse_line("", 1));
}

#[test]
fn semicolons_inside_strings_are_data() {
    let stmt = parse_line("msg DB 'a;b' ; trailing", 1).unwrap();
    assert_eq!(vec!["msg".to_string()], stmt.labels);
    match stmt.body.unwrap() {
        StatementBody::Data(d) => {
            assert_eq!(vec![DataItem::Bytes(b"a;b".to_vec())], d.items);
        }
        other => panic!("expected data, got {:?}", other),
    }
}

#[test]
fn label_before_db_needs_no_colon() {
    let stmt = parse_line("MSG DB 'Hi', 0", 1).unwrap();
    assert_eq!(vec!["MSG".to_string()], stmt.labels);
    match stmt.body.unwrap() {
        StatementBody::Data(d) => {
            assert_eq!(DataWidth::Byte, d.width);
            assert_eq!(
                vec![DataItem::Bytes(b"Hi".to_vec()), DataItem::Value(0)],
                d.items
            );
        }
        other => panic!("expected data, got {:?}", other),
    }
}

#[test]
fn parses_dw_items() {
    let stmt = parse_line("table DW 1234h, 5, later", 1).unwrap();
    match stmt.body.unwrap() {
        StatementBody::Data(d) => {
            assert_eq!(DataWidth::Word, d.width);
            assert_eq!(
                vec![
                    DataItem::Value(0x1234),
                    DataItem::Value(5),
                    DataItem::LabelRef("later".to_string())
                ],
                d.items
            );
        }
        other => panic!("expected data, got {:?}", other),
    }
}

fn instr(line: &str) -> SourceInstruction {
    match parse_line(line, 1).unwrap().body.unwrap() {
        StatementBody::Instruction(i) => i,
        other => panic!("expected instruction, got {:?}", other),
    }
}

#[test]
fn parses_operands() {
    let i = instr("mov ax, 1234h");
    assert_eq!("MOV", i.mnemonic);
    assert_eq!(
        vec![
            SourceOperand::Reg(R::AX),
            SourceOperand::Imm { value: 0x1234, width: Width::Word }
        ],
        i.operands
    );

    // case-insensitive registers, character literals
    let i = instr("MOV al, 'A'");
    assert_eq!(
        vec![
            SourceOperand::Reg(R::AL),
            SourceOperand::Imm { value: 0x41, width: Width::Byte }
        ],
        i.operands
    );
}

#[test]
fn parses_numeric_literal_forms() {
    assert_eq!(Some(255), parse_number("0xFF"));
    assert_eq!(Some(255), parse_number("0FFh"));
    assert_eq!(Some(0xFFFF), parse_number("FFFFh"));
    assert_eq!(Some(-3), parse_number("-3"));
    assert_eq!(Some(16), parse_number("#16"));
    assert_eq!(Some(16), parse_number("$16"));
    assert_eq!(None, parse_number("12q"));
    assert_eq!(None, parse_number("0x10000"));
}

#[test]
fn parses_memory_expressions() {
    let i = instr("mov ax, [bx+si+8]");
    assert_eq!(
        SourceOperand::Mem {
            base: Some(R::BX),
            index: Some(R::SI),
            disp: Some(8),
            width: None
        },
        i.operands[1]
    );

    // order-independent, signed displacement, width keyword
    let i = instr("inc word [4h + di]");
    assert_eq!(
        SourceOperand::Mem { base: None, index: Some(R::DI), disp: Some(4), width: Some(Width::Word) },
        i.operands[0]
    );

    let i = instr("mov ax, [bp-2]");
    assert_eq!(
        SourceOperand::Mem { base: Some(R::BP), index: None, disp: Some(-2), width: None },
        i.operands[1]
    );

    let i = instr("mov ax, [0x7C00]");
    assert_eq!(
        SourceOperand::Mem { base: None, index: None, disp: Some(0x7C00), width: None },
        i.operands[1]
    );
}

#[test]
fn rejects_bad_memory_expressions() {
    assert_eq!(
        Err(AsmError::InvalidMemExpression { line: 3, text: "[ax+bx]".to_string() }),
        parse_line("mov ax, [ax+bx]", 3).map(|_| ())
    );
    assert!(parse_line("mov ax, [bx+bp]", 1).is_err());
    assert!(parse_line("mov ax, [si+di+si]", 1).is_err());
    assert!(parse_line("mov ax, []", 1).is_err());
}

#[test]
fn parses_repeat_prefixes_and_jump_hints() {
    let i = instr("rep movsb");
    assert_eq!(RepeatMode::Rep, i.repeat);
    assert_eq!("MOVSB", i.mnemonic);

    let i = instr("repne scasb");
    assert_eq!(RepeatMode::Repne, i.repeat);

    let i = instr("jmp short done");
    assert_eq!(Some(JumpHint::Short), i.jump_hint);
    assert_eq!(vec![SourceOperand::Label("done".to_string())], i.operands);

    let i = instr("JMP NEAR 7C05h");
    assert_eq!(Some(JumpHint::Near), i.jump_hint);
}

#[test]
fn reports_unterminated_strings() {
    assert_eq!(
        Err(AsmError::UnterminatedString { line: 7, text: "'oops".to_string() }),
        parse_line("db 'oops", 7).map(|_| ())
    );
}

#[test]
fn validates_label_grammar() {
    assert!(is_valid_label("_x9"));
    assert!(is_valid_label("loop_start"));
    assert!(!is_valid_label("9lives"));
    assert!(!is_valid_label(""));
    assert!(!is_valid_label("a-b"));
}
