use crate::cpu::op;
use crate::cpu::{RepeatMode, R};

use super::assembler::AsmError;

#[cfg(test)]
#[path = "./parser_test.rs"]
mod parser_test;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Width {
    Byte,
    Word,
}

/// an operand as written in the source, before label resolution and
/// shape selection
#[derive(Clone, Debug, PartialEq)]
pub enum SourceOperand {
    Reg(R),
    Imm {
        value: i32,
        width: Width,
    },
    Mem {
        base: Option<R>,
        index: Option<R>,
        disp: Option<i32>,
        width: Option<Width>,
    },
    Label(String),
    Str(Vec<u8>),
}

/// a `SHORT` or `NEAR` keyword on a JMP operand
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum JumpHint {
    Short,
    Near,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceInstruction {
    /// uppercased mnemonic
    pub mnemonic: String,
    pub repeat: RepeatMode,
    pub jump_hint: Option<JumpHint>,
    pub operands: Vec<SourceOperand>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DataWidth {
    Byte,
    Word,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataItem {
    /// a string literal, emitted verbatim
    Bytes(Vec<u8>),
    /// a numeric value, truncated to the directive width
    Value(i32),
    /// a label whose address is emitted as a 16-bit word
    LabelRef(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataDirective {
    pub width: DataWidth,
    pub items: Vec<DataItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StatementBody {
    Instruction(SourceInstruction),
    Data(DataDirective),
}

/// one source line after classification: label definitions plus an
/// optional instruction or data directive
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statement {
    pub labels: Vec<String>,
    pub body: Option<StatementBody>,
}

/// identifier grammar: leading letter or underscore, then word chars
pub fn is_valid_label(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// cuts a `;` comment, ignoring semicolons inside string literals
fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            ';' if !in_quote => return &line[..i],
            _ => {}
        }
    }
    line
}

/// classifies one source line. line numbers are 1-based and only used
/// for error reporting
pub fn parse_line(line: &str, line_no: usize) -> Result<Statement, AsmError> {
    let mut stmt = Statement::default();
    let mut text = strip_comment(line).trim();

    // peel off leading `label:` definitions
    loop {
        if text.is_empty() {
            return Ok(stmt);
        }
        if let Some(pos) = find_label_colon(text) {
            let name = text[..pos].trim();
            if !is_valid_label(name) {
                return Err(AsmError::InvalidLabel { line: line_no, text: name.to_string() });
            }
            stmt.labels.push(name.to_string());
            text = text[pos + 1..].trim();
            continue;
        }
        // `label DB ...` with the colon omitted
        let mut words = text.splitn(2, char::is_whitespace);
        let first = words.next().unwrap_or("");
        let rest = words.next().unwrap_or("").trim();
        let second = rest.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
        if is_valid_label(first)
            && !op::is_mnemonic(&first.to_ascii_uppercase())
            && (second == "DB" || second == "DW" || second == "DD")
        {
            stmt.labels.push(first.to_string());
            text = rest;
            continue;
        }
        break;
    }

    stmt.body = Some(parse_body(text, line_no)?);
    Ok(stmt)
}

/// position of a `label:` colon at the start of the line, if any
fn find_label_colon(text: &str) -> Option<usize> {
    let pos = text.find(':')?;
    let head = text[..pos].trim();
    if !head.is_empty() && is_valid_label(head) {
        Some(pos)
    } else {
        None
    }
}

fn parse_body(text: &str, line_no: usize) -> Result<StatementBody, AsmError> {
    let mut words = text.splitn(2, char::is_whitespace);
    let head = words.next().unwrap_or("").to_ascii_uppercase();
    let rest = words.next().unwrap_or("").trim();

    match head.as_str() {
        "DB" => Ok(StatementBody::Data(DataDirective {
            width: DataWidth::Byte,
            items: parse_data_items(rest, line_no)?,
        })),
        "DW" => Ok(StatementBody::Data(DataDirective {
            width: DataWidth::Word,
            items: parse_data_items(rest, line_no)?,
        })),
        _ => {
            if let Some(repeat) = RepeatMode::from_str(&head) {
                let mut inner = parse_instruction(rest, line_no)?;
                inner.repeat = repeat;
                return Ok(StatementBody::Instruction(inner));
            }
            parse_instruction(text, line_no).map(StatementBody::Instruction)
        }
    }
}

fn parse_instruction(text: &str, line_no: usize) -> Result<SourceInstruction, AsmError> {
    let mut words = text.splitn(2, char::is_whitespace);
    let mnemonic = words.next().unwrap_or("").to_ascii_uppercase();
    let mut rest = words.next().unwrap_or("").trim();
    if mnemonic.is_empty() {
        return Err(AsmError::RepWithoutString { line: line_no, mnemonic: String::new() });
    }

    let mut jump_hint = None;
    if mnemonic == "JMP" {
        let upper = rest.to_ascii_uppercase();
        if upper.starts_with("SHORT ") {
            jump_hint = Some(JumpHint::Short);
            rest = rest[6..].trim();
        } else if upper.starts_with("NEAR ") {
            jump_hint = Some(JumpHint::Near);
            rest = rest[5..].trim();
        }
    }

    let mut operands = Vec::new();
    for chunk in split_operands(rest) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        operands.push(parse_operand(chunk, line_no)?);
    }

    Ok(SourceInstruction { mnemonic, repeat: RepeatMode::None, jump_hint, operands })
}

/// splits at commas that sit outside brackets and quotes
fn split_operands(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut bracket = 0i32;
    let mut in_quote = false;
    for c in text.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '[' if !in_quote => {
                bracket += 1;
                current.push(c);
            }
            ']' if !in_quote => {
                bracket -= 1;
                current.push(c);
            }
            ',' if !in_quote && bracket == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_operand(text: &str, line_no: usize) -> Result<SourceOperand, AsmError> {
    let mut t = text.trim();

    // optional BYTE/WORD size keyword before a memory operand
    let mut width = None;
    let upper = t.to_ascii_uppercase();
    if upper.starts_with("BYTE ") {
        width = Some(Width::Byte);
        t = t[5..].trim();
    } else if upper.starts_with("WORD ") {
        width = Some(Width::Word);
        t = t[5..].trim();
    }

    if t.starts_with('[') {
        if !t.ends_with(']') {
            return Err(AsmError::InvalidMemExpression { line: line_no, text: t.to_string() });
        }
        return parse_mem(&t[1..t.len() - 1], width, line_no, t);
    }
    if width.is_some() {
        return Err(AsmError::InvalidOperand { line: line_no, text: text.to_string() });
    }

    if t.starts_with('\'') {
        let inner = &t[1..];
        match inner.find('\'') {
            Some(end) if end == inner.len() - 1 => {
                let bytes: Vec<u8> = inner[..end].bytes().collect();
                if bytes.len() == 1 {
                    // character literal: an 8-bit immediate
                    return Ok(SourceOperand::Imm { value: i32::from(bytes[0]), width: Width::Byte });
                }
                return Ok(SourceOperand::Str(bytes));
            }
            _ => {
                return Err(AsmError::UnterminatedString { line: line_no, text: t.to_string() })
            }
        }
    }

    if let Some(r) = R::from_str(t) {
        return Ok(SourceOperand::Reg(r));
    }

    if looks_numeric(t) {
        let value = parse_number(t)
            .ok_or_else(|| AsmError::InvalidNumber { line: line_no, text: t.to_string() })?;
        return Ok(SourceOperand::Imm { value, width: infer_imm_width(value) });
    }

    if is_valid_label(t) {
        return Ok(SourceOperand::Label(t.to_string()));
    }

    Err(AsmError::InvalidOperand { line: line_no, text: text.to_string() })
}

fn parse_mem(
    inner: &str,
    width: Option<Width>,
    line_no: usize,
    whole: &str,
) -> Result<SourceOperand, AsmError> {
    let invalid = || AsmError::InvalidMemExpression { line: line_no, text: whole.to_string() };

    let mut base: Option<R> = None;
    let mut index: Option<R> = None;
    let mut disp: Option<i32> = None;

    for (sign, term) in split_terms(inner) {
        let term = term.trim();
        if term.is_empty() {
            return Err(invalid());
        }
        if let Some(r) = R::from_str(term) {
            if sign < 0 {
                return Err(invalid());
            }
            match r {
                R::BX | R::BP => {
                    if base.is_some() {
                        return Err(invalid());
                    }
                    base = Some(r);
                }
                R::SI | R::DI => {
                    if index.is_some() {
                        return Err(invalid());
                    }
                    index = Some(r);
                }
                _ => return Err(invalid()),
            }
        } else if looks_numeric(term) {
            if disp.is_some() {
                return Err(invalid());
            }
            let v = parse_number(term)
                .ok_or_else(|| AsmError::InvalidNumber { line: line_no, text: term.to_string() })?;
            disp = Some(v * i32::from(sign));
        } else {
            return Err(invalid());
        }
    }

    if base.is_none() && index.is_none() && disp.is_none() {
        return Err(invalid());
    }
    Ok(SourceOperand::Mem { base, index, disp, width })
}

/// splits `a+b-c` into signed terms, order-independent
fn split_terms(s: &str) -> Vec<(i8, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut sign = 1i8;
    for c in s.chars() {
        match c {
            '+' | '-' if !current.trim().is_empty() => {
                parts.push((sign, current.clone()));
                current.clear();
                sign = if c == '-' { -1 } else { 1 };
            }
            '-' => {
                // leading minus binds to the following term
                sign = -sign;
            }
            '+' => {}
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push((sign, current));
    }
    parts
}

fn looks_numeric(t: &str) -> bool {
    let body = t
        .trim_start_matches('#')
        .trim_start_matches('$')
        .trim_start_matches('-');
    let first = match body.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if first.is_ascii_digit() {
        return true;
    }
    // trailing-h hex may lead with a letter digit, like FFFFh
    (body.ends_with('h') || body.ends_with('H'))
        && body[..body.len() - 1].chars().all(|c| c.is_ascii_hexdigit())
        && body.len() > 1
}

/// numeric literal: decimal, hex with `0x` prefix or trailing `h`,
/// optional leading `-`, optional `#`/`$` immediate marker
pub fn parse_number(t: &str) -> Option<i32> {
    let mut body = t.trim_start_matches('#').trim_start_matches('$');
    let negative = body.starts_with('-');
    if negative {
        body = &body[1..];
    }
    let value = if body.starts_with("0x") || body.starts_with("0X") {
        i64::from_str_radix(&body[2..], 16).ok()?
    } else if (body.ends_with('h') || body.ends_with('H')) && body.len() > 1 {
        i64::from_str_radix(&body[..body.len() - 1], 16).ok()?
    } else {
        body.parse::<i64>().ok()?
    };
    let value = if negative { -value } else { value };
    if value < -0x8000 || value > 0xFFFF {
        return None;
    }
    Some(value as i32)
}

/// values representable in a byte stay 8-bit, everything else is a word
fn infer_imm_width(value: i32) -> Width {
    if value >= -128 && value <= 255 {
        Width::Byte
    } else {
        Width::Word
    }
}

fn parse_data_items(text: &str, line_no: usize) -> Result<Vec<DataItem>, AsmError> {
    let mut items = Vec::new();
    for chunk in split_operands(text) {
        let t = chunk.trim();
        if t.is_empty() {
            continue;
        }
        if t.starts_with('\'') {
            let inner = &t[1..];
            match inner.find('\'') {
                Some(end) if end == inner.len() - 1 => {
                    items.push(DataItem::Bytes(inner[..end].bytes().collect()));
                }
                _ => {
                    return Err(AsmError::UnterminatedString {
                        line: line_no,
                        text: t.to_string(),
                    })
                }
            }
        } else if looks_numeric(t) {
            let v = parse_number(t)
                .ok_or_else(|| AsmError::InvalidNumber { line: line_no, text: t.to_string() })?;
            items.push(DataItem::Value(v));
        } else if is_valid_label(t) {
            items.push(DataItem::LabelRef(t.to_string()));
        } else {
            return Err(AsmError::BadDataOperand { line: line_no, text: t.to_string() });
        }
    }
    if items.is_empty() {
        return Err(AsmError::BadDataOperand { line: line_no, text: text.to_string() });
    }
    Ok(items)
}
