pub fn hex_bytes(data: &[u8]) -> String {
    let strs: Vec<String> = data.iter().map(|b| format!("{:02X}", b)).collect();
    strs.join(" ")
}

/// formats a byte in assembler syntax: uppercase hex, trailing `h`,
/// a leading zero when the first digit is a letter so the value
/// cannot be mistaken for a label
pub fn hex_u8(v: u8) -> String {
    let s = format!("{:X}", v);
    if s.as_bytes()[0].is_ascii_alphabetic() {
        format!("0{}h", s)
    } else {
        format!("{}h", s)
    }
}

pub fn hex_u16(v: u16) -> String {
    let s = format!("{:X}", v);
    if s.as_bytes()[0].is_ascii_alphabetic() {
        format!("0{}h", s)
    } else {
        format!("{}h", s)
    }
}

/// formats a signed displacement with an explicit sign, like `+4h` or `-20h`
pub fn hex_signed(v: i32) -> String {
    if v < 0 {
        format!("-{}", hex_u16(-v as u16))
    } else {
        format!("+{}", hex_u16(v as u16))
    }
}

#[test]
fn formats_assembler_hex() {
    assert_eq!("12h", hex_u8(0x12));
    assert_eq!("0FFh", hex_u8(0xFF));
    assert_eq!("1234h", hex_u16(0x1234));
    assert_eq!("0A000h", hex_u16(0xA000));
    assert_eq!("+4h", hex_signed(4));
    assert_eq!("-20h", hex_signed(-0x20));
}
