use pretty_assertions::assert_eq;

use super::*;

#[test]
fn packs_to_documented_bit_positions() {
    let mut f = Flags::default();
    f.carry = true;
    assert_eq!(0x0001, f.u16());
    f.carry = false;
    f.parity = true;
    assert_eq!(0x0004, f.u16());
    f.parity = false;
    f.adjust = true;
    assert_eq!(0x0010, f.u16());
    f.adjust = false;
    f.zero = true;
    assert_eq!(0x0040, f.u16());
    f.zero = false;
    f.sign = true;
    assert_eq!(0x0080, f.u16());
    f.sign = false;
    f.overflow = true;
    assert_eq!(0x0800, f.u16());
}

#[test]
fn round_trips_through_packed_form() {
    let mut f = Flags::default();
    f.set_u16(0x0ED5);
    assert_eq!(0x0ED5 & 0x0FD5, f.u16()); // reserved bits dropped
    let mut g = Flags::default();
    g.set_u16(f.u16());
    assert_eq!(f, g);
}

#[test]
fn parity_counts_low_byte_ones() {
    let mut f = Flags::default();
    f.set_parity(0x00); // zero ones: even
    assert!(f.parity);
    f.set_parity(0x01);
    assert!(!f.parity);
    f.set_parity(0x03);
    assert!(f.parity);
    f.set_parity(0x0100); // only the low byte counts
    assert!(f.parity);
}

#[test]
fn add_overflow_rules() {
    let mut f = Flags::default();
    // 0x7FFF + 1 overflows signed 16-bit
    let res = 0x7FFFusize + 1;
    f.set_overflow_add_u16(res, 1, 0x7FFF);
    assert!(f.overflow);
    // 0xFFFF + 1 does not (both operands negative, result 0)
    let res = 0xFFFFusize + 1;
    f.set_overflow_add_u16(res, 1, 0xFFFF);
    assert!(!f.overflow);
}

#[test]
fn sub_borrow_and_adjust() {
    let mut f = Flags::default();
    let dst = 0x10usize;
    let src = 0x01usize;
    let res = dst.wrapping_sub(src);
    f.set_carry_u16(res);
    f.set_adjust(res, src, dst);
    assert!(!f.carry);
    assert!(f.adjust); // borrow out of bit 3
}
