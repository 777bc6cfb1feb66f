pub fn right_pad(s: &str, len: usize) -> String {
    let mut res = String::new();
    res.push_str(s);
    if s.len() < len {
        let padding_len = len - s.len();
        for _ in 0..padding_len {
            res.push_str(" ");
        }
    }
    res
}

#[test]
fn can_right_pad() {
    assert_eq!("ab  ", right_pad("ab", 4));
    assert_eq!("abcde", right_pad("abcde", 4));
}
