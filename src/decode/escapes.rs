const MIN_HEX_ESCAPE_DIGITS: usize = 2;
const MAX_HEX_ESCAPE_DIGITS: usize = 4;
const UNICODE_ESCAPE_DIGITS: usize = 4;

/// Returns whether `input` holds at least one `\x` escape with enough digits.
pub(super) fn has_hex_escape(input: &str) -> bool {
    escape_starts(input, b'x').any(|start| {
        hex_digit_run(input.as_bytes(), start + 2, MAX_HEX_ESCAPE_DIGITS) >= MIN_HEX_ESCAPE_DIGITS
    })
}

/// Returns whether `input` holds at least one `\u` escape with four digits.
pub(super) fn has_unicode_escape(input: &str) -> bool {
    escape_starts(input, b'u').any(|start| {
        hex_digit_run(input.as_bytes(), start + 2, UNICODE_ESCAPE_DIGITS) == UNICODE_ESCAPE_DIGITS
    })
}

/// Replaces `\xH`..`\xHHHH` runs, taking as many digits as available.
///
/// Groups that are too short or name an invalid scalar value are copied
/// through untouched.
pub(super) fn decode_hex_escapes(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut output = String::with_capacity(input.len());
    let mut replaced = false;
    let mut index = 0usize;

    while index < bytes.len() {
        if is_escape_at(bytes, index, b'x') {
            let digits = hex_digit_run(bytes, index + 2, MAX_HEX_ESCAPE_DIGITS);
            let end = index + 2 + digits;
            if digits >= MIN_HEX_ESCAPE_DIGITS
                && let Some(c) = parse_scalar(&input[index + 2..end])
            {
                output.push(c);
                replaced = true;
                index = end;
                continue;
            }
        }
        index = copy_char(input, index, &mut output);
    }

    replaced.then_some(output)
}

/// Replaces `\uHHHH` escapes, joining surrogate pairs written as two escapes.
pub(super) fn decode_unicode_escapes(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut output = String::with_capacity(input.len());
    let mut replaced = false;
    let mut index = 0usize;

    while index < bytes.len() {
        if let Some(unit) = unicode_unit_at(input, index) {
            let after = index + 2 + UNICODE_ESCAPE_DIGITS;
            if let Some(c) = char::from_u32(u32::from(unit)) {
                output.push(c);
                replaced = true;
                index = after;
                continue;
            }
            if is_high_surrogate(unit)
                && let Some(low) = unicode_unit_at(input, after)
                && is_low_surrogate(low)
                && let Some(c) = char::decode_utf16([unit, low]).next().and_then(Result::ok)
            {
                output.push(c);
                replaced = true;
                index = after + 2 + UNICODE_ESCAPE_DIGITS;
                continue;
            }
        }
        index = copy_char(input, index, &mut output);
    }

    replaced.then_some(output)
}

fn escape_starts(input: &str, marker: u8) -> impl Iterator<Item = usize> + '_ {
    let bytes = input.as_bytes();
    (0..bytes.len()).filter(move |index| is_escape_at(bytes, *index, marker))
}

fn is_escape_at(bytes: &[u8], index: usize, marker: u8) -> bool {
    bytes.get(index) == Some(&b'\\') && bytes.get(index + 1) == Some(&marker)
}

fn hex_digit_run(bytes: &[u8], start: usize, max: usize) -> usize {
    bytes
        .iter()
        .skip(start)
        .take(max)
        .take_while(|byte| byte.is_ascii_hexdigit())
        .count()
}

fn unicode_unit_at(input: &str, index: usize) -> Option<u16> {
    let bytes = input.as_bytes();
    if !is_escape_at(bytes, index, b'u')
        || hex_digit_run(bytes, index + 2, UNICODE_ESCAPE_DIGITS) != UNICODE_ESCAPE_DIGITS
    {
        return None;
    }
    u16::from_str_radix(&input[index + 2..index + 2 + UNICODE_ESCAPE_DIGITS], 16).ok()
}

fn parse_scalar(digits: &str) -> Option<char> {
    u32::from_str_radix(digits, 16).ok().and_then(char::from_u32)
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Copies the character starting at byte `index` and returns the next index.
fn copy_char(input: &str, index: usize, output: &mut String) -> usize {
    match input[index..].chars().next() {
        Some(c) => {
            output.push(c);
            index + c.len_utf8()
        }
        None => input.len(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::four_digit_cyrillic(r"\x041F\x0440\x0438\x0432\x0435\x0442", "Привет")]
    #[case::two_digit_ascii(r"\x41\x42", "AB")]
    #[case::mixed_with_text(r"PART-\x0442=1", "PART-т=1")]
    #[case::short_group_kept(r"\x4 and \x41", r"\x4 and A")]
    #[case::surrogate_kept(r"\xD800\x41", r"\xD800A")]
    fn hex_escapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Some(expected.to_string()), decode_hex_escapes(input));
    }

    #[test]
    fn hex_escapes_without_valid_group_yield_nothing() {
        assert_eq!(None, decode_hex_escapes(r"\xZZ"));
        assert!(!has_hex_escape(r"\x4"));
    }

    #[rstest]
    #[case::cyrillic(r"\u0442\u0435\u0441\u0442", "тест")]
    #[case::surrogate_pair(r"\uD83D\uDE00", "😀")]
    #[case::lone_surrogate(r"\uD83D\u0041", r"\uD83DA")]
    #[case::extra_digits_are_text(r"\u00411", "A1")]
    fn unicode_escapes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Some(expected.to_string()), decode_unicode_escapes(input));
    }

    #[test]
    fn unicode_escape_needs_four_digits() {
        assert!(!has_unicode_escape(r"\u041"));
        assert_eq!(None, decode_unicode_escapes(r"\u041"));
    }
}
