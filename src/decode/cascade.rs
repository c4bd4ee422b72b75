use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use tracing::trace;

use super::Encoding;
use super::{escapes, mojibake};

pub(super) fn run(input: &str) -> (String, Encoding) {
    if input.is_empty() {
        return (String::new(), Encoding::None);
    }

    if escapes::has_hex_escape(input) {
        return apply(input, Encoding::HexEscape, escapes::decode_hex_escapes(input));
    }
    if is_base64_shaped(input) {
        return apply(input, Encoding::Base64, decode_base64(input));
    }
    if input.contains('%') {
        return apply(input, Encoding::Percent, decode_percent(input));
    }
    if escapes::has_unicode_escape(input) {
        return apply(
            input,
            Encoding::UnicodeEscape,
            escapes::decode_unicode_escapes(input),
        );
    }
    if mojibake::has_marker(input) {
        return match mojibake::recover(input) {
            Some((text, encoding)) => (text, encoding),
            None => {
                trace!("mis-encoding marker present but no recovery produced valid text");
                (input.to_string(), Encoding::None)
            }
        };
    }

    (input.to_string(), Encoding::None)
}

fn apply(input: &str, encoding: Encoding, recovered: Option<String>) -> (String, Encoding) {
    match recovered {
        Some(text) => (text, encoding),
        None => {
            trace!(%encoding, "decoding rule matched but failed, keeping input");
            (input.to_string(), Encoding::None)
        }
    }
}

fn is_base64_shaped(input: &str) -> bool {
    if !input.len().is_multiple_of(4) {
        return false;
    }

    let body = input.trim_end_matches('=');
    let padding = input.len() - body.len();
    !body.is_empty()
        && padding <= 2
        && body
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'+' || byte == b'/')
}

fn decode_base64(input: &str) -> Option<String> {
    let bytes = STANDARD.decode(input).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    if contains_disallowed_controls(&text) {
        return None;
    }
    Some(text)
}

fn decode_percent(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    for (index, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let well_formed = bytes
            .get(index + 1..index + 3)
            .is_some_and(|digits| digits.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            return None;
        }
    }

    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|text| text.into_owned())
}

pub(super) fn contains_disallowed_controls(text: &str) -> bool {
    text.chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\r' | '\n'))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::padded("SGVsbG8=", true)]
    #[case::unpadded("SGVsbG8h", true)]
    #[case::wrong_length("SGVsbG8", false)]
    #[case::interior_whitespace("SGVs bG8=", false)]
    #[case::foreign_character("SGVs-G8=", false)]
    #[case::too_much_padding("S===", false)]
    #[case::only_padding("====", false)]
    fn base64_shape_detection(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(expected, is_base64_shaped(input));
    }

    #[rstest]
    #[case::cyrillic("0YLQtdGB0YI=", Some("тест"))]
    #[case::invalid_utf8("/w==", None)]
    #[case::control_characters("AAEC", None)]
    fn base64_payloads(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(expected.map(str::to_string), decode_base64(input));
    }

    #[rstest]
    #[case::utf8_sequence("%D1%82%D0%B5%D1%81%D1%82", Some("тест"))]
    #[case::plus_is_space("PART+123%21", Some("PART 123!"))]
    #[case::encoded_plus_survives("1%2B1", Some("1+1"))]
    #[case::truncated_escape("100%", None)]
    #[case::non_hex_escape("%ZZ", None)]
    #[case::invalid_utf8("%FF", None)]
    fn percent_payloads(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(expected.map(str::to_string), decode_percent(input));
    }

    #[test]
    fn failing_rule_keeps_input_without_trying_later_rules() {
        let (text, encoding) = run(r"50% т");

        assert_eq!(r"50% т", text);
        assert_eq!(Encoding::None, encoding);
    }
}
