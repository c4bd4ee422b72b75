use encoding_rs::WINDOWS_1251;

use super::Encoding;

/// Characters that show up when Cyrillic passes through the wrong code page.
const MARKERS: [char; 3] = ['Ð', 'Ñ', 'â'];

pub(super) fn has_marker(input: &str) -> bool {
    input.contains(MARKERS)
}

/// Tries both transcoding directions and returns the first that yields
/// plausible text.
pub(super) fn recover(input: &str) -> Option<(String, Encoding)> {
    windows1251_read_as_latin1(input)
        .map(|text| (text, Encoding::Windows1251AsLatin1))
        .or_else(|| utf8_read_as_single_byte(input).map(|text| (text, Encoding::Utf8AsSingleByte)))
}

/// Undoes Windows-1251 bytes that were displayed as Latin-1.
fn windows1251_read_as_latin1(input: &str) -> Option<String> {
    let bytes = latin1_bytes(input)?;
    // Valid multi-byte UTF-8 means the other direction applies.
    if std::str::from_utf8(&bytes).is_ok() {
        return None;
    }

    let text = WINDOWS_1251.decode_without_bom_handling_and_without_replacement(&bytes)?;
    if text.chars().any(is_c1_control) {
        return None;
    }
    Some(text.into_owned())
}

/// Undoes UTF-8 bytes that were displayed through a single-byte code page.
fn utf8_read_as_single_byte(input: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(input.len());
    for c in input.chars() {
        bytes.push(single_byte(c)?);
    }
    String::from_utf8(bytes).ok()
}

fn latin1_bytes(input: &str) -> Option<Vec<u8>> {
    input
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// Maps a char to its Latin-1 byte, falling back to its Windows-1251 byte.
fn single_byte(c: char) -> Option<u8> {
    if let Ok(byte) = u8::try_from(u32::from(c)) {
        return Some(byte);
    }

    let mut buffer = [0u8; 4];
    let (encoded, _encoding, had_unmappable) = WINDOWS_1251.encode(c.encode_utf8(&mut buffer));
    match (had_unmappable, encoded.as_ref()) {
        (false, [byte]) => Some(*byte),
        _ => None,
    }
}

fn is_c1_control(c: char) -> bool {
    ('\u{80}'..='\u{9F}').contains(&c)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::upper_case_warehouse("ÑÊËÀÄ", "СКЛАД", Encoding::Windows1251AsLatin1)]
    #[case::utf8_through_latin1(
        "\u{d1}\u{82}\u{d0}\u{b5}\u{d1}\u{81}\u{d1}\u{82}",
        "тест",
        Encoding::Utf8AsSingleByte
    )]
    #[case::utf8_through_windows_code_page("Ñ‚ÐµÑ\u{81}Ñ‚", "тест", Encoding::Utf8AsSingleByte)]
    #[case::dash("â\u{80}\u{94}", "—", Encoding::Utf8AsSingleByte)]
    fn recovers_mis_transcoded_text(
        #[case] input: &str,
        #[case] expected: &str,
        #[case] expected_encoding: Encoding,
    ) {
        assert_eq!(
            Some((expected.to_string(), expected_encoding)),
            recover(input)
        );
    }

    #[test]
    fn unrecoverable_text_yields_nothing() {
        assert_eq!(None, recover("Ñ日本"));
    }

    #[test]
    fn markers_are_detected() {
        assert!(has_marker("abcÐ"));
        assert!(!has_marker("abc"));
    }
}
