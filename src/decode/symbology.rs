/// Barcode symbology announced by a scanner prefix.
#[derive(Debug, Clone, Eq, PartialEq, Hash, derive_more::Display)]
pub enum Symbology {
    #[display("QR Code")]
    QrCode,
    #[display("Code 128")]
    Code128,
    #[display("EAN-13")]
    Ean13,
    #[display("EAN-8")]
    Ean8,
    #[display("UPC-A")]
    UpcA,
    #[display("UPC-E")]
    UpcE,
    #[display("Code 39")]
    Code39,
    #[display("Code 39 Full ASCII")]
    Code39FullAscii,
    #[display("Code 93")]
    Code93,
    #[display("Code 11")]
    Code11,
    #[display("Codabar")]
    Codabar,
    #[display("Data Matrix")]
    DataMatrix,
    #[display("PDF417")]
    Pdf417,
    #[display("GS1 DataBar")]
    Gs1DataBar,
    #[display("MSI")]
    Msi,
    #[display("Aztec Code")]
    Aztec,
    #[display("MaxiCode")]
    MaxiCode,
    /// Prefix that was recognised as an identifier but maps to no known code.
    #[display("Unknown ({_0})")]
    Unknown(String),
}

const GROUP_SEPARATOR: char = '\u{1D}';
const AIM_ID_LEN: usize = 3;
/// Longest Code ID accepted in front of a group separator.
const MAX_CODE_ID_LEN: usize = 4;

/// Splits a leading AIM ID (`]Q0`) or GS-terminated Code ID from `input`.
///
/// Returns the announced symbology, if any, and the remaining payload.
///
/// ```
/// use scanlink::{Symbology, split_prefix};
///
/// assert_eq!((Some(Symbology::QrCode), "PART-1"), split_prefix("]Q0PART-1"));
/// assert_eq!((None, "PART-1"), split_prefix("PART-1"));
/// ```
#[must_use]
pub fn split_prefix(input: &str) -> (Option<Symbology>, &str) {
    if let Some((symbology, rest)) = split_aim_id(input) {
        return (Some(symbology), rest);
    }
    if let Some((symbology, rest)) = split_code_id(input) {
        return (Some(symbology), rest);
    }
    (None, input)
}

fn split_aim_id(input: &str) -> Option<(Symbology, &str)> {
    let mut chars = input.chars();
    let (']', code, modifier) = (chars.next()?, chars.next()?, chars.next()?) else {
        return None;
    };
    if !code.is_ascii_alphabetic() || !modifier.is_ascii_digit() {
        return None;
    }

    let (aim_id, rest) = input.split_at(AIM_ID_LEN);
    let symbology = match (code, modifier) {
        ('Q', _) => Symbology::QrCode,
        ('C', _) => Symbology::Code128,
        ('E', _) => Symbology::Ean13,
        ('A', _) => Symbology::Code39,
        ('d', _) => Symbology::DataMatrix,
        ('I', _) => Symbology::Code93,
        ('G', _) => Symbology::Code11,
        ('X', '0') => Symbology::Code39FullAscii,
        ('U', _) => Symbology::MaxiCode,
        _ => Symbology::Unknown(aim_id.to_string()),
    };
    Some((symbology, rest))
}

fn split_code_id(input: &str) -> Option<(Symbology, &str)> {
    let (code_id, rest) = input.split_once(GROUP_SEPARATOR)?;
    if code_id.is_empty()
        || code_id.chars().count() > MAX_CODE_ID_LEN
        || !code_id.chars().all(|c| c.is_ascii_graphic())
    {
        return None;
    }

    let symbology = match code_id.chars().next()?.to_ascii_lowercase() {
        'q' => Symbology::QrCode,
        'j' => Symbology::Code128,
        'd' => Symbology::Ean13,
        'b' => Symbology::Code39,
        'u' => Symbology::DataMatrix,
        'e' => Symbology::Ean8,
        'c' => Symbology::UpcA,
        'a' => Symbology::UpcE,
        'i' => Symbology::Code93,
        'g' => Symbology::Code11,
        'f' => Symbology::Codabar,
        'p' => Symbology::Pdf417,
        'r' => Symbology::Gs1DataBar,
        'm' => Symbology::Msi,
        'z' => Symbology::Aztec,
        _ => Symbology::Unknown(code_id.to_string()),
    };
    Some((symbology, rest))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::qr("]Q0test=2024/001", Some(Symbology::QrCode), "test=2024/001")]
    #[case::code_128("]C1ABC", Some(Symbology::Code128), "ABC")]
    #[case::data_matrix("]d2010460", Some(Symbology::DataMatrix), "010460")]
    #[case::full_ascii("]X0abc", Some(Symbology::Code39FullAscii), "abc")]
    #[case::unknown_aim("]Z9abc", Some(Symbology::Unknown("]Z9".to_string())), "abc")]
    #[case::code_id("Q\u{1D}PART-1", Some(Symbology::QrCode), "PART-1")]
    #[case::lowercase_code_id("j\u{1D}12345", Some(Symbology::Code128), "12345")]
    #[case::unknown_code_id("x\u{1D}12345", Some(Symbology::Unknown("x".to_string())), "12345")]
    #[case::no_prefix("PART-123", None, "PART-123")]
    #[case::bracket_without_modifier("]QX", None, "]QX")]
    #[case::separator_too_late("ABCDEF\u{1D}1", None, "ABCDEF\u{1D}1")]
    fn splits_prefixes(
        #[case] input: &str,
        #[case] expected_symbology: Option<Symbology>,
        #[case] expected_rest: &str,
    ) {
        assert_eq!((expected_symbology, expected_rest), split_prefix(input));
    }

    #[test]
    fn unknown_symbology_renders_its_identifier() {
        assert_eq!("Unknown (]Z9)", Symbology::Unknown("]Z9".to_string()).to_string());
    }
}
