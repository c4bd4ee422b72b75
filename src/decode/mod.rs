//! Recovery of readable text from scanner payloads.
//!
//! Scanners deliver text that may have been escaped, transport-encoded or
//! transcoded through the wrong code page on the way. [`decode`] runs a fixed
//! cascade of recovery rules and reports which one applied. [`ScanDecoder`]
//! wraps the cascade with payload handling configured from
//! [`ScannerSettings`](crate::ScannerSettings).

mod cascade;
mod escapes;
mod mojibake;
mod symbology;
mod translit;

use bon::Builder;
use serde::Serialize;
use strum_macros::{Display, EnumIter};

use crate::config::ScannerSettings;

pub use self::symbology::{Symbology, split_prefix};
pub use self::translit::latin_to_cyrillic;

/// Which recovery rule produced the decoded text.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumIter, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Input was already readable.
    #[strum(to_string = "none")]
    None,
    #[strum(to_string = "hex_escape")]
    HexEscape,
    #[strum(to_string = "base64")]
    Base64,
    #[strum(to_string = "percent")]
    Percent,
    #[strum(to_string = "unicode_escape")]
    UnicodeEscape,
    /// Windows-1251 bytes that had been read as Latin-1.
    #[strum(to_string = "windows1251_as_latin1")]
    Windows1251AsLatin1,
    /// UTF-8 bytes that had been read through a single-byte code page.
    #[strum(to_string = "utf8_as_single_byte")]
    Utf8AsSingleByte,
    /// Raw payload bytes were not UTF-8 and were read as Windows-1251.
    #[strum(to_string = "windows1251_bytes")]
    Windows1251Bytes,
}

/// Decoded text with the rule that produced it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Decoded {
    text: String,
    encoding: Encoding,
    symbology: Option<Symbology>,
}

impl Decoded {
    fn new(text: String, encoding: Encoding) -> Self {
        Self {
            text,
            encoding,
            symbology: None,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Symbology announced by a stripped AIM or Code ID prefix.
    #[must_use]
    pub fn symbology(&self) -> Option<&Symbology> {
        self.symbology.as_ref()
    }

    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }

    pub(crate) fn into_parts(self) -> (String, Encoding, Option<Symbology>) {
        (self.text, self.encoding, self.symbology)
    }
}

/// Runs the recovery cascade over `input`.
///
/// The first rule whose trigger matches decides the outcome. A rule that
/// triggers but cannot produce valid text returns the input unchanged.
///
/// ```
/// use scanlink::{Encoding, decode};
///
/// let decoded = decode(r"\x0442\x0435\x0441\x0442");
/// assert_eq!("тест", decoded.text());
/// assert_eq!(Encoding::HexEscape, decoded.encoding());
/// ```
#[must_use]
pub fn decode(input: &str) -> Decoded {
    let (text, encoding) = cascade::run(input);
    Decoded::new(text, encoding)
}

/// Payload decoder configured from scanner settings.
#[derive(Debug, Clone, Copy, Builder)]
pub struct ScanDecoder {
    #[builder(default = true)]
    trim_payload: bool,
    #[builder(default)]
    strip_symbology_prefix: bool,
}

impl Default for ScanDecoder {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScanDecoder {
    /// Creates a decoder honouring the payload options in `settings`.
    #[must_use]
    pub fn from_settings(settings: &ScannerSettings) -> Self {
        Self::builder()
            .trim_payload(settings.trim_payload())
            .strip_symbology_prefix(settings.strip_symbology_prefix())
            .build()
    }

    /// Decodes a raw scanner payload.
    ///
    /// Bytes that are not valid UTF-8 are read as Windows-1251 before the
    /// cascade runs.
    #[must_use]
    pub fn decode_payload(&self, payload: &[u8]) -> Decoded {
        match std::str::from_utf8(payload) {
            Ok(text) => self.decode_text(text),
            Err(_error) => {
                let (text, _had_errors) =
                    encoding_rs::WINDOWS_1251.decode_without_bom_handling(payload);
                let mut decoded = self.decode_text(&text);
                if decoded.encoding == Encoding::None {
                    decoded.encoding = Encoding::Windows1251Bytes;
                }
                decoded
            }
        }
    }

    /// Decodes text delivered by a keyboard-wedge or recogniser.
    #[must_use]
    pub fn decode_text(&self, input: &str) -> Decoded {
        let input = if self.trim_payload {
            input.trim()
        } else {
            input
        };
        let (symbology, body) = if self.strip_symbology_prefix {
            split_prefix(input)
        } else {
            (None, input)
        };

        let mut decoded = decode(body);
        decoded.symbology = symbology;
        decoded
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn payload_bytes_in_windows_1251_are_recovered() {
        let payload = [0xD1, 0xCA, 0xCB, 0xC0, 0xC4];

        let decoded = ScanDecoder::default().decode_payload(&payload);

        assert_eq!("СКЛАД", decoded.text());
        assert_eq!(Encoding::Windows1251Bytes, decoded.encoding());
    }

    #[test]
    fn utf8_payload_is_trimmed_by_default() {
        let decoded = ScanDecoder::default().decode_payload(b"  PART-123\r\n");

        assert_eq!("PART-123", decoded.text());
        assert_eq!(Encoding::None, decoded.encoding());
    }

    #[test]
    fn trimming_can_be_disabled() {
        let decoder = ScanDecoder::builder().trim_payload(false).build();

        assert_eq!(" PART ", decoder.decode_text(" PART ").text());
    }

    #[rstest]
    #[case::enabled(true, "test=2024/001", Some(Symbology::QrCode))]
    #[case::disabled(false, "]Q0test=2024/001", None)]
    fn symbology_prefix_is_stripped_only_when_enabled(
        #[case] strip: bool,
        #[case] expected_text: &str,
        #[case] expected_symbology: Option<Symbology>,
    ) {
        let decoder = ScanDecoder::builder()
            .strip_symbology_prefix(strip)
            .build();

        let decoded = decoder.decode_text("]Q0test=2024/001");

        assert_eq!(expected_text, decoded.text());
        assert_eq!(expected_symbology.as_ref(), decoded.symbology());
    }

    #[test]
    fn prefix_stripped_payload_still_runs_the_cascade() {
        let decoder = ScanDecoder::builder().strip_symbology_prefix(true).build();

        let decoded = decoder.decode_text("]Q0\\x0442\\x0435\\x0441\\x0442");

        assert_eq!("тест", decoded.text());
        assert_eq!(Encoding::HexEscape, decoded.encoding());
    }
}
