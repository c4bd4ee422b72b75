use std::fmt::{self, Display, Formatter};

use crate::cli::decode::DecodeReport;
use crate::model::ScanEvent;
use crate::utils::format_hex;

use super::painter::Painter;
use super::table::Table;

/// Renders the outcome of decoding one payload.
pub(crate) struct DecodedView<'a> {
    report: &'a DecodeReport,
    painter: &'a Painter,
}

impl<'a> DecodedView<'a> {
    pub(crate) fn new(report: &'a DecodeReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for DecodedView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;
        let text = if report.transliterated() {
            format!(
                "{} {}",
                self.painter.value(report.text()),
                self.painter.muted("(transliterated)")
            )
        } else {
            self.painter.value(report.text())
        };
        let table = Table::key_value(
            self.painter,
            vec![
                ("input", report.input().to_string()),
                ("text", text),
                ("encoding", report.encoding().to_string()),
                ("symbology", report.symbology().unwrap_or("-").to_string()),
            ],
        );
        write!(f, "{table}")
    }
}

/// Renders a single received scan line.
pub(crate) struct ScanLineView<'a> {
    index: usize,
    scan: &'a ScanEvent,
    painter: &'a Painter,
}

impl<'a> ScanLineView<'a> {
    pub(crate) fn new(index: usize, scan: &'a ScanEvent, painter: &'a Painter) -> Self {
        Self {
            index,
            scan,
            painter,
        }
    }
}

impl Display for ScanLineView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self.painter.muted(format!("[{:04}]", self.index));
        write!(
            f,
            "{index_label} {} {}",
            self.painter.value(self.scan.text()),
            self.painter
                .muted(format!("encoding={}", self.scan.encoding()))
        )?;
        if let Some(symbology) = self.scan.symbology() {
            write!(f, " {}", self.painter.muted(format!("symbology={symbology}")))?;
        }
        write!(
            f,
            " {}",
            self.painter
                .muted(format!("raw={}", format_hex(self.scan.raw())))
        )
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::decode::{self, ScanDecoder};

    #[test]
    fn decoded_view_lists_text_and_rule() {
        let input = r"\x0442\x0435\x0441\x0442";
        let report = DecodeReport::new(input, decode::decode(input), false);
        let painter = Painter::new(false);

        assert_snapshot!(DecodedView::new(&report, &painter).to_string(), @r"
    ╭───────────┬──────────────────────────╮
    │ field     │ value                    │
    ├───────────┼──────────────────────────┤
    │ input     │ \x0442\x0435\x0441\x0442 │
    │ text      │ тест                     │
    │ encoding  │ hex_escape               │
    │ symbology │ -                        │
    ╰───────────┴──────────────────────────╯
    ");
    }

    #[test]
    fn scan_line_formats_index_text_and_hex() {
        let raw = b"OK".to_vec();
        let decoded = ScanDecoder::default().decode_payload(&raw);
        let scan = ScanEvent::new(raw, decoded);
        let painter = Painter::new(false);

        assert_eq!(
            "[0007] OK encoding=none raw=4F 4B",
            ScanLineView::new(7, &scan, &painter).to_string()
        );
    }

    #[test]
    fn scan_line_includes_symbology_when_split() {
        let raw = b"]Q1hello".to_vec();
        let decoded = ScanDecoder::builder()
            .strip_symbology_prefix(true)
            .build()
            .decode_payload(&raw);
        let scan = ScanEvent::new(raw, decoded);
        let painter = Painter::new(false);

        let line = ScanLineView::new(1, &scan, &painter).to_string();
        assert!(line.starts_with("[0001] hello encoding=none symbology=QR Code raw=5D 51 31"));
    }
}
