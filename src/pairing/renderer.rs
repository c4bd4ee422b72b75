use qrcode::QrCode;
use qrcode::types::QrError;
use thiserror::Error;

use crate::hw::PairingPayload;

/// Rendering of a pairing payload an operator can scan.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PairingImage {
    rows: Vec<String>,
    modules: usize,
}

impl PairingImage {
    #[must_use]
    pub fn new(rows: Vec<String>, modules: usize) -> Self {
        Self { rows, modules }
    }

    /// Text rows of the rendered code, top to bottom.
    #[must_use]
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Width of the code in modules, without the quiet zone.
    #[must_use]
    pub fn modules(&self) -> usize {
        self.modules
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pairing payload cannot be encoded as a QR code")]
    Encode(#[from] QrError),
}

/// Turns a pairing payload into something the operator's scanner can read.
pub trait PairingImageRenderer: Send + Sync {
    fn render(&self, payload: &PairingPayload) -> Result<PairingImage, RenderError>;
}

/// Renders QR codes as block characters for a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct QrTextRenderer;

impl PairingImageRenderer for QrTextRenderer {
    fn render(&self, payload: &PairingPayload) -> Result<PairingImage, RenderError> {
        let code = QrCode::new(payload.as_str().as_bytes())?;
        let rendered = code
            .render::<char>()
            .quiet_zone(true)
            .module_dimensions(2, 1)
            .dark_color('█')
            .light_color(' ')
            .build();

        Ok(PairingImage::new(
            rendered.lines().map(str::to_string).collect(),
            code.width(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn qr_rendering_produces_square_block_text() {
        let image = QrTextRenderer
            .render(&PairingPayload::new("scanlink-pair:AA:BB:1"))
            .expect("short payloads should encode");

        // Version 2 codes are 25 modules wide.
        assert_eq!(25, image.modules());
        let width = image.rows()[0].chars().count();
        assert!(image.rows().iter().all(|row| row.chars().count() == width));
        assert_eq!(width, image.rows().len() * 2);
        assert!(image.rows().iter().any(|row| row.contains('█')));
    }
}
