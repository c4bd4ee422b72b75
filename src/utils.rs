use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    let mut rendered = String::with_capacity(bytes.len().saturating_mul(3));
    for (index, value) in bytes.iter().enumerate() {
        if index > 0 {
            rendered.push(' ');
        }
        let high = value >> 4;
        let low = value & 0x0F;
        rendered.push(nibble_to_hex(high));
        rendered.push(nibble_to_hex(low));
    }
    rendered
}

/// Formats an optional battery percentage for terminal output.
pub(crate) fn format_battery(level: Option<u8>) -> String {
    match level {
        Some(value) => format!("{value}%"),
        None => "-".to_string(),
    }
}

/// Formats an optional timestamp as RFC 3339 for terminal output.
pub(crate) fn format_timestamp(timestamp: Option<OffsetDateTime>) -> String {
    timestamp
        .and_then(|value| value.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn nibble_to_hex(value: u8) -> char {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    HEX[value as usize] as char
}
