//! Line-oriented CSV helpers shared by the endpoint and sequence files.

/// Drop everything from the first `#`, then trim.
pub fn strip_inline_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

/// `true` when `line` is a `[name]` section marker (case-insensitive,
/// optionally prefixed with `#`).
pub fn is_section_line(line: &str, name: &str) -> bool {
    let line = line.trim();
    let line = line.strip_prefix('#').map_or(line, str::trim_start);
    let Some(rest) = line.strip_prefix('[') else {
        return false;
    };
    match rest.find(']') {
        Some(end) => rest[..end].eq_ignore_ascii_case(name),
        None => false,
    }
}

/// Split a row into trimmed, non-empty comma-separated fields, keeping at
/// most `N`.
pub fn split_fields<const N: usize>(row: &str) -> heapless::Vec<&str, N> {
    let mut fields = heapless::Vec::new();
    for field in row.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if fields.push(field).is_err() {
            break;
        }
    }
    fields
}

/// Parse an unsigned decimal or `0x` hexadecimal field.
pub fn parse_u32(field: &str) -> Option<u32> {
    let field = field.trim();
    match hex_digits(field) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => field.parse().ok(),
    }
}

/// Parse a signed decimal or `0x` hexadecimal field.
///
/// Hex values are read as a 32-bit pattern, so `0xFFFFFFFF` is `-1`.
pub fn parse_i32(field: &str) -> Option<i32> {
    let field = field.trim();
    match hex_digits(field) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|v| v as i32),
        None => field.parse().ok(),
    }
}

fn hex_digits(field: &str) -> Option<&str> {
    field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
}
