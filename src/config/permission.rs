//! File mode decoding for request and per-secret permissions.

use crate::errors::ConfigError;

/// Largest mode the driver accepts (`0o777`).
pub const MAX_FILE_MODE: u32 = 0o777;

/// Decode a file mode.
///
/// Accepts the decimal JSON encoding sent by the CSI driver (`"420"`,
/// optionally quoted) as well as octal written with a leading zero (`0440`)
/// or a `0o` prefix (`0o440`).
pub fn parse_file_mode(raw: &str) -> Result<u32, ConfigError> {
    let trimmed = raw.trim();
    let value = trimmed
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim();

    if value.is_empty() {
        return Err(ConfigError::invalid_permission(raw, "empty value"));
    }

    let (digits, radix) = if let Some(rest) = value.strip_prefix("0o").or_else(|| value.strip_prefix("0O")) {
        (rest, 8)
    } else if value.len() > 1 && value.starts_with('0') {
        (&value[1..], 8)
    } else {
        (value, 10)
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::invalid_permission(raw, "expected a decimal or octal number"));
    }

    let mode = u32::from_str_radix(digits, radix).map_err(|e| {
        ConfigError::invalid_permission(raw, format!("not a valid base-{} number: {}", radix, e))
    })?;

    if mode > MAX_FILE_MODE {
        return Err(ConfigError::invalid_permission(
            raw,
            format!("mode must be between 0 and {} (0o777)", MAX_FILE_MODE),
        ));
    }

    Ok(mode)
}
