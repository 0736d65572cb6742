//! Logging helpers for raw modem traffic.
//!
//! AT responses are full of `\r\n` pairs and the occasional stray control byte
//! (Ctrl-Z echoes, NULs after a port reset). Logged verbatim they split a single
//! exchange across several log records, so everything that goes to the log is
//! passed through [`escape_log`] first.

use std::fmt::Write;

/// Default number of characters kept by [`escape_log`].
pub const DEFAULT_PREVIEW: usize = 200;

/// Escape a string for single-line logging, keeping at most [`DEFAULT_PREVIEW`] chars.
pub fn escape_log(s: &str) -> String {
    escape_log_max(s, DEFAULT_PREVIEW)
}

/// Escape a string for single-line logging:
/// - `\r` => `\\r`, `\n` => `\\n`, `\t` => `\\t`, backslash => `\\\\`
/// - Ctrl-Z (0x1A) => `<SUB>` so SMS submissions are recognisable in traces
/// - any other control char => `\\xNN`
///
/// Output is cut after `max_chars` input characters with a trailing ellipsis.
pub fn escape_log_max(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\u{1A}' => out.push_str("<SUB>"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Lossy-decode raw bytes and escape them for the log.
pub fn escape_bytes(bytes: &[u8]) -> String {
    escape_log(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_at_line_endings() {
        let esc = escape_log("AT+CSQ\r\r\n+CSQ: 31,99\r\n\r\nOK\r\n");
        assert_eq!(esc, "AT+CSQ\\r\\r\\n+CSQ: 31,99\\r\\n\\r\\nOK\\r\\n");
    }

    #[test]
    fn marks_ctrl_z_and_other_controls() {
        assert_eq!(escape_log("hi\u{1A}"), "hi<SUB>");
        assert_eq!(escape_log("\u{0}x"), "\\x00x");
    }

    #[test]
    fn truncates_long_text() {
        let long = "A".repeat(50);
        let esc = escape_log_max(&long, 10);
        assert_eq!(esc, format!("{}…", "A".repeat(10)));
    }
}
