//! Decoding of AT response text.
//!
//! Every function here is total: firmware formatting is not contractual, so
//! unexpected input degrades to an empty list, a sentinel, or the raw text.
//! Nothing panics and nothing returns an error.

use super::at;
use super::types::{Message, SignalBand, SignalReport, Storage, UNKNOWN_CALLER};
use crate::logutil::escape_log;
use log::warn;

/// Split a response into lines, accepting both `\r\n` and bare `\n`.
fn lines(response: &str) -> impl Iterator<Item = &str> {
    response.split('\n').map(|l| l.trim_end_matches('\r'))
}

/// Split comma-separated AT fields, keeping commas inside double quotes.
///
/// `1,"REC READ","+1555",,"24/01/01,12:00:00+04"` yields five fields; the
/// timestamp keeps its embedded comma. Quotes are left in place.
pub fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Strip one pair of surrounding double quotes from a body line.
fn body_text(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Decode one `+CMGL:` header line into (index, status, sender, timestamp).
fn parse_list_header(line: &str) -> Option<(u32, String, String, String)> {
    let rest = line.trim().strip_prefix(at::LIST_MARKER)?;
    let fields = split_fields(rest);
    if fields.len() < 3 {
        return None;
    }
    let index = fields[0].trim().parse::<u32>().ok()?;
    let status = unquote(fields[1]).to_string();
    let sender = unquote(fields[2]).to_string();
    // 27.005 text mode: <index>,<stat>,<oa/da>,[<alpha>],[<scts>],...
    let timestamp = fields.get(4).map(|f| unquote(f).to_string()).unwrap_or_default();
    Some((index, status, sender, timestamp))
}

/// Decode an `AT+CMGL` response for one storage area.
///
/// A record is a header line followed by a non-empty body line. Malformed
/// headers are logged and skipped; a header whose next line is blank, missing,
/// or another header yields no record.
pub fn parse_message_list(response: &str, storage: Storage) -> Vec<Message> {
    let all: Vec<&str> = lines(response).collect();
    let mut messages = Vec::new();
    for (i, line) in all.iter().enumerate() {
        if !line.trim_start().starts_with(at::LIST_MARKER) {
            continue;
        }
        let Some((index, status, sender, timestamp)) = parse_list_header(line) else {
            warn!("Skipping malformed {} header: {}", at::LIST_MARKER, escape_log(line));
            continue;
        };
        let Some(body) = all.get(i + 1) else {
            continue;
        };
        if body.trim().is_empty() || body.trim_start().starts_with(at::LIST_MARKER) {
            continue;
        }
        messages.push(Message {
            storage,
            index,
            status,
            sender,
            timestamp,
            text: body_text(body).to_string(),
        });
    }
    messages
}

/// Map a raw RSSI value onto the five reported bands.
pub fn classify_rssi(rssi: i32) -> SignalReport {
    let band = match rssi {
        99 => return SignalReport::NoSignal,
        r if r >= 20 => SignalBand::Excellent,
        r if r >= 15 => SignalBand::Good,
        r if r >= 10 => SignalBand::Fair,
        _ => SignalBand::Poor,
    };
    SignalReport::Quality { rssi, band }
}

/// Extract the integer before the first comma after `+CSQ:`.
pub fn parse_rssi(response: &str) -> Option<i32> {
    let (_, after) = response.split_once(at::SIGNAL_MARKER)?;
    let line = after.split(['\r', '\n']).next().unwrap_or_default();
    line.split(',').next()?.trim().parse().ok()
}

/// Decode an `AT+CSQ` response.
pub fn parse_signal(response: &str) -> SignalReport {
    if !response.contains(at::SIGNAL_MARKER) {
        return SignalReport::Missing(response.trim().to_string());
    }
    match parse_rssi(response) {
        Some(rssi) => classify_rssi(rssi),
        None => {
            warn!("Unparseable signal response: {}", escape_log(response));
            SignalReport::Unparsed(response.trim().to_string())
        }
    }
}

/// Extract the caller number from `+CLIP: "<number>",<type>,...`.
///
/// Falls back to [`UNKNOWN_CALLER`] when the marker is absent or the field is empty.
pub fn parse_caller_id(text: &str) -> String {
    let Some((_, after)) = text.split_once(at::CLIP_MARKER) else {
        return UNKNOWN_CALLER.to_string();
    };
    let line = after.split(['\r', '\n']).next().unwrap_or_default();
    let first = split_fields(line).first().map(|f| unquote(f)).unwrap_or_default();
    if first.is_empty() {
        UNKNOWN_CALLER.to_string()
    } else {
        first.to_string()
    }
}

/// The line carrying `marker`, trimmed, or the whole trimmed response if none does.
pub fn line_with_marker(response: &str, marker: &str) -> String {
    lines(response)
        .find(|l| l.contains(marker))
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| response.trim().to_string())
}

/// Whether the response carries the `OK` final result code.
pub fn is_success(response: &str) -> bool {
    lines(response).any(|l| l.trim() == at::OK)
}

/// Whether the response carries `ERROR`, `+CMS ERROR: n` or `+CME ERROR: n`.
pub fn is_error(response: &str) -> bool {
    lines(response).any(|l| {
        let l = l.trim();
        l == at::ERROR || l.starts_with("+CMS ERROR") || l.starts_with("+CME ERROR")
    })
}

/// Whether unsolicited text contains a ring or caller-ID indication.
pub fn has_call_indicator(text: &str) -> bool {
    text.contains(at::RING) || text.contains(at::CLIP_MARKER)
}
