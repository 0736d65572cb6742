//! Notification text rendering.

use crate::modem::types::{CallEvent, Message};

/// Text sent to recipients for one new SMS.
pub fn sms_notification(message: &Message) -> String {
    format!(
        "📩 New SMS\n\nFrom: {}\nStorage: {} [{}]\nStatus: {}\nTime: {}\n\n{}\n",
        message.sender,
        message.storage.code(),
        message.index,
        message.status,
        message.timestamp,
        message.text
    )
}

/// Text sent to recipients when a call rings.
pub fn call_notification(event: &CallEvent) -> String {
    format!(
        "📞 Incoming Call\n\nFrom: {}\n\nUse /answer to answer\nUse /reject to reject\nUse /hangup to hangup\n",
        event.caller
    )
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Prefers breaking after a newline in the second half of a piece so listings
/// are not cut mid-line. Never splits a UTF-8 sequence.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + max_chars).min(chars.len());
        if end < chars.len() {
            let floor = start + max_chars / 2;
            if let Some(nl) = (floor..end).rev().find(|&i| chars[i] == '\n') {
                end = nl + 1;
            }
        }
        chunks.push(chars[start..end].iter().collect());
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::types::Storage;

    #[test]
    fn sms_text_carries_all_fields() {
        let msg = Message {
            storage: Storage::Device,
            index: 7,
            status: "REC UNREAD".into(),
            sender: "+15551234567".into(),
            timestamp: "24/01/01,12:00:00".into(),
            text: "Hello".into(),
        };
        let text = sms_notification(&msg);
        assert!(text.starts_with("📩 New SMS\n\nFrom: +15551234567\n"));
        assert!(text.contains("Storage: ME [7]\n"));
        assert!(text.contains("Time: 24/01/01,12:00:00\n\nHello"));
    }

    #[test]
    fn call_text_lists_actions() {
        let event = CallEvent::from_trigger("+CLIP: \"+34600\",145");
        let text = call_notification(&event);
        assert!(text.contains("From: +34600"));
        assert!(text.contains("/answer"));
        assert!(text.contains("/hangup"));
    }

    #[test]
    fn chunks_respect_limit_and_chars() {
        let text = "é".repeat(10);
        let chunks = chunk_text(&text, 4);
        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
        assert_eq!(chunk_text("short", 4000), vec!["short"]);
    }

    #[test]
    fn chunks_prefer_line_breaks() {
        let text = "aaaa\nbbbb\ncccc";
        let chunks = chunk_text(text, 8);
        assert_eq!(chunks, vec!["aaaa\n", "bbbb\n", "cccc"]);
        assert_eq!(chunks.concat(), text);
    }
}
