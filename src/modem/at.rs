//! AT command vocabulary used by the driver and the call monitor.
//!
//! Only the commands this crate issues are listed. Builders take already
//! validated values; quoting follows 3GPP TS 27.005/27.007 text mode.

use super::types::{ListFilter, Storage};

/// Line terminator appended to every command.
pub const TERMINATOR: &str = "\r\n";
/// Ctrl-Z, ends an SMS body in text mode.
pub const CTRL_Z: u8 = 0x1A;

/// Liveness check.
pub const ATTENTION: &str = "AT";
/// Select SMS text mode.
pub const TEXT_MODE: &str = "AT+CMGF=1";
/// Select the GSM default alphabet for text mode.
pub const CHARSET_GSM: &str = "AT+CSCS=\"GSM\"";
/// Answer an incoming call.
pub const ANSWER: &str = "ATA";
/// Hang up the active call.
pub const HANGUP: &str = "ATH";
/// Reject a ringing call.
pub const REJECT: &str = "AT+CHUP";
/// Signal quality query.
pub const SIGNAL_QUALITY: &str = "AT+CSQ";
/// Network registration query.
pub const REGISTRATION: &str = "AT+CREG?";
/// Current operator query.
pub const OPERATOR: &str = "AT+COPS?";
/// Preferred message storage query.
pub const STORAGE_QUERY: &str = "AT+CPMS?";
/// Enable calling line identification presentation.
pub const ENABLE_CLIP: &str = "AT+CLIP=1";

/// Final result code of a successful exchange.
pub const OK: &str = "OK";
/// Final result code of a failed exchange (also prefixes `+CMS ERROR` / `+CME ERROR`).
pub const ERROR: &str = "ERROR";
/// Header prefix of each `AT+CMGL` record.
pub const LIST_MARKER: &str = "+CMGL:";
pub const SIGNAL_MARKER: &str = "+CSQ:";
pub const REGISTRATION_MARKER: &str = "+CREG:";
pub const OPERATOR_MARKER: &str = "+COPS:";
/// Unsolicited ring indication.
pub const RING: &str = "RING";
/// Unsolicited caller-ID notification.
pub const CLIP_MARKER: &str = "+CLIP:";

/// `AT+CPMS` selecting `storage` for reading, writing and receiving.
pub fn select_storage(storage: Storage) -> String {
    let code = storage.code();
    format!("AT+CPMS=\"{code}\",\"{code}\",\"{code}\"")
}

/// `AT+CMGL` listing the messages matching `filter` in the active storage.
pub fn list_messages(filter: ListFilter) -> String {
    format!("AT+CMGL=\"{}\"", filter.as_str())
}

/// `AT+CMGS` opening a text-mode submission to `number`.
pub fn compose(number: &str) -> String {
    format!("AT+CMGS=\"{}\"", number)
}

/// `AT+CMGD` deleting `index` in the active storage.
pub fn delete(index: u32) -> String {
    format!("AT+CMGD={}", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_storage_and_list_commands() {
        assert_eq!(select_storage(Storage::Sim), "AT+CPMS=\"SM\",\"SM\",\"SM\"");
        assert_eq!(select_storage(Storage::Device), "AT+CPMS=\"ME\",\"ME\",\"ME\"");
        assert_eq!(list_messages(ListFilter::All), "AT+CMGL=\"ALL\"");
        assert_eq!(list_messages(ListFilter::Unread), "AT+CMGL=\"REC UNREAD\"");
    }

    #[test]
    fn builds_sms_commands() {
        assert_eq!(compose("+15551234567"), "AT+CMGS=\"+15551234567\"");
        assert_eq!(delete(7), "AT+CMGD=7");
    }
}
