//! Values exchanged between the parser, the driver and the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device communication path plus its fixed baud rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub baud_rate: u32,
}

impl Endpoint {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.baud_rate)
    }
}

/// Message storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Storage {
    /// SIM card (`SM`)
    Sim,
    /// Modem's own memory (`ME`)
    Device,
}

impl Storage {
    /// Areas in the order they are scanned.
    pub const ALL: [Storage; 2] = [Storage::Sim, Storage::Device];

    pub fn code(&self) -> &'static str {
        match self {
            Storage::Sim => "SM",
            Storage::Device => "ME",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Storage::Sim => "SIM",
            Storage::Device => "Modem",
        }
    }

    /// Parse `SM`/`ME` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SM" => Some(Storage::Sim),
            "ME" => Some(Storage::Device),
            _ => None,
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// `AT+CMGL` status selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFilter {
    #[default]
    All,
    Unread,
    Read,
    Unsent,
    Sent,
}

impl ListFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListFilter::All => "ALL",
            ListFilter::Unread => "REC UNREAD",
            ListFilter::Read => "REC READ",
            ListFilter::Unsent => "STO UNSENT",
            ListFilter::Sent => "STO SENT",
        }
    }
}

/// A decoded SMS record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub storage: Storage,
    pub index: u32,
    /// Delivery status as reported, e.g. `REC UNREAD`.
    pub status: String,
    pub sender: String,
    /// Service centre timestamp; empty when the modem omits it.
    pub timestamp: String,
    pub text: String,
}

impl Message {
    /// Dedup key combining storage, index, sender and timestamp.
    ///
    /// A sender that reuses the same index/timestamp pair yields the same key and
    /// is treated as a repeat of the earlier message.
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.storage.code(),
            self.index,
            self.sender,
            self.timestamp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SignalBand {
    pub fn label(&self) -> &'static str {
        match self {
            SignalBand::Excellent => "Excellent",
            SignalBand::Good => "Good",
            SignalBand::Fair => "Fair",
            SignalBand::Poor => "Poor",
        }
    }
}

/// Outcome of a signal quality query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalReport {
    /// RSSI sentinel 99: not known or not detectable.
    NoSignal,
    Quality { rssi: i32, band: SignalBand },
    /// `+CSQ:` present but the value did not parse.
    Unparsed(String),
    /// No `+CSQ:` line at all.
    Missing(String),
}

impl fmt::Display for SignalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalReport::NoSignal => f.write_str("No signal"),
            SignalReport::Quality { rssi, band } => write!(f, "{} (RSSI: {})", band.label(), rssi),
            SignalReport::Unparsed(raw) => write!(f, "Raw response: {}", raw),
            SignalReport::Missing(raw) => write!(f, "No signal data (raw: {})", raw),
        }
    }
}

/// Caller shown when the network withholds the number or `+CLIP` is absent.
pub const UNKNOWN_CALLER: &str = "Unknown";

/// An incoming call seen by the call monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    pub caller: String,
    /// Accumulated unsolicited text that triggered the event.
    pub raw: String,
    pub detected_at: DateTime<Utc>,
}

impl CallEvent {
    /// Build an event from trigger text, extracting the caller ID.
    pub fn from_trigger(raw: &str) -> Self {
        Self {
            caller: super::parser::parse_caller_id(raw),
            raw: raw.to_string(),
            detected_at: Utc::now(),
        }
    }

    pub fn caller_known(&self) -> bool {
        self.caller != UNKNOWN_CALLER
    }
}
