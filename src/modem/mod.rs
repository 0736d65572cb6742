//! # Modem Communication Module
//!
//! Everything that talks to the cellular modem lives here. The modem speaks the
//! Hayes/3GPP AT protocol: ASCII command lines terminated by CR/LF, free-text
//! responses ending in `OK` or `ERROR`, and unsolicited result codes such as
//! `RING` and `+CLIP:` that arrive whenever the network feels like it.
//!
//! ## Components
//!
//! - [`link`] - the byte channel to one endpoint (`Link`) and the factory that opens it (`LinkOpener`)
//! - [`discovery`] - probing candidate endpoints with `AT` and picking one per role
//! - [`parser`] - pure decoding of AT responses into [`types`] values
//! - [`driver`] - the on-demand command channel: SMS list/send/delete, calls, status
//! - [`monitor`] - the background call monitor on its own endpoint
//!
//! ## Two roles, two endpoints
//!
//! USB modems such as the Quectel EC25 expose several ttyUSB interfaces that all
//! accept AT commands. The [`driver::ModemDriver`] opens one of them only for the
//! duration of a command exchange; the [`monitor::CallMonitor`] holds another one
//! open for as long as it runs. Discovery keeps the two apart by probing in
//! opposite orders, and the serial backend opens ports exclusively so a port held
//! by one role fails to open for the other.
//!
//! ```rust,no_run
//! use smsrelay::config::Config;
//! use smsrelay::modem::driver::ModemDriver;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let mut modem = ModemDriver::serial(config.modem.clone());
//!     modem.connect().await?;
//!     println!("{}", modem.signal_strength().await?);
//!     modem.disconnect();
//!     Ok(())
//! }
//! ```

pub mod at;
pub mod discovery;
pub mod driver;
pub mod link;
pub mod monitor;
pub mod parser;
pub mod types;

pub use discovery::{Candidates, Discovered, Role};
pub use driver::ModemDriver;
pub use link::{EndpointSlot, Link, LinkOpener, SerialOpener};
pub use monitor::{CallMonitor, MonitorHandle, MonitorState};
pub use types::{CallEvent, Endpoint, ListFilter, Message, SignalBand, SignalReport, Storage};

use thiserror::Error;

/// Text fragments in transport errors that mean the device node went away
/// (USB re-enumeration, modem reset) rather than a transient I/O hiccup.
const LOST_DEVICE_MARKERS: &[&str] = &[
    "no such file",
    "no such device",
    "device reports readiness",
    "device disconnected",
    "input/output error",
];

/// Errors raised by the modem layer.
///
/// The `Display` text of every variant is what callers surface to operators,
/// so it reads like a result line rather than a debug dump.
#[derive(Debug, Error)]
pub enum ModemError {
    /// A command was issued without an open connection.
    #[error("Error: Modem not connected")]
    NotConnected,

    /// Read/write failure on an open connection.
    #[error("Error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The endpoint could not be opened (missing node, held by another process).
    #[error("Error: could not open port {path}: {reason}")]
    Open { path: String, reason: String },

    /// Opening or initialising the command connection failed.
    #[error("Failed to connect to modem: {0}")]
    Connect(String),

    /// Discovery had no candidates at all.
    #[error("No modem endpoint found matching {0}")]
    NoDeviceFound(String),

    /// The operation needs support that was not compiled in.
    #[error("Error: {0}")]
    Unsupported(String),
}

impl ModemError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ModemError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the endpoint should be forgotten and rediscovered rather than retried.
    pub fn is_device_lost(&self) -> bool {
        match self {
            // Busy ports too
            ModemError::Open { .. } => true,
            ModemError::Io { source, .. } => {
                use std::io::ErrorKind;
                if matches!(
                    source.kind(),
                    ErrorKind::NotFound | ErrorKind::BrokenPipe | ErrorKind::NotConnected
                ) {
                    return true;
                }
                let text = source.to_string().to_ascii_lowercase();
                LOST_DEVICE_MARKERS.iter().any(|m| text.contains(m))
            }
            ModemError::NoDeviceFound(_) => true,
            ModemError::NotConnected | ModemError::Connect(_) | ModemError::Unsupported(_) => false,
        }
    }
}
