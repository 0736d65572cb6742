//! Byte channel to a modem endpoint.
//!
//! [`Link`] is one open connection; [`LinkOpener`] opens links by endpoint. The
//! driver, the call monitor and discovery only ever see these traits, so the
//! serial backend can be swapped for a scripted one in tests.
//!
//! The serial implementation opens ports exclusively (TIOCEXCL on Unix), which
//! is what makes a port held by the command driver fail to open for the call
//! monitor and vice versa.

use super::types::Endpoint;
use super::ModemError;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// An open, exclusive connection to one endpoint. Dropping it closes the port.
pub trait Link: Send {
    /// Path of the endpoint this link is bound to.
    fn path(&self) -> &str;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModemError>;

    /// Number of bytes waiting in the input buffer.
    fn bytes_available(&mut self) -> Result<usize, ModemError>;

    /// Read everything currently buffered without waiting for more.
    fn read_available(&mut self) -> Result<Vec<u8>, ModemError>;

    /// Discard stale input (late responses, unsolicited codes).
    fn clear_input(&mut self) -> Result<(), ModemError>;

    /// Flush pending output before the link is dropped.
    fn close(&mut self) -> Result<(), ModemError> {
        Ok(())
    }
}

/// Opens links to endpoints.
pub trait LinkOpener: Send + Sync {
    fn open(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Link>, ModemError>;
}

/// Opens real serial ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(&self, endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Link>, ModemError> {
        #[cfg(feature = "serial")]
        {
            serial::open(endpoint, timeout)
        }

        #[cfg(not(feature = "serial"))]
        {
            let _ = timeout;
            Err(ModemError::Unsupported(format!(
                "serial support not compiled in, cannot open {}",
                endpoint.path
            )))
        }
    }
}

#[cfg(feature = "serial")]
mod serial {
    use super::{Endpoint, Link, ModemError};
    use log::trace;
    use serialport::SerialPort;
    use std::io::{ErrorKind, Read, Write};
    use std::time::Duration;

    pub(super) fn open(endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Link>, ModemError> {
        let mut builder = serialport::new(&endpoint.path, endpoint.baud_rate).timeout(timeout);
        // Some USB serial adapters need explicit settings
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder.open().map_err(|e| ModemError::Open {
            path: endpoint.path.clone(),
            reason: e.to_string(),
        })?;
        trace!("Opened serial port {}", endpoint);
        Ok(Box::new(SerialLink {
            path: endpoint.path.clone(),
            port,
        }))
    }

    struct SerialLink {
        path: String,
        port: Box<dyn SerialPort>,
    }

    fn serial_err(context: &str, e: serialport::Error) -> ModemError {
        ModemError::io(context, std::io::Error::from(e))
    }

    impl Link for SerialLink {
        fn path(&self) -> &str {
            &self.path
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
            self.port
                .write_all(bytes)
                .map_err(|e| ModemError::io(format!("write to {}", self.path), e))
        }

        fn bytes_available(&mut self) -> Result<usize, ModemError> {
            self.port
                .bytes_to_read()
                .map(|n| n as usize)
                .map_err(|e| serial_err("bytes_to_read", e))
        }

        fn read_available(&mut self) -> Result<Vec<u8>, ModemError> {
            let available = self.bytes_available()?;
            if available == 0 {
                return Ok(Vec::new());
            }
            let mut buf = vec![0u8; available];
            let mut filled = 0;
            while filled < available {
                match self.port.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(ModemError::io(format!("read from {}", self.path), e)),
                }
            }
            buf.truncate(filled);
            Ok(buf)
        }

        fn clear_input(&mut self) -> Result<(), ModemError> {
            self.port
                .clear(serialport::ClearBuffer::Input)
                .map_err(|e| serial_err("clear input", e))
        }

        fn close(&mut self) -> Result<(), ModemError> {
            self.port
                .flush()
                .map_err(|e| ModemError::io(format!("flush {}", self.path), e))
        }
    }
}

/// Shared record of the endpoint the command driver currently holds.
///
/// The call monitor reads it to warn when discovery lands on the same port.
#[derive(Debug, Clone, Default)]
pub struct EndpointSlot(Arc<RwLock<Option<String>>>);

impl EndpointSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, path: &str) {
        let mut guard = self.0.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(path.to_string());
    }

    pub fn clear(&self) {
        let mut guard = self.0.write().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    pub fn get(&self) -> Option<String> {
        self.0.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn holds(&self, path: &str) -> bool {
        self.get().as_deref() == Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_tracks_active_endpoint() {
        let slot = EndpointSlot::new();
        let shared = slot.clone();
        assert!(slot.get().is_none());
        slot.set("/dev/ttyUSB2");
        assert!(shared.holds("/dev/ttyUSB2"));
        assert!(!shared.holds("/dev/ttyUSB3"));
        shared.clear();
        assert!(slot.get().is_none());
    }

    #[cfg(not(feature = "serial"))]
    #[test]
    fn serial_opener_reports_missing_support() {
        let err = SerialOpener
            .open(&Endpoint::new("/dev/ttyUSB0", 115200), Duration::from_millis(10))
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("serial support not compiled in"));
    }
}
