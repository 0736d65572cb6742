//! On-demand command channel to the modem.
//!
//! [`ModemDriver`] is not held open: callers `connect()`, run a handful of
//! exchanges and `disconnect()`. Exchanges are strictly sequential; the driver
//! takes `&mut self` for every command so overlapping use of one connection
//! cannot compile.
//!
//! Every exchange is a fixed wait rather than an event-driven read: clear stale
//! input, write the command, sleep for the command's budget, then read whatever
//! the modem produced. Slow firmware needs larger `*_wait_ms` values.

use super::at;
use super::discovery::{self, Candidates, Discovered, Role};
use super::link::{EndpointSlot, Link, LinkOpener, SerialOpener};
use super::parser;
use super::types::{Endpoint, ListFilter, Message, SignalReport, Storage};
use super::ModemError;
use crate::config::ModemConfig;
use crate::logutil::escape_log;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub struct ModemDriver {
    config: ModemConfig,
    opener: Arc<dyn LinkOpener>,
    link: Option<Box<dyn Link>>,
    endpoint: Option<Endpoint>,
    slot: EndpointSlot,
}

impl ModemDriver {
    pub fn new(config: ModemConfig, opener: Arc<dyn LinkOpener>) -> Self {
        Self {
            config,
            opener,
            link: None,
            endpoint: None,
            slot: EndpointSlot::new(),
        }
    }

    /// Driver over real serial ports.
    pub fn serial(config: ModemConfig) -> Self {
        Self::new(config, Arc::new(SerialOpener))
    }

    /// Publish the active endpoint into `slot` (shared with the call monitor).
    pub fn with_slot(mut self, slot: EndpointSlot) -> Self {
        self.slot = slot;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Endpoint of the open connection, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    fn wait(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    /// Best-effort `pkill` of host processes known to grab the port.
    async fn kill_blocking_processes(&self) {
        for name in &self.config.kill_blocking_processes {
            match tokio::process::Command::new("pkill")
                .arg(name)
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await
            {
                // pkill exits 1 when nothing matched
                Ok(status) if status.success() => info!("Killed blocking process '{}'", name),
                Ok(_) => debug!("No '{}' process to kill", name),
                Err(e) => debug!("pkill {} unavailable: {}", name, e),
            }
        }
    }

    /// Pick the endpoint to open: a live preferred port, else the configured default.
    async fn resolve_endpoint(&self) -> Endpoint {
        let candidates = Candidates::Fixed(self.config.preferred_ports.clone());
        let timing = self.config.probe_timing();
        match discovery::discover(
            self.opener.as_ref(),
            &candidates,
            self.config.baud_rate,
            Role::Command,
            &timing,
        )
        .await
        {
            Ok(Discovered::Live(endpoint)) => endpoint,
            Ok(Discovered::Fallback(_)) | Err(_) => {
                debug!("Using configured modem port {}", self.config.port);
                Endpoint::new(self.config.port.clone(), self.config.baud_rate)
            }
        }
    }

    /// Open the command connection and put the modem into SMS text mode.
    ///
    /// An already open connection is closed and reopened.
    pub async fn connect(&mut self) -> Result<(), ModemError> {
        if self.is_connected() {
            self.disconnect();
        }
        self.kill_blocking_processes().await;

        let endpoint = self.resolve_endpoint().await;
        let link = self
            .opener
            .open(&endpoint, self.config.io_timeout())
            .map_err(|e| {
                error!("Failed to connect to modem on {}: {}", endpoint, e);
                ModemError::Connect(e.to_string())
            })?;
        self.link = Some(link);
        sleep(Self::wait(self.config.open_settle_ms)).await;

        let init_wait = Self::wait(self.config.init_wait_ms);
        for command in [at::ATTENTION, at::TEXT_MODE, at::CHARSET_GSM] {
            match self.send_command(command, init_wait).await {
                Ok(response) if !parser::is_success(&response) => {
                    warn!("{} not acknowledged: {}", command, escape_log(&response));
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Failed to initialise modem on {}: {}", endpoint, e);
                    self.link = None;
                    return Err(ModemError::Connect(e.to_string()));
                }
            }
        }

        self.slot.set(&endpoint.path);
        debug!("Connected to modem on {}", endpoint);
        self.endpoint = Some(endpoint);
        Ok(())
    }

    /// Close the connection if open. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close() {
                error!("Error disconnecting from {}: {}", link.path(), e);
            }
            debug!("Disconnected from modem");
        }
        self.endpoint = None;
        self.slot.clear();
    }

    /// Write `command` plus CR/LF, wait `wait`, and return everything read.
    ///
    /// Invalid UTF-8 is replaced, never rejected.
    pub async fn send_command(&mut self, command: &str, wait: Duration) -> Result<String, ModemError> {
        let link = self.link.as_mut().ok_or(ModemError::NotConnected)?;
        link.clear_input()?;
        link.write_all(format!("{}{}", command, at::TERMINATOR).as_bytes())?;
        sleep(wait).await;
        let bytes = link.read_available()?;
        let response = String::from_utf8_lossy(&bytes).into_owned();
        debug!("Command: {}, Response: {}", command, escape_log(&response));
        Ok(response)
    }

    async fn command(&mut self, command: &str) -> Result<String, ModemError> {
        let wait = Self::wait(self.config.command_wait_ms);
        self.send_command(command, wait).await
    }

    /// Make `storage` the active area. Returns false when the modem refused it.
    async fn select_storage(&mut self, storage: Storage) -> Result<bool, ModemError> {
        let response = self.command(&at::select_storage(storage)).await?;
        if parser::is_error(&response) {
            warn!(
                "Modem refused storage {}: {}",
                storage.code(),
                escape_log(&response)
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// List messages from both storage areas, SIM first.
    ///
    /// An area that cannot be selected or listed is skipped. The call fails only
    /// when no area could be listed because of a transport error.
    pub async fn list_messages(&mut self, filter: ListFilter) -> Result<Vec<Message>, ModemError> {
        let mut messages = Vec::new();
        let mut listed_any = false;
        let mut last_error = None;

        for storage in Storage::ALL {
            match self.select_storage(storage).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Selecting {} failed: {}", storage.code(), e);
                    last_error = Some(e);
                    continue;
                }
            }
            let wait = Self::wait(self.config.list_wait_ms);
            match self.send_command(&at::list_messages(filter), wait).await {
                Ok(response) => {
                    listed_any = true;
                    messages.extend(parser::parse_message_list(&response, storage));
                }
                Err(e) => {
                    warn!("Listing {} failed: {}", storage.code(), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !listed_any => Err(e),
            _ => {
                info!("Found {} total messages", messages.len());
                Ok(messages)
            }
        }
    }

    /// Raw `AT+CMGL="ALL"` output per storage area, under `=== XX Storage ===` headers.
    pub async fn list_messages_raw(&mut self) -> Result<String, ModemError> {
        let mut result = String::new();
        let mut any_content = false;
        for storage in Storage::ALL {
            self.command(&at::select_storage(storage)).await?;
            let wait = Self::wait(self.config.list_wait_ms);
            let response = self.send_command(&at::list_messages(ListFilter::All), wait).await?;
            any_content |= !response.trim().is_empty();
            result.push_str(&format!("=== {} Storage ===\n{}\n\n", storage.code(), response));
        }
        if any_content {
            Ok(result)
        } else {
            Ok("No messages found".to_string())
        }
    }

    /// Submit an SMS and return the modem's confirmation text.
    ///
    /// Success is not checked here; callers look for `OK` / `+CMGS:` in the reply.
    pub async fn send_sms(&mut self, number: &str, body: &str) -> Result<String, ModemError> {
        let prompt_wait = Self::wait(self.config.init_wait_ms);
        self.send_command(&at::compose(number), prompt_wait).await?;

        let link = self.link.as_mut().ok_or(ModemError::NotConnected)?;
        let mut payload = body.as_bytes().to_vec();
        payload.push(at::CTRL_Z);
        link.write_all(&payload)?;
        sleep(Self::wait(self.config.sms_submit_wait_ms)).await;
        let bytes = link.read_available()?;
        let response = String::from_utf8_lossy(&bytes).into_owned();
        info!("SMS to {} submitted: {}", number, escape_log(&response));
        Ok(response)
    }

    /// Delete the message at `index` in `storage`.
    pub async fn delete_message(&mut self, index: u32, storage: Storage) -> Result<String, ModemError> {
        self.command(&at::select_storage(storage)).await?;
        self.command(&at::delete(index)).await
    }

    pub async fn answer_call(&mut self) -> Result<String, ModemError> {
        self.command(at::ANSWER).await
    }

    pub async fn hangup_call(&mut self) -> Result<String, ModemError> {
        self.command(at::HANGUP).await
    }

    pub async fn reject_call(&mut self) -> Result<String, ModemError> {
        self.command(at::REJECT).await
    }

    pub async fn signal_strength(&mut self) -> Result<SignalReport, ModemError> {
        let response = self.command(at::SIGNAL_QUALITY).await?;
        Ok(parser::parse_signal(&response))
    }

    /// The `+CREG:` line, or the raw reply.
    pub async fn registration(&mut self) -> Result<String, ModemError> {
        let response = self.command(at::REGISTRATION).await?;
        Ok(parser::line_with_marker(&response, at::REGISTRATION_MARKER))
    }

    /// The `+COPS:` line, or the raw reply.
    pub async fn operator(&mut self) -> Result<String, ModemError> {
        let response = self.command(at::OPERATOR).await?;
        Ok(parser::line_with_marker(&response, at::OPERATOR_MARKER))
    }

    /// Raw `AT+CPMS?` reply (used/total per storage).
    pub async fn storage_info(&mut self) -> Result<String, ModemError> {
        self.command(at::STORAGE_QUERY).await
    }

    /// Registration, operator and signal combined for display.
    pub async fn network_report(&mut self) -> Result<String, ModemError> {
        let registration = self.registration().await?;
        let operator = self.operator().await?;
        let signal = self.signal_strength().await?;
        Ok(format!(
            "Network Information:\n\n{}\n{}\nSignal: {}",
            registration, operator, signal
        ))
    }
}

impl Drop for ModemDriver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
