//! Background call monitor.
//!
//! The monitor owns its own endpoint for as long as it watches, separate from
//! the on-demand [`ModemDriver`](super::driver::ModemDriver). It enables
//! caller-ID presentation once per connection, then polls for unsolicited bytes
//! and turns `RING` / `+CLIP:` sightings into [`CallEvent`]s on a bounded
//! channel.
//!
//! ```text
//! Idle -> Discovering -> Connected -> Watching
//!             ^                          |
//!             |  lost / unopenable       | transport error
//!             +--------- Retrying <------+
//!
//! any state -> Stopped  (stop flag, observed between polls)
//! ```
//!
//! The loop never exits on error. Stop is cooperative: it is checked once per
//! poll interval, so shutdown latency is bounded by that interval.

use super::at;
use super::discovery::{self, Candidates, Role};
use super::link::{EndpointSlot, Link, LinkOpener};
use super::parser;
use super::types::{CallEvent, Endpoint};
use super::ModemError;
use crate::config::{ModemConfig, MonitorConfig};
use crate::logutil::{escape_bytes, escape_log};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Discovering,
    /// Endpoint open, caller-ID being enabled.
    Connected,
    Watching,
    /// Backing off after a failure.
    Retrying,
    Stopped,
}

/// Upper bound on buffered unsolicited text with no indicator in it.
const BUFFER_LIMIT: usize = 4096;
/// Tail kept when trimming, long enough to hold a split `+CLIP:`.
const BUFFER_TAIL: usize = 16;

/// Accumulates unsolicited bytes across polls until an indicator shows up.
///
/// Indicators split across reads (`"RI"` then `"NG"`) are reassembled. Bytes
/// are decoded only on dispatch, so a UTF-8 sequence split between polls
/// survives intact.
#[derive(Debug, Default)]
pub struct CallBuffer {
    bytes: Vec<u8>,
}

impl CallBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns the whole buffered text, and empties the buffer,
    /// once it contains `RING` or `+CLIP:`.
    pub fn push(&mut self, chunk: &[u8]) -> Option<String> {
        self.bytes.extend_from_slice(chunk);
        if parser::has_call_indicator(&String::from_utf8_lossy(&self.bytes)) {
            let bytes = std::mem::take(&mut self.bytes);
            return Some(String::from_utf8_lossy(&bytes).into_owned());
        }
        if self.bytes.len() > BUFFER_LIMIT {
            let mut cut = self.bytes.len() - BUFFER_TAIL;
            // Don't start the tail on a UTF-8 continuation byte
            while cut < self.bytes.len() && (self.bytes[cut] & 0xC0) == 0x80 {
                cut += 1;
            }
            self.bytes.drain(..cut);
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct CallMonitor {
    modem: ModemConfig,
    config: MonitorConfig,
    opener: Arc<dyn LinkOpener>,
    events: mpsc::Sender<CallEvent>,
    slot: EndpointSlot,
    candidates: Candidates,
}

/// Control handle for a running monitor task.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    state: watch::Receiver<MonitorState>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Receiver for observing state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the loop to stop and wait for it to close its connection.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.task.await {
            error!("Call monitor task failed: {}", e);
        }
        info!("Call monitoring stopped");
    }
}

impl CallMonitor {
    /// Monitor enumerating `modem.device_pattern` for its endpoint.
    pub fn new(
        modem: ModemConfig,
        config: MonitorConfig,
        opener: Arc<dyn LinkOpener>,
        events: mpsc::Sender<CallEvent>,
        slot: EndpointSlot,
    ) -> Self {
        let candidates = Candidates::Pattern(modem.device_pattern.clone());
        Self {
            modem,
            config,
            opener,
            events,
            slot,
            candidates,
        }
    }

    pub fn with_candidates(mut self, candidates: Candidates) -> Self {
        self.candidates = candidates;
        self
    }

    /// Spawn the monitor loop on the current tokio runtime.
    pub fn start(self) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let (state_tx, state_rx) = watch::channel(MonitorState::Idle);
        let flag = stop.clone();
        let task = tokio::spawn(async move { self.run(flag, state_tx).await });
        info!("Call monitoring task started");
        MonitorHandle {
            stop,
            state: state_rx,
            task,
        }
    }

    async fn run(self, stop: Arc<AtomicBool>, state: watch::Sender<MonitorState>) {
        let mut endpoint: Option<Endpoint> = None;

        while !stop.load(Ordering::SeqCst) {
            let target = match endpoint.take() {
                Some(known) => known,
                None => {
                    state.send_replace(MonitorState::Discovering);
                    match self.discover().await {
                        Ok(found) => found,
                        Err(e) => {
                            error!("No port available for call monitoring: {}", e);
                            self.back_off(&stop, &state).await;
                            continue;
                        }
                    }
                }
            };

            match self.watch(&target, &stop, &state).await {
                Ok(()) => break,
                Err(e) => {
                    error!("Serial error in call monitor on {}: {}", target, e);
                    if e.is_device_lost() {
                        warn!("Port {} lost or unavailable, will try to find a new port", target.path);
                    } else {
                        endpoint = Some(target);
                    }
                    if !stop.load(Ordering::SeqCst) {
                        info!(
                            "Retrying call monitor in {:.1}s...",
                            self.config.retry_delay().as_secs_f64()
                        );
                        self.back_off(&stop, &state).await;
                    }
                }
            }
        }

        state.send_replace(MonitorState::Stopped);
    }

    async fn discover(&self) -> Result<Endpoint, ModemError> {
        let found = discovery::discover(
            self.opener.as_ref(),
            &self.candidates,
            self.modem.baud_rate,
            Role::Monitor,
            &self.modem.probe_timing(),
        )
        .await?;
        let endpoint = found.into_endpoint();
        if self.slot.holds(&endpoint.path) {
            warn!(
                "Call monitor picked {} which the command driver is using; calls may be missed",
                endpoint.path
            );
        }
        Ok(endpoint)
    }

    /// Sleep for the retry delay in poll-sized steps so a stop request is noticed.
    ///
    /// The delay is never shorter than one step, so a port that fails to open
    /// still yields to the runtime between attempts.
    async fn back_off(&self, stop: &AtomicBool, state: &watch::Sender<MonitorState>) {
        state.send_replace(MonitorState::Retrying);
        let step = self.config.poll_interval();
        let mut remaining = self.config.retry_delay();
        while !remaining.is_zero() && !stop.load(Ordering::SeqCst) {
            let nap = remaining.min(step);
            sleep(nap).await;
            remaining = remaining.saturating_sub(nap);
        }
    }

    /// Hold `endpoint` open and dispatch call events until stopped or a transport error.
    async fn watch(
        &self,
        endpoint: &Endpoint,
        stop: &AtomicBool,
        state: &watch::Sender<MonitorState>,
    ) -> Result<(), ModemError> {
        info!("Connecting call monitor to {}...", endpoint);
        let mut link = self
            .opener
            .open(endpoint, self.modem.probe_timing().io_timeout)?;
        state.send_replace(MonitorState::Connected);

        let result = self.watch_link(link.as_mut(), stop, state).await;
        if let Err(e) = link.close() {
            debug!("Closing call monitor link {} failed: {}", endpoint, e);
        }
        result
    }

    async fn watch_link(
        &self,
        link: &mut dyn Link,
        stop: &AtomicBool,
        state: &watch::Sender<MonitorState>,
    ) -> Result<(), ModemError> {
        sleep(Duration::from_millis(self.modem.open_settle_ms)).await;
        link.write_all(format!("{}{}", at::ENABLE_CLIP, at::TERMINATOR).as_bytes())?;
        sleep(Duration::from_millis(self.modem.init_wait_ms)).await;
        let reply = link.read_available()?;
        info!("CLIP enabled on {}: {}", link.path(), escape_bytes(&reply));

        state.send_replace(MonitorState::Watching);
        info!("Call monitor active on {}", link.path());

        let mut buffer = CallBuffer::new();
        let poll = self.config.poll_interval();
        while !stop.load(Ordering::SeqCst) {
            if link.bytes_available()? > 0 {
                let bytes = link.read_available()?;
                if let Some(trigger) = buffer.push(&bytes) {
                    info!("Call detected: {}", escape_log(&trigger));
                    self.dispatch(CallEvent::from_trigger(&trigger));
                }
            }
            sleep(poll).await;
        }
        Ok(())
    }

    /// Queue an event without blocking detection. A full or closed queue drops it.
    fn dispatch(&self, event: CallEvent) {
        info!("Parsed caller ID: {}", event.caller);
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Call event queue full, dropping call from {}", event.caller);
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!("No call event consumer, dropping call from {}", event.caller);
            }
        }
    }
}
