//! Test utilities & fixtures.
//!
//! [`FakeModem`] is a scripted multi-port modem behind the `LinkOpener` trait:
//! each path can be present or gone, responsive or silent, and opens are
//! exclusive like real serial ports. Commands get canned replies; unsolicited
//! chunks are handed out one per poll.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use smsrelay::config::Config;
use smsrelay::modem::{Endpoint, Link, LinkOpener, ModemError};
use smsrelay::relay::notify::Notifier;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeState {
    /// Paths whose device node exists.
    pub present: HashSet<String>,
    /// Paths that answer commands at all.
    pub responsive: HashSet<String>,
    /// Paths currently held open.
    pub busy: HashSet<String>,
    /// Every successful open, in order.
    pub opens: Vec<String>,
    /// Every write as (path, lossy text).
    pub written: Vec<(String, String)>,
    /// Reply bodies by exact command; anything else gets `OK`.
    pub replies: HashMap<String, String>,
    /// `AT+CMGL` body per storage code (`SM` / `ME`).
    pub listings: HashMap<String, String>,
    /// Storage codes that answer `AT+CPMS=...` with `ERROR`.
    pub refused_storage: HashSet<String>,
    /// Storage currently selected per path.
    pub selected: HashMap<String, String>,
    /// Reply to a Ctrl-Z terminated SMS body.
    pub submit_reply: String,
    /// Input waiting to be read per path.
    pub pending: HashMap<String, Vec<u8>>,
    /// Unsolicited chunks, one released per `bytes_available` poll.
    pub unsolicited: HashMap<String, VecDeque<Vec<u8>>>,
    /// Paths whose reads fail as if the device vanished.
    pub broken: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct FakeModem(pub Arc<Mutex<FakeState>>);

impl FakeModem {
    /// Modem with every path present and responsive.
    pub fn with_ports(paths: &[String]) -> Self {
        let modem = FakeModem::default();
        {
            let mut s = modem.state();
            for p in paths {
                s.present.insert(p.clone());
                s.responsive.insert(p.clone());
            }
            s.submit_reply = "\r\n> \r\n+CMGS: 12\r\n\r\nOK\r\n".to_string();
        }
        modem
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn opener(&self) -> Arc<dyn LinkOpener> {
        Arc::new(self.clone())
    }

    pub fn reply(&self, command: &str, body: &str) {
        self.state().replies.insert(command.to_string(), body.to_string());
    }

    pub fn listing(&self, storage: &str, body: &str) {
        self.state().listings.insert(storage.to_string(), body.to_string());
    }

    pub fn push_unsolicited(&self, path: &str, chunk: &str) {
        self.state()
            .unsolicited
            .entry(path.to_string())
            .or_default()
            .push_back(chunk.as_bytes().to_vec());
    }

    /// Commands written to `path`, CR/LF stripped.
    pub fn commands_on(&self, path: &str) -> Vec<String> {
        self.state()
            .written
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, t)| t.trim_end_matches("\r\n").to_string())
            .collect()
    }

    pub fn all_commands(&self) -> Vec<String> {
        self.state()
            .written
            .iter()
            .map(|(_, t)| t.trim_end_matches("\r\n").to_string())
            .collect()
    }

    pub fn is_busy(&self, path: &str) -> bool {
        self.state().busy.contains(path)
    }

    fn respond(state: &mut FakeState, path: &str, text: &str) {
        if !state.responsive.contains(path) {
            return;
        }
        let reply = if text.ends_with('\u{1A}') {
            state.submit_reply.clone()
        } else {
            let command = text.trim_end_matches("\r\n");
            let body = if let Some(code) = command
                .strip_prefix("AT+CPMS=\"")
                .and_then(|rest| rest.get(..2))
            {
                if state.refused_storage.contains(code) {
                    "\r\nERROR\r\n".to_string()
                } else {
                    state.selected.insert(path.to_string(), code.to_string());
                    "\r\n+CPMS: 1,30,1,30,1,30\r\n\r\nOK\r\n".to_string()
                }
            } else if command.starts_with("AT+CMGL=") {
                let code = state.selected.get(path).cloned().unwrap_or_default();
                state.listings.get(&code).cloned().unwrap_or_else(|| "\r\nOK\r\n".to_string())
            } else if let Some(body) = state.replies.get(command) {
                body.clone()
            } else {
                "\r\nOK\r\n".to_string()
            };
            format!("{}\r{}", command, body)
        };
        state
            .pending
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(reply.as_bytes());
    }
}

impl LinkOpener for FakeModem {
    fn open(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<Box<dyn Link>, ModemError> {
        let mut s = self.state();
        if !s.present.contains(&endpoint.path) {
            return Err(ModemError::Open {
                path: endpoint.path.clone(),
                reason: "No such file or directory".into(),
            });
        }
        if !s.busy.insert(endpoint.path.clone()) {
            return Err(ModemError::Open {
                path: endpoint.path.clone(),
                reason: "Device or resource busy".into(),
            });
        }
        s.opens.push(endpoint.path.clone());
        Ok(Box::new(FakeLink {
            path: endpoint.path.clone(),
            modem: self.clone(),
        }))
    }
}

pub struct FakeLink {
    path: String,
    modem: FakeModem,
}

impl FakeLink {
    fn check(&self, s: &FakeState) -> Result<(), ModemError> {
        if s.broken.contains(&self.path) {
            return Err(ModemError::io(
                "read",
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "device reports readiness to read but returned no data",
                ),
            ));
        }
        Ok(())
    }
}

impl Link for FakeLink {
    fn path(&self) -> &str {
        &self.path
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        let mut s = self.modem.state();
        self.check(&s)?;
        let text = String::from_utf8_lossy(bytes).into_owned();
        s.written.push((self.path.clone(), text.clone()));
        FakeModem::respond(&mut s, &self.path, &text);
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, ModemError> {
        let mut s = self.modem.state();
        self.check(&s)?;
        let empty = s.pending.get(&self.path).map_or(true, |p| p.is_empty());
        if empty {
            if let Some(chunk) = s.unsolicited.get_mut(&self.path).and_then(|q| q.pop_front()) {
                s.pending.entry(self.path.clone()).or_default().extend(chunk);
            }
        }
        Ok(s.pending.get(&self.path).map_or(0, |p| p.len()))
    }

    fn read_available(&mut self) -> Result<Vec<u8>, ModemError> {
        let mut s = self.modem.state();
        self.check(&s)?;
        Ok(s.pending.remove(&self.path).unwrap_or_default())
    }

    fn clear_input(&mut self) -> Result<(), ModemError> {
        let mut s = self.modem.state();
        self.check(&s)?;
        s.pending.remove(&self.path);
        Ok(())
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.modem.state().busy.remove(&self.path);
    }
}

/// Notifier that records deliveries and can be told to fail for some destinations.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<(i64, String)>>>,
    pub failing: Arc<Mutex<HashSet<i64>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn fail_for(&self, id: i64) {
        self.failing.lock().unwrap_or_else(|p| p.into_inner()).insert(id);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, destination: i64, text: &str) -> Result<()> {
        if self.failing.lock().unwrap_or_else(|p| p.into_inner()).contains(&destination) {
            return Err(anyhow!("chat {} unreachable", destination));
        }
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((destination, text.to_string()));
        Ok(())
    }
}

/// Create `count` fake device nodes `ttyUSB0..` in a temp dir and return their paths.
pub fn device_nodes(count: usize) -> (tempfile::TempDir, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let paths = (0..count)
        .map(|n| {
            let path = dir.path().join(format!("ttyUSB{}", n));
            std::fs::write(&path, b"").unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect();
    (dir, paths)
}

/// Config with zero waits, no process killing and storage under `data_dir`.
///
/// `ports[0]` is the default port; all ports are preferred in order, and the
/// device pattern enumerates their directory.
pub fn test_config(data_dir: &Path, ports: &[String]) -> Config {
    let mut config = Config::default();
    config.modem.port = ports.first().cloned().unwrap_or_default();
    config.modem.preferred_ports = ports.to_vec();
    config.modem.device_pattern = ports
        .first()
        .and_then(|p| Path::new(p).parent())
        .map(|d| format!("{}/ttyUSB*", d.display()))
        .unwrap_or_default();
    config.modem.io_timeout_ms = 50;
    config.modem.open_settle_ms = 0;
    config.modem.command_wait_ms = 0;
    config.modem.init_wait_ms = 0;
    config.modem.list_wait_ms = 0;
    config.modem.sms_submit_wait_ms = 0;
    config.modem.probe_settle_ms = 0;
    config.modem.probe_wait_ms = 0;
    config.modem.kill_blocking_processes = vec![];
    config.monitor.poll_interval_ms = 10;
    config.monitor.retry_delay_secs = 1;
    config.relay.first_check_delay_secs = 0;
    config.relay.check_interval_secs = 3600;
    config.storage.data_dir = data_dir.to_string_lossy().into_owned();
    config.logging.file = None;
    config
}

/// Poll `cond` every 10ms until it holds or `limit` elapses.
pub async fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

pub const SAMPLE_SM_LISTING: &str = "\r\n+CMGL: 1,\"REC UNREAD\",\"+15551234567\",,\"24/01/01,12:00:00+04\"\r\nHello\r\n+CMGL: 2,\"REC READ\",\"+15557654321\",,\"24/01/02,08:30:00+04\"\r\nSecond message\r\n\r\nOK\r\n";
pub const SAMPLE_ME_LISTING: &str = "\r\n+CMGL: 0,\"REC UNREAD\",\"+447700900123\",,\"24/01/03,09:15:00+00\"\r\nFrom modem memory\r\n\r\nOK\r\n";
