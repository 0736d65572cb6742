//! Endpoint discovery.
//!
//! A candidate is live when it answers a bare `AT` with `OK`. The command role
//! probes candidates in the order given; the monitor role probes them in reverse
//! so that, on a modem exposing several AT ports, it tends to land on a
//! higher-numbered interface than the command driver. That is a heuristic only:
//! callers must cope with discovery returning a port the other role holds.

use super::at;
use super::link::LinkOpener;
use super::parser;
use super::types::Endpoint;
use super::ModemError;
use crate::logutil::escape_bytes;
use log::{debug, info, trace, warn};
use std::path::Path;
use std::time::Duration;

/// Which consumer the endpoint is being discovered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// On-demand command driver: first live candidate in configured order.
    Command,
    /// Background call monitor: last-enumerated live candidate first.
    Monitor,
}

/// Pauses used while probing one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTiming {
    /// Wait after opening before writing `AT`.
    pub settle: Duration,
    /// Wait after writing before reading the reply.
    pub response: Duration,
    /// Port read/write timeout.
    pub io_timeout: Duration,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(300),
            response: Duration::from_millis(500),
            io_timeout: Duration::from_secs(1),
        }
    }
}

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    /// A candidate answered the liveness probe.
    Live(Endpoint),
    /// Nothing answered; best-effort pick of the last enumerated candidate.
    Fallback(Endpoint),
}

impl Discovered {
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Discovered::Live(e) | Discovered::Fallback(e) => e,
        }
    }

    pub fn into_endpoint(self) -> Endpoint {
        match self {
            Discovered::Live(e) | Discovered::Fallback(e) => e,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Discovered::Live(_))
    }
}

/// Where candidate paths come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// Enumerate the filesystem with a `/dev/ttyUSB*` style pattern.
    Pattern(String),
    /// Use this exact list, in this order.
    Fixed(Vec<String>),
}

impl Candidates {
    pub fn resolve(&self) -> Vec<String> {
        match self {
            Candidates::Pattern(pattern) => enumerate_candidates(pattern),
            Candidates::Fixed(paths) => paths.clone(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Candidates::Pattern(pattern) => pattern.clone(),
            Candidates::Fixed(paths) => paths.join(", "),
        }
    }
}

/// Split a path into its non-numeric stem and trailing number for natural ordering,
/// so `ttyUSB10` sorts after `ttyUSB2`.
fn natural_key(path: &str) -> (String, u64) {
    let digits = path.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    let (stem, number) = path.split_at(path.len() - digits);
    (stem.to_string(), number.parse().unwrap_or(0))
}

/// List device paths matching `pattern`, naturally sorted.
///
/// Only a single trailing `*` is supported. A pattern without `*` yields
/// itself when the path exists.
pub fn enumerate_candidates(pattern: &str) -> Vec<String> {
    let Some(prefix) = pattern.strip_suffix('*') else {
        return if Path::new(pattern).exists() {
            vec![pattern.to_string()]
        } else {
            Vec::new()
        };
    };

    let as_path = Path::new(prefix);
    let (dir, name_prefix) = if prefix.ends_with('/') {
        (as_path.to_path_buf(), String::new())
    } else {
        let dir = as_path.parent().unwrap_or_else(|| Path::new("."));
        let name = as_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (dir.to_path_buf(), name)
    };

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot enumerate {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut found: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(&name_prefix))
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect();
    found.sort_by_key(|p| natural_key(p));
    found
}

/// Order candidates for probing according to `role`.
pub fn order_for_role(mut candidates: Vec<String>, role: Role) -> Vec<String> {
    if role == Role::Monitor {
        candidates.reverse();
    }
    candidates
}

/// Probe one endpoint: open, settle, write `AT`, wait, read, close.
///
/// Any failure (busy port, missing node, silence) counts as not live.
pub async fn probe(opener: &dyn LinkOpener, endpoint: &Endpoint, timing: &ProbeTiming) -> bool {
    let mut link = match opener.open(endpoint, timing.io_timeout) {
        Ok(link) => link,
        Err(e) => {
            trace!("Probe of {} could not open: {}", endpoint, e);
            return false;
        }
    };

    tokio::time::sleep(timing.settle).await;
    let command = format!("{}{}", at::ATTENTION, at::TERMINATOR);
    if let Err(e) = link.write_all(command.as_bytes()) {
        trace!("Probe of {} failed to write: {}", endpoint, e);
        return false;
    }
    tokio::time::sleep(timing.response).await;

    let live = match link.read_available() {
        Ok(bytes) => {
            trace!("Probe reply from {}: {}", endpoint, escape_bytes(&bytes));
            parser::is_success(&String::from_utf8_lossy(&bytes))
        }
        Err(e) => {
            trace!("Probe of {} failed to read: {}", endpoint, e);
            false
        }
    };
    if let Err(e) = link.close() {
        trace!("Closing probe link {} failed: {}", endpoint, e);
    }
    live
}

/// Find an endpoint for `role` among `candidates`.
///
/// Returns the first live candidate in role order, otherwise the last
/// enumerated candidate as a fallback. Fails only when there are no candidates.
pub async fn discover(
    opener: &dyn LinkOpener,
    candidates: &Candidates,
    baud_rate: u32,
    role: Role,
    timing: &ProbeTiming,
) -> Result<Discovered, ModemError> {
    let paths = candidates.resolve();
    let Some(last) = paths.last().cloned() else {
        return Err(ModemError::NoDeviceFound(candidates.describe()));
    };

    debug!("Discovering {:?} endpoint among {} candidates", role, paths.len());
    for path in order_for_role(paths, role) {
        let endpoint = Endpoint::new(path, baud_rate);
        if probe(opener, &endpoint, timing).await {
            info!("Found responsive modem endpoint {} ({:?})", endpoint, role);
            return Ok(Discovered::Live(endpoint));
        }
    }

    let fallback = Endpoint::new(last, baud_rate);
    warn!("No endpoint answered AT, falling back to {}", fallback);
    Ok(Discovered::Fallback(fallback))
}
