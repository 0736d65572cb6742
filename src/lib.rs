//! # smsrelay - SMS and Call Relay for AT-Command Cellular Modems
//!
//! smsrelay drives a USB cellular modem (Quectel EC25 and friends) over its AT
//! command ports and forwards what arrives to a messaging channel.
//!
//! ## Features
//!
//! - **SMS Forwarding**: Periodic scan of SIM and modem storage; every message not seen before is notified once.
//! - **Call Alerts**: A background monitor on a second AT port turns `RING` / `+CLIP:` into call notifications.
//! - **Modem Commands**: List, send and delete SMS; answer, hang up or reject calls; signal, network and storage status.
//! - **Endpoint Discovery**: Probes candidate ttyUSB ports with `AT` and keeps command and monitor roles on different ports.
//! - **Durable Dedup**: Seen messages and recipients persisted as JSON with locked atomic writes.
//! - **Daemon Mode**: Background service support (Unix) with TTY-aware logging.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smsrelay::config::Config;
//! use smsrelay::relay::Relay;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut relay = Relay::new(config);
//!     relay.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`modem`] - AT protocol, endpoint discovery, command driver and call monitor
//! - [`relay`] - message check, call notification task and notifiers
//! - [`storage`] - persisted identifier sets
//! - [`config`] - configuration loading and defaults
//! - [`logutil`] - log-safe rendering of raw device text
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │     Relay       │ ← check loop, call notifications
//! └─────────────────┘
//!     │         │
//! ┌────────┐ ┌─────────┐
//! │ Driver │ │ Monitor │ ← separate AT ports
//! └────────┘ └─────────┘
//!     │         │
//! ┌─────────────────┐
//! │  Link / Serial  │ ← device I/O
//! └─────────────────┘
//! ```

pub mod config;
pub mod logutil;
pub mod modem;
pub mod relay;
pub mod storage;
