//! # Relay - SMS and Call Forwarding
//!
//! [`Relay`] is the context object built once at startup. It owns the command
//! driver and the dedup store, and shares the recipient registry and the
//! notifier with the call notification task.
//!
//! ```text
//!   CallMonitor task ──CallEvent──▶ bounded mpsc ──▶ call notifier task ──▶ Notifier
//!                                                                        ▲
//!   interval tick ──▶ Relay::check_new_messages ──▶ ModemDriver           │
//!                              │                                          │
//!                              └──── unseen SMS ──────────────────────────┘
//! ```
//!
//! - [`format`] - notification text and chunking
//! - [`notify`] - the `Notifier` boundary and its implementations

pub mod format;
pub mod notify;

use crate::config::Config;
use crate::modem::link::{EndpointSlot, LinkOpener, SerialOpener};
use crate::modem::monitor::CallMonitor;
use crate::modem::types::{CallEvent, ListFilter};
use crate::modem::{ModemDriver, ModemError};
use crate::storage::{RecipientRegistry, SeenStore};
use anyhow::Result;
use log::{debug, error, info, warn};
use self::notify::{broadcast, Notifier};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Outcome of one message check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    /// Messages read from the modem.
    pub listed: usize,
    /// Of those, not yet in the seen store.
    pub new: usize,
    /// Of the new ones, delivered to at least one recipient and marked seen.
    pub notified: usize,
}

pub struct Relay {
    config: Config,
    opener: Arc<dyn LinkOpener>,
    slot: EndpointSlot,
    driver: ModemDriver,
    seen: SeenStore,
    recipients: Arc<Mutex<RecipientRegistry>>,
    notifier: Arc<dyn Notifier>,
}

impl Relay {
    /// Relay over real serial ports, notifying through the configured transport.
    pub fn new(config: Config) -> Self {
        let notifier = notify::build_notifier(&config.telegram);
        Self::with_parts(config, Arc::new(SerialOpener), notifier)
    }

    pub fn with_parts(config: Config, opener: Arc<dyn LinkOpener>, notifier: Arc<dyn Notifier>) -> Self {
        let slot = EndpointSlot::new();
        let driver = ModemDriver::new(config.modem.clone(), opener.clone()).with_slot(slot.clone());
        let seen = SeenStore::load(config.storage.seen_path());
        let recipients = RecipientRegistry::load(config.storage.recipients_path());
        info!(
            "Loaded {} seen messages and {} recipients",
            seen.len(),
            recipients.len()
        );
        Self {
            config,
            opener,
            slot,
            driver,
            seen,
            recipients: Arc::new(Mutex::new(recipients)),
            notifier,
        }
    }

    /// Registered recipients in ascending order.
    pub async fn recipients(&self) -> Vec<i64> {
        self.recipients.lock().await.to_sorted_vec()
    }

    /// Add a notification destination. Returns false if it was already registered.
    pub async fn register_recipient(&self, id: i64) -> bool {
        let added = self.recipients.lock().await.insert(id);
        if added {
            info!("Registered recipient {}", id);
        }
        added
    }

    pub async fn is_authorized(&self, id: i64) -> bool {
        self.recipients.lock().await.contains(&id)
    }

    /// Forget every notified message; all stored SMS are re-sent on the next check.
    pub fn clear_seen(&mut self) {
        let before = self.seen.len();
        self.seen.clear();
        info!("Cleared seen messages cache ({} entries)", before);
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Connect, list both storages, disconnect, and notify every unseen message.
    ///
    /// A message is marked seen only after at least one recipient received it,
    /// so with no recipients registered nothing is consumed. Safe to call
    /// repeatedly: a second call with no new messages notifies nothing.
    pub async fn check_new_messages(&mut self) -> Result<CheckSummary, ModemError> {
        info!("=== Checking for new SMS ===");
        if let Err(e) = self.driver.connect().await {
            warn!("Failed to connect for message check: {}", e);
            return Err(e);
        }
        let listed = self.driver.list_messages(ListFilter::All).await;
        self.driver.disconnect();
        let messages = listed?;
        info!("Retrieved {} messages from modem", messages.len());

        let recipients = self.recipients().await;
        let max_chars = self.config.relay.max_chunk_chars;
        let mut summary = CheckSummary {
            listed: messages.len(),
            ..CheckSummary::default()
        };

        for message in &messages {
            let id = message.id();
            if self.seen.contains(&id) {
                continue;
            }
            summary.new += 1;
            info!("New message detected: {}", id);
            if recipients.is_empty() {
                continue;
            }
            let text = format::sms_notification(message);
            let delivered = broadcast(self.notifier.as_ref(), &recipients, &text, max_chars).await;
            if delivered > 0 {
                self.seen.insert(id);
                summary.notified += 1;
            } else {
                warn!("No recipient received {}, will retry next check", id);
            }
        }

        if summary.new == 0 {
            debug!("No new messages");
        } else if recipients.is_empty() {
            warn!(
                "{} new messages waiting, no recipients registered",
                summary.new
            );
        } else {
            info!("Notified about {} new messages", summary.notified);
        }
        Ok(summary)
    }

    /// Spawn the task that turns call events into notifications.
    ///
    /// The task ends when every sender is dropped and returns how many events
    /// it handled.
    pub fn spawn_call_notifier(&self, mut events: mpsc::Receiver<CallEvent>) -> JoinHandle<usize> {
        let recipients = self.recipients.clone();
        let notifier = self.notifier.clone();
        let max_chars = self.config.relay.max_chunk_chars;
        tokio::spawn(async move {
            let mut handled = 0;
            while let Some(event) = events.recv().await {
                handled += 1;
                info!("Incoming call from: {}", event.caller);
                let targets = recipients.lock().await.to_sorted_vec();
                if targets.is_empty() {
                    warn!("Call from {} not forwarded, no recipients registered", event.caller);
                    continue;
                }
                let text = format::call_notification(&event);
                broadcast(notifier.as_ref(), &targets, &text, max_chars).await;
            }
            handled
        })
    }

    /// Run until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await
    }

    /// Start the call monitor and periodic message checks; stop when `shutdown` resolves.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::channel(self.config.monitor.event_queue.max(1));
        let call_notifier = self.spawn_call_notifier(rx);

        let monitor = if self.config.monitor.enabled {
            let monitor = CallMonitor::new(
                self.config.modem.clone(),
                self.config.monitor.clone(),
                self.opener.clone(),
                tx,
                self.slot.clone(),
            );
            Some(monitor.start())
        } else {
            info!("Call monitoring disabled");
            drop(tx);
            None
        };

        let first = Duration::from_secs(self.config.relay.first_check_delay_secs);
        let period = Duration::from_secs(self.config.relay.check_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + first, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "SMS relay running: checking every {}s, first check in {}s",
            period.as_secs(),
            first.as_secs()
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check_new_messages().await {
                        error!("Error in message check: {}", e);
                    }
                }
                _ = &mut shutdown => break,
            }
        }

        if let Some(handle) = monitor {
            handle.stop().await;
        }
        match call_notifier.await {
            Ok(handled) => debug!("Call notifier finished after {} events", handled),
            Err(e) => error!("Call notifier task failed: {}", e),
        }
        self.driver.disconnect();
        info!("SMS relay stopped");
        Ok(())
    }
}
