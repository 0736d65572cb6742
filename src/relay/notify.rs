//! Notification transports.
//!
//! A [`Notifier`] delivers one text to one destination and reports success or
//! failure. Delivery is best effort: one attempt per event, no retry queue.
//! Unseen SMS are retried by the next message check; call events are not.

use super::format::chunk_text;
use crate::config::TelegramConfig;
use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Deliver `text` to `destination`.
    async fn deliver(&self, destination: i64, text: &str) -> Result<()>;
}

/// Writes notifications to the log. Used when no bot token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, destination: i64, text: &str) -> Result<()> {
        info!("[notify {}] {}", destination, text.replace('\n', " | "));
        Ok(())
    }
}

#[cfg(feature = "telegram")]
pub use telegram::TelegramNotifier;

#[cfg(feature = "telegram")]
mod telegram {
    use super::Notifier;
    use crate::config::TelegramConfig;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use log::debug;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Telegram Bot API `sendMessage` client.
    pub struct TelegramNotifier {
        client: reqwest::Client,
        config: TelegramConfig,
    }

    #[derive(Debug, Deserialize)]
    struct ApiResponse {
        ok: bool,
        #[serde(default)]
        description: Option<String>,
    }

    impl TelegramNotifier {
        pub fn new(config: TelegramConfig) -> Self {
            Self {
                client: reqwest::Client::new(),
                config,
            }
        }

        fn send_url(&self) -> String {
            format!(
                "{}/bot{}/sendMessage",
                self.config.api_base.trim_end_matches('/'),
                self.config.bot_token
            )
        }
    }

    #[async_trait]
    impl Notifier for TelegramNotifier {
        fn name(&self) -> &'static str {
            "telegram"
        }

        async fn deliver(&self, destination: i64, text: &str) -> Result<()> {
            let body = serde_json::json!({ "chat_id": destination, "text": text });
            let request = self.client.post(self.send_url()).json(&body);
            let timeout_duration = Duration::from_secs(self.config.timeout_seconds);

            let response = timeout(timeout_duration, request.send())
                .await
                .map_err(|_| anyhow!("Request timeout after {}s", self.config.timeout_seconds))?
                .map_err(|e| anyhow!("HTTP request failed: {}", e.without_url()))?;

            let status = response.status();
            let api: ApiResponse = response
                .json()
                .await
                .map_err(|e| {
                    anyhow!("Failed to parse Telegram response ({}): {}", status, e.without_url())
                })?;
            if !status.is_success() || !api.ok {
                return Err(anyhow!(
                    "Telegram API returned {}: {}",
                    status,
                    api.description.unwrap_or_default()
                ));
            }
            debug!("Delivered {} chars to chat {}", text.chars().count(), destination);
            Ok(())
        }
    }
}

/// Telegram notifier when configured and compiled in, log notifier otherwise.
pub fn build_notifier(config: &TelegramConfig) -> Arc<dyn Notifier> {
    if config.is_configured() {
        #[cfg(feature = "telegram")]
        {
            return Arc::new(TelegramNotifier::new(config.clone()));
        }
        #[cfg(not(feature = "telegram"))]
        warn!("Telegram enabled in config but support is not compiled in, logging notifications instead");
    } else if config.enabled {
        warn!("Telegram enabled but bot_token is empty, logging notifications instead");
    }
    Arc::new(LogNotifier)
}

/// Deliver `text` to one destination in chunks of at most `max_chars`.
///
/// Succeeds once the first chunk is delivered. A later chunk that fails is
/// logged and skipped, not retried.
pub async fn deliver_chunked(
    notifier: &dyn Notifier,
    destination: i64,
    text: &str,
    max_chars: usize,
) -> Result<()> {
    let chunks = chunk_text(text, max_chars);
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        if let Err(e) = notifier.deliver(destination, chunk).await {
            if i == 0 {
                return Err(e);
            }
            warn!(
                "Chunk {}/{} to {} failed, message is incomplete: {:#}",
                i + 1,
                total,
                destination,
                e
            );
        }
    }
    Ok(())
}

/// Deliver `text` to every recipient; returns how many deliveries succeeded.
pub async fn broadcast(
    notifier: &dyn Notifier,
    recipients: &[i64],
    text: &str,
    max_chars: usize,
) -> usize {
    let mut delivered = 0;
    for &destination in recipients {
        match deliver_chunked(notifier, destination, text, max_chars).await {
            Ok(()) => {
                delivered += 1;
                info!("Sent notification to user {} via {}", destination, notifier.name());
            }
            Err(e) => error!("Error sending notification to {}: {:#}", destination, e),
        }
    }
    delivered
}
