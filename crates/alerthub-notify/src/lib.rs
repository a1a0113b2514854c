//! Notification delivery with pluggable channel senders.
//!
//! The engine hands a rendered `(title, body, is_recovery)` triple plus the
//! channel's config string to [`SenderRegistry::send`], which dispatches by
//! channel type tag and retries transient failures. Built-in senders cover
//! Telegram and Lark; the Lark sender sits behind a token-bucket rate
//! limiter (see [`ratelimit`]).

pub mod channels;
pub mod error;
pub mod jira;
pub mod ratelimit;
pub mod template;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use error::NotifyError;
use ratelimit::RateLimitedSender;
use std::collections::HashMap;
use std::time::Duration;

/// Attempts per top-level send, including the first.
pub const MAX_SEND_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Lark webhook API pressure limits.
const LARK_RATE_PER_SEC: f64 = 5.0;
const LARK_BURST: f64 = 3.0;

/// A delivery transport for one channel type.
///
/// `config` is the channel row's configuration string (JSON for most
/// senders; Lark also accepts a bare webhook URL). `is_recovery` switches
/// the rendered style between alert and recovery.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(
        &self,
        config: &str,
        title: &str,
        body: &str,
        is_recovery: bool,
    ) -> Result<(), NotifyError>;

    /// The type tag this sender is registered under (e.g. `"telegram"`).
    fn channel_type(&self) -> &str;
}

/// Dispatch table from channel type tag to sender, with a uniform retry
/// policy: up to [`MAX_SEND_ATTEMPTS`] tries, linearly growing delay.
/// Invalid configuration is reported on the first attempt without retry.
pub struct SenderRegistry {
    senders: HashMap<String, Box<dyn ChannelSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    pub fn register(&mut self, sender: Box<dyn ChannelSender>) {
        self.senders.insert(sender.channel_type().to_string(), sender);
    }

    pub fn has_sender(&self, channel_type: &str) -> bool {
        self.senders.contains_key(channel_type)
    }

    pub fn sender_types(&self) -> Vec<&str> {
        self.senders.keys().map(String::as_str).collect()
    }

    pub async fn send(
        &self,
        channel_type: &str,
        config: &str,
        title: &str,
        body: &str,
        is_recovery: bool,
    ) -> Result<(), NotifyError> {
        let sender = self
            .senders
            .get(channel_type)
            .ok_or_else(|| NotifyError::UnknownChannelType(channel_type.to_string()))?;

        let mut last_err = None;
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match sender.send(config, title, body, is_recovery).await {
                Ok(()) => return Ok(()),
                // Bad config cannot heal by retrying.
                Err(e @ NotifyError::InvalidConfig(_)) => return Err(e),
                Err(e) => {
                    if attempt < MAX_SEND_ATTEMPTS {
                        tracing::warn!(
                            channel_type,
                            attempt,
                            error = %e,
                            "send failed, retrying"
                        );
                        tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| NotifyError::Other("send failed".to_string())))
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(channels::telegram::TelegramSender::new()));
        registry.register(Box::new(RateLimitedSender::new(
            Box::new(channels::lark::LarkSender::new()),
            LARK_RATE_PER_SEC,
            LARK_BURST,
        )));
        registry
    }
}
