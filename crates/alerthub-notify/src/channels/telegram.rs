use crate::error::NotifyError;
use crate::ChannelSender;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct TelegramConfig {
    #[serde(default)]
    token: String,
    #[serde(default)]
    chat_id: String,
}

/// Bot-API sender. The message is plain text: a fixed alert/recovery
/// header line followed by the rendered body.
pub struct TelegramSender {
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    async fn send(
        &self,
        config: &str,
        _title: &str,
        body: &str,
        is_recovery: bool,
    ) -> Result<(), NotifyError> {
        let cfg: TelegramConfig = serde_json::from_str(config)
            .map_err(|e| NotifyError::InvalidConfig(format!("telegram: {e}")))?;
        if cfg.token.is_empty() || cfg.chat_id.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "telegram: token and chat_id are required".to_string(),
            ));
        }

        let header = if is_recovery { "恢复通知" } else { "告警通知" };
        let trimmed = body.trim_start_matches(['\n', '\r', '\t', ' ']);
        let text = if trimmed.is_empty() {
            header.to_string()
        } else {
            format!("{header}\n{trimmed}")
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", cfg.token);
        let payload = serde_json::json!({
            "chat_id": cfg.chat_id,
            "text": text,
        });

        let resp = self.client.post(&url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                service: "telegram".to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_malformed_and_incomplete_config() {
        let sender = TelegramSender::new();

        let err = sender.send("not json", "t", "b", false).await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidConfig(_)));

        let err = sender
            .send(r#"{"token":"abc"}"#, "t", "b", false)
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::InvalidConfig(_)));
    }
}
