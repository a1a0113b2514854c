use crate::error::NotifyError;
use crate::ChannelSender;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct LarkConfig {
    #[serde(default)]
    webhook_url: String,
}

#[derive(Deserialize)]
struct LarkResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// The config is either `{"webhook_url": "..."}` or the webhook URL pasted
/// directly.
pub(crate) fn parse_webhook_url(config: &str) -> Result<String, NotifyError> {
    let raw = config.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Ok(raw.to_string());
    }
    let cfg: LarkConfig = serde_json::from_str(raw).map_err(|e| {
        NotifyError::InvalidConfig(format!(
            "lark: use JSON {{\"webhook_url\":\"...\"}} or paste the webhook URL directly: {e}"
        ))
    })?;
    if cfg.webhook_url.is_empty() {
        return Err(NotifyError::InvalidConfig(
            "lark: webhook_url is required".to_string(),
        ));
    }
    Ok(cfg.webhook_url)
}

/// Posts an interactive card: red header for alerts, green for recovery.
/// Lark answers HTTP 200 even on failure; the real outcome is the `code`
/// field in the response body.
pub struct LarkSender {
    client: reqwest::Client,
}

impl LarkSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for LarkSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelSender for LarkSender {
    async fn send(
        &self,
        config: &str,
        title: &str,
        body: &str,
        is_recovery: bool,
    ) -> Result<(), NotifyError> {
        let webhook_url = parse_webhook_url(config)?;

        let (header_template, header_title) = if is_recovery {
            ("green", "恢复通知")
        } else {
            ("red", "告警通知")
        };

        // The card header already carries the alert/recovery label; the body
        // div gets the content only.
        let mut content = body.trim_start_matches(['\n', '\r', '\t', ' ']);
        if content.is_empty() {
            content = title;
        }

        let payload = serde_json::json!({
            "msg_type": "interactive",
            "card": {
                "config": {"wide_screen_mode": true},
                "header": {
                    "template": header_template,
                    "title": {"tag": "plain_text", "content": header_title},
                },
                "elements": [
                    {"tag": "div", "text": {"tag": "lark_md", "content": content}},
                ],
            },
        });

        let resp = self.client.post(&webhook_url).json(&payload).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(NotifyError::Api {
                service: "lark".to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if let Ok(parsed) = serde_json::from_str::<LarkResponse>(&text) {
            if parsed.code != 0 {
                return Err(NotifyError::Api {
                    service: "lark".to_string(),
                    status: status.as_u16(),
                    body: format!("code={} msg={}", parsed.code, parsed.msg),
                });
            }
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "lark"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bare_url_config() {
        let url = parse_webhook_url("https://open.larksuite.com/hook/abc").unwrap();
        assert_eq!(url, "https://open.larksuite.com/hook/abc");

        let url = parse_webhook_url("  https://example.com/hook  ").unwrap();
        assert_eq!(url, "https://example.com/hook");
    }

    #[test]
    fn accepts_json_config() {
        let url =
            parse_webhook_url(r#"{"webhook_url":"https://example.com/hook"}"#).unwrap();
        assert_eq!(url, "https://example.com/hook");
    }

    #[test]
    fn rejects_empty_or_malformed_config() {
        assert!(matches!(
            parse_webhook_url("{}"),
            Err(NotifyError::InvalidConfig(_))
        ));
        assert!(matches!(
            parse_webhook_url("garbage"),
            Err(NotifyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn failure_code_in_success_response_parses() {
        let resp: LarkResponse =
            serde_json::from_str(r#"{"code":19001,"msg":"param invalid"}"#).unwrap();
        assert_eq!(resp.code, 19001);
        assert_eq!(resp.msg, "param invalid");
    }
}
