//! Jira issue creation for the ticket-gating path.

use crate::error::NotifyError;
use serde::Deserialize;
use std::time::Duration;

const CREATE_TIMEOUT: Duration = Duration::from_secs(15);

/// Parsed from a rule's `jira_config` JSON. For Jira Cloud set `email` +
/// `token` (API token, sent as basic auth); token alone is sent as a
/// bearer.
#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub issue_type: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    key: String,
}

/// Create an issue and return its key (e.g. `OPS-123`).
///
/// REST v3 wants the description as an ADF document, so the plain-text
/// body is wrapped in a single paragraph.
pub async fn create_issue(
    cfg: &JiraConfig,
    summary: &str,
    description: &str,
) -> Result<String, NotifyError> {
    if cfg.base_url.is_empty() || cfg.project.is_empty() {
        return Err(NotifyError::InvalidConfig(
            "jira: base_url and project are required".to_string(),
        ));
    }
    let issue_type = if cfg.issue_type.is_empty() {
        "Task"
    } else {
        &cfg.issue_type
    };

    let mut url = format!("{}/rest/api/3/issue", cfg.base_url.trim_end_matches('/'));
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("https://{url}");
    }

    let payload = serde_json::json!({
        "fields": {
            "project": {"key": cfg.project},
            "summary": summary,
            "description": {
                "type": "doc",
                "version": 1,
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": description}]}
                ],
            },
            "issuetype": {"name": issue_type},
        },
    });

    let client = reqwest::Client::builder()
        .timeout(CREATE_TIMEOUT)
        .build()
        .unwrap_or_default();
    let mut req = client
        .post(&url)
        .header("Accept", "application/json")
        .json(&payload);
    if !cfg.token.is_empty() {
        req = if !cfg.email.is_empty() {
            req.basic_auth(&cfg.email, Some(&cfg.token))
        } else {
            req.bearer_auth(&cfg.token)
        };
    }

    let resp = req.send().await?;
    let status = resp.status();
    if status != reqwest::StatusCode::CREATED {
        let body = resp.text().await.unwrap_or_default();
        return Err(NotifyError::Api {
            service: "jira".to_string(),
            status: status.as_u16(),
            body,
        });
    }

    let created: CreateResponse = resp
        .json()
        .await
        .map_err(|e| NotifyError::Other(format!("jira: malformed create response: {e}")))?;
    Ok(created.key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_base_url_or_project_is_invalid_config() {
        let cfg: JiraConfig = serde_json::from_str("{}").unwrap();
        let err = create_issue(&cfg, "s", "d").await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidConfig(_)));

        let cfg: JiraConfig =
            serde_json::from_str(r#"{"base_url":"https://x.atlassian.net"}"#).unwrap();
        let err = create_issue(&cfg, "s", "d").await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidConfig(_)));
    }

    #[test]
    fn config_parses_with_partial_fields() {
        let cfg: JiraConfig = serde_json::from_str(
            r#"{"base_url":"jira.example.com","project":"OPS","token":"t"}"#,
        )
        .unwrap();
        assert_eq!(cfg.project, "OPS");
        assert!(cfg.email.is_empty());
        assert!(cfg.issue_type.is_empty());
    }
}
